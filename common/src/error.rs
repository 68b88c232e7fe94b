use crate::types::HvacMode;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClimateError {
    #[error("temperature {value} outside {min}..={max}")]
    TemperatureOutOfRange { value: f32, min: f32, max: f32 },
    #[error("humidity {value} outside {min}..={max}")]
    HumidityOutOfRange { value: f32, min: f32, max: f32 },
    // The regulator wanted a climate target the device cannot accept; the
    // previous climate target and mode are kept.
    #[error("regulated temperature {value} outside {min}..={max}")]
    RegulationOutOfRange { value: f32, min: f32, max: f32 },
    #[error("hvac mode {0} is not supported by this device")]
    UnsupportedMode(HvacMode),
    #[error("fan mode {0:?} is not supported by this device")]
    UnsupportedFanMode(String),
    #[error("swing mode {0:?} is not supported by this device")]
    UnsupportedSwingMode(String),
    #[error("unable to parse {sensor} sensor state {value:?}")]
    SensorParse { sensor: &'static str, value: String },
}
