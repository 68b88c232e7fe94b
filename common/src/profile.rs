use serde::{Deserialize, Serialize};

use crate::{
    commands::CommandTable,
    types::{HvacMode, Precision},
};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("invalid device file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("device file lists no fan modes")]
    NoFanModes,
    #[error("device file lists no supported operation modes")]
    NoOperationModes,
    #[error("invalid {what} range {min}..{max}")]
    InvalidRange {
        what: &'static str,
        min: f32,
        max: f32,
    },
}

fn default_min_humidity() -> f32 {
    30.0
}

fn default_max_humidity() -> f32 {
    99.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceFile {
    manufacturer: String,
    #[serde(default)]
    supported_models: Vec<String>,
    supported_controller: String,
    commands_encoding: String,
    min_temperature: f32,
    max_temperature: f32,
    #[serde(default = "default_min_humidity")]
    min_humidity: f32,
    #[serde(default = "default_max_humidity")]
    max_humidity: f32,
    precision: Precision,
    operation_modes: Vec<String>,
    fan_modes: Vec<String>,
    #[serde(default)]
    swing_modes: Option<Vec<String>>,
    commands: CommandTable,
}

#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub manufacturer: String,
    pub supported_models: Vec<String>,
    pub supported_controller: String,
    pub commands_encoding: String,
    pub min_temperature: f32,
    pub max_temperature: f32,
    pub min_humidity: f32,
    pub max_humidity: f32,
    pub precision: Precision,
    pub hvac_modes: Vec<HvacMode>,
    pub fan_modes: Vec<String>,
    pub swing_modes: Vec<String>,
    pub commands: CommandTable,
}

impl DeviceProfile {
    pub fn from_json(raw: &str) -> Result<Self, ProfileError> {
        let file: DeviceFile = serde_json::from_str(raw)?;
        Self::try_from(file)
    }

    pub fn from_slice(raw: &[u8]) -> Result<Self, ProfileError> {
        let file: DeviceFile = serde_json::from_slice(raw)?;
        Self::try_from(file)
    }

    pub fn supports_swing(&self) -> bool {
        !self.swing_modes.is_empty()
    }

    pub fn supports_mode(&self, mode: HvacMode) -> bool {
        self.hvac_modes.contains(&mode)
    }

    pub fn first_operating_mode(&self) -> HvacMode {
        self.hvac_modes
            .iter()
            .copied()
            .find(|mode| !mode.is_off())
            .unwrap_or(HvacMode::Off)
    }

    pub fn temperature_in_range(&self, value: f32) -> bool {
        (self.min_temperature..=self.max_temperature).contains(&value)
    }

    pub fn humidity_in_range(&self, value: f32) -> bool {
        (self.min_humidity..=self.max_humidity).contains(&value)
    }
}

impl TryFrom<DeviceFile> for DeviceProfile {
    type Error = ProfileError;

    fn try_from(file: DeviceFile) -> Result<Self, Self::Error> {
        if !(file.min_temperature < file.max_temperature) {
            return Err(ProfileError::InvalidRange {
                what: "temperature",
                min: file.min_temperature,
                max: file.max_temperature,
            });
        }
        if !(file.min_humidity < file.max_humidity) {
            return Err(ProfileError::InvalidRange {
                what: "humidity",
                min: file.min_humidity,
                max: file.max_humidity,
            });
        }
        if file.fan_modes.is_empty() {
            return Err(ProfileError::NoFanModes);
        }

        let mut hvac_modes = vec![HvacMode::Off];
        for raw in &file.operation_modes {
            // Modes outside the known set cannot be addressed by the host.
            if let Ok(mode) = raw.parse::<HvacMode>() {
                if HvacMode::OPERATING.contains(&mode) && !hvac_modes.contains(&mode) {
                    hvac_modes.push(mode);
                }
            }
        }
        if hvac_modes.len() == 1 {
            return Err(ProfileError::NoOperationModes);
        }

        Ok(Self {
            manufacturer: file.manufacturer,
            supported_models: file.supported_models,
            supported_controller: file.supported_controller,
            commands_encoding: file.commands_encoding,
            min_temperature: file.min_temperature,
            max_temperature: file.max_temperature,
            min_humidity: file.min_humidity,
            max_humidity: file.max_humidity,
            precision: file.precision,
            hvac_modes,
            fan_modes: file.fan_modes,
            swing_modes: file.swing_modes.unwrap_or_default(),
            commands: file.commands,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"{
        "manufacturer": "Lennox",
        "supportedModels": ["MWMA018S4-2P"],
        "supportedController": "MQTT",
        "commandsEncoding": "Base64",
        "minTemperature": 16.0,
        "maxTemperature": 30.0,
        "precision": 1,
        "operationModes": ["cool", "fan_only", "turbo", "heat"],
        "fanModes": ["auto", "low"],
        "commands": {
            "off": "OFF",
            "cool": {
                "auto": { "16": "C16", "17": "C17", "22": "C22", "23": "C23", "24": "C24", "25": "C25", "30": "C30" },
                "low": { "24": "CL24" }
            },
            "fan_only": {
                "auto": { "22": "F22", "23": "F23", "24": "F24", "25": "F25", "26": "F26" }
            },
            "heat": {
                "auto": { "16": "H16", "24": "H24" }
            }
        }
    }"#;

    pub(crate) fn sample() -> DeviceProfile {
        DeviceProfile::from_json(SAMPLE).unwrap()
    }

    #[test]
    fn drops_unknown_operation_modes() {
        let profile = sample();
        assert_eq!(
            profile.hvac_modes,
            vec![HvacMode::Off, HvacMode::Cool, HvacMode::FanOnly, HvacMode::Heat]
        );
        assert_eq!(profile.first_operating_mode(), HvacMode::Cool);
    }

    #[test]
    fn humidity_bounds_default_when_absent() {
        let profile = sample();
        assert_eq!(profile.min_humidity, 30.0);
        assert_eq!(profile.max_humidity, 99.0);
        assert!(!profile.supports_swing());
    }

    #[test]
    fn rejects_inverted_temperature_range() {
        let raw = SAMPLE.replace("\"minTemperature\": 16.0", "\"minTemperature\": 31.0");
        assert!(matches!(
            DeviceProfile::from_json(&raw),
            Err(ProfileError::InvalidRange {
                what: "temperature",
                ..
            })
        ));
    }

    #[test]
    fn rejects_missing_fan_modes() {
        let raw = SAMPLE.replace("[\"auto\", \"low\"]", "[]");
        assert!(matches!(
            DeviceProfile::from_json(&raw),
            Err(ProfileError::NoFanModes)
        ));
    }
}
