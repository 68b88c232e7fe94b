use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    pub name: String,
    pub unique_id: Option<String>,
    pub device_code: u32,
    pub controller_data: String,
    pub delay_secs: f32,
    pub temperature_sensor: Option<String>,
    pub humidity_sensor: Option<String>,
    pub power_sensor: Option<String>,
    pub power_sensor_restore_state: bool,
    pub power_sensor_switch: bool,
    pub use_temperature_sensor: bool,
    pub cold_tolerance: f32,
    pub hot_tolerance: f32,
    pub power_meter_sensor: Option<String>,
    pub delay_on_secs: u64,
    pub delay_off_secs: u64,
    pub min_power_meter: Option<f32>,
    pub max_power_meter: Option<f32>,
    pub full_power_tolerance: f32,
    pub run_time_secs: u64,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            name: "SmartIR Climate".to_string(),
            unique_id: None,
            device_code: 0,
            controller_data: "climate/ir/send".to_string(),
            delay_secs: 0.5,
            temperature_sensor: None,
            humidity_sensor: None,
            power_sensor: None,
            power_sensor_restore_state: false,
            power_sensor_switch: false,
            use_temperature_sensor: false,
            cold_tolerance: 0.5,
            hot_tolerance: 0.3,
            power_meter_sensor: None,
            delay_on_secs: 2,
            delay_off_secs: 120,
            min_power_meter: None,
            max_power_meter: None,
            full_power_tolerance: 0.1,
            run_time_secs: 1_800,
        }
    }
}

impl ClimateConfig {
    pub fn sanitize(&mut self) {
        if !self.delay_secs.is_finite() || self.delay_secs < 0.0 {
            self.delay_secs = 0.5;
        }
        if !self.cold_tolerance.is_finite() || self.cold_tolerance <= 0.0 {
            self.cold_tolerance = 0.5;
        }
        if !self.hot_tolerance.is_finite() || self.hot_tolerance <= 0.0 {
            self.hot_tolerance = 0.3;
        }
        self.full_power_tolerance = if self.full_power_tolerance.is_finite() {
            self.full_power_tolerance.clamp(0.0, 1.0)
        } else {
            0.1
        };
        self.min_power_meter = self.min_power_meter.filter(|v| v.is_finite() && *v >= 0.0);
        self.max_power_meter = self.max_power_meter.filter(|v| v.is_finite() && *v > 0.0);

        for sensor in [
            &mut self.temperature_sensor,
            &mut self.humidity_sensor,
            &mut self.power_sensor,
            &mut self.power_meter_sensor,
        ] {
            if sensor.as_deref().is_some_and(|s| s.trim().is_empty()) {
                *sensor = None;
            }
        }

        if self.power_sensor.is_none() {
            self.power_sensor_switch = false;
        }
        // The feedback loop has nothing to close without a temperature sensor.
        if self.temperature_sensor.is_none() {
            self.use_temperature_sensor = false;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
    pub mqtt_client_id: String,
    pub state_topic: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
            mqtt_client_id: "climate-controller-rust".to_string(),
            state_topic: "climate/controller/state".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub climate: ClimateConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_disables_loop_without_sensor() {
        let mut config = ClimateConfig {
            use_temperature_sensor: true,
            temperature_sensor: Some("  ".to_string()),
            power_sensor_switch: true,
            ..ClimateConfig::default()
        };
        config.sanitize();

        assert!(config.temperature_sensor.is_none());
        assert!(!config.use_temperature_sensor);
        assert!(!config.power_sensor_switch);
    }

    #[test]
    fn sanitize_restores_invalid_tolerances() {
        let mut config = ClimateConfig {
            cold_tolerance: -1.0,
            hot_tolerance: f32::NAN,
            full_power_tolerance: 50.0,
            max_power_meter: Some(0.0),
            ..ClimateConfig::default()
        };
        config.sanitize();

        assert_eq!(config.cold_tolerance, 0.5);
        assert_eq!(config.hot_tolerance, 0.3);
        assert_eq!(config.full_power_tolerance, 1.0);
        assert_eq!(config.max_power_meter, None);
    }

    #[test]
    fn partial_runtime_config_uses_defaults() {
        let runtime: RuntimeConfig =
            serde_json::from_str(r#"{ "climate": { "device_code": 1180 } }"#).unwrap();
        assert_eq!(runtime.climate.device_code, 1180);
        assert_eq!(runtime.climate.delay_off_secs, 120);
        assert_eq!(runtime.network.mqtt_port, 1883);
    }
}
