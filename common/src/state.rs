use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{HvacMode, PowerLevel};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateSnapshot {
    pub hvac_mode: Option<HvacMode>,
    pub fan_mode: Option<String>,
    pub swing_mode: Option<String>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub last_on_operation: Option<HvacMode>,
    pub temperature_climate: Option<f32>,
    pub saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClimateAttributes {
    pub temperature_climate: f32,
    pub last_on_operation: Option<HvacMode>,
    pub device_code: u32,
    pub manufacturer: String,
    pub supported_models: Vec<String>,
    pub supported_controller: String,
    pub commands_encoding: String,
    pub on_by_remote: bool,
    pub power_level: PowerLevel,
    pub run_time_secs: u64,
    pub power_on_since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClimateStatus {
    pub name: String,
    pub unique_id: Option<String>,
    pub hvac_mode: HvacMode,
    pub hvac_modes: Vec<HvacMode>,
    pub fan_mode: String,
    pub fan_modes: Vec<String>,
    pub swing_mode: Option<String>,
    pub swing_modes: Vec<String>,
    pub temperature: f32,
    pub target_temperature_step: f32,
    pub min_temp: f32,
    pub max_temp: f32,
    pub humidity: f32,
    pub min_humidity: f32,
    pub max_humidity: f32,
    pub current_temperature: Option<f32>,
    pub current_humidity: Option<f32>,
    #[serde(flatten)]
    pub attributes: ClimateAttributes,
}
