use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HvacMode {
    Off,
    Heat,
    Cool,
    HeatCool,
    Auto,
    Dry,
    FanOnly,
    On,
}

impl HvacMode {
    pub const OPERATING: [HvacMode; 6] = [
        Self::Heat,
        Self::Cool,
        Self::HeatCool,
        Self::Auto,
        Self::Dry,
        Self::FanOnly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
            Self::HeatCool => "heat_cool",
            Self::Auto => "auto",
            Self::Dry => "dry",
            Self::FanOnly => "fan_only",
            Self::On => "on",
        }
    }

    pub fn is_off(self) -> bool {
        self == Self::Off
    }
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HvacMode {
    type Err = UnknownHvacMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "heat" => Ok(Self::Heat),
            "cool" => Ok(Self::Cool),
            "heat_cool" => Ok(Self::HeatCool),
            "auto" => Ok(Self::Auto),
            "dry" => Ok(Self::Dry),
            "fan_only" => Ok(Self::FanOnly),
            "on" => Ok(Self::On),
            _ => Err(UnknownHvacMode(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown hvac mode: {0}")]
pub struct UnknownHvacMode(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub enum Precision {
    Whole,
    Halves,
    Tenths,
}

impl Precision {
    pub fn step(self) -> f32 {
        match self {
            Self::Whole => 1.0,
            Self::Halves => 0.5,
            Self::Tenths => 0.1,
        }
    }

    pub fn round(self, value: f32) -> f32 {
        match self {
            Self::Whole => value.round(),
            Self::Halves | Self::Tenths => (value * 10.0).round() / 10.0,
        }
    }
}

impl TryFrom<f32> for Precision {
    type Error = String;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        if (value - 1.0).abs() < f32::EPSILON {
            Ok(Self::Whole)
        } else if (value - 0.5).abs() < f32::EPSILON {
            Ok(Self::Halves)
        } else if (value - 0.1).abs() < 1e-6 {
            Ok(Self::Tenths)
        } else {
            Err(format!("unsupported precision {value}"))
        }
    }
}

impl From<Precision> for f32 {
    fn from(precision: Precision) -> Self {
        precision.step()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorState {
    Unknown,
    Unavailable,
    Value(String),
}

impl SensorState {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim() {
            "" | "unknown" => Self::Unknown,
            "unavailable" => Self::Unavailable,
            value => Self::Value(value.to_string()),
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn switch_state(&self) -> Option<bool> {
        match self.value()?.to_ascii_lowercase().as_str() {
            "on" => Some(true),
            "off" => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerLevel {
    Unmetered,
    Idle,
    Running,
    Full,
}

pub fn format_temperature(value: f32) -> String {
    if value == value.trunc() {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}
