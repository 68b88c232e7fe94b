use crate::{
    config::ClimateConfig,
    profile::DeviceProfile,
    types::{HvacMode, PowerLevel},
};

const SAME_TARGET_REL_TOL: f32 = 0.1;
const ESCALATION_STEP: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulatorSettings {
    pub cold_tolerance: f32,
    pub hot_tolerance: f32,
    pub min_run_time_secs: u64,
    pub min_power_meter: Option<f32>,
    pub max_power_meter: Option<f32>,
    pub full_power_tolerance: f32,
}

impl From<&ClimateConfig> for RegulatorSettings {
    fn from(config: &ClimateConfig) -> Self {
        Self {
            cold_tolerance: config.cold_tolerance,
            hot_tolerance: config.hot_tolerance,
            min_run_time_secs: config.run_time_secs,
            min_power_meter: config.min_power_meter,
            max_power_meter: config.max_power_meter,
            full_power_tolerance: config.full_power_tolerance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegulatorInput {
    pub mode: HvacMode,
    pub target: f32,
    pub current: f32,
    pub climate_target: f32,
    pub run_time_secs: u64,
    pub power_meter: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Regulation {
    Inactive,
    Unchanged,
    Suppressed { mode: HvacMode },
    OutOfRange { temperature: f32 },
    Adjust { mode: HvacMode, temperature: f32 },
}

#[derive(Debug, Clone)]
pub struct Regulator {
    settings: RegulatorSettings,
}

impl Regulator {
    pub fn new(settings: RegulatorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &RegulatorSettings {
        &self.settings
    }

    pub fn is_full_power(&self, power_meter: f32) -> bool {
        match self.settings.max_power_meter {
            Some(max) if max > 0.0 => {
                is_close(power_meter, max, self.settings.full_power_tolerance)
            }
            _ => false,
        }
    }

    pub fn power_level(&self, power_meter: Option<f32>) -> PowerLevel {
        let Some(reading) = power_meter else {
            return PowerLevel::Unmetered;
        };

        if self.is_full_power(reading) {
            PowerLevel::Full
        } else if self
            .settings
            .min_power_meter
            .is_some_and(|min| reading < min)
            || reading <= 0.0
        {
            PowerLevel::Idle
        } else {
            PowerLevel::Running
        }
    }

    pub fn evaluate(&self, input: RegulatorInput, profile: &DeviceProfile) -> Regulation {
        if input.mode.is_off() {
            return Regulation::Inactive;
        }

        let diff = input.target - input.current;
        let warmed_up = input.run_time_secs >= self.settings.min_run_time_secs;
        let on_same_target = is_close(input.target, input.climate_target, SAME_TARGET_REL_TOL);

        let (mode, temperature) = if -diff >= self.settings.cold_tolerance {
            let mut temperature = input.target;
            if on_same_target {
                if warmed_up && !self.is_full_power(input.power_meter) {
                    temperature = input.climate_target - ESCALATION_STEP;
                } else if input.mode == HvacMode::Cool {
                    return Regulation::Suppressed {
                        mode: HvacMode::Cool,
                    };
                }
            }
            (HvacMode::Cool, temperature)
        } else if diff >= self.settings.hot_tolerance || diff.abs() < self.settings.cold_tolerance
        {
            let mut temperature = input.target;
            if on_same_target {
                if warmed_up {
                    temperature = input.climate_target + ESCALATION_STEP;
                } else if input.mode == HvacMode::FanOnly {
                    return Regulation::Suppressed {
                        mode: HvacMode::FanOnly,
                    };
                }
            }
            (HvacMode::FanOnly, temperature)
        } else {
            return Regulation::Unchanged;
        };

        if !profile.temperature_in_range(temperature) {
            return Regulation::OutOfRange { temperature };
        }

        Regulation::Adjust {
            mode,
            temperature: profile.precision.round(temperature),
        }
    }
}

pub fn is_close(a: f32, b: f32, rel_tol: f32) -> bool {
    (a - b).abs() <= rel_tol * a.abs().max(b.abs())
}
