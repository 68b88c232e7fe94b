use std::time::Duration;

use crate::{config::ClimateConfig, types::SensorState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerPlan {
    pub on: bool,
    pub delay: Duration,
}

#[derive(Debug, Clone)]
pub struct PowerCoordinator {
    delay_on: Duration,
    delay_off: Duration,
    power_on_at_ms: Option<u64>,
}

impl PowerCoordinator {
    pub fn new(delay_on: Duration, delay_off: Duration) -> Self {
        Self {
            delay_on,
            delay_off,
            power_on_at_ms: None,
        }
    }

    pub fn from_config(config: &ClimateConfig) -> Self {
        Self::new(
            Duration::from_secs(config.delay_on_secs),
            Duration::from_secs(config.delay_off_secs),
        )
    }

    // `None` when the relay already reports the requested state.
    pub fn plan(&self, on: bool, relay_is_on: bool) -> Option<PowerPlan> {
        if on == relay_is_on {
            return None;
        }

        Some(PowerPlan {
            on,
            delay: if on { self.delay_on } else { self.delay_off },
        })
    }

    pub fn confirm(&mut self, requested_on: bool, relay_is_on: bool, now_ms: u64) {
        if requested_on && relay_is_on {
            self.power_on_at_ms = Some(now_ms);
        } else if !relay_is_on {
            self.power_on_at_ms = None;
        }
    }

    pub fn power_on_at_ms(&self) -> Option<u64> {
        self.power_on_at_ms
    }

    pub fn is_running(&self) -> bool {
        self.power_on_at_ms.is_some()
    }

    pub fn run_time_secs(&self, now_ms: u64) -> u64 {
        self.power_on_at_ms
            .map(|start| now_ms.saturating_sub(start) / 1_000)
            .unwrap_or(0)
    }

    pub fn delay_on(&self) -> Duration {
        self.delay_on
    }
}

pub fn parse_power_meter(state: Option<&SensorState>) -> f32 {
    state
        .and_then(SensorState::value)
        .and_then(|raw| raw.parse::<f32>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(0.0)
}
