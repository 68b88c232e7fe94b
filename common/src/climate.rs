use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::{
    commands::CommandRequest,
    config::ClimateConfig,
    error::ClimateError,
    power::{PowerCoordinator, PowerPlan},
    profile::DeviceProfile,
    regulator::{Regulation, Regulator, RegulatorInput, RegulatorSettings},
    state::{ClimateAttributes, ClimateSnapshot, ClimateStatus},
    types::{HvacMode, SensorState},
};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    SendCommand(CommandRequest),
    RequestPower(bool),
    ResumeAfter { delay: Duration, mode: HvacMode },
    PublishState,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Observation {
    pub now_ms: u64,
    pub power_meter: Option<f32>,
}

impl Observation {
    pub fn at(now_ms: u64) -> Self {
        Self {
            now_ms,
            power_meter: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClimateEngine {
    profile: DeviceProfile,
    name: String,
    unique_id: Option<String>,
    device_code: u32,
    use_temperature_sensor: bool,
    power_switch: bool,
    power_sensor_restore_state: bool,

    regulator: Regulator,
    power: PowerCoordinator,

    hvac_mode: HvacMode,
    fan_mode: String,
    swing_mode: Option<String>,
    target_temperature: f32,
    // What the appliance was last told; may be biased away from the user target.
    target_temperature_climate: f32,
    target_humidity: f32,
    last_on_operation: Option<HvacMode>,

    current_temperature: Option<f32>,
    current_humidity: Option<f32>,
    power_meter: Option<f32>,
    last_observed_ms: u64,

    power_sensor_on: Option<bool>,
    on_by_remote: bool,
}

impl ClimateEngine {
    pub fn new(profile: DeviceProfile, config: &ClimateConfig) -> Self {
        let fan_mode = profile.fan_modes.first().cloned().unwrap_or_default();
        let swing_mode = profile.swing_modes.first().cloned();

        Self {
            name: config.name.clone(),
            unique_id: config.unique_id.clone(),
            device_code: config.device_code,
            use_temperature_sensor: config.use_temperature_sensor,
            power_switch: config.power_sensor.is_some() && config.power_sensor_switch,
            power_sensor_restore_state: config.power_sensor_restore_state,
            regulator: Regulator::new(RegulatorSettings::from(config)),
            power: PowerCoordinator::from_config(config),
            hvac_mode: HvacMode::Off,
            fan_mode,
            swing_mode,
            target_temperature: profile.min_temperature,
            target_temperature_climate: profile.min_temperature,
            target_humidity: profile.min_humidity,
            last_on_operation: None,
            current_temperature: None,
            current_humidity: None,
            power_meter: None,
            last_observed_ms: 0,
            power_sensor_on: None,
            on_by_remote: false,
            profile,
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn hvac_mode(&self) -> HvacMode {
        self.hvac_mode
    }

    pub fn fan_mode(&self) -> &str {
        &self.fan_mode
    }

    pub fn swing_mode(&self) -> Option<&str> {
        self.swing_mode.as_deref()
    }

    pub fn target_temperature(&self) -> f32 {
        self.target_temperature
    }

    pub fn target_temperature_climate(&self) -> f32 {
        self.target_temperature_climate
    }

    pub fn target_humidity(&self) -> f32 {
        self.target_humidity
    }

    pub fn last_on_operation(&self) -> Option<HvacMode> {
        self.last_on_operation
    }

    pub fn current_temperature(&self) -> Option<f32> {
        self.current_temperature
    }

    pub fn current_humidity(&self) -> Option<f32> {
        self.current_humidity
    }

    pub fn is_on_by_remote(&self) -> bool {
        self.on_by_remote
    }

    pub fn is_power_switch(&self) -> bool {
        self.power_switch
    }

    pub fn restore(&mut self, snapshot: &ClimateSnapshot) {
        if let Some(mode) = snapshot.hvac_mode {
            if mode == HvacMode::On || self.profile.supports_mode(mode) {
                self.hvac_mode = mode;
            }
        }
        if let Some(fan) = &snapshot.fan_mode {
            if self.profile.fan_modes.contains(fan) {
                self.fan_mode = fan.clone();
            }
        }
        if let Some(swing) = &snapshot.swing_mode {
            if self.profile.swing_modes.contains(swing) {
                self.swing_mode = Some(swing.clone());
            }
        }
        if let Some(temperature) = snapshot.temperature {
            if self.profile.temperature_in_range(temperature) {
                self.target_temperature = self.profile.precision.round(temperature);
            }
        }
        if let Some(humidity) = snapshot.humidity {
            if self.profile.humidity_in_range(humidity) {
                self.target_humidity = self.profile.precision.round(humidity);
            }
        }

        self.last_on_operation = snapshot
            .last_on_operation
            .filter(|mode| !mode.is_off() && self.profile.supports_mode(*mode));

        self.target_temperature_climate = snapshot
            .temperature_climate
            .filter(|value| self.profile.temperature_in_range(*value))
            .unwrap_or(self.target_temperature);
    }

    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> ClimateSnapshot {
        ClimateSnapshot {
            hvac_mode: Some(self.hvac_mode),
            fan_mode: Some(self.fan_mode.clone()),
            swing_mode: self.swing_mode.clone(),
            temperature: Some(self.target_temperature),
            humidity: Some(self.target_humidity),
            last_on_operation: self.last_on_operation,
            temperature_climate: Some(self.target_temperature_climate),
            saved_at: Some(saved_at),
        }
    }

    pub fn set_hvac_mode(&mut self, mode: HvacMode) -> Result<Vec<EngineAction>, ClimateError> {
        if !self.profile.supports_mode(mode) {
            return Err(ClimateError::UnsupportedMode(mode));
        }
        Ok(self.apply_hvac_mode(mode))
    }

    // Continuation of an external power-on: apply the adopted mode unless a
    // newer transition has already replaced it.
    pub fn resume_mode(&mut self, mode: HvacMode) -> Vec<EngineAction> {
        if self.hvac_mode != mode {
            return Vec::new();
        }
        self.apply_hvac_mode(mode)
    }

    pub fn turn_on(&mut self) -> Result<Vec<EngineAction>, ClimateError> {
        let mode = self
            .last_on_operation
            .unwrap_or_else(|| self.profile.first_operating_mode());
        self.set_hvac_mode(mode)
    }

    pub fn turn_off(&mut self) -> Result<Vec<EngineAction>, ClimateError> {
        self.set_hvac_mode(HvacMode::Off)
    }

    pub fn set_temperature(
        &mut self,
        value: f32,
        hvac_mode: Option<HvacMode>,
        observation: Observation,
    ) -> Result<Vec<EngineAction>, ClimateError> {
        if !value.is_finite() || !self.profile.temperature_in_range(value) {
            return Err(ClimateError::TemperatureOutOfRange {
                value,
                min: self.profile.min_temperature,
                max: self.profile.max_temperature,
            });
        }
        if let Some(mode) = hvac_mode {
            if !self.profile.supports_mode(mode) {
                return Err(ClimateError::UnsupportedMode(mode));
            }
        }

        self.target_temperature = self.profile.precision.round(value);
        self.observe(observation);

        let regulated = self.use_temperature_sensor
            && self.current_temperature.is_some()
            && !self.hvac_mode.is_off();
        let changed = if regulated {
            self.regulate()?
        } else {
            self.target_temperature_climate = self.target_temperature;
            true
        };

        if let Some(mode) = hvac_mode {
            return Ok(self.apply_hvac_mode(mode));
        }
        if !changed {
            return Ok(vec![EngineAction::PublishState]);
        }
        Ok(self.resend_and_publish())
    }

    pub fn set_humidity(&mut self, value: f32) -> Result<Vec<EngineAction>, ClimateError> {
        if !value.is_finite() || !self.profile.humidity_in_range(value) {
            return Err(ClimateError::HumidityOutOfRange {
                value,
                min: self.profile.min_humidity,
                max: self.profile.max_humidity,
            });
        }

        self.target_humidity = self.profile.precision.round(value);
        Ok(vec![EngineAction::PublishState])
    }

    pub fn set_fan_mode(&mut self, fan_mode: &str) -> Result<Vec<EngineAction>, ClimateError> {
        if !self.profile.fan_modes.iter().any(|fan| fan == fan_mode) {
            return Err(ClimateError::UnsupportedFanMode(fan_mode.to_string()));
        }

        self.fan_mode = fan_mode.to_string();
        Ok(self.resend_and_publish())
    }

    pub fn set_swing_mode(&mut self, swing_mode: &str) -> Result<Vec<EngineAction>, ClimateError> {
        if !self.profile.swing_modes.iter().any(|swing| swing == swing_mode) {
            return Err(ClimateError::UnsupportedSwingMode(swing_mode.to_string()));
        }

        self.swing_mode = Some(swing_mode.to_string());
        Ok(self.resend_and_publish())
    }

    pub fn temperature_sensor_changed(
        &mut self,
        state: &SensorState,
        observation: Observation,
    ) -> Result<Vec<EngineAction>, ClimateError> {
        let Some(value) = parse_reading("temperature", state)? else {
            return Ok(Vec::new());
        };

        self.current_temperature = Some(value);
        self.observe(observation);

        let mut actions = Vec::new();
        if self.use_temperature_sensor && self.regulate()? {
            actions.extend(self.command_actions());
        }
        actions.push(EngineAction::PublishState);
        Ok(actions)
    }

    pub fn humidity_sensor_changed(
        &mut self,
        state: &SensorState,
    ) -> Result<Vec<EngineAction>, ClimateError> {
        let Some(value) = parse_reading("humidity", state)? else {
            return Ok(Vec::new());
        };

        self.current_humidity = Some(value);
        Ok(vec![EngineAction::PublishState])
    }

    pub fn power_sensor_changed(&mut self, state: &SensorState) -> Vec<EngineAction> {
        let Some(on) = state.switch_state() else {
            return Vec::new();
        };
        if self.power_sensor_on == Some(on) {
            return Vec::new();
        }
        self.power_sensor_on = Some(on);

        if !on {
            self.on_by_remote = false;
            self.hvac_mode = HvacMode::Off;
            return vec![EngineAction::PublishState];
        }

        if !self.hvac_mode.is_off() {
            return vec![EngineAction::PublishState];
        }

        self.on_by_remote = true;
        self.hvac_mode = match self.last_on_operation {
            Some(mode) if self.power_sensor_restore_state => mode,
            _ => HvacMode::On,
        };

        if self.power_switch {
            vec![
                EngineAction::PublishState,
                EngineAction::ResumeAfter {
                    delay: self.power.delay_on(),
                    mode: self.hvac_mode,
                },
            ]
        } else {
            vec![EngineAction::PublishState]
        }
    }

    pub fn power_plan(&self, on: bool, relay_is_on: bool) -> Option<PowerPlan> {
        self.power.plan(on, relay_is_on)
    }

    pub fn power_confirmed(&mut self, requested_on: bool, relay_is_on: bool, now_ms: u64) {
        self.power.confirm(requested_on, relay_is_on, now_ms);
    }

    pub fn run_time_secs(&self, now_ms: u64) -> u64 {
        self.power.run_time_secs(now_ms)
    }

    pub fn attributes(&self, now_ms: u64, now: DateTime<Utc>) -> ClimateAttributes {
        ClimateAttributes {
            temperature_climate: self.target_temperature_climate,
            last_on_operation: self.last_on_operation,
            device_code: self.device_code,
            manufacturer: self.profile.manufacturer.clone(),
            supported_models: self.profile.supported_models.clone(),
            supported_controller: self.profile.supported_controller.clone(),
            commands_encoding: self.profile.commands_encoding.clone(),
            on_by_remote: self.on_by_remote,
            power_level: self.regulator.power_level(self.power_meter),
            run_time_secs: self.power.run_time_secs(now_ms),
            power_on_since: self.power.power_on_at_ms().map(|start| {
                now - chrono::Duration::milliseconds(now_ms.saturating_sub(start) as i64)
            }),
        }
    }

    pub fn status(&self, now_ms: u64, now: DateTime<Utc>) -> ClimateStatus {
        ClimateStatus {
            name: self.name.clone(),
            unique_id: self.unique_id.clone(),
            hvac_mode: self.hvac_mode,
            hvac_modes: self.profile.hvac_modes.clone(),
            fan_mode: self.fan_mode.clone(),
            fan_modes: self.profile.fan_modes.clone(),
            swing_mode: self.swing_mode.clone(),
            swing_modes: self.profile.swing_modes.clone(),
            temperature: self.target_temperature,
            target_temperature_step: self.profile.precision.step(),
            min_temp: self.profile.min_temperature,
            max_temp: self.profile.max_temperature,
            humidity: self.target_humidity,
            min_humidity: self.profile.min_humidity,
            max_humidity: self.profile.max_humidity,
            current_temperature: self.current_temperature,
            current_humidity: self.current_humidity,
            attributes: self.attributes(now_ms, now),
        }
    }

    fn apply_hvac_mode(&mut self, mode: HvacMode) -> Vec<EngineAction> {
        self.hvac_mode = mode;
        if HvacMode::OPERATING.contains(&mode) {
            self.last_on_operation = Some(mode);
        }

        let mut actions = Vec::new();
        if !mode.is_off() && self.power_switch {
            actions.push(EngineAction::RequestPower(true));
        }
        actions.push(self.send_command());
        actions.push(EngineAction::PublishState);
        if mode.is_off() && self.power_switch {
            actions.push(EngineAction::RequestPower(false));
        }
        actions
    }

    fn observe(&mut self, observation: Observation) {
        self.last_observed_ms = observation.now_ms;
        if observation.power_meter.is_some() {
            self.power_meter = observation.power_meter;
        }
    }

    fn regulate(&mut self) -> Result<bool, ClimateError> {
        let Some(current) = self.current_temperature else {
            return Ok(false);
        };

        let input = RegulatorInput {
            mode: self.hvac_mode,
            target: self.target_temperature,
            current,
            climate_target: self.target_temperature_climate,
            run_time_secs: self.power.run_time_secs(self.last_observed_ms),
            power_meter: self.power_meter.unwrap_or(0.0),
        };

        match self.regulator.evaluate(input, &self.profile) {
            Regulation::Adjust { mode, temperature } => {
                self.hvac_mode = mode;
                self.target_temperature_climate = temperature;
                Ok(true)
            }
            Regulation::OutOfRange { temperature } => Err(ClimateError::RegulationOutOfRange {
                value: temperature,
                min: self.profile.min_temperature,
                max: self.profile.max_temperature,
            }),
            Regulation::Inactive | Regulation::Unchanged | Regulation::Suppressed { .. } => {
                Ok(false)
            }
        }
    }

    fn command_actions(&mut self) -> Vec<EngineAction> {
        if self.hvac_mode.is_off() {
            return Vec::new();
        }
        vec![self.send_command()]
    }

    fn resend_and_publish(&mut self) -> Vec<EngineAction> {
        let mut actions = self.command_actions();
        actions.push(EngineAction::PublishState);
        actions
    }

    fn send_command(&mut self) -> EngineAction {
        self.on_by_remote = false;
        EngineAction::SendCommand(CommandRequest {
            mode: self.hvac_mode,
            fan_mode: self.fan_mode.clone(),
            swing_mode: self.swing_mode.clone(),
            temperature: self.target_temperature_climate,
        })
    }
}

fn parse_reading(sensor: &'static str, state: &SensorState) -> Result<Option<f32>, ClimateError> {
    let Some(raw) = state.value() else {
        return Ok(None);
    };

    match raw.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(ClimateError::SensorParse {
            sensor,
            value: raw.to_string(),
        }),
    }
}
