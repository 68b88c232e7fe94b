use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
    sync::{mpsc, Mutex},
    time::Instant,
};
use tracing::{debug, info, warn};

use climate_common::{
    parse_power_meter, ClimateConfig, ClimateEngine, ClimateError, ClimateStatus, CommandRequest,
    CommandStep, EngineAction, HvacMode, Observation, SensorState,
};

use crate::{
    deferred::Deferred,
    ports::{PowerRelay, RemoteController, SensorBus, StateSink},
};

#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    ResumeMode(HvacMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Temperature,
    Humidity,
    Power,
}

pub type SensorEvent = (SensorKind, SensorState);

#[derive(Debug, Clone, Default)]
pub struct SensorEntities {
    pub temperature: Option<String>,
    pub humidity: Option<String>,
    pub power: Option<String>,
    pub power_meter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub settle: Duration,
    pub sensors: SensorEntities,
}

impl From<&ClimateConfig> for ControllerOptions {
    fn from(config: &ClimateConfig) -> Self {
        Self {
            settle: Duration::from_secs_f32(config.delay_secs),
            sensors: SensorEntities {
                temperature: config.temperature_sensor.clone(),
                humidity: config.humidity_sensor.clone(),
                power: config.power_sensor.clone(),
                power_meter: config.power_meter_sensor.clone(),
            },
        }
    }
}

struct Inner<R, P, S, O> {
    engine: Mutex<ClimateEngine>,
    send_lock: Mutex<()>,
    remote: R,
    relay: Option<(P, String)>,
    sensors: S,
    sink: O,
    options: ControllerOptions,
    power_task: Deferred,
    resume_task: Deferred,
    events: mpsc::UnboundedSender<ControlEvent>,
    started: Instant,
}

pub struct ClimateController<R, P, S, O> {
    inner: Arc<Inner<R, P, S, O>>,
}

impl<R, P, S, O> Clone for ClimateController<R, P, S, O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R, P, S, O> ClimateController<R, P, S, O>
where
    R: RemoteController,
    P: PowerRelay,
    S: SensorBus,
    O: StateSink,
{
    pub fn new(
        engine: ClimateEngine,
        remote: R,
        relay: Option<P>,
        sensors: S,
        sink: O,
        options: ControllerOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ControlEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let relay = relay.zip(options.sensors.power.clone());
        let controller = Self {
            inner: Arc::new(Inner {
                engine: Mutex::new(engine),
                send_lock: Mutex::new(()),
                remote,
                relay,
                sensors,
                sink,
                options,
                power_task: Deferred::new(),
                resume_task: Deferred::new(),
                events,
                started: Instant::now(),
            }),
        };
        (controller, receiver)
    }

    fn now_ms(&self) -> u64 {
        self.inner
            .started
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    async fn observe(&self) -> Observation {
        let power_meter = match &self.inner.options.sensors.power_meter {
            Some(entity) => {
                let state = self.inner.sensors.read_state(entity).await;
                Some(parse_power_meter(Some(&state)))
            }
            None => None,
        };

        Observation {
            now_ms: self.now_ms(),
            power_meter,
        }
    }

    pub async fn status(&self) -> ClimateStatus {
        let engine = self.inner.engine.lock().await;
        engine.status(self.now_ms(), Utc::now())
    }

    pub async fn startup(&self) {
        let sensors = self.inner.options.sensors.clone();

        if let Some(entity) = &sensors.temperature {
            let state = self.inner.sensors.read_state(entity).await;
            self.temperature_sensor_changed(&state).await;
        }
        if let Some(entity) = &sensors.humidity {
            let state = self.inner.sensors.read_state(entity).await;
            self.humidity_sensor_changed(&state).await;
        }
        if let Some(entity) = &sensors.power {
            let state = self.inner.sensors.read_state(entity).await;
            self.power_sensor_changed(&state).await;
        }

        if let Some((relay, entity)) = &self.inner.relay {
            match relay.is_on(entity).await {
                Ok(is_on) => {
                    let now_ms = self.now_ms();
                    self.inner
                        .engine
                        .lock()
                        .await
                        .power_confirmed(is_on, is_on, now_ms);
                }
                Err(err) => warn!("failed to read relay state: {err:#}"),
            }
        }
    }

    pub async fn set_hvac_mode(&self, mode: HvacMode) -> Result<(), ClimateError> {
        let actions = { self.inner.engine.lock().await.set_hvac_mode(mode) };
        self.run(actions).await
    }

    pub async fn turn_on(&self) -> Result<(), ClimateError> {
        let actions = { self.inner.engine.lock().await.turn_on() };
        self.run(actions).await
    }

    pub async fn turn_off(&self) -> Result<(), ClimateError> {
        let actions = { self.inner.engine.lock().await.turn_off() };
        self.run(actions).await
    }

    pub async fn set_temperature(
        &self,
        value: f32,
        hvac_mode: Option<HvacMode>,
    ) -> Result<(), ClimateError> {
        let observation = self.observe().await;
        let actions = {
            self.inner
                .engine
                .lock()
                .await
                .set_temperature(value, hvac_mode, observation)
        };
        self.run(actions).await
    }

    pub async fn set_humidity(&self, value: f32) -> Result<(), ClimateError> {
        let actions = { self.inner.engine.lock().await.set_humidity(value) };
        self.run(actions).await
    }

    pub async fn set_fan_mode(&self, fan_mode: &str) -> Result<(), ClimateError> {
        let actions = { self.inner.engine.lock().await.set_fan_mode(fan_mode) };
        self.run(actions).await
    }

    pub async fn set_swing_mode(&self, swing_mode: &str) -> Result<(), ClimateError> {
        let actions = { self.inner.engine.lock().await.set_swing_mode(swing_mode) };
        self.run(actions).await
    }

    pub async fn temperature_sensor_changed(&self, state: &SensorState) {
        let observation = self.observe().await;
        let actions = {
            self.inner
                .engine
                .lock()
                .await
                .temperature_sensor_changed(state, observation)
        };
        // Rejections are already logged by `run`.
        self.run(actions).await.ok();
    }

    pub async fn humidity_sensor_changed(&self, state: &SensorState) {
        let actions = { self.inner.engine.lock().await.humidity_sensor_changed(state) };
        self.run(actions).await.ok();
    }

    pub async fn power_sensor_changed(&self, state: &SensorState) {
        let actions = { self.inner.engine.lock().await.power_sensor_changed(state) };
        self.execute(actions).await;
    }

    pub async fn sensor_changed(&self, kind: SensorKind, state: &SensorState) {
        match kind {
            SensorKind::Temperature => self.temperature_sensor_changed(state).await,
            SensorKind::Humidity => self.humidity_sensor_changed(state).await,
            SensorKind::Power => self.power_sensor_changed(state).await,
        }
    }

    // One reading at a time, in arrival order.
    pub async fn drain_sensor_events(&self, mut events: mpsc::UnboundedReceiver<SensorEvent>) {
        while let Some((kind, state)) = events.recv().await {
            debug!("{kind:?} sensor: {state:?}");
            self.sensor_changed(kind, &state).await;
        }
    }

    pub async fn handle_event(&self, event: ControlEvent) {
        match event {
            ControlEvent::ResumeMode(mode) => {
                let actions = { self.inner.engine.lock().await.resume_mode(mode) };
                self.execute(actions).await;
            }
        }
    }

    pub async fn dispatch(&self, mut events: mpsc::UnboundedReceiver<ControlEvent>) {
        while let Some(event) = events.recv().await {
            debug!("control event: {event:?}");
            self.handle_event(event).await;
        }
    }

    async fn run(
        &self,
        actions: Result<Vec<EngineAction>, ClimateError>,
    ) -> Result<(), ClimateError> {
        match actions {
            Ok(actions) => {
                self.execute(actions).await;
                Ok(())
            }
            // The user target already landed; only the appliance-facing value was refused.
            Err(err @ ClimateError::RegulationOutOfRange { .. }) => {
                warn!("regulation skipped: {err}");
                self.execute(vec![EngineAction::PublishState]).await;
                Ok(())
            }
            Err(err) => {
                warn!("rejected climate update: {err}");
                Err(err)
            }
        }
    }

    async fn execute(&self, actions: Vec<EngineAction>) {
        for action in actions {
            match action {
                EngineAction::SendCommand(request) => self.send_command(&request).await,
                EngineAction::RequestPower(on) => self.request_power(on).await,
                EngineAction::ResumeAfter { delay, mode } => {
                    self.schedule_resume(delay, mode).await
                }
                EngineAction::PublishState => self.publish_state().await,
            }
        }
    }

    async fn send_command(&self, request: &CommandRequest) {
        let _guard = self.inner.send_lock.lock().await;

        let plan = {
            let engine = self.inner.engine.lock().await;
            let profile = engine.profile();
            profile
                .commands
                .plan(request, profile.supports_swing(), self.inner.options.settle)
        };
        let steps = match plan {
            Ok(steps) => steps,
            Err(err) => {
                warn!("command for {} not sent: {err}", request.mode);
                return;
            }
        };

        for step in steps {
            match step {
                CommandStep::Transmit(payload) => {
                    if let Err(err) = self.inner.remote.transmit(&payload).await {
                        warn!("remote transmission failed: {err:#}");
                        return;
                    }
                }
                CommandStep::Settle(delay) => tokio::time::sleep(delay).await,
            }
        }
        info!(
            "sent {} fan={} temperature={}",
            request.mode, request.fan_mode, request.temperature
        );
    }

    async fn request_power(&self, on: bool) {
        let Some((relay, entity)) = &self.inner.relay else {
            return;
        };

        let relay_is_on = match relay.is_on(entity).await {
            Ok(is_on) => is_on,
            Err(err) => {
                warn!("failed to read relay state: {err:#}");
                return;
            }
        };

        let plan = { self.inner.engine.lock().await.power_plan(on, relay_is_on) };
        let Some(plan) = plan else {
            // Drops a still-waiting opposite switch; a switch already in flight
            // finishes and records its confirmation.
            self.inner.power_task.cancel().await;
            return;
        };

        debug!("relay {} in {:?}", if plan.on { "on" } else { "off" }, plan.delay);
        let controller = self.clone();
        self.inner
            .power_task
            .schedule(plan.delay, async move {
                controller.switch_relay(plan.on).await;
            })
            .await;
    }

    async fn switch_relay(&self, on: bool) {
        let Some((relay, entity)) = &self.inner.relay else {
            return;
        };

        if let Err(err) = relay.switch(entity, on).await {
            warn!("failed to switch relay {entity}: {err:#}");
            return;
        }

        match relay.is_on(entity).await {
            Ok(is_on) => {
                let now_ms = self.now_ms();
                self.inner
                    .engine
                    .lock()
                    .await
                    .power_confirmed(on, is_on, now_ms);
                info!("relay {entity} confirmed {}", if is_on { "on" } else { "off" });
            }
            Err(err) => warn!("failed to read back relay state: {err:#}"),
        }
    }

    async fn schedule_resume(&self, delay: Duration, mode: HvacMode) {
        let events = self.inner.events.clone();
        self.inner
            .resume_task
            .schedule(delay, async move {
                let _ = events.send(ControlEvent::ResumeMode(mode));
            })
            .await;
    }

    async fn publish_state(&self) {
        let (status, snapshot) = {
            let engine = self.inner.engine.lock().await;
            let now = Utc::now();
            (engine.status(self.now_ms(), now), engine.snapshot(now))
        };

        if let Err(err) = self.inner.sink.publish(&status, &snapshot).await {
            warn!("failed to publish climate state: {err:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use pretty_assertions::assert_eq;

    use climate_common::{ClimateSnapshot, CommandPayload, DeviceProfile};

    use super::*;

    const DEVICE: &str = r#"{
        "manufacturer": "Daikin",
        "supportedModels": ["FTXS25"],
        "supportedController": "MQTT",
        "commandsEncoding": "Raw",
        "minTemperature": 16,
        "maxTemperature": 30,
        "precision": 1,
        "operationModes": ["cool", "fan_only", "heat"],
        "fanModes": ["auto", "high"],
        "commands": {
            "off": "OFF",
            "on": "ON",
            "cool": {
                "auto": { "17": "C17", "23": "C23", "24": "C24" },
                "high": { "24": "CH24" }
            },
            "fan_only": { "auto": { "24": "F24", "25": "F25" } },
            "heat": { "auto": { "22": "H22" } }
        }
    }"#;

    #[derive(Default)]
    struct RecordingRemote {
        sent: StdMutex<Vec<(Duration, String)>>,
        started: StdMutex<Option<Instant>>,
        rejects: StdMutex<Option<String>>,
    }

    impl RecordingRemote {
        fn payloads(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|(_, payload)| payload.clone())
                .collect()
        }
    }

    impl RemoteController for Arc<RecordingRemote> {
        async fn transmit(&self, payload: &CommandPayload) -> anyhow::Result<()> {
            let started = *self.started.lock().unwrap().get_or_insert_with(Instant::now);
            self.sent
                .lock()
                .unwrap()
                .push((started.elapsed(), payload.as_str().to_string()));
            if self.rejects.lock().unwrap().as_deref() == Some(payload.as_str()) {
                anyhow::bail!("bridge offline");
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeRelay {
        on: StdMutex<bool>,
        switches: StdMutex<Vec<bool>>,
        settle: StdMutex<Duration>,
    }

    impl PowerRelay for Arc<FakeRelay> {
        async fn switch(&self, _entity: &str, on: bool) -> anyhow::Result<()> {
            *self.on.lock().unwrap() = on;
            self.switches.lock().unwrap().push(on);
            let settle = *self.settle.lock().unwrap();
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
            Ok(())
        }

        async fn is_on(&self, _entity: &str) -> anyhow::Result<bool> {
            Ok(*self.on.lock().unwrap())
        }
    }

    #[derive(Default)]
    struct FakeSensors {
        states: StdMutex<Vec<(String, SensorState)>>,
    }

    impl FakeSensors {
        fn set(&self, entity: &str, state: SensorState) {
            let mut states = self.states.lock().unwrap();
            states.retain(|(name, _)| name != entity);
            states.push((entity.to_string(), state));
        }
    }

    impl SensorBus for Arc<FakeSensors> {
        async fn read_state(&self, entity: &str) -> SensorState {
            self.states
                .lock()
                .unwrap()
                .iter()
                .find(|(name, _)| name == entity)
                .map(|(_, state)| state.clone())
                .unwrap_or(SensorState::Unknown)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        published: StdMutex<Vec<ClimateSnapshot>>,
    }

    impl StateSink for Arc<RecordingSink> {
        async fn publish(
            &self,
            _status: &ClimateStatus,
            snapshot: &ClimateSnapshot,
        ) -> anyhow::Result<()> {
            self.published.lock().unwrap().push(snapshot.clone());
            Ok(())
        }
    }

    type TestController = ClimateController<
        Arc<RecordingRemote>,
        Arc<FakeRelay>,
        Arc<FakeSensors>,
        Arc<RecordingSink>,
    >;

    struct Harness {
        controller: TestController,
        events: mpsc::UnboundedReceiver<ControlEvent>,
        remote: Arc<RecordingRemote>,
        relay: Arc<FakeRelay>,
        sensors: Arc<FakeSensors>,
        sink: Arc<RecordingSink>,
    }

    fn harness(config: ClimateConfig) -> Harness {
        let profile = DeviceProfile::from_json(DEVICE).unwrap();
        let engine = ClimateEngine::new(profile, &config);
        let remote = Arc::new(RecordingRemote::default());
        let relay = Arc::new(FakeRelay::default());
        let sensors = Arc::new(FakeSensors::default());
        let sink = Arc::new(RecordingSink::default());
        let relay_port = config.power_sensor_switch.then(|| relay.clone());

        let (controller, events) = ClimateController::new(
            engine,
            remote.clone(),
            relay_port,
            sensors.clone(),
            sink.clone(),
            ControllerOptions::from(&config),
        );

        Harness {
            controller,
            events,
            remote,
            relay,
            sensors,
            sink,
        }
    }

    fn switched() -> ClimateConfig {
        ClimateConfig {
            power_sensor: Some("switch.ac".to_string()),
            power_sensor_switch: true,
            ..ClimateConfig::default()
        }
    }

    fn reading(value: &str) -> SensorState {
        SensorState::Value(value.to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn wake_pulse_precedes_mode_payload() {
        let h = harness(ClimateConfig::default());
        h.controller.set_hvac_mode(HvacMode::Cool).await.unwrap();
        h.controller.set_temperature(17.4, None).await.unwrap();

        let sent = h.remote.sent.lock().unwrap().clone();
        let payloads: Vec<&str> = sent.iter().map(|(_, p)| p.as_str()).collect();
        // The first cool command targets 16, which the table does not program.
        assert_eq!(payloads, vec!["ON", "C17"]);
        assert!(sent[1].0 - sent[0].0 >= Duration::from_millis(500));
        assert_eq!(h.controller.status().await.temperature, 17.0);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_range_target_transmits_nothing() {
        let h = harness(ClimateConfig::default());
        h.controller.set_hvac_mode(HvacMode::Cool).await.unwrap();
        h.controller.set_temperature(24.0, None).await.unwrap();
        let before = h.remote.payloads();
        let published = h.sink.published.lock().unwrap().len();

        let err = h.controller.set_temperature(35.0, None).await.unwrap_err();

        assert!(matches!(err, ClimateError::TemperatureOutOfRange { .. }));
        assert_eq!(h.remote.payloads(), before);
        assert_eq!(h.sink.published.lock().unwrap().len(), published);
        assert_eq!(h.controller.status().await.temperature, 24.0);
    }

    #[tokio::test(start_paused = true)]
    async fn off_sends_single_payload_and_persists() {
        let h = harness(ClimateConfig::default());
        h.controller.turn_off().await.unwrap();

        assert_eq!(h.remote.payloads(), vec!["OFF"]);
        let published = h.sink.published.lock().unwrap();
        assert_eq!(published.last().and_then(|s| s.hvac_mode), Some(HvacMode::Off));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_commands_do_not_interleave() {
        let h = harness(ClimateConfig::default());
        h.controller.set_hvac_mode(HvacMode::Cool).await.unwrap();
        h.controller.set_temperature(24.0, None).await.unwrap();
        h.remote.sent.lock().unwrap().clear();

        let first = h.controller.clone();
        let second = h.controller.clone();
        let (a, b) = tokio::join!(first.set_fan_mode("high"), second.set_fan_mode("high"));
        a.unwrap();
        b.unwrap();

        assert_eq!(h.remote.payloads(), vec!["ON", "CH24", "ON", "CH24"]);
    }

    #[tokio::test(start_paused = true)]
    async fn relay_switches_after_delay_and_starts_run_time() {
        let h = harness(switched());
        h.controller.set_hvac_mode(HvacMode::Cool).await.unwrap();
        assert!(h.relay.switches.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(*h.relay.switches.lock().unwrap(), vec![true]);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let status = h.controller.status().await;
        assert!(status.attributes.run_time_secs >= 60);
        assert!(status.attributes.power_on_since.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn relay_confirmation_survives_request_during_switch() {
        let h = harness(switched());
        *h.relay.settle.lock().unwrap() = Duration::from_secs(1);
        h.controller.set_hvac_mode(HvacMode::Cool).await.unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(*h.relay.on.lock().unwrap());
        assert_eq!(h.controller.status().await.attributes.power_on_since, None);

        h.controller.set_hvac_mode(HvacMode::Heat).await.unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;

        let status = h.controller.status().await;
        assert!(status.attributes.power_on_since.is_some());
        assert!(status.attributes.run_time_secs >= 60);
        assert_eq!(*h.relay.switches.lock().unwrap(), vec![true]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_transmission_drops_rest_of_sequence() {
        let h = harness(ClimateConfig::default());
        h.controller.set_hvac_mode(HvacMode::Cool).await.unwrap();
        *h.remote.rejects.lock().unwrap() = Some("ON".to_string());

        h.controller.set_temperature(24.0, None).await.unwrap();
        assert_eq!(h.remote.payloads(), vec!["ON"]);
        assert_eq!(h.controller.status().await.temperature, 24.0);

        *h.remote.rejects.lock().unwrap() = None;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.remote.payloads(), vec!["ON"]);

        h.controller.set_fan_mode("auto").await.unwrap();
        assert_eq!(h.remote.payloads(), vec!["ON", "ON", "C24"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_on_off_leaves_single_relay_toggle() {
        let h = harness(switched());
        h.controller.set_hvac_mode(HvacMode::Cool).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        h.controller.turn_off().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        h.controller.turn_on().await.unwrap();
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(*h.relay.switches.lock().unwrap(), vec![true]);
        assert!(*h.relay.on.lock().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn relay_off_resets_run_time() {
        let h = harness(switched());
        h.controller.set_hvac_mode(HvacMode::Cool).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        h.controller.turn_off().await.unwrap();
        tokio::time::sleep(Duration::from_secs(121)).await;

        assert_eq!(*h.relay.switches.lock().unwrap(), vec![true, false]);
        let status = h.controller.status().await;
        assert_eq!(status.attributes.run_time_secs, 0);
        assert_eq!(status.attributes.power_on_since, None);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_sensor_reading_is_not_resent() {
        let config = ClimateConfig {
            temperature_sensor: Some("sensor.room".to_string()),
            use_temperature_sensor: true,
            ..ClimateConfig::default()
        };
        let h = harness(config);
        h.controller.set_hvac_mode(HvacMode::Cool).await.unwrap();
        h.controller.temperature_sensor_changed(&reading("26")).await;
        h.controller.set_temperature(24.0, None).await.unwrap();
        h.remote.sent.lock().unwrap().clear();

        h.controller.temperature_sensor_changed(&reading("26")).await;
        h.controller.temperature_sensor_changed(&reading("26")).await;

        assert!(h.remote.payloads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_sensor_readings_apply_in_arrival_order() {
        let h = harness(ClimateConfig {
            temperature_sensor: Some("sensor.room".to_string()),
            ..switched()
        });
        h.controller.set_hvac_mode(HvacMode::Cool).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let (events, receiver) = mpsc::unbounded_channel();
        let drain = h.controller.clone();
        let worker = tokio::spawn(async move { drain.drain_sensor_events(receiver).await });

        events.send((SensorKind::Temperature, reading("26"))).unwrap();
        events.send((SensorKind::Temperature, reading("24"))).unwrap();
        events.send((SensorKind::Power, reading("off"))).unwrap();
        events.send((SensorKind::Power, reading("on"))).unwrap();
        drop(events);
        worker.await.unwrap();

        let status = h.controller.status().await;
        assert_eq!(status.current_temperature, Some(24.0));
        assert_eq!(status.hvac_mode, HvacMode::On);
        assert!(status.attributes.on_by_remote);
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_sensor_value_keeps_previous_reading() {
        let h = harness(ClimateConfig {
            humidity_sensor: Some("sensor.humidity".to_string()),
            ..ClimateConfig::default()
        });
        h.controller.humidity_sensor_changed(&reading("41")).await;
        h.controller.humidity_sensor_changed(&reading("damp")).await;
        h.controller
            .humidity_sensor_changed(&SensorState::Unavailable)
            .await;

        assert_eq!(h.controller.status().await.current_humidity, Some(41.0));
    }

    #[tokio::test(start_paused = true)]
    async fn startup_reads_configured_sensors() {
        let config = ClimateConfig {
            temperature_sensor: Some("sensor.room".to_string()),
            humidity_sensor: Some("sensor.humidity".to_string()),
            power_meter_sensor: Some("sensor.power".to_string()),
            ..ClimateConfig::default()
        };
        let h = harness(config);
        h.sensors.set("sensor.room", reading("22.5"));
        h.sensors.set("sensor.humidity", reading("55"));
        h.sensors.set("sensor.power", reading("12"));

        h.controller.startup().await;

        let status = h.controller.status().await;
        assert_eq!(status.current_temperature, Some(22.5));
        assert_eq!(status.current_humidity, Some(55.0));
    }

    #[tokio::test(start_paused = true)]
    async fn remote_power_on_resumes_through_event_loop() {
        let mut h = harness(ClimateConfig {
            power_sensor_restore_state: true,
            ..switched()
        });
        h.controller.set_hvac_mode(HvacMode::Heat).await.unwrap();
        h.controller.set_temperature(22.0, None).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        h.controller.turn_off().await.unwrap();
        tokio::time::sleep(Duration::from_secs(121)).await;
        h.controller.power_sensor_changed(&reading("off")).await;
        h.remote.sent.lock().unwrap().clear();

        *h.relay.on.lock().unwrap() = true;
        h.controller.power_sensor_changed(&reading("on")).await;
        assert!(h.controller.status().await.attributes.on_by_remote);
        assert!(h.remote.payloads().is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        let event = h.events.recv().await.unwrap();
        assert_eq!(event, ControlEvent::ResumeMode(HvacMode::Heat));
        h.controller.handle_event(event).await;

        assert_eq!(h.remote.payloads(), vec!["ON", "H22"]);
        let status = h.controller.status().await;
        assert_eq!(status.hvac_mode, HvacMode::Heat);
        assert!(!status.attributes.on_by_remote);
    }
}
