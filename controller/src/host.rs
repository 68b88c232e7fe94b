use std::{collections::HashMap, net::SocketAddr, time::Duration};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{info, warn};

use climate_common::{
    ClimateConfig, ClimateEngine, ClimateError, HvacMode, NetworkConfig, RuntimeConfig,
};

use crate::{
    controller::{ClimateController, ControllerOptions, SensorEvent, SensorKind},
    mqtt::{MqttRelay, MqttRemote, MqttStateSink, SensorCache},
    store::AppStore,
};

type MqttClimateController = ClimateController<MqttRemote, MqttRelay, SensorCache, MqttStateSink>;

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const STARTUP_SENSOR_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone)]
struct AppState {
    controller: MqttClimateController,
}

#[derive(Debug, Clone)]
struct SensorTopics {
    temperature: Option<String>,
    humidity: Option<String>,
    power: Option<String>,
    power_meter: Option<String>,
}

impl SensorTopics {
    fn from_config(config: &ClimateConfig) -> Self {
        Self {
            temperature: config.temperature_sensor.clone(),
            humidity: config.humidity_sensor.clone(),
            power: config.power_sensor.clone(),
            power_meter: config.power_meter_sensor.clone(),
        }
    }

    fn all(&self) -> impl Iterator<Item = &str> {
        [
            &self.temperature,
            &self.humidity,
            &self.power,
            &self.power_meter,
        ]
        .into_iter()
        .filter_map(|topic| topic.as_deref())
    }

    fn kind(&self, topic: &str) -> Option<SensorKind> {
        let is = |candidate: &Option<String>| candidate.as_deref() == Some(topic);
        if is(&self.temperature) {
            Some(SensorKind::Temperature)
        } else if is(&self.humidity) {
            Some(SensorKind::Humidity)
        } else if is(&self.power) {
            Some(SensorKind::Power)
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.climate.sanitize();

    let profile = store
        .load_profile(runtime.climate.device_code)
        .await
        .with_context(|| format!("no usable device code {}", runtime.climate.device_code))?;
    info!(
        "loaded device {} ({} {})",
        runtime.climate.device_code,
        profile.manufacturer,
        profile.supported_models.join(", ")
    );

    let mut engine = ClimateEngine::new(profile, &runtime.climate);
    match store.load_snapshot().await {
        Ok(Some(snapshot)) => {
            engine.restore(&snapshot);
            info!("restored {} state", engine.hvac_mode());
        }
        Ok(None) => {}
        Err(err) => warn!("failed to load climate snapshot: {err:#}"),
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options(&runtime.network), 64);
    let cache = SensorCache::new();
    let relay = runtime
        .climate
        .power_sensor_switch
        .then(|| MqttRelay::new(mqtt.clone(), cache.clone()));

    let (controller, events) = ClimateController::new(
        engine,
        MqttRemote::new(mqtt.clone(), runtime.climate.controller_data.clone()),
        relay,
        cache.clone(),
        MqttStateSink::new(mqtt.clone(), runtime.network.state_topic.clone(), store),
        ControllerOptions::from(&runtime.climate),
    );

    let topics = SensorTopics::from_config(&runtime.climate);
    subscribe_topics(&mqtt, &topics).await?;
    let (sensor_events, sensor_receiver) = mpsc::unbounded_channel();
    spawn_mqtt_loop(sensor_events, cache, topics, eventloop);

    let sensor_worker = controller.clone();
    tokio::spawn(async move { sensor_worker.drain_sensor_events(sensor_receiver).await });

    let dispatcher = controller.clone();
    tokio::spawn(async move { dispatcher.dispatch(events).await });

    let starter = controller.clone();
    tokio::spawn(async move {
        tokio::time::sleep(STARTUP_SENSOR_GRACE).await;
        starter.startup().await;
    });

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/hvac_mode", post(handle_set_hvac_mode))
        .route("/api/temperature", post(handle_set_temperature))
        .route("/api/humidity", post(handle_set_humidity))
        .route("/api/fan_mode", post(handle_set_fan_mode))
        .route("/api/swing_mode", post(handle_set_swing_mode))
        .route("/api/turn_on", post(handle_turn_on))
        .route("/api/turn_off", post(handle_turn_off))
        .with_state(AppState { controller });

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn mqtt_options(network: &NetworkConfig) -> MqttOptions {
    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(network.mqtt_port);

    let mut options = MqttOptions::new(network.mqtt_client_id.clone(), mqtt_host, mqtt_port);
    options.set_keep_alive(Duration::from_secs(30));
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        options.set_credentials(mqtt_user, mqtt_pass);
    }
    options
}

async fn subscribe_topics(mqtt: &AsyncClient, topics: &SensorTopics) -> anyhow::Result<()> {
    for topic in topics.all() {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(
    sensor_events: mpsc::UnboundedSender<SensorEvent>,
    cache: SensorCache,
    topics: SensorTopics,
    mut eventloop: rumqttc::EventLoop,
) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) = handle_mqtt_message(
                        &sensor_events,
                        &cache,
                        &topics,
                        message.topic,
                        message.payload.to_vec(),
                    )
                    .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

async fn handle_mqtt_message(
    sensor_events: &mpsc::UnboundedSender<SensorEvent>,
    cache: &SensorCache,
    topics: &SensorTopics,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let state = cache.update(&topic, &message).await;

    // Handlers wait on transmissions and relay read-backs that need this
    // loop to keep polling, so they run on the sensor worker.
    if let Some(kind) = topics.kind(&topic) {
        sensor_events.send((kind, state)).context("sensor worker stopped")?;
    }

    Ok(())
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.controller.status().await)
}

async fn handle_set_hvac_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(mode) = value.parse::<HvacMode>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid hvac mode");
    };

    let result = state.controller.set_hvac_mode(mode).await;
    respond(&state, result).await
}

async fn handle_set_temperature(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let target = match float_param(&params) {
        Ok(target) => target,
        Err(response) => return response,
    };
    let hvac_mode = match params.get("hvac_mode").map(|raw| raw.parse::<HvacMode>()) {
        None => None,
        Some(Ok(mode)) => Some(mode),
        Some(Err(_)) => return error_response(StatusCode::BAD_REQUEST, "Invalid hvac mode"),
    };

    let result = state.controller.set_temperature(target, hvac_mode).await;
    respond(&state, result).await
}

async fn handle_set_humidity(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let humidity = match float_param(&params) {
        Ok(humidity) => humidity,
        Err(response) => return response,
    };

    let result = state.controller.set_humidity(humidity).await;
    respond(&state, result).await
}

async fn handle_set_fan_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    let result = state.controller.set_fan_mode(value).await;
    respond(&state, result).await
}

async fn handle_set_swing_mode(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };

    let result = state.controller.set_swing_mode(value).await;
    respond(&state, result).await
}

async fn handle_turn_on(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.controller.turn_on().await;
    respond(&state, result).await
}

async fn handle_turn_off(State(state): State<AppState>) -> impl IntoResponse {
    let result = state.controller.turn_off().await;
    respond(&state, result).await
}

async fn respond(state: &AppState, result: Result<(), ClimateError>) -> axum::response::Response {
    match result {
        Ok(()) => Json(state.controller.status().await).into_response(),
        Err(err) => error_response(StatusCode::BAD_REQUEST, &err.to_string()),
    }
}

fn float_param(params: &HashMap<String, String>) -> Result<f32, axum::response::Response> {
    let Some(value) = params.get("value") else {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Missing 'value' parameter",
        ));
    };
    match value.parse::<f32>() {
        Ok(parsed) if parsed.is_finite() => Ok(parsed),
        _ => Err(error_response(StatusCode::BAD_REQUEST, "Invalid numeric value")),
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use climate_common::SensorState;

    use crate::ports::SensorBus;

    use super::*;

    fn topics() -> SensorTopics {
        SensorTopics {
            temperature: Some("sensor/room".to_string()),
            humidity: None,
            power: Some("switch/ac".to_string()),
            power_meter: Some("sensor/ac_power".to_string()),
        }
    }

    #[tokio::test]
    async fn back_to_back_messages_queue_in_arrival_order() {
        let (events, mut receiver) = mpsc::unbounded_channel();
        let cache = SensorCache::new();
        let topics = topics();

        for payload in ["26", "24"] {
            handle_mqtt_message(
                &events,
                &cache,
                &topics,
                "sensor/room".to_string(),
                payload.as_bytes().to_vec(),
            )
            .await
            .unwrap();
        }
        drop(events);

        let mut queued = Vec::new();
        while let Some(event) = receiver.recv().await {
            queued.push(event);
        }
        assert_eq!(
            queued,
            vec![
                (SensorKind::Temperature, SensorState::Value("26".to_string())),
                (SensorKind::Temperature, SensorState::Value("24".to_string())),
            ]
        );
        assert_eq!(
            cache.read_state("sensor/room").await,
            SensorState::Value("24".to_string())
        );
    }

    #[tokio::test]
    async fn meter_and_oversized_messages_only_touch_cache() {
        let (events, mut receiver) = mpsc::unbounded_channel();
        let cache = SensorCache::new();
        let topics = topics();

        handle_mqtt_message(
            &events,
            &cache,
            &topics,
            "sensor/ac_power".to_string(),
            b"850".to_vec(),
        )
        .await
        .unwrap();
        handle_mqtt_message(
            &events,
            &cache,
            &topics,
            "switch/ac".to_string(),
            vec![b'x'; MAX_MQTT_PAYLOAD_BYTES + 1],
        )
        .await
        .unwrap();
        drop(events);

        assert_eq!(receiver.recv().await, None);
        assert_eq!(
            cache.read_state("sensor/ac_power").await,
            SensorState::Value("850".to_string())
        );
        assert_eq!(cache.read_state("switch/ac").await, SensorState::Unknown);
    }
}
