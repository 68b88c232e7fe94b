use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::Context;
use rumqttc::{AsyncClient, QoS};
use tokio::sync::RwLock;
use tracing::debug;

use climate_common::{ClimateSnapshot, ClimateStatus, CommandPayload, SensorState};

use crate::{
    ports::{PowerRelay, RemoteController, SensorBus, StateSink},
    store::AppStore,
};

const RELAY_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);
const RELAY_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct MqttRemote {
    client: AsyncClient,
    topic: String,
}

impl MqttRemote {
    pub fn new(client: AsyncClient, topic: impl Into<String>) -> Self {
        Self {
            client,
            topic: topic.into(),
        }
    }
}

impl RemoteController for MqttRemote {
    async fn transmit(&self, payload: &CommandPayload) -> anyhow::Result<()> {
        self.client
            .publish(
                self.topic.as_str(),
                QoS::AtLeastOnce,
                false,
                payload.as_str().as_bytes().to_vec(),
            )
            .await
            .with_context(|| format!("failed to publish command to {}", self.topic))
    }
}

#[derive(Clone, Default)]
pub struct SensorCache {
    states: Arc<RwLock<HashMap<String, SensorState>>>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, entity: &str, raw: &str) -> SensorState {
        let state = SensorState::from_raw(raw);
        self.states
            .write()
            .await
            .insert(entity.to_string(), state.clone());
        state
    }
}

impl SensorBus for SensorCache {
    async fn read_state(&self, entity: &str) -> SensorState {
        self.states
            .read()
            .await
            .get(entity)
            .cloned()
            .unwrap_or(SensorState::Unknown)
    }
}

pub struct MqttRelay {
    client: AsyncClient,
    cache: SensorCache,
}

impl MqttRelay {
    pub fn new(client: AsyncClient, cache: SensorCache) -> Self {
        Self { client, cache }
    }

    async fn reported(&self, entity: &str) -> Option<bool> {
        self.cache.read_state(entity).await.switch_state()
    }
}

impl PowerRelay for MqttRelay {
    async fn switch(&self, entity: &str, on: bool) -> anyhow::Result<()> {
        let topic = format!("{entity}/set");
        let payload = if on { "ON" } else { "OFF" };
        self.client
            .publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
            .await
            .with_context(|| format!("failed to publish relay command to {topic}"))?;

        // Give the device a moment to report back before the caller reads it.
        let confirmed = tokio::time::timeout(RELAY_CONFIRM_TIMEOUT, async {
            while self.reported(entity).await != Some(on) {
                tokio::time::sleep(RELAY_POLL_INTERVAL).await;
            }
        })
        .await;
        if confirmed.is_err() {
            debug!("relay {entity} did not report {payload} in time");
        }
        Ok(())
    }

    async fn is_on(&self, entity: &str) -> anyhow::Result<bool> {
        Ok(self.reported(entity).await.unwrap_or(false))
    }
}

pub struct MqttStateSink {
    client: AsyncClient,
    topic: String,
    store: AppStore,
}

impl MqttStateSink {
    pub fn new(client: AsyncClient, topic: impl Into<String>, store: AppStore) -> Self {
        Self {
            client,
            topic: topic.into(),
            store,
        }
    }
}

impl StateSink for MqttStateSink {
    async fn publish(
        &self,
        status: &ClimateStatus,
        snapshot: &ClimateSnapshot,
    ) -> anyhow::Result<()> {
        self.store
            .save_snapshot(snapshot)
            .await
            .context("failed to persist climate snapshot")?;

        let body = serde_json::to_vec(status)?;
        self.client
            .publish(self.topic.as_str(), QoS::AtLeastOnce, true, body)
            .await
            .with_context(|| format!("failed to publish state to {}", self.topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cache_tracks_latest_payload() {
        let cache = SensorCache::new();
        assert_eq!(cache.read_state("sensor/room").await, SensorState::Unknown);

        cache.update("sensor/room", "21.5").await;
        cache.update("sensor/room", "22").await;
        assert_eq!(
            cache.read_state("sensor/room").await,
            SensorState::Value("22".to_string())
        );

        cache.update("sensor/room", "unavailable").await;
        assert_eq!(
            cache.read_state("sensor/room").await,
            SensorState::Unavailable
        );
    }

    #[tokio::test]
    async fn relay_state_comes_from_cached_entity() {
        let (client, _eventloop) =
            AsyncClient::new(rumqttc::MqttOptions::new("test", "localhost", 1883), 8);
        let cache = SensorCache::new();
        let relay = MqttRelay::new(client, cache.clone());

        assert!(!relay.is_on("switch/ac").await.unwrap());
        cache.update("switch/ac", "ON").await;
        assert!(relay.is_on("switch/ac").await.unwrap());
    }
}
