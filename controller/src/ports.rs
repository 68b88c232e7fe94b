use std::future::Future;

use climate_common::{ClimateSnapshot, ClimateStatus, CommandPayload, SensorState};

pub trait RemoteController: Send + Sync + 'static {
    fn transmit(
        &self,
        payload: &CommandPayload,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

pub trait PowerRelay: Send + Sync + 'static {
    fn switch(
        &self,
        entity: &str,
        on: bool,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    fn is_on(&self, entity: &str) -> impl Future<Output = anyhow::Result<bool>> + Send;
}

pub trait SensorBus: Send + Sync + 'static {
    fn read_state(&self, entity: &str) -> impl Future<Output = SensorState> + Send;
}

pub trait StateSink: Send + Sync + 'static {
    fn publish(
        &self,
        status: &ClimateStatus,
        snapshot: &ClimateSnapshot,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}
