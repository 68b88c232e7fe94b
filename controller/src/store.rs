use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use climate_common::{ClimateSnapshot, DeviceProfile, RuntimeConfig};

#[derive(Clone)]
pub struct AppStore {
    runtime_path: Arc<PathBuf>,
    snapshot_path: Arc<PathBuf>,
    codes_dir: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn new() -> Self {
        let data_dir = std::env::var("CLIMATE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.climate"));
        Self::at(data_dir)
    }

    pub fn at(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            snapshot_path: Arc::new(data_dir.join("snapshot.json")),
            codes_dir: Arc::new(data_dir.join("codes")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        Ok(read_json(&self.runtime_path).await?.unwrap_or_default())
    }

    pub async fn load_snapshot(&self) -> anyhow::Result<Option<ClimateSnapshot>> {
        let _guard = self.lock.lock().await;
        read_json(&self.snapshot_path).await
    }

    pub async fn save_snapshot(&self, snapshot: &ClimateSnapshot) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.snapshot_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }

    pub async fn load_profile(&self, device_code: u32) -> anyhow::Result<DeviceProfile> {
        let path = self.codes_dir.join(format!("{device_code}.json"));
        let raw = tokio::fs::read(&path)
            .await
            .with_context(|| format!("device file {} not found", path.display()))?;
        DeviceProfile::from_slice(&raw)
            .with_context(|| format!("failed to load device file {}", path.display()))
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(Some(serde_json::from_slice::<T>(&raw)?)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}
