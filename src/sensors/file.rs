//! File-backed sensor provider
//!
//! Reads a JSON snapshot written by an external exporter. The file holds
//! either a bare array of readings or an object with a `readings` array.
//! It is re-read on every poll.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use super::{SensorProvider, SensorReading};

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    List(Vec<SensorReading>),
    Wrapped { readings: Vec<SensorReading> },
}

impl SnapshotFile {
    fn into_readings(self) -> Vec<SensorReading> {
        match self {
            Self::List(readings) | Self::Wrapped { readings } => readings,
        }
    }
}

pub struct FileSensorProvider {
    path: PathBuf,
    connected: AtomicBool,
}

impl FileSensorProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Vec<SensorReading>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading sensor snapshot {}", self.path.display()))?;
        let snapshot: SnapshotFile = serde_json::from_str(&content)
            .with_context(|| format!("parsing sensor snapshot {}", self.path.display()))?;
        Ok(snapshot.into_readings())
    }
}

#[async_trait]
impl SensorProvider for FileSensorProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn connect(&self) -> Result<()> {
        let readings = self.load().await?;
        self.connected.store(true, Ordering::SeqCst);
        info!(
            "Sensor snapshot {} opened ({} readings)",
            self.path.display(),
            readings.len()
        );
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn readings(&self) -> Result<Vec<SensorReading>> {
        if !self.connected.load(Ordering::SeqCst) {
            bail!("sensor snapshot provider is not connected");
        }
        match self.load().await {
            Ok(readings) => {
                debug!("Loaded {} readings", readings.len());
                Ok(readings)
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SNAPSHOT: &str = r#"[
        {"sensor_id":1,"sensor_name":"CPU","entry_id":10,"entry_name":"Package","value":55.0,"unit":"°C","category":"temperature"},
        {"sensor_id":1,"sensor_name":"CPU","entry_id":11,"entry_name":"Total Load","value":12.5,"unit":"%","category":"load"}
    ]"#;

    #[tokio::test]
    async fn test_reads_array_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();

        let provider = FileSensorProvider::new(file.path());
        assert!(!provider.is_connected().await);
        assert!(provider.readings().await.is_err());

        provider.connect().await.unwrap();
        assert!(provider.is_connected().await);
        let readings = provider.readings().await.unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].entry_name, "Package");
    }

    #[tokio::test]
    async fn test_reads_wrapped_snapshot() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"readings": {}}}"#, SNAPSHOT).unwrap();

        let provider = FileSensorProvider::new(file.path());
        provider.connect().await.unwrap();
        let loads = provider
            .readings_by_category(crate::sensors::SensorCategory::Load)
            .await
            .unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].value, 12.5);
    }

    #[tokio::test]
    async fn test_missing_file_fails_connect() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FileSensorProvider::new(dir.path().join("missing.json"));
        assert!(provider.connect().await.is_err());
        assert!(!provider.is_connected().await);
    }

    #[tokio::test]
    async fn test_vanished_file_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensors.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let provider = FileSensorProvider::new(&path);
        provider.connect().await.unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(provider.readings().await.is_err());
        assert!(!provider.is_connected().await);
    }
}
