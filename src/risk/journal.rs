//! JSON-lines journal for risk events

use super::{RiskEvent, RiskEventLog, StoreError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends each risk event as one JSON line
pub struct JsonlJournal {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlJournal {
    /// Open (or create) the journal file for appending
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RiskEventLog for JsonlJournal {
    async fn append(&self, events: &[RiskEvent]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut buffer = Vec::new();
        for event in events {
            serde_json::to_writer(&mut buffer, event)
                .map_err(|e| StoreError::Write(e.to_string()))?;
            buffer.push(b'\n');
        }

        let mut file = self.file.lock().await;
        file.write_all(&buffer)
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(())
    }
}

/// Writes every event to each of several logs
pub struct FanoutEventLog {
    sinks: Vec<Arc<dyn RiskEventLog>>,
}

impl FanoutEventLog {
    pub fn new(sinks: Vec<Arc<dyn RiskEventLog>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl RiskEventLog for FanoutEventLog {
    async fn append(&self, events: &[RiskEvent]) -> Result<(), StoreError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.append(events).await {
                tracing::error!(error = %e, "Risk event sink failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
