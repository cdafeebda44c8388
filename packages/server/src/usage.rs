//! Usage accounting sink.

use async_trait::async_trait;
use septic_map_lookup::StoreError;
use septic_map_lookup::store::{UsageEntry, UsageRecorder};

/// Writes each lookup as one JSON line to the `usage` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogUsageRecorder;

#[async_trait]
impl UsageRecorder for LogUsageRecorder {
    async fn record(&self, entry: &UsageEntry) -> Result<(), StoreError> {
        let line = serde_json::to_string(entry).map_err(|e| StoreError::Backend {
            message: e.to_string(),
        })?;
        log::info!(target: "usage", "{line}");
        Ok(())
    }
}
