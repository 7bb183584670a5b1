//! Saving and restoring experiment sessions.
//!
//! A snapshot is the whole restorable state: the dataset plus the adaptive
//! engine's parameter tree, tagged with the run id and a creation timestamp.
//! Snapshots are plain JSON so they can be inspected and diffed; a restored
//! snapshot is fed back through `PushData`/`SetParameter`.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::Data;
use crate::error::CoreResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub run_id: String,
    pub created: DateTime<Utc>,
    pub data: Data,
    pub parameters: serde_json::Value,
}

impl Snapshot {
    pub fn new(run_id: impl Into<String>, data: Data, parameters: serde_json::Value) -> Self {
        Self {
            run_id: run_id.into(),
            created: Utc::now(),
            data,
            parameters,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> CoreResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        info!(path = %path.display(), observations = self.data.len(), "snapshot saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let snapshot = serde_json::from_reader(file)?;
        Ok(snapshot)
    }
}
