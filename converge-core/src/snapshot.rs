//! Last successfully applied spec, persisted in a record annotation.
//!
//! The snapshot travels with the record, so saving it is part of the same
//! versioned write as the status that the provider acknowledgment produced.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::Metadata;

/// Annotation key holding the serialized snapshot.
pub const SNAPSHOT_ANNOTATION: &str = "converge.io/last-successful-spec";

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The annotation exists but does not decode.
    #[error("corrupt snapshot annotation: {0}")]
    Corrupt(String),

    #[error("failed to encode snapshot: {0}")]
    Encode(String),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S> {
    /// Starts at 1 and grows by one per save.
    pub generation: u64,
    pub spec: S,
}

impl<S> Snapshot<S> {
    pub fn first(spec: S) -> Self {
        Self {
            generation: 1,
            spec,
        }
    }

    pub fn next(&self, spec: S) -> Self {
        Self {
            generation: self.generation + 1,
            spec,
        }
    }
}

/// Reads and writes the snapshot annotation of a record.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    key: String,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(SNAPSHOT_ANNOTATION)
    }
}

impl SnapshotStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// `Ok(None)` when no annotation exists yet.
    pub fn load<S: DeserializeOwned>(&self, metadata: &Metadata) -> Result<Option<Snapshot<S>>> {
        match metadata.annotations.get(&self.key) {
            None => Ok(None),
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| SnapshotError::Corrupt(e.to_string())),
        }
    }

    /// Only edits `metadata`; persisting is the caller's versioned write.
    pub fn save<S: Serialize>(&self, metadata: &mut Metadata, snapshot: &Snapshot<S>) -> Result<()> {
        let raw = serde_json::to_string(snapshot).map_err(|e| SnapshotError::Encode(e.to_string()))?;
        metadata.annotations.insert(self.key.clone(), raw);
        Ok(())
    }

    pub fn clear(&self, metadata: &mut Metadata) {
        metadata.annotations.remove(&self.key);
    }
}
