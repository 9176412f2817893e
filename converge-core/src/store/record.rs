//! Stored records: metadata, declared spec and status.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::Status;

/// Optimistic concurrency token. Every successful write produces a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(pub u64);

impl std::fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub uid: String,
    /// Bumped by the store whenever the spec changes.
    pub generation: u64,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub finalizers: Vec<String>,
    #[serde(default)]
    pub deletion_requested: bool,
    pub created_at: DateTime<Utc>,
}

impl Metadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: uuid::Uuid::new_v4().to_string(),
            generation: 1,
            annotations: BTreeMap::new(),
            finalizers: Vec::new(),
            deletion_requested: false,
            created_at: Utc::now(),
        }
    }

    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers.iter().any(|f| f == finalizer)
    }

    /// Returns true if the finalizer was added.
    pub fn add_finalizer(&mut self, finalizer: &str) -> bool {
        if self.has_finalizer(finalizer) {
            return false;
        }
        self.finalizers.push(finalizer.to_string());
        true
    }

    /// Returns true if the finalizer was present.
    pub fn remove_finalizer(&mut self, finalizer: &str) -> bool {
        let before = self.finalizers.len();
        self.finalizers.retain(|f| f != finalizer);
        self.finalizers.len() != before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<S> {
    pub metadata: Metadata,
    pub spec: S,
    #[serde(default)]
    pub status: Status,
}

impl<S> Record<S> {
    pub fn new(name: impl Into<String>, spec: S) -> Self {
        Self {
            metadata: Metadata::new(name),
            spec,
            status: Status::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// A value read from a store together with its concurrency token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: ResourceVersion,
    #[serde(flatten)]
    pub value: T,
}
