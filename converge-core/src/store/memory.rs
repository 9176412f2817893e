//! In-memory ResourceStore.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use super::error::{Result, StoreError};
use super::event::WatchEvent;
use super::record::{Record, ResourceVersion, Versioned};
use super::traits::ResourceStore;

const EVENT_CAPACITY: usize = 1024;

/// A ResourceStore keeping records in a map behind a lock.
///
/// Versions come from one counter per store, so a version is never reused
/// even across delete and re-create of the same name.
pub struct MemoryStore<S> {
    records: RwLock<Inner<S>>,
    events: broadcast::Sender<WatchEvent>,
}

struct Inner<S> {
    next_version: u64,
    records: HashMap<String, Versioned<Record<S>>>,
}

impl<S> Inner<S> {
    fn bump(&mut self) -> ResourceVersion {
        self.next_version += 1;
        ResourceVersion(self.next_version)
    }
}

impl<S> Default for MemoryStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> MemoryStore<S> {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            records: RwLock::new(Inner {
                next_version: 0,
                records: HashMap::new(),
            }),
            events,
        }
    }

    fn emit(&self, event: WatchEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl<S> ResourceStore<S> for MemoryStore<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<Option<Versioned<Record<S>>>> {
        let inner = self.records.read().await;
        Ok(inner.records.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<Versioned<Record<S>>>> {
        let inner = self.records.read().await;
        let mut records: Vec<_> = inner.records.values().cloned().collect();
        records.sort_by(|a, b| a.value.metadata.name.cmp(&b.value.metadata.name));
        Ok(records)
    }

    async fn create(&self, mut record: Record<S>) -> Result<Versioned<Record<S>>> {
        let mut inner = self.records.write().await;
        let name = record.metadata.name.clone();
        if inner.records.contains_key(&name) {
            return Err(StoreError::AlreadyExists(name));
        }
        record.metadata.generation = 1;
        record.metadata.deletion_requested = false;
        let stored = Versioned {
            version: inner.bump(),
            value: record,
        };
        inner.records.insert(name.clone(), stored.clone());
        drop(inner);

        debug!("Created record {} at version {}", name, stored.version);
        self.emit(WatchEvent::Created {
            name,
            generation: 1,
        });
        Ok(stored)
    }

    async fn update(
        &self,
        mut record: Record<S>,
        expected: ResourceVersion,
    ) -> Result<Versioned<Record<S>>> {
        let mut inner = self.records.write().await;
        let name = record.metadata.name.clone();
        let current = inner
            .records
            .get(&name)
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        if current.version != expected {
            return Err(StoreError::VersionMismatch {
                expected: expected.0,
                actual: current.version.0,
            });
        }

        let stored_meta = &current.value.metadata;
        record.metadata.uid = stored_meta.uid.clone();
        record.metadata.created_at = stored_meta.created_at;
        record.metadata.deletion_requested = stored_meta.deletion_requested;
        record.metadata.generation = if record.spec != current.value.spec {
            stored_meta.generation + 1
        } else {
            stored_meta.generation
        };

        let remove = record.metadata.deletion_requested && record.metadata.finalizers.is_empty();
        let generation = record.metadata.generation;
        let stored = Versioned {
            version: inner.bump(),
            value: record,
        };
        if remove {
            inner.records.remove(&name);
        } else {
            inner.records.insert(name.clone(), stored.clone());
        }
        drop(inner);

        if remove {
            debug!("Removed record {} after its last finalizer", name);
            self.emit(WatchEvent::Deleted { name });
        } else {
            self.emit(WatchEvent::Modified { name, generation });
        }
        Ok(stored)
    }

    async fn request_deletion(&self, name: &str) -> Result<Option<Versioned<Record<S>>>> {
        let mut inner = self.records.write().await;
        let Some(current) = inner.records.get(name) else {
            return Err(StoreError::NotFound(name.to_string()));
        };

        if current.value.metadata.finalizers.is_empty() {
            inner.records.remove(name);
            drop(inner);
            debug!("Removed record {}", name);
            self.emit(WatchEvent::Deleted {
                name: name.to_string(),
            });
            return Ok(None);
        }

        if current.value.metadata.deletion_requested {
            return Ok(Some(current.clone()));
        }

        let mut value = current.value.clone();
        value.metadata.deletion_requested = true;
        let stored = Versioned {
            version: inner.bump(),
            value,
        };
        inner.records.insert(name.to_string(), stored.clone());
        drop(inner);

        debug!(
            "Marked record {} for deletion, waiting on finalizers {:?}",
            name, stored.value.metadata.finalizers
        );
        self.emit(WatchEvent::DeletionRequested {
            name: name.to_string(),
        });
        Ok(Some(stored))
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}
