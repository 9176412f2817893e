//! ResourceStore trait definition.
//!
//! The reconcile loop and the admission boundary only see this trait; the
//! backing store is chosen by the process wiring.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::error::Result;
use super::event::WatchEvent;
use super::record::{Record, ResourceVersion, Versioned};

/// Versioned storage of records for one resource kind.
///
/// Metadata (annotations and finalizers included), spec and status form one
/// atomic unit: a write either replaces all of them or fails.
#[async_trait]
pub trait ResourceStore<S>: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<Versioned<Record<S>>>>;

    async fn list(&self) -> Result<Vec<Versioned<Record<S>>>>;

    /// Insert a new record. Fails with `AlreadyExists` if the name is taken.
    async fn create(&self, record: Record<S>) -> Result<Versioned<Record<S>>>;

    /// Replace a record if its current version is `expected`.
    ///
    /// The store owns `uid`, `created_at`, `generation` and
    /// `deletion_requested`: the first two are preserved, the generation is
    /// bumped when the spec differs from the stored one. A record with a
    /// pending deletion and no finalizers left is removed by this write.
    async fn update(
        &self,
        record: Record<S>,
        expected: ResourceVersion,
    ) -> Result<Versioned<Record<S>>>;

    /// Mark a record for deletion. Records without finalizers are removed
    /// immediately and `None` is returned.
    async fn request_deletion(&self, name: &str) -> Result<Option<Versioned<Record<S>>>>;

    /// Subscribe to change events.
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}
