//! The reconcile loop.
//!
//! Each pass re-reads the record, compares the declared spec with the last
//! successfully applied snapshot, and issues at most one mutating provider
//! call. No state is kept across passes.

mod backoff;
mod pass;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use backoff::RetryPolicy;
pub use pass::Reconciler;

/// What the caller should do after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing scheduled; wait for the next event or resync.
    Done,
    RequeueAfter(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Upper bound for a single provider call.
    pub call_timeout: Duration,
    /// Requeue interval while the provider has an operation in flight.
    pub poll_interval: Duration,
    /// Requeue interval once converged.
    pub resync_period: Duration,
    pub retry: RetryPolicy,
    /// Conflicting writes tolerated within one reconcile call.
    pub max_conflict_retries: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(15),
            resync_period: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            max_conflict_retries: 3,
        }
    }
}

/// Kind-erased reconciler, as driven by a controller.
#[async_trait]
pub trait Reconcile: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Run one pass for `name`, re-running it on write conflicts.
    async fn reconcile(&self, name: &str) -> Result<Outcome>;
}
