//! The external provider as seen by the reconcile loop.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::Resource;
use crate::spec::CommandKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloneType {
    /// Data and metadata.
    Full,
    Metadata,
}

/// Parameters of a clone. The clone is a new provider resource; the source
/// keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneRequest {
    pub db_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub clone_type: CloneType,
}

/// Point-in-time restore of the resource in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub timestamp: DateTime<Utc>,
}

/// Imperative operations a provider can run on an existing resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderAction {
    Start,
    Stop,
    Restart,
    Terminate,
    Switchover,
    Failover,
    Clone(CloneRequest),
    Restore(RestoreRequest),
}

impl ProviderAction {
    /// The provider action behind a command that takes no parameters.
    /// `None` for commands handled locally or needing resource parameters.
    pub fn for_command(kind: CommandKind) -> Option<Self> {
        match kind {
            CommandKind::Start => Some(ProviderAction::Start),
            CommandKind::Stop => Some(ProviderAction::Stop),
            CommandKind::Restart => Some(ProviderAction::Restart),
            CommandKind::Terminate => Some(ProviderAction::Terminate),
            CommandKind::Switchover => Some(ProviderAction::Switchover),
            CommandKind::Failover => Some(ProviderAction::Failover),
            CommandKind::Clone | CommandKind::Restore | CommandKind::Resync => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderAction::Start => "start",
            ProviderAction::Stop => "stop",
            ProviderAction::Restart => "restart",
            ProviderAction::Terminate => "terminate",
            ProviderAction::Switchover => "switchover",
            ProviderAction::Failover => "failover",
            ProviderAction::Clone(_) => "clone",
            ProviderAction::Restore(_) => "restore",
        }
    }
}

impl std::fmt::Display for ProviderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a create call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provisioned<O> {
    pub id: String,
    pub observed: O,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Worth retrying: timeouts, throttling, server errors.
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Retrying the same request will fail again.
    #[error("terminal provider error: {0}")]
    Terminal(String),

    #[error("provider resource not found: {0}")]
    NotFound(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Client for one resource kind.
///
/// `update` and `execute` return the provider's view right after the
/// operation was accepted, which is usually an in-flight phase.
#[async_trait]
pub trait ProviderClient<R: Resource>: Send + Sync {
    /// Create is not idempotent. A create that fails after the provider
    /// accepted it (a dropped connection, a call timeout) leaves a resource
    /// the reconciler never learns the id of; the next attempt creates
    /// another one.
    async fn create(&self, spec: &R::Spec) -> Result<Provisioned<R::Observed>>;

    async fn get(&self, id: &str) -> Result<R::Observed>;

    async fn update(&self, id: &str, delta: &R::Spec) -> Result<R::Observed>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn execute(&self, id: &str, action: ProviderAction) -> Result<R::Observed>;
}
