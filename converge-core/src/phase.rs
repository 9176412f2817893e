//! Provider lifecycle phases.

use serde::{Deserialize, Serialize};

/// Coarse lifecycle state reported by the provider for a managed database.
///
/// Each resource type decides which of these are unsafe (an operation is in
/// flight and the provider rejects mutations) and which block deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecyclePhase {
    Provisioning,
    Available,
    Updating,
    Starting,
    Stopping,
    Stopped,
    Restarting,
    BackupInProgress,
    RestoreInProgress,
    MaintenanceInProgress,
    RoleChangeInProgress,
    Terminating,
    Terminated,
    Failed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl LifecyclePhase {
    /// The provider resource is gone or on its way out.
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecyclePhase::Terminating | LifecyclePhase::Terminated)
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecyclePhase::Provisioning => "PROVISIONING",
            LifecyclePhase::Available => "AVAILABLE",
            LifecyclePhase::Updating => "UPDATING",
            LifecyclePhase::Starting => "STARTING",
            LifecyclePhase::Stopping => "STOPPING",
            LifecyclePhase::Stopped => "STOPPED",
            LifecyclePhase::Restarting => "RESTARTING",
            LifecyclePhase::BackupInProgress => "BACKUP_IN_PROGRESS",
            LifecyclePhase::RestoreInProgress => "RESTORE_IN_PROGRESS",
            LifecyclePhase::MaintenanceInProgress => "MAINTENANCE_IN_PROGRESS",
            LifecyclePhase::RoleChangeInProgress => "ROLE_CHANGE_IN_PROGRESS",
            LifecyclePhase::Terminating => "TERMINATING",
            LifecyclePhase::Terminated => "TERMINATED",
            LifecyclePhase::Failed => "FAILED",
            LifecyclePhase::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}
