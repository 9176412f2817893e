//! Watch events emitted by stores.

/// A change notification for one record.
///
/// Events are level triggers: consumers always re-read the record before
/// acting on it. `generation` is the record's generation after the write,
/// so a consumer can tell spec changes from status and metadata writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created { name: String, generation: u64 },
    Modified { name: String, generation: u64 },
    DeletionRequested { name: String },
    Deleted { name: String },
}

impl WatchEvent {
    pub fn name(&self) -> &str {
        match self {
            WatchEvent::Created { name, .. }
            | WatchEvent::Modified { name, .. }
            | WatchEvent::DeletionRequested { name }
            | WatchEvent::Deleted { name } => name,
        }
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            WatchEvent::Created { generation, .. } | WatchEvent::Modified { generation, .. } => {
                Some(*generation)
            }
            WatchEvent::DeletionRequested { .. } | WatchEvent::Deleted { .. } => None,
        }
    }
}
