pub mod admission;
pub mod diff;
pub mod error;
pub mod gate;
pub mod merge;
pub mod phase;
pub mod provider;
pub mod reconciler;
pub mod recorder;
pub mod resource;
pub mod resources;
pub mod snapshot;
pub mod spec;
pub mod status;
pub mod store;

pub use admission::{AdmissionBoundary, AdmissionError};
pub use error::ReconcileError;
pub use gate::{FieldViolation, GateRules, Rejection};
pub use merge::AdoptMode;
pub use phase::LifecyclePhase;
pub use provider::{
    CloneRequest, CloneType, ProviderAction, ProviderClient, ProviderError, Provisioned,
    RestoreRequest,
};
pub use reconciler::{Outcome, Reconcile, Reconciler, ReconcilerConfig, RetryPolicy};
pub use recorder::{EventRecorder, EventType, NoopRecorder, RecordedEvent, TracingRecorder};
pub use resource::{Plan, Resource};
pub use snapshot::{Snapshot, SnapshotError, SnapshotStore};
pub use spec::{CommandKind, CommandRequest, DeclaredSpec, Diffable};
pub use status::{Condition, ConditionType, ReconcileState, Status};
pub use store::{MemoryStore, Record, ResourceStore, ResourceVersion, StoreError, WatchEvent};
