//! Declared spec abstractions.
//!
//! A spec is a plain struct whose leaves are `Option<_>`: `None` means the
//! user expresses no opinion about the field, `Some(0)` is a real desired
//! value. [`Diffable`] gives the change detector a field-by-field view of a
//! spec without runtime reflection; the [`diffable!`](crate::diffable) macro
//! generates the implementation for a struct from its field list.

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Structural, field-wise comparison and overlay of declared specs.
pub trait Diffable {
    /// Reset every leaf that carries no change relative to `previous` to its
    /// unset value and keep changed leaves verbatim.
    ///
    /// A leaf is changed when it is set and either unset or different in
    /// `previous`. An unset leaf is never a change. Returns true if at least
    /// one leaf was retained.
    fn purge_unchanged(&mut self, previous: &Self) -> bool;

    /// Write every set leaf of `delta` into `self`.
    fn overlay(&mut self, delta: &Self);
}

impl<T: Clone + PartialEq> Diffable for Option<T> {
    fn purge_unchanged(&mut self, previous: &Self) -> bool {
        let changed = match (self.as_ref(), previous.as_ref()) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(current), Some(previous)) => current != previous,
        };
        if !changed {
            *self = None;
        }
        changed
    }

    fn overlay(&mut self, delta: &Self) {
        if delta.is_some() {
            self.clone_from(delta);
        }
    }
}

/// Implement [`Diffable`] for a struct by recursing into the listed fields.
///
/// Every field of the struct must be listed; each field type must itself be
/// `Diffable` (an `Option<_>` leaf or another struct using this macro).
///
/// ```
/// use converge_core::diffable;
///
/// #[derive(Default)]
/// struct Sizing {
///     cpu: Option<u32>,
///     storage: Option<u32>,
/// }
///
/// diffable!(Sizing { cpu, storage });
/// ```
#[macro_export]
macro_rules! diffable {
    ($ty:ty { $($field:ident),+ $(,)? }) => {
        impl $crate::spec::Diffable for $ty {
            fn purge_unchanged(&mut self, previous: &Self) -> bool {
                let mut changed = false;
                $(
                    changed |= $crate::spec::Diffable::purge_unchanged(
                        &mut self.$field,
                        &previous.$field,
                    );
                )+
                changed
            }

            fn overlay(&mut self, delta: &Self) {
                $(
                    $crate::spec::Diffable::overlay(&mut self.$field, &delta.$field);
                )+
            }
        }
    };
}

/// Bounds every resource spec type satisfies.
pub trait DeclaredSpec:
    Diffable + Clone + PartialEq + Default + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> DeclaredSpec for T where
    T: Diffable
        + Clone
        + PartialEq
        + Default
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// One-shot imperative requests carried in a spec field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    Start,
    Stop,
    Restart,
    Terminate,
    /// Create a copy of the resource; parameters come from the spec.
    Clone,
    /// Point-in-time restore; the timestamp comes from the spec.
    Restore,
    /// Data Guard role changes.
    Switchover,
    Failover,
    /// Re-read the provider and overwrite the declared fields with it.
    #[serde(rename = "SYNC")]
    Resync,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandKind::Start => "START",
            CommandKind::Stop => "STOP",
            CommandKind::Restart => "RESTART",
            CommandKind::Terminate => "TERMINATE",
            CommandKind::Clone => "CLONE",
            CommandKind::Restore => "RESTORE",
            CommandKind::Switchover => "SWITCHOVER",
            CommandKind::Failover => "FAILOVER",
            CommandKind::Resync => "SYNC",
        };
        f.write_str(s)
    }
}

/// A command as written by the user.
///
/// `"RESTART"` deserializes to [`CommandRequest::Bare`] and relies on the
/// snapshot purge to fire once. `{"kind": "RESTART", "generation": 4}` is
/// [`CommandRequest::Pinned`] and only fires while the last successful
/// snapshot is at generation 4, so a lost or rewritten snapshot never
/// replays it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandRequest {
    Bare(CommandKind),
    Pinned { kind: CommandKind, generation: u64 },
}

impl CommandRequest {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandRequest::Bare(kind) => *kind,
            CommandRequest::Pinned { kind, .. } => *kind,
        }
    }

    /// Whether the command may run against a snapshot at `snapshot_generation`.
    pub fn is_current(&self, snapshot_generation: u64) -> bool {
        match self {
            CommandRequest::Bare(_) => true,
            CommandRequest::Pinned { generation, .. } => *generation == snapshot_generation,
        }
    }
}
