//! Change detection between the declared spec and the last applied snapshot.

use crate::spec::DeclaredSpec;

/// Result of [`diff`]: the spec with unchanged leaves reset, and whether
/// anything survived.
#[derive(Debug, Clone, PartialEq)]
pub struct Diff<S> {
    pub purged: S,
    pub changed: bool,
}

/// Compare `current` against the snapshot.
///
/// With no snapshot every set field is new, so `current` is returned whole.
pub fn diff<S: DeclaredSpec>(current: &S, snapshot: Option<&S>) -> Diff<S> {
    let mut purged = current.clone();
    let changed = match snapshot {
        Some(previous) => purged.purge_unchanged(previous),
        None => true,
    };
    Diff { purged, changed }
}

/// `previous ⊕ applied`: the snapshot spec after `applied` was acknowledged.
pub fn apply<S: DeclaredSpec>(previous: &S, applied: &S) -> S {
    let mut next = previous.clone();
    next.overlay(applied);
    next
}
