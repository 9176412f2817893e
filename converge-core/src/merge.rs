//! Pulling observed provider state into the declared spec.

use std::collections::BTreeMap;

use crate::resource::Resource;
use crate::status::Status;

/// How observed values are written into the declared spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdoptMode {
    /// Fill unset fields only; user-set fields are never touched.
    Adopt,
    /// Overwrite every mapped field with what the provider reports.
    Authoritative,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub spec_changed: bool,
    pub status_changed: bool,
}

/// Merge a scalar. Returns true if `field` changed.
pub fn merge_field<T: Clone + PartialEq>(
    field: &mut Option<T>,
    observed: Option<&T>,
    mode: AdoptMode,
) -> bool {
    let next = match mode {
        AdoptMode::Adopt if field.is_some() => return false,
        AdoptMode::Adopt => observed.cloned(),
        AdoptMode::Authoritative => observed.cloned(),
    };
    if *field == next {
        return false;
    }
    *field = next;
    true
}

/// Collections the provider may report as empty when it means "none".
pub trait Collection: Clone + PartialEq {
    fn is_empty(&self) -> bool;
}

impl<T: Clone + PartialEq> Collection for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl<K: Clone + Ord, V: Clone + PartialEq> Collection for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

/// Merge a collection. An empty observed collection counts as omitted: Adopt
/// leaves the field alone, Authoritative clears it to `None`.
pub fn merge_collection<C: Collection>(
    field: &mut Option<C>,
    observed: Option<&C>,
    mode: AdoptMode,
) -> bool {
    let observed = observed.filter(|c| !c.is_empty());
    merge_field(field, observed, mode)
}

/// Merge `observed` into a record's spec and refresh the status subset.
pub fn merge<R: Resource>(
    spec: &mut R::Spec,
    status: &mut Status,
    observed: &R::Observed,
    mode: AdoptMode,
) -> MergeOutcome {
    let before = spec.clone();
    R::map_observed(spec, observed, mode);
    MergeOutcome {
        spec_changed: *spec != before,
        status_changed: status.apply_projection(R::project(observed)),
    }
}
