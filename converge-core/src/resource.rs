//! The Resource trait binds a spec, its observed state and per-type rules.

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::gate::{FieldViolation, GateRules};
use crate::merge::AdoptMode;
use crate::provider::ProviderAction;
use crate::spec::{CommandKind, CommandRequest, DeclaredSpec};
use crate::status::Projection;

/// What a changed delta asks of the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan<S> {
    /// Steady-state fields to push, if any of the delta maps to the provider.
    pub update: Option<S>,
    /// Pending one-shot command.
    pub command: Option<CommandRequest>,
}

/// A managed resource kind.
pub trait Resource: Send + Sync + Sized + 'static {
    /// Plural, URL-safe kind name, e.g. `container-databases`.
    const KIND: &'static str;

    /// Finalizer guarding provider-side deletion while `hard_link` is set.
    const FINALIZER: &'static str = "converge.io/hard-link";

    type Spec: DeclaredSpec;
    type Observed: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn provider_id(spec: &Self::Spec) -> Option<&str>;

    fn set_provider_id(spec: &mut Self::Spec, id: &str);

    /// Whether deleting the record also deletes the provider resource.
    fn hard_link(spec: &Self::Spec) -> bool;

    fn gate() -> &'static GateRules;

    /// Write the mapped observed fields into `spec` per `mode`.
    fn map_observed(spec: &mut Self::Spec, observed: &Self::Observed, mode: AdoptMode);

    fn project(observed: &Self::Observed) -> Projection;

    /// Split a purged delta into the provider update and the pending command.
    fn plan(delta: &Self::Spec) -> Plan<Self::Spec>;

    /// Remove every pending command from `spec`.
    fn clear_command(spec: &mut Self::Spec);

    /// The provider action for `kind`, with its parameters read from the
    /// full declared `spec`. Kinds without parameterized commands keep the
    /// default.
    fn action(kind: CommandKind, spec: &Self::Spec) -> Result<ProviderAction, String> {
        let _ = spec;
        ProviderAction::for_command(kind)
            .ok_or_else(|| format!("{} is not supported by {}", kind, Self::KIND))
    }

    /// Identity fields that changed after being set.
    fn immutable_violations(old: &Self::Spec, new: &Self::Spec) -> Vec<FieldViolation>;

    /// Structural checks; `old` is `None` on create.
    fn validate(spec: &Self::Spec, old: Option<&Self::Spec>) -> Vec<FieldViolation>;
}
