//! Synchronous admissibility of spec changes and deletions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::phase::LifecyclePhase;

/// Per resource type phase tables.
#[derive(Debug)]
pub struct GateRules {
    /// Phases in which the provider has an operation in flight.
    pub unsafe_phases: &'static [LifecyclePhase],
    /// Phases in which deletion is refused.
    pub deletion_blocked: &'static [LifecyclePhase],
}

impl GateRules {
    pub fn is_unsafe(&self, phase: Option<LifecyclePhase>) -> bool {
        phase.is_some_and(|p| self.unsafe_phases.contains(&p))
    }

    pub fn blocks_deletion(&self, phase: Option<LifecyclePhase>) -> bool {
        phase.is_some_and(|p| self.deletion_blocked.contains(&p))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rejected: {}", summarize(.violations))]
pub struct Rejection {
    pub violations: Vec<FieldViolation>,
}

pub(crate) fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Rejection {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violations: vec![FieldViolation::new(path, message)],
        }
    }

    /// `Ok` when `violations` is empty.
    pub fn check(violations: Vec<FieldViolation>) -> Result<(), Rejection> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Rejection { violations })
        }
    }
}

/// Admit a create (`old == None`) or update in the given phase.
pub fn admit<S: PartialEq>(
    rules: &GateRules,
    phase: Option<LifecyclePhase>,
    old: Option<&S>,
    new: &S,
) -> Result<(), Rejection> {
    if !rules.is_unsafe(phase) {
        return Ok(());
    }
    let phase = phase.unwrap_or(LifecyclePhase::Unknown);
    match old {
        Some(old) if old == new => Ok(()),
        Some(_) => Err(Rejection::single(
            "spec",
            format!("the resource is {phase}; spec changes are not allowed until it settles"),
        )),
        None => Err(Rejection::single(
            "spec",
            format!("the resource is {phase}; it cannot be created now"),
        )),
    }
}

pub fn admit_delete(rules: &GateRules, phase: Option<LifecyclePhase>) -> Result<(), Rejection> {
    if rules.blocks_deletion(phase) {
        let phase = phase.unwrap_or(LifecyclePhase::Unknown);
        return Err(Rejection::single(
            "metadata",
            format!("the resource is {phase}; it cannot be deleted now"),
        ));
    }
    Ok(())
}

/// Identity field rule: once set, a field may not change or be cleared.
pub fn immutable_once_set<T: PartialEq>(
    path: &str,
    old: &Option<T>,
    new: &Option<T>,
) -> Option<FieldViolation> {
    match old {
        Some(old) if new.as_ref() != Some(old) => {
            Some(FieldViolation::new(path, "field is immutable once set"))
        }
        _ => None,
    }
}
