//! Resource status: observed subset, reconcile state and conditions.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::phase::LifecyclePhase;

/// Where the reconcile loop stands for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileState {
    /// No snapshot yet; the resource is being created or bound.
    #[default]
    Initializing,
    /// A declared change is being pushed, or adopted values were just folded in.
    Syncing,
    /// Declared and last applied spec agree.
    Converged,
    /// A change is pending but the provider is mid-operation.
    Blocked,
    /// The last pass failed.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    Progressing,
    /// A transient failure is being retried.
    Degraded,
    /// A terminal failure needs a spec change or operator intervention.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: bool,
    pub reason: String,
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

/// The status subset derived from an observed provider state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub phase: Option<LifecyclePhase>,
    pub time_created: Option<DateTime<Utc>>,
    pub summary: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub phase: Option<LifecyclePhase>,
    pub state: ReconcileState,
    pub time_created: Option<DateTime<Utc>>,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub summary: BTreeMap<String, String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub failed_attempts: u32,
    pub failed_generation: Option<u64>,
    #[serde(default)]
    pub observed_generation: u64,
}

impl Status {
    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    pub fn is_condition_true(&self, condition_type: ConditionType) -> bool {
        self.condition(condition_type).is_some_and(|c| c.status)
    }

    /// Set a condition. The transition time only moves when `status` flips.
    pub fn set_condition(
        &mut self,
        condition_type: ConditionType,
        status: bool,
        reason: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let message = message.into();
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition_type)
        {
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time = now;
                }
                existing.status = status;
                existing.reason = reason.to_string();
                existing.message = message;
            }
            None => self.conditions.push(Condition {
                condition_type,
                status,
                reason: reason.to_string(),
                message,
                last_transition_time: now,
            }),
        }
    }

    /// Apply the observed subset. Returns true if anything changed.
    pub fn apply_projection(&mut self, projection: Projection) -> bool {
        let mut changed = false;
        if self.phase != projection.phase {
            self.phase = projection.phase;
            changed = true;
        }
        if projection.time_created.is_some() && self.time_created != projection.time_created {
            self.time_created = projection.time_created;
            changed = true;
        }
        if self.summary != projection.summary {
            self.summary = projection.summary;
            changed = true;
        }
        changed
    }

    /// Record an acknowledged provider call.
    pub fn record_success(&mut self, reason: &str, message: impl Into<String>, now: DateTime<Utc>) {
        self.failed_attempts = 0;
        self.failed_generation = None;
        self.last_applied_at = Some(now);
        self.set_condition(ConditionType::Ready, true, reason, message, now);
        self.set_condition(ConditionType::Degraded, false, reason, "", now);
        self.set_condition(ConditionType::Failed, false, reason, "", now);
    }

    /// Record a successful read of the provider.
    pub fn record_observed(&mut self, now: DateTime<Utc>) {
        self.failed_attempts = 0;
        if self.is_condition_true(ConditionType::Degraded) {
            self.set_condition(ConditionType::Degraded, false, "Recovered", "", now);
        }
        if !self.is_condition_true(ConditionType::Ready) {
            self.set_condition(ConditionType::Ready, true, "Observed", "", now);
        }
    }

    /// Terminal failure for `generation`: no provider calls until the spec changes.
    pub fn record_terminal(
        &mut self,
        generation: Option<u64>,
        reason: &str,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let message = message.into();
        self.state = ReconcileState::Error;
        self.failed_generation = generation;
        self.set_condition(ConditionType::Failed, true, reason, message.clone(), now);
        self.set_condition(ConditionType::Ready, false, reason, message, now);
        self.set_condition(ConditionType::Degraded, false, reason, "", now);
    }

    /// Transient failure: bump the attempt counter and mark degraded.
    pub fn record_transient(&mut self, reason: &str, message: impl Into<String>, now: DateTime<Utc>) {
        let message = message.into();
        self.state = ReconcileState::Error;
        self.failed_attempts += 1;
        self.set_condition(ConditionType::Degraded, true, reason, message.clone(), now);
        self.set_condition(ConditionType::Ready, false, reason, message, now);
    }
}
