//! Autonomous container database: the dedicated-infrastructure parent of
//! autonomous databases.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gate::{FieldViolation, GateRules, immutable_once_set};
use crate::merge::{AdoptMode, merge_collection, merge_field};
use crate::phase::LifecyclePhase;
use crate::resource::{Plan, Resource};
use crate::spec::{CommandKind, CommandRequest};
use crate::status::Projection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatchModel {
    ReleaseUpdates,
    ReleaseUpdateRevisions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerDatabaseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_database_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compartment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_cluster_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_model: Option<PatchModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<BTreeMap<String, String>>,
    /// `RESTART`, `TERMINATE` or `SYNC`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<CommandRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_link: Option<bool>,
}

crate::diffable!(ContainerDatabaseSpec {
    container_database_id,
    compartment_id,
    display_name,
    vm_cluster_id,
    patch_model,
    freeform_tags,
    action,
    hard_link,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerDatabaseObserved {
    pub id: String,
    #[serde(default)]
    pub compartment_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub vm_cluster_id: Option<String>,
    #[serde(default)]
    pub patch_model: Option<PatchModel>,
    #[serde(default)]
    pub freeform_tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub lifecycle_state: LifecyclePhase,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
}

static GATE: GateRules = GateRules {
    unsafe_phases: &[
        LifecyclePhase::Provisioning,
        LifecyclePhase::Updating,
        LifecyclePhase::Terminating,
        LifecyclePhase::BackupInProgress,
        LifecyclePhase::RestoreInProgress,
        LifecyclePhase::Restarting,
        LifecyclePhase::MaintenanceInProgress,
    ],
    deletion_blocked: &[
        LifecyclePhase::Updating,
        LifecyclePhase::BackupInProgress,
        LifecyclePhase::RestoreInProgress,
        LifecyclePhase::Restarting,
        LifecyclePhase::MaintenanceInProgress,
    ],
};

pub struct ContainerDatabase;

impl Resource for ContainerDatabase {
    const KIND: &'static str = "container-databases";

    type Spec = ContainerDatabaseSpec;
    type Observed = ContainerDatabaseObserved;

    fn provider_id(spec: &Self::Spec) -> Option<&str> {
        spec.container_database_id.as_deref()
    }

    fn set_provider_id(spec: &mut Self::Spec, id: &str) {
        spec.container_database_id = Some(id.to_string());
    }

    fn hard_link(spec: &Self::Spec) -> bool {
        spec.hard_link.unwrap_or(false)
    }

    fn gate() -> &'static GateRules {
        &GATE
    }

    fn map_observed(spec: &mut Self::Spec, observed: &Self::Observed, mode: AdoptMode) {
        merge_field(&mut spec.container_database_id, Some(&observed.id), mode);
        merge_field(&mut spec.compartment_id, observed.compartment_id.as_ref(), mode);
        merge_field(&mut spec.display_name, observed.display_name.as_ref(), mode);
        merge_field(&mut spec.vm_cluster_id, observed.vm_cluster_id.as_ref(), mode);
        merge_field(&mut spec.patch_model, observed.patch_model.as_ref(), mode);
        merge_collection(&mut spec.freeform_tags, observed.freeform_tags.as_ref(), mode);
    }

    fn project(observed: &Self::Observed) -> Projection {
        Projection {
            phase: Some(observed.lifecycle_state),
            time_created: observed.time_created,
            summary: BTreeMap::new(),
        }
    }

    fn plan(delta: &Self::Spec) -> Plan<Self::Spec> {
        let update = ContainerDatabaseSpec {
            display_name: delta.display_name.clone(),
            patch_model: delta.patch_model,
            freeform_tags: delta.freeform_tags.clone(),
            ..Default::default()
        };
        Plan {
            update: (update != ContainerDatabaseSpec::default()).then_some(update),
            command: delta.action.clone(),
        }
    }

    fn clear_command(spec: &mut Self::Spec) {
        spec.action = None;
    }

    fn immutable_violations(old: &Self::Spec, new: &Self::Spec) -> Vec<FieldViolation> {
        [
            immutable_once_set(
                "spec.container_database_id",
                &old.container_database_id,
                &new.container_database_id,
            ),
            immutable_once_set("spec.compartment_id", &old.compartment_id, &new.compartment_id),
            immutable_once_set("spec.vm_cluster_id", &old.vm_cluster_id, &new.vm_cluster_id),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn validate(spec: &Self::Spec, old: Option<&Self::Spec>) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        if let Some(action) = &spec.action {
            if !matches!(
                action.kind(),
                CommandKind::Restart | CommandKind::Terminate | CommandKind::Resync
            ) {
                violations.push(FieldViolation::new(
                    "spec.action",
                    format!("{} is not supported, use RESTART, TERMINATE or SYNC", action.kind()),
                ));
            }
            if old.is_none() && spec.container_database_id.is_none() {
                violations.push(FieldViolation::new(
                    "spec.action",
                    "actions cannot be applied while provisioning",
                ));
            }
        }
        if old.is_none() && spec.container_database_id.is_none() {
            if spec.compartment_id.is_none() {
                violations.push(FieldViolation::new(
                    "spec.compartment_id",
                    "required to provision a container database",
                ));
            }
            if spec.vm_cluster_id.is_none() {
                violations.push(FieldViolation::new(
                    "spec.vm_cluster_id",
                    "required to provision a container database",
                ));
            }
        }
        violations
    }
}
