//! Autonomous database.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gate::{FieldViolation, GateRules, immutable_once_set};
use crate::merge::{AdoptMode, merge_collection, merge_field};
use crate::phase::LifecyclePhase;
use crate::provider::{CloneRequest, CloneType, ProviderAction, RestoreRequest};
use crate::resource::{Plan, Resource};
use crate::spec::{CommandKind, CommandRequest};
use crate::status::Projection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DbWorkload {
    Oltp,
    Dw,
    Ajd,
    Apex,
    Lh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LicenseModel {
    LicenseIncluded,
    BringYourOwnLicense,
}

/// Lifecycle state the user asks for. A change is executed once as a
/// start, stop or terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetState {
    Available,
    Stopped,
    Terminated,
}

impl TargetState {
    fn command(self) -> CommandKind {
        match self {
            TargetState::Available => CommandKind::Start,
            TargetState::Stopped => CommandKind::Stop,
            TargetState::Terminated => CommandKind::Terminate,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkAccess {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_access_control_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelisted_ips: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsg_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_endpoint_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_mtls_connection_required: Option<bool>,
}

crate::diffable!(NetworkAccess {
    is_access_control_enabled,
    whitelisted_ips,
    subnet_id,
    nsg_ids,
    private_endpoint_label,
    is_mtls_connection_required,
});

/// Where the admin password comes from. Only one source may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PasswordSource {
    /// Name of a local secret holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    /// Provider vault secret id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_secret_id: Option<String>,
}

crate::diffable!(PasswordSource {
    secret_name,
    vault_secret_id,
});

/// Parameters of the `CLONE` action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloneDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Defaults to `FULL`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clone_type: Option<CloneType>,
}

crate::diffable!(CloneDetails {
    db_name,
    display_name,
    clone_type,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutonomousDatabaseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compartment_id: Option<String>,
    /// Parent container database on dedicated infrastructure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_database_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_workload: Option<DbWorkload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_model: Option<LicenseModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_core_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_storage_size_in_tbs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_auto_scaling_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dedicated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub network_access: NetworkAccess,
    #[serde(default)]
    pub admin_password: PasswordSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_state: Option<TargetState>,
    /// `RESTART`, `SYNC`, `CLONE`, `RESTORE`, `SWITCHOVER` or `FAILOVER`.
    /// Start, stop and terminate go through `lifecycle_state`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<CommandRequest>,
    #[serde(default)]
    pub clone_details: CloneDetails,
    /// Target of the `RESTORE` action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_point: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard_link: Option<bool>,
}

crate::diffable!(AutonomousDatabaseSpec {
    id,
    compartment_id,
    container_database_id,
    display_name,
    db_name,
    db_version,
    db_workload,
    license_model,
    cpu_core_count,
    data_storage_size_in_tbs,
    is_auto_scaling_enabled,
    is_dedicated,
    freeform_tags,
    network_access,
    admin_password,
    lifecycle_state,
    action,
    clone_details,
    restore_point,
    hard_link,
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutonomousDatabaseObserved {
    pub id: String,
    #[serde(default)]
    pub compartment_id: Option<String>,
    #[serde(default)]
    pub container_database_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub db_version: Option<String>,
    #[serde(default)]
    pub db_workload: Option<DbWorkload>,
    #[serde(default)]
    pub license_model: Option<LicenseModel>,
    #[serde(default)]
    pub cpu_core_count: Option<u32>,
    #[serde(default)]
    pub data_storage_size_in_tbs: Option<u32>,
    #[serde(default)]
    pub is_auto_scaling_enabled: Option<bool>,
    #[serde(default)]
    pub is_dedicated: Option<bool>,
    #[serde(default)]
    pub freeform_tags: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub is_access_control_enabled: Option<bool>,
    #[serde(default)]
    pub whitelisted_ips: Option<Vec<String>>,
    #[serde(default)]
    pub subnet_id: Option<String>,
    #[serde(default)]
    pub nsg_ids: Option<Vec<String>>,
    #[serde(default)]
    pub private_endpoint_label: Option<String>,
    #[serde(default)]
    pub is_mtls_connection_required: Option<bool>,
    #[serde(default)]
    pub lifecycle_state: LifecyclePhase,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
    /// TNS name to connection string.
    #[serde(default)]
    pub connection_strings: BTreeMap<String, String>,
    #[serde(default)]
    pub wallet_expires_at: Option<DateTime<Utc>>,
}

static GATE: GateRules = GateRules {
    unsafe_phases: &[
        LifecyclePhase::Provisioning,
        LifecyclePhase::Updating,
        LifecyclePhase::Starting,
        LifecyclePhase::Stopping,
        LifecyclePhase::Terminating,
        LifecyclePhase::RestoreInProgress,
        LifecyclePhase::BackupInProgress,
        LifecyclePhase::MaintenanceInProgress,
        LifecyclePhase::Restarting,
        LifecyclePhase::RoleChangeInProgress,
    ],
    deletion_blocked: &[
        LifecyclePhase::Updating,
        LifecyclePhase::Starting,
        LifecyclePhase::Stopping,
        LifecyclePhase::RestoreInProgress,
        LifecyclePhase::BackupInProgress,
        LifecyclePhase::MaintenanceInProgress,
        LifecyclePhase::Restarting,
        LifecyclePhase::RoleChangeInProgress,
    ],
};

pub struct AutonomousDatabase;

impl Resource for AutonomousDatabase {
    const KIND: &'static str = "autonomous-databases";

    type Spec = AutonomousDatabaseSpec;
    type Observed = AutonomousDatabaseObserved;

    fn provider_id(spec: &Self::Spec) -> Option<&str> {
        spec.id.as_deref()
    }

    fn set_provider_id(spec: &mut Self::Spec, id: &str) {
        spec.id = Some(id.to_string());
    }

    fn hard_link(spec: &Self::Spec) -> bool {
        spec.hard_link.unwrap_or(false)
    }

    fn gate() -> &'static GateRules {
        &GATE
    }

    fn map_observed(spec: &mut Self::Spec, observed: &Self::Observed, mode: AdoptMode) {
        merge_field(&mut spec.id, Some(&observed.id), mode);
        merge_field(&mut spec.compartment_id, observed.compartment_id.as_ref(), mode);
        merge_field(
            &mut spec.container_database_id,
            observed.container_database_id.as_ref(),
            mode,
        );
        merge_field(&mut spec.display_name, observed.display_name.as_ref(), mode);
        merge_field(&mut spec.db_name, observed.db_name.as_ref(), mode);
        merge_field(&mut spec.db_version, observed.db_version.as_ref(), mode);
        merge_field(&mut spec.db_workload, observed.db_workload.as_ref(), mode);
        merge_field(&mut spec.license_model, observed.license_model.as_ref(), mode);
        merge_field(&mut spec.cpu_core_count, observed.cpu_core_count.as_ref(), mode);
        merge_field(
            &mut spec.data_storage_size_in_tbs,
            observed.data_storage_size_in_tbs.as_ref(),
            mode,
        );
        merge_field(
            &mut spec.is_auto_scaling_enabled,
            observed.is_auto_scaling_enabled.as_ref(),
            mode,
        );
        merge_field(&mut spec.is_dedicated, observed.is_dedicated.as_ref(), mode);
        merge_collection(&mut spec.freeform_tags, observed.freeform_tags.as_ref(), mode);

        let net = &mut spec.network_access;
        merge_field(
            &mut net.is_access_control_enabled,
            observed.is_access_control_enabled.as_ref(),
            mode,
        );
        merge_collection(&mut net.whitelisted_ips, observed.whitelisted_ips.as_ref(), mode);
        merge_field(&mut net.subnet_id, observed.subnet_id.as_ref(), mode);
        merge_collection(&mut net.nsg_ids, observed.nsg_ids.as_ref(), mode);
        merge_field(
            &mut net.private_endpoint_label,
            observed.private_endpoint_label.as_ref(),
            mode,
        );
        merge_field(
            &mut net.is_mtls_connection_required,
            observed.is_mtls_connection_required.as_ref(),
            mode,
        );
    }

    fn project(observed: &Self::Observed) -> Projection {
        let mut summary = observed.connection_strings.clone();
        if let Some(expires) = observed.wallet_expires_at {
            summary.insert("wallet_expires_at".to_string(), expires.to_rfc3339());
        }
        Projection {
            phase: Some(observed.lifecycle_state),
            time_created: observed.time_created,
            summary,
        }
    }

    fn plan(delta: &Self::Spec) -> Plan<Self::Spec> {
        let mut update = delta.clone();
        update.lifecycle_state = None;
        update.action = None;
        update.clone_details = CloneDetails::default();
        update.restore_point = None;
        update.hard_link = None;
        update.id = None;
        Plan {
            update: (update != AutonomousDatabaseSpec::default()).then_some(update),
            command: delta
                .lifecycle_state
                .map(|target| CommandRequest::Bare(target.command()))
                .or_else(|| delta.action.clone()),
        }
    }

    fn clear_command(spec: &mut Self::Spec) {
        spec.lifecycle_state = None;
        spec.action = None;
    }

    fn action(kind: CommandKind, spec: &Self::Spec) -> Result<ProviderAction, String> {
        match kind {
            CommandKind::Clone => {
                let details = &spec.clone_details;
                let db_name = details
                    .db_name
                    .clone()
                    .ok_or_else(|| "CLONE needs spec.clone_details.db_name".to_string())?;
                Ok(ProviderAction::Clone(CloneRequest {
                    db_name,
                    display_name: details.display_name.clone(),
                    clone_type: details.clone_type.unwrap_or(CloneType::Full),
                }))
            }
            CommandKind::Restore => spec
                .restore_point
                .map(|timestamp| ProviderAction::Restore(RestoreRequest { timestamp }))
                .ok_or_else(|| "RESTORE needs spec.restore_point".to_string()),
            kind => ProviderAction::for_command(kind)
                .ok_or_else(|| format!("{} is not supported by {}", kind, Self::KIND)),
        }
    }

    fn immutable_violations(old: &Self::Spec, new: &Self::Spec) -> Vec<FieldViolation> {
        [
            immutable_once_set("spec.id", &old.id, &new.id),
            immutable_once_set("spec.compartment_id", &old.compartment_id, &new.compartment_id),
            immutable_once_set(
                "spec.container_database_id",
                &old.container_database_id,
                &new.container_database_id,
            ),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    fn validate(spec: &Self::Spec, old: Option<&Self::Spec>) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        let provisioning = old.is_none() && spec.id.is_none();

        if provisioning {
            if spec.lifecycle_state.is_some() {
                violations.push(FieldViolation::new(
                    "spec.lifecycle_state",
                    "cannot be applied while provisioning",
                ));
            }
            if spec.compartment_id.is_none() {
                violations.push(FieldViolation::new(
                    "spec.compartment_id",
                    "required to provision a database",
                ));
            }
            if spec.db_name.is_none() {
                violations.push(FieldViolation::new(
                    "spec.db_name",
                    "required to provision a database",
                ));
            }
        }

        let password = &spec.admin_password;
        if password.secret_name.is_some() && password.vault_secret_id.is_some() {
            violations.push(FieldViolation::new(
                "spec.admin_password",
                "secret_name and vault_secret_id are mutually exclusive",
            ));
        }

        if spec.network_access.is_access_control_enabled == Some(false)
            && spec
                .network_access
                .whitelisted_ips
                .as_ref()
                .is_some_and(|ips| !ips.is_empty())
        {
            violations.push(FieldViolation::new(
                "spec.network_access.whitelisted_ips",
                "requires is_access_control_enabled",
            ));
        }

        if let Some(action) = &spec.action {
            violations.extend(validate_action(action.kind(), spec, old, provisioning));
        }
        violations
    }
}

fn validate_action(
    kind: CommandKind,
    spec: &AutonomousDatabaseSpec,
    old: Option<&AutonomousDatabaseSpec>,
    provisioning: bool,
) -> Vec<FieldViolation> {
    let mut violations = Vec::new();
    match kind {
        CommandKind::Start | CommandKind::Stop | CommandKind::Terminate => {
            violations.push(FieldViolation::new(
                "spec.action",
                format!("{} is requested through spec.lifecycle_state", kind),
            ));
        }
        CommandKind::Clone if spec.clone_details.db_name.is_none() => {
            violations.push(FieldViolation::new(
                "spec.clone_details.db_name",
                "required by CLONE",
            ));
        }
        CommandKind::Restore if spec.restore_point.is_none() => {
            violations.push(FieldViolation::new(
                "spec.restore_point",
                "required by RESTORE",
            ));
        }
        _ => {}
    }
    if provisioning {
        violations.push(FieldViolation::new(
            "spec.action",
            "actions cannot be applied while provisioning",
        ));
    }
    let lifecycle_changed = spec.lifecycle_state.is_some()
        && old.is_none_or(|old| old.lifecycle_state != spec.lifecycle_state);
    if lifecycle_changed {
        violations.push(FieldViolation::new(
            "spec.action",
            "cannot be combined with a lifecycle_state change",
        ));
    }
    violations
}
