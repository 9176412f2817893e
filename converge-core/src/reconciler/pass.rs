use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::{Outcome, Reconcile, ReconcilerConfig};
use crate::diff::{self, diff};
use crate::error::{ReconcileError, Result};
use crate::merge::{AdoptMode, merge};
use crate::provider::{self, ProviderClient, ProviderError};
use crate::recorder::EventRecorder;
use crate::resource::Resource;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::spec::{CommandKind, CommandRequest, Diffable};
use crate::status::{ConditionType, ReconcileState};
use crate::store::{self, Record, ResourceStore, StoreError};

const REASON_SNAPSHOT_CORRUPTION: &str = "SnapshotCorruption";

/// Reconciles records of one resource kind against the provider.
pub struct Reconciler<R: Resource> {
    store: Arc<dyn ResourceStore<R::Spec>>,
    provider: Arc<dyn ProviderClient<R>>,
    recorder: Arc<dyn EventRecorder>,
    snapshots: SnapshotStore,
    config: ReconcilerConfig,
}

/// Facts a pass learned that must survive a conflict retry.
struct Carry<R: Resource> {
    /// A create call succeeded but its write was lost; bind instead of
    /// creating a second provider resource.
    provisioned_id: Option<String>,
    /// An update or command succeeded but its write was lost; record it on
    /// the fresh read instead of sending it again.
    synced: Option<Synced<R>>,
}

impl<R: Resource> Default for Carry<R> {
    fn default() -> Self {
        Self {
            provisioned_id: None,
            synced: None,
        }
    }
}

/// The result of one sync pass, enough to record it without the provider.
struct Synced<R: Resource> {
    /// Snapshot generation the delta was computed against.
    base_generation: u64,
    applied: R::Spec,
    executed: Option<CommandRequest>,
    observed: Option<R::Observed>,
    reason: &'static str,
    command_pending: bool,
}

type SpecRecord<R> = Record<<R as Resource>::Spec>;

impl<R: Resource> Reconciler<R> {
    pub fn new(
        store: Arc<dyn ResourceStore<R::Spec>>,
        provider: Arc<dyn ProviderClient<R>>,
        recorder: Arc<dyn EventRecorder>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            provider,
            recorder,
            snapshots: SnapshotStore::default(),
            config,
        }
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotStore) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// One pass: fresh read, one decision, at most one write.
    async fn pass(&self, name: &str, carry: &mut Carry<R>) -> store::Result<Outcome> {
        let Some(current) = self.store.get(name).await? else {
            debug!("{} {} no longer exists", R::KIND, name);
            return Ok(Outcome::Done);
        };
        let version = current.version;
        let original = current.value;
        let mut record = original.clone();

        let outcome = if record.metadata.deletion_requested {
            self.finalize(&mut record).await
        } else {
            self.step(&mut record, carry).await?
        };

        if record != original {
            self.store.update(record, version).await?;
        }
        Ok(outcome)
    }

    async fn step(&self, record: &mut SpecRecord<R>, carry: &mut Carry<R>) -> store::Result<Outcome> {
        let name = record.metadata.name.clone();
        let now = Utc::now();

        let generation = record.metadata.generation;
        if record.status.observed_generation != generation {
            record.status.observed_generation = generation;
            record.status.failed_attempts = 0;
        }

        if R::hard_link(&record.spec) {
            if record.metadata.add_finalizer(R::FINALIZER) {
                debug!("Added finalizer to {} {}", R::KIND, name);
            }
        } else if record.metadata.remove_finalizer(R::FINALIZER) {
            debug!("Removed finalizer from {} {}", R::KIND, name);
        }

        let snapshot = match self.snapshots.load::<R::Spec>(&record.metadata) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                if !record.status.is_condition_true(ConditionType::Failed) {
                    error!("Snapshot of {} {} is unreadable: {}", R::KIND, name, e);
                    self.recorder
                        .warning(R::KIND, &name, REASON_SNAPSHOT_CORRUPTION, e.to_string());
                }
                record
                    .status
                    .record_terminal(None, REASON_SNAPSHOT_CORRUPTION, e.to_string(), now);
                return Ok(Outcome::Done);
            }
        };

        if record
            .status
            .condition(ConditionType::Failed)
            .is_some_and(|c| c.status && c.reason == REASON_SNAPSHOT_CORRUPTION)
        {
            info!("Snapshot of {} {} is readable again", R::KIND, name);
            record
                .status
                .set_condition(ConditionType::Failed, false, "SnapshotRepaired", "", now);
        }

        if record.status.failed_generation == Some(generation) {
            debug!(
                "{} {} failed terminally at generation {}, waiting for a spec change",
                R::KIND,
                name,
                generation
            );
            return Ok(Outcome::Done);
        }

        let Some(snapshot) = snapshot else {
            return self.initialize(record, carry, now).await;
        };

        if let Some(synced) = carry
            .synced
            .as_ref()
            .filter(|synced| synced.base_generation == snapshot.generation)
        {
            debug!(
                "Recording the earlier {} of {} {} on a fresh read",
                synced.reason,
                R::KIND,
                name
            );
            // Still pending on the fresh read means it is the request we ran.
            let pending = R::plan(&diff(&record.spec, Some(&snapshot.spec)).purged).command;
            let clear_request = synced.executed.is_some() && pending == synced.executed;
            return self.record_sync(record, snapshot, synced, clear_request, now);
        }

        let id = R::provider_id(&record.spec)
            .or_else(|| R::provider_id(&snapshot.spec))
            .map(str::to_owned);
        let Some(id) = id else {
            return Ok(self.provider_failure(
                record,
                "MissingProviderId",
                ProviderError::Terminal("no provider id in spec or snapshot".to_string()),
                now,
            ));
        };

        let d = diff(&record.spec, Some(&snapshot.spec));
        if !d.changed {
            return self.refresh(record, &id, snapshot, now).await;
        }
        if R::gate().is_unsafe(record.status.phase) {
            return Ok(self.observe_blocked(record, &id, now).await);
        }
        self.sync(record, &id, snapshot, d.purged, carry, now).await
    }

    /// No snapshot yet: create the provider resource or bind to an existing one.
    async fn initialize(
        &self,
        record: &mut SpecRecord<R>,
        carry: &mut Carry<R>,
        now: DateTime<Utc>,
    ) -> store::Result<Outcome> {
        let name = record.metadata.name.clone();
        record.status.state = ReconcileState::Initializing;

        let bind_id = R::provider_id(&record.spec)
            .map(str::to_owned)
            .or_else(|| carry.provisioned_id.clone());

        let (observed, reason, message) = match bind_id {
            None => {
                let mut request = record.spec.clone();
                R::clear_command(&mut request);
                info!("Provisioning {} {}", R::KIND, name);
                match self.call(self.provider.create(&request)).await {
                    Ok(provisioned) => {
                        carry.provisioned_id = Some(provisioned.id.clone());
                        R::set_provider_id(&mut record.spec, &provisioned.id);
                        let message = format!("Provisioned {}", provisioned.id);
                        (provisioned.observed, "Provisioned", message)
                    }
                    Err(e) => return Ok(self.provider_failure(record, "CreateFailed", e, now)),
                }
            }
            Some(id) => {
                info!("Binding {} {} to {}", R::KIND, name, id);
                match self.call(self.provider.get(&id)).await {
                    Ok(observed) => {
                        R::set_provider_id(&mut record.spec, &id);
                        (observed, "Bound", format!("Bound to {}", id))
                    }
                    Err(e) => return Ok(self.provider_failure(record, "BindFailed", e, now)),
                }
            }
        };

        merge::<R>(&mut record.spec, &mut record.status, &observed, AdoptMode::Adopt);

        let mut applied = record.spec.clone();
        R::clear_command(&mut applied);
        self.save_snapshot(record, &Snapshot::first(applied))?;

        record.status.state = ReconcileState::Converged;
        record.status.record_success(reason, message.clone(), now);
        self.mark_progress(record, now);
        self.recorder.normal(R::KIND, &name, reason, message);
        Ok(self.settle(record))
    }

    /// Push the delta: one update, or one command when no update is pending.
    async fn sync(
        &self,
        record: &mut SpecRecord<R>,
        id: &str,
        snapshot: Snapshot<R::Spec>,
        delta: R::Spec,
        carry: &mut Carry<R>,
        now: DateTime<Utc>,
    ) -> store::Result<Outcome> {
        let name = record.metadata.name.clone();
        record.status.state = ReconcileState::Syncing;

        let plan = R::plan(&delta);
        let command = plan.command.filter(|command| {
            let current = command.is_current(snapshot.generation);
            if !current {
                warn!(
                    "Ignoring stale {} command on {} {}, snapshot is at generation {}",
                    command.kind(),
                    R::KIND,
                    name,
                    snapshot.generation
                );
            }
            current
        });

        let mut applied = delta;
        let mut command_pending = false;
        let mut executed = None;

        let (result, reason) = match (plan.update, command) {
            (Some(update), command) => {
                if command.is_some() {
                    // The command goes out on the next pass.
                    R::clear_command(&mut applied);
                    command_pending = true;
                }
                info!("Updating {} {}", R::KIND, name);
                let result = self.call(self.provider.update(id, &update)).await;
                (result.map(Some), "Updated")
            }
            (None, Some(command)) if command.kind() == CommandKind::Resync => {
                return self.resync(record, id, snapshot, now).await;
            }
            (None, Some(command)) => {
                let action = match R::action(command.kind(), &record.spec) {
                    Ok(action) => action,
                    Err(message) => {
                        return Ok(self.provider_failure(
                            record,
                            "CommandFailed",
                            ProviderError::Terminal(message),
                            now,
                        ));
                    }
                };
                info!("Executing {} on {} {}", action, R::KIND, name);
                let result = self.call(self.provider.execute(id, action)).await;
                executed = Some(command);
                (result.map(Some), "CommandExecuted")
            }
            (None, None) => (Ok(None), "Recorded"),
        };

        let observed = match result {
            Ok(observed) => observed,
            Err(e) => {
                let reason = if reason == "Updated" {
                    "UpdateFailed"
                } else {
                    "CommandFailed"
                };
                return Ok(self.provider_failure(record, reason, e, now));
            }
        };

        let synced = Synced {
            base_generation: snapshot.generation,
            applied,
            executed,
            observed,
            reason,
            command_pending,
        };
        let outcome = self.record_sync(record, snapshot, &synced, true, now)?;
        if reason != "Recorded" {
            let message = format!("Applied generation {}", record.metadata.generation);
            self.recorder.normal(R::KIND, &name, reason, message);
        }
        carry.synced = Some(synced);
        Ok(outcome)
    }

    /// Fold a successful sync into the record. An executed command is
    /// dropped from the snapshot, and from the spec when `clear_request`,
    /// so writing the same command again runs it again.
    fn record_sync(
        &self,
        record: &mut SpecRecord<R>,
        snapshot: Snapshot<R::Spec>,
        synced: &Synced<R>,
        clear_request: bool,
        now: DateTime<Utc>,
    ) -> store::Result<Outcome> {
        let mut next = diff::apply(&snapshot.spec, &synced.applied);
        if synced.executed.is_some() {
            R::clear_command(&mut next);
            if clear_request {
                R::clear_command(&mut record.spec);
            }
        }
        if let Some(observed) = &synced.observed {
            let before = record.spec.clone();
            merge::<R>(&mut record.spec, &mut record.status, observed, AdoptMode::Adopt);
            let mut adopted = record.spec.clone();
            if adopted.purge_unchanged(&before) {
                next.overlay(&adopted);
            }
            self.mark_progress(record, now);
        }
        self.save_snapshot(record, &snapshot.next(next))?;

        let message = format!("Applied generation {}", record.metadata.generation);
        record.status.record_success(synced.reason, message, now);

        if synced.command_pending {
            return Ok(Outcome::RequeueAfter(Duration::ZERO));
        }
        record.status.state = ReconcileState::Converged;
        Ok(self.settle(record))
    }

    /// Handle a sync command: take the provider's view wholesale.
    async fn resync(
        &self,
        record: &mut SpecRecord<R>,
        id: &str,
        snapshot: Snapshot<R::Spec>,
        now: DateTime<Utc>,
    ) -> store::Result<Outcome> {
        let name = record.metadata.name.clone();
        info!("Resyncing {} {} from the provider", R::KIND, name);
        let observed = match self.call(self.provider.get(id)).await {
            Ok(observed) => observed,
            Err(e) => return Ok(self.provider_failure(record, "SyncFailed", e, now)),
        };

        merge::<R>(
            &mut record.spec,
            &mut record.status,
            &observed,
            AdoptMode::Authoritative,
        );
        R::clear_command(&mut record.spec);
        // Local fields are not provider state; keep what was applied.
        let mut next = snapshot.spec.clone();
        R::clear_command(&mut next);
        next.overlay(&record.spec);
        self.save_snapshot(record, &snapshot.next(next))?;

        record.status.state = ReconcileState::Converged;
        record.status.record_observed(now);
        record.status.last_synced_at = Some(now);
        self.mark_progress(record, now);
        self.recorder
            .normal(R::KIND, &name, "Synced", format!("Spec overwritten from {}", id));
        Ok(self.settle(record))
    }

    /// Nothing to push: refresh from the provider and adopt what it filled in.
    async fn refresh(
        &self,
        record: &mut SpecRecord<R>,
        id: &str,
        snapshot: Snapshot<R::Spec>,
        now: DateTime<Utc>,
    ) -> store::Result<Outcome> {
        let observed = match self.call(self.provider.get(id)).await {
            Ok(observed) => observed,
            Err(e) => return Ok(self.provider_failure(record, "RefreshFailed", e, now)),
        };

        let before = record.spec.clone();
        let merged = merge::<R>(&mut record.spec, &mut record.status, &observed, AdoptMode::Adopt);
        record.status.record_observed(now);
        self.mark_progress(record, now);
        if merged.spec_changed || merged.status_changed {
            record.status.last_synced_at = Some(now);
        }

        if merged.spec_changed {
            let mut adopted = record.spec.clone();
            adopted.purge_unchanged(&before);
            let next = diff::apply(&snapshot.spec, &adopted);
            self.save_snapshot(record, &snapshot.next(next))?;
            debug!(
                "Adopted provider values into {} {}",
                R::KIND,
                record.metadata.name
            );
            record.status.state = ReconcileState::Syncing;
            return Ok(Outcome::RequeueAfter(Duration::ZERO));
        }

        record.status.state = ReconcileState::Converged;
        Ok(self.settle(record))
    }

    /// A change is pending while the provider is busy: observe only.
    async fn observe_blocked(
        &self,
        record: &mut SpecRecord<R>,
        id: &str,
        now: DateTime<Utc>,
    ) -> Outcome {
        let name = record.metadata.name.clone();
        match self.call(self.provider.get(id)).await {
            Ok(observed) => {
                record.status.apply_projection(R::project(&observed));
                record.status.record_observed(now);
            }
            Err(e) => return self.provider_failure(record, "RefreshFailed", e, now),
        }
        self.mark_progress(record, now);

        if !R::gate().is_unsafe(record.status.phase) {
            debug!("{} {} settled, applying pending changes", R::KIND, name);
            record.status.state = ReconcileState::Syncing;
            return Outcome::RequeueAfter(Duration::ZERO);
        }

        if record.status.state != ReconcileState::Blocked {
            let phase = record.status.phase.unwrap_or_default();
            info!(
                "{} {} has pending changes but is {}, waiting",
                R::KIND,
                name,
                phase
            );
            self.recorder.normal(
                R::KIND,
                &name,
                "Blocked",
                format!("Changes are held until the resource leaves {}", phase),
            );
        }
        record.status.state = ReconcileState::Blocked;
        Outcome::RequeueAfter(self.config.poll_interval)
    }

    /// Delete the provider resource if hard-linked, then drop our finalizer.
    async fn finalize(&self, record: &mut SpecRecord<R>) -> Outcome {
        if !record.metadata.has_finalizer(R::FINALIZER) {
            return Outcome::Done;
        }
        let name = record.metadata.name.clone();
        let now = Utc::now();

        let snapshot = self
            .snapshots
            .load::<R::Spec>(&record.metadata)
            .ok()
            .flatten();
        let id = snapshot
            .as_ref()
            .and_then(|s| R::provider_id(&s.spec))
            .or_else(|| R::provider_id(&record.spec))
            .map(str::to_owned);
        let gone = record.status.phase.is_some_and(|p| p.is_terminal());

        if let Some(id) = id.filter(|_| !gone) {
            info!("Deleting provider resource {} of {} {}", id, R::KIND, name);
            match self.call(self.provider.delete(&id)).await {
                Ok(()) => {
                    self.recorder
                        .normal(R::KIND, &name, "Deleted", format!("Deleted {}", id));
                }
                Err(ProviderError::NotFound(_)) => {
                    debug!("Provider resource {} is already gone", id);
                }
                Err(e) => return self.provider_failure(record, "DeleteFailed", e, now),
            }
        }

        record.metadata.remove_finalizer(R::FINALIZER);
        Outcome::Done
    }

    /// Record a failed provider call in the status and pick the requeue.
    fn provider_failure(
        &self,
        record: &mut SpecRecord<R>,
        reason: &str,
        err: ProviderError,
        now: DateTime<Utc>,
    ) -> Outcome {
        let name = record.metadata.name.clone();
        let generation = record.metadata.generation;

        if let ProviderError::Transient(message) = &err {
            record.status.record_transient(reason, message.as_str(), now);
            let attempts = record.status.failed_attempts;
            if !self.config.retry.exhausted(attempts) {
                let delay = self.config.retry.delay(attempts);
                warn!(
                    "{} {} {}: {} (attempt {}, retrying in {:?})",
                    R::KIND,
                    name,
                    reason,
                    message,
                    attempts,
                    delay
                );
                self.recorder
                    .warning(R::KIND, &name, reason, message.clone());
                return Outcome::RequeueAfter(delay);
            }
            let message = format!("giving up after {} attempts: {}", attempts, message);
            error!("{} {} {}: {}", R::KIND, name, reason, message);
            record
                .status
                .record_terminal(Some(generation), reason, message.clone(), now);
            self.recorder.warning(R::KIND, &name, reason, message);
            return Outcome::Done;
        }

        error!("{} {} {}: {}", R::KIND, name, reason, err);
        record
            .status
            .record_terminal(Some(generation), reason, err.to_string(), now);
        self.recorder.warning(R::KIND, &name, reason, err.to_string());
        Outcome::Done
    }

    fn save_snapshot(
        &self,
        record: &mut SpecRecord<R>,
        snapshot: &Snapshot<R::Spec>,
    ) -> store::Result<()> {
        self.snapshots
            .save(&mut record.metadata, snapshot)
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    fn mark_progress(&self, record: &mut SpecRecord<R>, now: DateTime<Utc>) {
        let in_flight = R::gate().is_unsafe(record.status.phase);
        let reason = match record.status.phase {
            Some(phase) => phase.to_string(),
            None => "Unknown".to_string(),
        };
        record
            .status
            .set_condition(ConditionType::Progressing, in_flight, &reason, "", now);
    }

    /// Poll while the provider is busy, otherwise wait for the resync.
    fn settle(&self, record: &SpecRecord<R>) -> Outcome {
        if R::gate().is_unsafe(record.status.phase) {
            Outcome::RequeueAfter(self.config.poll_interval)
        } else {
            Outcome::RequeueAfter(self.config.resync_period)
        }
    }

    /// Bound a provider call by `call_timeout`. A timed out call is
    /// reported as transient even though the provider may have carried it
    /// out; for create that means a retry can provision a second resource.
    async fn call<T>(&self, fut: impl Future<Output = provider::Result<T>>) -> provider::Result<T> {
        match tokio::time::timeout(self.config.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Transient(format!(
                "provider call timed out after {:?}",
                self.config.call_timeout
            ))),
        }
    }
}

#[async_trait]
impl<R: Resource> Reconcile for Reconciler<R> {
    fn kind(&self) -> &'static str {
        R::KIND
    }

    async fn reconcile(&self, name: &str) -> Result<Outcome> {
        let mut carry = Carry::default();
        let mut conflicts = 0;
        loop {
            match self.pass(name, &mut carry).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_conflict() => {
                    conflicts += 1;
                    if conflicts > self.config.max_conflict_retries {
                        warn!(
                            "{} {}: giving up after {} conflicting writes",
                            R::KIND,
                            name,
                            conflicts
                        );
                        return Err(ReconcileError::ConflictRetriesExhausted {
                            name: name.to_string(),
                            attempts: conflicts,
                        });
                    }
                    debug!("Write conflict on {} {}, re-running pass", R::KIND, name);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
