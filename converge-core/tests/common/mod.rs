//! Shared test utilities for converge-core integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::broadcast;

use converge_core::provider;
use converge_core::resources::autonomous_database::{
    AutonomousDatabase, AutonomousDatabaseObserved, AutonomousDatabaseSpec, DbWorkload,
    LicenseModel,
};
use converge_core::resources::container_database::{
    ContainerDatabase, ContainerDatabaseObserved, ContainerDatabaseSpec,
};
use converge_core::store::{self, Versioned};
use converge_core::{
    AdmissionBoundary, Diffable, EventRecorder, LifecyclePhase, MemoryStore, Outcome,
    ProviderAction, ProviderClient, ProviderError, Provisioned, Reconcile, Reconciler,
    ReconcilerConfig, RecordedEvent, Record, Resource, ResourceStore, ResourceVersion,
    RetryPolicy, StoreError, WatchEvent,
};

/// Keeps recorded events in memory, newest last.
#[derive(Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.reason.clone())
            .collect()
    }
}

impl EventRecorder for MemoryRecorder {
    fn record(&self, event: RecordedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A provider call as seen by the fake.
#[derive(Debug, Clone, PartialEq)]
pub enum Call<S> {
    Create(S),
    Get(String),
    Update(String, S),
    Delete(String),
    Execute(String, ProviderAction),
}

impl<S> Call<S> {
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Call::Get(_))
    }
}

type Observe<R> =
    fn(&str, &<R as Resource>::Spec, LifecyclePhase) -> <R as Resource>::Observed;

struct FakeState<S> {
    next_id: u32,
    resources: BTreeMap<String, (S, LifecyclePhase)>,
    calls: Vec<Call<S>>,
    failures: VecDeque<ProviderError>,
}

/// In-memory provider. Mutating calls move the resource into the matching
/// in-flight phase; tests settle it with `set_phase`.
pub struct FakeProvider<R: Resource> {
    state: Mutex<FakeState<R::Spec>>,
    observe: Observe<R>,
}

impl<R: Resource> FakeProvider<R> {
    pub fn new(observe: Observe<R>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: 0,
                resources: BTreeMap::new(),
                calls: Vec::new(),
                failures: VecDeque::new(),
            }),
            observe,
        }
    }

    pub fn calls(&self) -> Vec<Call<R::Spec>> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutating_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.is_mutating()).count()
    }

    /// The next mutating call fails with `err`.
    pub fn fail_next(&self, err: ProviderError) {
        self.state.lock().unwrap().failures.push_back(err);
    }

    pub fn insert(&self, id: &str, spec: R::Spec, phase: LifecyclePhase) {
        self.state
            .lock()
            .unwrap()
            .resources
            .insert(id.to_string(), (spec, phase));
    }

    pub fn set_phase(&self, id: &str, phase: LifecyclePhase) {
        let mut state = self.state.lock().unwrap();
        let entry = state.resources.get_mut(id).expect("unknown provider id");
        entry.1 = phase;
    }

    /// Change the provider resource out-of-band.
    pub fn mutate(&self, id: &str, f: impl FnOnce(&mut R::Spec)) {
        let mut state = self.state.lock().unwrap();
        let entry = state.resources.get_mut(id).expect("unknown provider id");
        f(&mut entry.0);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().unwrap().resources.contains_key(id)
    }

    fn mutation(&self, call: Call<R::Spec>) -> provider::Result<MutexGuard<'_, FakeState<R::Spec>>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl<R: Resource> ProviderClient<R> for FakeProvider<R> {
    async fn create(&self, spec: &R::Spec) -> provider::Result<Provisioned<R::Observed>> {
        let mut state = self.mutation(Call::Create(spec.clone()))?;
        state.next_id += 1;
        let id = format!("ocid1.fake.{}", state.next_id);
        state
            .resources
            .insert(id.clone(), (spec.clone(), LifecyclePhase::Provisioning));
        let observed = (self.observe)(&id, spec, LifecyclePhase::Provisioning);
        Ok(Provisioned { id, observed })
    }

    async fn get(&self, id: &str) -> provider::Result<R::Observed> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Get(id.to_string()));
        let (spec, phase) = state
            .resources
            .get(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        Ok((self.observe)(id, spec, *phase))
    }

    async fn update(&self, id: &str, delta: &R::Spec) -> provider::Result<R::Observed> {
        let mut state = self.mutation(Call::Update(id.to_string(), delta.clone()))?;
        let entry = state
            .resources
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        entry.0.overlay(delta);
        entry.1 = LifecyclePhase::Updating;
        Ok((self.observe)(id, &entry.0, entry.1))
    }

    async fn delete(&self, id: &str) -> provider::Result<()> {
        let mut state = self.mutation(Call::Delete(id.to_string()))?;
        state
            .resources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))
    }

    async fn execute(&self, id: &str, action: ProviderAction) -> provider::Result<R::Observed> {
        let mut state = self.mutation(Call::Execute(id.to_string(), action.clone()))?;
        let entry = state
            .resources
            .get_mut(id)
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        entry.1 = match action {
            ProviderAction::Start => LifecyclePhase::Starting,
            ProviderAction::Stop => LifecyclePhase::Stopping,
            ProviderAction::Restart => LifecyclePhase::Restarting,
            ProviderAction::Terminate => LifecyclePhase::Terminating,
            ProviderAction::Switchover | ProviderAction::Failover => {
                LifecyclePhase::RoleChangeInProgress
            }
            ProviderAction::Restore(_) => LifecyclePhase::RestoreInProgress,
            // The source keeps serving while the copy is built.
            ProviderAction::Clone(_) => entry.1,
        };
        Ok((self.observe)(id, &entry.0, entry.1))
    }
}

fn created_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Observed state of an autonomous database, with provider defaults filled in.
pub fn observe_adb(
    id: &str,
    spec: &AutonomousDatabaseSpec,
    phase: LifecyclePhase,
) -> AutonomousDatabaseObserved {
    let db_name = spec.db_name.clone().unwrap_or_else(|| "DB".to_string());
    let net = &spec.network_access;
    AutonomousDatabaseObserved {
        id: id.to_string(),
        compartment_id: spec.compartment_id.clone(),
        container_database_id: spec.container_database_id.clone(),
        display_name: spec.display_name.clone().or_else(|| Some(db_name.clone())),
        db_name: Some(db_name.clone()),
        db_version: spec.db_version.clone().or_else(|| Some("19c".to_string())),
        db_workload: spec.db_workload.or(Some(DbWorkload::Oltp)),
        license_model: spec.license_model.or(Some(LicenseModel::LicenseIncluded)),
        cpu_core_count: spec.cpu_core_count.or(Some(1)),
        data_storage_size_in_tbs: spec.data_storage_size_in_tbs.or(Some(1)),
        is_auto_scaling_enabled: spec.is_auto_scaling_enabled.or(Some(false)),
        is_dedicated: spec.is_dedicated.or(Some(false)),
        freeform_tags: Some(spec.freeform_tags.clone().unwrap_or_default()),
        is_access_control_enabled: net.is_access_control_enabled,
        whitelisted_ips: Some(net.whitelisted_ips.clone().unwrap_or_default()),
        subnet_id: net.subnet_id.clone(),
        nsg_ids: Some(net.nsg_ids.clone().unwrap_or_default()),
        private_endpoint_label: net.private_endpoint_label.clone(),
        is_mtls_connection_required: net.is_mtls_connection_required.or(Some(true)),
        lifecycle_state: phase,
        time_created: Some(created_at()),
        connection_strings: [(
            format!("{}_high", db_name.to_lowercase()),
            format!("tcps://adb.example.com:1522/{}_high", db_name.to_lowercase()),
        )]
        .into(),
        wallet_expires_at: None,
    }
}

pub fn observe_acd(
    id: &str,
    spec: &ContainerDatabaseSpec,
    phase: LifecyclePhase,
) -> ContainerDatabaseObserved {
    ContainerDatabaseObserved {
        id: id.to_string(),
        compartment_id: spec.compartment_id.clone(),
        display_name: spec.display_name.clone(),
        vm_cluster_id: spec.vm_cluster_id.clone(),
        patch_model: spec.patch_model.or(Some(
            converge_core::resources::container_database::PatchModel::ReleaseUpdates,
        )),
        freeform_tags: Some(spec.freeform_tags.clone().unwrap_or_default()),
        lifecycle_state: phase,
        time_created: Some(created_at()),
    }
}

/// Store wrapper that fails the next `n` updates with a version mismatch.
/// `arm` adds more.
pub struct ConflictingStore<S> {
    inner: MemoryStore<S>,
    conflicts: AtomicU32,
}

impl<S> ConflictingStore<S> {
    pub fn new(conflicts: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            conflicts: AtomicU32::new(conflicts),
        }
    }

    pub fn arm(&self, conflicts: u32) {
        self.conflicts.fetch_add(conflicts, Ordering::SeqCst);
    }
}

#[async_trait]
impl<S> ResourceStore<S> for ConflictingStore<S>
where
    S: Clone + PartialEq + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> store::Result<Option<Versioned<Record<S>>>> {
        self.inner.get(name).await
    }

    async fn list(&self) -> store::Result<Vec<Versioned<Record<S>>>> {
        self.inner.list().await
    }

    async fn create(&self, record: Record<S>) -> store::Result<Versioned<Record<S>>> {
        self.inner.create(record).await
    }

    async fn update(
        &self,
        record: Record<S>,
        expected: ResourceVersion,
    ) -> store::Result<Versioned<Record<S>>> {
        let pending = self.conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::VersionMismatch {
                expected: expected.0,
                actual: expected.0 + 1,
            });
        }
        self.inner.update(record, expected).await
    }

    async fn request_deletion(&self, name: &str) -> store::Result<Option<Versioned<Record<S>>>> {
        self.inner.request_deletion(name).await
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.subscribe()
    }
}

pub fn test_config() -> ReconcilerConfig {
    ReconcilerConfig {
        call_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_secs(1),
        resync_period: Duration::from_secs(60),
        retry: RetryPolicy {
            immediate_retries: 1,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            max_attempts: 5,
        },
        max_conflict_retries: 3,
    }
}

/// Store, fake provider, recorder, admission and reconciler for one kind.
pub struct Harness<R: Resource> {
    pub store: Arc<dyn ResourceStore<R::Spec>>,
    pub provider: Arc<FakeProvider<R>>,
    pub recorder: Arc<MemoryRecorder>,
    pub admission: AdmissionBoundary<R>,
    pub reconciler: Reconciler<R>,
}

impl<R: Resource> Harness<R> {
    pub fn new(provider: FakeProvider<R>) -> Self {
        Self::with_store(Arc::new(MemoryStore::<R::Spec>::new()), provider)
    }

    pub fn with_store(store: Arc<dyn ResourceStore<R::Spec>>, provider: FakeProvider<R>) -> Self {
        let provider = Arc::new(provider);
        let recorder = Arc::new(MemoryRecorder::new());
        let reconciler = Reconciler::new(
            store.clone(),
            provider.clone(),
            recorder.clone(),
            test_config(),
        );
        Self {
            admission: AdmissionBoundary::new(store.clone()),
            store,
            provider,
            recorder,
            reconciler,
        }
    }

    pub async fn reconcile(&self, name: &str) -> Outcome {
        self.reconciler
            .reconcile(name)
            .await
            .expect("reconcile failed")
    }

    pub async fn record(&self, name: &str) -> Record<R::Spec> {
        self.store
            .get(name)
            .await
            .expect("store get failed")
            .expect("record missing")
            .value
    }

    /// Edit the spec through the admission boundary.
    pub async fn edit(&self, name: &str, f: impl FnOnce(&mut R::Spec)) {
        let mut spec = self.record(name).await.spec;
        f(&mut spec);
        self.admission
            .update(name, spec, None)
            .await
            .expect("update rejected");
    }

    /// Write the record directly, bypassing admission.
    pub async fn force(&self, name: &str, f: impl FnOnce(&mut Record<R::Spec>)) {
        let current = self
            .store
            .get(name)
            .await
            .expect("store get failed")
            .expect("record missing");
        let mut record = current.value;
        f(&mut record);
        self.store
            .update(record, current.version)
            .await
            .expect("store update failed");
    }

    pub async fn provider_id(&self, name: &str) -> String {
        R::provider_id(&self.record(name).await.spec)
            .expect("no provider id")
            .to_string()
    }
}

pub fn adb_harness() -> Harness<AutonomousDatabase> {
    Harness::new(FakeProvider::new(observe_adb))
}

pub fn acd_harness() -> Harness<ContainerDatabase> {
    Harness::new(FakeProvider::new(observe_acd))
}

pub fn orders_spec() -> AutonomousDatabaseSpec {
    AutonomousDatabaseSpec {
        compartment_id: Some("ocid1.compartment.one".to_string()),
        db_name: Some("ORDERS".to_string()),
        cpu_core_count: Some(2),
        ..Default::default()
    }
}

pub fn acd_spec() -> ContainerDatabaseSpec {
    ContainerDatabaseSpec {
        compartment_id: Some("ocid1.compartment.one".to_string()),
        vm_cluster_id: Some("ocid1.avmc.one".to_string()),
        display_name: Some("acd-one".to_string()),
        ..Default::default()
    }
}

/// Create through admission, provision, and settle at `Available`.
pub async fn provision<R: Resource>(harness: &Harness<R>, name: &str, spec: R::Spec) -> String {
    harness
        .admission
        .create(name, spec)
        .await
        .expect("create rejected");
    harness.reconcile(name).await;
    let id = harness.provider_id(name).await;
    harness.provider.set_phase(&id, LifecyclePhase::Available);
    harness.reconcile(name).await;
    id
}
