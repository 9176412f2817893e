//! Shared test utilities for converge-operator integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use reqwest::{Client, Response as ReqwestResponse};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use converge_core::resources::{
    AutonomousDatabaseObserved, AutonomousDatabaseSpec, ContainerDatabaseSpec,
};
use converge_core::{AdmissionBoundary, Diffable, LifecyclePhase, MemoryStore, Provisioned};
use converge_operator::rest::{AppState, create_router};

async fn serve(router: Router) -> (SocketAddr, oneshot::Sender<()>) {
    // Bind to port 0 to let the OS choose an available port
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .expect("Server error");
    });

    (addr, shutdown_tx)
}

/// Test server wrapper running the REST API over in-memory stores.
pub struct TestServer {
    pub addr: SocketAddr,
    pub client: Client,
    pub acd_store: Arc<MemoryStore<ContainerDatabaseSpec>>,
    pub adb_store: Arc<MemoryStore<AutonomousDatabaseSpec>>,
    shutdown_tx: oneshot::Sender<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let acd_store = Arc::new(MemoryStore::new());
        let adb_store = Arc::new(MemoryStore::new());
        let app_state = Arc::new(AppState {
            container_databases: AdmissionBoundary::new(acd_store.clone()),
            autonomous_databases: AdmissionBoundary::new(adb_store.clone()),
        });

        let (addr, shutdown_tx) = serve(create_router(app_state)).await;

        Self {
            addr,
            client: Client::new(),
            acd_store,
            adb_store,
            shutdown_tx,
        }
    }

    /// Get base URL for the REST API.
    pub fn base_url(&self) -> String {
        format!("http://{}/api/v1", self.addr)
    }

    pub async fn get(&self, path: &str) -> ReqwestResponse {
        self.client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> ReqwestResponse {
        self.client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn put_json<T: Serialize>(&self, path: &str, body: &T) -> ReqwestResponse {
        self.client
            .put(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn delete(&self, path: &str) -> ReqwestResponse {
        self.client
            .delete(format!("{}{}", self.base_url(), path))
            .send()
            .await
            .expect("Request failed")
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// What the fake provider answers with instead of handling a request.
#[derive(Clone)]
pub enum Fault {
    Status(StatusCode),
    Garbage,
}

#[derive(Default)]
struct ProviderState {
    next_id: u32,
    databases: BTreeMap<String, (AutonomousDatabaseSpec, LifecyclePhase)>,
    faults: Vec<Fault>,
    requests: Vec<String>,
}

type Shared = Arc<Mutex<ProviderState>>;

/// Autonomous database provider API over HTTP.
pub struct FakeProviderServer {
    pub addr: SocketAddr,
    state: Shared,
    shutdown_tx: oneshot::Sender<()>,
}

impl FakeProviderServer {
    pub async fn spawn() -> Self {
        let state: Shared = Arc::default();
        let router = Router::new()
            .route("/autonomous-databases", post(provider_create))
            .route(
                "/autonomous-databases/{id}",
                get(provider_get)
                    .patch(provider_update)
                    .delete(provider_delete),
            )
            .route(
                "/autonomous-databases/{id}/actions/{action}",
                post(provider_action),
            )
            .with_state(state.clone());
        let (addr, shutdown_tx) = serve(router).await;
        Self {
            addr,
            state,
            shutdown_tx,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The next request is answered with `fault`.
    pub fn fail_next(&self, fault: Fault) {
        self.state.lock().unwrap().faults.push(fault);
    }

    pub fn set_phase(&self, id: &str, phase: LifecyclePhase) {
        let mut state = self.state.lock().unwrap();
        state.databases.get_mut(id).expect("unknown id").1 = phase;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lock().unwrap().databases.contains_key(id)
    }

    /// `METHOD path` of every request received, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn observe(id: &str, spec: &AutonomousDatabaseSpec, phase: LifecyclePhase) -> AutonomousDatabaseObserved {
    AutonomousDatabaseObserved {
        id: id.to_string(),
        compartment_id: spec.compartment_id.clone(),
        db_name: spec.db_name.clone(),
        display_name: spec.display_name.clone().or_else(|| spec.db_name.clone()),
        cpu_core_count: spec.cpu_core_count.or(Some(1)),
        db_version: Some("19c".to_string()),
        lifecycle_state: phase,
        ..Default::default()
    }
}

/// Log the request and pop a pending fault.
fn intercept(state: &Shared, request: String) -> Option<Response> {
    let mut state = state.lock().unwrap();
    state.requests.push(request);
    if state.faults.is_empty() {
        return None;
    }
    Some(match state.faults.remove(0) {
        Fault::Status(status) => (status, "injected failure").into_response(),
        Fault::Garbage => (StatusCode::OK, "{not json").into_response(),
    })
}

async fn provider_create(
    State(state): State<Shared>,
    Json(spec): Json<AutonomousDatabaseSpec>,
) -> Response {
    if let Some(fault) = intercept(&state, "POST /autonomous-databases".to_string()) {
        return fault;
    }
    let mut state = state.lock().unwrap();
    state.next_id += 1;
    let id = format!("ocid1.autonomousdatabase.{}", state.next_id);
    state
        .databases
        .insert(id.clone(), (spec.clone(), LifecyclePhase::Provisioning));
    let observed = observe(&id, &spec, LifecyclePhase::Provisioning);
    Json(Provisioned { id, observed }).into_response()
}

async fn provider_get(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    if let Some(fault) = intercept(&state, format!("GET {}", id)) {
        return fault;
    }
    let state = state.lock().unwrap();
    match state.databases.get(&id) {
        Some((spec, phase)) => Json(observe(&id, spec, *phase)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn provider_update(
    State(state): State<Shared>,
    Path(id): Path<String>,
    Json(delta): Json<AutonomousDatabaseSpec>,
) -> Response {
    if let Some(fault) = intercept(&state, format!("PATCH {}", id)) {
        return fault;
    }
    let mut state = state.lock().unwrap();
    match state.databases.get_mut(&id) {
        Some((spec, phase)) => {
            spec.overlay(&delta);
            *phase = LifecyclePhase::Updating;
            Json(observe(&id, spec, *phase)).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn provider_delete(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    if let Some(fault) = intercept(&state, format!("DELETE {}", id)) {
        return fault;
    }
    match state.lock().unwrap().databases.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn provider_action(
    State(state): State<Shared>,
    Path((id, action)): Path<(String, String)>,
    body: String,
) -> Response {
    let mut request = format!("POST {}/actions/{}", id, action);
    if !body.is_empty() {
        request = format!("{} {}", request, body);
    }
    if let Some(fault) = intercept(&state, request) {
        return fault;
    }
    let mut state = state.lock().unwrap();
    let Some((spec, phase)) = state.databases.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    *phase = match action.as_str() {
        "start" => LifecyclePhase::Starting,
        "stop" => LifecyclePhase::Stopping,
        "restart" => LifecyclePhase::Restarting,
        "terminate" => LifecyclePhase::Terminating,
        "switchover" | "failover" => LifecyclePhase::RoleChangeInProgress,
        "restore" => LifecyclePhase::RestoreInProgress,
        "clone" => *phase,
        _ => return StatusCode::BAD_REQUEST.into_response(),
    };
    Json(observe(&id, spec, *phase)).into_response()
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached in time");
}
