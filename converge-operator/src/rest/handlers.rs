use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use converge_core::resources::{AutonomousDatabase, ContainerDatabase};
use converge_core::store::Versioned;
use converge_core::{
    AdmissionBoundary, AdmissionError, FieldViolation, Record, Resource, ResourceVersion,
};

/// Shared application state
pub struct AppState {
    pub container_databases: AdmissionBoundary<ContainerDatabase>,
    pub autonomous_databases: AdmissionBoundary<AutonomousDatabase>,
}

/// Picks the admission boundary for a resource kind.
pub trait Admits<R: Resource> {
    fn admission(&self) -> &AdmissionBoundary<R>;
}

impl Admits<ContainerDatabase> for AppState {
    fn admission(&self) -> &AdmissionBoundary<ContainerDatabase> {
        &self.container_databases
    }
}

impl Admits<AutonomousDatabase> for AppState {
    fn admission(&self) -> &AdmissionBoundary<AutonomousDatabase> {
        &self.autonomous_databases
    }
}

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub code: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<FieldViolation>,
}

impl ApiError {
    fn new(code: u16, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code,
            reasons: Vec::new(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        match e {
            AdmissionError::Rejected(reasons) => ApiError {
                error: "Rejected".to_string(),
                code: 422,
                reasons,
            },
            AdmissionError::NotFound(name) => ApiError::new(404, format!("{} not found", name)),
            AdmissionError::AlreadyExists(name) => {
                ApiError::new(409, format!("{} already exists", name))
            }
            AdmissionError::Conflict(msg) => ApiError::new(409, msg),
            AdmissionError::Store(e) => ApiError::new(500, e.to_string()),
        }
    }
}

type Stored<R> = Json<Versioned<Record<<R as Resource>::Spec>>>;

// === Version ===

/// Version information
#[derive(Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

pub async fn get_version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// === Resources ===

#[derive(Deserialize)]
pub struct CreateRequest<S> {
    pub name: String,
    pub spec: S,
}

#[derive(Deserialize)]
pub struct UpdateRequest<S> {
    pub spec: S,
    /// Only apply if the record is still at this version.
    #[serde(default)]
    pub resource_version: Option<ResourceVersion>,
}

#[derive(Serialize, Deserialize)]
pub struct DeleteResponse {
    pub name: String,
    /// Finalizers still hold the record.
    pub pending: bool,
}

pub async fn list<R: Resource>(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Versioned<Record<R::Spec>>>>, ApiError>
where
    AppState: Admits<R>,
{
    let records = Admits::<R>::admission(state.as_ref()).list().await?;
    Ok(Json(records))
}

pub async fn create<R: Resource>(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRequest<R::Spec>>,
) -> Result<(StatusCode, Stored<R>), ApiError>
where
    AppState: Admits<R>,
{
    let stored = Admits::<R>::admission(state.as_ref())
        .create(&req.name, req.spec)
        .await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn get<R: Resource>(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Stored<R>, ApiError>
where
    AppState: Admits<R>,
{
    let stored = Admits::<R>::admission(state.as_ref()).get(&name).await?;
    Ok(Json(stored))
}

pub async fn update<R: Resource>(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(req): Json<UpdateRequest<R::Spec>>,
) -> Result<Stored<R>, ApiError>
where
    AppState: Admits<R>,
{
    let stored = Admits::<R>::admission(state.as_ref())
        .update(&name, req.spec, req.resource_version)
        .await?;
    Ok(Json(stored))
}

pub async fn delete<R: Resource>(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError>
where
    AppState: Admits<R>,
{
    let pending = Admits::<R>::admission(state.as_ref())
        .delete(&name)
        .await?
        .is_some();
    info!("Delete of {} {} accepted (pending: {})", R::KIND, name, pending);
    Ok(Json(DeleteResponse { name, pending }))
}
