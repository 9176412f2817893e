use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use converge_core::Resource;
use converge_core::resources::{AutonomousDatabase, ContainerDatabase};

use super::handlers::{self, Admits, AppState};

fn kind_routes<R: Resource>() -> Router<Arc<AppState>>
where
    AppState: Admits<R>,
{
    Router::new()
        .route(
            &format!("/{}", R::KIND),
            get(handlers::list::<R>).post(handlers::create::<R>),
        )
        .route(
            &format!("/{}/{{name}}", R::KIND),
            get(handlers::get::<R>)
                .put(handlers::update::<R>)
                .delete(handlers::delete::<R>),
        )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // System
        .route("/version", get(handlers::get_version))
        .merge(kind_routes::<ContainerDatabase>())
        .merge(kind_routes::<AutonomousDatabase>());

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
