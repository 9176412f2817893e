use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use converge_core::resources::{
    AutonomousDatabase, AutonomousDatabaseSpec, ContainerDatabase, ContainerDatabaseSpec,
};
use converge_core::{
    AdmissionBoundary, EventRecorder, MemoryStore, Reconciler, ReconcilerConfig, ResourceStore,
    TracingRecorder,
};
use converge_operator::clients::HttpProviderClient;
use converge_operator::rest::{AppState, create_router};
use converge_operator::{Args, Controller, ControllerConfig};

fn controller_for<R>(
    store: Arc<dyn ResourceStore<R::Spec>>,
    recorder: Arc<dyn EventRecorder>,
    args: &Args,
    reconciler_config: &ReconcilerConfig,
    controller_config: &ControllerConfig,
) -> Result<Arc<Controller<R::Spec>>>
where
    R: converge_core::Resource,
{
    let provider = HttpProviderClient::<R>::new(&args.provider_endpoint, reconciler_config.call_timeout)
        .with_context(|| format!("Failed to build {} provider client", R::KIND))?;
    let reconciler = Reconciler::<R>::new(
        store.clone(),
        Arc::new(provider),
        recorder,
        reconciler_config.clone(),
    );
    Ok(Arc::new(Controller::new(
        Arc::new(reconciler),
        store,
        controller_config.clone(),
    )))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("converge_operator=info".parse()?)
                .add_directive("converge_core=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let reconciler_config = args.reconciler_config();
    let controller_config = args.controller_config();

    info!(
        "Starting converge-operator - REST: {}, provider: {}",
        args.listen, args.provider_endpoint
    );

    let acd_store: Arc<dyn ResourceStore<ContainerDatabaseSpec>> = Arc::new(MemoryStore::new());
    let adb_store: Arc<dyn ResourceStore<AutonomousDatabaseSpec>> = Arc::new(MemoryStore::new());
    let recorder: Arc<dyn EventRecorder> = Arc::new(TracingRecorder);

    let acd_controller = controller_for::<ContainerDatabase>(
        acd_store.clone(),
        recorder.clone(),
        &args,
        &reconciler_config,
        &controller_config,
    )?;
    let adb_controller = controller_for::<AutonomousDatabase>(
        adb_store.clone(),
        recorder,
        &args,
        &reconciler_config,
        &controller_config,
    )?;

    let app_state = Arc::new(AppState {
        container_databases: AdmissionBoundary::new(acd_store),
        autonomous_databases: AdmissionBoundary::new(adb_store),
    });
    let router = create_router(app_state);

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    info!("REST API listening on {}", args.listen);

    // Create shutdown signal channel
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);

    let acd_handle = tokio::spawn(acd_controller.run(shutdown_tx.subscribe()));
    let adb_handle = tokio::spawn(adb_controller.run(shutdown_tx.subscribe()));

    let rest_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await
    });

    // Wait for shutdown signal
    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    let _ = shutdown_tx.send(true);

    let _ = rest_handle.await;
    let _ = acd_handle.await;
    let _ = adb_handle.await;

    info!("Shutdown complete");
    Ok(())
}
