//! Drives a reconciler from store watch events and a periodic resync.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use converge_core::{Outcome, Reconcile, ReconcileState, ResourceStore, WatchEvent};

use crate::queue::{Lease, WorkQueue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Parallel reconcile workers.
    pub workers: usize,
    /// Every record is queued at this interval.
    pub resync_period: Duration,
    /// Requeue delay after a pass failed outside the provider.
    pub error_requeue: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            resync_period: Duration::from_secs(300),
            error_requeue: Duration::from_secs(5),
        }
    }
}

pub struct Controller<S> {
    reconciler: Arc<dyn Reconcile>,
    store: Arc<dyn ResourceStore<S>>,
    queue: Arc<WorkQueue>,
    /// Generation each record was last queued at.
    generations: Mutex<HashMap<String, u64>>,
    config: ControllerConfig,
}

impl<S> Controller<S>
where
    S: Send + Sync + 'static,
{
    pub fn new(
        reconciler: Arc<dyn Reconcile>,
        store: Arc<dyn ResourceStore<S>>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            reconciler,
            store,
            queue: Arc::new(WorkQueue::new()),
            generations: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    fn generations(&self) -> MutexGuard<'_, HashMap<String, u64>> {
        self.generations.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let kind = self.reconciler.kind();
        info!(
            "Starting {} controller with {} workers",
            kind, self.config.workers
        );

        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        tasks.push(tokio::spawn(
            Arc::clone(&self).watch_events(shutdown.clone()),
        ));
        tasks.push(tokio::spawn(Arc::clone(&self).resync(shutdown.clone())));
        for id in 0..self.config.workers.max(1) {
            tasks.push(tokio::spawn(Arc::clone(&self).worker(id)));
        }

        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("Stopping {} controller", kind);
        self.queue.shutdown();
        for task in tasks {
            let _ = task.await;
        }
    }

    async fn watch_events(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.store.subscribe();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.on_event(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(
                            "{} watch lagged by {} events, queueing all records",
                            self.reconciler.kind(),
                            missed
                        );
                        self.enqueue_all().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("{} watch closed", self.reconciler.kind());
                        return;
                    }
                },
                _ = shutdown.changed() => return,
            }
        }
    }

    /// Queue the record unless the event is a write at a generation that
    /// was already queued. Those are status and metadata writes by passes,
    /// which schedule their own requeue; queueing them would cut a retry
    /// backoff short.
    fn on_event(&self, event: WatchEvent) {
        let name = event.name();
        match &event {
            WatchEvent::Created { generation, .. } | WatchEvent::Modified { generation, .. } => {
                let previous = self.generations().insert(name.to_string(), *generation);
                if previous == Some(*generation) {
                    debug!(
                        "{} {} written without a spec change, not queued",
                        self.reconciler.kind(),
                        name
                    );
                    return;
                }
            }
            WatchEvent::Deleted { .. } => {
                self.generations().remove(name);
            }
            WatchEvent::DeletionRequested { .. } => {}
        }
        self.queue.add(name);
    }

    async fn resync(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.resync_period);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.enqueue_all().await,
                _ = shutdown.changed() => return,
            }
        }
    }

    async fn enqueue_all(&self) {
        match self.store.list().await {
            Ok(records) => {
                for record in &records {
                    let metadata = &record.value.metadata;
                    self.generations()
                        .insert(metadata.name.clone(), metadata.generation);
                    self.queue.add(&metadata.name);
                }
                debug!(
                    "Queued {} {} records",
                    records.len(),
                    self.reconciler.kind()
                );
            }
            Err(e) => error!("Failed to list {} records: {}", self.reconciler.kind(), e),
        }
    }

    async fn worker(self: Arc<Self>, id: usize) {
        debug!("{} worker {} started", self.reconciler.kind(), id);
        while let Some(lease) = self.queue.next().await {
            self.process(&lease).await;
            self.queue.done(&lease);
        }
        debug!("{} worker {} stopped", self.reconciler.kind(), id);
    }

    /// Run one pass in its own task so a panic stays contained.
    async fn process(&self, lease: &Lease) {
        let kind = self.reconciler.kind();
        let name = lease.key.clone();

        // A pass that starts from an error may be stuck on a slow provider;
        // a newer event for the key replaces it.
        let interruptible = matches!(
            self.store.get(&name).await,
            Ok(Some(current)) if current.value.status.state == ReconcileState::Error
        );

        let reconciler = Arc::clone(&self.reconciler);
        let key = name.clone();
        let mut task = tokio::spawn(async move { reconciler.reconcile(&key).await });

        let result = if interruptible {
            tokio::select! {
                biased;
                result = &mut task => result,
                _ = lease.superseded.notified() => {
                    task.abort();
                    debug!("Pass for {} {} superseded by a newer event", kind, name);
                    return;
                }
            }
        } else {
            task.await
        };

        match result {
            Ok(Ok(Outcome::Done)) => {}
            Ok(Ok(Outcome::RequeueAfter(delay))) => self.queue.add_after(&name, delay),
            Ok(Err(e)) => {
                error!("Reconcile of {} {} failed: {}", kind, name, e);
                if e.is_transient() {
                    self.queue.add_after(&name, self.config.error_requeue);
                }
            }
            Err(e) if e.is_panic() => {
                error!("Reconcile of {} {} panicked", kind, name);
                self.queue.add_after(&name, self.config.error_requeue);
            }
            Err(e) => warn!("Reconcile of {} {} was cancelled: {}", kind, name, e),
        }
    }
}
