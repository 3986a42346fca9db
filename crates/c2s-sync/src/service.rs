use std::collections::HashMap;
use std::sync::Arc;

use c2s_registry::Registry;
use c2s_runtime::ContainerRuntime;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::engine::{ReconcileReport, ReconciliationEngine};
use crate::error::SyncError;
use crate::supervisor::{ConnectionSupervisor, RuntimeSignal};

/// Connects, reconciles, then applies lifecycle events until shutdown.
pub struct SyncService<G, R> {
    engine: ReconciliationEngine<G, R>,
    supervisor: ConnectionSupervisor<R>,
    config: SyncConfig,
}

impl<G, R> SyncService<G, R>
where
    G: Registry + 'static,
    R: ContainerRuntime + 'static,
{
    pub fn new(registry: Arc<G>, runtime: Arc<R>, config: SyncConfig) -> Self {
        let (supervisor, gateway) = ConnectionSupervisor::new(Arc::clone(&runtime), &config);
        let engine = ReconciliationEngine::new(registry, runtime, config.layout.clone(), gateway);
        Self {
            engine,
            supervisor,
            config,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine<G, R> {
        &self.engine
    }

    /// Connects once to learn the gateway, then runs a single reconciliation.
    pub async fn reconcile_once(&mut self) -> Result<ReconcileReport, SyncError> {
        let _feed = self.supervisor.connect().await?;
        self.engine.reconcile().await
    }

    /// Runs until `shutdown` flips to `true`.
    ///
    /// The supervisor starts before the startup reconciliation so events
    /// raised meanwhile queue up. Handlers for different containers run
    /// concurrently, while events for one container apply in arrival order.
    /// Failures are logged and do not stop the loop. In-flight handlers
    /// finish before this returns.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), SyncError> {
        let SyncService {
            engine,
            mut supervisor,
            config,
        } = self;

        let feed = supervisor.connect().await?;
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let supervisor_task = tokio::spawn(supervisor.run(feed, events_tx, shutdown));

        let report = match engine.reconcile().await {
            Ok(report) => report,
            Err(err) => {
                supervisor_task.abort();
                return Err(err);
            }
        };
        if !report.is_clean() {
            warn!(failed = report.failed.len(), "some containers failed to register");
        }

        dispatch(engine, events_rx, config.resync_on_reconnect).await;
        supervisor_task.await.map_err(task_error)?;
        info!("sync service stopped");
        Ok(())
    }
}

async fn dispatch<G, R>(
    engine: ReconciliationEngine<G, R>,
    mut events: mpsc::Receiver<RuntimeSignal>,
    resync_on_reconnect: bool,
) where
    G: Registry + 'static,
    R: ContainerRuntime + 'static,
{
    let mut handlers = JoinSet::new();
    // Completion of the latest handler per container id.
    let mut in_flight: HashMap<String, oneshot::Receiver<()>> = HashMap::new();
    while let Some(signal) = events.recv().await {
        while let Some(done) = handlers.try_join_next() {
            log_join(done);
        }
        in_flight.retain(|_, done| matches!(done.try_recv(), Err(TryRecvError::Empty)));

        let engine = engine.clone();
        match signal {
            RuntimeSignal::Lifecycle(event) => {
                let previous = in_flight.remove(&event.container_id);
                let (done_tx, done_rx) = oneshot::channel();
                in_flight.insert(event.container_id.clone(), done_rx);
                handlers.spawn(async move {
                    if let Some(previous) = previous {
                        // Dropped senders (panicked handlers) release the chain too.
                        let _ = previous.await;
                    }
                    if let Err(err) = engine.handle_event(&event).await {
                        warn!(
                            kind = %event.kind,
                            container = %event.container_id,
                            %err,
                            "lifecycle event failed"
                        );
                    }
                    let _ = done_tx.send(());
                });
            }
            RuntimeSignal::Reconnected if resync_on_reconnect => {
                info!("event feed reconnected, reconciling");
                handlers.spawn(async move {
                    if let Err(err) = engine.reconcile().await {
                        warn!(%err, "reconciliation after reconnect failed");
                    }
                });
            }
            RuntimeSignal::Reconnected => debug!("event feed reconnected"),
        }
    }

    while let Some(done) = handlers.join_next().await {
        log_join(done);
    }
}

fn log_join(done: Result<(), JoinError>) {
    if let Err(err) = done {
        warn!(%err, "event handler task failed");
    }
}

fn task_error(err: JoinError) -> SyncError {
    SyncError::Task(err.to_string())
}
