use std::sync::Arc;
use std::time::Duration;

use c2s_runtime::{bridge_gateway, ContainerRuntime, EventStream, LifecycleEvent, RuntimeError};
use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;

/// What the supervisor forwards to the event worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeSignal {
    Lifecycle(LifecycleEvent),
    /// The feed was lost and re-established; events may have been missed.
    Reconnected,
}

/// Owns the runtime event feed and the learned bridge gateway.
///
/// Each connect attempt subscribes and looks up the bridge network under
/// one timeout. A timed out attempt is retried immediately.
pub struct ConnectionSupervisor<R> {
    runtime: Arc<R>,
    connect_timeout: Duration,
    reconnect_delay: Duration,
    bridge_network: String,
    gateway: watch::Sender<String>,
    attempts: u64,
}

impl<R: ContainerRuntime> ConnectionSupervisor<R> {
    /// Returns the supervisor and a receiver that always holds the current
    /// gateway, seeded with `config.default_gateway`.
    pub fn new(runtime: Arc<R>, config: &SyncConfig) -> (Self, watch::Receiver<String>) {
        let (gateway, gateway_rx) = watch::channel(config.default_gateway.clone());
        let supervisor = Self {
            runtime,
            connect_timeout: config.connect_timeout,
            reconnect_delay: config.reconnect_delay,
            bridge_network: config.bridge_network.clone(),
            gateway,
            attempts: 0,
        };
        (supervisor, gateway_rx)
    }

    /// Connect attempts made so far, timed out ones included.
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn gateway(&self) -> String {
        self.gateway.borrow().clone()
    }

    /// Connects, retrying on timeout. Any other failure is returned.
    pub async fn connect(&mut self) -> Result<EventStream, RuntimeError> {
        loop {
            self.attempts += 1;
            let attempt = self.attempts;
            match timeout(self.connect_timeout, self.handshake()).await {
                Ok(Ok(feed)) => {
                    info!(attempt, gateway = %self.gateway(), "connected to container runtime");
                    return Ok(feed);
                }
                Ok(Err(err)) => {
                    error!(attempt, %err, "runtime connection failed");
                    return Err(err);
                }
                Err(_) => {
                    let err = RuntimeError::Timeout(self.connect_timeout);
                    warn!(attempt, %err, "runtime connection attempt abandoned, retrying");
                }
            }
        }
    }

    async fn handshake(&self) -> Result<EventStream, RuntimeError> {
        let feed = self.runtime.subscribe().await?;
        let networks = self.runtime.list_networks().await?;
        match bridge_gateway(&networks, &self.bridge_network) {
            Some(gateway) => {
                debug!(network = %self.bridge_network, %gateway, "bridge gateway learned");
                self.gateway.send_replace(gateway);
            }
            None => warn!(
                network = %self.bridge_network,
                gateway = %self.gateway(),
                "bridge network has no gateway, keeping previous address"
            ),
        }
        Ok(feed)
    }

    /// Forwards lifecycle events until shutdown or until the receiver goes
    /// away. A lost feed is re-established and announced as
    /// [`RuntimeSignal::Reconnected`].
    pub async fn run(
        mut self,
        feed: EventStream,
        events: mpsc::Sender<RuntimeSignal>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut feed = feed;
        loop {
            let next = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => {
                    info!("supervisor stopping");
                    return;
                }
                next = feed.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    debug!(kind = %event.kind, container = %event.container_id, "lifecycle event");
                    if events.send(RuntimeSignal::Lifecycle(event)).await.is_err() {
                        debug!("event worker gone, supervisor stopping");
                        return;
                    }
                    continue;
                }
                Some(Err(err)) => warn!(%err, "event feed disconnected"),
                None => warn!("event feed closed"),
            }

            let Some(next_feed) = self.reconnect(&mut shutdown).await else {
                info!("supervisor stopping");
                return;
            };
            feed = next_feed;
            if events.send(RuntimeSignal::Reconnected).await.is_err() {
                return;
            }
        }
    }

    async fn reconnect(&mut self, shutdown: &mut watch::Receiver<bool>) -> Option<EventStream> {
        loop {
            tokio::select! {
                _ = shutdown_requested(shutdown) => return None,
                result = self.connect() => {
                    if let Ok(feed) = result {
                        return Some(feed);
                    }
                }
            }
            tokio::select! {
                _ = shutdown_requested(shutdown) => return None,
                _ = sleep(self.reconnect_delay) => {}
            }
        }
    }
}

/// Resolves once shutdown is flagged or its sender is dropped.
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use c2s_runtime::{FeedScript, InMemoryRuntime, LifecycleEvent, NetworkInfo, RuntimeError};
    use tokio::sync::{mpsc, watch};

    use super::{ConnectionSupervisor, RuntimeSignal};
    use crate::config::SyncConfig;

    fn config() -> SyncConfig {
        SyncConfig {
            connect_timeout: Duration::from_millis(50),
            reconnect_delay: Duration::from_millis(10),
            ..SyncConfig::default()
        }
    }

    #[tokio::test]
    async fn connect_learns_bridge_gateway() {
        let runtime = Arc::new(InMemoryRuntime::new());
        runtime.set_networks(vec![NetworkInfo {
            name: "bridge".into(),
            gateways: vec!["172.20.0.1".into()],
        }]);
        let (mut supervisor, gateway) = ConnectionSupervisor::new(runtime, &config());
        assert_eq!(*gateway.borrow(), "172.17.0.1");

        supervisor.connect().await.expect("connect");
        assert_eq!(*gateway.borrow(), "172.20.0.1");
        assert_eq!(supervisor.attempts(), 1);
    }

    #[tokio::test]
    async fn missing_bridge_keeps_default_gateway() {
        let runtime = Arc::new(InMemoryRuntime::new());
        let (mut supervisor, gateway) = ConnectionSupervisor::new(runtime, &config());
        supervisor.connect().await.expect("connect");
        assert_eq!(*gateway.borrow(), "172.17.0.1");
    }

    #[tokio::test]
    async fn timed_out_connect_is_retried() {
        let runtime = Arc::new(InMemoryRuntime::new());
        runtime.push_feed(FeedScript::Hang);
        let (mut supervisor, _gateway) = ConnectionSupervisor::new(runtime.clone(), &config());

        supervisor.connect().await.expect("second attempt connects");
        assert_eq!(supervisor.attempts(), 2);
        assert_eq!(runtime.subscribe_attempts(), 2);
    }

    #[tokio::test]
    async fn failed_connect_is_reported() {
        let runtime = Arc::new(InMemoryRuntime::new());
        runtime.push_feed(FeedScript::Fail(RuntimeError::Transport("refused".into())));
        let (mut supervisor, _gateway) = ConnectionSupervisor::new(runtime, &config());

        let err = supervisor.connect().await.err().expect("transport failure");
        assert!(matches!(err, RuntimeError::Transport(_)));
        assert_eq!(supervisor.attempts(), 1);
    }

    #[tokio::test]
    async fn disconnect_triggers_one_reconnect() {
        let runtime = Arc::new(InMemoryRuntime::new());
        runtime.push_feed(FeedScript::Events(vec![Ok(LifecycleEvent::start("a"))]));
        let (mut supervisor, _gateway) = ConnectionSupervisor::new(runtime.clone(), &config());
        let feed = supervisor.connect().await.expect("connect");

        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(supervisor.run(feed, tx, stop_rx));

        assert_eq!(
            rx.recv().await,
            Some(RuntimeSignal::Lifecycle(LifecycleEvent::start("a")))
        );
        assert_eq!(rx.recv().await, Some(RuntimeSignal::Reconnected));
        assert_eq!(runtime.subscribe_attempts(), 2);

        stop_tx.send(true).expect("supervisor listening");
        task.await.expect("supervisor task");
        assert_eq!(runtime.subscribe_attempts(), 2);
    }

    #[tokio::test]
    async fn failed_reconnect_waits_and_retries() {
        let runtime = Arc::new(InMemoryRuntime::new());
        runtime.push_feed(FeedScript::Events(Vec::new()));
        runtime.push_feed(FeedScript::Fail(RuntimeError::Transport("refused".into())));
        let (mut supervisor, _gateway) = ConnectionSupervisor::new(runtime.clone(), &config());
        let feed = supervisor.connect().await.expect("connect");

        let (tx, mut rx) = mpsc::channel(8);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(supervisor.run(feed, tx, stop_rx));

        assert_eq!(rx.recv().await, Some(RuntimeSignal::Reconnected));
        assert_eq!(runtime.subscribe_attempts(), 3);

        stop_tx.send(true).expect("supervisor listening");
        task.await.expect("supervisor task");
    }
}
