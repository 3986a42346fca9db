use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use c2s_core::ContainerSnapshot;
use futures_util::stream::{self, StreamExt};
use futures_util::future;
use tokio::sync::mpsc;

use crate::error::RuntimeError;
use crate::{ContainerRuntime, EventStream, LifecycleEvent, NetworkInfo};

/// Scripted outcome of one `subscribe` call.
#[derive(Debug)]
pub enum FeedScript {
    /// Connects, yields these items, then disconnects.
    Events(Vec<Result<LifecycleEvent, RuntimeError>>),
    /// Connects and relays the channel; disconnects when the sender drops.
    Channel(mpsc::UnboundedReceiver<Result<LifecycleEvent, RuntimeError>>),
    /// Never acknowledges the subscription.
    Hang,
    /// Fails the subscription outright.
    Fail(RuntimeError),
}

#[derive(Debug, Default)]
struct Inner {
    containers: BTreeMap<String, ContainerSnapshot>,
    networks: Vec<NetworkInfo>,
    feeds: VecDeque<FeedScript>,
    failing_inspect: HashMap<String, String>,
    subscribe_attempts: u64,
    inspected: Vec<String>,
}

/// In-memory runtime for tests and simulations.
///
/// Once scripted feeds run out, `subscribe` returns a feed that stays
/// connected and silent.
#[derive(Debug, Default)]
pub struct InMemoryRuntime {
    inner: Mutex<Inner>,
}

impl InMemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&self, container: ContainerSnapshot) {
        let mut inner = self.inner.lock().expect("runtime lock");
        inner.containers.insert(container.id.clone(), container);
    }

    pub fn remove_container(&self, id: &str) {
        let mut inner = self.inner.lock().expect("runtime lock");
        inner.containers.remove(id);
    }

    pub fn set_status(&self, id: &str, status: &str) {
        let mut inner = self.inner.lock().expect("runtime lock");
        if let Some(container) = inner.containers.get_mut(id) {
            container.status = Some(status.to_string());
        }
    }

    pub fn set_networks(&self, networks: Vec<NetworkInfo>) {
        self.inner.lock().expect("runtime lock").networks = networks;
    }

    pub fn push_feed(&self, script: FeedScript) {
        self.inner
            .lock()
            .expect("runtime lock")
            .feeds
            .push_back(script);
    }

    /// Makes `inspect(id)` fail with a transport error.
    pub fn fail_inspect(&self, id: &str, message: &str) {
        self.inner
            .lock()
            .expect("runtime lock")
            .failing_inspect
            .insert(id.to_string(), message.to_string());
    }

    pub fn subscribe_attempts(&self) -> u64 {
        self.inner.lock().expect("runtime lock").subscribe_attempts
    }

    pub fn inspected(&self) -> Vec<String> {
        self.inner.lock().expect("runtime lock").inspected.clone()
    }
}

#[async_trait]
impl ContainerRuntime for InMemoryRuntime {
    async fn list_running_containers(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError> {
        let inner = self.inner.lock().expect("runtime lock");
        Ok(inner
            .containers
            .values()
            .filter(|container| container.is_running())
            .cloned()
            .collect())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot, RuntimeError> {
        let mut inner = self.inner.lock().expect("runtime lock");
        inner.inspected.push(container_id.to_string());
        if let Some(message) = inner.failing_inspect.get(container_id) {
            return Err(RuntimeError::Transport(message.clone()));
        }
        inner
            .containers
            .get(container_id)
            .cloned()
            .ok_or_else(|| RuntimeError::NotFound(format!("No such container: {container_id}")))
    }

    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, RuntimeError> {
        Ok(self.inner.lock().expect("runtime lock").networks.clone())
    }

    async fn subscribe(&self) -> Result<EventStream, RuntimeError> {
        let script = {
            let mut inner = self.inner.lock().expect("runtime lock");
            inner.subscribe_attempts += 1;
            inner.feeds.pop_front()
        };
        match script {
            None => Ok(stream::pending().boxed()),
            Some(FeedScript::Events(items)) => Ok(stream::iter(items).boxed()),
            Some(FeedScript::Channel(rx)) => Ok(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            })
            .boxed()),
            Some(FeedScript::Hang) => {
                future::pending::<()>().await;
                Err(RuntimeError::Disconnected("hung subscription".into()))
            }
            Some(FeedScript::Fail(err)) => Err(err),
        }
    }
}
