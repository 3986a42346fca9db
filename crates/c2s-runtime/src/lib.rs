//! Container runtime access for container sync.
//!
//! [`ContainerRuntime`] covers listing, inspection, network discovery, and
//! the lifecycle event feed. [`DockerRuntime`] talks to the Docker Engine
//! API; [`InMemoryRuntime`] scripts containers and feeds for tests.

pub mod docker;
pub mod error;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use c2s_core::ContainerSnapshot;
use futures_util::stream::BoxStream;

pub use docker::{DockerRuntime, DockerRuntimeConfig};
pub use error::RuntimeError;
pub use memory::{FeedScript, InMemoryRuntime};

/// Lifecycle transitions the sync engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleKind {
    Start,
    Die,
}

impl LifecycleKind {
    /// Parses a runtime action name; other actions are ignored.
    pub fn from_action(action: &str) -> Option<Self> {
        match action {
            "start" => Some(Self::Start),
            "die" => Some(Self::Die),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Die => f.write_str("die"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub container_id: String,
}

impl LifecycleEvent {
    pub fn start(id: impl Into<String>) -> Self {
        Self {
            kind: LifecycleKind::Start,
            container_id: id.into(),
        }
    }

    pub fn die(id: impl Into<String>) -> Self {
        Self {
            kind: LifecycleKind::Die,
            container_id: id.into(),
        }
    }
}

/// A runtime network and its configured gateways, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetworkInfo {
    pub name: String,
    pub gateways: Vec<String>,
}

/// Live lifecycle feed. The stream ending, or yielding an error, means the
/// feed disconnected.
pub type EventStream = BoxStream<'static, Result<LifecycleEvent, RuntimeError>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list_running_containers(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError>;
    /// Full inspection record. Fails with `NotFound` once the id is gone.
    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot, RuntimeError>;
    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, RuntimeError>;
    /// Opens the event feed. Resolves once the runtime acknowledged the
    /// subscription.
    async fn subscribe(&self) -> Result<EventStream, RuntimeError>;
}

/// First gateway of the first network named `bridge_network`.
pub fn bridge_gateway(networks: &[NetworkInfo], bridge_network: &str) -> Option<String> {
    networks
        .iter()
        .find(|network| network.name == bridge_network)
        .and_then(|network| network.gateways.first())
        .cloned()
}
