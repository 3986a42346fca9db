use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, ListContainersOptions};
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, EndpointSettings, EventMessage,
    EventMessageTypeEnum, Network,
};
use bollard::network::ListNetworksOptions;
use bollard::system::EventsOptions;
use bollard::{Docker, API_DEFAULT_VERSION};
use c2s_core::{ContainerSnapshot, NetworkEndpoint};
use futures_util::{future, StreamExt};
use tracing::{debug, info};

use crate::error::RuntimeError;
use crate::{ContainerRuntime, EventStream, LifecycleEvent, LifecycleKind, NetworkInfo};

#[derive(Debug, Clone)]
pub struct DockerRuntimeConfig {
    /// Unix socket path, or a `tcp://` / `http://` address.
    pub endpoint: String,
    pub request_timeout: Duration,
}

impl DockerRuntimeConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// Docker Engine API runtime backed by `bollard`.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect(config: &DockerRuntimeConfig) -> Result<Self, RuntimeError> {
        let timeout = config.request_timeout.as_secs().max(1);
        let docker = match config.endpoint.strip_prefix("tcp://") {
            Some(addr) => Docker::connect_with_http(
                &format!("http://{addr}"),
                timeout,
                API_DEFAULT_VERSION,
            )?,
            None if config.endpoint.starts_with("http://") => {
                Docker::connect_with_http(&config.endpoint, timeout, API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_unix(&config.endpoint, timeout, API_DEFAULT_VERSION)?,
        };
        info!(endpoint = %config.endpoint, "docker: client configured");
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running_containers(&self) -> Result<Vec<ContainerSnapshot>, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);
        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: false,
                filters,
                ..Default::default()
            }))
            .await?;
        Ok(summaries.into_iter().map(snapshot_from_summary).collect())
    }

    async fn inspect(&self, container_id: &str) -> Result<ContainerSnapshot, RuntimeError> {
        let response = self
            .docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await?;
        Ok(snapshot_from_inspect(response))
    }

    async fn list_networks(&self) -> Result<Vec<NetworkInfo>, RuntimeError> {
        let networks = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await?;
        Ok(networks.into_iter().map(network_info).collect())
    }

    async fn subscribe(&self) -> Result<EventStream, RuntimeError> {
        self.docker.ping().await?;

        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert(
            "event".to_string(),
            vec!["start".to_string(), "die".to_string()],
        );
        let events = self.docker.events(Some(EventsOptions::<String> {
            filters,
            ..Default::default()
        }));

        Ok(events
            .filter_map(|item| {
                future::ready(match item {
                    Ok(message) => lifecycle_from_message(&message).map(Ok),
                    Err(err) => Some(Err(RuntimeError::Disconnected(err.to_string()))),
                })
            })
            .boxed())
    }
}

fn lifecycle_from_message(message: &EventMessage) -> Option<LifecycleEvent> {
    if message.typ != Some(EventMessageTypeEnum::CONTAINER) {
        return None;
    }
    let kind = message
        .action
        .as_deref()
        .and_then(LifecycleKind::from_action)?;
    let container_id = message.actor.as_ref()?.id.clone()?;
    debug!(%kind, %container_id, "docker: lifecycle event");
    Some(LifecycleEvent { kind, container_id })
}

fn endpoints(networks: Option<HashMap<String, EndpointSettings>>) -> Vec<NetworkEndpoint> {
    let mut out: Vec<NetworkEndpoint> = networks
        .unwrap_or_default()
        .into_iter()
        .map(|(network, settings)| NetworkEndpoint {
            network,
            ip_address: settings.ip_address.unwrap_or_default(),
        })
        .collect();
    out.sort_by(|a, b| a.network.cmp(&b.network));
    out
}

fn ordered(labels: Option<HashMap<String, String>>) -> Option<BTreeMap<String, String>> {
    labels.map(|labels| labels.into_iter().collect())
}

/// Snapshot of a list entry: name list and directly attached labels.
pub fn snapshot_from_summary(summary: ContainerSummary) -> ContainerSnapshot {
    ContainerSnapshot {
        id: summary.id.unwrap_or_default(),
        name: None,
        names: summary.names.unwrap_or_default(),
        networks: endpoints(summary.network_settings.and_then(|s| s.networks)),
        labels: ordered(summary.labels),
        config_labels: None,
        status: summary.state,
    }
}

/// Snapshot of an inspection record: primary name and config labels.
pub fn snapshot_from_inspect(response: ContainerInspectResponse) -> ContainerSnapshot {
    ContainerSnapshot {
        id: response.id.unwrap_or_default(),
        name: response.name,
        names: Vec::new(),
        networks: endpoints(response.network_settings.and_then(|s| s.networks)),
        labels: None,
        config_labels: ordered(response.config.and_then(|c| c.labels)),
        status: response
            .state
            .and_then(|s| s.status)
            .map(|status| status.to_string()),
    }
}

fn network_info(network: Network) -> NetworkInfo {
    NetworkInfo {
        name: network.name.unwrap_or_default(),
        gateways: network
            .ipam
            .and_then(|ipam| ipam.config)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|config| config.gateway)
            .filter(|gateway| !gateway.is_empty())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use bollard::models::{
        ContainerConfig, ContainerInspectResponse, ContainerState, ContainerStateStatusEnum,
        ContainerSummary, ContainerSummaryNetworkSettings, EndpointSettings, EventActor,
        EventMessage, EventMessageTypeEnum, Ipam, IpamConfig, Network, NetworkSettings,
    };

    use super::{lifecycle_from_message, network_info, snapshot_from_inspect, snapshot_from_summary};
    use crate::LifecycleKind;

    fn endpoint(ip: &str) -> EndpointSettings {
        EndpointSettings {
            ip_address: Some(ip.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn summary_keeps_names_and_direct_labels() {
        let summary = ContainerSummary {
            id: Some("abc".into()),
            names: Some(vec!["/web".into()]),
            labels: Some(HashMap::from([("consul.port".into(), "80".into())])),
            state: Some("running".into()),
            network_settings: Some(ContainerSummaryNetworkSettings {
                networks: Some(HashMap::from([
                    ("zeta".into(), endpoint("10.0.0.9")),
                    ("alpha".into(), endpoint("10.0.0.2")),
                ])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let snap = snapshot_from_summary(summary);
        assert_eq!(snap.id, "abc");
        assert_eq!(snap.primary_name(), Some("/web"));
        assert_eq!(snap.label("consul.port"), Some("80"));
        assert_eq!(snap.first_network_address(), Some("10.0.0.2"));
        assert!(snap.is_running());
    }

    #[test]
    fn inspect_keeps_name_config_labels_and_status() {
        let response = ContainerInspectResponse {
            id: Some("abc".into()),
            name: Some("/web".into()),
            state: Some(ContainerState {
                status: Some(ContainerStateStatusEnum::EXITED),
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                labels: Some(HashMap::from([("consul.name".into(), "api".into())])),
                ..Default::default()
            }),
            network_settings: Some(NetworkSettings {
                networks: Some(HashMap::from([("bridge".into(), endpoint(""))])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let snap = snapshot_from_inspect(response);
        assert_eq!(snap.name.as_deref(), Some("/web"));
        assert!(snap.labels.is_none());
        assert_eq!(snap.label("consul.name"), Some("api"));
        assert_eq!(snap.status.as_deref(), Some("exited"));
        assert_eq!(snap.first_network_address(), None);
    }

    #[test]
    fn only_container_start_and_die_become_events() {
        let message = |typ, action: &str| EventMessage {
            typ: Some(typ),
            action: Some(action.to_string()),
            actor: Some(EventActor {
                id: Some("abc".into()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let start = lifecycle_from_message(&message(EventMessageTypeEnum::CONTAINER, "start"))
            .expect("start event");
        assert_eq!(start.kind, LifecycleKind::Start);
        assert_eq!(start.container_id, "abc");
        assert!(lifecycle_from_message(&message(EventMessageTypeEnum::CONTAINER, "pause")).is_none());
        assert!(lifecycle_from_message(&message(EventMessageTypeEnum::NETWORK, "start")).is_none());
    }

    #[test]
    fn network_gateways_skip_empty_entries() {
        let network = Network {
            name: Some("bridge".into()),
            ipam: Some(Ipam {
                config: Some(vec![
                    IpamConfig {
                        gateway: Some(String::new()),
                        ..Default::default()
                    },
                    IpamConfig {
                        gateway: Some("172.17.0.1".into()),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let info = network_info(network);
        assert_eq!(info.name, "bridge");
        assert_eq!(info.gateways, vec!["172.17.0.1".to_string()]);
    }
}
