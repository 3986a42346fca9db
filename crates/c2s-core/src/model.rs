use std::collections::BTreeMap;

use serde::Serialize;

/// Status string the runtime reports for a live container.
pub const STATUS_RUNNING: &str = "running";

/// Address of a container on one named network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkEndpoint {
    pub network: String,
    pub ip_address: String,
}

/// Read-only view of a container as reported by the runtime.
///
/// Snapshots are fetched for a single decision and dropped afterwards.
/// Networks are kept sorted by name so "first network" is stable across
/// fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContainerSnapshot {
    pub id: String,
    /// Primary name (inspect output), usually with a leading `/`.
    pub name: Option<String>,
    /// Name list (list output).
    pub names: Vec<String>,
    pub networks: Vec<NetworkEndpoint>,
    /// Labels attached directly to the container record.
    pub labels: Option<BTreeMap<String, String>>,
    /// Labels nested under the container's configuration object.
    pub config_labels: Option<BTreeMap<String, String>>,
    pub status: Option<String>,
}

impl ContainerSnapshot {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>, ip: impl Into<String>) -> Self {
        self.networks.push(NetworkEndpoint {
            network: network.into(),
            ip_address: ip.into(),
        });
        self.networks.sort_by(|a, b| a.network.cmp(&b.network));
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_config_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config_labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// Label set used for mapping: direct labels win over nested ones.
    pub fn effective_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.labels.as_ref().or(self.config_labels.as_ref())
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.effective_labels()
            .and_then(|labels| labels.get(key))
            .map(String::as_str)
    }

    /// Primary name, falling back to the first entry of the name list.
    pub fn primary_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .filter(|name| !name.is_empty())
            .or_else(|| self.names.first().map(String::as_str))
    }

    /// Address on the first listed network, if it is non-empty.
    pub fn first_network_address(&self) -> Option<&str> {
        self.networks
            .first()
            .map(|endpoint| endpoint.ip_address.as_str())
            .filter(|ip| !ip.is_empty())
    }

    pub fn is_running(&self) -> bool {
        self.status.as_deref() == Some(STATUS_RUNNING)
    }
}

/// Catalog registration derived from one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    pub node: String,
    pub address: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One auxiliary key/value pair owned by a registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}
