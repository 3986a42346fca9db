//! Service registry access for container sync.
//!
//! [`Registry`] is the narrow key/value + catalog contract the sync engine
//! consumes. [`ConsulClient`] speaks Consul's HTTP API; [`InMemoryRegistry`]
//! backs tests and dry runs.

pub mod consul;
pub mod error;
pub mod memory;

use async_trait::async_trait;
use c2s_core::ServiceRecord;

pub use consul::{ConsulClient, ConsulConfig};
pub use error::RegistryError;
pub use memory::{InMemoryRegistry, RegistryCall, RegistryOp};

/// Key/value and catalog operations used by the sync engine.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Lists keys under `prefix`. Fails with `NotFound` when nothing exists there.
    async fn kv_keys(&self, prefix: &str) -> Result<Vec<String>, RegistryError>;
    /// Reads the raw value stored at `key`.
    async fn kv_get(&self, key: &str) -> Result<String, RegistryError>;
    /// Writes or overwrites `key`.
    async fn kv_set(&self, key: &str, value: &str) -> Result<(), RegistryError>;
    /// Deletes `key`, or the whole subtree under it when `recurse` is set.
    async fn kv_delete(&self, key: &str, recurse: bool) -> Result<(), RegistryError>;
    async fn catalog_register(&self, record: &ServiceRecord) -> Result<(), RegistryError>;
    async fn catalog_deregister(&self, node: &str) -> Result<(), RegistryError>;
}
