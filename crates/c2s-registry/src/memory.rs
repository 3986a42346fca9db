use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use c2s_core::ServiceRecord;

use crate::error::RegistryError;
use crate::Registry;

/// Registry operation kinds, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistryOp {
    KvKeys,
    KvGet,
    KvSet,
    KvDelete,
    Register,
    Deregister,
}

/// One recorded call against [`InMemoryRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    KvKeys(String),
    KvGet(String),
    KvSet { key: String, value: String },
    KvDelete { key: String, recurse: bool },
    Register(ServiceRecord),
    Deregister(String),
}

impl RegistryCall {
    pub fn op(&self) -> RegistryOp {
        match self {
            Self::KvKeys(_) => RegistryOp::KvKeys,
            Self::KvGet(_) => RegistryOp::KvGet,
            Self::KvSet { .. } => RegistryOp::KvSet,
            Self::KvDelete { .. } => RegistryOp::KvDelete,
            Self::Register(_) => RegistryOp::Register,
            Self::Deregister(_) => RegistryOp::Deregister,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Self::KvKeys(_) | Self::KvGet(_))
    }
}

#[derive(Debug, Default)]
struct Inner {
    kv: BTreeMap<String, String>,
    catalog: BTreeMap<String, ServiceRecord>,
    calls: Vec<RegistryCall>,
    failing: HashSet<RegistryOp>,
}

/// In-memory registry for tests and dry runs.
///
/// Mirrors Consul semantics where the engine depends on them: listing an
/// empty prefix and reading a missing key fail with `NotFound`, while
/// deletes and deregistrations of missing entries succeed.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    inner: Mutex<Inner>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a key without recording a call.
    pub fn insert_kv(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut inner = self.inner.lock().expect("registry lock");
        inner.kv.insert(key.into(), value.into());
    }

    /// Seeds a catalog node without recording a call.
    pub fn insert_service(&self, record: ServiceRecord) {
        let mut inner = self.inner.lock().expect("registry lock");
        inner.catalog.insert(record.node.clone(), record);
    }

    /// Makes every subsequent call of `op` fail with a 500 status.
    pub fn fail(&self, op: RegistryOp) {
        let mut inner = self.inner.lock().expect("registry lock");
        inner.failing.insert(op);
    }

    pub fn heal(&self, op: RegistryOp) {
        let mut inner = self.inner.lock().expect("registry lock");
        inner.failing.remove(&op);
    }

    pub fn kv_snapshot(&self) -> BTreeMap<String, String> {
        self.inner.lock().expect("registry lock").kv.clone()
    }

    pub fn catalog_snapshot(&self) -> BTreeMap<String, ServiceRecord> {
        self.inner.lock().expect("registry lock").catalog.clone()
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        self.inner.lock().expect("registry lock").calls.clone()
    }

    pub fn writes(&self) -> Vec<RegistryCall> {
        self.calls()
            .into_iter()
            .filter(RegistryCall::is_write)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.inner.lock().expect("registry lock").calls.clear();
    }

    fn record(&self, call: RegistryCall) -> Result<std::sync::MutexGuard<'_, Inner>, RegistryError> {
        let mut inner = self.inner.lock().expect("registry lock");
        let op = call.op();
        inner.calls.push(call);
        if inner.failing.contains(&op) {
            return Err(RegistryError::Status {
                status: 500,
                body: format!("injected {op:?} failure"),
            });
        }
        Ok(inner)
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn kv_keys(&self, prefix: &str) -> Result<Vec<String>, RegistryError> {
        let inner = self.record(RegistryCall::KvKeys(prefix.to_string()))?;
        let keys: Vec<String> = inner
            .kv
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        if keys.is_empty() {
            return Err(RegistryError::NotFound(prefix.to_string()));
        }
        Ok(keys)
    }

    async fn kv_get(&self, key: &str) -> Result<String, RegistryError> {
        let inner = self.record(RegistryCall::KvGet(key.to_string()))?;
        inner
            .kv
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }

    async fn kv_set(&self, key: &str, value: &str) -> Result<(), RegistryError> {
        let mut inner = self.record(RegistryCall::KvSet {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        inner.kv.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn kv_delete(&self, key: &str, recurse: bool) -> Result<(), RegistryError> {
        let mut inner = self.record(RegistryCall::KvDelete {
            key: key.to_string(),
            recurse,
        })?;
        if recurse {
            inner.kv.retain(|existing, _| !existing.starts_with(key));
        } else {
            inner.kv.remove(key);
        }
        Ok(())
    }

    async fn catalog_register(&self, record: &ServiceRecord) -> Result<(), RegistryError> {
        let mut inner = self.record(RegistryCall::Register(record.clone()))?;
        inner.catalog.insert(record.node.clone(), record.clone());
        Ok(())
    }

    async fn catalog_deregister(&self, node: &str) -> Result<(), RegistryError> {
        let mut inner = self.record(RegistryCall::Deregister(node.to_string()))?;
        inner.catalog.remove(node);
        Ok(())
    }
}
