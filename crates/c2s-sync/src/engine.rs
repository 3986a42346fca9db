use std::sync::Arc;

use c2s_core::{ContainerSnapshot, KeyLayout, MappedService, Mapping, ServiceMapper};
use c2s_registry::{Registry, RegistryError};
use c2s_runtime::{ContainerRuntime, LifecycleEvent, LifecycleKind};
use futures_util::future::{join_all, try_join_all};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::SyncError;

/// Result of registering one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered(String),
    Skipped(String),
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Services removed because their container is gone or stopped.
    pub deregistered: Vec<String>,
    pub registered: Vec<String>,
    pub skipped: Vec<String>,
    /// `(container id, error)` for containers that failed to register.
    pub failed: Vec<(String, String)>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Maps containers to registry entries and keeps bookkeeping consistent.
///
/// Register writes auxiliary KV, then the catalog entry, then the
/// bookkeeping key. Deregister removes the catalog entry, the bookkeeping
/// key, and the auxiliary namespace; it is idempotent.
pub struct ReconciliationEngine<G, R> {
    registry: Arc<G>,
    runtime: Arc<R>,
    mapper: ServiceMapper,
    gateway: watch::Receiver<String>,
}

impl<G, R> Clone for ReconciliationEngine<G, R> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            runtime: Arc::clone(&self.runtime),
            mapper: self.mapper.clone(),
            gateway: self.gateway.clone(),
        }
    }
}

impl<G, R> ReconciliationEngine<G, R>
where
    G: Registry,
    R: ContainerRuntime,
{
    pub fn new(
        registry: Arc<G>,
        runtime: Arc<R>,
        layout: KeyLayout,
        gateway: watch::Receiver<String>,
    ) -> Self {
        Self {
            registry,
            runtime,
            mapper: ServiceMapper::new(layout),
            gateway,
        }
    }

    pub fn mapper(&self) -> &ServiceMapper {
        &self.mapper
    }

    /// Current bridge gateway as last published by the supervisor.
    pub fn gateway(&self) -> String {
        self.gateway.borrow().clone()
    }

    /// Maps a container with the current gateway, without touching the registry.
    pub fn preview(&self, container: &ContainerSnapshot) -> Result<Mapping, SyncError> {
        Ok(self.mapper.map(container, &self.gateway())?)
    }

    pub async fn handle_event(&self, event: &LifecycleEvent) -> Result<(), SyncError> {
        debug!(kind = %event.kind, container = %event.container_id, "handling lifecycle event");
        match event.kind {
            LifecycleKind::Start => {
                let container = self
                    .runtime
                    .inspect(&event.container_id)
                    .await
                    .map_err(|err| {
                        error!(container = %event.container_id, %err, "inspect failed");
                        err
                    })?;
                self.register_container(&container).await.map(|_| ())
            }
            LifecycleKind::Die => self.handle_die(&event.container_id).await,
        }
    }

    async fn handle_die(&self, container_id: &str) -> Result<(), SyncError> {
        let service = match self.runtime.inspect(container_id).await {
            Ok(container) => {
                if self.mapper.is_skipped(&container) {
                    debug!(container = %container_id, "skipped container stopped");
                    return Ok(());
                }
                let service = self.mapper.canonical_name(&container).map_err(|err| {
                    error!(container = %container_id, %err, "cannot resolve service name");
                    err
                })?;
                if !self.owns_service(&service, container_id).await? {
                    debug!(%service, container = %container_id, "service not owned by container");
                    return Ok(());
                }
                service
            }
            Err(err) if err.is_not_found() => {
                debug!(container = %container_id, "container already removed, using bookkeeping");
                match self.find_service_by_container(container_id).await? {
                    Some(service) => service,
                    None => {
                        debug!(container = %container_id, "no service registered for container");
                        return Ok(());
                    }
                }
            }
            Err(err) => {
                error!(container = %container_id, %err, "inspect failed");
                return Err(err.into());
            }
        };
        self.deregister_service(&service).await
    }

    /// True when the bookkeeping entry for `service` names `container_id`.
    async fn owns_service(&self, service: &str, container_id: &str) -> Result<bool, SyncError> {
        let key = self.mapper.layout().bookkeeping_key(service);
        match self.registry.kv_get(&key).await {
            Ok(owner) => Ok(owner.trim() == container_id),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => {
                error!(%key, %err, "bookkeeping read failed");
                Err(err.into())
            }
        }
    }

    /// Looks up the service whose bookkeeping entry names `container_id`.
    pub async fn find_service_by_container(
        &self,
        container_id: &str,
    ) -> Result<Option<String>, SyncError> {
        let layout = self.mapper.layout();
        for key in self.bookkeeping_keys().await? {
            match self.registry.kv_get(&key).await {
                Ok(owner) if owner.trim() == container_id => {
                    return Ok(Some(layout.service_from_bookkeeping_key(&key).to_string()));
                }
                Ok(_) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    error!(%key, %err, "bookkeeping read failed");
                    return Err(err.into());
                }
            }
        }
        Ok(None)
    }

    async fn bookkeeping_keys(&self) -> Result<Vec<String>, SyncError> {
        let root = self.mapper.layout().bookkeeping_root();
        match self.registry.kv_keys(&root).await {
            Ok(keys) => Ok(keys),
            Err(err) if err.is_not_found() => {
                debug!(prefix = %root, "no bookkeeping entries");
                Ok(Vec::new())
            }
            Err(err) => {
                error!(prefix = %root, %err, "listing bookkeeping entries failed");
                Err(err.into())
            }
        }
    }

    pub async fn register_container(
        &self,
        container: &ContainerSnapshot,
    ) -> Result<RegisterOutcome, SyncError> {
        let gateway = self.gateway();
        let mapped = match self.mapper.map(container, &gateway) {
            Ok(Mapping::Register(mapped)) => mapped,
            Ok(Mapping::Skip { name }) => {
                info!(service = %name, container = %container.id, "container skipped from label");
                return Ok(RegisterOutcome::Skipped(name));
            }
            Err(err) => {
                error!(container = %container.id, %err, "mapping failed");
                return Err(err.into());
            }
        };

        info!(
            service = %mapped.name,
            container = %mapped.container_id,
            address = %mapped.record.address,
            "registering container"
        );
        debug!(record = ?mapped.record, auxiliary = mapped.auxiliary.len(), "service record");

        for entry in &mapped.auxiliary {
            if let Err(err) = self.registry.kv_set(&entry.key, &entry.value).await {
                return Err(self.abort_registration(&mapped, false, err).await);
            }
        }
        if let Err(err) = self.registry.catalog_register(&mapped.record).await {
            return Err(self.abort_registration(&mapped, false, err).await);
        }
        if let Err(err) = self
            .registry
            .kv_set(&mapped.bookkeeping_key, &mapped.container_id)
            .await
        {
            return Err(self.abort_registration(&mapped, true, err).await);
        }

        Ok(RegisterOutcome::Registered(mapped.name))
    }

    /// Best-effort removal of what a failed registration already wrote.
    async fn abort_registration(
        &self,
        mapped: &MappedService,
        catalog_written: bool,
        cause: RegistryError,
    ) -> SyncError {
        error!(service = %mapped.name, err = %cause, "registration failed, rolling back");
        if catalog_written {
            if let Err(err) = self.registry.catalog_deregister(&mapped.name).await {
                warn!(service = %mapped.name, %err, "rollback: catalog deregister failed");
            }
        }
        if !mapped.auxiliary.is_empty() {
            let namespace = self.mapper.layout().service_namespace(&mapped.name);
            if let Err(err) = self.registry.kv_delete(&namespace, true).await {
                warn!(service = %mapped.name, %err, "rollback: auxiliary kv delete failed");
            }
        }
        cause.into()
    }

    pub async fn deregister_service(&self, service: &str) -> Result<(), SyncError> {
        info!(%service, "deregistering service");
        let layout = self.mapper.layout();

        absorb_not_found(service, "catalog", self.registry.catalog_deregister(service).await)?;
        absorb_not_found(
            service,
            "bookkeeping",
            self.registry
                .kv_delete(&layout.bookkeeping_key(service), false)
                .await,
        )?;
        absorb_not_found(
            service,
            "auxiliary",
            self.registry
                .kv_delete(&layout.service_namespace(service), true)
                .await,
        )?;
        Ok(())
    }

    /// Startup pass: drop stale bookkeeping, then register what runs.
    ///
    /// Any healing failure other than a missing container aborts the pass.
    /// Registration failures are collected per container.
    pub async fn reconcile(&self) -> Result<ReconcileReport, SyncError> {
        let mut report = ReconcileReport::default();

        let keys = self.bookkeeping_keys().await?;
        let healed = try_join_all(keys.iter().map(|key| self.heal_entry(key))).await?;
        report.deregistered = healed.into_iter().flatten().collect();

        let containers = self.runtime.list_running_containers().await.map_err(|err| {
            error!(%err, "listing running containers failed");
            err
        })?;
        let results = join_all(containers.iter().map(|container| async move {
            (container.id.clone(), self.register_container(container).await)
        }))
        .await;

        for (container_id, result) in results {
            match result {
                Ok(RegisterOutcome::Registered(service)) => report.registered.push(service),
                Ok(RegisterOutcome::Skipped(service)) => report.skipped.push(service),
                Err(err) => report.failed.push((container_id, err.to_string())),
            }
        }

        info!(
            deregistered = report.deregistered.len(),
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Checks one bookkeeping entry; returns the service name if it was removed.
    async fn heal_entry(&self, key: &str) -> Result<Option<String>, SyncError> {
        let service = self.mapper.layout().service_from_bookkeeping_key(key).to_string();
        let container_id = match self.registry.kv_get(key).await {
            Ok(value) => value.trim().to_string(),
            Err(err) if err.is_not_found() => {
                debug!(%key, "bookkeeping entry vanished");
                return Ok(None);
            }
            Err(err) => {
                error!(%key, %err, "bookkeeping read failed");
                return Err(err.into());
            }
        };

        match self.runtime.inspect(&container_id).await {
            Ok(container) if container.is_running() => Ok(None),
            Ok(container) => {
                info!(
                    %service,
                    container = %container_id,
                    status = container.status.as_deref().unwrap_or("unknown"),
                    "container not running"
                );
                self.deregister_service(&service).await?;
                Ok(Some(service))
            }
            Err(err) if err.is_not_found() => {
                info!(%service, container = %container_id, "container no longer exists");
                self.deregister_service(&service).await?;
                Ok(Some(service))
            }
            Err(err) => {
                error!(%service, container = %container_id, %err, "inspect failed");
                Err(err.into())
            }
        }
    }
}

fn absorb_not_found(
    service: &str,
    what: &str,
    result: Result<(), RegistryError>,
) -> Result<(), SyncError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_not_found() => {
            debug!(%service, what, "already absent");
            Ok(())
        }
        Err(err) => {
            error!(%service, what, %err, "deregistration failed");
            Err(err.into())
        }
    }
}
