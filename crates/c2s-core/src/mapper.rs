use serde::Serialize;

use crate::error::CoreError;
use crate::keys::KeyLayout;
use crate::labels::{self, RuleContext, RECORD_RULES};
use crate::model::{ContainerSnapshot, KvEntry, ServiceRecord};

/// Everything one registration writes to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappedService {
    pub name: String,
    pub container_id: String,
    pub record: ServiceRecord,
    pub bookkeeping_key: String,
    pub auxiliary: Vec<KvEntry>,
}

/// Outcome of mapping one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    Register(MappedService),
    /// The container opted out via `consul.skip`; carries its canonical name,
    /// or its id when it has none.
    Skip { name: String },
}

/// Pure container → registry mapping.
///
/// Performs no I/O. The bridge gateway is passed per call so the mapper
/// never reads shared connection state.
#[derive(Debug, Clone, Default)]
pub struct ServiceMapper {
    layout: KeyLayout,
}

impl ServiceMapper {
    pub fn new(layout: KeyLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    /// Stable service name: `consul.name` if set, else the container name,
    /// with one leading `/` removed.
    pub fn canonical_name(&self, container: &ContainerSnapshot) -> Result<String, CoreError> {
        let raw = container
            .label(labels::NAME)
            .or_else(|| container.primary_name())
            .ok_or_else(|| CoreError::MissingName(container.id.clone()))?;
        let name = raw.strip_prefix('/').unwrap_or(raw);
        if name.is_empty() {
            return Err(CoreError::MissingName(container.id.clone()));
        }
        Ok(name.to_string())
    }

    /// True when `consul.skip` opts the container out of registration.
    pub fn is_skipped(&self, container: &ContainerSnapshot) -> bool {
        container.label(labels::SKIP).is_some_and(labels::is_skip)
    }

    pub fn map(&self, container: &ContainerSnapshot, gateway: &str) -> Result<Mapping, CoreError> {
        if self.is_skipped(container) {
            let name = self
                .canonical_name(container)
                .unwrap_or_else(|_| container.id.clone());
            return Ok(Mapping::Skip { name });
        }

        let name = self.canonical_name(container)?;

        let address = container.first_network_address().unwrap_or(gateway);
        let seed = ServiceRecord {
            node: name.clone(),
            address: address.to_string(),
            service: name.clone(),
            port: None,
            tags: Vec::new(),
        };
        let ctx = RuleContext { gateway };
        let record = RECORD_RULES.iter().fold(seed, |mut record, rule| {
            if let Some(value) = container.label(rule.key) {
                rule.apply(&mut record, value, &ctx);
            }
            record
        });

        Ok(Mapping::Register(MappedService {
            auxiliary: self.auxiliary_entries(&name, container),
            bookkeeping_key: self.layout.bookkeeping_key(&name),
            container_id: container.id.clone(),
            record,
            name,
        }))
    }

    /// One entry per `consul.kv.<suffix>` label, scoped under the service.
    pub fn auxiliary_entries(&self, service: &str, container: &ContainerSnapshot) -> Vec<KvEntry> {
        container
            .effective_labels()
            .into_iter()
            .flatten()
            .filter_map(|(key, value)| {
                labels::auxiliary_suffix(key).map(|suffix| KvEntry {
                    key: self.layout.auxiliary_key(service, suffix),
                    value: value.clone(),
                })
            })
            .collect()
    }
}
