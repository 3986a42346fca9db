use c2s_core::CoreError;
use c2s_registry::RegistryError;
use c2s_runtime::RuntimeError;
use thiserror::Error;

/// Errors surfaced by reconciliation and event handling.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
    #[error("runtime: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("mapping: {0}")]
    Mapping(#[from] CoreError),
    /// A spawned handler panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}
