//! Keeps a service registry in step with the containers running on one host.
//!
//! The [`ConnectionSupervisor`] keeps the runtime event feed alive and owns
//! the bridge gateway address. Lifecycle notifications flow over a channel
//! into the [`ReconciliationEngine`], which maps containers and mutates the
//! registry. [`SyncService`] wires the two together.

pub mod config;
pub mod engine;
pub mod error;
pub mod service;
pub mod supervisor;

pub use config::SyncConfig;
pub use engine::{ReconcileReport, ReconciliationEngine, RegisterOutcome};
pub use error::SyncError;
pub use service::SyncService;
pub use supervisor::{ConnectionSupervisor, RuntimeSignal};
