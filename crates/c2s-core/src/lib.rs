//! Core container-to-registry primitives.
//!
//! Holds the container snapshot model, the registry key layout, the
//! recognised label rule table, and the pure mapper that turns a container
//! into a catalog record plus auxiliary key/value entries.

pub mod error;
pub mod keys;
pub mod labels;
pub mod mapper;
pub mod model;

pub use error::CoreError;
pub use keys::KeyLayout;
pub use mapper::{Mapping, MappedService, ServiceMapper};
pub use model::{ContainerSnapshot, KvEntry, NetworkEndpoint, ServiceRecord};
