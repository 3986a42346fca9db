use thiserror::Error;

/// Errors raised while deriving registry data from container metadata.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The container carries neither a name nor a `consul.name` override.
    #[error("container {0} has no usable name")]
    MissingName(String),
}
