use thiserror::Error;

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The key, prefix, or node does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Connection or protocol failure before a response was read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// The registry answered with a non-success status.
    #[error("registry returned {status}: {body}")]
    Status { status: u16, body: String },
    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Host and port do not form a usable base URL.
    #[error("invalid registry address: {0}")]
    Address(String),
}

impl RegistryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
