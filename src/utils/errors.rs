use thiserror::Error;

/// Error type for local (non-remote) failures in Plaza
#[derive(Error, Debug)]
pub enum PlazaError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Session store error: {0}")]
    StoreError(String),
}
