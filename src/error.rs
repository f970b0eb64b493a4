use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unsupported snapshot version: expected {expected}, got {found}")]
    UnsupportedVersion { expected: String, found: String },
}

pub type PolicyResult<T> = Result<T, PolicyError>;
