#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("shard not found: {0}")]
    ShardNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RegistryError>;
