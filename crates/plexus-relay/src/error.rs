#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("chunking error: {0}")]
    Chunking(String),

    #[error("transmit error: {0}")]
    Transmit(String),

    /// Distinct from a stage failure: callers may retry after a timeout
    /// but should not retry a failed computation.
    #[error("timed out waiting for activation: request {request_id} stage {stage_index}")]
    Timeout { request_id: String, stage_index: u32 },

    #[error("wait cancelled: request {request_id} stage {stage_index}")]
    Cancelled { request_id: String, stage_index: u32 },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RelayError>;
