use plexus_types::model::LayerRange;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Rejected synchronously; never retried automatically.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown model or shard; the caller decides whether to retry after
    /// a seeding delay.
    #[error("model has no registered shards: {0}")]
    NoShards(String),

    #[error("no available node for shard {shard_id} (layers {layer_range})")]
    StageUnavailable {
        shard_id: String,
        layer_range: LayerRange,
    },

    /// A stage's compute callback failed and no replica could take over.
    /// Names the shard so operators can evict or replace the peer.
    #[error("stage failed on shard {shard_id} (layers {layer_range}): {reason}")]
    StageFailed {
        shard_id: String,
        layer_range: LayerRange,
        reason: String,
    },

    #[error(transparent)]
    Registry(#[from] plexus_registry::RegistryError),

    #[error(transparent)]
    Relay(#[from] plexus_relay::RelayError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
