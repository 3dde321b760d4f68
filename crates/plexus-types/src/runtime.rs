// Per-request execution types.
//
// A `RuntimeStage` is scoped to a single inference request and discarded
// with it; registry assignment state is never mutated through these.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::LayerRange;

// ── Stage Status ──────────────────────────────────────────────────────────────

/// Pending → Running → Done | Failed.
/// A replica swap re-enters Running after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ── Runtime Stage ─────────────────────────────────────────────────────────────

/// One pipeline stage materialized for a single inference request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeStage {
    pub shard_id: String,
    pub node_id: String,
    pub layer_range: LayerRange,
    pub status: StageStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Layer count; proportional-reward weight for this stage.
    pub compute_weight: u32,
}

impl RuntimeStage {
    pub fn new(shard_id: String, node_id: String, layer_range: LayerRange) -> Self {
        Self {
            shard_id,
            node_id,
            layer_range,
            status: StageStatus::Pending,
            started_at: None,
            ended_at: None,
            compute_weight: layer_range.len(),
        }
    }
}

// ── Activation Message ────────────────────────────────────────────────────────

/// Intermediate tensor handed from one stage to the next.
///
/// Ephemeral: produced by stage N's output, consumed as stage N+1's input,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationMessage {
    pub request_id: String,
    pub shard_id: String,
    pub stage_index: u32,
    pub tensor: Vec<f32>,
    pub shape: Vec<u32>,
    pub timestamp: DateTime<Utc>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
