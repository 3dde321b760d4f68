// Partition-planner output types.

use serde::{Deserialize, Serialize};

use crate::model::LayerRange;

// ── Bottleneck ────────────────────────────────────────────────────────────────

/// Which resource dominates a plan's estimated end-to-end latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bottleneck {
    Compute,
    Bandwidth,
}

// ── Planned Stage ─────────────────────────────────────────────────────────────

/// One stage of a scaling plan: a contiguous layer range on one peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStage {
    pub node_id: String,
    pub layer_range: LayerRange,
    /// Share of the model's memory footprint this stage occupies, in MB.
    pub assigned_memory_mb: u64,
}

// ── Scaling Plan ──────────────────────────────────────────────────────────────

/// Result of partitioning a model across a peer set.
///
/// If `feasible` is false the stage list is empty, `reason` explains the
/// shortfall, and `estimated_latency_ms` is infinite. If feasible, the
/// stage layer ranges partition `[0, layers - 1]` exactly: contiguous,
/// non-overlapping, every layer covered once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingPlan {
    pub stages: Vec<PlannedStage>,
    pub feasible: bool,
    pub reason: Option<String>,
    pub estimated_latency_ms: f64,
    pub bottleneck: Option<Bottleneck>,
    /// Aggregate memory across the candidate peers, in MB.
    pub total_memory_mb: u64,
    pub required_memory_mb: u64,
}

impl ScalingPlan {
    /// An infeasible plan with no stages and infinite latency.
    pub fn infeasible(reason: String, total_memory_mb: u64, required_memory_mb: u64) -> Self {
        Self {
            stages: Vec::new(),
            feasible: false,
            reason: Some(reason),
            estimated_latency_ms: f64::INFINITY,
            bottleneck: None,
            total_memory_mb,
            required_memory_mb,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
