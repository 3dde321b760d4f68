//! Proportional reward accounting.
//!
//! Layer count stands in for compute cost: each stage of a completed
//! pipeline earns `fee × provider_share × (weight / Σ weight)`, so the
//! provider pool always sums to `fee × provider_share` regardless of how
//! the model was partitioned.

use serde::{Deserialize, Serialize};

use plexus_types::runtime::RuntimeStage;

/// One stage's earned share of an inference fee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReward {
    pub node_id: String,
    pub shard_id: String,
    pub amount: f64,
}

/// Distribute the provider pool across completed stages by compute weight.
pub fn compute_rewards(stages: &[RuntimeStage], fee: f64, provider_share: f64) -> Vec<StageReward> {
    let total_weight: u32 = stages.iter().map(|s| s.compute_weight).sum();
    if total_weight == 0 {
        return Vec::new();
    }

    let pool = fee * provider_share;
    stages
        .iter()
        .map(|s| StageReward {
            node_id: s.node_id.clone(),
            shard_id: s.shard_id.clone(),
            amount: pool * s.compute_weight as f64 / total_weight as f64,
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
