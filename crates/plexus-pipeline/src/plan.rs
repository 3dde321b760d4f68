//! Memory-proportional layer-to-peer partition planning.
//!
//! Algorithm:
//! 1. Reject zero-layer models before planning.
//! 2. If aggregate peer memory falls short of the model footprint, return
//!    an infeasible plan naming the shortfall — no stages.
//! 3. Assign layers proportional to each peer's memory fraction, clamped
//!    to the remaining count; the last peer in iteration order absorbs
//!    the rounding remainder. Zero-layer peers produce no stage.
//! 4. Estimate latency: steady-state pipeline compute is bound by the
//!    slowest stage; inter-stage transfers are sequential and sum.
//!
//! Greedy single pass, deterministic, weakly monotone in memory share —
//! not globally optimal.

use tracing::debug;

use plexus_types::model::{LayerRange, ModelSpec};
use plexus_types::peer::PeerCapabilities;
use plexus_types::plan::{Bottleneck, PlannedStage, ScalingPlan};

use crate::error::{PipelineError, Result};

/// Bytes per activation element flowing between stages (f32).
const ACTIVATION_ELEMENT_BYTES: f64 = 4.0;

/// Partition `model` across `peers`.
pub fn create_plan(model: &ModelSpec, peers: &[PeerCapabilities]) -> Result<ScalingPlan> {
    if model.layers == 0 {
        return Err(PipelineError::InvalidInput(format!(
            "model {} has zero layers",
            model.model_id
        )));
    }

    let total_memory_mb: u64 = peers.iter().map(|p| p.memory_mb).sum();

    // ── 1. Feasibility ───────────────────────────────────────────────────
    if total_memory_mb < model.required_memory_mb {
        let reason = format!(
            "insufficient aggregate memory: model {} needs {} MB, {} peer(s) provide {} MB",
            model.model_id,
            model.required_memory_mb,
            peers.len(),
            total_memory_mb,
        );
        debug!(model_id = %model.model_id, %reason, "plan infeasible");
        return Ok(ScalingPlan::infeasible(
            reason,
            total_memory_mb,
            model.required_memory_mb,
        ));
    }

    // ── 2. Proportional layer assignment ─────────────────────────────────
    let total_layers = model.layers;
    let mut stages = Vec::with_capacity(peers.len());
    let mut stage_peers: Vec<&PeerCapabilities> = Vec::with_capacity(peers.len());
    let mut remaining = total_layers;
    let mut cursor: u32 = 0;

    for (i, peer) in peers.iter().enumerate() {
        let last = i == peers.len() - 1;
        let count = if last {
            remaining
        } else {
            let fraction = peer.memory_mb as f64 / total_memory_mb as f64;
            let ideal = (total_layers as f64 * fraction).round() as u32;
            ideal.min(remaining)
        };
        if count == 0 {
            continue;
        }

        let layer_range = LayerRange {
            start: cursor,
            end: cursor + count - 1,
        };
        let assigned_memory_mb =
            (model.required_memory_mb as f64 * count as f64 / total_layers as f64).round() as u64;

        stages.push(PlannedStage {
            node_id: peer.peer_id.clone(),
            layer_range,
            assigned_memory_mb,
        });
        stage_peers.push(peer);

        cursor += count;
        remaining -= count;
    }

    // ── 3. Latency estimate ──────────────────────────────────────────────
    // One linear-model constant: 1 ms per billion params per layer-slice.
    let params_per_layer = model.param_count as f64 / total_layers as f64;
    let max_compute_ms = stages
        .iter()
        .map(|s| s.layer_range.len() as f64 * (params_per_layer / 1e9))
        .fold(0.0f64, f64::max);

    // A Mbps link moves 1000 bits per millisecond.
    let hop_bits = model.hidden_dim as f64 * ACTIVATION_ELEMENT_BYTES * 8.0;
    let mut transfer_ms = 0.0f64;
    for pair in stage_peers.windows(2) {
        let link = pair[0].bandwidth_mbps.min(pair[1].bandwidth_mbps).max(1);
        transfer_ms += hop_bits / (link as f64 * 1000.0);
    }

    let bottleneck = if transfer_ms > max_compute_ms {
        Bottleneck::Bandwidth
    } else {
        Bottleneck::Compute
    };

    debug!(
        model_id = %model.model_id,
        stages = stages.len(),
        compute_ms = max_compute_ms,
        transfer_ms,
        ?bottleneck,
        "plan created"
    );

    Ok(ScalingPlan {
        stages,
        feasible: true,
        reason: None,
        estimated_latency_ms: max_compute_ms + transfer_ms,
        bottleneck: Some(bottleneck),
        total_memory_mb,
        required_memory_mb: model.required_memory_mb,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
