//! Per-request pipeline construction and execution.
//!
//! The orchestrator turns a registry snapshot into an ordered stage list,
//! drives each stage through a caller-supplied [`StageExecutor`], and
//! recovers from a stage failure with exactly one replica attempt. It owns
//! the request-scoped stage list and never mutates registry assignment
//! state — failover re-queries the registry instead.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use plexus_registry::ShardRegistry;
use plexus_relay::ActivationRelay;
use plexus_types::config::RewardConfig;
use plexus_types::runtime::{RuntimeStage, StageStatus};

use crate::error::{PipelineError, Result};
use crate::reward::{self, StageReward};

// ── Executor seam ─────────────────────────────────────────────────────────────

/// The compute-backend seam: one method, injected into the orchestrator.
///
/// Implementations run the stage's layers over the input activations —
/// locally, or remotely via the relay — and are swappable (WebGPU, CPU,
/// mock). A failure message, not a panic, reports an unusable stage.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn execute(
        &self,
        stage: &RuntimeStage,
        input: &[f32],
    ) -> std::result::Result<Vec<f32>, String>;
}

// ── Request / result ──────────────────────────────────────────────────────────

/// One inference request against a registered model.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub request_id: String,
    pub model_id: String,
    pub input: Vec<f32>,
    /// Fee paid by the requester; the provider pool is carved from it.
    pub fee: f64,
}

impl InferenceRequest {
    pub fn new(model_id: &str, input: Vec<f32>, fee: f64) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            model_id: model_id.to_string(),
            input,
            fee,
        }
    }
}

/// Outcome of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct InferenceResult {
    pub request_id: String,
    /// Output of the final stage.
    pub output: Vec<f32>,
    /// Full per-stage trace, for audit and debugging.
    pub stages: Vec<RuntimeStage>,
    pub elapsed_ms: f64,
    pub rewards: Vec<StageReward>,
}

/// Non-throwing readiness probe result.
#[derive(Debug, Clone)]
pub struct PipelineReadiness {
    pub complete: bool,
    pub missing_shard_ids: Vec<String>,
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct PipelineOrchestrator {
    registry: Arc<ShardRegistry>,
    relay: Option<Arc<ActivationRelay>>,
    reward_config: RewardConfig,
}

impl PipelineOrchestrator {
    pub fn new(registry: Arc<ShardRegistry>, reward_config: RewardConfig) -> Self {
        Self {
            registry,
            relay: None,
            reward_config,
        }
    }

    /// Attach a relay so an aborted pipeline releases its wait handles.
    pub fn with_relay(mut self, relay: Arc<ActivationRelay>) -> Self {
        self.relay = Some(relay);
        self
    }

    // ── Construction ─────────────────────────────────────────────────────

    /// Build the ordered stage list for `model_id` from the registry.
    ///
    /// Picks the first available node per shard. Fails fast on a model
    /// with zero shards or a shard with zero available nodes: a pipeline
    /// missing a stage cannot produce output, so this is a hard
    /// precondition rather than a retryable condition.
    pub fn build_pipeline(&self, model_id: &str) -> Result<Vec<RuntimeStage>> {
        let manifests = self.registry.get_model_shards(model_id);
        if manifests.is_empty() {
            return Err(PipelineError::NoShards(model_id.to_string()));
        }

        let mut stages = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            let nodes = self.registry.get_available_nodes(&manifest.shard_id)?;
            let node = nodes.first().ok_or_else(|| PipelineError::StageUnavailable {
                shard_id: manifest.shard_id.clone(),
                layer_range: manifest.layer_range,
            })?;
            stages.push(RuntimeStage::new(
                manifest.shard_id,
                node.node_id.clone(),
                manifest.layer_range,
            ));
        }
        Ok(stages)
    }

    /// Probe whether every shard of `model_id` has at least one available
    /// node, without building anything.
    pub fn check_pipeline_readiness(&self, model_id: &str) -> PipelineReadiness {
        let manifests = self.registry.get_model_shards(model_id);
        let mut missing = Vec::new();
        for manifest in &manifests {
            let available = self
                .registry
                .replica_count(&manifest.shard_id)
                .unwrap_or(0);
            if available == 0 {
                missing.push(manifest.shard_id.clone());
            }
        }
        PipelineReadiness {
            complete: !manifests.is_empty() && missing.is_empty(),
            missing_shard_ids: missing,
        }
    }

    // ── Execution ────────────────────────────────────────────────────────

    /// Run the full pipeline for `request`.
    ///
    /// Stages execute strictly in ascending layer order — each stage's
    /// input is the prior stage's output. A failed stage gets exactly one
    /// replica re-attempt; with no replica the whole pipeline aborts,
    /// naming the failing shard. There is no partial output.
    pub async fn execute_pipeline(
        &self,
        request: &InferenceRequest,
        executor: &dyn StageExecutor,
    ) -> Result<InferenceResult> {
        let started = Instant::now();
        let mut stages = match self.build_pipeline(&request.model_id) {
            Ok(stages) => stages,
            Err(e) => {
                self.release_waits(&request.request_id);
                return Err(e);
            }
        };

        info!(
            request_id = %request.request_id,
            model_id = %request.model_id,
            stages = stages.len(),
            "pipeline start"
        );

        let mut activations = request.input.clone();
        for index in 0..stages.len() {
            match self.run_stage(request, &mut stages[index], index, &activations, executor).await {
                Ok(output) => activations = output,
                Err(e) => {
                    self.release_waits(&request.request_id);
                    return Err(e);
                }
            }
        }

        let rewards = reward::compute_rewards(&stages, request.fee, self.reward_config.provider_share);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        info!(
            request_id = %request.request_id,
            elapsed_ms,
            "pipeline complete"
        );

        Ok(InferenceResult {
            request_id: request.request_id.clone(),
            output: activations,
            stages,
            elapsed_ms,
            rewards,
        })
    }

    /// Run one stage with pending→running→done bookkeeping and a single
    /// replica-failover attempt.
    async fn run_stage(
        &self,
        request: &InferenceRequest,
        stage: &mut RuntimeStage,
        index: usize,
        input: &[f32],
        executor: &dyn StageExecutor,
    ) -> Result<Vec<f32>> {
        stage.status = StageStatus::Running;
        stage.started_at = Some(Utc::now());

        let first_error = match executor.execute(stage, input).await {
            Ok(output) => {
                stage.status = StageStatus::Done;
                stage.ended_at = Some(Utc::now());
                return Ok(output);
            }
            Err(reason) => reason,
        };

        warn!(
            request_id = %request.request_id,
            stage = index,
            shard_id = %stage.shard_id,
            node_id = %stage.node_id,
            reason = %first_error,
            "stage failed; querying replicas"
        );

        // Failover re-queries the registry rather than reusing the stale
        // snapshot the pipeline was built from.
        let failed_node = stage.node_id.clone();
        let replica = self
            .registry
            .get_available_nodes(&stage.shard_id)?
            .into_iter()
            .find(|a| a.node_id != failed_node);

        let Some(replica) = replica else {
            stage.status = StageStatus::Failed;
            stage.ended_at = Some(Utc::now());
            return Err(PipelineError::StageFailed {
                shard_id: stage.shard_id.clone(),
                layer_range: stage.layer_range,
                reason: format!("{first_error}; no replica available"),
            });
        };

        info!(
            request_id = %request.request_id,
            stage = index,
            shard_id = %stage.shard_id,
            from = %failed_node,
            to = %replica.node_id,
            "failing over to replica"
        );
        stage.node_id = replica.node_id;

        match executor.execute(stage, input).await {
            Ok(output) => {
                stage.status = StageStatus::Done;
                stage.ended_at = Some(Utc::now());
                Ok(output)
            }
            Err(reason) => {
                stage.status = StageStatus::Failed;
                stage.ended_at = Some(Utc::now());
                Err(PipelineError::StageFailed {
                    shard_id: stage.shard_id.clone(),
                    layer_range: stage.layer_range,
                    reason: format!("replica also failed: {reason}"),
                })
            }
        }
    }

    /// Best-effort abort: reject the request's outstanding relay waits.
    /// Stage state is request-scoped and dropped with the request; any
    /// peer-side resources are considered abandoned.
    fn release_waits(&self, request_id: &str) {
        if let Some(relay) = &self.relay {
            let released = relay.cancel_request(request_id);
            if released > 0 {
                info!(request_id, released, "released pending relay waits");
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
