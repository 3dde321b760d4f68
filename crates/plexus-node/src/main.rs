//! Plexus node binary — probe, plan, and loopback pipeline demo.
//!
//! ```bash
//! # Print this machine's capability snapshot
//! RUST_LOG=info cargo run --bin plexus-node -- probe
//!
//! # Partition a synthetic 32-layer model across three peers
//! RUST_LOG=info cargo run --bin plexus-node -- plan --peer 6000 --peer 6000 --peer 4000
//!
//! # Run a full in-process pipeline: registry, relay, failover, rewards
//! RUST_LOG=info cargo run --bin plexus-node -- demo
//! ```

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use plexus_pipeline::{
    create_plan, InferenceRequest, PipelineOrchestrator, StageExecutor,
};
use plexus_registry::{MemoryKvStore, ShardRegistry};
use plexus_relay::ActivationRelay;
use plexus_types::config::{RegistryConfig, RelayConfig, RewardConfig};
use plexus_types::content_address::content_address;
use plexus_types::model::{ModelSpec, ShardManifest};
use plexus_types::peer::{PeerCapabilities, Tier};
use plexus_types::runtime::{ActivationMessage, RuntimeStage};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "plexus-node",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Plexus — capability-aware pipeline-parallel inference mesh"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the local capability snapshot and solo-hosting ceiling.
    Probe,

    /// Partition a synthetic model across the given peer memories.
    Plan {
        /// Peer memory in MB; repeat per peer.
        #[arg(long = "peer", required = true)]
        peers: Vec<u64>,

        /// Model layer count.
        #[arg(long, default_value_t = 32)]
        layers: u32,

        /// Model memory footprint in MB.
        #[arg(long, default_value_t = 8000)]
        required_mb: u64,
    },

    /// Run an in-process four-stage pipeline with a scripted mid-run
    /// failure and replica failover.
    Demo,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Default log level: INFO. Override with RUST_LOG=plexus_pipeline=debug etc.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Probe => run_probe(),
        Command::Plan { peers, layers, required_mb } => run_plan(peers, layers, required_mb),
        Command::Demo => run_demo().await,
    }
}

// ── Probe mode ────────────────────────────────────────────────────────────────

fn run_probe() -> Result<()> {
    let caps = plexus_probe::probe("local");
    println!("{}", serde_json::to_string_pretty(&caps)?);
    println!(
        "solo-hosting ceiling: {:.1}B params",
        plexus_probe::max_solo_model_params(caps.memory_mb) as f64 / 1e9
    );
    Ok(())
}

// ── Plan mode ─────────────────────────────────────────────────────────────────

fn run_plan(peer_memories: Vec<u64>, layers: u32, required_mb: u64) -> Result<()> {
    let peers: Vec<PeerCapabilities> = peer_memories
        .iter()
        .enumerate()
        .map(|(i, mb)| PeerCapabilities {
            peer_id: format!("peer-{i}"),
            memory_mb: *mb,
            compute_units: 8,
            bandwidth_mbps: 1000,
            tier: Tier::from_memory_mb(*mb),
        })
        .collect();

    let model = ModelSpec {
        model_id: "synthetic".into(),
        param_count: 7_000_000_000,
        required_memory_mb: required_mb,
        layers,
        hidden_dim: 4096,
    };

    let plan = create_plan(&model, &peers)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

// ── Demo mode ─────────────────────────────────────────────────────────────────

/// Simulated forward pass that echoes each stage's output through the
/// relay loopback, exercising the codec, chunking, and wait table.
struct LoopbackExecutor {
    relay: Arc<ActivationRelay>,
    /// Node that fails its first attempt, forcing a replica swap.
    flaky_node: String,
    flaky_tripped: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl StageExecutor for LoopbackExecutor {
    async fn execute(
        &self,
        stage: &RuntimeStage,
        input: &[f32],
    ) -> std::result::Result<Vec<f32>, String> {
        use std::sync::atomic::Ordering;
        if stage.node_id == self.flaky_node && !self.flaky_tripped.swap(true, Ordering::SeqCst) {
            return Err("simulated compute fault".into());
        }

        // One fused scale-and-shift per layer stands in for the real math.
        let mut out = input.to_vec();
        for _ in 0..stage.layer_range.len() {
            for v in out.iter_mut() {
                *v = *v * 0.999 + 0.01;
            }
        }

        // Stream the output back to ourselves; waits are keyed by the
        // stage's first layer.
        let msg = ActivationMessage {
            request_id: stage.shard_id.clone(),
            shard_id: stage.shard_id.clone(),
            stage_index: stage.layer_range.start,
            shape: vec![out.len() as u32],
            tensor: out,
            timestamp: chrono::Utc::now(),
        };

        let mut frames: Vec<Vec<u8>> = Vec::new();
        self.relay
            .send(&msg, |frame| {
                frames.push(frame.to_vec());
                Ok(())
            })
            .map_err(|e| e.to_string())?;

        // Deliver from a detached task while this stage blocks in
        // wait_for_activation, the same shape a real transport has.
        let deliver = self.relay.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            for frame in &frames {
                let _ = deliver.handle_incoming(frame);
            }
        });

        let echoed = self
            .relay
            .wait_for_activation(&msg.request_id, msg.stage_index)
            .await
            .map_err(|e| e.to_string())?;
        Ok(echoed.tensor)
    }
}

async fn run_demo() -> Result<()> {
    // ── Registry: a 32-layer model in four shards ────────────────────────
    let registry = Arc::new(ShardRegistry::new(
        RegistryConfig::default(),
        Arc::new(MemoryKvStore::new()),
    )?);

    for (i, (start, end)) in [(0u32, 7u32), (8, 15), (16, 23), (24, 31)].iter().enumerate() {
        let shard_id = format!("demo-model/shard-{i}");
        registry.register_manifest(ShardManifest {
            shard_id: shard_id.clone(),
            model_id: "demo-model".into(),
            layer_range: plexus_types::model::LayerRange { start: *start, end: *end },
            content_address: content_address(shard_id.as_bytes()),
            size_bytes: 512 * 1024 * 1024,
        })?;
        registry.claim_shard(&format!("peer-{i}"), &shard_id)?;
        registry.heartbeat(&format!("peer-{i}"));
    }
    // A replica for shard 2 — the failover target.
    registry.claim_shard("peer-backup", "demo-model/shard-2")?;

    // ── Relay + orchestrator ─────────────────────────────────────────────
    let relay = Arc::new(ActivationRelay::new(RelayConfig::default()));
    let orchestrator = PipelineOrchestrator::new(registry.clone(), RewardConfig::default())
        .with_relay(relay.clone());

    let readiness = orchestrator.check_pipeline_readiness("demo-model");
    info!(complete = readiness.complete, "pipeline readiness");

    let executor = LoopbackExecutor {
        relay: relay.clone(),
        flaky_node: "peer-2".into(),
        flaky_tripped: std::sync::atomic::AtomicBool::new(false),
    };

    // ── Execute ──────────────────────────────────────────────────────────
    let request = InferenceRequest::new("demo-model", vec![1.0; 4096], 100.0);
    let result = orchestrator.execute_pipeline(&request, &executor).await?;

    println!("request    {}", result.request_id);
    println!("elapsed    {:.2} ms", result.elapsed_ms);
    println!("output[0]  {:.6}", result.output[0]);
    for (i, stage) in result.stages.iter().enumerate() {
        println!(
            "stage {i}  {}  layers {}  node {}  {}",
            stage.shard_id, stage.layer_range, stage.node_id, stage.status
        );
    }
    for reward in &result.rewards {
        println!("reward     {}  {:.4}", reward.node_id, reward.amount);
    }

    relay.cancel_all();
    Ok(())
}
