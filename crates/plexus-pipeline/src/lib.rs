//! `plexus-pipeline` — partition planning and pipeline orchestration.
//!
//! This crate is a **scheduling layer**, not a compute layer. The actual
//! forward pass runs behind the [`StageExecutor`] seam; Rust decides which
//! peer runs which layers, drives the stage chain, fails over to replicas,
//! and settles proportional rewards.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Stage 0   │────▶│   Stage 1   │────▶│   Stage 2   │
//! │ layers 0-10 │     │ layers 11-21│     │ layers 22-31│
//! │   Peer A    │     │   Peer B    │     │   Peer C    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │ on failure: swap in a replica from the registry
//! ```

pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod reward;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use error::{PipelineError, Result};
pub use orchestrator::{
    InferenceRequest, InferenceResult, PipelineOrchestrator, PipelineReadiness, StageExecutor,
};
pub use plan::create_plan;
pub use reward::{compute_rewards, StageReward};
