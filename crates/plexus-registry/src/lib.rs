//! `plexus-registry` — shard → hosting-peer assignment bookkeeping.
//!
//! Peers report in (claim / release / heartbeat), pipelines read out.
//! Manifest records persist through an abstract [`KvStore`]; assignment
//! liveness is re-established by heartbeats after every restart.

pub mod error;
pub mod kv;
pub mod registry;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use error::{RegistryError, Result};
pub use kv::{KvStore, MemoryKvStore};
pub use registry::{AssignmentStatus, ShardAssignment, ShardRegistry};
