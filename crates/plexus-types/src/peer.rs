// Peer capability snapshots and tier classification.

use serde::{Deserialize, Serialize};

// ── Tier ──────────────────────────────────────────────────────────────────────

/// Coarse capability class of a peer, derived from usable memory.
///
/// Boundaries (MB): xs < 1000 ≤ s < 4000 ≤ m < 8000 ≤ l < 24000 ≤ xl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Xs,
    S,
    M,
    L,
    Xl,
}

impl Tier {
    /// Classify a peer by usable memory. Pure function.
    pub fn from_memory_mb(memory_mb: u64) -> Self {
        match memory_mb {
            0..=999 => Self::Xs,
            1000..=3999 => Self::S,
            4000..=7999 => Self::M,
            8000..=23999 => Self::L,
            _ => Self::Xl,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Xs => "xs",
            Self::S => "s",
            Self::M => "m",
            Self::L => "l",
            Self::Xl => "xl",
        };
        write!(f, "{s}")
    }
}

// ── Peer Capabilities ─────────────────────────────────────────────────────────

/// Immutable snapshot of one peer's measured capabilities.
///
/// Produced by `plexus-probe`; consumed by the planner. Callers re-probe
/// periodically rather than mutating a snapshot in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerCapabilities {
    pub peer_id: String,
    /// Usable memory for model hosting, in MB.
    pub memory_mb: u64,
    /// Logical compute units (CPU cores or accelerator lanes).
    pub compute_units: u32,
    /// Link bandwidth in Mbps.
    pub bandwidth_mbps: u64,
    pub tier: Tier,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
