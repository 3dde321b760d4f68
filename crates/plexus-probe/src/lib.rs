//! Local hardware probing.
//!
//! `probe` reads memory and CPU counts via `sysinfo` and classifies the
//! peer into a coarse tier. It never fails: missing indicators fall back
//! to conservative defaults. Link bandwidth cannot be measured locally,
//! so every snapshot starts at the default; callers overwrite it after an
//! actual link measurement.

use sysinfo::System;
use tracing::debug;

use plexus_types::peer::{PeerCapabilities, Tier};

/// Compute units assumed when the CPU count cannot be read.
pub const DEFAULT_COMPUTE_UNITS: u32 = 4;

/// Link bandwidth assumed until a real measurement replaces it, in Mbps.
pub const DEFAULT_BANDWIDTH_MBPS: u64 = 100;

/// Fraction of probed memory treated as usable; the rest is reserved for
/// the OS and the runtime itself.
const MEMORY_HEADROOM: f64 = 0.7;

/// Assumed bytes per parameter for 4-bit-quantized weights.
const BYTES_PER_PARAM: f64 = 0.5;

// ── Probe ─────────────────────────────────────────────────────────────────────

/// Snapshot this machine's capabilities. Always succeeds.
pub fn probe(peer_id: &str) -> PeerCapabilities {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_all();

    let memory_mb = sys.available_memory() / (1024 * 1024);

    let cpus = sys.cpus().len() as u32;
    let compute_units = if cpus == 0 { DEFAULT_COMPUTE_UNITS } else { cpus };

    let tier = Tier::from_memory_mb(memory_mb);

    debug!(peer_id, memory_mb, compute_units, %tier, "probed local capabilities");

    PeerCapabilities {
        peer_id: peer_id.to_string(),
        memory_mb,
        compute_units,
        bandwidth_mbps: DEFAULT_BANDWIDTH_MBPS,
        tier,
    }
}

// ── Solo-hosting ceiling ──────────────────────────────────────────────────────

/// Largest parameter count a single peer with `memory_mb` usable memory can
/// host alone, assuming 4-bit-quantized weights and a 30% memory reserve.
pub fn max_solo_model_params(memory_mb: u64) -> u64 {
    let usable_bytes = memory_mb as f64 * 1024.0 * 1024.0 * MEMORY_HEADROOM;
    (usable_bytes / BYTES_PER_PARAM) as u64
}

// ── Tests ─────────────────────────────────────────────────────────────────────
