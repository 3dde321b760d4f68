// Global configuration structs.

use std::time::Duration;

// ── Registry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Assignments not heartbeated within this window are marked offline
    /// by `evict_stale_nodes`. Default: 30 s.
    pub stale_after_ms: i64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            stale_after_ms: 30_000,
        }
    }
}

// ── Relay ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Serialized messages above this size are split into chunks.
    /// Default: 64 KiB.
    pub chunk_bytes: usize,

    /// How long `wait_for_activation` blocks before failing with a
    /// timeout. Default: 30 s.
    pub wait_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: 64 * 1024,
            wait_timeout: Duration::from_secs(30),
        }
    }
}

// ── Rewards ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RewardConfig {
    /// Fraction of an inference fee distributed to stage providers.
    /// The remainder goes to the surrounding fee market (out of scope here).
    /// Default: 0.7.
    pub provider_share: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            provider_share: 0.7,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(RegistryConfig::default().stale_after_ms, 30_000);
        assert_eq!(RelayConfig::default().chunk_bytes, 64 * 1024);
        assert_eq!(RelayConfig::default().wait_timeout, Duration::from_secs(30));
        assert!((RewardConfig::default().provider_share - 0.7).abs() < 1e-12);
    }
}
