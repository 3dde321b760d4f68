// Model and shard descriptors.
//
// Consumed by `plexus-registry`, `plexus-pipeline`, and `plexus-node`.

use serde::{Deserialize, Serialize};

// ── Layer Range ───────────────────────────────────────────────────────────────

/// Inclusive range of transformer block indices assigned to a shard.
///
/// `LayerRange { start: 0, end: 3 }` covers blocks 0, 1, 2, 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerRange {
    pub start: u32,
    pub end: u32,
}

impl LayerRange {
    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl std::fmt::Display for LayerRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

// ── Model Spec ────────────────────────────────────────────────────────────────

/// Catalog entry for a model onboarded onto the mesh.
///
/// Supplied by the external model catalog; read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Catalog identifier (e.g. `"llama-7b-q4"`).
    pub model_id: String,
    /// Total parameter count.
    pub param_count: u64,
    /// Aggregate VRAM footprint required to host the full model, in MB.
    pub required_memory_mb: u64,
    /// Number of transformer blocks.
    pub layers: u32,
    /// Hidden dimension of the activation tensors flowing between blocks.
    pub hidden_dim: u32,
}

// ── Shard Manifest ────────────────────────────────────────────────────────────

/// Descriptor for one shard of a partitioned model.
///
/// Created once at partition time and immutable thereafter. The registry
/// keys all assignment bookkeeping on `shard_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardManifest {
    pub shard_id: String,
    pub model_id: String,
    /// Which transformer blocks this shard contains.
    pub layer_range: LayerRange,
    /// BLAKE3 hex digest of the shard blob.
    pub content_address: String,
    pub size_bytes: u64,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_range_len() {
        let r = LayerRange { start: 0, end: 3 };
        assert_eq!(r.len(), 4);
        assert!(!r.is_empty());
    }

    #[test]
    fn layer_range_single_block() {
        let r = LayerRange { start: 7, end: 7 };
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn shard_manifest_serde_round_trip() {
        let m = ShardManifest {
            shard_id: "llama-7b/shard-0".into(),
            model_id: "llama-7b".into(),
            layer_range: LayerRange { start: 0, end: 7 },
            content_address: "a".repeat(64),
            size_bytes: 500_000_000,
        };
        let json = serde_json::to_string(&m).unwrap();
        let round: ShardManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(m, round);
    }

    #[test]
    fn model_spec_serde_round_trip() {
        let spec = ModelSpec {
            model_id: "llama-7b".into(),
            param_count: 7_000_000_000,
            required_memory_mb: 4200,
            layers: 32,
            hidden_dim: 4096,
        };
        let json = serde_json::to_string(&spec).unwrap();
        let round: ModelSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(round.layers, 32);
        assert_eq!(round.hidden_dim, 4096);
    }
}
