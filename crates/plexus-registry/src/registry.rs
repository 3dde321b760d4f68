//! Shard → hosting-peer assignment bookkeeping.
//!
//! The registry is the only shared mutable state in the core: peers report
//! into it (claim / release / heartbeat) and in-flight pipelines read from
//! it. Entries are keyed by shard id in a concurrent map, so operations on
//! unrelated shards never serialize against each other.
//!
//! Manifests are mirrored into the injected [`KvStore`] and reloaded on
//! construction; assignments are runtime-only state and start empty.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use plexus_types::config::RegistryConfig;
use plexus_types::model::ShardManifest;

use crate::error::{RegistryError, Result};
use crate::kv::KvStore;

/// Key prefix for manifest records in the backing store.
const MANIFEST_PREFIX: &str = "manifest/";

// ── Assignment ────────────────────────────────────────────────────────────────

/// Availability of one (shard, node) assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Available,
    Busy,
    Offline,
}

/// One peer hosting one shard. Replicas are further assignments for the
/// same shard id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardAssignment {
    pub shard_id: String,
    pub node_id: String,
    pub status: AssignmentStatus,
    pub last_seen: DateTime<Utc>,
}

// ── Registry ──────────────────────────────────────────────────────────────────

struct ShardEntry {
    manifest: ShardManifest,
    assignments: Vec<ShardAssignment>,
}

/// Concurrent shard registry.
///
/// Injectable service with internal synchronization — never a process-wide
/// singleton, so multiple registries can coexist in tests and multi-tenant
/// deployments.
pub struct ShardRegistry {
    config: RegistryConfig,
    kv: Arc<dyn KvStore>,
    shards: DashMap<String, ShardEntry>,
}

impl ShardRegistry {
    /// Open a registry over the given store, reloading any persisted
    /// manifests. Assignments start empty: liveness is re-established by
    /// peer heartbeats, not by stale records.
    pub fn new(config: RegistryConfig, kv: Arc<dyn KvStore>) -> Result<Self> {
        let shards = DashMap::new();
        let mut reloaded = 0usize;

        for (key, value) in kv.all() {
            if !key.starts_with(MANIFEST_PREFIX) {
                continue;
            }
            let (manifest, _): (ShardManifest, usize) =
                bincode::serde::decode_from_slice(&value, bincode::config::standard())
                    .map_err(|e| RegistryError::Storage(format!("decoding {key}: {e}")))?;
            shards.insert(
                manifest.shard_id.clone(),
                ShardEntry {
                    manifest,
                    assignments: Vec::new(),
                },
            );
            reloaded += 1;
        }

        if reloaded > 0 {
            info!(reloaded, "reloaded shard manifests from store");
        }

        Ok(Self { config, kv, shards })
    }

    // ── Manifests ────────────────────────────────────────────────────────

    /// Register (or overwrite) a shard manifest.
    ///
    /// Overwrite is last-writer-wins and keeps existing assignments; there
    /// is no manifest versioning.
    pub fn register_manifest(&self, manifest: ShardManifest) -> Result<()> {
        if manifest.shard_id.is_empty() {
            return Err(RegistryError::InvalidManifest("missing shard_id".into()));
        }
        if manifest.model_id.is_empty() {
            return Err(RegistryError::InvalidManifest("missing model_id".into()));
        }

        let encoded = bincode::serde::encode_to_vec(&manifest, bincode::config::standard())
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        self.kv
            .put(&format!("{MANIFEST_PREFIX}{}", manifest.shard_id), encoded);

        debug!(
            shard_id = %manifest.shard_id,
            model_id = %manifest.model_id,
            layers = %manifest.layer_range,
            "registered manifest"
        );

        match self.shards.get_mut(&manifest.shard_id) {
            Some(mut entry) => entry.manifest = manifest,
            None => {
                self.shards.insert(
                    manifest.shard_id.clone(),
                    ShardEntry {
                        manifest,
                        assignments: Vec::new(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Ordered manifests for a model, ascending by `layer_range.start`.
    ///
    /// Pipeline construction depends on this ordering; an unknown model
    /// yields an empty list.
    pub fn get_model_shards(&self, model_id: &str) -> Vec<ShardManifest> {
        let mut manifests: Vec<ShardManifest> = self
            .shards
            .iter()
            .filter(|entry| entry.manifest.model_id == model_id)
            .map(|entry| entry.manifest.clone())
            .collect();
        manifests.sort_by_key(|m| m.layer_range.start);
        manifests
    }

    // ── Assignments ──────────────────────────────────────────────────────

    /// Record that `node_id` hosts `shard_id`. Idempotent per pair.
    pub fn claim_shard(&self, node_id: &str, shard_id: &str) -> Result<()> {
        let mut entry = self
            .shards
            .get_mut(shard_id)
            .ok_or_else(|| RegistryError::ShardNotFound(shard_id.to_string()))?;

        if entry.assignments.iter().any(|a| a.node_id == node_id) {
            return Ok(());
        }

        entry.assignments.push(ShardAssignment {
            shard_id: shard_id.to_string(),
            node_id: node_id.to_string(),
            status: AssignmentStatus::Available,
            last_seen: Utc::now(),
        });

        debug!(shard_id, node_id, replicas = entry.assignments.len(), "shard claimed");
        Ok(())
    }

    /// Drop the (node, shard) assignment. No-op if absent or unknown.
    pub fn release_shard(&self, node_id: &str, shard_id: &str) {
        if let Some(mut entry) = self.shards.get_mut(shard_id) {
            let before = entry.assignments.len();
            entry.assignments.retain(|a| a.node_id != node_id);
            if entry.assignments.len() < before {
                debug!(shard_id, node_id, "shard released");
            }
        }
    }

    /// Assignments currently able to serve `shard_id`.
    pub fn get_available_nodes(&self, shard_id: &str) -> Result<Vec<ShardAssignment>> {
        let entry = self
            .shards
            .get(shard_id)
            .ok_or_else(|| RegistryError::ShardNotFound(shard_id.to_string()))?;
        Ok(entry
            .assignments
            .iter()
            .filter(|a| a.status == AssignmentStatus::Available)
            .cloned()
            .collect())
    }

    /// Count of available replicas for `shard_id`.
    pub fn replica_count(&self, shard_id: &str) -> Result<usize> {
        Ok(self.get_available_nodes(shard_id)?.len())
    }

    // ── Liveness ─────────────────────────────────────────────────────────

    /// Bump `last_seen` on every assignment belonging to `node_id`.
    /// Offline assignments come back as available.
    pub fn heartbeat(&self, node_id: &str) {
        let now = Utc::now();
        for mut entry in self.shards.iter_mut() {
            for assignment in entry
                .assignments
                .iter_mut()
                .filter(|a| a.node_id == node_id)
            {
                assignment.last_seen = now;
                if assignment.status == AssignmentStatus::Offline {
                    assignment.status = AssignmentStatus::Available;
                }
            }
        }
    }

    /// Mark every assignment older than `threshold_ms` offline and return
    /// the affected node ids, deduplicated.
    ///
    /// Offline assignments are kept, not deleted: the next heartbeat from
    /// the node restores them.
    pub fn evict_stale_nodes(&self, threshold_ms: i64) -> Vec<String> {
        let cutoff = Utc::now() - Duration::milliseconds(threshold_ms);
        let mut evicted = BTreeSet::new();

        for mut entry in self.shards.iter_mut() {
            for assignment in entry.assignments.iter_mut() {
                if assignment.status != AssignmentStatus::Offline && assignment.last_seen < cutoff {
                    assignment.status = AssignmentStatus::Offline;
                    evicted.insert(assignment.node_id.clone());
                }
            }
        }

        if !evicted.is_empty() {
            warn!(nodes = ?evicted, threshold_ms, "evicted stale nodes");
        }
        evicted.into_iter().collect()
    }

    /// Configured staleness window, for callers driving periodic eviction.
    pub fn stale_after_ms(&self) -> i64 {
        self.config.stale_after_ms
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use plexus_types::model::LayerRange;

    fn manifest(shard_id: &str, model_id: &str, start: u32, end: u32) -> ShardManifest {
        ShardManifest {
            shard_id: shard_id.into(),
            model_id: model_id.into(),
            layer_range: LayerRange { start, end },
            content_address: "c".repeat(64),
            size_bytes: 1_000_000,
        }
    }

    fn registry() -> ShardRegistry {
        ShardRegistry::new(RegistryConfig::default(), Arc::new(MemoryKvStore::new())).unwrap()
    }

    #[test]
    fn register_rejects_missing_ids() {
        let reg = registry();
        let err = reg.register_manifest(manifest("", "m", 0, 3)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest(_)));
        let err = reg.register_manifest(manifest("s", "", 0, 3)).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest(_)));
    }

    #[test]
    fn model_shards_sorted_regardless_of_registration_order() {
        let reg = registry();
        reg.register_manifest(manifest("s2", "m", 16, 23)).unwrap();
        reg.register_manifest(manifest("s0", "m", 0, 7)).unwrap();
        reg.register_manifest(manifest("s3", "m", 24, 31)).unwrap();
        reg.register_manifest(manifest("s1", "m", 8, 15)).unwrap();
        reg.register_manifest(manifest("x0", "other", 0, 15)).unwrap();

        let shards = reg.get_model_shards("m");
        let starts: Vec<u32> = shards.iter().map(|m| m.layer_range.start).collect();
        assert_eq!(starts, vec![0, 8, 16, 24]);
    }

    #[test]
    fn register_overwrite_keeps_assignments() {
        let reg = registry();
        reg.register_manifest(manifest("s0", "m", 0, 7)).unwrap();
        reg.claim_shard("peer-a", "s0").unwrap();

        // Last-writer-wins overwrite with a corrected range.
        reg.register_manifest(manifest("s0", "m", 0, 9)).unwrap();
        assert_eq!(reg.get_model_shards("m")[0].layer_range.end, 9);
        assert_eq!(reg.replica_count("s0").unwrap(), 1);
    }

    #[test]
    fn claim_unknown_shard_is_not_found() {
        let reg = registry();
        let err = reg.claim_shard("peer-a", "nope").unwrap_err();
        assert!(matches!(err, RegistryError::ShardNotFound(_)));
    }

    #[test]
    fn claim_is_idempotent_per_pair() {
        let reg = registry();
        reg.register_manifest(manifest("s0", "m", 0, 7)).unwrap();
        reg.claim_shard("peer-a", "s0").unwrap();
        reg.claim_shard("peer-a", "s0").unwrap();
        assert_eq!(reg.replica_count("s0").unwrap(), 1);

        reg.claim_shard("peer-b", "s0").unwrap();
        assert_eq!(reg.replica_count("s0").unwrap(), 2);
    }

    #[test]
    fn claim_release_round_trip_excludes_node() {
        let reg = registry();
        reg.register_manifest(manifest("s0", "m", 0, 7)).unwrap();
        reg.claim_shard("peer-a", "s0").unwrap();
        reg.claim_shard("peer-b", "s0").unwrap();

        reg.release_shard("peer-a", "s0");
        let nodes = reg.get_available_nodes("s0").unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(nodes.iter().all(|a| a.node_id != "peer-a"));

        // No-op for an absent assignment or unknown shard.
        reg.release_shard("peer-a", "s0");
        reg.release_shard("peer-a", "unknown");
    }

    #[test]
    fn eviction_respects_threshold() {
        let reg = registry();
        reg.register_manifest(manifest("s0", "m", 0, 7)).unwrap();
        reg.register_manifest(manifest("s1", "m", 8, 15)).unwrap();
        reg.claim_shard("peer-a", "s0").unwrap();
        reg.claim_shard("peer-a", "s1").unwrap();
        reg.claim_shard("peer-b", "s0").unwrap();

        // Freshly heartbeated assignments survive a generous threshold.
        reg.heartbeat("peer-a");
        reg.heartbeat("peer-b");
        assert!(reg.evict_stale_nodes(60_000).is_empty());

        // A zero-ish threshold evicts everything not heartbeated this
        // instant; peer-a holds two shards but is reported once.
        std::thread::sleep(std::time::Duration::from_millis(10));
        let evicted = reg.evict_stale_nodes(1);
        assert_eq!(evicted, vec!["peer-a".to_string(), "peer-b".to_string()]);

        assert_eq!(reg.replica_count("s0").unwrap(), 0);
        assert_eq!(reg.replica_count("s1").unwrap(), 0);
    }

    #[test]
    fn heartbeat_revives_offline_assignments() {
        let reg = registry();
        reg.register_manifest(manifest("s0", "m", 0, 7)).unwrap();
        reg.claim_shard("peer-a", "s0").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(reg.evict_stale_nodes(1), vec!["peer-a".to_string()]);
        assert_eq!(reg.replica_count("s0").unwrap(), 0);

        reg.heartbeat("peer-a");
        assert_eq!(reg.replica_count("s0").unwrap(), 1);
    }

    #[test]
    fn manifests_reload_from_shared_store() {
        let kv = Arc::new(MemoryKvStore::new());
        {
            let reg = ShardRegistry::new(RegistryConfig::default(), kv.clone()).unwrap();
            reg.register_manifest(manifest("s0", "m", 0, 15)).unwrap();
            reg.register_manifest(manifest("s1", "m", 16, 31)).unwrap();
            reg.claim_shard("peer-a", "s0").unwrap();
        }

        let reloaded = ShardRegistry::new(RegistryConfig::default(), kv).unwrap();
        let shards = reloaded.get_model_shards("m");
        assert_eq!(shards.len(), 2);
        assert_eq!(shards[0].shard_id, "s0");
        // Assignments are runtime state and do not survive a reload.
        assert_eq!(reloaded.replica_count("s0").unwrap(), 0);
    }

    #[test]
    fn concurrent_claims_do_not_interfere() {
        let reg = Arc::new(registry());
        for i in 0..8 {
            reg.register_manifest(manifest(&format!("s{i}"), "m", i * 4, i * 4 + 3))
                .unwrap();
        }

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let reg = reg.clone();
                std::thread::spawn(move || {
                    let shard = format!("s{i}");
                    for p in 0..4 {
                        reg.claim_shard(&format!("peer-{p}"), &shard).unwrap();
                        reg.heartbeat(&format!("peer-{p}"));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for i in 0..8 {
            assert_eq!(reg.replica_count(&format!("s{i}")).unwrap(), 4);
        }
    }
}
