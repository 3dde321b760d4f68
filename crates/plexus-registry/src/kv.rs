//! Abstract key-value persistence seam.
//!
//! The registry mirrors manifest records through this trait so the actual
//! storage technology stays outside the core. `MemoryKvStore` backs tests
//! and single-process deployments; a durable implementation lives with the
//! embedding application.

use std::collections::BTreeMap;
use std::sync::RwLock;

/// Minimal key-value contract: `put/get/del/all`.
///
/// Implementations must be safe under concurrent access.
pub trait KvStore: Send + Sync {
    fn put(&self, key: &str, value: Vec<u8>);
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn del(&self, key: &str);
    /// Every `(key, value)` pair in ascending key order.
    fn all(&self) -> Vec<(String, Vec<u8>)>;
}

// ── In-memory implementation ──────────────────────────────────────────────────

/// Process-local `KvStore` backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn put(&self, key: &str, value: Vec<u8>) {
        self.entries
            .write()
            .expect("kv lock poisoned")
            .insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries
            .read()
            .expect("kv lock poisoned")
            .get(key)
            .cloned()
    }

    fn del(&self, key: &str) {
        self.entries.write().expect("kv lock poisoned").remove(key);
    }

    fn all(&self) -> Vec<(String, Vec<u8>)> {
        self.entries
            .read()
            .expect("kv lock poisoned")
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
