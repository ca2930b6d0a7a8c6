//! Graph cache — fingerprint keys, the injected cache interface, and the
//! default in-memory implementation.
//!
//! The cache is a dependency handed to [`GraphBuilder`](super::GraphBuilder),
//! never a module-level singleton, so tests can substitute their own
//! implementation with full control over eviction timing. Graphs are
//! immutable once built, so entries are shared as `Arc`s; eviction only
//! drops a reference.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::annotation::EntityId;
use crate::graph::InteractionGraph;

/// Deterministic cache key for a build request: SHA-256 over the interaction
/// source version, the confidence threshold, and the sorted entity ids.
/// Entity order does not matter; the source version does, so a data refresh
/// invalidates every cached graph.
pub fn fingerprint(entities: &[EntityId], min_confidence: u16, source_version: &str) -> String {
    let mut sorted: Vec<&str> = entities.iter().map(EntityId::as_str).collect();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(source_version.as_bytes());
    hasher.update([0u8]);
    hasher.update(min_confidence.to_be_bytes());
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

/// Key-value cache for built graphs.
///
/// Implementations own their TTL/eviction policy. `get` must refresh
/// whatever recency bookkeeping the policy keeps; `put` replaces an existing
/// entry under the same key.
pub trait GraphCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<InteractionGraph>>;
    fn put(&self, key: &str, graph: Arc<InteractionGraph>);
    /// Remove one entry; `true` if it was resident.
    fn evict(&self, key: &str) -> bool;
    fn clear(&self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    graph: Arc<InteractionGraph>,
    inserted: Instant,
    last_access: Instant,
}

/// Default [`GraphCache`]: mutex-guarded map with lazy TTL expiry and LRU
/// eviction above a capacity bound.
///
/// A poisoned lock degrades to cache misses.
pub struct MemoryGraphCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryGraphCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            // A zero capacity would evict every insert immediately.
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn purge_expired(&self, entries: &mut HashMap<String, Entry>) {
        entries.retain(|_, e| e.inserted.elapsed() < self.ttl);
    }
}

impl GraphCache for MemoryGraphCache {
    fn get(&self, key: &str) -> Option<Arc<InteractionGraph>> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return None,
        };
        match entries.get_mut(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => {
                entry.last_access = Instant::now();
                Some(Arc::clone(&entry.graph))
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: &str, graph: Arc<InteractionGraph>) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return,
        };
        self.purge_expired(&mut entries);

        let now = Instant::now();
        entries.insert(
            key.to_owned(),
            Entry {
                graph,
                inserted: now,
                last_access: now,
            },
        );

        while entries.len() > self.capacity {
            let lru = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match lru {
                Some(k) => {
                    debug!(fingerprint = %&k[..k.len().min(12)], "evicting least-recently-used graph");
                    entries.remove(&k);
                }
                None => break,
            }
        }
    }

    fn evict(&self, key: &str) -> bool {
        match self.entries.lock() {
            Ok(mut entries) => entries.remove(key).is_some(),
            Err(_) => false,
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(mut entries) => {
                self.purge_expired(&mut entries);
                entries.len()
            }
            Err(_) => 0,
        }
    }
}
