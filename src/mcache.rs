//! Bounded in-memory tier mirroring recently written small artifacts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Artifacts at or above this declared size never enter the memory tier.
pub const MEM_LIMIT: u64 = 2 << 20;

const STAT_INTERVAL: Duration = Duration::from_secs(10);

struct MemEntry {
    key: String,
    data: Arc<[u8]>,
    hits: AtomicU64,
    since: Instant,
}

#[derive(Default)]
struct Inner {
    lookups: FxHashMap<String, Arc<MemEntry>>,
    library: VecDeque<Arc<MemEntry>>,
}

/// Thread-safe, capacity-bounded map from memory keys to payload copies.
///
/// One lock protects both the lookup table and the insertion-ordered list;
/// readers share it, mutators take it exclusively, and nobody holds it
/// across I/O. Eviction is FIFO by insertion. The per-entry hit counter is
/// kept for observability only and never drives eviction. A capacity of 0
/// turns every operation into a no-op.
pub struct MemCache {
    capacity: usize,
    inner: RwLock<Inner>,
}

impl MemCache {
    pub fn new(capacity: usize) -> MemCache {
        MemCache {
            capacity,
            inner: RwLock::new(Inner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Looks up an entry, bumping its hit counter. The returned buffer is
    /// a shared view; callers must not mutate it.
    pub fn get(&self, key: &str) -> Option<Arc<[u8]>> {
        if !self.enabled() {
            return None;
        }
        let inner = self.inner.read();
        inner.lookups.get(key).map(|entry| {
            entry.hits.fetch_add(1, Ordering::Relaxed);
            Arc::clone(&entry.data)
        })
    }

    /// Inserts an entry, replacing any prior one under the same key, then
    /// evicts from the head of the insertion order until the entry count
    /// fits the capacity again.
    pub fn put(&self, key: String, data: Arc<[u8]>) {
        if !self.enabled() {
            return;
        }
        let mut inner = self.inner.write();
        remove_locked(&mut inner, &key);
        debug!(key = %key, size = data.len(), "mcache put");
        let entry = Arc::new(MemEntry {
            key: key.clone(),
            data,
            hits: AtomicU64::new(0),
            since: Instant::now(),
        });
        inner.lookups.insert(key, Arc::clone(&entry));
        inner.library.push_back(entry);
        while inner.library.len() > self.capacity {
            if let Some(oldest) = inner.library.pop_front() {
                debug!(key = %oldest.key, age = ?oldest.since.elapsed(), "mcache evict");
                inner.lookups.remove(&oldest.key);
            }
        }
    }

    /// Explicit removal, used when publication fails after an admission
    /// attempt.
    pub fn remove(&self, key: &str) {
        if !self.enabled() {
            return;
        }
        let mut inner = self.inner.write();
        remove_locked(&mut inner, key);
    }

    pub fn len(&self) -> usize {
        self.inner.read().library.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit count of an entry, when present.
    pub fn hits(&self, key: &str) -> Option<u64> {
        self.inner
            .read()
            .lookups
            .get(key)
            .map(|entry| entry.hits.load(Ordering::Relaxed))
    }

    /// Aggregate payload bytes currently held.
    pub fn payload_bytes(&self) -> u64 {
        self.inner
            .read()
            .library
            .iter()
            .map(|entry| entry.data.len() as u64)
            .sum()
    }

    /// Periodic telemetry: entry count and aggregate payload size.
    pub async fn stat_loop(self: Arc<Self>) {
        let mut tick = tokio::time::interval(STAT_INTERVAL);
        loop {
            tick.tick().await;
            let (entries, bytes) = {
                let inner = self.inner.read();
                let bytes: u64 = inner.library.iter().map(|e| e.data.len() as u64).sum();
                (inner.library.len(), bytes)
            };
            debug!(entries, bytes, "mcache");
        }
    }
}

fn remove_locked(inner: &mut Inner, key: &str) {
    if inner.lookups.remove(key).is_some() {
        inner.library.retain(|entry| entry.key != key);
    }
}
