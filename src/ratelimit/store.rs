//! Bounded, expiring bucket storage.

use std::collections::HashMap;

use tracing::trace;

/// Default maximum number of buckets held in memory.
pub const DEFAULT_CAPACITY: usize = 10_000;
/// Default entry time-to-live, measured from the last write.
pub const DEFAULT_ENTRY_TTL_MS: u64 = 60 * 60 * 1000;

/// Per-key request counter for the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bucket {
    /// Requests admitted in the current window.
    pub count: u32,
    /// Absolute timestamp (unix milliseconds) at which the window ends.
    pub reset_at_ms: u64,
}

#[derive(Debug)]
struct StoredEntry {
    bucket: Bucket,
    /// Absolute expiry of this entry, independent of the bucket's window.
    expires_at_ms: u64,
    /// Recency sequence number; higher means written more recently.
    touched: u64,
}

/// A bounded key-to-[`Bucket`] map with per-entry TTL and least-recently
/// written eviction.
///
/// The TTL is a safety bound against unbounded growth, not part of the
/// windowing logic: an entry may be dropped while its window is still
/// active, which resets that key's quota early. The same applies to
/// capacity eviction under load. Both are accepted, bounded degradation.
///
/// Callers supply the current time explicitly, which keeps the structure
/// deterministic under test.
#[derive(Debug)]
pub struct BucketStore {
    entries: HashMap<String, StoredEntry>,
    capacity: usize,
    entry_ttl_ms: u64,
    clock: u64,
}

impl BucketStore {
    /// Create a store with the given capacity and entry TTL.
    pub fn new(capacity: usize, entry_ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            entry_ttl_ms,
            clock: 0,
        }
    }

    /// Look up the bucket for a key.
    ///
    /// A TTL-expired entry behaves as absent and is removed lazily.
    pub fn get(&mut self, key: &str, now_ms: u64) -> Option<Bucket> {
        match self.entries.get(key) {
            Some(entry) if entry.expires_at_ms <= now_ms => {
                trace!(key = %key, "Dropping TTL-expired bucket");
                self.entries.remove(key);
                None
            }
            Some(entry) => Some(entry.bucket),
            None => None,
        }
    }

    /// Insert or overwrite the bucket for a key, touching its recency.
    ///
    /// When inserting a new key would exceed capacity, the least recently
    /// written entry is evicted first.
    pub fn set(&mut self, key: &str, bucket: Bucket, now_ms: u64) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            self.evict_least_recent();
        }

        self.clock += 1;
        self.entries.insert(
            key.to_string(),
            StoredEntry {
                bucket,
                expires_at_ms: now_ms + self.entry_ttl_ms,
                touched: self.clock,
            },
        );
    }

    /// Number of entries currently held, including any not yet lazily expired.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_least_recent(&mut self) {
        // Linear scan; eviction only runs at capacity and the capacity is
        // small enough that an ordered side structure isn't worth carrying.
        let victim = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.touched)
            .map(|(key, _)| key.clone());

        if let Some(key) = victim {
            trace!(key = %key, "Evicting least recently used bucket");
            self.entries.remove(&key);
        }
    }
}

impl Default for BucketStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_ENTRY_TTL_MS)
    }
}
