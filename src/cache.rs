// Copyright (C) 2025 Matías Salinas (support@fenden.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Greedy-Dual Size Frequency cache: a score-ordered list of entries,
//! highest score at the head, lowest at the tail. Score is
//! `(frequency * latency) / size`; a hit bumps frequency and repositions
//! the entry, an insert that overflows capacity evicts the tail.
//!
//! The list is a plain `Vec` behind one mutex rather than an intrusive
//! doubly-linked list: the ordering invariants are what the cache must
//! keep, not any particular pointer representation.

use std::sync::Mutex;

use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Global handle to the running cache, set once from `main` so the
/// admin endpoints can reach it the same way they reach `CONFIG`.
pub static CACHE: OnceCell<Arc<Cache>> = OnceCell::new();

/// One cached response and the bookkeeping used to score it.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub host: String,
    pub path: String,
    pub response: Vec<u8>,
    pub size: u64,
    pub frequency: u64,
    pub latency: f64,
    pub score: f64,
}

impl CacheEntry {
    fn new(host: String, path: String, response: Vec<u8>, size: u64, latency: f64) -> Self {
        let frequency = 1;
        let score = score_of(frequency, latency, size);
        CacheEntry {
            host,
            path,
            response,
            size,
            frequency,
            latency,
            score,
        }
    }
}

fn score_of(frequency: u64, latency: f64, size: u64) -> f64 {
    (frequency as f64 * latency) / size as f64
}

/// Snapshot of a live entry, safe to hand out past the cache's lock.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub host: String,
    pub path: String,
    pub size: u64,
    pub frequency: u64,
    pub latency: f64,
    pub score: f64,
}

impl From<&CacheEntry> for CacheStats {
    fn from(e: &CacheEntry) -> Self {
        CacheStats {
            host: e.host.clone(),
            path: e.path.clone(),
            size: e.size,
            frequency: e.frequency,
            latency: e.latency,
            score: e.score,
        }
    }
}

struct Inner {
    entries: Vec<CacheEntry>,
    hits: u64,
    misses: u64,
}

/// Bounded, score-ordered cache guarded by a single mutex. Network fetches
/// must happen outside any critical section taken against it.
pub struct Cache {
    capacity: usize,
    inner: Mutex<Inner>,
}

/// Outcome of an insert, used by callers that report eviction.
pub struct InsertOutcome {
    pub evicted: Option<CacheStats>,
}

impl Cache {
    pub fn create(capacity: usize) -> Self {
        Cache {
            capacity,
            inner: Mutex::new(Inner {
                entries: Vec::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Looks up `(host, path)`. On a hit, bumps frequency, recomputes
    /// score, and repositions the entry — its score only ever grows, so
    /// its position never moves strictly toward the tail.
    pub fn lookup(&self, host: &str, path: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner
            .entries
            .iter()
            .position(|e| e.host == host && e.path == path);

        let idx = match idx {
            Some(i) => i,
            None => {
                inner.misses += 1;
                metrics::counter!("proxy_cache_misses_total").increment(1);
                return None;
            }
        };

        inner.hits += 1;
        metrics::counter!("proxy_cache_hits_total").increment(1);
        let mut entry = inner.entries.remove(idx);
        entry.frequency += 1;
        entry.score = score_of(entry.frequency, entry.latency, entry.size);
        let bytes = entry.response.clone();
        insert_sorted(&mut inner.entries, entry);
        Some(bytes)
    }

    /// Inserts a freshly fetched response. Duplicate keys are not
    /// deduplicated: a second miss for the same `(host, path)` adds a
    /// second, independent entry alongside any prior one.
    pub fn insert(
        &self,
        host: impl Into<String>,
        path: impl Into<String>,
        response: Vec<u8>,
        size: u64,
        latency: f64,
    ) -> InsertOutcome {
        let entry = CacheEntry::new(host.into(), path.into(), response, size, latency);
        let mut inner = self.inner.lock().unwrap();
        insert_sorted(&mut inner.entries, entry);

        let evicted = if inner.entries.len() > self.capacity {
            inner.entries.pop().as_ref().map(CacheStats::from)
        } else {
            None
        };

        metrics::gauge!("proxy_cache_size").set(inner.entries.len() as f64);
        InsertOutcome { evicted }
    }

    pub fn destroy(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn hits(&self) -> u64 {
        self.inner.lock().unwrap().hits
    }

    pub fn misses(&self) -> u64 {
        self.inner.lock().unwrap().misses
    }

    /// Head-to-tail snapshot of every live entry, for the admin status
    /// endpoint. Not a stable interface.
    pub fn snapshot(&self) -> Vec<CacheStats> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .map(CacheStats::from)
            .collect()
    }
}

/// Places `entry` according to the tie-break rules: prepend if its score
/// is at least the head's, append if it's at most the tail's, otherwise
/// insert before the first entry with a strictly lower score.
fn insert_sorted(entries: &mut Vec<CacheEntry>, entry: CacheEntry) {
    if entries.is_empty() {
        entries.push(entry);
        return;
    }

    let s = entry.score;
    if s >= entries[0].score {
        entries.insert(0, entry);
        return;
    }

    let tail_score = entries[entries.len() - 1].score;
    if s <= tail_score {
        entries.push(entry);
        return;
    }

    for i in 0..entries.len() {
        if entries[i].score < s {
            entries.insert(i, entry);
            return;
        }
    }
    entries.push(entry);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(cache: &Cache) -> Vec<f64> {
        cache.snapshot().iter().map(|e| e.score).collect()
    }

    #[test]
    fn cold_then_warm_lookup() {
        let cache = Cache::create(5);
        assert!(cache.lookup("example.com", "/").is_none());
        assert_eq!(cache.misses(), 1);

        cache.insert("example.com", "/", vec![0u8; 200], 200, 0.1);
        assert_eq!(cache.size(), 1);

        let hit = cache.lookup("example.com", "/");
        assert!(hit.is_some());
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn eviction_is_tail_only() {
        let cache = Cache::create(2);
        cache.insert("a", "/", vec![0u8; 1000], 1000, 0.10); // score 1e-4
        cache.insert("b", "/", vec![0u8; 1000], 1000, 0.05); // score 5e-5
        let outcome = cache.insert("c", "/", vec![0u8; 1000], 1000, 0.20); // score 2e-4

        assert_eq!(cache.size(), 2);
        let evicted = outcome.evicted.expect("b should be evicted");
        assert_eq!(evicted.host, "b");

        let snap = cache.snapshot();
        assert_eq!(snap[0].host, "c");
        assert_eq!(snap[1].host, "a");
    }

    #[test]
    fn ordering_is_monotonic_non_increasing() {
        let cache = Cache::create(10);
        cache.insert("a", "/", vec![0u8; 1000], 1000, 0.10);
        cache.insert("b", "/", vec![0u8; 1000], 1000, 0.20);
        cache.insert("c", "/", vec![0u8; 1000], 1000, 0.05);

        let s = scores(&cache);
        for w in s.windows(2) {
            assert!(w[0] >= w[1]);
        }
    }

    #[test]
    fn hit_promotion_reorders_ahead() {
        let cache = Cache::create(3);
        cache.insert("a", "/", vec![0u8; 1000], 1000, 0.1); // score 1e-4
        cache.insert("b", "/", vec![0u8; 1000], 1000, 0.2); // score 2e-4
        cache.insert("c", "/", vec![0u8; 1000], 1000, 0.3); // score 3e-4

        assert_eq!(
            cache.snapshot().iter().map(|e| e.host.clone()).collect::<Vec<_>>(),
            vec!["c", "b", "a"]
        );

        for _ in 0..3 {
            cache.lookup("a", "/");
        }
        // a: frequency 4, latency 0.1, size 1000 -> score 4e-4 > 3e-4
        assert_eq!(
            cache.snapshot().iter().map(|e| e.host.clone()).collect::<Vec<_>>(),
            vec!["a", "c", "b"]
        );
    }

    #[test]
    fn duplicate_keys_are_not_deduplicated() {
        let cache = Cache::create(10);
        cache.insert("a", "/", vec![1], 1, 0.1);
        cache.insert("a", "/", vec![2], 1, 0.1);
        assert_eq!(cache.size(), 2);
    }

    #[test]
    fn bounded_size_holds_under_many_inserts() {
        let cache = Cache::create(4);
        for i in 0..50u64 {
            cache.insert(format!("h{i}"), "/", vec![0u8; 100], 100, (i % 7) as f64 * 0.01);
        }
        assert!(cache.size() <= 4);
    }
}
