// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! A bounded, lockable cache that remembers what it evicted.
//!
//! Mirrors a `cachetools`-style cache guarded by a reentrant lock: a single
//! entry point (`num_entries`) bounds memory use, and every value the cache
//! pushes out — by TTL expiry, by LRU pressure, or by hitting capacity on
//! insert — lands in an out-queue the caller can drain and flush instead of
//! silently discarding it. The lock is reentrant so that a `flush` callback
//! invoked while holding it can itself call back into the cache (e.g. to
//! re-insert a value) without deadlocking.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::ReentrantMutex;

use crate::clock::Clock;

/// How entries are evicted once the cache is at capacity.
#[derive(Debug, Clone, Copy)]
pub enum Eviction {
    /// Entries expire `ttl` after they were last written, independent of
    /// access pattern.
    Ttl(Duration),
    /// Entries are evicted least-recently-used first, `get` counts as use.
    Lru,
}

struct Entry<V> {
    value: V,
    written_at: Instant,
}

struct Inner<K, V> {
    map: HashMap<K, Entry<V>>,
    /// Eviction candidate order: front is evicted first. For `Ttl` this is
    /// insertion order; for `Lru` it is recency-of-use order.
    order: VecDeque<K>,
    out_queue: VecDeque<V>,
}

/// A capacity-bounded cache with an eviction out-queue.
pub struct BoundedCache<K, V> {
    inner: ReentrantMutex<RefCell<Inner<K, V>>>,
    num_entries: usize,
    eviction: Eviction,
    clock: Arc<dyn Clock>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(num_entries: usize, eviction: Eviction, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
                out_queue: VecDeque::new(),
            })),
            num_entries,
            eviction,
            clock,
        }
    }

    /// A cache that never stores anything: every insert is immediately
    /// pushed to the out-queue. Mirrors `caches.py::create` choosing "no
    /// cache" for `num_entries <= 0`.
    pub fn disabled(clock: Arc<dyn Clock>) -> Self {
        Self::new(0, Eviction::Lru, clock)
    }

    pub fn is_disabled(&self) -> bool {
        self.num_entries == 0
    }

    /// Looks up `key`, expiring it first if it is TTL-stale. Counts as a use
    /// for LRU purposes.
    pub fn get(&self, key: &K) -> Option<V> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        self.expire_stale(&mut inner);

        if !inner.map.contains_key(key) {
            return None;
        }
        if matches!(self.eviction, Eviction::Lru) {
            if let Some(pos) = inner.order.iter().position(|k| k == key) {
                let k = inner.order.remove(pos).unwrap();
                inner.order.push_back(k);
            }
        }
        inner.map.get(key).map(|e| e.value.clone())
    }

    /// Inserts or overwrites `key`. Returns the previous value, if any, and
    /// evicted entries go to the out-queue, not the return value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        if self.is_disabled() {
            let guard = self.inner.lock();
            guard.borrow_mut().out_queue.push_back(value);
            return None;
        }

        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        self.expire_stale(&mut inner);

        let previous = inner.map.remove(&key).map(|e| e.value);
        if let Some(pos) = inner.order.iter().position(|k| k == &key) {
            inner.order.remove(pos);
        }
        inner.map.insert(
            key.clone(),
            Entry {
                value,
                written_at: self.clock.now(),
            },
        );
        inner.order.push_back(key);

        while inner.map.len() > self.num_entries {
            if let Some(evicted_key) = inner.order.pop_front() {
                if let Some(entry) = inner.map.remove(&evicted_key) {
                    inner.out_queue.push_back(entry.value);
                }
            } else {
                break;
            }
        }

        previous
    }

    /// Mutates `key`'s value in place via `f` without resetting its TTL
    /// timer or counting as an insert. Returns `false` if the key is
    /// absent (TTL-stale entries are expired first, same as `get`).
    ///
    /// Distinct from `get` + `insert`: a round trip through those would
    /// reset `written_at` on every call, so an entry touched continuously
    /// would never age out under TTL eviction. Mutating in place lets a
    /// cache-hit read update bookkeeping (e.g. a pending merge) while
    /// still letting the entry expire on schedule.
    pub fn update_in_place<F: FnOnce(&mut V)>(&self, key: &K, f: F) -> bool {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        self.expire_stale(&mut inner);

        if !inner.map.contains_key(key) {
            return false;
        }
        if matches!(self.eviction, Eviction::Lru) {
            if let Some(pos) = inner.order.iter().position(|k| k == key) {
                let k = inner.order.remove(pos).unwrap();
                inner.order.push_back(k);
            }
        }
        if let Some(entry) = inner.map.get_mut(key) {
            f(&mut entry.value);
        }
        true
    }

    /// Removes `key` without pushing it to the out-queue: an explicit
    /// removal is not an eviction.
    pub fn remove(&self, key: &K) -> Option<V> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        if let Some(pos) = inner.order.iter().position(|k| k == key) {
            inner.order.remove(pos);
        }
        inner.map.remove(key).map(|e| e.value)
    }

    /// Drains and returns every value currently in the out-queue.
    pub fn drain_out_queue(&self) -> Vec<V> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.out_queue.drain(..).collect()
    }

    /// Forces a TTL sweep right now, pushing any stale entries to the
    /// out-queue without waiting for the next `get`/`insert` to trigger it.
    /// A no-op in `Lru` mode. Callers that want a settle-up flush of
    /// everything past its TTL (rather than whatever a prior `get`/`insert`
    /// happened to expire) call this immediately before `drain_out_queue`.
    pub fn expire_now(&self) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        self.expire_stale(&mut inner);
    }

    /// Drops every entry without routing it through the out-queue.
    pub fn clear(&self) {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        inner.map.clear();
        inner.order.clear();
        inner.out_queue.clear();
    }

    /// Drops every entry, returning a snapshot of everything it held —
    /// both still-resident values and anything already sitting in the
    /// out-queue. For callers that need a settle-up of the whole cache
    /// rather than just whatever has already expired.
    pub fn drain_all(&self) -> Vec<V> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let mut out: Vec<V> = inner.out_queue.drain(..).collect();
        out.extend(inner.map.drain().map(|(_, entry)| entry.value));
        inner.order.clear();
        out
    }

    /// Removes and returns every entry for which `pred` holds, without
    /// routing them through the out-queue (an aggregator pulling its own
    /// due-for-flush entries is not an eviction).
    pub fn drain_matching<F: Fn(&V) -> bool>(&self, pred: F) -> Vec<(K, V)> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let mut out = Vec::new();
        let mut remaining_order = VecDeque::new();
        while let Some(key) = inner.order.pop_front() {
            let matches = inner.map.get(&key).map(|e| pred(&e.value)).unwrap_or(false);
            if matches {
                if let Some(entry) = inner.map.remove(&key) {
                    out.push((key, entry.value));
                }
            } else {
                remaining_order.push_back(key);
            }
        }
        inner.order = remaining_order;
        out
    }

    pub fn len(&self) -> usize {
        let guard = self.inner.lock();
        guard.borrow().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire_stale(&self, inner: &mut Inner<K, V>) {
        let ttl = match self.eviction {
            Eviction::Ttl(ttl) => ttl,
            Eviction::Lru => return,
        };
        let now = self.clock.now();
        while let Some(key) = inner.order.front() {
            let stale = match inner.map.get(key) {
                Some(entry) => now.saturating_duration_since(entry.written_at) >= ttl,
                None => true,
            };
            if !stale {
                break;
            }
            let key = inner.order.pop_front().unwrap();
            if let Some(entry) = inner.map.remove(&key) {
                inner.out_queue.push_back(entry.value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn lru_cache(n: usize) -> BoundedCache<&'static str, i32> {
        BoundedCache::new(n, Eviction::Lru, Arc::new(TestClock::new()))
    }

    #[test]
    fn insert_and_get_round_trips() {
        let cache = lru_cache(2);
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let cache = lru_cache(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.get(&"a"); // a is now most-recently-used
        cache.insert("c", 3); // evicts b
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.drain_out_queue(), vec![2]);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn ttl_expires_stale_entries_into_out_queue() {
        let clock = Arc::new(TestClock::new());
        let cache: BoundedCache<&str, i32> =
            BoundedCache::new(10, Eviction::Ttl(Duration::from_millis(500)), clock.clone());
        cache.insert("a", 1);
        clock.advance(Duration::from_millis(600));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.drain_out_queue(), vec![1]);
    }

    #[test]
    fn update_in_place_does_not_reset_the_ttl_timer() {
        let clock = Arc::new(TestClock::new());
        let cache: BoundedCache<&str, i32> =
            BoundedCache::new(10, Eviction::Ttl(Duration::from_millis(500)), clock.clone());
        cache.insert("a", 1);
        clock.advance(Duration::from_millis(300));
        assert!(cache.update_in_place(&"a", |v| *v += 1));
        clock.advance(Duration::from_millis(300));
        // 600ms since the original insert, only 300ms since update_in_place,
        // but the TTL clock still runs from the insert.
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.drain_out_queue(), vec![2]);
    }

    #[test]
    fn update_in_place_returns_false_for_a_missing_key() {
        let cache = lru_cache(2);
        assert!(!cache.update_in_place(&"missing", |v| *v += 1));
    }

    #[test]
    fn disabled_cache_never_stores_and_always_evicts_immediately() {
        let cache: BoundedCache<&str, i32> = BoundedCache::disabled(Arc::new(TestClock::new()));
        assert!(cache.is_disabled());
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.drain_out_queue(), vec![1]);
    }

    #[test]
    fn remove_does_not_populate_out_queue() {
        let cache = lru_cache(2);
        cache.insert("a", 1);
        assert_eq!(cache.remove(&"a"), Some(1));
        assert!(cache.drain_out_queue().is_empty());
    }

    #[test]
    fn drain_matching_removes_only_matching_entries() {
        let cache = lru_cache(10);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        let mut drained = cache.drain_matching(|v| v % 2 == 1);
        drained.sort();
        assert_eq!(drained, vec![1, 3]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn clear_drops_everything_without_flushing() {
        let cache = lru_cache(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.clear();
        assert_eq!(cache.len(), 0);
        assert!(cache.drain_out_queue().is_empty());
    }

    #[test]
    fn drain_all_returns_resident_and_out_queue_values_and_empties_the_cache() {
        let cache = lru_cache(2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3); // evicts "a" into the out-queue

        let mut drained = cache.drain_all();
        drained.sort();
        assert_eq!(drained, vec![1, 2, 3]);
        assert_eq!(cache.len(), 0);
        assert!(cache.drain_out_queue().is_empty());
    }
}
