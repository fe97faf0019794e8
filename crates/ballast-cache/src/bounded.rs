use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use ballast_core::Clock;
use ballast_memory::{ClearOutcome, ClearRequest, ClearableResource, CleanupTier, DeviceProfile, MB};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Limits for a [`BoundedCache`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundedCacheConfig {
    /// Upper bound on the sum of weighted entry costs.
    pub cost_limit: u64,
    pub max_entries: usize,
    /// Applied by [`BoundedCache::put`] and [`BoundedCache::put_with_cost`].
    pub default_ttl: Option<Duration>,
    /// Multiplier applied to every entry's cost. Values above 1.0 force earlier eviction.
    pub cost_weight: f64,
}

impl Default for BoundedCacheConfig {
    fn default() -> Self {
        Self {
            cost_limit: 64 * MB,
            max_entries: 500,
            default_ttl: None,
            cost_weight: 1.0,
        }
    }
}

impl BoundedCacheConfig {
    /// Size the cache from the device's memory ceiling.
    ///
    /// Standard devices get 5% of the ceiling, clamped to 16..=256 MiB. Low-end devices get 3%,
    /// clamped to 8..=64 MiB, fewer entries, and a 1.5x cost weight.
    pub fn for_device(profile: &DeviceProfile) -> Self {
        let ceiling_bytes = profile.memory_ceiling_mb() * MB as f64;
        let (fraction, min, max, max_entries, cost_weight) = if profile.is_low_end() {
            (0.03, 8 * MB, 64 * MB, 200, 1.5)
        } else {
            (0.05, 16 * MB, 256 * MB, 500, 1.0)
        };

        Self {
            cost_limit: ((ceiling_bytes * fraction) as u64).clamp(min, max),
            max_entries,
            default_ttl: None,
            cost_weight,
        }
    }

    fn weighted(&self, cost: u64) -> u64 {
        if self.cost_weight.is_finite() && self.cost_weight > 1.0 {
            (cost as f64 * self.cost_weight).ceil() as u64
        } else {
            cost
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub entries: usize,
    pub total_cost: u64,
    pub cost_limit: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or 0 before the first lookup.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

struct Entry<V> {
    value: V,
    cost: u64,
    seq: u64,
    expires_at_ms: Option<u64>,
}

struct State<K, V> {
    entries: HashMap<K, Entry<V>>,
    /// Insertion order; the smallest sequence number is evicted first.
    order: BTreeMap<u64, K>,
    next_seq: u64,
    total_cost: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

impl<K: Eq + Hash + Clone, V> State<K, V> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
            total_cost: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            expirations: 0,
        }
    }

    fn remove_entry<Q>(&mut self, key: &Q) -> Option<Entry<V>>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        self.total_cost -= entry.cost;
        Some(entry)
    }

    fn evict_oldest(&mut self) -> bool {
        let Some((_, key)) = self.order.pop_first() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.total_cost -= entry.cost;
            self.evictions += 1;
        }
        true
    }

    fn drain(&mut self) -> ClearOutcome {
        let outcome = ClearOutcome::new(self.entries.len() as u64, self.total_cost);
        self.entries.clear();
        self.order.clear();
        self.total_cost = 0;
        outcome
    }
}

/// In-memory cache bounded by total cost and entry count.
///
/// Eviction is oldest-inserted-first; re-inserting a key moves it to the back. Every operation
/// is a single critical section and never performs I/O. Expired entries are dropped lazily on
/// lookup and eagerly by [`BoundedCache::purge_expired`].
pub struct BoundedCache<K, V> {
    name: String,
    config: BoundedCacheConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<State<K, V>>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: impl Into<String>, config: BoundedCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            state: Mutex::new(State::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BoundedCacheConfig {
        &self.config
    }

    /// Insert with cost 1 and the default TTL.
    pub fn put(&self, key: K, value: V) -> bool {
        self.put_with_cost(key, value, 1)
    }

    pub fn put_with_cost(&self, key: K, value: V, cost: u64) -> bool {
        self.insert(key, value, cost, self.config.default_ttl)
    }

    pub fn put_with_ttl(&self, key: K, value: V, cost: u64, ttl: Duration) -> bool {
        self.insert(key, value, cost, Some(ttl))
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => entry.expires_at_ms.is_some_and(|at| now >= at),
        };
        if expired {
            state.remove_entry(key);
            state.expirations += 1;
            state.misses += 1;
            return None;
        }

        state.hits += 1;
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Presence check that does not touch the hit/miss counters.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let now = self.clock.now_millis();
        self.state
            .lock()
            .entries
            .get(key)
            .is_some_and(|entry| entry.expires_at_ms.map_or(true, |at| now < at))
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.state.lock().remove_entry(key).map(|entry| entry.value)
    }

    /// Drop every entry and reset all counters.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        *state = State::new();
    }

    /// Drop every expired entry.
    pub fn purge_expired(&self) -> ClearOutcome {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();

        let expired: Vec<K> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at_ms.is_some_and(|at| now >= at))
            .map(|(key, _)| key.clone())
            .collect();

        let mut outcome = ClearOutcome::default();
        for key in expired {
            if let Some(entry) = state.remove_entry(&key) {
                state.expirations += 1;
                outcome += ClearOutcome::new(1, entry.cost);
            }
        }
        outcome
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_cost(&self) -> u64 {
        self.state.lock().total_cost
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            expirations: state.expirations,
            entries: state.entries.len(),
            total_cost: state.total_cost,
            cost_limit: self.config.cost_limit,
        }
    }

    fn insert(&self, key: K, value: V, cost: u64, ttl: Option<Duration>) -> bool {
        let cost = self.config.weighted(cost);
        if cost > self.config.cost_limit || self.config.max_entries == 0 {
            tracing::debug!(
                target = "ballast.cache",
                cache = %self.name,
                cost,
                cost_limit = self.config.cost_limit,
                "rejected entry larger than the cache"
            );
            // The rejected value replaces any previous one, so a stale value is not served.
            self.state.lock().remove_entry(&key);
            return false;
        }

        let expires_at_ms = ttl.map(|ttl| {
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            self.clock.now_millis().saturating_add(ttl_ms)
        });

        let mut state = self.state.lock();
        state.remove_entry(&key);
        while state.total_cost + cost > self.config.cost_limit
            || state.entries.len() >= self.config.max_entries
        {
            if !state.evict_oldest() {
                break;
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.order.insert(seq, key.clone());
        state.entries.insert(
            key,
            Entry {
                value,
                cost,
                seq,
                expires_at_ms,
            },
        );
        state.total_cost += cost;
        true
    }
}

impl<K, V> ClearableResource for BoundedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    /// `Normal` drops expired entries; every stronger tier empties the cache but keeps the
    /// counters so diagnostics still see the hit ratio.
    fn clear(&self, request: ClearRequest) -> ClearOutcome {
        match request.tier {
            CleanupTier::Normal => self.purge_expired(),
            CleanupTier::Aggressive | CleanupTier::Emergency | CleanupTier::ThermalEmergency => {
                self.state.lock().drain()
            }
        }
    }
}

impl<K, V> std::fmt::Debug for BoundedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedCache")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("entries", &state.entries.len())
            .field("total_cost", &state.total_cost)
            .finish()
    }
}
