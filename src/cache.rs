use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::trace;

use crate::config::AppConfig;
use crate::models::{LocationDetails, ResolvedIdentifier};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, expires_at: DateTime<Utc>) -> Self {
        Self { value, expires_at }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

pub type IdentifierCacheEntry = CacheEntry<ResolvedIdentifier>;
pub type DetailsCacheEntry = CacheEntry<LocationDetails>;

/// Expiry time measured from `now`, saturating instead of overflowing.
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(if ttl < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

struct Slot<V> {
    entry: CacheEntry<V>,
    last_used: u64,
}

struct Inner<V> {
    slots: HashMap<String, Slot<V>>,
    // last_used tick -> key, oldest first
    recency: BTreeMap<u64, String>,
    // (expires_at, key), soonest first
    expiries: BTreeSet<(DateTime<Utc>, String)>,
    tick: u64,
}

impl<V> Inner<V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.slots.remove(key) {
            Some(slot) => {
                self.recency.remove(&slot.last_used);
                self.expiries
                    .remove(&(slot.entry.expires_at, key.to_string()));
                true
            }
            None => false,
        }
    }

    /// Drops every expired entry, then the least recently used one if the
    /// map is still at `capacity`.
    fn make_room(&mut self, capacity: usize, now: DateTime<Utc>, name: &'static str) {
        let mut dropped = 0_usize;
        while let Some((expires_at, key)) = self.expiries.first().cloned() {
            if expires_at > now {
                break;
            }
            self.remove(&key);
            dropped += 1;
        }
        if dropped > 0 {
            trace!(cache = name, dropped, "dropped expired entries");
        }
        if self.slots.len() < capacity {
            return;
        }
        let victim = self.recency.first_key_value().map(|(_, key)| key.clone());
        if let Some(victim) = victim {
            self.remove(&victim);
            trace!(cache = name, key = %victim, "evicted least recently used entry");
        }
    }
}

/// Bounded key -> entry map. Expiry is checked lazily on read; inserting into
/// a full map drops expired entries first, then the least recently used one.
pub struct TtlCache<V> {
    name: &'static str,
    ttl: Duration,
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(name: &'static str, ttl: Duration, capacity: usize) -> Self {
        Self {
            name,
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                recency: BTreeMap::new(),
                expiries: BTreeSet::new(),
                tick: 0,
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry<V>> {
        let mut inner = self.inner.lock();
        let valid = inner.slots.get(key)?.entry.is_valid_at(now);
        if !valid {
            inner.remove(key);
            trace!(cache = self.name, key, "dropped expired entry");
            return None;
        }
        let tick = inner.next_tick();
        let slot = inner.slots.get_mut(key)?;
        let previous = std::mem::replace(&mut slot.last_used, tick);
        let entry = slot.entry.clone();
        inner.recency.remove(&previous);
        inner.recency.insert(tick, key.to_string());
        Some(entry)
    }

    /// Stores `value` with a fresh TTL measured from `now`.
    pub fn insert(&self, key: &str, value: V, now: DateTime<Utc>) -> CacheEntry<V> {
        let entry = CacheEntry::new(value, expiry_after(now, self.ttl));
        self.insert_entry(key, entry.clone(), now);
        entry
    }

    /// Stores a prebuilt entry, replacing whatever was there.
    pub fn insert_entry(&self, key: &str, entry: CacheEntry<V>, now: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        if !inner.remove(key) && inner.slots.len() >= self.capacity {
            inner.make_room(self.capacity, now, self.name);
        }
        let tick = inner.next_tick();
        inner.recency.insert(tick, key.to_string());
        inner
            .expiries
            .insert((entry.expires_at, key.to_string()));
        inner.slots.insert(
            key.to_string(),
            Slot {
                entry,
                last_used: tick,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.inner.lock().remove(key);
    }
}

/// The two in-process tiers, shared between the resolver and the details fetcher.
pub struct PlaceCaches {
    pub identifiers: TtlCache<ResolvedIdentifier>,
    pub details: TtlCache<LocationDetails>,
    clock: Arc<dyn Clock>,
}

impl PlaceCaches {
    pub fn new(
        identifier_ttl: Duration,
        identifier_capacity: usize,
        details_ttl: Duration,
        details_capacity: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identifiers: TtlCache::new("identifiers", identifier_ttl, identifier_capacity),
            details: TtlCache::new("details", details_ttl, details_capacity),
            clock,
        }
    }

    pub fn from_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.identifier_ttl(),
            config.identifier_cache_capacity,
            config.details_ttl(),
            config.details_cache_capacity,
            clock,
        )
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = epoch();
        let expired = CacheEntry::new("x", now - Duration::milliseconds(1));
        let valid = CacheEntry::new("x", now + Duration::milliseconds(1));
        let exact = CacheEntry::new("x", now);

        assert!(!expired.is_valid_at(now));
        assert!(valid.is_valid_at(now));
        assert!(!exact.is_valid_at(now));
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache = TtlCache::new("test", Duration::minutes(5), 10);
        let now = epoch();
        cache.insert("a", 1, now);

        assert_eq!(cache.get("a", now + Duration::minutes(4)).map(|e| e.value), Some(1));
        assert!(cache.get("a", now + Duration::minutes(5)).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn evicts_expired_before_least_recently_used() {
        let cache = TtlCache::new("test", Duration::minutes(5), 2);
        let now = epoch();
        cache.insert_entry("stale", CacheEntry::new(0, now - Duration::seconds(1)), now);
        cache.insert("fresh", 1, now);
        cache.insert("newer", 2, now);

        assert!(cache.get("fresh", now).is_some());
        assert!(cache.get("newer", now).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn evicts_least_recently_used_when_full() {
        let cache = TtlCache::new("test", Duration::minutes(5), 2);
        let now = epoch();
        cache.insert("a", 1, now);
        cache.insert("b", 2, now);
        assert!(cache.get("a", now).is_some());
        cache.insert("c", 3, now);

        assert!(cache.get("a", now).is_some());
        assert!(cache.get("b", now).is_none());
        assert!(cache.get("c", now).is_some());
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let cache = TtlCache::new("test", Duration::seconds(i64::MAX / 1_000), 2);
        let now = epoch();
        let entry = cache.insert("a", 1, now);

        assert_eq!(entry.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(cache.get("a", now).is_some());
    }

    #[test]
    fn eviction_order_follows_reads_across_many_inserts() {
        let cache = TtlCache::new("test", Duration::minutes(5), 3);
        let now = epoch();
        for key in ["a", "b", "c"] {
            cache.insert(key, 0, now);
        }
        assert!(cache.get("a", now).is_some());
        cache.insert("d", 0, now);
        assert!(cache.get("b", now).is_none());
        assert!(cache.get("c", now).is_some());
        cache.insert("e", 0, now);
        assert!(cache.get("a", now).is_none());
        assert_eq!(cache.len(), 3);

        cache.remove("e");
        cache.insert("f", 0, now);
        assert!(cache.get("c", now).is_some());
        assert!(cache.get("d", now).is_some());
    }

    #[test]
    fn replacing_a_key_does_not_evict() {
        let cache = TtlCache::new("test", Duration::minutes(5), 2);
        let now = epoch();
        cache.insert("a", 1, now);
        cache.insert("b", 2, now);
        cache.insert("a", 10, now);

        assert_eq!(cache.get("a", now).map(|e| e.value), Some(10));
        assert_eq!(cache.get("b", now).map(|e| e.value), Some(2));
    }
}
