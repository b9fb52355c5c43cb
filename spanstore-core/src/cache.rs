//! Time-bounded fact cache
//!
//! Both the dependency dedup window and the call-identity cache are maps
//! whose entries stop counting after a fixed retention. [`FactCache`] is the
//! capability both are consumed through; [`TimedCache`] implements it with a
//! mutex-guarded map and a pluggable [`Eviction`] strategy:
//!
//! - [`Eviction::OnAccess`]: expired entries are dropped when they are read
//!   or overwritten. No background work; suitable for low-cardinality keys.
//! - [`Eviction::Sweep`]: additionally runs a periodic reaper task between
//!   [`FactCache::start`] and [`FactCache::stop`], bounding memory for
//!   high-cardinality keys.
//!
//! Retention is measured against the cache's [`Clock`], independently of
//! any expiry the backing store applies to persisted records.

use crate::clock::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;

/// How expired entries are removed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eviction {
    OnAccess,
    Sweep { interval: Duration },
}

/// A map whose entries expire a fixed time after they were written
pub trait FactCache<K, V>: Debug + Send + Sync {
    /// Live value for `key`, if any
    fn get(&self, key: &K) -> Option<V>;

    /// Insert or overwrite, restarting the entry's retention
    fn insert(&self, key: K, value: V);

    /// Insert only if no live entry exists. Returns the new entry's write
    /// time, which identifies this claim to [`release`](Self::release).
    fn insert_if_absent(&self, key: K, value: V) -> Option<SystemTime>;

    /// Remove `key` only if its entry is still the one written at
    /// `claimed_at`. Returns `true` if removed.
    fn release(&self, key: &K, claimed_at: SystemTime) -> bool;

    /// Drop every expired entry, returning how many were removed
    fn purge_expired(&self) -> usize;

    /// Number of stored entries, including expired ones not yet purged
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start background eviction, if the strategy has any. Idempotent.
    fn start(&self);

    /// Stop background eviction. Idempotent.
    fn stop(&self);
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    written_at: SystemTime,
}

#[derive(Debug)]
struct Inner<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash,
{
    fn is_expired(&self, entry: &Entry<V>, now: SystemTime) -> bool {
        // A clock stepping backwards keeps the entry alive
        now.duration_since(entry.written_at)
            .map(|age| age >= self.retention)
            .unwrap_or(false)
    }

    fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| {
            now.duration_since(e.written_at)
                .map(|age| age < self.retention)
                .unwrap_or(true)
        });
        before - entries.len()
    }
}

/// Mutex-guarded [`FactCache`] with fixed retention
pub struct TimedCache<K, V> {
    name: &'static str,
    inner: Arc<Inner<K, V>>,
    eviction: Eviction,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> Debug for TimedCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedCache")
            .field("name", &self.name)
            .field("entry_count", &self.inner.entries.lock().len())
            .field("retention", &self.inner.retention)
            .field("eviction", &self.eviction)
            .field("sweeping", &self.sweeper.lock().is_some())
            .finish()
    }
}

impl<K, V> TimedCache<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Clone + Send + 'static,
{
    /// `name` identifies the cache in logs
    pub fn new(
        name: &'static str,
        retention: Duration,
        eviction: Eviction,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                retention,
                clock,
            }),
            eviction,
            sweeper: Mutex::new(None),
        }
    }

    pub fn is_sweeping(&self) -> bool {
        self.sweeper.lock().is_some()
    }
}

impl<K, V> FactCache<K, V> for TimedCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();
        let entry = entries.get(key)?;
        if self.inner.is_expired(entry, now) {
            entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    fn insert(&self, key: K, value: V) {
        let written_at = self.inner.clock.now();
        self.inner
            .entries
            .lock()
            .insert(key, Entry { value, written_at });
    }

    fn insert_if_absent(&self, key: K, value: V) -> Option<SystemTime> {
        let now = self.inner.clock.now();
        let mut entries = self.inner.entries.lock();
        if let Some(entry) = entries.get(&key) {
            if !self.inner.is_expired(entry, now) {
                return None;
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                written_at: now,
            },
        );
        Some(now)
    }

    fn release(&self, key: &K, claimed_at: SystemTime) -> bool {
        let mut entries = self.inner.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.written_at == claimed_at => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    fn purge_expired(&self) -> usize {
        self.inner.purge_expired()
    }

    fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    fn start(&self) {
        let Eviction::Sweep { interval } = self.eviction else {
            return;
        };
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return;
        }

        let inner = Arc::clone(&self.inner);
        let name = self.name;
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let evicted = inner.purge_expired();
                if evicted > 0 {
                    tracing::debug!(cache = name, count = evicted, "Swept expired cache entries");
                }
            }
        }));
        tracing::debug!(cache = name, ?interval, "Started cache sweeper");
    }

    fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            tracing::debug!(cache = self.name, "Stopped cache sweeper");
        }
    }
}

impl<K, V> Drop for TimedCache<K, V> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}
