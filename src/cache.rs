//! Process-wide cache of the role directory.
//!
//! The cache holds a single slot: the full role set as of the last fetch. A
//! snapshot is immutable once built and shared behind an `Arc`, so readers
//! always see either the previous snapshot or the next one, never a mix.
//!
//! # Refresh discipline
//!
//! At most one fetch runs at a time. Callers that miss while a fetch is in
//! flight wait on the refresh lock and then re-check the slot, so a burst of
//! misses produces exactly one directory query per generation.
//!
//! Invalidation bumps an epoch counter and clears the slot. A fetch that was
//! already in flight when the epoch changed still answers its own caller, but
//! its result is not installed, so the next load queries the directory again.

#[cfg(feature = "audit")]
use log::{debug, info, warn};

use crate::{
    config::GuardConfig,
    directory::RoleDirectory,
    error::{Error, Result},
    metrics::GuardMetrics,
    role::{Priority, Role},
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Immutable view of the directory at one point in time.
#[derive(Debug, Clone)]
pub struct DirectorySnapshot {
    roles: HashMap<String, Priority>,
    generation: u64,
    fetched_at: DateTime<Utc>,
    // Monotonic, so clock steps cannot extend a snapshot's lifetime.
    loaded_at: Instant,
}

impl DirectorySnapshot {
    /// Build a snapshot from fetched roles.
    ///
    /// Each identifier maps to exactly one priority. If the directory reports
    /// the same identifier twice, the first occurrence wins.
    pub fn from_roles(roles: impl IntoIterator<Item = Role>, generation: u64) -> Self {
        let mut map = HashMap::new();
        for role in roles {
            match map.entry(role.name().to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(role.priority());
                }
                #[cfg_attr(not(feature = "audit"), allow(unused_variables))]
                Entry::Occupied(existing) => {
                    #[cfg(feature = "audit")]
                    warn!(
                        "Duplicate role '{}' in directory (priority {} ignored, keeping {})",
                        role.name(),
                        role.priority(),
                        existing.get()
                    );
                }
            }
        }

        Self {
            roles: map,
            generation,
            fetched_at: Utc::now(),
            loaded_at: Instant::now(),
        }
    }

    /// Look up the priority of a role identifier.
    pub fn priority_of(&self, name: &str) -> Option<Priority> {
        self.roles.get(name).copied()
    }

    /// Returns true if the directory knows `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.roles.contains_key(name)
    }

    /// All roles in the snapshot, most senior first.
    pub fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self
            .roles
            .iter()
            .map(|(name, priority)| Role::new(name.clone(), *priority))
            .collect();
        roles.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.name().cmp(b.name()))
        });
        roles
    }

    /// Number of roles in the snapshot.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns true if the snapshot holds no roles.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Generation number of this snapshot. Increases with every fetch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wall-clock time the snapshot was fetched, for reporting.
    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Time elapsed since the snapshot was fetched, on the monotonic clock.
    pub fn age(&self) -> Duration {
        self.loaded_at.elapsed()
    }

    /// Check if the snapshot is older than `ttl`. A `None` TTL never expires.
    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.age() >= ttl)
    }

    #[cfg(test)]
    pub(crate) fn backdated(&self, by: Duration) -> Self {
        let mut aged = self.clone();
        aged.loaded_at = self
            .loaded_at
            .checked_sub(by)
            .expect("monotonic clock too close to its origin");
        aged
    }
}

/// Lazily refreshed, single-slot cache over a [`RoleDirectory`].
pub struct RoleDirectoryCache<D>
where
    D: RoleDirectory,
{
    directory: D,
    ttl: Option<Duration>,
    slot: RwLock<Option<Arc<DirectorySnapshot>>>,
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
    epoch: AtomicU64,
    metrics: GuardMetrics,
}

impl<D> RoleDirectoryCache<D>
where
    D: RoleDirectory,
{
    /// Create a cache whose snapshots live until invalidated.
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            ttl: None,
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            metrics: GuardMetrics::new(),
        }
    }

    /// Create a cache using the TTL from `config`.
    pub fn from_config(directory: D, config: &GuardConfig) -> Self {
        let mut cache = Self::new(directory);
        cache.ttl = config.cache_ttl();
        cache
    }

    /// Expire snapshots after `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Snapshot lifetime, `None` when snapshots live until invalidated.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Record cache activity into shared metrics.
    pub fn with_metrics(mut self, metrics: GuardMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Return the cached snapshot, fetching from the directory on a miss.
    ///
    /// Fails with [`Error::DirectoryUnavailable`] if a fetch is needed and the
    /// directory cannot be read. No stale snapshot is returned in that case.
    pub fn load_all_roles(&self) -> Result<Arc<DirectorySnapshot>> {
        if let Some(snapshot) = self.current() {
            return Ok(self.hit(snapshot));
        }

        let _flight = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // Another caller may have refreshed while we waited.
        if let Some(snapshot) = self.current() {
            return Ok(self.hit(snapshot));
        }

        self.metrics.record_cache_miss();
        self.refresh_locked()
    }

    /// Drop the cached snapshot so the next load queries the directory.
    pub fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = None;

        #[cfg(feature = "audit")]
        info!("Role directory cache invalidated");
    }

    /// Fetch a fresh snapshot now, replacing the cached one.
    pub fn refresh(&self) -> Result<Arc<DirectorySnapshot>> {
        let _flight = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.refresh_locked()
    }

    /// The cached snapshot, if any, without touching the directory.
    pub fn cached(&self) -> Option<Arc<DirectorySnapshot>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let cached = self.cached();
        CacheStats {
            generation: self.generation.load(Ordering::SeqCst),
            cached_roles: cached.as_ref().map(|s| s.len()),
            fetched_at: cached.as_ref().map(|s| s.fetched_at()),
            hits: self.metrics.cache_hits.load(Ordering::Relaxed),
            misses: self.metrics.cache_misses.load(Ordering::Relaxed),
            refreshes: self.metrics.cache_refreshes.load(Ordering::Relaxed),
        }
    }

    /// Metrics recorded by this cache.
    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }

    /// The wrapped directory.
    pub fn directory(&self) -> &D {
        &self.directory
    }

    // Private helper methods

    fn hit(&self, snapshot: Arc<DirectorySnapshot>) -> Arc<DirectorySnapshot> {
        self.metrics.record_cache_hit();
        #[cfg(feature = "audit")]
        debug!("Role directory cache hit (generation {})", snapshot.generation());
        snapshot
    }

    fn current(&self) -> Option<Arc<DirectorySnapshot>> {
        self.cached().filter(|snapshot| !snapshot.is_expired(self.ttl))
    }

    /// Caller must hold `refresh_lock`.
    fn refresh_locked(&self) -> Result<Arc<DirectorySnapshot>> {
        let epoch = self.epoch.load(Ordering::SeqCst);

        let roles = self.directory.fetch_all_roles().map_err(|e| {
            self.metrics.record_directory_failure();
            #[cfg(feature = "audit")]
            warn!("Role directory fetch failed: {e}");
            match e {
                Error::DirectoryUnavailable(_) => e,
                other => Error::DirectoryUnavailable(other.to_string()),
            }
        })?;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(DirectorySnapshot::from_roles(roles, generation));

        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::SeqCst) == epoch {
            *slot = Some(Arc::clone(&snapshot));
            self.metrics.record_cache_refresh();
            #[cfg(feature = "audit")]
            info!(
                "Role directory cache refreshed: {} roles (generation {generation})",
                snapshot.len()
            );
        }

        Ok(snapshot)
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, by: Duration) {
        let mut slot = self.slot.write().unwrap();
        if let Some(snapshot) = slot.as_ref() {
            *slot = Some(Arc::new(snapshot.backdated(by)));
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of snapshots fetched so far.
    pub generation: u64,
    /// Roles in the cached snapshot, `None` when the slot is empty.
    pub cached_roles: Option<usize>,
    /// When the cached snapshot was fetched.
    pub fetched_at: Option<DateTime<Utc>>,
    /// Loads served from the slot, including waiters that found a snapshot
    /// installed by a concurrent fetch.
    pub hits: u64,
    /// Loads that had to query the directory.
    pub misses: u64,
    /// Snapshots installed into the slot.
    pub refreshes: u64,
}

/// Trait for components that expose the directory invalidation hook.
pub trait CacheInvalidation {
    /// Invalidate the cached role directory.
    fn invalidate_roles(&self);
}

impl<D> CacheInvalidation for RoleDirectoryCache<D>
where
    D: RoleDirectory,
{
    fn invalidate_roles(&self) {
        self.invalidate();
    }
}
