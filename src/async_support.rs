//! Async support for the role guard (requires 'async' feature).
//!
//! Mirrors the blocking [`RoleDirectoryCache`](crate::cache::RoleDirectoryCache)
//! and [`Guard`](crate::guard::Guard) for directories that must be queried
//! asynchronously. The refresh discipline is the same: one fetch in flight at
//! a time, waiters re-check the slot, invalidation during a fetch prevents
//! that fetch from being installed. An optional timeout bounds the directory
//! fetch only; the decision itself is computed synchronously.

#[cfg(feature = "audit")]
use log::{info, warn};

use crate::{
    auth_context::Authenticator,
    cache::DirectorySnapshot,
    config::GuardConfig,
    directory::MemoryDirectory,
    error::{Error, Result},
    guard::{
        Evaluation, Stage, enforce, ensure_cache_ttl, note_unauthenticated, render_decision,
        trace_stage,
    },
    metrics::{CheckTimer, GuardMetrics},
    requirement::Requirement,
    role::Role,
};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Async source of truth for role priorities.
#[async_trait]
pub trait AsyncRoleDirectory: Send + Sync {
    /// Fetch every role currently known to the directory.
    async fn fetch_all_roles(&self) -> Result<Vec<Role>>;
}

#[async_trait]
impl AsyncRoleDirectory for MemoryDirectory {
    async fn fetch_all_roles(&self) -> Result<Vec<Role>> {
        crate::directory::RoleDirectory::fetch_all_roles(self)
    }
}

#[async_trait]
impl<D> AsyncRoleDirectory for Arc<D>
where
    D: AsyncRoleDirectory + ?Sized,
{
    async fn fetch_all_roles(&self) -> Result<Vec<Role>> {
        (**self).fetch_all_roles().await
    }
}

/// Async, single-slot cache over an [`AsyncRoleDirectory`].
pub struct AsyncDirectoryCache<D>
where
    D: AsyncRoleDirectory,
{
    directory: D,
    ttl: Option<Duration>,
    fetch_timeout: Option<Duration>,
    slot: RwLock<Option<Arc<DirectorySnapshot>>>,
    refresh_lock: Mutex<()>,
    generation: AtomicU64,
    epoch: AtomicU64,
    metrics: GuardMetrics,
}

impl<D> AsyncDirectoryCache<D>
where
    D: AsyncRoleDirectory,
{
    /// Create a cache with no expiry and no fetch timeout.
    pub fn new(directory: D) -> Self {
        Self {
            directory,
            ttl: None,
            fetch_timeout: None,
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
            epoch: AtomicU64::new(0),
            metrics: GuardMetrics::new(),
        }
    }

    /// Create a cache using the TTL and fetch timeout from `config`.
    pub fn from_config(directory: D, config: &GuardConfig) -> Self {
        let mut cache = Self::new(directory);
        cache.ttl = config.cache_ttl();
        cache.fetch_timeout = config.fetch_timeout();
        cache
    }

    /// Expire snapshots after `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Fail fetches that take longer than `timeout`.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Record cache activity into shared metrics.
    pub fn with_metrics(mut self, metrics: GuardMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Return the cached snapshot, fetching from the directory on a miss.
    pub async fn load_all_roles(&self) -> Result<Arc<DirectorySnapshot>> {
        if let Some(snapshot) = self.current().await {
            self.metrics.record_cache_hit();
            return Ok(snapshot);
        }

        let _flight = self.refresh_lock.lock().await;

        if let Some(snapshot) = self.current().await {
            self.metrics.record_cache_hit();
            return Ok(snapshot);
        }

        self.metrics.record_cache_miss();
        self.refresh_locked().await
    }

    /// Drop the cached snapshot so the next load queries the directory.
    pub async fn invalidate(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *self.slot.write().await = None;

        #[cfg(feature = "audit")]
        info!("Async role directory cache invalidated");
    }

    /// Fetch a fresh snapshot now, replacing the cached one.
    pub async fn refresh(&self) -> Result<Arc<DirectorySnapshot>> {
        let _flight = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// The cached snapshot, if any, without touching the directory.
    pub async fn cached(&self) -> Option<Arc<DirectorySnapshot>> {
        self.slot.read().await.clone()
    }

    /// Snapshot lifetime, `None` when snapshots live until invalidated.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Upper bound on a single directory fetch.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout
    }

    /// Metrics recorded by this cache.
    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }

    /// The wrapped directory.
    pub fn directory(&self) -> &D {
        &self.directory
    }

    #[cfg(test)]
    async fn backdate(&self, by: Duration) {
        let mut slot = self.slot.write().await;
        if let Some(snapshot) = slot.as_ref() {
            *slot = Some(Arc::new(snapshot.backdated(by)));
        }
    }

    async fn current(&self) -> Option<Arc<DirectorySnapshot>> {
        self.cached()
            .await
            .filter(|snapshot| !snapshot.is_expired(self.ttl))
    }

    async fn fetch(&self) -> Result<Vec<Role>> {
        let fetch = self.directory.fetch_all_roles();
        match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
                Error::DirectoryUnavailable(format!("directory fetch timed out after {limit:?}"))
            })?,
            None => fetch.await,
        }
    }

    async fn refresh_locked(&self) -> Result<Arc<DirectorySnapshot>> {
        let epoch = self.epoch.load(Ordering::SeqCst);

        let roles = self.fetch().await.map_err(|e| {
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

        let mut slot = self.slot.write().await;
        if self.epoch.load(Ordering::SeqCst) == epoch {
            *slot = Some(Arc::clone(&snapshot));
            self.metrics.record_cache_refresh();
            #[cfg(feature = "audit")]
            info!(
                "Async role directory cache refreshed: {} roles (generation {generation})",
                snapshot.len()
            );
        }

        Ok(snapshot)
    }
}

/// Async authorization guard.
pub struct AsyncGuard<D, A>
where
    D: AsyncRoleDirectory,
    A: Authenticator,
{
    cache: Arc<AsyncDirectoryCache<D>>,
    authenticator: A,
    config: GuardConfig,
    metrics: GuardMetrics,
}

impl<D, A> AsyncGuard<D, A>
where
    D: AsyncRoleDirectory,
    A: Authenticator,
{
    /// Create a guard with default configuration.
    pub fn new(cache: Arc<AsyncDirectoryCache<D>>, authenticator: A) -> Self {
        let metrics = cache.metrics().clone();
        Self {
            cache,
            authenticator,
            config: GuardConfig::default(),
            metrics,
        }
    }

    /// Create a guard over a cache that is already shared with other guards.
    ///
    /// The cache's TTL and fetch timeout must match `config`. Use
    /// [`AsyncGuard::from_config`] to build the cache from the same
    /// configuration.
    pub fn with_config(
        cache: Arc<AsyncDirectoryCache<D>>,
        authenticator: A,
        config: GuardConfig,
    ) -> Result<Self> {
        config.validate()?;
        ensure_cache_ttl(&config, cache.ttl())?;
        if config.fetch_timeout() != cache.fetch_timeout() {
            return Err(Error::InvalidConfiguration(format!(
                "fetch_timeout_ms {:?} does not match the directory cache timeout {:?}",
                config.fetch_timeout_ms,
                cache.fetch_timeout()
            )));
        }

        let mut guard = Self::new(cache, authenticator);
        guard.config = config;
        Ok(guard)
    }

    /// Create a guard and its directory cache from one configuration.
    pub fn from_config(directory: D, authenticator: A, config: GuardConfig) -> Result<Self> {
        let cache = Arc::new(AsyncDirectoryCache::from_config(directory, &config));
        Self::with_config(cache, authenticator, config)
    }

    /// Evaluate `requirement` for the caller bound to `context`.
    pub async fn evaluate(
        &self,
        requirement: &Requirement,
        context: Option<&A::Context>,
    ) -> Result<Evaluation> {
        let _timer = self
            .config
            .enable_metrics
            .then(|| CheckTimer::start(&self.metrics));

        trace_stage(Stage::NotStarted, requirement);
        trace_stage(Stage::RequirementExtracted, requirement);

        let caller = self
            .authenticator
            .current_caller_roles(context)
            .inspect_err(|e| note_unauthenticated(e, requirement, &self.config, &self.metrics))?;
        trace_stage(Stage::RolesExtracted, requirement);

        let snapshot = self.cache.load_all_roles().await?;

        let evaluation = render_decision(
            caller,
            requirement,
            &snapshot,
            &self.config,
            &self.metrics,
        );
        trace_stage(Stage::Decided, requirement);
        Ok(evaluation)
    }

    /// Succeed if the caller may proceed, otherwise fail with [`Error::Forbidden`].
    pub async fn authorize(
        &self,
        requirement: &Requirement,
        context: Option<&A::Context>,
    ) -> Result<()> {
        enforce(self.evaluate(requirement, context).await?, requirement)
    }

    /// Run the future produced by `operation` if the caller satisfies `requirement`.
    ///
    /// `operation` is not called, and so no future is created, unless access
    /// is allowed.
    pub async fn invoke<T, F, Fut>(
        &self,
        requirement: &Requirement,
        context: Option<&A::Context>,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.authorize(requirement, context).await?;
        trace_stage(Stage::Proceeded, requirement);
        Ok(operation().await)
    }

    /// Drop the cached role directory.
    pub async fn invalidate_roles(&self) {
        self.cache.invalidate().await;
    }

    /// The shared directory cache.
    pub fn cache(&self) -> &Arc<AsyncDirectoryCache<D>> {
        &self.cache
    }

    /// Metrics recorded by this guard.
    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth_context::{ContextAuthenticator, SessionContext};
    use crate::config::GuardConfigBuilder;
    use crate::decision::DenialReason;
    use std::sync::atomic::AtomicUsize;

    struct SlowDirectory {
        delay: Duration,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl AsyncRoleDirectory for SlowDirectory {
        async fn fetch_all_roles(&self) -> Result<Vec<Role>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(vec![Role::new("ADMIN", 0), Role::new("VIEWER", 10)])
        }
    }

    fn slow(delay_ms: u64) -> SlowDirectory {
        SlowDirectory {
            delay: Duration::from_millis(delay_ms),
            fetches: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_async_guard_allows_and_denies() {
        let directory = MemoryDirectory::with_roles([("ADMIN", 0), ("EDITOR", 5), ("VIEWER", 10)]);
        let cache = Arc::new(AsyncDirectoryCache::new(directory));
        let guard = AsyncGuard::new(cache, ContextAuthenticator::<SessionContext>::new());
        let editor = SessionContext::active("alice", ["EDITOR"]);

        let value = guard
            .invoke(&Requirement::new("VIEWER"), Some(&editor), || async { 7 })
            .await
            .unwrap();
        assert_eq!(value, 7);

        let err = guard
            .invoke(&Requirement::new("ADMIN"), Some(&editor), || async { 7 })
            .await
            .unwrap_err();
        assert_eq!(
            err.denial_reason().map(DenialReason::kind),
            Some("InsufficientPriority")
        );
    }

    #[tokio::test]
    async fn test_check_duration_includes_directory_fetch() {
        let cache = Arc::new(AsyncDirectoryCache::new(slow(20)));
        let guard = AsyncGuard::new(cache, ContextAuthenticator::<SessionContext>::new());
        let viewer = SessionContext::active("bob", ["VIEWER"]);

        guard
            .authorize(&Requirement::new("VIEWER"), Some(&viewer))
            .await
            .unwrap();

        let durations = &guard.metrics().check_durations;
        assert_eq!(durations.len(), 1);
        assert!(durations.iter().all(|d| *d.value() >= Duration::from_millis(20)));
    }

    #[tokio::test]
    async fn test_async_unauthenticated() {
        let cache = Arc::new(AsyncDirectoryCache::new(MemoryDirectory::new()));
        let guard = AsyncGuard::new(cache, ContextAuthenticator::<SessionContext>::new());

        let err = guard
            .authorize(&Requirement::new("VIEWER"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_unavailable() {
        let cache =
            AsyncDirectoryCache::new(slow(200)).with_fetch_timeout(Duration::from_millis(10));

        let err = cache.load_all_roles().await.unwrap_err();
        assert!(matches!(err, Error::DirectoryUnavailable(_)));
        assert!(cache.cached().await.is_none());
        assert_eq!(cache.metrics().summary().directory_failures, 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_fetch_once() {
        let cache = Arc::new(AsyncDirectoryCache::new(slow(20)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.load_all_roles().await.unwrap().generation() })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), 1);
        }
        assert_eq!(cache.directory().fetches.load(Ordering::SeqCst), 1);

        let summary = cache.metrics().summary();
        assert_eq!(summary.cache_misses, 1);
        assert_eq!(summary.cache_hits, 7);
    }

    #[tokio::test]
    async fn test_invalidation_forces_refetch() {
        let directory = MemoryDirectory::with_roles([("EDITOR", 5)]);
        let cache = AsyncDirectoryCache::new(directory.clone());

        assert_eq!(cache.load_all_roles().await.unwrap().generation(), 1);
        directory.upsert(Role::new("EDITOR", 2));
        cache.invalidate().await;

        let snapshot = cache.load_all_roles().await.unwrap();
        assert_eq!(snapshot.generation(), 2);
        assert_eq!(snapshot.priority_of("EDITOR").map(|p| p.value()), Some(2));
    }

    #[tokio::test]
    async fn test_config_timeout_bounds_guard_fetch() {
        let config = GuardConfigBuilder::new().fetch_timeout_ms(10).build().unwrap();
        let guard = AsyncGuard::from_config(
            slow(200),
            ContextAuthenticator::<SessionContext>::new(),
            config,
        )
        .unwrap();
        let admin = SessionContext::active("root", ["ADMIN"]);

        assert_eq!(guard.cache().fetch_timeout(), Some(Duration::from_millis(10)));
        let err = guard
            .authorize(&Requirement::new("VIEWER"), Some(&admin))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DirectoryUnavailable(_)));
        assert_eq!(guard.metrics().summary().directory_failures, 1);
    }

    #[tokio::test]
    async fn test_config_ttl_expires_guard_snapshot() {
        let config = GuardConfigBuilder::new().cache_ttl_seconds(60).build().unwrap();
        let guard = AsyncGuard::from_config(
            slow(0),
            ContextAuthenticator::<SessionContext>::new(),
            config,
        )
        .unwrap();
        let admin = SessionContext::active("root", ["ADMIN"]);
        let requirement = Requirement::new("VIEWER");

        guard.authorize(&requirement, Some(&admin)).await.unwrap();
        guard.authorize(&requirement, Some(&admin)).await.unwrap();
        assert_eq!(guard.cache().directory().fetches.load(Ordering::SeqCst), 1);

        guard.cache().backdate(Duration::from_secs(61)).await;
        guard.authorize(&requirement, Some(&admin)).await.unwrap();
        assert_eq!(guard.cache().directory().fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_config_rejects_mismatched_cache() {
        let cache = Arc::new(AsyncDirectoryCache::new(MemoryDirectory::new()));
        let config = GuardConfigBuilder::new().fetch_timeout_ms(10).build().unwrap();

        let built =
            AsyncGuard::with_config(cache, ContextAuthenticator::<SessionContext>::new(), config);
        assert!(matches!(built, Err(Error::InvalidConfiguration(_))));
    }
}
