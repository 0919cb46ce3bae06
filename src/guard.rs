//! The interception layer.
//!
//! A [`Guard`] sits in front of guarded operations. Every invocation walks the
//! same stages:
//!
//! ```text
//! NotStarted -> RequirementExtracted -> RolesExtracted -> Decided -> Proceeded
//!                                                                 \-> Rejected
//! ```
//!
//! The operation body runs only after an `Allow` decision. Missing identity,
//! an unreachable directory or a denial all abort the invocation before the
//! body is touched, and each surfaces as its own [`Error`] variant so callers
//! can tell a rejection from a system failure.
//!
//! # Composition
//!
//! There is no implicit weaving. Either call [`Guard::invoke`] at the call
//! site, or wrap the operation once in a [`GuardedOperation`] and call it
//! through the guard:
//!
//! ```rust
//! use role_guard::{
//!     ContextAuthenticator, Guard, GuardedOperation, MemoryDirectory, Requirement,
//!     RoleDirectoryCache, SessionContext,
//! };
//! use std::sync::Arc;
//!
//! let directory = MemoryDirectory::with_roles([("ADMIN", 0), ("EDITOR", 5), ("VIEWER", 10)]);
//! let cache = Arc::new(RoleDirectoryCache::new(directory));
//! let guard = Guard::new(cache, ContextAuthenticator::<SessionContext>::new());
//!
//! let publish = GuardedOperation::new("publish", Requirement::new("EDITOR"), |title: &str| {
//!     format!("published {title}")
//! })?;
//!
//! let editor = SessionContext::active("alice", ["EDITOR"]);
//! assert_eq!(publish.call(&guard, Some(&editor), "draft")?, "published draft");
//!
//! let viewer = SessionContext::active("bob", ["VIEWER"]);
//! assert!(publish.call(&guard, Some(&viewer), "draft").unwrap_err().is_forbidden());
//! # Ok::<(), role_guard::Error>(())
//! ```

#[cfg(feature = "audit")]
use log::{debug, warn};

use crate::{
    auth_context::{Authenticator, CallerRoles},
    cache::{CacheInvalidation, DirectorySnapshot, RoleDirectoryCache},
    config::GuardConfig,
    decision::{Decision, decide_with},
    directory::RoleDirectory,
    error::{Error, Result},
    metrics::{CheckTimer, GuardMetrics},
    requirement::{Requirement, RequirementRegistry},
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Stages of a single guarded invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing has been evaluated yet.
    NotStarted,
    /// The operation's requirement is known.
    RequirementExtracted,
    /// The caller's roles are known.
    RolesExtracted,
    /// A decision has been rendered.
    Decided,
    /// The operation body ran.
    Proceeded,
    /// The invocation was rejected without running the body.
    Rejected,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::NotStarted => "NotStarted",
            Stage::RequirementExtracted => "RequirementExtracted",
            Stage::RolesExtracted => "RolesExtracted",
            Stage::Decided => "Decided",
            Stage::Proceeded => "Proceeded",
            Stage::Rejected => "Rejected",
        };
        f.write_str(name)
    }
}

/// Outcome of evaluating a requirement without running an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The caller the decision was made for.
    pub caller: CallerRoles,
    /// The rendered decision.
    pub decision: Decision,
    /// Generation of the directory snapshot the decision used.
    pub generation: u64,
}

/// Authorization guard wrapping guarded operations.
pub struct Guard<D, A>
where
    D: RoleDirectory,
    A: Authenticator,
{
    cache: Arc<RoleDirectoryCache<D>>,
    authenticator: A,
    config: GuardConfig,
    metrics: GuardMetrics,
}

impl<D, A> Guard<D, A>
where
    D: RoleDirectory,
    A: Authenticator,
{
    /// Create a guard with default configuration.
    ///
    /// The guard records into the cache's metrics, so one process-wide cache
    /// shared by several guards yields one set of counters.
    pub fn new(cache: Arc<RoleDirectoryCache<D>>, authenticator: A) -> Self {
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
    /// The cache's TTL must match `config`, and `fetch_timeout_ms` must be
    /// unset because blocking directory fetches cannot be bounded. Use
    /// [`Guard::from_config`] to build the cache from the same configuration.
    pub fn with_config(
        cache: Arc<RoleDirectoryCache<D>>,
        authenticator: A,
        config: GuardConfig,
    ) -> Result<Self> {
        config.validate()?;
        if config.fetch_timeout_ms.is_some() {
            return Err(Error::InvalidConfiguration(
                "fetch_timeout_ms is only supported by the async guard".to_string(),
            ));
        }
        ensure_cache_ttl(&config, cache.ttl())?;

        let mut guard = Self::new(cache, authenticator);
        guard.config = config;
        Ok(guard)
    }

    /// Create a guard and its directory cache from one configuration.
    pub fn from_config(directory: D, authenticator: A, config: GuardConfig) -> Result<Self> {
        let cache = Arc::new(RoleDirectoryCache::from_config(directory, &config));
        Self::with_config(cache, authenticator, config)
    }

    /// Evaluate `requirement` for the caller bound to `context`.
    ///
    /// Returns the decision rather than failing on denial. Fails with
    /// [`Error::Unauthenticated`] or [`Error::DirectoryUnavailable`] when no
    /// decision can be made.
    pub fn evaluate(
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

        let snapshot = self.cache.load_all_roles()?;

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
    pub fn authorize(
        &self,
        requirement: &Requirement,
        context: Option<&A::Context>,
    ) -> Result<()> {
        enforce(self.evaluate(requirement, context)?, requirement)
    }

    /// Run `operation` if the caller satisfies `requirement`.
    ///
    /// The operation's return value is passed through unchanged. On any
    /// failure the operation is never called.
    pub fn invoke<T, F>(
        &self,
        requirement: &Requirement,
        context: Option<&A::Context>,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce() -> T,
    {
        self.authorize(requirement, context)?;
        trace_stage(Stage::Proceeded, requirement);
        Ok(operation())
    }

    /// Wrap `operation` with the requirement resolved from `registry` for
    /// `operation_name` on `owner`.
    pub fn register<F>(
        &self,
        registry: &RequirementRegistry,
        owner: &str,
        operation_name: &str,
        operation: F,
    ) -> Result<GuardedOperation<F>> {
        GuardedOperation::from_registry(registry, owner, operation_name, operation)
    }

    /// Drop the cached role directory.
    pub fn invalidate_roles(&self) {
        self.cache.invalidate();
    }

    /// The shared directory cache.
    pub fn cache(&self) -> &Arc<RoleDirectoryCache<D>> {
        &self.cache
    }

    /// The guard's configuration.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Metrics recorded by this guard.
    pub fn metrics(&self) -> &GuardMetrics {
        &self.metrics
    }
}

#[cfg_attr(not(feature = "audit"), allow(unused_variables))]
pub(crate) fn trace_stage(stage: Stage, requirement: &Requirement) {
    #[cfg(feature = "audit")]
    debug!("Guard stage {stage} ({requirement})");
}

/// Record an invocation that never got a caller identity.
#[cfg_attr(not(feature = "audit"), allow(unused_variables))]
pub(crate) fn note_unauthenticated(
    error: &Error,
    requirement: &Requirement,
    config: &GuardConfig,
    metrics: &GuardMetrics,
) {
    if config.enable_metrics {
        metrics.record_unauthenticated();
    }
    trace_stage(Stage::Rejected, requirement);
    #[cfg(feature = "audit")]
    warn!("Guarded invocation rejected ({requirement}): {error}");
}

/// Turn an evaluation into the invocation outcome.
pub(crate) fn enforce(evaluation: Evaluation, requirement: &Requirement) -> Result<()> {
    match evaluation.decision {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            trace_stage(Stage::Rejected, requirement);
            #[cfg(feature = "audit")]
            warn!(
                "Access DENIED for caller '{}' ({requirement}): {reason}",
                evaluation.caller.caller_id()
            );
            Err(Error::Forbidden(reason))
        }
    }
}

/// Reject a configuration whose TTL disagrees with the cache it will use.
pub(crate) fn ensure_cache_ttl(config: &GuardConfig, cache_ttl: Option<Duration>) -> Result<()> {
    if config.cache_ttl() == cache_ttl {
        return Ok(());
    }
    Err(Error::InvalidConfiguration(format!(
        "cache_ttl_seconds {:?} does not match the directory cache TTL {:?}",
        config.cache_ttl_seconds, cache_ttl
    )))
}

/// Decide for an already authenticated caller and record the outcome.
pub(crate) fn render_decision(
    caller: CallerRoles,
    requirement: &Requirement,
    snapshot: &DirectorySnapshot,
    config: &GuardConfig,
    metrics: &GuardMetrics,
) -> Evaluation {
    let decision = decide_with(
        caller.roles(),
        requirement,
        snapshot,
        config.block_list_matching,
    );

    if config.enable_metrics {
        match &decision {
            Decision::Allow => metrics.record_allowed(),
            Decision::Deny(reason) => metrics.record_denied(reason),
        }
    }

    Evaluation {
        caller,
        decision,
        generation: snapshot.generation(),
    }
}

impl<D, A> CacheInvalidation for Guard<D, A>
where
    D: RoleDirectory,
    A: Authenticator,
{
    fn invalidate_roles(&self) {
        self.cache.invalidate();
    }
}

/// An operation bound to exactly one requirement.
///
/// The requirement is fixed when the wrapper is built; each call only
/// evaluates it.
#[derive(Debug, Clone)]
pub struct GuardedOperation<F> {
    name: String,
    requirement: Requirement,
    operation: F,
}

impl<F> GuardedOperation<F> {
    /// Wrap `operation` with an explicit requirement.
    pub fn new(name: impl Into<String>, requirement: Requirement, operation: F) -> Result<Self> {
        requirement.validate()?;
        Ok(Self {
            name: name.into(),
            requirement,
            operation,
        })
    }

    /// Wrap `operation` with the requirement `registry` resolves for
    /// `operation_name` invoked on `owner`, falling back to base declarations.
    pub fn from_registry(
        registry: &RequirementRegistry,
        owner: &str,
        operation_name: &str,
        operation: F,
    ) -> Result<Self> {
        let requirement = registry.resolve(owner, operation_name)?;
        Ok(Self {
            name: format!("{owner}::{operation_name}"),
            requirement,
            operation,
        })
    }

    /// Name of the operation.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The requirement checked on every call.
    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    /// Call the operation through `guard`.
    pub fn call<D, A, Args, R>(
        &self,
        guard: &Guard<D, A>,
        context: Option<&A::Context>,
        args: Args,
    ) -> Result<R>
    where
        D: RoleDirectory,
        A: Authenticator,
        F: Fn(Args) -> R,
    {
        guard.invoke(&self.requirement, context, || (self.operation)(args))
    }

    /// Call a one-shot operation through `guard`, consuming the wrapper.
    pub fn call_once<D, A, Args, R>(
        self,
        guard: &Guard<D, A>,
        context: Option<&A::Context>,
        args: Args,
    ) -> Result<R>
    where
        D: RoleDirectory,
        A: Authenticator,
        F: FnOnce(Args) -> R,
    {
        let Self {
            requirement,
            operation,
            ..
        } = self;
        guard.invoke(&requirement, context, || operation(args))
    }
}
