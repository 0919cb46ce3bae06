//! # Role Guard
//!
//! This crate provides hierarchical, priority-based authorization for guarded
//! operations. Every role carries a numeric priority where lower means more
//! senior. A caller may invoke an operation only if their most senior role is
//! at least as senior as the role the operation requires, and none of their
//! roles is on the operation's block-list.
//!
//! ## Features
//!
//! - Process-wide role directory cache with explicit invalidation and optional TTL
//! - Single-flight refresh: concurrent misses trigger one directory fetch
//! - Pure, deterministic decision engine with typed denial reasons
//! - Explicit requirement declarations with concrete-over-base resolution
//! - Explicit caller context instead of ambient thread-local state
//! - Integration with any authentication system via [`AuthenticationContext`]
//! - Async guard with bounded directory fetches (`async` feature)
//! - JSON file (`persistence`) and PostgreSQL (`database`) role directories
//!
//! ## Quick Start
//!
//! ```rust
//! use role_guard::{
//!     ContextAuthenticator, Guard, MemoryDirectory, Requirement, RoleDirectoryCache,
//!     SessionContext,
//! };
//! use std::sync::Arc;
//!
//! // Role directory: lower priority = more senior
//! let directory = MemoryDirectory::with_roles([("ADMIN", 0), ("EDITOR", 5), ("VIEWER", 10)]);
//!
//! // One cache per process, shared by every guard
//! let cache = Arc::new(RoleDirectoryCache::new(directory));
//! let guard = Guard::new(cache, ContextAuthenticator::<SessionContext>::new());
//!
//! let caller = SessionContext::active("alice", ["EDITOR"]);
//!
//! // EDITOR outranks VIEWER
//! let report = guard.invoke(&Requirement::new("VIEWER"), Some(&caller), || "report")?;
//! assert_eq!(report, "report");
//!
//! // ...but not ADMIN
//! let denied = guard.invoke(&Requirement::new("ADMIN"), Some(&caller), || "settings");
//! assert!(denied.unwrap_err().is_forbidden());
//! # Ok::<(), role_guard::Error>(())
//! ```
//!
//! ## Block-lists
//!
//! A requirement can block roles regardless of seniority. By default an entry
//! blocks every caller role that *contains* it, so `"VIE"` blocks `"VIEWER"`.
//! Set [`BlockListMatching::Exact`] in [`GuardConfig`] to match whole
//! identifiers only.
//!
//! ## Logging
//!
//! When the `audit` feature is enabled, the guard logs cache refreshes,
//! stage transitions and denials using the standard Rust logging framework:
//!
//! ```rust
//! use role_guard::init_audit_logger;
//!
//! // Initialize logging (must be called early in program execution)
//! init_audit_logger();
//!
//! // Configure log level through RUST_LOG environment variable:
//! // RUST_LOG=info,role_guard=debug
//! ```

#[cfg(feature = "audit")]
pub fn init_audit_logger() {
    env_logger::init();
}

/// No-op when the `audit` feature is disabled.
#[cfg(not(feature = "audit"))]
pub fn init_audit_logger() {}

pub mod auth_context;
pub mod cache;
pub mod config;
pub mod decision;
pub mod directory;
pub mod error;
pub mod guard;
pub mod macros;
pub mod metrics;
pub mod requirement;
pub mod resolver;
pub mod role;

#[cfg(feature = "async")]
pub mod async_support;

#[cfg(feature = "database")]
pub mod database;

// Re-export main types for convenience
pub use crate::{
    auth_context::{
        AuthenticationContext, Authenticator, CallerRoles, ContextAuthenticator, JwtContext,
        SessionContext,
    },
    cache::{CacheInvalidation, CacheStats, DirectorySnapshot, RoleDirectoryCache},
    config::{GuardConfig, GuardConfigBuilder},
    decision::{BlockListMatching, Decision, DenialReason, decide, decide_with},
    directory::{MemoryDirectory, RoleDirectory},
    error::Error,
    guard::{Evaluation, Guard, GuardedOperation, Stage},
    metrics::GuardMetrics,
    requirement::{OperationId, Requirement, RequirementRegistry},
    resolver::resolve_min_priority,
    role::{Priority, Rank, Role},
};

#[cfg(feature = "persistence")]
pub use crate::directory::FileDirectory;

#[cfg(feature = "async")]
pub use crate::async_support::{AsyncDirectoryCache, AsyncGuard, AsyncRoleDirectory};

#[cfg(feature = "database")]
pub use crate::database::DatabaseDirectory;
