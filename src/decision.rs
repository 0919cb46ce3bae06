//! Authorization decision engine.
//!
//! [`decide`] is a pure function over invocation-local data: the caller's role
//! identifiers, the operation's [`Requirement`] and a directory snapshot. It
//! performs no I/O and touches no shared state, so identical inputs always
//! produce identical decisions.
//!
//! Checks run in a fixed order and stop at the first denial:
//!
//! 1. block-list
//! 2. required role must exist in the directory (fail closed)
//! 3. caller's most senior priority must be at least as senior as the required role

use crate::{
    cache::DirectorySnapshot,
    requirement::Requirement,
    resolver::resolve_min_priority,
    role::{Priority, Rank},
};
use std::fmt;

/// The result of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The caller may proceed.
    Allow,
    /// The caller is rejected.
    Deny(DenialReason),
}

impl Decision {
    /// Returns true if the caller may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    /// Returns true if the caller was rejected.
    pub fn is_denied(&self) -> bool {
        !self.is_allowed()
    }

    /// Returns the denial reason if the caller was rejected.
    pub fn denial_reason(&self) -> Option<&DenialReason> {
        match self {
            Decision::Deny(reason) => Some(reason),
            Decision::Allow => None,
        }
    }
}

/// Why a caller was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// One of the caller's roles matched a block-list entry.
    Blocked {
        /// The caller role that matched.
        caller_role: String,
        /// The block-list entry it matched.
        blocked_entry: String,
    },
    /// The operation requires a role the directory does not know.
    UnknownRequiredRole {
        /// The unresolved role identifier.
        required_role: String,
    },
    /// The caller's most senior role is less senior than the required one.
    InsufficientPriority {
        /// The caller's resolved rank.
        caller: Rank,
        /// Priority of the required role.
        required: Priority,
    },
}

impl DenialReason {
    /// Short, stable name of the reason, suitable for metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            DenialReason::Blocked { .. } => "Blocked",
            DenialReason::UnknownRequiredRole { .. } => "UnknownRequiredRole",
            DenialReason::InsufficientPriority { .. } => "InsufficientPriority",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::Blocked {
                caller_role,
                blocked_entry,
            } => write!(f, "role '{caller_role}' is blocked by entry '{blocked_entry}'"),
            DenialReason::UnknownRequiredRole { required_role } => {
                write!(f, "required role '{required_role}' is not in the directory")
            }
            DenialReason::InsufficientPriority { caller, required } => write!(
                f,
                "caller priority {caller} is less senior than required priority {required}"
            ),
        }
    }
}

/// How block-list entries are matched against caller role identifiers.
///
/// `Substring` blocks a caller role that *contains* any entry, so the entry
/// `"VIE"` blocks `"VIEWER"` and `"PREVIEW"` alike. It is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockListMatching {
    /// Caller role contains the entry as a substring.
    #[default]
    Substring,
    /// Caller role equals the entry.
    Exact,
}

impl BlockListMatching {
    /// Returns true if `caller_role` is blocked by `entry`.
    pub fn matches(self, caller_role: &str, entry: &str) -> bool {
        match self {
            BlockListMatching::Substring => caller_role.contains(entry),
            BlockListMatching::Exact => caller_role == entry,
        }
    }
}

/// Decide whether a caller satisfies `requirement`, using substring block-list matching.
pub fn decide<I, S>(
    caller_roles: I,
    requirement: &Requirement,
    directory: &DirectorySnapshot,
) -> Decision
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    decide_with(
        caller_roles,
        requirement,
        directory,
        BlockListMatching::Substring,
    )
}

/// Decide whether a caller satisfies `requirement` with an explicit block-list rule.
pub fn decide_with<I, S>(
    caller_roles: I,
    requirement: &Requirement,
    directory: &DirectorySnapshot,
    matching: BlockListMatching,
) -> Decision
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let caller_roles: Vec<S> = caller_roles.into_iter().collect();

    if let Some(reason) = check_blocked(&caller_roles, requirement.blocked_roles(), matching) {
        return Decision::Deny(reason);
    }

    let Some(required) = directory.priority_of(requirement.required_role()) else {
        return Decision::Deny(DenialReason::UnknownRequiredRole {
            required_role: requirement.required_role().to_string(),
        });
    };

    let caller = resolve_min_priority(&caller_roles, directory);
    if caller.satisfies(required) {
        Decision::Allow
    } else {
        Decision::Deny(DenialReason::InsufficientPriority { caller, required })
    }
}

fn check_blocked<S: AsRef<str>>(
    caller_roles: &[S],
    blocked_roles: &[String],
    matching: BlockListMatching,
) -> Option<DenialReason> {
    if blocked_roles.is_empty() {
        return None;
    }

    caller_roles.iter().find_map(|role| {
        let role = role.as_ref();
        blocked_roles
            .iter()
            .find(|entry| matching.matches(role, entry))
            .map(|entry| DenialReason::Blocked {
                caller_role: role.to_string(),
                blocked_entry: entry.clone(),
            })
    })
}
