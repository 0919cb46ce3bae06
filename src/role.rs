//! Role definitions and seniority ranks.

use std::fmt;

/// Numeric seniority of a role. Lower values are more senior.
///
/// The range is unbounded in both directions and values need not be contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "persistence", serde(transparent))]
pub struct Priority(i64);

impl Priority {
    /// Create a priority from its raw value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Returns true if this priority is strictly more senior than `other`.
    pub fn outranks(self, other: Priority) -> bool {
        self.0 < other.0
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The resolved seniority of a caller.
///
/// `Unprivileged` is the sentinel for "no matching role found". Variant order
/// makes it compare greater (less senior) than every `Assigned` priority,
/// including `Priority::new(i64::MAX)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    /// The caller holds at least one role known to the directory.
    Assigned(Priority),
    /// The caller holds no role known to the directory.
    Unprivileged,
}

impl Rank {
    /// Returns the priority if the caller holds a known role.
    pub fn priority(self) -> Option<Priority> {
        match self {
            Rank::Assigned(priority) => Some(priority),
            Rank::Unprivileged => None,
        }
    }

    /// Returns true if this rank is the unprivileged sentinel.
    pub fn is_unprivileged(self) -> bool {
        matches!(self, Rank::Unprivileged)
    }

    /// Returns true if this rank satisfies a role requiring `required`.
    ///
    /// Equal priorities are equally senior and therefore satisfy each other.
    pub fn satisfies(self, required: Priority) -> bool {
        self <= Rank::Assigned(required)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rank::Assigned(priority) => write!(f, "{priority}"),
            Rank::Unprivileged => write!(f, "unprivileged"),
        }
    }
}

/// A named seniority level as published by the role directory.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct Role {
    /// Unique identifier of the role.
    name: String,
    /// Seniority of the role.
    priority: Priority,
}

impl Role {
    /// Create a new role with the given identifier and priority.
    pub fn new(name: impl Into<String>, priority: impl Into<Priority>) -> Self {
        Self {
            name: name.into(),
            priority: priority.into(),
        }
    }

    /// Get the role's identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the role's priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Returns a copy of this role with a different priority.
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }
}
