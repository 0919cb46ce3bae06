//! Authorization requirements declared by guarded operations.
//!
//! Each guarded operation carries exactly one [`Requirement`]. Requirements
//! can be attached directly to a wrapper or declared in a
//! [`RequirementRegistry`], where an operation declared on a base (an
//! interface or trait) can be overridden by the concrete type that implements
//! it. Registry lookups happen when an operation is registered, never per call.

use crate::error::{Error, Result};
use dashmap::{DashMap, mapref::entry::Entry};
use std::collections::HashSet;
use std::fmt;

/// Required role plus block-list for a guarded operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct Requirement {
    required_role: String,
    blocked_roles: Vec<String>,
}

impl Requirement {
    /// Require `required_role` (or anything more senior) with an empty block-list.
    pub fn new(required_role: impl Into<String>) -> Self {
        Self {
            required_role: required_role.into(),
            blocked_roles: Vec::new(),
        }
    }

    /// Add an entry to the block-list.
    pub fn block(mut self, entry: impl Into<String>) -> Self {
        self.blocked_roles.push(entry.into());
        self
    }

    /// Add several entries to the block-list, keeping their order.
    pub fn block_all<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_roles.extend(entries.into_iter().map(Into::into));
        self
    }

    /// The role identifier the caller must match or outrank.
    pub fn required_role(&self) -> &str {
        &self.required_role
    }

    /// Blocked role entries, in declaration order.
    pub fn blocked_roles(&self) -> &[String] {
        &self.blocked_roles
    }

    /// Reject declarations that can never be evaluated meaningfully.
    ///
    /// An empty block-list entry would be contained in every role identifier
    /// and so block every caller.
    pub fn validate(&self) -> Result<()> {
        if self.required_role.trim().is_empty() {
            return Err(Error::InvalidConfiguration(
                "required role must not be empty".to_string(),
            ));
        }
        if self.blocked_roles.iter().any(|entry| entry.is_empty()) {
            return Err(Error::InvalidConfiguration(format!(
                "empty block-list entry in requirement for '{}'",
                self.required_role
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requires '{}'", self.required_role)?;
        if !self.blocked_roles.is_empty() {
            write!(f, ", blocks [{}]", self.blocked_roles.join(", "))?;
        }
        Ok(())
    }
}

/// Identifies an operation declared on a type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationId {
    owner: String,
    operation: String,
}

impl OperationId {
    /// Create an identifier for `operation` declared on `owner`.
    pub fn new(owner: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            operation: operation.into(),
        }
    }

    /// The declaring type.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The operation name.
    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.owner, self.operation)
    }
}

/// Declarations of requirements by owner type, with base-type fallback.
///
/// # Examples
///
/// ```rust
/// use role_guard::requirement::{Requirement, RequirementRegistry};
///
/// let registry = RequirementRegistry::new();
/// registry.declare("DocumentService", "publish", Requirement::new("EDITOR"))?;
/// registry.declare("AuditedDocuments", "publish", Requirement::new("ADMIN"))?;
/// registry.extends("AuditedDocuments", "DocumentService");
/// registry.extends("PlainDocuments", "DocumentService");
///
/// assert_eq!(registry.resolve("AuditedDocuments", "publish")?.required_role(), "ADMIN");
/// assert_eq!(registry.resolve("PlainDocuments", "publish")?.required_role(), "EDITOR");
/// # Ok::<(), role_guard::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct RequirementRegistry {
    declarations: DashMap<OperationId, Requirement>,
    // concrete -> bases, in declaration order
    bases: DashMap<String, Vec<String>>,
}

impl RequirementRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the requirement of `operation` on `owner`.
    pub fn declare(
        &self,
        owner: impl Into<String>,
        operation: impl Into<String>,
        requirement: Requirement,
    ) -> Result<()> {
        requirement.validate()?;
        let id = OperationId::new(owner, operation);

        match self.declarations.entry(id) {
            Entry::Occupied(existing) => Err(Error::InvalidConfiguration(format!(
                "requirement for '{}' is already declared",
                existing.key()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(requirement);
                Ok(())
            }
        }
    }

    /// Record that `concrete` implements or derives from `base`.
    pub fn extends(&self, concrete: impl Into<String>, base: impl Into<String>) {
        let base = base.into();
        let mut bases = self.bases.entry(concrete.into()).or_default();
        if !bases.contains(&base) {
            bases.push(base);
        }
    }

    /// Resolve the effective requirement of `operation` invoked on `owner`.
    ///
    /// The declaration on `owner` itself wins. Otherwise bases are searched
    /// depth-first in the order they were recorded.
    pub fn resolve(&self, owner: &str, operation: &str) -> Result<Requirement> {
        let mut visited = HashSet::new();
        self.resolve_recursive(owner, operation, &mut visited)
            .ok_or_else(|| {
                Error::MissingRequirement(OperationId::new(owner, operation).to_string())
            })
    }

    /// Number of declared requirements.
    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    /// Returns true if nothing has been declared.
    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    fn resolve_recursive(
        &self,
        owner: &str,
        operation: &str,
        visited: &mut HashSet<String>,
    ) -> Option<Requirement> {
        if !visited.insert(owner.to_string()) {
            return None;
        }

        if let Some(requirement) = self.declarations.get(&OperationId::new(owner, operation)) {
            return Some(requirement.clone());
        }

        let bases = self.bases.get(owner).map(|b| b.clone()).unwrap_or_default();
        bases
            .iter()
            .find_map(|base| self.resolve_recursive(base, operation, visited))
    }
}
