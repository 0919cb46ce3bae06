//! Authentication context integration.
//!
//! The guard never reads an ambient "current user". Callers pass an explicit
//! context into every guarded invocation and an [`Authenticator`] turns it
//! into the [`CallerRoles`] the decision engine works with. This keeps the
//! role guard independent of any particular auth framework: JWT claims,
//! session records or custom tokens all work by implementing
//! [`AuthenticationContext`].

use crate::error::{Error, Result};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::marker::PhantomData;

/// A generic trait that any authentication system can implement.
pub trait AuthenticationContext: Send + Sync + Debug {
    /// Identifier of the authenticated caller.
    fn caller_id(&self) -> &str;

    /// Role identifiers granted to the caller.
    fn granted_roles(&self) -> Vec<String>;

    /// Check if this authentication context is valid
    /// (e.g., token not expired, session still active).
    fn is_valid(&self) -> bool;
}

/// The set of role identifiers granted to the caller of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerRoles {
    caller_id: String,
    roles: BTreeSet<String>,
}

impl CallerRoles {
    /// Create a caller role set.
    pub fn new<I, S>(caller_id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            caller_id: caller_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// Identifier of the caller.
    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    /// Granted role identifiers, in sorted order.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.iter().map(String::as_str)
    }

    /// Returns true if the caller was granted `role`.
    pub fn contains(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Number of granted roles.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns true if the caller has no roles.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

/// Supplies the caller's roles for the context of one invocation.
pub trait Authenticator: Send + Sync {
    /// The execution context this authenticator understands.
    type Context: ?Sized;

    /// Resolve the caller's roles, failing with [`Error::Unauthenticated`]
    /// when no context is bound or it carries no usable identity.
    fn current_caller_roles(&self, context: Option<&Self::Context>) -> Result<CallerRoles>;
}

/// Authenticator that reads roles straight from an [`AuthenticationContext`].
#[derive(Debug)]
pub struct ContextAuthenticator<C: ?Sized> {
    _context: PhantomData<fn(&C)>,
}

impl<C: ?Sized> ContextAuthenticator<C> {
    /// Create a new context authenticator.
    pub fn new() -> Self {
        Self {
            _context: PhantomData,
        }
    }
}

impl<C: ?Sized> Default for ContextAuthenticator<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> Clone for ContextAuthenticator<C> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<C> Authenticator for ContextAuthenticator<C>
where
    C: AuthenticationContext + ?Sized,
{
    type Context = C;

    fn current_caller_roles(&self, context: Option<&C>) -> Result<CallerRoles> {
        let context = context.ok_or_else(|| {
            Error::Unauthenticated("no authentication context bound to invocation".to_string())
        })?;

        if !context.is_valid() {
            return Err(Error::Unauthenticated(format!(
                "authentication context for '{}' is not valid",
                context.caller_id()
            )));
        }

        if context.caller_id().is_empty() {
            return Err(Error::Unauthenticated(
                "authentication context has no caller identity".to_string(),
            ));
        }

        Ok(CallerRoles::new(context.caller_id(), context.granted_roles()))
    }
}

/// JWT-based authentication context.
///
/// Roles are carried as scopes prefixed with `role:`, e.g. `role:EDITOR`.
/// Other scopes are kept but do not take part in role checks.
#[derive(Debug)]
pub struct JwtContext {
    /// The user ID extracted from the token
    user_id: String,
    /// Scopes granted by the token
    scopes: Vec<String>,
    /// Whether the token is valid
    valid: bool,
    /// Additional data from the token
    payload: HashMap<String, String>,
}

impl JwtContext {
    /// Prefix marking a scope as a role grant.
    pub const ROLE_SCOPE_PREFIX: &'static str = "role:";

    /// Create a new JWT context
    pub fn new(
        user_id: String,
        scopes: Vec<String>,
        valid: bool,
        payload: HashMap<String, String>,
    ) -> Self {
        Self {
            user_id,
            scopes,
            valid,
            payload,
        }
    }

    /// Get a claim from the token payload.
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.payload.get(name).map(String::as_str)
    }
}

impl AuthenticationContext for JwtContext {
    fn caller_id(&self) -> &str {
        &self.user_id
    }

    fn granted_roles(&self) -> Vec<String> {
        self.scopes
            .iter()
            .filter_map(|scope| scope.strip_prefix(Self::ROLE_SCOPE_PREFIX))
            .map(str::to_string)
            .collect()
    }

    fn is_valid(&self) -> bool {
        self.valid
    }
}

/// Session-based authentication context.
#[derive(Debug)]
pub struct SessionContext {
    /// The user ID from the session
    user_id: String,
    /// Roles assigned in the session
    roles: Vec<String>,
    /// Whether the session is active
    active: bool,
    /// Additional session data
    data: HashMap<String, String>,
}

impl SessionContext {
    /// Create a new session context
    pub fn new(
        user_id: String,
        roles: Vec<String>,
        active: bool,
        data: HashMap<String, String>,
    ) -> Self {
        Self {
            user_id,
            roles,
            active,
            data,
        }
    }

    /// Shorthand for an active session with no extra data.
    pub fn active<I, S>(user_id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            user_id.into(),
            roles.into_iter().map(Into::into).collect(),
            true,
            HashMap::new(),
        )
    }

    /// Get roles assigned in the session
    pub fn get_roles(&self) -> &[String] {
        &self.roles
    }

    /// Get a session attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.data.get(name).map(String::as_str)
    }
}

impl AuthenticationContext for SessionContext {
    fn caller_id(&self) -> &str {
        &self.user_id
    }

    fn granted_roles(&self) -> Vec<String> {
        self.roles.clone()
    }

    fn is_valid(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_context() {
        let mut payload = HashMap::new();
        payload.insert("iss".to_string(), "auth-system".to_string());

        let context = JwtContext::new(
            "user123".to_string(),
            vec![
                "role:EDITOR".to_string(),
                "read:users".to_string(),
                "role:VIEWER".to_string(),
            ],
            true,
            payload,
        );

        assert_eq!(context.caller_id(), "user123");
        assert_eq!(context.granted_roles(), vec!["EDITOR", "VIEWER"]);
        assert_eq!(context.claim("iss"), Some("auth-system"));
        assert!(context.is_valid());
    }

    #[test]
    fn test_session_context() {
        let context = SessionContext::active("user456", ["ADMIN", "EDITOR"]);

        assert_eq!(context.caller_id(), "user456");
        assert_eq!(context.get_roles().len(), 2);
        assert!(context.is_valid());
        assert_eq!(context.attribute("last_login"), None);
    }

    #[test]
    fn test_context_authenticator() {
        let authenticator = ContextAuthenticator::<SessionContext>::new();
        let context = SessionContext::active("alice", ["EDITOR", "EDITOR", "VIEWER"]);

        let roles = authenticator.current_caller_roles(Some(&context)).unwrap();
        assert_eq!(roles.caller_id(), "alice");
        assert_eq!(roles.len(), 2);
        assert!(roles.contains("EDITOR"));
        assert_eq!(roles.roles().collect::<Vec<_>>(), vec!["EDITOR", "VIEWER"]);
    }

    #[test]
    fn test_missing_or_invalid_context_is_unauthenticated() {
        let authenticator = ContextAuthenticator::<SessionContext>::new();

        assert!(matches!(
            authenticator.current_caller_roles(None),
            Err(Error::Unauthenticated(_))
        ));

        let expired = SessionContext::new("bob".to_string(), vec![], false, HashMap::new());
        assert!(matches!(
            authenticator.current_caller_roles(Some(&expired)),
            Err(Error::Unauthenticated(_))
        ));

        let anonymous = SessionContext::active("", ["VIEWER"]);
        assert!(matches!(
            authenticator.current_caller_roles(Some(&anonymous)),
            Err(Error::Unauthenticated(_))
        ));
    }

    #[test]
    fn test_dyn_context_authenticator() {
        let authenticator = ContextAuthenticator::<dyn AuthenticationContext>::new();
        let context: Box<dyn AuthenticationContext> =
            Box::new(SessionContext::active("carol", ["VIEWER"]));

        let roles = authenticator
            .current_caller_roles(Some(context.as_ref()))
            .unwrap();
        assert!(roles.contains("VIEWER"));
    }
}
