//! Resolution of a caller's most senior role.

use crate::{cache::DirectorySnapshot, role::Rank};

/// Compute the most senior rank among the caller's roles.
///
/// Identifiers the directory does not know are ignored. A caller with no known
/// role resolves to [`Rank::Unprivileged`], which is less senior than any real
/// priority.
pub fn resolve_min_priority<I, S>(caller_roles: I, directory: &DirectorySnapshot) -> Rank
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    caller_roles
        .into_iter()
        .filter_map(|role| directory.priority_of(role.as_ref()))
        .min()
        .map(Rank::Assigned)
        .unwrap_or(Rank::Unprivileged)
}
