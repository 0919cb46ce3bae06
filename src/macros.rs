//! Convenience macros for declaring requirements and directories.

/// Macro for declaring a requirement with an optional block-list.
///
/// # Examples
///
/// ```rust
/// use role_guard::requirement;
///
/// let plain = requirement!("VIEWER");
/// assert!(plain.blocked_roles().is_empty());
///
/// let guarded = requirement!("EDITOR", blocked: ["GUEST", "BOT"]);
/// assert_eq!(guarded.required_role(), "EDITOR");
/// assert_eq!(guarded.blocked_roles().len(), 2);
/// ```
#[macro_export]
macro_rules! requirement {
    ($role:expr) => {
        $crate::requirement::Requirement::new($role)
    };
    ($role:expr, blocked: [$($blocked:expr),* $(,)?]) => {
        $crate::requirement::Requirement::new($role)
            $(.block($blocked))*
    };
}

/// Macro for building an in-memory directory with a clean syntax.
///
/// # Examples
///
/// ```rust
/// use role_guard::role_directory;
///
/// let directory = role_directory![
///     "ADMIN" => 0,
///     "EDITOR" => 5,
///     "VIEWER" => 10,
/// ];
/// assert_eq!(directory.role_count(), 3);
/// ```
#[macro_export]
macro_rules! role_directory {
    ($($name:expr => $priority:expr),* $(,)?) => {
        {
            let directory = $crate::directory::MemoryDirectory::new();
            $(
                directory.upsert($crate::role::Role::new(
                    $name,
                    $crate::role::Priority::from($priority),
                ));
            )*
            directory
        }
    };
}
