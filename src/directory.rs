//! Role directory collaborators that publish role priorities.

use crate::{
    error::Result,
    role::{Priority, Role},
};
use dashmap::DashMap;
use std::sync::Arc;

/// Source of truth for role priorities.
///
/// Implementations may fail with
/// [`Error::DirectoryUnavailable`](crate::Error::DirectoryUnavailable) when the
/// backing store cannot be reached. Retry policy, if any, belongs here and not
/// in the guard.
pub trait RoleDirectory: Send + Sync {
    /// Fetch every role currently known to the directory.
    fn fetch_all_roles(&self) -> Result<Vec<Role>>;
}

impl<D> RoleDirectory for Arc<D>
where
    D: RoleDirectory + ?Sized,
{
    fn fetch_all_roles(&self) -> Result<Vec<Role>> {
        (**self).fetch_all_roles()
    }
}

/// In-memory directory using DashMap for thread safety.
///
/// Clones share the same underlying table, so a handle kept by the role
/// management process sees the same data as the one handed to the cache.
#[derive(Debug, Default, Clone)]
pub struct MemoryDirectory {
    roles: Arc<DashMap<String, Priority>>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self {
            roles: Arc::new(DashMap::new()),
        }
    }

    /// Create a directory pre-populated with `(identifier, priority)` pairs.
    pub fn with_roles<I, N, P>(roles: I) -> Self
    where
        I: IntoIterator<Item = (N, P)>,
        N: Into<String>,
        P: Into<Priority>,
    {
        let directory = Self::new();
        for (name, priority) in roles {
            directory.upsert(Role::new(name, priority));
        }
        directory
    }

    /// Insert or replace a role.
    pub fn upsert(&self, role: Role) {
        self.roles.insert(role.name().to_string(), role.priority());
    }

    /// Remove a role, returning true if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.roles.remove(name).is_some()
    }

    /// Get the number of stored roles.
    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    /// Remove every role.
    pub fn clear(&self) {
        self.roles.clear();
    }
}

impl RoleDirectory for MemoryDirectory {
    fn fetch_all_roles(&self) -> Result<Vec<Role>> {
        Ok(self
            .roles
            .iter()
            .map(|entry| Role::new(entry.key().clone(), *entry.value()))
            .collect())
    }
}

/// File-based directory reading a JSON array of roles (requires persistence feature).
#[cfg(feature = "persistence")]
pub mod file_directory {
    use super::*;
    use crate::error::Error;
    use std::{
        fs::{File, OpenOptions},
        io::{BufReader, BufWriter},
        path::{Path, PathBuf},
    };

    /// Directory backed by a JSON file of the form
    /// `[{"name": "ADMIN", "priority": 0}, ...]`.
    ///
    /// The file is re-read on every fetch; pair it with a
    /// [`RoleDirectoryCache`](crate::cache::RoleDirectoryCache) to avoid that.
    #[derive(Debug, Clone)]
    pub struct FileDirectory {
        path: PathBuf,
    }

    impl FileDirectory {
        /// Create a directory reading from `path`. The file need not exist yet.
        pub fn new(path: impl AsRef<Path>) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
            }
        }

        /// Get the backing file path.
        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Replace the file contents with `roles`.
        pub fn save(&self, roles: &[Role]) -> Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::DirectoryUnavailable(format!("Failed to create directory: {e}"))
                })?;
            }

            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&self.path)
                .map_err(|e| {
                    Error::DirectoryUnavailable(format!("Failed to create role file: {e}"))
                })?;

            serde_json::to_writer_pretty(BufWriter::new(file), roles)?;
            Ok(())
        }
    }

    impl RoleDirectory for FileDirectory {
        fn fetch_all_roles(&self) -> Result<Vec<Role>> {
            let file = File::open(&self.path).map_err(|e| {
                Error::DirectoryUnavailable(format!(
                    "Failed to open role file '{}': {e}",
                    self.path.display()
                ))
            })?;

            let roles: Vec<Role> = serde_json::from_reader(BufReader::new(file))?;
            Ok(roles)
        }
    }
}

#[cfg(feature = "persistence")]
pub use file_directory::FileDirectory;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_directory() {
        let directory = MemoryDirectory::with_roles([("ADMIN", 0), ("EDITOR", 5)]);
        assert_eq!(directory.role_count(), 2);

        let mut roles = directory.fetch_all_roles().unwrap();
        roles.sort_by_key(|r| r.priority());
        assert_eq!(roles[0], Role::new("ADMIN", 0));
        assert_eq!(roles[1], Role::new("EDITOR", 5));

        directory.upsert(Role::new("EDITOR", 3));
        assert_eq!(directory.role_count(), 2);

        assert!(directory.remove("ADMIN"));
        assert!(!directory.remove("ADMIN"));
        assert_eq!(directory.fetch_all_roles().unwrap(), vec![Role::new("EDITOR", 3)]);
    }

    #[test]
    fn test_memory_directory_clones_share_state() {
        let directory = MemoryDirectory::new();
        let handle = directory.clone();

        handle.upsert(Role::new("VIEWER", 10));
        assert_eq!(directory.role_count(), 1);

        handle.clear();
        assert_eq!(directory.role_count(), 0);
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_file_directory() {
        let path = std::env::temp_dir().join("role_guard_test_directory.json");
        let _ = std::fs::remove_file(&path);

        let directory = FileDirectory::new(&path);
        assert!(matches!(
            directory.fetch_all_roles(),
            Err(crate::Error::DirectoryUnavailable(_))
        ));

        directory
            .save(&[Role::new("ADMIN", 0), Role::new("VIEWER", 10)])
            .unwrap();

        let roles = directory.fetch_all_roles().unwrap();
        assert_eq!(roles.len(), 2);
        assert_eq!(roles[1].name(), "VIEWER");

        let _ = std::fs::remove_file(&path);
    }
}
