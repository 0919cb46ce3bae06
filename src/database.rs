//! PostgreSQL role directory (requires 'database' feature).

use crate::{
    async_support::AsyncRoleDirectory,
    error::{Error, Result},
    role::Role,
};
use async_trait::async_trait;
use sqlx::{PgPool, Row};

/// Role directory reading `name` / `priority` pairs from a PostgreSQL table.
///
/// The table is `<prefix>roles` with `name` as primary key, so each identifier
/// maps to exactly one priority.
pub struct DatabaseDirectory {
    pool: PgPool,
    table_prefix: String,
}

impl DatabaseDirectory {
    /// Connect to `database_url` and make sure the roles table exists.
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::new_with_prefix(database_url, "rbac_".to_string()).await
    }

    /// Connect with a custom table prefix.
    pub async fn new_with_prefix(database_url: &str, table_prefix: String) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("Database connection failed: {e}")))?;

        Self::from_pool(pool, table_prefix).await
    }

    /// Use an existing connection pool.
    pub async fn from_pool(pool: PgPool, table_prefix: String) -> Result<Self> {
        let directory = Self { pool, table_prefix };
        directory.initialize_schema().await?;
        Ok(directory)
    }

    /// Insert or update a role's priority. Intended for seeding and tests.
    pub async fn store_role(&self, role: &Role) -> Result<()> {
        let query = format!(
            r#"
            INSERT INTO {} (name, priority, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (name) DO UPDATE SET
                priority = EXCLUDED.priority,
                updated_at = NOW()
            "#,
            self.roles_table()
        );

        sqlx::query(&query)
            .bind(role.name())
            .bind(role.priority().value())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("Failed to store role: {e}")))?;

        Ok(())
    }

    async fn initialize_schema(&self) -> Result<()> {
        let create_roles = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                name VARCHAR(255) PRIMARY KEY,
                priority BIGINT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
            "#,
            self.roles_table()
        );

        sqlx::query(&create_roles)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::DirectoryUnavailable(format!("Failed to create roles table: {e}"))
            })?;

        Ok(())
    }

    fn roles_table(&self) -> String {
        roles_table_name(&self.table_prefix)
    }
}

fn roles_table_name(prefix: &str) -> String {
    format!("{prefix}roles")
}

#[async_trait]
impl AsyncRoleDirectory for DatabaseDirectory {
    async fn fetch_all_roles(&self) -> Result<Vec<Role>> {
        let query = format!("SELECT name, priority FROM {}", self.roles_table());

        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::DirectoryUnavailable(format!("Failed to load roles: {e}")))?;

        rows.iter()
            .map(|row| {
                let name: String = row
                    .try_get("name")
                    .map_err(|e| Error::DirectoryUnavailable(format!("Bad role row: {e}")))?;
                let priority: i64 = row
                    .try_get("priority")
                    .map_err(|e| Error::DirectoryUnavailable(format!("Bad role row: {e}")))?;
                Ok(Role::new(name, priority))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_table_name() {
        assert_eq!(roles_table_name("rbac_"), "rbac_roles");
        assert_eq!(roles_table_name(""), "roles");
    }
}
