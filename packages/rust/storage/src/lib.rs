//! libSQL storage layer for the Repodex catalog.
//!
//! The [`Storage`] struct wraps a libSQL database holding the category tree,
//! the repository catalog, administrator accounts, and key/value settings.
//! The server process is the sole writer.

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use repodex_shared::{Admin, Category, ConfigEntry, RepodexError, Repository, Result};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    db: Database,
    conn: Connection,
}

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RepodexError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        RepodexError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Category operations
    // -----------------------------------------------------------------------

    /// Insert a new category and return it with its assigned id.
    pub async fn insert_category(
        &self,
        name: &str,
        parent_id: Option<i64>,
        level: i64,
    ) -> Result<Category> {
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO categories (name, parent_id, level, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![name, parent_id, level, now.to_rfc3339()],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        Ok(Category {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            parent_id,
            level,
            created_at: now,
        })
    }

    /// Get a category by id.
    pub async fn get_category(&self, id: i64) -> Result<Option<Category>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, parent_id, level, created_at FROM categories WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_category(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(RepodexError::Storage(e.to_string())),
        }
    }

    /// List all categories ordered by level, then name.
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, parent_id, level, created_at
                 FROM categories ORDER BY level, name",
                params![],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_category(&row)?);
        }
        Ok(results)
    }

    /// Update a category's name, parent, and level, cascading new levels to
    /// its descendants. All writes commit atomically or not at all.
    pub async fn update_category_tree(
        &self,
        id: i64,
        name: &str,
        parent_id: Option<i64>,
        level: i64,
        descendant_levels: &[(i64, i64)],
    ) -> Result<()> {
        // The cascade runs on its own connection so a write issued by
        // another task cannot join the open transaction.
        let conn = self
            .db
            .connect()
            .map_err(|e| RepodexError::Storage(e.to_string()))?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        tx.execute(
            "UPDATE categories SET name = ?1, parent_id = ?2, level = ?3 WHERE id = ?4",
            params![name, parent_id, level, id],
        )
        .await
        .map_err(|e| RepodexError::Storage(e.to_string()))?;

        for &(desc_id, desc_level) in descendant_levels {
            tx.execute(
                "UPDATE categories SET level = ?1 WHERE id = ?2",
                params![desc_level, desc_id],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))
    }

    /// Delete a category by id.
    pub async fn delete_category(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM categories WHERE id = ?1", params![id])
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Count direct children of a category.
    pub async fn count_children(&self, id: i64) -> Result<u64> {
        self.count_query(
            "SELECT COUNT(*) FROM categories WHERE parent_id = ?1",
            params![id],
        )
        .await
    }

    /// Count repositories linked directly to a category.
    pub async fn count_repositories_in_category(&self, id: i64) -> Result<u64> {
        self.count_query(
            "SELECT COUNT(*) FROM repositories WHERE category_id = ?1",
            params![id],
        )
        .await
    }

    /// List categories that hold at least one repository directly.
    pub async fn categories_with_repositories(&self) -> Result<Vec<Category>> {
        let mut rows = self
            .conn
            .query(
                "SELECT DISTINCT c.id, c.name, c.parent_id, c.level, c.created_at
                 FROM categories c
                 JOIN repositories r ON r.category_id = c.id
                 ORDER BY c.id",
                params![],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_category(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Repository operations
    // -----------------------------------------------------------------------

    /// Insert a new repository and return it with its assigned id.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_repository(
        &self,
        name: &str,
        github_url: &str,
        owner: &str,
        repo_name: &str,
        category_id: i64,
        description: Option<&str>,
    ) -> Result<Repository> {
        let now = Utc::now();
        self.conn
            .execute(
                "INSERT INTO repositories
                   (name, github_url, owner, repo_name, category_id, description, added_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    name,
                    github_url,
                    owner,
                    repo_name,
                    category_id,
                    description,
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        Ok(Repository {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            github_url: github_url.to_string(),
            owner: owner.to_string(),
            repo_name: repo_name.to_string(),
            category_id,
            description: description.map(str::to_string),
            added_at: now,
            updated_at: None,
        })
    }

    /// Get a repository by id.
    pub async fn get_repository(&self, id: i64) -> Result<Option<Repository>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, github_url, owner, repo_name, category_id,
                        description, added_at, updated_at
                 FROM repositories WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_repository(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(RepodexError::Storage(e.to_string())),
        }
    }

    /// Get a repository by its GitHub URL (globally unique).
    pub async fn get_repository_by_url(&self, github_url: &str) -> Result<Option<Repository>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, github_url, owner, repo_name, category_id,
                        description, added_at, updated_at
                 FROM repositories WHERE github_url = ?1",
                params![github_url],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_repository(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(RepodexError::Storage(e.to_string())),
        }
    }

    /// Update a repository's mutable fields and bump `updated_at`.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_repository(
        &self,
        id: i64,
        name: &str,
        github_url: &str,
        owner: &str,
        repo_name: &str,
        category_id: i64,
        description: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE repositories
                 SET name = ?1, github_url = ?2, owner = ?3, repo_name = ?4,
                     category_id = ?5, description = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    name,
                    github_url,
                    owner,
                    repo_name,
                    category_id,
                    description,
                    now.as_str(),
                    id
                ],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Overwrite a repository's description (enrichment output) and bump
    /// `updated_at`.
    pub async fn set_repository_description(&self, id: i64, description: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE repositories SET description = ?1, updated_at = ?2 WHERE id = ?3",
                params![description, now.as_str(), id],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete a repository by id.
    pub async fn delete_repository(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM repositories WHERE id = ?1", params![id])
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;
        Ok(())
    }

    /// List repositories, newest first, with optional text search and
    /// category filter. The text filter matches name, owner, repo name,
    /// description, and the linked category's name, case-insensitively.
    pub async fn list_repositories(
        &self,
        query: Option<&str>,
        category_id: Option<i64>,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Repository>> {
        let pattern = query.map(like_pattern);
        let mut rows = self
            .conn
            .query(
                "SELECT r.id, r.name, r.github_url, r.owner, r.repo_name, r.category_id,
                        r.description, r.added_at, r.updated_at
                 FROM repositories r
                 LEFT JOIN categories c ON c.id = r.category_id
                 WHERE (?1 IS NULL
                        OR LOWER(r.name) LIKE ?1
                        OR LOWER(r.owner) LIKE ?1
                        OR LOWER(r.repo_name) LIKE ?1
                        OR LOWER(COALESCE(r.description, '')) LIKE ?1
                        OR LOWER(COALESCE(c.name, '')) LIKE ?1)
                   AND (?2 IS NULL OR r.category_id = ?2)
                 ORDER BY r.added_at DESC, r.id DESC
                 LIMIT ?3 OFFSET ?4",
                params![pattern, category_id, limit as i64, offset as i64],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_repository(&row)?);
        }
        Ok(results)
    }

    /// Count repositories matching the same filters as [`list_repositories`].
    pub async fn count_repositories(
        &self,
        query: Option<&str>,
        category_id: Option<i64>,
    ) -> Result<u64> {
        let pattern = query.map(like_pattern);
        self.count_query(
            "SELECT COUNT(*)
             FROM repositories r
             LEFT JOIN categories c ON c.id = r.category_id
             WHERE (?1 IS NULL
                    OR LOWER(r.name) LIKE ?1
                    OR LOWER(r.owner) LIKE ?1
                    OR LOWER(r.repo_name) LIKE ?1
                    OR LOWER(COALESCE(r.description, '')) LIKE ?1
                    OR LOWER(COALESCE(c.name, '')) LIKE ?1)
               AND (?2 IS NULL OR r.category_id = ?2)",
            params![pattern, category_id],
        )
        .await
    }

    /// List `(category_id, repository_name)` pairs for all repositories,
    /// newest first. Used to assemble the category tree without loading
    /// full rows.
    pub async fn repository_names_by_category(&self) -> Result<Vec<(i64, String)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT category_id, name FROM repositories
                 ORDER BY added_at DESC, id DESC",
                params![],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let category_id: i64 = row
                .get(0)
                .map_err(|e| RepodexError::Storage(e.to_string()))?;
            let name: String = row
                .get(1)
                .map_err(|e| RepodexError::Storage(e.to_string()))?;
            results.push((category_id, name));
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Config operations
    // -----------------------------------------------------------------------

    /// Get a config value by key. Returns `None` for missing keys and keys
    /// with a NULL value alike.
    pub async fn get_config_value(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM configs WHERE key = ?1", params![key])
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(RepodexError::Storage(e.to_string())),
        }
    }

    /// List all config entries ordered by key.
    pub async fn list_configs(&self) -> Result<Vec<ConfigEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT key, value, description FROM configs ORDER BY key",
                params![],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(ConfigEntry {
                key: row
                    .get::<String>(0)
                    .map_err(|e| RepodexError::Storage(e.to_string()))?,
                value: row.get::<String>(1).ok(),
                description: row.get::<String>(2).ok(),
            });
        }
        Ok(results)
    }

    /// Set a config value (upserts by key, leaving any description intact).
    pub async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO configs (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, value, now.as_str()],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Admin operations
    // -----------------------------------------------------------------------

    /// Count administrator accounts.
    pub async fn count_admins(&self) -> Result<u64> {
        self.count_query("SELECT COUNT(*) FROM admins", params![])
            .await
    }

    /// Insert a new administrator account.
    pub async fn insert_admin(&self, username: &str, password_hash: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO admins (username, password_hash, created_at)
                 VALUES (?1, ?2, ?3)",
                params![username, password_hash, now.as_str()],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Look up an administrator by username.
    pub async fn get_admin_by_username(&self, username: &str) -> Result<Option<Admin>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, username, password_hash, created_at
                 FROM admins WHERE username = ?1",
                params![username],
            )
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(Admin {
                id: row
                    .get::<i64>(0)
                    .map_err(|e| RepodexError::Storage(e.to_string()))?,
                username: row
                    .get::<String>(1)
                    .map_err(|e| RepodexError::Storage(e.to_string()))?,
                password_hash: row
                    .get::<String>(2)
                    .map_err(|e| RepodexError::Storage(e.to_string()))?,
                created_at: parse_timestamp(
                    &row.get::<String>(3)
                        .map_err(|e| RepodexError::Storage(e.to_string()))?,
                )?,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(RepodexError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Run a `SELECT COUNT(*)` style query.
    async fn count_query(
        &self,
        sql: &str,
        query_params: impl libsql::params::IntoParams,
    ) -> Result<u64> {
        let mut rows = self
            .conn
            .query(sql, query_params)
            .await
            .map_err(|e| RepodexError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| RepodexError::Storage(e.to_string()))?;
                Ok(count.max(0) as u64)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(RepodexError::Storage(e.to_string())),
        }
    }
}

/// Build a case-insensitive LIKE pattern from a raw search term.
fn like_pattern(query: &str) -> String {
    format!("%{}%", query.trim().to_lowercase())
}

/// Parse an RFC 3339 timestamp stored as TEXT.
fn parse_timestamp(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| RepodexError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`Category`].
fn row_to_category(row: &libsql::Row) -> Result<Category> {
    Ok(Category {
        id: row
            .get::<i64>(0)
            .map_err(|e| RepodexError::Storage(e.to_string()))?,
        name: row
            .get::<String>(1)
            .map_err(|e| RepodexError::Storage(e.to_string()))?,
        parent_id: row.get::<i64>(2).ok(),
        level: row
            .get::<i64>(3)
            .map_err(|e| RepodexError::Storage(e.to_string()))?,
        created_at: parse_timestamp(
            &row.get::<String>(4)
                .map_err(|e| RepodexError::Storage(e.to_string()))?,
        )?,
    })
}

/// Convert a database row to a [`Repository`].
fn row_to_repository(row: &libsql::Row) -> Result<Repository> {
    Ok(Repository {
        id: row
            .get::<i64>(0)
            .map_err(|e| RepodexError::Storage(e.to_string()))?,
        name: row
            .get::<String>(1)
            .map_err(|e| RepodexError::Storage(e.to_string()))?,
        github_url: row
            .get::<String>(2)
            .map_err(|e| RepodexError::Storage(e.to_string()))?,
        owner: row
            .get::<String>(3)
            .map_err(|e| RepodexError::Storage(e.to_string()))?,
        repo_name: row
            .get::<String>(4)
            .map_err(|e| RepodexError::Storage(e.to_string()))?,
        category_id: row
            .get::<i64>(5)
            .map_err(|e| RepodexError::Storage(e.to_string()))?,
        description: row.get::<String>(6).ok(),
        added_at: parse_timestamp(
            &row.get::<String>(7)
                .map_err(|e| RepodexError::Storage(e.to_string()))?,
        )?,
        updated_at: row
            .get::<String>(8)
            .ok()
            .and_then(|s| parse_timestamp(&s).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("repodex_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("repodex_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn category_crud() {
        let storage = test_storage().await;

        let root = storage
            .insert_category("AI", None, 0)
            .await
            .expect("insert root");
        assert!(root.id > 0);
        assert_eq!(root.level, 0);

        let child = storage
            .insert_category("LLM", Some(root.id), 1)
            .await
            .expect("insert child");
        assert_eq!(child.parent_id, Some(root.id));

        let found = storage.get_category(child.id).await.expect("get").unwrap();
        assert_eq!(found.name, "LLM");
        assert_eq!(found.parent_id, Some(root.id));

        let all = storage.list_categories().await.expect("list");
        assert_eq!(all.len(), 2);

        assert_eq!(storage.count_children(root.id).await.unwrap(), 1);
        assert_eq!(storage.count_children(child.id).await.unwrap(), 0);

        storage.delete_category(child.id).await.expect("delete");
        assert!(storage.get_category(child.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn category_tree_update_cascades_levels() {
        let storage = test_storage().await;

        let root_a = storage.insert_category("A", None, 0).await.unwrap();
        let root_b = storage.insert_category("B", None, 0).await.unwrap();
        let mid = storage
            .insert_category("Mid", Some(root_a.id), 1)
            .await
            .unwrap();
        let leaf = storage
            .insert_category("Leaf", Some(mid.id), 2)
            .await
            .unwrap();

        // Reparent mid under root_b; levels stay but go through the
        // transactional path with an explicit descendant list.
        storage
            .update_category_tree(mid.id, "Mid", Some(root_b.id), 1, &[(leaf.id, 2)])
            .await
            .expect("reparent");

        let mid = storage.get_category(mid.id).await.unwrap().unwrap();
        assert_eq!(mid.parent_id, Some(root_b.id));
        assert_eq!(mid.level, 1);

        // Promote mid to a root; leaf drops to level 1.
        storage
            .update_category_tree(mid.id, "Mid", None, 0, &[(leaf.id, 1)])
            .await
            .expect("promote");

        let mid = storage.get_category(mid.id).await.unwrap().unwrap();
        assert_eq!(mid.parent_id, None);
        assert_eq!(mid.level, 0);
        let leaf = storage.get_category(leaf.id).await.unwrap().unwrap();
        assert_eq!(leaf.level, 1);
    }

    #[tokio::test]
    async fn cascade_does_not_capture_concurrent_writes() {
        let storage = test_storage().await;

        let root = storage.insert_category("Root", None, 0).await.unwrap();
        let mid = storage
            .insert_category("Mid", Some(root.id), 1)
            .await
            .unwrap();
        let leaf = storage
            .insert_category("Leaf", Some(mid.id), 2)
            .await
            .unwrap();

        // An insert on the shared connection interleaves with the open
        // cascade transaction; it must commit independently.
        let children = [(leaf.id, 1)];
        let cascade = storage.update_category_tree(mid.id, "Mid", None, 0, &children);
        let insert = storage.insert_category("Bystander", None, 0);
        let (cascaded, inserted) = tokio::join!(cascade, insert);
        cascaded.expect("cascade");
        let inserted = inserted.expect("insert");

        let bystander = storage.get_category(inserted.id).await.unwrap();
        assert!(bystander.is_some());
        let leaf = storage.get_category(leaf.id).await.unwrap().unwrap();
        assert_eq!(leaf.level, 1);
    }

    #[tokio::test]
    async fn repository_crud() {
        let storage = test_storage().await;
        let cat = storage.insert_category("Tools", None, 0).await.unwrap();

        let repo = storage
            .insert_repository(
                "ripgrep",
                "https://github.com/BurntSushi/ripgrep",
                "BurntSushi",
                "ripgrep",
                cat.id,
                None,
            )
            .await
            .expect("insert repo");
        assert!(repo.id > 0);
        assert!(repo.updated_at.is_none());

        let by_url = storage
            .get_repository_by_url("https://github.com/BurntSushi/ripgrep")
            .await
            .unwrap();
        assert_eq!(by_url.unwrap().id, repo.id);

        storage
            .set_repository_description(repo.id, "A line-oriented search tool")
            .await
            .expect("set description");
        let found = storage.get_repository(repo.id).await.unwrap().unwrap();
        assert_eq!(
            found.description.as_deref(),
            Some("A line-oriented search tool")
        );
        assert!(found.updated_at.is_some());

        storage
            .update_repository(
                repo.id,
                "rg",
                "https://github.com/BurntSushi/ripgrep",
                "BurntSushi",
                "ripgrep",
                cat.id,
                Some("renamed"),
            )
            .await
            .expect("update repo");
        let found = storage.get_repository(repo.id).await.unwrap().unwrap();
        assert_eq!(found.name, "rg");

        storage.delete_repository(repo.id).await.expect("delete");
        assert!(storage.get_repository(repo.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_github_url_rejected() {
        let storage = test_storage().await;
        let cat = storage.insert_category("Tools", None, 0).await.unwrap();

        storage
            .insert_repository(
                "tokio",
                "https://github.com/tokio-rs/tokio",
                "tokio-rs",
                "tokio",
                cat.id,
                None,
            )
            .await
            .unwrap();

        let dup = storage
            .insert_repository(
                "tokio again",
                "https://github.com/tokio-rs/tokio",
                "tokio-rs",
                "tokio",
                cat.id,
                None,
            )
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn search_matches_category_name() {
        let storage = test_storage().await;
        let ai = storage.insert_category("AI Agents", None, 0).await.unwrap();
        let tools = storage.insert_category("Tools", None, 0).await.unwrap();

        storage
            .insert_repository(
                "langchain",
                "https://github.com/langchain-ai/langchain",
                "langchain-ai",
                "langchain",
                ai.id,
                None,
            )
            .await
            .unwrap();
        storage
            .insert_repository(
                "fd",
                "https://github.com/sharkdp/fd",
                "sharkdp",
                "fd",
                tools.id,
                None,
            )
            .await
            .unwrap();

        let hits = storage
            .list_repositories(Some("agents"), None, 0, 50)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "langchain");

        assert_eq!(
            storage.count_repositories(Some("agents"), None).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_paginated() {
        let storage = test_storage().await;
        let cat = storage.insert_category("Tools", None, 0).await.unwrap();

        for name in ["one", "two", "three"] {
            storage
                .insert_repository(
                    name,
                    &format!("https://github.com/acme/{name}"),
                    "acme",
                    name,
                    cat.id,
                    None,
                )
                .await
                .unwrap();
        }

        let page1 = storage
            .list_repositories(None, None, 0, 2)
            .await
            .expect("page 1");
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].name, "three");
        assert_eq!(page1[1].name, "two");

        let page2 = storage
            .list_repositories(None, None, 2, 2)
            .await
            .expect("page 2");
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].name, "one");

        assert_eq!(storage.count_repositories(None, None).await.unwrap(), 3);

        let filtered = storage
            .list_repositories(None, Some(cat.id), 0, 50)
            .await
            .unwrap();
        assert_eq!(filtered.len(), 3);
        let none = storage
            .list_repositories(None, Some(cat.id + 99), 0, 50)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn config_upsert_and_list() {
        let storage = test_storage().await;

        assert!(storage
            .get_config_value("openai_api_key")
            .await
            .unwrap()
            .is_none());

        storage
            .set_config("openai_api_key", "sk-test")
            .await
            .expect("set");
        assert_eq!(
            storage.get_config_value("openai_api_key").await.unwrap(),
            Some("sk-test".into())
        );

        storage
            .set_config("openai_api_key", "sk-test-2")
            .await
            .expect("overwrite");
        assert_eq!(
            storage.get_config_value("openai_api_key").await.unwrap(),
            Some("sk-test-2".into())
        );

        let all = storage.list_configs().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key, "openai_api_key");
    }

    #[tokio::test]
    async fn admin_accounts() {
        let storage = test_storage().await;
        assert_eq!(storage.count_admins().await.unwrap(), 0);

        storage
            .insert_admin("admin", "deadbeef")
            .await
            .expect("insert admin");
        assert_eq!(storage.count_admins().await.unwrap(), 1);

        let admin = storage
            .get_admin_by_username("admin")
            .await
            .unwrap()
            .expect("admin exists");
        assert_eq!(admin.password_hash, "deadbeef");

        assert!(storage
            .get_admin_by_username("nobody")
            .await
            .unwrap()
            .is_none());
    }
}
