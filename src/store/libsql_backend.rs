//! libSQL backend — durable `KeyValueStore` implementation.
//!
//! Supports local file and in-memory databases. Every row is tagged with a
//! scope so several stores can share one database file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::KeyValueStore;

/// Default scope for onboarding state.
pub const DEFAULT_SCOPE: &str = "onboarding";

/// libSQL key-value store.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    scope: String,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path, scope: &str) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let store = Self::from_database(db, scope).await?;
        info!(path = %path.display(), scope, "Key-value store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory(scope: &str) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db, scope).await
    }

    async fn from_database(db: LibSqlDatabase, scope: &str) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            scope: scope.to_string(),
        })
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

#[async_trait]
impl KeyValueStore for LibSqlStore {
    async fn get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM kv_store WHERE scope = ?1 AND key = ?2",
                params![self.scope.as_str(), key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let value: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Serialization(format!("get: {e}")))?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO kv_store (scope, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (scope, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![self.scope.as_str(), key, value, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set: {e}")))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, DatabaseError> {
        let count = self
            .conn
            .execute(
                "DELETE FROM kv_store WHERE scope = ?1 AND key = ?2",
                params![self.scope.as_str(), key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("delete: {e}")))?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::traits::keys;

    #[tokio::test]
    async fn set_overwrites_and_delete_removes() {
        let store = LibSqlStore::new_memory(DEFAULT_SCOPE).await.unwrap();
        let key = keys::otp_attempts("founder@acme.com");

        assert!(store.get(&key).await.unwrap().is_none());
        store.set(&key, "1").await.unwrap();
        store.set(&key, "2").await.unwrap();
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some("2"));

        assert!(store.delete(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
        assert!(!store.delete(&key).await.unwrap());
    }

    #[tokio::test]
    async fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("onboard.db");
        let key = keys::otp_lockout("founder@acme.com");

        {
            let store = LibSqlStore::new_local(&path, DEFAULT_SCOPE).await.unwrap();
            store.set(&key, "1767225600000").await.unwrap();
        }

        let reopened = LibSqlStore::new_local(&path, DEFAULT_SCOPE).await.unwrap();
        assert_eq!(
            reopened.get(&key).await.unwrap().as_deref(),
            Some("1767225600000")
        );

        let other_scope = LibSqlStore::new_local(&path, "other").await.unwrap();
        assert!(other_scope.get(&key).await.unwrap().is_none());
    }
}
