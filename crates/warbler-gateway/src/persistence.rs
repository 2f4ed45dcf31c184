//! DocumentStore: SQLite WAL storage behind the persistence capability
//!
//! JSON documents keyed by `(collection, key)`. Every write replaces the
//! whole document.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use warbler_core::{CapabilityError, Persistence};

/// SQLite-backed document store, shared by all actions
#[derive(Clone)]
pub struct DocumentStore {
    conn: Arc<Mutex<Connection>>,
}

impl DocumentStore {
    /// Open (or create) the database file in WAL mode
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("opening SQLite database {}", path.display()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("configuring SQLite WAL")?;

        Self::with_connection(conn)
    }

    /// A private database that disappears with the store
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS documents (
                collection   TEXT NOT NULL,
                key          TEXT NOT NULL,
                value        TEXT NOT NULL,
                updated_at_ms INTEGER NOT NULL,
                PRIMARY KEY (collection, key)
            );
            ",
            )
            .context("migrating document schema")?;
        Ok(())
    }

    pub fn get_sync(&self, collection: &str, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock();
        let result = conn.query_row(
            "SELECT value FROM documents WHERE collection = ?1 AND key = ?2",
            params![collection, key],
            |row| row.get::<_, serde_json::Value>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("SELECT documents"),
        }
    }

    pub fn put_sync(&self, collection: &str, key: &str, value: &serde_json::Value) -> Result<()> {
        let updated_at_ms = chrono::Utc::now().timestamp_millis();
        self.conn
            .lock()
            .execute(
                "INSERT INTO documents (collection, key, value, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (collection, key)
                 DO UPDATE SET value = excluded.value, updated_at_ms = excluded.updated_at_ms",
                params![collection, key, value, updated_at_ms],
            )
            .context("UPSERT documents")?;
        Ok(())
    }

    pub fn delete_sync(&self, collection: &str, key: &str) -> Result<bool> {
        let removed = self
            .conn
            .lock()
            .execute(
                "DELETE FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection, key],
            )
            .context("DELETE documents")?;
        Ok(removed > 0)
    }

    pub fn keys_sync(&self, collection: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key FROM documents WHERE collection = ?1 ORDER BY key")
            .context("SELECT keys")?;
        let rows = stmt.query_map(params![collection], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("reading keys")
    }

    /// Run a blocking database call off the async executor
    async fn blocking<T, F>(&self, call: F) -> Result<T, CapabilityError>
    where
        T: Send + 'static,
        F: FnOnce(DocumentStore) -> Result<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || call(store))
            .await
            .map_err(|e| CapabilityError::Backend(e.to_string()))?
            .map_err(|e| CapabilityError::Backend(format!("{:#}", e)))
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl Persistence for DocumentStore {
    async fn get(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<serde_json::Value>, CapabilityError> {
        let (collection, key) = (collection.to_string(), key.to_string());
        self.blocking(move |store| store.get_sync(&collection, &key))
            .await
    }

    async fn put(
        &self,
        collection: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), CapabilityError> {
        let (collection, key) = (collection.to_string(), key.to_string());
        self.blocking(move |store| store.put_sync(&collection, &key, &value))
            .await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool, CapabilityError> {
        let (collection, key) = (collection.to_string(), key.to_string());
        self.blocking(move |store| store.delete_sync(&collection, &key))
            .await
    }

    async fn keys(&self, collection: &str) -> Result<Vec<String>, CapabilityError> {
        let collection = collection.to_string();
        self.blocking(move |store| store.keys_sync(&collection)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = DocumentStore::open_in_memory().unwrap();

        assert_eq!(store.get("scores", "bob").await.unwrap(), None);

        store.put("scores", "bob", json!({"slaps": 1})).await.unwrap();
        store.put("scores", "bob", json!({"slaps": 2})).await.unwrap();
        store.put("scores", "alice", json!({"slaps": 5})).await.unwrap();
        store.put("settings", "bob", json!(true)).await.unwrap();

        assert_eq!(
            store.get("scores", "bob").await.unwrap(),
            Some(json!({"slaps": 2}))
        );
        assert_eq!(store.keys("scores").await.unwrap(), vec!["alice", "bob"]);

        assert!(store.delete("scores", "bob").await.unwrap());
        assert!(!store.delete("scores", "bob").await.unwrap());
        assert_eq!(store.keys("scores").await.unwrap(), vec!["alice"]);
        assert_eq!(store.get("settings", "bob").await.unwrap(), Some(json!(true)));
    }

    #[test]
    fn test_documents_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data/warbler.db");

        {
            let store = DocumentStore::open(&path).unwrap();
            store
                .put_sync("reminders", "r1", &json!({"text": "water plants"}))
                .unwrap();
        }

        let store = DocumentStore::open(&path).unwrap();
        assert_eq!(
            store.get_sync("reminders", "r1").unwrap(),
            Some(json!({"text": "water plants"}))
        );
    }
}
