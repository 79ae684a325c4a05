//! SQLite handle for the vector store database.
//!
//! One connection behind a `std::sync::Mutex`. File databases run in WAL
//! mode; both kinds enforce foreign keys and are migrated on open.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::info;

use forge_core::error::ForgeError;

use crate::migrations;

const FILE_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA synchronous = NORMAL;
     PRAGMA foreign_keys = ON;
     PRAGMA cache_size = -16384;";

const MEMORY_PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

pub struct Database {
    conn: Mutex<Connection>,
    /// `None` for in-memory databases.
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database file, creating its parent directory.
    pub fn new(path: &Path) -> Result<Self, ForgeError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| storage("open database", e))?;
        let db = Self::prepare(conn, FILE_PRAGMAS, Some(path.to_path_buf()))?;
        info!(
            path = %path.display(),
            schema_version = db.schema_version()?,
            "Vector store database ready"
        );
        Ok(db)
    }

    /// A private database that lives as long as the handle.
    pub fn in_memory() -> Result<Self, ForgeError> {
        let conn = Connection::open_in_memory().map_err(|e| storage("open in-memory db", e))?;
        Self::prepare(conn, MEMORY_PRAGMAS, None)
    }

    fn prepare(conn: Connection, pragmas: &str, path: Option<PathBuf>) -> Result<Self, ForgeError> {
        conn.execute_batch(pragmas)
            .map_err(|e| storage("set pragmas", e))?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Run `f` with the connection locked.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ForgeError>
    where
        F: FnOnce(&Connection) -> Result<T, ForgeError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ForgeError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Highest applied migration.
    pub fn schema_version(&self) -> Result<i64, ForgeError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
                [],
                |row| row.get(0),
            )
            .map_err(|e| storage("read schema version", e))
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

fn storage(action: &str, e: rusqlite::Error) -> ForgeError {
    ForgeError::Storage(format!("Failed to {}: {}", action, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_count(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM vector_stores", [], |row| row.get(0))
                .map_err(|e| ForgeError::Storage(e.to_string()))
        })
        .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(store_count(&db), 0);
        assert!(db.path().is_none());
        assert_eq!(db.schema_version().unwrap(), 2);
    }

    #[test]
    fn test_file_database_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("forge.db");
        let db = Database::new(&path).unwrap();
        assert_eq!(store_count(&db), 0);
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_does_not_rerun_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forge.db");
        drop(Database::new(&path).unwrap());
        let db = Database::new(&path).unwrap();
        let applied: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
                    .map_err(|e| ForgeError::Storage(e.to_string()))
            })
            .unwrap();
        assert_eq!(applied, 2);
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(&dir.path().join("forge.db")).unwrap();
        let mode: String = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|e| ForgeError::Storage(e.to_string()))
            })
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let db = Database::in_memory().unwrap();
        let on: i64 = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))
                    .map_err(|e| ForgeError::Storage(e.to_string()))
            })
            .unwrap();
        assert_eq!(on, 1);
    }
}
