//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use forge_core::error::ForgeError;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), ForgeError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ForgeError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| ForgeError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: vector_stores");
    }

    if current_version < 2 {
        apply_v2(conn)?;
        info!("Applied migration v2: vector_stores.embedder");
    }

    Ok(())
}

/// Version 1: named vector stores and their chunks.
fn apply_v1(conn: &Connection) -> Result<(), ForgeError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS vector_stores (
            name            TEXT PRIMARY KEY NOT NULL,
            dimensions      INTEGER NOT NULL CHECK (dimensions >= 0),
            chunk_count     INTEGER NOT NULL DEFAULT 0,
            created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
            updated_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        -- position is insertion order; chunk_index restarts per source.
        CREATE TABLE IF NOT EXISTS store_chunks (
            store_name      TEXT NOT NULL
                            REFERENCES vector_stores (name) ON DELETE CASCADE,
            position        INTEGER NOT NULL,
            chunk_id        TEXT NOT NULL,
            chunk_index     INTEGER NOT NULL,
            text            TEXT NOT NULL,
            start_offset    INTEGER NOT NULL,
            end_offset      INTEGER NOT NULL,
            source          TEXT NOT NULL DEFAULT '',
            kind            TEXT NOT NULL
                            CHECK (kind IN ('tabular_data', 'document')),
            embedding       BLOB NOT NULL,
            PRIMARY KEY (store_name, position)
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'vector_stores');
        ",
    )
    .map_err(|e| ForgeError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

/// Version 2: record which embedding backend produced a store's vectors.
///
/// Stores saved before this version keep an empty label.
fn apply_v2(conn: &Connection) -> Result<(), ForgeError> {
    conn.execute_batch(
        "
        ALTER TABLE vector_stores ADD COLUMN embedder TEXT NOT NULL DEFAULT '';

        INSERT INTO schema_migrations (version, name) VALUES (2, 'vector_store_embedder');
        ",
    )
    .map_err(|e| ForgeError::Storage(format!("Migration v2 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }

    #[test]
    fn test_v2_upgrades_existing_stores() {
        let conn = open_test_conn();
        conn.execute_batch(
            "CREATE TABLE schema_migrations (
                version INTEGER PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );",
        )
        .unwrap();
        apply_v1(&conn).unwrap();
        conn.execute(
            "INSERT INTO vector_stores (name, dimensions) VALUES ('legacy', 4)",
            [],
        )
        .unwrap();

        run_migrations(&conn).unwrap();
        let embedder: String = conn
            .query_row(
                "SELECT embedder FROM vector_stores WHERE name = 'legacy'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(embedder, "");
    }

    #[test]
    fn test_chunks_cascade_on_store_delete() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO vector_stores (name, dimensions, chunk_count) VALUES ('sales', 2, 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO store_chunks (store_name, position, chunk_id, chunk_index, text,
                                       start_offset, end_offset, source, kind, embedding)
             VALUES ('sales', 0, 'c-1', 0, 'hello', 0, 5, 'a.csv', 'document', x'0000803F00000000')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM vector_stores WHERE name = 'sales'", [])
            .unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM store_chunks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_chunk_requires_existing_store() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO store_chunks (store_name, position, chunk_id, chunk_index, text,
                                       start_offset, end_offset, kind, embedding)
             VALUES ('missing', 0, 'c-1', 0, 'x', 0, 1, 'document', x'00')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_chunk_kind_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO vector_stores (name, dimensions) VALUES ('s', 1)",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO store_chunks (store_name, position, chunk_id, chunk_index, text,
                                       start_offset, end_offset, kind, embedding)
             VALUES ('s', 0, 'c-1', 0, 'x', 0, 1, 'spreadsheet', x'00')",
            [],
        );
        assert!(result.is_err());
    }
}
