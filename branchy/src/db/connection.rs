//! Database connection management.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::StoreError;

/// Database wrapper for branchy.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the database at the default location
    /// (`<data dir>/branchy/chat.db`).
    pub fn open() -> Result<Self, StoreError> {
        let db_path = Self::default_path()?;
        Self::open_at(&db_path)
    }

    /// Get the default database path under the user data directory.
    pub fn default_path() -> Result<PathBuf, StoreError> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| StoreError::Corrupt("could not resolve user data directory".into()))?;
        let branchy_dir = data_dir.join("branchy");
        std::fs::create_dir_all(&branchy_dir)?;
        Ok(branchy_dir.join("chat.db"))
    }

    /// Open or create the database at a specific path.
    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Open an in-memory database (tests and throwaway sessions).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize the database schema.
    fn initialize(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                parent_id INTEGER,
                title TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                FOREIGN KEY (parent_id) REFERENCES conversations(id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                conversation_id INTEGER NOT NULL,
                seq INTEGER NOT NULL,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (conversation_id, seq),
                FOREIGN KEY (conversation_id) REFERENCES conversations(id)
            );

            CREATE INDEX IF NOT EXISTS idx_conversations_parent_id
                ON conversations(parent_id);
            ",
        )?;
        Ok(())
    }

    /// Consume the wrapper, yielding the raw connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    /// Get a reference to the connection.
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_at_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.db");
        let db = Database::open_at(&path).unwrap();

        let count: i64 = db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('conversations', 'messages')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);

        // Reopening an existing database must be a no-op.
        drop(db);
        Database::open_at(&path).unwrap();
    }
}
