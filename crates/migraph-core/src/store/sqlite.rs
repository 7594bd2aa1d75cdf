//! SQLite-backed store.

use std::path::Path;

use rusqlite::Connection;

use super::{Dialect, Store};
use crate::error::Error;

/// A store over a SQLite connection.
///
/// SQLite runs schema changes inside transactions, so a failed run leaves
/// the database untouched.
pub struct SqliteStore {
    conn: Connection,
    dialect: Dialect,
}

impl SqliteStore {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(Self::from_connection(Connection::open(path)?))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            dialect: Dialect::sqlite(),
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Check whether a table exists.
    pub fn table_exists(&self, name: &str) -> Result<bool, Error> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl Store for SqliteStore {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        self.conn.execute_batch(sql).map_err(|e| Error::Statement {
            statement: sql.to_string(),
            message: e.to_string(),
        })
    }

    fn begin(&mut self) -> Result<(), Error> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Error> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
