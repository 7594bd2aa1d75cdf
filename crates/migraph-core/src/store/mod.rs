//! Store handles consumed by the migration engine.
//!
//! The engine only needs a narrow view of the target database: raw statement
//! execution, transaction control, and a little dialect metadata. Everything
//! else about the database is left to the implementation.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use tracing::warn;

use crate::error::Error;

/// Dialect metadata the engine needs to drive a store safely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    /// Engine name, used in logs.
    pub name: String,
    /// Whether schema changes participate in transactions.
    ///
    /// When false, DDL implicitly commits and a failed run cannot be
    /// rolled back.
    pub transactional_ddl: bool,
    /// Whether the engine follows MySQL syntax conventions.
    pub mysql_like: bool,
}

impl Dialect {
    /// Create a dialect description.
    pub fn new(name: impl Into<String>, transactional_ddl: bool, mysql_like: bool) -> Self {
        Self {
            name: name.into(),
            transactional_ddl,
            mysql_like,
        }
    }

    /// SQLite: transactional DDL.
    pub fn sqlite() -> Self {
        Self::new("sqlite", true, false)
    }

    /// PostgreSQL: transactional DDL.
    pub fn postgres() -> Self {
        Self::new("postgres", true, false)
    }

    /// SQL Server: transactional DDL.
    pub fn sql_server() -> Self {
        Self::new("sqlserver", true, false)
    }

    /// MySQL: DDL implicitly commits.
    pub fn mysql() -> Self {
        Self::new("mysql", false, true)
    }

    /// Quote an identifier for this dialect.
    pub fn quote(&self, identifier: &str) -> String {
        if self.mysql_like {
            format!("`{}`", identifier.replace('`', "``"))
        } else {
            format!("\"{}\"", identifier.replace('"', "\"\""))
        }
    }

    /// Quote a string literal.
    pub fn literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }
}

/// A handle to the database being migrated.
pub trait Store {
    /// Dialect metadata for this store.
    fn dialect(&self) -> &Dialect;

    /// Execute one statement batch.
    fn execute(&mut self, sql: &str) -> Result<(), Error>;

    /// Begin a transaction.
    fn begin(&mut self) -> Result<(), Error>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), Error>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<(), Error>;
}

/// A transaction scope over a store.
///
/// The scope must be completed explicitly; dropping it rolls back.
pub struct Scope<'a> {
    store: &'a mut dyn Store,
    completed: bool,
}

impl<'a> Scope<'a> {
    /// Begin a transaction on the store.
    pub fn begin(store: &'a mut dyn Store) -> Result<Self, Error> {
        store.begin()?;
        Ok(Self {
            store,
            completed: false,
        })
    }

    /// The store, for work inside the scope.
    pub fn store(&mut self) -> &mut dyn Store {
        &mut *self.store
    }

    /// Commit the scope.
    pub fn complete(mut self) -> Result<(), Error> {
        self.completed = true;
        self.store.commit()
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        if let Err(e) = self.store.rollback() {
            warn!(
                dialect = %self.store.dialect().name,
                error = %e,
                "Failed to roll back incomplete scope"
            );
        }
    }
}

/// Whether a statement is a schema change.
pub(crate) fn is_ddl(sql: &str) -> bool {
    let head = sql
        .trim_start()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_uppercase();
    matches!(
        head.as_str(),
        "CREATE" | "ALTER" | "DROP" | "RENAME" | "TRUNCATE"
    )
}
