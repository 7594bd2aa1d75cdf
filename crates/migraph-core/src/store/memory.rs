//! In-memory store that records statements instead of running them.

use super::{is_ddl, Dialect, Store};
use crate::error::Error;

/// A store that records every statement it receives.
///
/// Transaction semantics follow the dialect: with transactional DDL, pending
/// statements are discarded on rollback. Without it, any DDL statement inside
/// a transaction implicitly commits everything pending, the way MySQL does.
#[derive(Debug)]
pub struct MemoryStore {
    dialect: Dialect,
    committed: Vec<String>,
    pending: Vec<String>,
    in_transaction: bool,
    fail_on: Option<String>,
    executed: usize,
    rollbacks: usize,
}

impl MemoryStore {
    /// Create an empty store with the given dialect.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            committed: Vec::new(),
            pending: Vec::new(),
            in_transaction: false,
            fail_on: None,
            executed: 0,
            rollbacks: 0,
        }
    }

    /// Make every statement containing `fragment` fail.
    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_on = Some(fragment.into());
        self
    }

    /// Statements that are durably applied.
    pub fn committed(&self) -> &[String] {
        &self.committed
    }

    /// Statements waiting on the current transaction.
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Number of statements accepted so far, committed or not.
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Number of rollbacks performed.
    pub fn rollbacks(&self) -> usize {
        self.rollbacks
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }
}

impl Store for MemoryStore {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    fn execute(&mut self, sql: &str) -> Result<(), Error> {
        if let Some(fragment) = &self.fail_on {
            if sql.contains(fragment.as_str()) {
                return Err(Error::Statement {
                    statement: sql.to_string(),
                    message: format!("rejected statement containing '{}'", fragment),
                });
            }
        }

        self.executed += 1;
        if !self.in_transaction {
            self.committed.push(sql.to_string());
            return Ok(());
        }

        self.pending.push(sql.to_string());
        if !self.dialect.transactional_ddl && is_ddl(sql) {
            // implicit commit
            self.committed.append(&mut self.pending);
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<(), Error> {
        if self.in_transaction {
            return Err(Error::Transaction("transaction already open".to_string()));
        }
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), Error> {
        if !self.in_transaction {
            return Err(Error::Transaction("no open transaction".to_string()));
        }
        self.committed.append(&mut self.pending);
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), Error> {
        if !self.in_transaction {
            return Err(Error::Transaction("no open transaction".to_string()));
        }
        self.pending.clear();
        self.in_transaction = false;
        self.rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transactional_rollback_discards_everything() {
        let mut store = MemoryStore::new(Dialect::postgres());
        store.begin().unwrap();
        store.execute("CREATE TABLE a (id INT)").unwrap();
        store.execute("INSERT INTO a VALUES (1)").unwrap();
        store.rollback().unwrap();

        assert!(store.committed().is_empty());
        assert_eq!(store.executed(), 2);
    }

    #[test]
    fn test_non_transactional_ddl_commits_implicitly() {
        let mut store = MemoryStore::new(Dialect::mysql());
        store.begin().unwrap();
        store.execute("INSERT INTO a VALUES (1)").unwrap();
        store.execute("CREATE TABLE b (id INT)").unwrap();
        store.execute("INSERT INTO b VALUES (2)").unwrap();
        store.rollback().unwrap();

        assert_eq!(
            store.committed(),
            ["INSERT INTO a VALUES (1)", "CREATE TABLE b (id INT)"]
        );
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_fail_on_fragment() {
        let mut store = MemoryStore::new(Dialect::sqlite()).fail_on("boom");
        store.execute("SELECT 1").unwrap();
        let err = store.execute("SELECT boom").unwrap_err();
        assert!(matches!(err, Error::Statement { .. }));
        assert_eq!(store.executed(), 1);
    }

    #[test]
    fn test_nested_begin_rejected() {
        let mut store = MemoryStore::new(Dialect::sqlite());
        store.begin().unwrap();
        assert!(matches!(store.begin(), Err(Error::Transaction(_))));
    }
}
