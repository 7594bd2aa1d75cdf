//! Per-run migration context.

use tracing::debug;

use super::error::MigrationError;
use super::expression::split_batches;
use crate::store::{Dialect, Store};

/// State shared by every step of one migration run.
///
/// Owns the store handle for the duration of the run, a monotonically
/// increasing expression index, and the flag marking an expression whose
/// builder has started but which has not run yet.
pub struct MigrationContext<'s> {
    store: &'s mut dyn Store,
    plan: String,
    index: usize,
    statements_sent: usize,
    building_expression: bool,
}

impl<'s> MigrationContext<'s> {
    /// Create a context over a store.
    pub fn new(store: &'s mut dyn Store, plan: impl Into<String>) -> Self {
        Self {
            store,
            plan: plan.into(),
            index: 0,
            statements_sent: 0,
            building_expression: false,
        }
    }

    /// The store being migrated.
    pub fn store(&mut self) -> &mut dyn Store {
        &mut *self.store
    }

    /// Dialect of the store being migrated.
    pub fn dialect(&self) -> &Dialect {
        self.store.dialect()
    }

    /// Name of the plan or product being migrated.
    pub fn plan(&self) -> &str {
        &self.plan
    }

    /// Number of expressions executed so far.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of statement batches sent to the store so far.
    pub fn statements_sent(&self) -> usize {
        self.statements_sent
    }

    /// Whether an expression has been started but not executed.
    pub fn is_building_expression(&self) -> bool {
        self.building_expression
    }

    /// Send a script to the store, one batch at a time.
    pub fn execute_statement(&mut self, sql: &str) -> Result<(), MigrationError> {
        for batch in split_batches(sql) {
            debug!(
                plan = %self.plan,
                index = self.index,
                sql = %batch,
                "Executing statement"
            );
            self.store.execute(&batch)?;
            self.statements_sent += 1;
        }
        Ok(())
    }

    pub(crate) fn begin_expression(&mut self) -> Result<(), MigrationError> {
        if self.building_expression {
            return Err(MigrationError::IncompleteBuild);
        }
        self.building_expression = true;
        Ok(())
    }

    pub(crate) fn end_expression(&mut self) {
        self.building_expression = false;
    }

    pub(crate) fn advance(&mut self) {
        self.index += 1;
    }
}
