//! Fluent expression builders.
//!
//! Every builder is obtained from a [`MigrationContext`] and marks the
//! context as having a pending expression. Calling `execute` on the builder
//! is the only way to run the operation and clear that mark; a builder that
//! is dropped instead leaves it set, which fails the next builder with
//! [`MigrationError::IncompleteBuild`] and the surrounding step with
//! [`MigrationError::IncompleteMigrationExpression`].

use super::context::MigrationContext;
use super::error::MigrationError;
use super::expression::{Alteration, ColumnDefinition, Expression, IndexDefinition, Operation};

impl<'s> MigrationContext<'s> {
    /// Run a raw script. `GO` lines separate batches.
    pub fn execute_sql(
        &mut self,
        sql: impl Into<String>,
    ) -> Result<ExpressionBuilder<'_, 's>, MigrationError> {
        self.begin_expression()?;
        Ok(ExpressionBuilder {
            expression: Expression::new(Operation::Sql(sql.into())),
            ctx: self,
        })
    }

    /// Create a table.
    pub fn create_table(
        &mut self,
        table: impl Into<String>,
    ) -> Result<CreateTableBuilder<'_, 's>, MigrationError> {
        self.begin_expression()?;
        Ok(CreateTableBuilder {
            ctx: self,
            table: table.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        })
    }

    /// Alter a table.
    pub fn alter_table(
        &mut self,
        table: impl Into<String>,
    ) -> Result<AlterTableBuilder<'_, 's>, MigrationError> {
        self.begin_expression()?;
        Ok(AlterTableBuilder {
            ctx: self,
            table: table.into(),
            alterations: Vec::new(),
        })
    }

    /// Drop a table.
    pub fn drop_table(
        &mut self,
        table: impl Into<String>,
    ) -> Result<ExpressionBuilder<'_, 's>, MigrationError> {
        self.begin_expression()?;
        Ok(ExpressionBuilder {
            expression: Expression::new(Operation::DropTable {
                table: table.into(),
            }),
            ctx: self,
        })
    }

    /// Create an index.
    pub fn create_index(
        &mut self,
        name: impl Into<String>,
    ) -> Result<CreateIndexBuilder<'_, 's>, MigrationError> {
        self.begin_expression()?;
        Ok(CreateIndexBuilder {
            ctx: self,
            index: IndexDefinition {
                name: name.into(),
                ..Default::default()
            },
        })
    }

    /// Drop an index.
    pub fn drop_index(
        &mut self,
        name: impl Into<String>,
    ) -> Result<DropIndexBuilder<'_, 's>, MigrationError> {
        self.begin_expression()?;
        Ok(DropIndexBuilder {
            ctx: self,
            name: name.into(),
            table: String::new(),
        })
    }
}

/// A built expression waiting to run.
#[must_use = "expressions do nothing until `execute` is called"]
pub struct ExpressionBuilder<'c, 's> {
    ctx: &'c mut MigrationContext<'s>,
    expression: Expression,
}

impl ExpressionBuilder<'_, '_> {
    /// Attach a child expression that runs after this one.
    pub fn with_child(mut self, child: Expression) -> Self {
        self.expression = self.expression.with_child(child);
        self
    }

    /// Run the expression.
    pub fn execute(self) -> Result<(), MigrationError> {
        let mut expression = self.expression;
        expression.complete(self.ctx)
    }
}

/// Builder for CREATE TABLE.
///
/// Column modifiers apply to the most recently added column.
#[must_use = "expressions do nothing until `execute` is called"]
pub struct CreateTableBuilder<'c, 's> {
    ctx: &'c mut MigrationContext<'s>,
    table: String,
    columns: Vec<ColumnDefinition>,
    indexes: Vec<IndexDefinition>,
}

impl CreateTableBuilder<'_, '_> {
    /// Add a nullable column.
    pub fn column(mut self, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        self.columns.push(ColumnDefinition::new(name, sql_type));
        self
    }

    /// Make the last column NOT NULL.
    pub fn not_null(mut self) -> Self {
        if let Some(column) = self.columns.last_mut() {
            column.nullable = false;
        }
        self
    }

    /// Make the last column part of the primary key.
    pub fn primary_key(mut self) -> Self {
        if let Some(column) = self.columns.last_mut() {
            column.primary_key = true;
            column.nullable = false;
        }
        self
    }

    /// Set a default value expression on the last column.
    pub fn default_value(mut self, sql: impl Into<String>) -> Self {
        if let Some(column) = self.columns.last_mut() {
            column.default = Some(sql.into());
        }
        self
    }

    /// Index the last column, as a child expression.
    pub fn indexed(mut self) -> Self {
        if let Some(column) = self.columns.last() {
            self.indexes.push(IndexDefinition {
                name: format!("IX_{}_{}", self.table, column.name),
                table: self.table.clone(),
                columns: vec![column.name.clone()],
                unique: false,
            });
        }
        self
    }

    /// Create the table, then its indexes.
    pub fn execute(self) -> Result<(), MigrationError> {
        let mut expression = Expression::new(Operation::CreateTable {
            table: self.table,
            columns: self.columns,
        });
        for index in self.indexes {
            expression = expression.with_child(Expression::new(Operation::CreateIndex(index)));
        }
        expression.complete(self.ctx)
    }
}

/// Builder for ALTER TABLE.
#[must_use = "expressions do nothing until `execute` is called"]
pub struct AlterTableBuilder<'c, 's> {
    ctx: &'c mut MigrationContext<'s>,
    table: String,
    alterations: Vec<Alteration>,
}

impl AlterTableBuilder<'_, '_> {
    /// Add a nullable column.
    pub fn add_column(mut self, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        self.alterations
            .push(Alteration::AddColumn(ColumnDefinition::new(name, sql_type)));
        self
    }

    /// Make the column added last NOT NULL.
    pub fn not_null(mut self) -> Self {
        if let Some(Alteration::AddColumn(column)) = self.alterations.last_mut() {
            column.nullable = false;
        }
        self
    }

    /// Set a default value expression on the column added last.
    pub fn default_value(mut self, sql: impl Into<String>) -> Self {
        if let Some(Alteration::AddColumn(column)) = self.alterations.last_mut() {
            column.default = Some(sql.into());
        }
        self
    }

    /// Drop a column.
    pub fn drop_column(mut self, name: impl Into<String>) -> Self {
        self.alterations.push(Alteration::DropColumn(name.into()));
        self
    }

    /// Rename a column.
    pub fn rename_column(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.alterations.push(Alteration::RenameColumn {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Apply the alterations in order.
    pub fn execute(self) -> Result<(), MigrationError> {
        let mut expression = Expression::new(Operation::AlterTable {
            table: self.table,
            alterations: self.alterations,
        });
        expression.complete(self.ctx)
    }
}

/// Builder for CREATE INDEX.
#[must_use = "expressions do nothing until `execute` is called"]
pub struct CreateIndexBuilder<'c, 's> {
    ctx: &'c mut MigrationContext<'s>,
    index: IndexDefinition,
}

impl CreateIndexBuilder<'_, '_> {
    /// Set the indexed table.
    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.index.table = table.into();
        self
    }

    /// Add an indexed column.
    pub fn on_column(mut self, column: impl Into<String>) -> Self {
        self.index.columns.push(column.into());
        self
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.index.unique = true;
        self
    }

    /// Create the index.
    pub fn execute(self) -> Result<(), MigrationError> {
        Expression::new(Operation::CreateIndex(self.index)).complete(self.ctx)
    }
}

/// Builder for DROP INDEX.
#[must_use = "expressions do nothing until `execute` is called"]
pub struct DropIndexBuilder<'c, 's> {
    ctx: &'c mut MigrationContext<'s>,
    name: String,
    table: String,
}

impl DropIndexBuilder<'_, '_> {
    /// Set the table the index belongs to.
    pub fn on_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Drop the index.
    pub fn execute(self) -> Result<(), MigrationError> {
        Expression::new(Operation::DropIndex {
            name: self.name,
            table: self.table,
        })
        .complete(self.ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Dialect, MemoryStore};

    #[test]
    fn test_create_table_with_index_child() {
        let mut store = MemoryStore::new(Dialect::sqlite());
        {
            let mut ctx = MigrationContext::new(&mut store, "test");
            ctx.create_table("users")
                .unwrap()
                .column("id", "INTEGER")
                .primary_key()
                .column("email", "TEXT")
                .not_null()
                .indexed()
                .column("active", "INTEGER")
                .default_value("1")
                .execute()
                .unwrap();
            assert!(!ctx.is_building_expression());
            assert_eq!(ctx.index(), 2);
        }
        assert_eq!(
            store.committed(),
            [
                "CREATE TABLE \"users\" (\"id\" INTEGER NOT NULL PRIMARY KEY, \"email\" TEXT NOT NULL, \"active\" INTEGER NULL DEFAULT 1)",
                "CREATE INDEX \"IX_users_email\" ON \"users\" (\"email\")",
            ]
        );
    }

    #[test]
    fn test_alter_table_emits_one_statement_per_change() {
        let mut store = MemoryStore::new(Dialect::mysql());
        {
            let mut ctx = MigrationContext::new(&mut store, "test");
            ctx.alter_table("users")
                .unwrap()
                .add_column("age", "INT")
                .not_null()
                .default_value("0")
                .drop_column("legacy")
                .rename_column("mail", "email")
                .execute()
                .unwrap();
        }
        assert_eq!(
            store.committed(),
            [
                "ALTER TABLE `users` ADD COLUMN `age` INT NOT NULL DEFAULT 0",
                "ALTER TABLE `users` DROP COLUMN `legacy`",
                "ALTER TABLE `users` RENAME COLUMN `mail` TO `email`",
            ]
        );
    }

    #[test]
    fn test_dropped_builder_blocks_next_builder() {
        let mut store = MemoryStore::new(Dialect::sqlite());
        let mut ctx = MigrationContext::new(&mut store, "test");

        let forgotten = ctx.drop_table("old").unwrap();
        drop(forgotten);

        assert!(ctx.is_building_expression());
        assert!(matches!(
            ctx.execute_sql("SELECT 1"),
            Err(MigrationError::IncompleteBuild)
        ));
        assert_eq!(ctx.statements_sent(), 0);
    }

    #[test]
    fn test_unique_index() {
        let mut store = MemoryStore::new(Dialect::postgres());
        {
            let mut ctx = MigrationContext::new(&mut store, "test");
            ctx.create_index("ux_users_email")
                .unwrap()
                .on_table("users")
                .on_column("email")
                .unique()
                .execute()
                .unwrap();
            ctx.drop_index("ix_old")
                .unwrap()
                .on_table("users")
                .execute()
                .unwrap();
        }
        assert_eq!(
            store.committed(),
            [
                "CREATE UNIQUE INDEX \"ux_users_email\" ON \"users\" (\"email\")",
                "DROP INDEX \"ix_old\"",
            ]
        );
    }

    #[test]
    fn test_execute_sql_with_child() {
        let mut store = MemoryStore::new(Dialect::sqlite());
        {
            let mut ctx = MigrationContext::new(&mut store, "test");
            ctx.execute_sql("UPDATE a SET x = 1\nGO\nUPDATE b SET y = 2")
                .unwrap()
                .with_child(Expression::new(Operation::DropTable {
                    table: "c".to_string(),
                }))
                .execute()
                .unwrap();
            assert_eq!(ctx.statements_sent(), 3);
        }
        assert_eq!(
            store.committed(),
            ["UPDATE a SET x = 1", "UPDATE b SET y = 2", "DROP TABLE \"c\""]
        );
    }
}
