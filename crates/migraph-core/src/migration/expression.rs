//! Deferred database operations with at-most-once execution.

use tracing::debug;

use super::context::MigrationContext;
use super::error::MigrationError;
use crate::store::Dialect;

/// Split a script into batches on `GO` separator lines.
///
/// Lines are trimmed; empty batches are dropped.
pub fn split_batches(script: &str) -> Vec<String> {
    let mut batches = Vec::new();
    let mut current = String::new();

    for line in script.lines() {
        let line = line.trim();
        if line.eq_ignore_ascii_case("GO") {
            flush_batch(&mut batches, &mut current);
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    flush_batch(&mut batches, &mut current);

    batches
}

fn flush_batch(batches: &mut Vec<String>, current: &mut String) {
    let batch = current.trim();
    if !batch.is_empty() {
        batches.push(batch.to_string());
    }
    current.clear();
}

/// A column in a table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Column type, passed through to the store verbatim.
    pub sql_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
    /// Default value expression, verbatim.
    pub default: Option<String>,
}

impl ColumnDefinition {
    /// A nullable column.
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            nullable: true,
            primary_key: false,
            default: None,
        }
    }

    fn to_sql(&self, dialect: &Dialect, inline_primary_key: bool) -> String {
        let mut sql = format!("{} {}", dialect.quote(&self.name), self.sql_type);
        sql.push_str(if self.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        if inline_primary_key && self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        sql
    }
}

/// An index definition.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexDefinition {
    /// Index name.
    pub name: String,
    /// Indexed table.
    pub table: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    pub unique: bool,
}

/// One change within an ALTER TABLE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alteration {
    /// Add a column.
    AddColumn(ColumnDefinition),
    /// Drop a column.
    DropColumn(String),
    /// Rename a column.
    RenameColumn {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
}

/// A database operation wrapped by an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// A raw script, possibly containing `GO` separators.
    Sql(String),
    /// Create a table.
    CreateTable {
        /// Table name.
        table: String,
        /// Columns, in order.
        columns: Vec<ColumnDefinition>,
    },
    /// Alter a table.
    AlterTable {
        /// Table name.
        table: String,
        /// Changes, in order.
        alterations: Vec<Alteration>,
    },
    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
    },
    /// Create an index.
    CreateIndex(IndexDefinition),
    /// Drop an index.
    DropIndex {
        /// Index name.
        name: String,
        /// Table the index belongs to.
        table: String,
    },
}

impl Operation {
    /// Translate the operation into statements for a dialect.
    pub fn statements(&self, dialect: &Dialect) -> Result<Vec<String>, MigrationError> {
        let q = |name: &str| dialect.quote(name);

        let statements = match self {
            Operation::Sql(sql) => vec![sql.clone()],
            Operation::CreateTable { table, columns } => {
                if columns.is_empty() {
                    return Err(MigrationError::step(format!(
                        "table {} has no columns",
                        table
                    )));
                }
                let keys: Vec<&ColumnDefinition> =
                    columns.iter().filter(|c| c.primary_key).collect();
                let inline = keys.len() == 1;
                let mut parts: Vec<String> =
                    columns.iter().map(|c| c.to_sql(dialect, inline)).collect();
                if keys.len() > 1 {
                    let names: Vec<String> = keys.iter().map(|c| q(&c.name)).collect();
                    parts.push(format!("PRIMARY KEY ({})", names.join(", ")));
                }
                vec![format!("CREATE TABLE {} ({})", q(table), parts.join(", "))]
            }
            Operation::AlterTable { table, alterations } => alterations
                .iter()
                .map(|alteration| match alteration {
                    Alteration::AddColumn(column) => format!(
                        "ALTER TABLE {} ADD COLUMN {}",
                        q(table),
                        column.to_sql(dialect, true)
                    ),
                    Alteration::DropColumn(column) => {
                        format!("ALTER TABLE {} DROP COLUMN {}", q(table), q(column))
                    }
                    Alteration::RenameColumn { from, to } => format!(
                        "ALTER TABLE {} RENAME COLUMN {} TO {}",
                        q(table),
                        q(from),
                        q(to)
                    ),
                })
                .collect(),
            Operation::DropTable { table } => vec![format!("DROP TABLE {}", q(table))],
            Operation::CreateIndex(index) => {
                if index.table.is_empty() || index.columns.is_empty() {
                    return Err(MigrationError::step(format!(
                        "index {} needs a table and at least one column",
                        index.name
                    )));
                }
                let columns: Vec<String> = index.columns.iter().map(|c| q(c)).collect();
                vec![format!(
                    "CREATE {}INDEX {} ON {} ({})",
                    if index.unique { "UNIQUE " } else { "" },
                    q(&index.name),
                    q(&index.table),
                    columns.join(", ")
                )]
            }
            Operation::DropIndex { name, table } => {
                if dialect.mysql_like {
                    vec![format!("DROP INDEX {} ON {}", q(name), q(table))]
                } else {
                    vec![format!("DROP INDEX {}", q(name))]
                }
            }
        };

        Ok(statements)
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match self {
            Operation::Sql(_) => "execute sql".to_string(),
            Operation::CreateTable { table, .. } => format!("create table {}", table),
            Operation::AlterTable { table, .. } => format!("alter table {}", table),
            Operation::DropTable { table } => format!("drop table {}", table),
            Operation::CreateIndex(index) => format!("create index {}", index.name),
            Operation::DropIndex { name, .. } => format!("drop index {}", name),
        }
    }
}

/// A single deferred operation, executed at most once.
///
/// Child expressions run right after their parent, in the order they were
/// attached.
#[derive(Debug)]
pub struct Expression {
    operation: Operation,
    children: Vec<Expression>,
    executed: bool,
}

impl Expression {
    /// Wrap an operation.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            children: Vec::new(),
            executed: false,
        }
    }

    /// Attach a child expression.
    pub fn with_child(mut self, child: Expression) -> Self {
        self.children.push(child);
        self
    }

    /// The wrapped operation.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Attached child expressions.
    pub fn children(&self) -> &[Expression] {
        &self.children
    }

    /// Whether the expression has run.
    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Run the operation against the context, then the children.
    ///
    /// Fails with `IncompleteBuild` while a builder started on the same
    /// context has not been executed.
    pub fn execute(&mut self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        if self.executed {
            return Err(MigrationError::AlreadyExecuted);
        }
        ctx.begin_expression()?;
        self.complete(ctx)
    }

    /// Run an expression whose builder already marked the context as
    /// pending, clearing the flag.
    pub(crate) fn complete(&mut self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        if self.executed {
            return Err(MigrationError::AlreadyExecuted);
        }
        self.executed = true;
        ctx.end_expression();
        debug!(index = ctx.index(), operation = %self.operation.describe(), "Executing expression");

        for statement in self.operation.statements(ctx.dialect())? {
            ctx.execute_statement(&statement)?;
        }
        ctx.advance();

        for child in &mut self.children {
            child.complete(ctx)?;
        }
        Ok(())
    }
}
