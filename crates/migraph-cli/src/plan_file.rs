//! JSON plan definitions.
//!
//! ```json
//! {
//!   "name": "cms",
//!   "steps": {
//!     "CreateContent": { "sql": "CREATE TABLE content (id INTEGER PRIMARY KEY)" },
//!     "AddTitle": { "sql": "ALTER TABLE content ADD COLUMN title TEXT" }
//!   },
//!   "transitions": [
//!     { "to": "{C1}", "step": "CreateContent" },
//!     { "to": "{C2}", "step": "AddTitle" }
//!   ],
//!   "post_migrations": []
//! }
//! ```
//!
//! A transition without `from` continues from the previous target; one
//! without `step` is a no-op.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use migraph_core::migration::{
    MigrationContext, MigrationError, MigrationStep, Plan, StepRegistry, StepType,
};
use serde::Deserialize;

use crate::error::CliError;

/// A plan as written on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanFile {
    /// Plan name.
    pub name: String,
    /// State a fresh database starts from.
    #[serde(default)]
    pub initial_state: String,
    /// Script steps by name.
    #[serde(default)]
    pub steps: BTreeMap<String, ScriptDef>,
    /// Transitions in chain order.
    pub transitions: Vec<TransitionDef>,
    /// Steps run once after any run that moved the schema.
    #[serde(default)]
    pub post_migrations: Vec<String>,
}

/// A step defined by a SQL script.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptDef {
    /// The script. `GO` lines separate batches.
    pub sql: String,
}

/// One transition.
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionDef {
    /// Source state; defaults to the previous target.
    #[serde(default)]
    pub from: Option<String>,
    /// Target state.
    pub to: String,
    /// Step name; omitted for a no-op.
    #[serde(default)]
    pub step: Option<String>,
}

/// Runs a SQL script as a migration step.
struct ScriptStep {
    sql: Arc<str>,
}

impl MigrationStep for ScriptStep {
    fn migrate(&mut self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        ctx.execute_sql(self.sql.as_ref())?.execute()
    }
}

impl PlanFile {
    /// Read a plan file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse a plan definition.
    pub fn parse(content: &str) -> Result<Self, CliError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Build the executable plan.
    pub fn build(&self) -> Result<Plan, CliError> {
        let mut registry = StepRegistry::new();
        for (name, script) in &self.steps {
            let sql: Arc<str> = Arc::from(script.sql.as_str());
            registry.register_with(StepType::named(name), move |_| {
                Box::new(ScriptStep { sql: sql.clone() })
            });
        }
        let registry = Arc::new(registry);

        let mut plan =
            Plan::with_factory(&self.name, registry.clone()).with_initial_state(&self.initial_state);
        for transition in &self.transitions {
            let step = match &transition.step {
                Some(name) => registry.step_type(name)?,
                None => StepType::noop(),
            };
            if let Some(from) = &transition.from {
                plan.from(from);
            }
            plan.chain(&transition.to, step)?;
        }
        for name in &self.post_migrations {
            plan.add_post_migration(registry.step_type(name)?);
        }

        plan.validate()?;
        Ok(plan)
    }
}
