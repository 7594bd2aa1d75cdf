//! Command implementations.

use std::path::Path;

use migraph_core::migration::{SledStateStore, StateStore, UpgradeConfig, Upgrader};
use migraph_core::store::SqliteStore;
use serde::Serialize;
use tracing::info;

use crate::error::CliError;
use crate::output::{render, state_label, OutputFormat};
use crate::plan_file::PlanFile;

#[derive(Debug, Serialize)]
struct ValidateReport {
    plan: String,
    initial_state: String,
    final_state: String,
    states: usize,
    fingerprint: String,
}

/// Load and validate a plan.
pub fn validate(plan_path: &Path, format: OutputFormat) -> Result<String, CliError> {
    let plan = PlanFile::load(plan_path)?.build()?;
    let report = ValidateReport {
        plan: plan.name().to_string(),
        initial_state: plan.initial_state().to_string(),
        final_state: plan.final_state()?.to_string(),
        states: plan.states().count(),
        fingerprint: plan.fingerprint(),
    };
    render(format, &report, |r| {
        format!(
            "Plan {} is valid: {} states, final state {}",
            r.plan, r.states, r.final_state
        )
    })
}

#[derive(Debug, Serialize)]
struct PathReport {
    plan: String,
    states: Vec<String>,
}

/// Print the states between two states.
pub fn path(
    plan_path: &Path,
    from: &str,
    to: Option<&str>,
    format: OutputFormat,
) -> Result<String, CliError> {
    let plan = PlanFile::load(plan_path)?.build()?;
    let report = PathReport {
        plan: plan.name().to_string(),
        states: plan.follow_path(from, to)?,
    };
    render(format, &report, |r| {
        r.states
            .iter()
            .map(|s| state_label(s))
            .collect::<Vec<_>>()
            .join(" -> ")
    })
}

#[derive(Debug, Serialize)]
struct StatusReport {
    plan: String,
    key: String,
    recorded: bool,
    state: String,
    final_state: String,
    pending: Vec<String>,
    plan_changed: bool,
}

/// Show where a plan's recorded state stands.
pub fn status(
    plan_path: &Path,
    state_path: &Path,
    format: OutputFormat,
) -> Result<String, CliError> {
    let plan = PlanFile::load(plan_path)?.build()?;
    let db = sled::open(state_path)?;
    let states = SledStateStore::open(&db)?;
    let upgrader = Upgrader::new(plan);

    let key = upgrader.state_key();
    let record = states.get(&key)?;
    let state = upgrader.current_state(&states)?;
    let plan = upgrader.plan();
    let path = plan.follow_path(&state, None)?;

    let report = StatusReport {
        plan: plan.name().to_string(),
        key,
        recorded: record.is_some(),
        state: state.clone(),
        final_state: plan.final_state()?.to_string(),
        pending: path.into_iter().skip(1).collect(),
        plan_changed: record.is_some_and(|r| r.fingerprint != plan.fingerprint()),
    };
    render(format, &report, |r| {
        let mut line = format!(
            "Plan {} at {}, {} state(s) pending",
            r.plan,
            state_label(&r.state),
            r.pending.len()
        );
        if r.plan_changed {
            line.push_str(" (plan changed since last run)");
        }
        line
    })
}

/// Options of the upgrade command.
#[derive(Debug, Clone)]
pub struct UpgradeOptions<'a> {
    /// Plan file.
    pub plan: &'a Path,
    /// SQLite database file.
    pub database: &'a Path,
    /// Directory of the sled state store.
    pub state_path: &'a Path,
    /// State to start from instead of the recorded one.
    pub from: Option<&'a str>,
    /// Skip post-migrations.
    pub skip_post_migrations: bool,
}

/// Upgrade a SQLite database to the plan's final state.
pub fn upgrade(options: &UpgradeOptions<'_>, format: OutputFormat) -> Result<String, CliError> {
    let plan = PlanFile::load(options.plan)?.build()?;
    let mut store = SqliteStore::open(options.database)?;
    let db = sled::open(options.state_path)?;
    let states = SledStateStore::open(&db)?;

    let upgrader = Upgrader::with_config(
        plan,
        UpgradeConfig::new().with_post_migrations(!options.skip_post_migrations),
    );

    if let Some(from) = options.from {
        info!(state = %state_label(from.trim()), "Starting from an explicit state");
    }

    let result = upgrader.execute_from(&mut store, &states, options.from);
    states.flush()?;
    let result = result?;

    render(format, &result, |r| {
        if r.steps_applied == 0 && r.from_state == r.final_state {
            format!("Plan {} is up to date at {}", r.plan, state_label(&r.final_state))
        } else {
            format!(
                "Upgraded plan {} from {} to {} ({} step(s), {} statement(s))",
                r.plan,
                state_label(&r.from_state),
                state_label(&r.final_state),
                r.steps_applied,
                r.statements_sent
            )
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use migraph_core::migration::MigrationError;

    const PLAN: &str = r#"{
        "name": "cms",
        "steps": {
            "CreateContent": { "sql": "CREATE TABLE content (id INTEGER PRIMARY KEY)" },
            "AddTitle": { "sql": "ALTER TABLE content ADD COLUMN title TEXT" }
        },
        "transitions": [
            { "to": "{C1}", "step": "CreateContent" },
            { "to": "{C2}", "step": "AddTitle" }
        ]
    }"#;

    struct Workspace {
        dir: tempfile::TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join("plan.json"), PLAN).unwrap();
            Self { dir }
        }

        fn plan(&self) -> std::path::PathBuf {
            self.dir.path().join("plan.json")
        }

        fn database(&self) -> std::path::PathBuf {
            self.dir.path().join("app.db")
        }

        fn state(&self) -> std::path::PathBuf {
            self.dir.path().join("state")
        }
    }

    #[test]
    fn test_validate_and_path() {
        let ws = Workspace::new();

        let out = validate(&ws.plan(), OutputFormat::Text).unwrap();
        assert_eq!(out, "Plan cms is valid: 3 states, final state {C2}");

        let out = path(&ws.plan(), "", None, OutputFormat::Text).unwrap();
        assert_eq!(out, "(origin) -> {C1} -> {C2}");
    }

    #[test]
    fn test_upgrade_then_status() {
        let ws = Workspace::new();
        let (plan, database, state) = (ws.plan(), ws.database(), ws.state());
        let options = UpgradeOptions {
            plan: &plan,
            database: &database,
            state_path: &state,
            from: None,
            skip_post_migrations: false,
        };

        let out = upgrade(&options, OutputFormat::Text).unwrap();
        assert_eq!(
            out,
            "Upgraded plan cms from (origin) to {C2} (2 step(s), 2 statement(s))"
        );

        let out = upgrade(&options, OutputFormat::Text).unwrap();
        assert_eq!(out, "Plan cms is up to date at {C2}");

        let out = status(&plan, &state, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["state"], "{C2}");
        assert_eq!(value["pending"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn test_failed_upgrade_from_state_records_nothing() {
        let ws = Workspace::new();
        std::fs::write(
            ws.plan(),
            r#"{
                "name": "cms",
                "steps": {
                    "CreateContent": { "sql": "CREATE TABLE content (id INTEGER PRIMARY KEY)" },
                    "FillMissing": { "sql": "INSERT INTO missing VALUES (1)" }
                },
                "transitions": [
                    { "to": "{C1}", "step": "CreateContent" },
                    { "to": "{C2}", "step": "FillMissing" }
                ]
            }"#,
        )
        .unwrap();
        let (plan, database, state) = (ws.plan(), ws.database(), ws.state());
        let options = UpgradeOptions {
            plan: &plan,
            database: &database,
            state_path: &state,
            from: Some("{C1}"),
            skip_post_migrations: false,
        };

        assert!(matches!(
            upgrade(&options, OutputFormat::Text),
            Err(CliError::Migration(MigrationError::StepFailed { .. }))
        ));

        let out = status(&plan, &state, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["recorded"], false);
        assert_eq!(value["state"], "");
        assert_eq!(value["pending"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_upgrade_from_unknown_state_fails() {
        let ws = Workspace::new();
        let (plan, database, state) = (ws.plan(), ws.database(), ws.state());
        let options = UpgradeOptions {
            plan: &plan,
            database: &database,
            state_path: &state,
            from: Some("{nope}"),
            skip_post_migrations: false,
        };

        assert!(matches!(
            upgrade(&options, OutputFormat::Text),
            Err(CliError::Migration(MigrationError::UnknownState { .. }))
        ));
    }
}
