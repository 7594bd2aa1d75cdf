//! Upgrader: runs a plan against a store and remembers where it got to.

use serde::Serialize;
use tracing::{debug, info, instrument};

use super::error::MigrationError;
use super::plan::Plan;
use super::state::{StateStore, UpgradeState};
use crate::store::{Scope, Store};

/// Default prefix of upgrader state keys.
pub const DEFAULT_STATE_KEY_PREFIX: &str = "migraph.upgrader.state+";

/// Upgrader configuration.
#[derive(Debug, Clone)]
pub struct UpgradeConfig {
    /// Prefix prepended to the plan name to form the state key.
    pub state_key_prefix: String,
    /// Run the plan's post-migrations after the walk.
    pub run_post_migrations: bool,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            state_key_prefix: DEFAULT_STATE_KEY_PREFIX.to_string(),
            run_post_migrations: true,
        }
    }
}

impl UpgradeConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state key prefix.
    pub fn with_state_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.state_key_prefix = prefix.into();
        self
    }

    /// Enable or disable post-migrations.
    pub fn with_post_migrations(mut self, enabled: bool) -> Self {
        self.run_post_migrations = enabled;
        self
    }
}

/// Summary of an upgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeResult {
    /// Plan name.
    pub plan: String,
    /// State the upgrade started from.
    pub from_state: String,
    /// State the upgrade reached and recorded.
    pub final_state: String,
    /// Transitions run whose step was not a no-op.
    pub steps_applied: usize,
    /// Post-migrations run.
    pub post_migrations: Vec<String>,
    /// Statement batches sent.
    pub statements_sent: usize,
}

/// Runs a plan inside a transaction scope and records the state reached.
///
/// The recorded state lives under `state_key_prefix + plan name`. With no
/// record the run starts from the plan's initial state.
pub struct Upgrader {
    plan: Plan,
    config: UpgradeConfig,
}

impl Upgrader {
    /// Create an upgrader with the default configuration.
    pub fn new(plan: Plan) -> Self {
        Self::with_config(plan, UpgradeConfig::default())
    }

    /// Create an upgrader with a custom configuration.
    pub fn with_config(plan: Plan, config: UpgradeConfig) -> Self {
        Self { plan, config }
    }

    /// The plan being run.
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Key the state is recorded under.
    pub fn state_key(&self) -> String {
        format!("{}{}", self.config.state_key_prefix, self.plan.name())
    }

    /// State the next run would start from.
    pub fn current_state(&self, states: &dyn StateStore) -> Result<String, MigrationError> {
        Ok(states
            .get(&self.state_key())?
            .map(|record| record.state)
            .unwrap_or_else(|| self.plan.initial_state().to_string()))
    }

    /// Run the plan from the recorded state to its final state.
    ///
    /// The run is committed before the new state is recorded. On failure
    /// nothing is recorded and the scope rolls back.
    pub fn execute(
        &self,
        store: &mut dyn Store,
        states: &dyn StateStore,
    ) -> Result<UpgradeResult, MigrationError> {
        self.execute_from(store, states, None)
    }

    /// Run the plan from `from`, or from the recorded state when `from` is
    /// `None`.
    ///
    /// An explicit starting state is not written anywhere; only the state
    /// reached by a committed run is recorded.
    #[instrument(skip(self, store, states), fields(plan = %self.plan.name()))]
    pub fn execute_from(
        &self,
        store: &mut dyn Store,
        states: &dyn StateStore,
        from: Option<&str>,
    ) -> Result<UpgradeResult, MigrationError> {
        let key = self.state_key();
        let fingerprint = self.plan.fingerprint();

        let from_state = match from.map(str::trim) {
            Some(state) => {
                if !self.plan.contains_state(state) {
                    return Err(MigrationError::UnknownState {
                        plan: self.plan.name().to_string(),
                        state: state.to_string(),
                    });
                }
                debug!(key = %key, state = %state, "Starting from an explicit state");
                state.to_string()
            }
            None => match states.get(&key)? {
                Some(record) => {
                    if record.fingerprint != fingerprint {
                        debug!(key = %key, "Plan changed since the last recorded run");
                    }
                    record.state
                }
                None => self.plan.initial_state().to_string(),
            },
        };

        let mut scope = Scope::begin(store)?;
        let execution = self.plan.execute_with(
            scope.store(),
            &from_state,
            self.config.run_post_migrations,
        )?;
        scope.complete()?;

        states.set(
            &key,
            &UpgradeState::new(self.plan.name(), &execution.final_state, fingerprint),
        )?;

        info!(
            from = %execution.from_state,
            to = %execution.final_state,
            steps = execution.applied_steps(),
            "Upgrade complete"
        );

        Ok(UpgradeResult {
            plan: execution.plan.clone(),
            from_state: execution.from_state.clone(),
            final_state: execution.final_state.clone(),
            steps_applied: execution.applied_steps(),
            post_migrations: execution.post_migrations,
            statements_sent: execution.statements_sent,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::migration::state::MemoryStateStore;
    use crate::migration::{MigrationContext, MigrationStep, StepRegistry, StepType};
    use crate::store::{Dialect, MemoryStore};

    #[derive(Default)]
    struct CreateNodes;
    impl MigrationStep for CreateNodes {
        fn migrate(&mut self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
            ctx.create_table("nodes")?
                .column("id", "INTEGER")
                .primary_key()
                .execute()
        }
    }

    #[derive(Default)]
    struct AddNodeName;
    impl MigrationStep for AddNodeName {
        fn migrate(&mut self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
            ctx.alter_table("nodes")?.add_column("name", "TEXT").execute()
        }
    }

    #[derive(Default)]
    struct RebuildCache;
    impl MigrationStep for RebuildCache {
        fn migrate(&mut self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
            ctx.execute_sql("DELETE FROM cache")?.execute()
        }
    }

    fn plan() -> Plan {
        let mut registry = StepRegistry::new();
        registry
            .register::<CreateNodes>()
            .register::<AddNodeName>()
            .register::<RebuildCache>();
        let mut plan = Plan::with_factory("cms", Arc::new(registry));
        plan.chain("{A}", StepType::of::<CreateNodes>())
            .unwrap()
            .chain("{B}", StepType::of::<AddNodeName>())
            .unwrap();
        plan.add_post_migration(StepType::of::<RebuildCache>());
        plan
    }

    #[test]
    fn test_first_run_starts_from_initial_state() {
        let upgrader = Upgrader::new(plan());
        let mut store = MemoryStore::new(Dialect::sqlite());
        let states = MemoryStateStore::new();

        let result = upgrader.execute(&mut store, &states).unwrap();

        assert_eq!(result.from_state, "");
        assert_eq!(result.final_state, "{B}");
        assert_eq!(result.steps_applied, 2);
        assert_eq!(result.post_migrations, vec!["RebuildCache"]);
        assert_eq!(store.committed().len(), 3);

        let record = states.get("migraph.upgrader.state+cms").unwrap().unwrap();
        assert_eq!(record.state, "{B}");
        assert_eq!(record.fingerprint, upgrader.plan().fingerprint());
    }

    #[test]
    fn test_second_run_is_noop() {
        let upgrader = Upgrader::new(plan());
        let mut store = MemoryStore::new(Dialect::sqlite());
        let states = MemoryStateStore::new();

        upgrader.execute(&mut store, &states).unwrap();
        let executed = store.executed();
        let result = upgrader.execute(&mut store, &states).unwrap();

        assert_eq!(result.steps_applied, 0);
        assert!(result.post_migrations.is_empty());
        assert_eq!(store.executed(), executed);
    }

    #[test]
    fn test_resumes_from_recorded_state() {
        let upgrader = Upgrader::with_config(
            plan(),
            UpgradeConfig::new()
                .with_state_key_prefix("app:")
                .with_post_migrations(false),
        );
        let mut store = MemoryStore::new(Dialect::postgres());
        let states = MemoryStateStore::new();
        states
            .set("app:cms", &UpgradeState::new("cms", "{A}", "old"))
            .unwrap();

        let result = upgrader.execute(&mut store, &states).unwrap();

        assert_eq!(result.from_state, "{A}");
        assert_eq!(result.steps_applied, 1);
        assert_eq!(
            store.committed(),
            ["ALTER TABLE \"nodes\" ADD COLUMN \"name\" TEXT NULL"]
        );
        assert_eq!(upgrader.current_state(&states).unwrap(), "{B}");
    }

    #[test]
    fn test_unknown_recorded_state_fails_without_io() {
        let upgrader = Upgrader::new(plan());
        let mut store = MemoryStore::new(Dialect::sqlite());
        let states = MemoryStateStore::new();
        states
            .set(&upgrader.state_key(), &UpgradeState::new("cms", "{Z}", "f"))
            .unwrap();

        let err = upgrader.execute(&mut store, &states).unwrap_err();

        assert!(matches!(err, MigrationError::UnknownState { .. }));
        assert_eq!(store.executed(), 0);
        assert_eq!(upgrader.current_state(&states).unwrap(), "{Z}");
    }

    #[test]
    fn test_explicit_start_state_overrides_record() {
        let upgrader = Upgrader::new(plan());
        let mut store = MemoryStore::new(Dialect::postgres());
        let states = MemoryStateStore::new();
        states
            .set(&upgrader.state_key(), &UpgradeState::new("cms", "", "f"))
            .unwrap();

        let result = upgrader
            .execute_from(&mut store, &states, Some(" {A} "))
            .unwrap();

        assert_eq!(result.from_state, "{A}");
        assert_eq!(result.steps_applied, 1);
        assert_eq!(upgrader.current_state(&states).unwrap(), "{B}");
    }

    #[test]
    fn test_failed_run_from_explicit_state_records_nothing() {
        let upgrader = Upgrader::new(plan());
        let mut store = MemoryStore::new(Dialect::postgres()).fail_on("ADD COLUMN");
        let states = MemoryStateStore::new();

        let err = upgrader
            .execute_from(&mut store, &states, Some("{A}"))
            .unwrap_err();

        assert!(matches!(err, MigrationError::StepFailed { ref state, .. } if state == "{A}"));
        assert!(states.get(&upgrader.state_key()).unwrap().is_none());
        assert_eq!(upgrader.current_state(&states).unwrap(), "");
    }

    #[test]
    fn test_unknown_explicit_state_fails_without_io() {
        let upgrader = Upgrader::new(plan());
        let mut store = MemoryStore::new(Dialect::sqlite());
        let states = MemoryStateStore::new();

        let err = upgrader
            .execute_from(&mut store, &states, Some("{Z}"))
            .unwrap_err();

        assert!(matches!(err, MigrationError::UnknownState { ref state, .. } if state == "{Z}"));
        assert_eq!(store.executed(), 0);
        assert_eq!(store.rollbacks(), 0);
        assert!(states.get(&upgrader.state_key()).unwrap().is_none());
    }

    #[test]
    fn test_failure_rolls_back_and_keeps_state() {
        let upgrader = Upgrader::new(plan());
        let mut store = MemoryStore::new(Dialect::postgres()).fail_on("ADD COLUMN");
        let states = MemoryStateStore::new();

        let err = upgrader.execute(&mut store, &states).unwrap_err();

        assert!(matches!(err, MigrationError::StepFailed { ref state, .. } if state == "{A}"));
        assert!(store.committed().is_empty());
        assert_eq!(store.rollbacks(), 1);
        assert!(states.get(&upgrader.state_key()).unwrap().is_none());
    }
}
