//! Version-filtered migration runner.
//!
//! Picks the registered steps whose target version lies between the
//! current and the target product version, runs them in one transaction,
//! and records the reached version.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::context::MigrationContext;
use super::error::MigrationError;
use super::executor::{classify_failure, run_step, Direction};
use super::step::{StepMetadata, StepRegistry, StepType};
use super::version::SemVersion;
use crate::store::{Scope, Store};

/// Default table holding applied-version markers.
pub const DEFAULT_VERSION_TABLE: &str = "migraph_versions";

/// Runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Product whose steps are run.
    pub product: String,
    /// Version the database is at.
    pub current_version: SemVersion,
    /// Version to migrate to.
    pub target_version: SemVersion,
    /// Table that records applied versions.
    pub version_table: String,
}

impl RunnerConfig {
    /// Create a configuration for migrating a product between versions.
    pub fn new(
        product: impl Into<String>,
        current_version: SemVersion,
        target_version: SemVersion,
    ) -> Self {
        Self {
            product: product.into(),
            current_version,
            target_version,
            version_table: DEFAULT_VERSION_TABLE.to_string(),
        }
    }

    /// Set the version table name.
    pub fn with_version_table(mut self, table: impl Into<String>) -> Self {
        self.version_table = table.into();
        self
    }

    /// Whether this configuration upgrades.
    pub fn is_upgrade(&self) -> bool {
        self.target_version >= self.current_version
    }
}

/// What a run is about to do, or did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationEvent {
    /// Product being migrated.
    pub product: String,
    /// Version before the run.
    pub current_version: SemVersion,
    /// Version after the run.
    pub target_version: SemVersion,
    /// Direction of the run.
    pub direction: Direction,
    /// Steps in run order.
    pub steps: Vec<StepType>,
}

/// Answer of the pre-run hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    /// Run the migration.
    Proceed,
    /// Skip the migration.
    Cancel {
        /// Why the run was cancelled.
        reason: String,
    },
}

/// Callbacks around a run.
pub trait MigrationHooks {
    /// Called before anything runs. Cancelling aborts the run without error.
    fn before_migrate(&mut self, event: &MigrationEvent) -> HookDecision {
        let _ = event;
        HookDecision::Proceed
    }

    /// Called after the run committed.
    fn after_migrate(&mut self, event: &MigrationEvent, report: &RunReport) {
        let _ = (event, report);
    }
}

/// Hooks that never cancel and ignore completion.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl MigrationHooks for NoHooks {}

/// Summary of an applied run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Product migrated.
    pub product: String,
    /// Version before the run.
    pub from_version: String,
    /// Version recorded after the run.
    pub to_version: String,
    /// Steps run, in order.
    pub steps: Vec<String>,
    /// Statement batches sent.
    pub statements_sent: usize,
}

/// How a run ended, when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Steps ran and the version marker was recorded.
    Applied(RunReport),
    /// A hook cancelled the run before anything ran.
    Cancelled {
        /// The hook's reason.
        reason: String,
    },
}

impl RunOutcome {
    /// Whether the run was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, RunOutcome::Applied(_))
    }
}

/// Records that a product version has been applied.
pub trait VersionLog: Send + Sync {
    /// Record the marker, inside the run's transaction.
    fn record(
        &self,
        ctx: &mut MigrationContext<'_>,
        product: &str,
        version: &SemVersion,
    ) -> Result<(), MigrationError>;
}

/// Version log kept in a table of the migrated database.
#[derive(Debug, Clone)]
pub struct SqlVersionLog {
    table: String,
}

impl SqlVersionLog {
    /// Use the given table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl VersionLog for SqlVersionLog {
    fn record(
        &self,
        ctx: &mut MigrationContext<'_>,
        product: &str,
        version: &SemVersion,
    ) -> Result<(), MigrationError> {
        let dialect = ctx.dialect().clone();
        let table = dialect.quote(&self.table);
        ctx.execute_statement(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({} VARCHAR(255) NOT NULL, {} VARCHAR(64) NOT NULL, \
             {} TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            table,
            dialect.quote("product"),
            dialect.quote("version"),
            dialect.quote("created_at"),
        ))?;
        ctx.execute_statement(&format!(
            "INSERT INTO {} ({}, {}) VALUES ({}, {})",
            table,
            dialect.quote("product"),
            dialect.quote("version"),
            dialect.literal(product),
            dialect.literal(&version.to_string()),
        ))
    }
}

/// Runs registered steps filtered by product version.
pub struct MigrationRunner {
    registry: Arc<StepRegistry>,
    config: RunnerConfig,
    version_log: Box<dyn VersionLog>,
}

impl MigrationRunner {
    /// Create a runner recording versions in the configured table.
    pub fn new(registry: Arc<StepRegistry>, config: RunnerConfig) -> Self {
        let version_log = Box::new(SqlVersionLog::new(config.version_table.clone()));
        Self {
            registry,
            config,
            version_log,
        }
    }

    /// Replace the version log.
    pub fn with_version_log(mut self, version_log: impl VersionLog + 'static) -> Self {
        self.version_log = Box::new(version_log);
        self
    }

    /// Runner configuration.
    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Direction of the configured run.
    pub fn direction(&self) -> Direction {
        if self.config.is_upgrade() {
            Direction::Up
        } else {
            Direction::Down
        }
    }

    /// Steps that apply to the configured run, in run order.
    ///
    /// Upgrades take steps targeting `(current, target]` whose minimum
    /// current version, if any, is met, ordered by target version then sort
    /// order. Downgrades take steps targeting `(target, current]` in the
    /// reverse order.
    pub fn ordered_steps(&self) -> Vec<(StepType, StepMetadata)> {
        let current = &self.config.current_version;
        let target = &self.config.target_version;
        let product = self.config.product.as_str();

        let mut steps: Vec<(StepType, StepMetadata)> = match self.direction() {
            Direction::Up => self
                .registry
                .versioned()
                .iter()
                .filter(|(_, m)| {
                    m.product == product
                        && &m.target_version > current
                        && &m.target_version <= target
                        && m.minimum_current_version.as_ref().map_or(true, |min| current >= min)
                })
                .cloned()
                .collect(),
            Direction::Down => self
                .registry
                .versioned()
                .iter()
                .filter(|(_, m)| {
                    m.product == product
                        && &m.target_version > target
                        && &m.target_version <= current
                })
                .cloned()
                .collect(),
        };

        steps.sort_by(|(_, a), (_, b)| {
            a.target_version
                .cmp(&b.target_version)
                .then(a.sort_order.cmp(&b.sort_order))
        });
        if self.direction() == Direction::Down {
            steps.reverse();
        }
        steps
    }

    /// Run the filtered steps and record the target version, all in one
    /// transaction.
    #[instrument(skip(self, store, hooks), fields(product = %self.config.product))]
    pub fn execute(
        &self,
        store: &mut dyn Store,
        hooks: &mut dyn MigrationHooks,
    ) -> Result<RunOutcome, MigrationError> {
        let direction = self.direction();
        let steps = self.ordered_steps();
        let event = MigrationEvent {
            product: self.config.product.clone(),
            current_version: self.config.current_version.clone(),
            target_version: self.config.target_version.clone(),
            direction,
            steps: steps.iter().map(|(step, _)| step.clone()).collect(),
        };

        if let HookDecision::Cancel { reason } = hooks.before_migrate(&event) {
            warn!(reason = %reason, "Migration was cancelled by a hook");
            return Ok(RunOutcome::Cancelled { reason });
        }

        info!(
            current_version = %self.config.current_version,
            target_version = %self.config.target_version,
            steps = steps.len(),
            "Starting migration run"
        );

        let mut scope = Scope::begin(store)?;
        let report = {
            let mut ctx = MigrationContext::new(scope.store(), self.config.product.as_str());
            let mut state = self.config.current_version.to_string();
            let mut applied = Vec::with_capacity(steps.len());

            for (step, metadata) in &steps {
                info!(step = %step, version = %metadata.target_version, "Running step");
                if let Err(e) = run_step(&*self.registry, step, &mut ctx, direction, &state) {
                    return Err(classify_failure(&ctx, e));
                }
                applied.push(step.to_string());
                state = metadata.target_version.to_string();
            }

            if let Err(e) = self.version_log.record(
                &mut ctx,
                &self.config.product,
                &self.config.target_version,
            ) {
                return Err(classify_failure(&ctx, e));
            }

            RunReport {
                product: self.config.product.clone(),
                from_version: self.config.current_version.to_string(),
                to_version: self.config.target_version.to_string(),
                steps: applied,
                statements_sent: ctx.statements_sent(),
            }
        };
        scope.complete()?;

        info!(
            steps = report.steps.len(),
            statements_sent = report.statements_sent,
            "Migration run complete"
        );
        hooks.after_migrate(&event, &report);

        Ok(RunOutcome::Applied(report))
    }
}
