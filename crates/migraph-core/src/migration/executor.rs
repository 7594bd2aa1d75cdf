//! Plan executor - walks a plan and runs its steps in order.

use serde::Serialize;
use tracing::{info, warn};

use super::context::MigrationContext;
use super::error::{MigrationError, PlanError};
use super::plan::Plan;
use super::step::{StepFactory, StepType};
use crate::store::Store;

/// Result of a plan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanExecution {
    /// Plan name.
    pub plan: String,
    /// State the run started from.
    pub from_state: String,
    /// State the run reached.
    pub final_state: String,
    /// Steps run for transitions, in order, no-ops included.
    pub steps: Vec<String>,
    /// Post-migration steps run after the walk.
    pub post_migrations: Vec<String>,
    /// Statement batches sent to the store.
    pub statements_sent: usize,
}

impl PlanExecution {
    /// Number of transitions whose step was not a no-op.
    pub fn applied_steps(&self) -> usize {
        let noop = StepType::noop();
        self.steps.iter().filter(|s| s.as_str() != noop.name()).count()
    }

    /// Whether the run moved the schema at all.
    pub fn is_noop(&self) -> bool {
        self.from_state == self.final_state
    }
}

/// Which way a step is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Apply the step.
    Up,
    /// Revert the step.
    Down,
}

/// Build and run one step, then check it left no pending expression.
///
/// Failures of the step itself are wrapped with the step name and the last
/// state reached.
pub(crate) fn run_step(
    factory: &dyn StepFactory,
    step_type: &StepType,
    ctx: &mut MigrationContext<'_>,
    direction: Direction,
    state: &str,
) -> Result<(), MigrationError> {
    let wrap = |source: MigrationError| MigrationError::StepFailed {
        step: step_type.to_string(),
        state: state.to_string(),
        source: Box::new(source),
    };

    let mut step = factory.create(step_type, ctx).map_err(wrap)?;
    let outcome = match direction {
        Direction::Up => step.migrate(ctx),
        Direction::Down => step.down(ctx),
    };
    outcome.map_err(wrap)?;

    if ctx.is_building_expression() {
        return Err(MigrationError::IncompleteMigrationExpression {
            step: step_type.to_string(),
        });
    }
    Ok(())
}

/// Escalate a run failure to data loss when the store could not have
/// rolled back what was already sent.
pub(crate) fn classify_failure(ctx: &MigrationContext<'_>, error: MigrationError) -> MigrationError {
    let dialect = ctx.dialect();
    let sent = ctx.statements_sent();
    if dialect.transactional_ddl || sent == 0 || error.is_data_loss() {
        return error;
    }
    warn!(
        plan = %ctx.plan(),
        dialect = %dialect.name,
        statements_sent = sent,
        error = %error,
        "Migration failed on a store without transactional DDL; changes were not rolled back"
    );
    MigrationError::DataLoss {
        statements_sent: sent,
        source: Box::new(error),
    }
}

fn display_state(state: &str) -> &str {
    if state.is_empty() {
        "origin"
    } else {
        state
    }
}

pub(crate) fn execute_plan(
    plan: &Plan,
    store: &mut dyn Store,
    from_state: &str,
    run_post_migrations: bool,
) -> Result<PlanExecution, MigrationError> {
    let factory = plan.factory().ok_or_else(|| MigrationError::NotExecutable {
        plan: plan.name().to_string(),
    })?;
    let final_state = plan.final_state()?.to_string();

    let from_state = from_state.trim();
    if !plan.contains_state(from_state) {
        return Err(MigrationError::UnknownState {
            plan: plan.name().to_string(),
            state: from_state.to_string(),
        });
    }

    info!(plan = %plan.name(), "Starting migration plan");
    info!(state = %display_state(from_state), "At state");

    let mut ctx = MigrationContext::new(store, plan.name());
    let mut current = from_state.to_string();
    let mut steps = Vec::new();

    while let Some(transition) = plan.transition(&current) {
        info!(step = %transition.step, "Executing step");
        if let Err(e) = run_step(factory, &transition.step, &mut ctx, Direction::Up, &current) {
            return Err(classify_failure(&ctx, e));
        }
        steps.push(transition.step.to_string());
        current = transition.target.clone();
        info!(state = %display_state(&current), "At state");
    }

    let mut post_migrations = Vec::new();
    if run_post_migrations && !steps.is_empty() {
        for step in plan.post_migrations() {
            info!(step = %step, "Executing post-migration");
            if let Err(e) = run_step(factory, step, &mut ctx, Direction::Up, &current) {
                return Err(classify_failure(&ctx, e));
            }
            post_migrations.push(step.to_string());
        }
    }

    if current != final_state {
        return Err(PlanError::Graph(format!(
            "internal error: reached state \"{}\" which is not the final state \"{}\"",
            current, final_state
        ))
        .into());
    }

    info!(
        plan = %plan.name(),
        steps = steps.len(),
        statements_sent = ctx.statements_sent(),
        "Done (pending scope completion)"
    );

    Ok(PlanExecution {
        plan: plan.name().to_string(),
        from_state: from_state.to_string(),
        final_state: current,
        steps,
        post_migrations,
        statements_sent: ctx.statements_sent(),
    })
}
