//! Migration-specific error types.

use thiserror::Error;

/// Errors in the definition of a migration plan.
///
/// These surface while a plan is being built or validated, before any
/// database I/O takes place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// An argument is not acceptable, such as identical source and target.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The source state already has an outgoing transition.
    #[error("a transition from state \"{state}\" has already been defined")]
    AlreadyDefined {
        /// The source state.
        state: String,
    },

    /// The step type is not a migration step the plan can build.
    #[error("type {step} does not implement the migration step contract")]
    TypeMismatch {
        /// The offending step type name.
        step: String,
    },

    /// A chain operation could not be performed on the graph.
    #[error("graph error: {0}")]
    Graph(String),

    /// More than one state has no outgoing transition.
    #[error(
        "multiple final states have been detected in the plan (\"{first}\", \"{second}\"); \
         make sure the plan contains only one final state"
    )]
    MultipleTerminalStates {
        /// First terminal state found.
        first: String,
        /// Second terminal state found.
        second: String,
    },

    /// A transition path loops back on itself.
    #[error(
        "a loop has been detected in the plan around state \"{state}\"; \
         make sure the plan does not contain circular transition paths"
    )]
    CycleDetected {
        /// A state on the cycle.
        state: String,
    },

    /// The plan has no transitions.
    #[error("plan \"{plan}\" has no transitions")]
    EmptyPlan {
        /// The plan name.
        plan: String,
    },
}

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The plan definition is invalid.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The state to resume from is not part of the plan.
    #[error("unknown state \"{state}\" in plan \"{plan}\"")]
    UnknownState {
        /// The plan name.
        plan: String,
        /// The unknown state.
        state: String,
    },

    /// The plan was built without a step factory.
    #[error("plan \"{plan}\" cannot be executed: no step factory was provided")]
    NotExecutable {
        /// The plan name.
        plan: String,
    },

    /// A new expression was started while the previous one is still pending.
    #[error("cannot create a new expression: the previous expression has not run")]
    IncompleteBuild,

    /// A step returned with an expression still pending.
    #[error("step {step} left an expression that was never executed")]
    IncompleteMigrationExpression {
        /// The step type name.
        step: String,
    },

    /// An expression was executed a second time.
    #[error("expression has already been executed")]
    AlreadyExecuted,

    /// A step failed.
    #[error("step {step} failed migrating from state \"{state}\": {source}")]
    StepFailed {
        /// The step type name.
        step: String,
        /// The last state successfully reached.
        state: String,
        /// The underlying failure.
        #[source]
        source: Box<MigrationError>,
    },

    /// A step failed after schema changes were already committed.
    #[error(
        "an error occurred running a schema migration but the changes could not be rolled back \
         ({statements_sent} statements were sent): {source}. The database may need to be \
         restored to its original state before running this upgrade again"
    )]
    DataLoss {
        /// Statements sent before the failure.
        statements_sent: usize,
        /// The underlying failure.
        #[source]
        source: Box<MigrationError>,
    },

    /// The step does not support downgrading.
    #[error("step {step} cannot be reversed")]
    NotReversible {
        /// The step type name.
        step: String,
    },

    /// The factory has no constructor for the step type.
    #[error("no migration step registered as {step}")]
    UnknownStep {
        /// The step type name.
        step: String,
    },

    /// A version string could not be parsed.
    #[error("invalid version \"{0}\"")]
    InvalidVersion(String),

    /// A failure reported by step logic.
    #[error("{0}")]
    Step(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] crate::error::Error),
}

impl MigrationError {
    /// Build a step-authored failure.
    pub fn step(message: impl Into<String>) -> Self {
        Self::Step(message.into())
    }

    /// Whether this error means the store may hold a partial migration.
    pub fn is_data_loss(&self) -> bool {
        matches!(self, Self::DataLoss { .. })
    }

    /// The innermost cause, skipping step and data-loss wrappers.
    pub fn root(&self) -> &MigrationError {
        match self {
            Self::StepFailed { source, .. } | Self::DataLoss { source, .. } => source.root(),
            other => other,
        }
    }
}
