//! Migration engine.
//!
//! This module provides:
//! - A plan graph of named states joined by step-carrying transitions
//! - Validation (single final state, no loops) before any I/O
//! - Fluent expression builders that must be executed before a step ends
//! - A plan executor and an upgrader that records the state reached
//! - A version-filtered runner for product-versioned steps
//!
//! # Failure model
//!
//! Runs happen inside a transaction [`Scope`](crate::store::Scope). A step
//! failure is reported as [`MigrationError::StepFailed`] with the last state
//! reached. On a store without transactional DDL, a failure after any
//! statement was sent becomes [`MigrationError::DataLoss`], because part of
//! the run has been committed implicitly.
//!
//! # Example
//!
//! ```ignore
//! use migraph_core::migration::{Plan, StepRegistry, StepType, Upgrader};
//!
//! let mut plan = Plan::with_factory("cms", Arc::new(registry));
//! plan.chain("{4A3F}", StepType::of::<CreateNodes>())?
//!     .chain("{9C01}", StepType::of::<AddNodeName>())?;
//!
//! let result = Upgrader::new(plan).execute(&mut store, &states)?;
//! println!("reached {}", result.final_state);
//! ```

mod builder;
mod context;
pub mod error;
mod executor;
pub mod expression;
pub mod plan;
pub mod runner;
pub mod state;
pub mod step;
pub mod upgrader;
pub mod version;

pub use builder::{
    AlterTableBuilder, CreateIndexBuilder, CreateTableBuilder, DropIndexBuilder, ExpressionBuilder,
};
pub use context::MigrationContext;
pub use error::{MigrationError, PlanError};
pub use executor::{Direction, PlanExecution};
pub use expression::{Alteration, ColumnDefinition, Expression, IndexDefinition, Operation};
pub use plan::{Plan, Transition};
pub use runner::{
    HookDecision, MigrationEvent, MigrationHooks, MigrationRunner, NoHooks, RunOutcome, RunReport,
    RunnerConfig, SqlVersionLog, VersionLog,
};
pub use state::{MemoryStateStore, SledStateStore, StateStore, UpgradeState};
pub use step::{MigrationStep, NoopStep, StepFactory, StepMetadata, StepRegistry, StepType};
pub use upgrader::{UpgradeConfig, UpgradeResult, Upgrader};
pub use version::SemVersion;
