//! Migraph Core - schema-migration plans, expressions, and executors.
//!
//! This crate provides the migration engine and the store abstraction it
//! runs against.

pub mod error;
pub mod migration;
pub mod store;

pub use error::Error;
pub use migration::{
    MigrationContext, MigrationError, MigrationRunner, MigrationStep, Plan, PlanError,
    PlanExecution, SemVersion, StepRegistry, StepType, Upgrader,
};
pub use store::{Dialect, MemoryStore, Scope, SqliteStore, Store};
