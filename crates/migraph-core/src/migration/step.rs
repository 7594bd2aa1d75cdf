//! Migration steps, step identities, and the step registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::context::MigrationContext;
use super::error::{MigrationError, PlanError};
use super::version::SemVersion;

/// A unit of schema-change logic, run once per transition.
pub trait MigrationStep {
    /// Apply the step.
    fn migrate(&mut self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError>;

    /// Revert the step. Only the version-filtered runner downgrades.
    fn down(&mut self, ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        let _ = ctx;
        Err(MigrationError::NotReversible {
            step: short_type_name::<Self>().to_string(),
        })
    }
}

/// A step that does nothing.
///
/// Used for transitions that only rename a state.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStep;

impl MigrationStep for NoopStep {
    fn migrate(&mut self, _ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        Ok(())
    }

    fn down(&mut self, _ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
        Ok(())
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// The identity of a migration step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StepType {
    name: Arc<str>,
}

impl StepType {
    /// The identity of a step type, named after the type.
    pub fn of<T: MigrationStep + 'static>() -> Self {
        Self::named(short_type_name::<T>())
    }

    /// A step identity by name, for steps defined at runtime.
    pub fn named(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref().trim()),
        }
    }

    /// The no-op step.
    pub fn noop() -> Self {
        Self::of::<NoopStep>()
    }

    /// The step name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is the no-op step.
    pub fn is_noop(&self) -> bool {
        *self == Self::noop()
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builds step instances for a run.
pub trait StepFactory: Send + Sync {
    /// Whether the factory can build this step type.
    fn supports(&self, step_type: &StepType) -> bool;

    /// Build a step for the given context.
    fn create(
        &self,
        step_type: &StepType,
        ctx: &MigrationContext<'_>,
    ) -> Result<Box<dyn MigrationStep>, MigrationError>;
}

/// Version metadata used by the version-filtered runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepMetadata {
    /// Product the step belongs to.
    pub product: String,
    /// Version the step upgrades to.
    pub target_version: SemVersion,
    /// Lowest current version the step applies from, if any.
    pub minimum_current_version: Option<SemVersion>,
    /// Order among steps with the same target version.
    pub sort_order: i32,
}

impl StepMetadata {
    /// Metadata for a step targeting a product version.
    pub fn new(product: impl Into<String>, target_version: SemVersion) -> Self {
        Self {
            product: product.into(),
            target_version,
            minimum_current_version: None,
            sort_order: 0,
        }
    }

    /// Only apply when upgrading from at least this version.
    pub fn with_minimum_current_version(mut self, version: SemVersion) -> Self {
        self.minimum_current_version = Some(version);
        self
    }

    /// Set the sort order.
    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }
}

type Constructor = Arc<dyn Fn(&MigrationContext<'_>) -> Box<dyn MigrationStep> + Send + Sync>;

/// Registry of known steps and their version metadata.
///
/// Populated at startup; used as the step factory for plans and as the
/// step source for the version-filtered runner.
#[derive(Clone)]
pub struct StepRegistry {
    constructors: HashMap<StepType, Constructor>,
    versioned: Vec<(StepType, StepMetadata)>,
}

impl StepRegistry {
    /// Create a registry holding only the no-op step.
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
            versioned: Vec::new(),
        };
        registry.register::<NoopStep>();
        registry
    }

    /// Register a step type built with `Default`.
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: MigrationStep + Default + 'static,
    {
        self.register_with(StepType::of::<T>(), |_| Box::new(T::default()))
    }

    /// Register a step type with a custom constructor.
    pub fn register_with<F>(&mut self, step_type: StepType, constructor: F) -> &mut Self
    where
        F: Fn(&MigrationContext<'_>) -> Box<dyn MigrationStep> + Send + Sync + 'static,
    {
        self.constructors.insert(step_type, Arc::new(constructor));
        self
    }

    /// Register a step type with version metadata.
    ///
    /// A step may carry several metadata entries, one per product version
    /// it applies to.
    pub fn register_versioned<T>(&mut self, metadata: StepMetadata) -> &mut Self
    where
        T: MigrationStep + Default + 'static,
    {
        let step_type = StepType::of::<T>();
        if !self.constructors.contains_key(&step_type) {
            self.register::<T>();
        }
        self.versioned.push((step_type, metadata));
        self
    }

    /// Resolve a step name to a registered step type.
    pub fn step_type(&self, name: &str) -> Result<StepType, PlanError> {
        let step_type = StepType::named(name);
        if self.constructors.contains_key(&step_type) {
            Ok(step_type)
        } else {
            Err(PlanError::TypeMismatch {
                step: name.to_string(),
            })
        }
    }

    /// Steps registered with version metadata, in registration order.
    pub fn versioned(&self) -> &[(StepType, StepMetadata)] {
        &self.versioned
    }

    /// Number of registered step types.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Whether no step types are registered.
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.constructors.keys().map(StepType::name).collect();
        names.sort_unstable();
        f.debug_struct("StepRegistry")
            .field("steps", &names)
            .field("versioned", &self.versioned.len())
            .finish()
    }
}

impl StepFactory for StepRegistry {
    fn supports(&self, step_type: &StepType) -> bool {
        self.constructors.contains_key(step_type)
    }

    fn create(
        &self,
        step_type: &StepType,
        ctx: &MigrationContext<'_>,
    ) -> Result<Box<dyn MigrationStep>, MigrationError> {
        let constructor =
            self.constructors
                .get(step_type)
                .ok_or_else(|| MigrationError::UnknownStep {
                    step: step_type.to_string(),
                })?;
        Ok(constructor(ctx))
    }
}
