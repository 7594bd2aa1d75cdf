//! Migration plan graph.
//!
//! A plan is a named directed graph of states. Each state has at most one
//! outgoing transition, carrying the step that moves the schema from the
//! source state to the target state, so every state resolves to a single
//! path towards the one final state.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

use tracing::instrument;

use super::error::{MigrationError, PlanError};
use super::executor::{self, PlanExecution};
use super::step::{StepFactory, StepType};
use crate::store::Store;

/// A directed edge between two states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State the transition starts from.
    pub source: String,
    /// State the transition leads to.
    pub target: String,
    /// Step run to move from source to target.
    pub step: StepType,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" -> \"{}\" ({})", self.source, self.target, self.step)
    }
}

/// A named migration plan.
///
/// States are never declared; they exist because a transition references
/// them. A state known only as a target is kept with no transition, which
/// is how the final state is found.
pub struct Plan {
    name: String,
    initial_state: String,
    transitions: BTreeMap<String, Option<Transition>>,
    prev_state: String,
    post_migrations: Vec<StepType>,
    factory: Option<Arc<dyn StepFactory>>,
    final_state: OnceLock<String>,
}

impl Plan {
    /// Create a plan that can be defined and validated but not executed.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initial_state: String::new(),
            transitions: BTreeMap::new(),
            prev_state: String::new(),
            post_migrations: Vec::new(),
            factory: None,
            final_state: OnceLock::new(),
        }
    }

    /// Create an executable plan that builds its steps with `factory`.
    pub fn with_factory(name: impl Into<String>, factory: Arc<dyn StepFactory>) -> Self {
        let mut plan = Self::new(name);
        plan.factory = Some(factory);
        plan
    }

    /// Override the state a never-migrated database starts from.
    ///
    /// Also moves the chain cursor there.
    pub fn with_initial_state(mut self, state: impl AsRef<str>) -> Self {
        self.initial_state = state.as_ref().trim().to_string();
        self.prev_state = self.initial_state.clone();
        self
    }

    /// Plan name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State of a database that was never migrated.
    pub fn initial_state(&self) -> &str {
        &self.initial_state
    }

    /// Whether the plan has a step factory.
    pub fn is_executable(&self) -> bool {
        self.factory.is_some()
    }

    pub(crate) fn factory(&self) -> Option<&dyn StepFactory> {
        self.factory.as_deref()
    }

    /// The current chain cursor.
    pub fn cursor(&self) -> &str {
        &self.prev_state
    }

    /// Register a transition.
    pub fn add(
        &mut self,
        source: impl AsRef<str>,
        target: impl AsRef<str>,
        step: StepType,
    ) -> Result<&mut Self, PlanError> {
        let source = source.as_ref().trim();
        let target = target.as_ref().trim();

        self.check_transition(source, target, &step)?;

        self.transitions.insert(
            source.to_string(),
            Some(Transition {
                source: source.to_string(),
                target: target.to_string(),
                step,
            }),
        );
        self.transitions.entry(target.to_string()).or_insert(None);

        self.prev_state = target.to_string();
        self.final_state = OnceLock::new();
        Ok(self)
    }

    /// Fail unless `source -> target` running `step` could be added.
    fn check_transition(&self, source: &str, target: &str, step: &StepType) -> Result<(), PlanError> {
        if source == target {
            return Err(PlanError::InvalidArgument(format!(
                "source and target state cannot be identical (\"{}\")",
                source
            )));
        }
        if let Some(factory) = &self.factory {
            if !factory.supports(step) {
                return Err(PlanError::TypeMismatch {
                    step: step.to_string(),
                });
            }
        }
        if let Some(Some(_)) = self.transitions.get(source) {
            return Err(PlanError::AlreadyDefined {
                state: source.to_string(),
            });
        }
        Ok(())
    }

    /// Add a transition from the chain cursor.
    pub fn chain(&mut self, target: impl AsRef<str>, step: StepType) -> Result<&mut Self, PlanError> {
        let source = self.prev_state.clone();
        self.add(source, target, step)
    }

    /// Add a no-op transition from the chain cursor.
    pub fn to(&mut self, target: impl AsRef<str>) -> Result<&mut Self, PlanError> {
        self.chain(target, StepType::noop())
    }

    /// Move the chain cursor without adding a transition.
    pub fn from(&mut self, source: impl AsRef<str>) -> &mut Self {
        self.prev_state = source.as_ref().trim().to_string();
        self
    }

    /// Chain to `target` with `new_step`, and let databases sitting at
    /// `recover_state` reach the same target with `recursive_step`.
    ///
    /// Both transitions are checked before either is added.
    pub fn to_with_replace(
        &mut self,
        recover_state: impl AsRef<str>,
        target: impl AsRef<str>,
        new_step: StepType,
        recursive_step: StepType,
    ) -> Result<&mut Self, PlanError> {
        let recover = recover_state.as_ref().trim().to_string();
        let target = target.as_ref().trim().to_string();
        let cursor = self.prev_state.clone();

        self.check_transition(&cursor, &target, &new_step)?;
        self.check_transition(&recover, &target, &recursive_step)?;
        if recover == cursor {
            return Err(PlanError::AlreadyDefined { state: recover });
        }

        self.chain(&target, new_step)?;
        self.from(recover).chain(&target, recursive_step)
    }

    /// Copy the chain from `start` to `end` so that it runs from the chain
    /// cursor to `target`.
    pub fn to_with_clone(
        &mut self,
        start: impl AsRef<str>,
        end: impl AsRef<str>,
        target: impl AsRef<str>,
    ) -> Result<&mut Self, PlanError> {
        let source = self.prev_state.clone();
        self.copy_chain(source, start, end, target)
    }

    /// Duplicate the sub-chain `start -> ... -> end` as
    /// `source -> ... -> target`.
    ///
    /// Interior states of the copy get fresh random names. The graph is left
    /// untouched when the source chain cannot be walked or `source` cannot
    /// take the first copied transition.
    pub fn copy_chain(
        &mut self,
        source: impl AsRef<str>,
        start: impl AsRef<str>,
        end: impl AsRef<str>,
        target: impl AsRef<str>,
    ) -> Result<&mut Self, PlanError> {
        let start = start.as_ref().trim();
        let end = end.as_ref().trim();
        let target = target.as_ref().trim();

        if start == end {
            return Err(PlanError::Graph(format!(
                "start and end states cannot be identical (\"{}\")",
                start
            )));
        }

        let mut steps = Vec::new();
        let mut visited = HashSet::new();
        let mut state = start.to_string();
        while state != end {
            if !visited.insert(state.clone()) {
                return Err(PlanError::Graph(format!(
                    "a loop was detected in the copied chain around state \"{}\"",
                    state
                )));
            }
            let transition = match self.transitions.get(&state) {
                Some(Some(transition)) => transition,
                _ => {
                    return Err(PlanError::Graph(format!(
                        "there is no transition from state \"{}\" towards \"{}\"",
                        state, end
                    )))
                }
            };
            steps.push(transition.step.clone());
            state = transition.target.clone();
        }

        let last = steps.len() - 1;
        let targets: Vec<String> = (0..steps.len())
            .map(|i| {
                if i == last {
                    target.to_string()
                } else {
                    self.create_random_state()
                }
            })
            .collect();
        let source = source.as_ref().trim();
        self.check_transition(source, &targets[0], &steps[0])?;

        self.from(source);
        for (next, step) in targets.into_iter().zip(steps) {
            self.chain(next, step)?;
        }
        Ok(self)
    }

    /// Register a step to run once after a plan run reached the final
    /// state. Duplicates run only once, at their first position.
    pub fn add_post_migration(&mut self, step: StepType) -> &mut Self {
        if !self.post_migrations.contains(&step) {
            self.post_migrations.push(step);
        }
        self
    }

    /// Registered post-migration steps.
    pub fn post_migrations(&self) -> &[StepType] {
        &self.post_migrations
    }

    /// A state name that is not yet used by the plan.
    pub fn create_random_state(&self) -> String {
        loop {
            let bytes: [u8; 16] = rand::random();
            let state = format!("{{{}}}", hex::encode_upper(bytes));
            if !self.transitions.contains_key(&state) {
                return state;
            }
        }
    }

    /// Whether the plan knows a state.
    pub fn contains_state(&self, state: &str) -> bool {
        self.transitions.contains_key(state.trim())
    }

    /// The outgoing transition of a state, if the state has one.
    pub fn transition(&self, state: &str) -> Option<&Transition> {
        self.transitions.get(state.trim()).and_then(Option::as_ref)
    }

    /// All transitions, ordered by source state.
    pub fn transitions(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.values().flatten()
    }

    /// All known states, ordered by name.
    pub fn states(&self) -> impl Iterator<Item = &str> {
        self.transitions.keys().map(String::as_str)
    }

    /// Check the plan has exactly one final state and no loops.
    pub fn validate(&self) -> Result<(), PlanError> {
        self.final_state().map(|_| ())
    }

    /// The unique state with no outgoing transition.
    ///
    /// Validates the plan on first access after a change.
    pub fn final_state(&self) -> Result<&str, PlanError> {
        if let Some(state) = self.final_state.get() {
            return Ok(state.as_str());
        }
        let state = self.compute_final_state()?;
        Ok(self.final_state.get_or_init(|| state).as_str())
    }

    fn compute_final_state(&self) -> Result<String, PlanError> {
        if self.transitions.is_empty() {
            return Err(PlanError::EmptyPlan {
                plan: self.name.clone(),
            });
        }

        let mut final_state: Option<&str> = None;
        for (state, transition) in &self.transitions {
            if transition.is_some() {
                continue;
            }
            match final_state {
                None => final_state = Some(state),
                Some(first) => {
                    return Err(PlanError::MultipleTerminalStates {
                        first: first.to_string(),
                        second: state.clone(),
                    })
                }
            }
        }

        // every walk stops at the first state an earlier walk already cleared
        let mut verified: HashSet<&str> = HashSet::new();
        for transition in self.transitions.values().flatten() {
            if verified.contains(transition.source.as_str()) {
                continue;
            }
            let mut visited = vec![transition.source.as_str()];
            let mut next = self.transitions.get(&transition.target).and_then(Option::as_ref);
            while let Some(current) = next {
                if verified.contains(current.source.as_str()) {
                    break;
                }
                if visited.contains(&current.source.as_str()) {
                    return Err(PlanError::CycleDetected {
                        state: current.source.clone(),
                    });
                }
                visited.push(current.source.as_str());
                next = self.transitions.get(&current.target).and_then(Option::as_ref);
            }
            verified.extend(visited);
        }

        final_state
            .map(str::to_string)
            .ok_or_else(|| PlanError::Graph(format!("plan \"{}\" has no final state", self.name)))
    }

    /// States walked from `from` up to `to`, or up to the final state.
    pub fn follow_path(&self, from: &str, to: Option<&str>) -> Result<Vec<String>, MigrationError> {
        let final_state = self.final_state()?;
        let from = from.trim();
        let to = to.map(str::trim).filter(|s| !s.is_empty());
        let destination = to.unwrap_or(final_state);

        let mut states = vec![from.to_string()];
        let mut transition = self.known_transition(from)?;
        let mut current = from;
        while current != destination {
            let Some(next) = transition else {
                break;
            };
            current = next.target.as_str();
            states.push(current.to_string());
            transition = self.known_transition(current)?;
        }

        if current != destination {
            return Err(PlanError::Graph(format!(
                "state \"{}\" cannot be reached from state \"{}\"",
                destination, from
            ))
            .into());
        }
        Ok(states)
    }

    fn known_transition(&self, state: &str) -> Result<Option<&Transition>, MigrationError> {
        self.transitions
            .get(state)
            .map(Option::as_ref)
            .ok_or_else(|| MigrationError::UnknownState {
                plan: self.name.clone(),
                state: state.to_string(),
            })
    }

    /// Hash of the plan's transitions and post-migrations.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for transition in self.transitions() {
            hasher.update(transition.source.as_bytes());
            hasher.update(b"\0");
            hasher.update(transition.target.as_bytes());
            hasher.update(b"\0");
            hasher.update(transition.step.name().as_bytes());
            hasher.update(b"\n");
        }
        for step in &self.post_migrations {
            hasher.update(b"post\0");
            hasher.update(step.name().as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Run the plan from `from_state` until the final state.
    ///
    /// The caller owns the transaction around the run and persists the
    /// returned final state.
    #[instrument(skip(self, store), fields(plan = %self.name))]
    pub fn execute(
        &self,
        store: &mut dyn Store,
        from_state: &str,
    ) -> Result<PlanExecution, MigrationError> {
        executor::execute_plan(self, store, from_state, true)
    }

    /// Like [`Plan::execute`], optionally skipping post-migrations.
    #[instrument(skip(self, store), fields(plan = %self.name))]
    pub fn execute_with(
        &self,
        store: &mut dyn Store,
        from_state: &str,
        run_post_migrations: bool,
    ) -> Result<PlanExecution, MigrationError> {
        executor::execute_plan(self, store, from_state, run_post_migrations)
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("name", &self.name)
            .field("initial_state", &self.initial_state)
            .field("transitions", &self.transitions().collect::<Vec<_>>())
            .field("post_migrations", &self.post_migrations)
            .field("executable", &self.is_executable())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::step::{MigrationStep, StepRegistry};
    use crate::migration::MigrationContext;

    #[derive(Default)]
    struct StepA;
    impl MigrationStep for StepA {
        fn migrate(&mut self, _ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct StepB;
    impl MigrationStep for StepB {
        fn migrate(&mut self, _ctx: &mut MigrationContext<'_>) -> Result<(), MigrationError> {
            Ok(())
        }
    }

    fn linear_plan() -> Plan {
        let mut plan = Plan::new("test");
        plan.to("1.0")
            .unwrap()
            .chain("2.0", StepType::of::<StepA>())
            .unwrap()
            .chain("3.0", StepType::of::<StepB>())
            .unwrap();
        plan
    }

    #[test]
    fn test_final_state_of_linear_plan() {
        let plan = linear_plan();
        assert_eq!(plan.final_state().unwrap(), "3.0");
        assert!(plan.validate().is_ok());
        assert_eq!(plan.states().collect::<Vec<_>>(), vec!["", "1.0", "2.0", "3.0"]);
    }

    #[test]
    fn test_transitions_can_be_declared_out_of_order() {
        let mut plan = Plan::new("test");
        plan.add("b", "c", StepType::noop()).unwrap();
        plan.add("a", "b", StepType::noop()).unwrap();
        assert_eq!(plan.final_state().unwrap(), "c");
    }

    #[test]
    fn test_add_identical_states_fails() {
        let mut plan = Plan::new("test");
        for state in ["", "1.0", " x "] {
            assert!(matches!(
                plan.add(state, state, StepType::noop()),
                Err(PlanError::InvalidArgument(_))
            ));
        }
        // trimmed before comparing
        assert!(matches!(
            plan.add("a", " a", StepType::noop()),
            Err(PlanError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_add_twice_from_same_state_fails() {
        let mut plan = Plan::new("test");
        plan.add("a", "b", StepType::noop()).unwrap();
        let err = plan.add("a", "c", StepType::noop()).unwrap_err();
        assert_eq!(err, PlanError::AlreadyDefined { state: "a".to_string() });
        // the original transition is untouched
        assert_eq!(plan.transition("a").unwrap().target, "b");
    }

    #[test]
    fn test_add_from_terminal_state_is_allowed() {
        let mut plan = Plan::new("test");
        plan.add("a", "b", StepType::noop()).unwrap();
        plan.add("b", "c", StepType::noop()).unwrap();
        assert_eq!(plan.final_state().unwrap(), "c");
    }

    #[test]
    fn test_multiple_terminal_states() {
        let mut plan = Plan::new("test");
        plan.add("a", "b", StepType::noop()).unwrap();
        plan.add("c", "d", StepType::noop()).unwrap();
        assert!(matches!(
            plan.validate(),
            Err(PlanError::MultipleTerminalStates { .. })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let mut plan = Plan::new("test");
        plan.add("a", "b", StepType::noop()).unwrap();
        plan.add("b", "a", StepType::noop()).unwrap();
        assert_eq!(
            plan.validate(),
            Err(PlanError::CycleDetected { state: "a".to_string() })
        );
    }

    #[test]
    fn test_cycle_next_to_terminal_branch() {
        // x -> y -> z -> y, plus w -> end
        let mut plan = Plan::new("test");
        plan.add("w", "end", StepType::noop()).unwrap();
        plan.add("x", "y", StepType::noop()).unwrap();
        plan.add("y", "z", StepType::noop()).unwrap();
        plan.add("z", "y", StepType::noop()).unwrap();
        assert!(matches!(plan.validate(), Err(PlanError::CycleDetected { .. })));
    }

    #[test]
    fn test_converging_chains_are_valid() {
        let mut plan = Plan::new("test");
        plan.add("a", "c", StepType::noop()).unwrap();
        plan.add("b", "c", StepType::noop()).unwrap();
        plan.add("c", "d", StepType::noop()).unwrap();
        assert_eq!(plan.final_state().unwrap(), "d");
    }

    #[test]
    fn test_empty_plan_has_no_final_state() {
        let plan = Plan::new("empty");
        assert!(matches!(plan.final_state(), Err(PlanError::EmptyPlan { .. })));
    }

    #[test]
    fn test_final_state_cache_invalidated_by_add() {
        let mut plan = linear_plan();
        assert_eq!(plan.final_state().unwrap(), "3.0");
        plan.to("4.0").unwrap();
        assert_eq!(plan.final_state().unwrap(), "4.0");
    }

    #[test]
    fn test_from_moves_cursor() {
        let mut plan = linear_plan();
        plan.from("1.0");
        assert_eq!(plan.cursor(), "1.0");
        assert!(matches!(
            plan.to("9.0"),
            Err(PlanError::AlreadyDefined { .. })
        ));
    }

    #[test]
    fn test_copy_chain() {
        let mut plan = Plan::new("test");
        plan.add("S0", "S1", StepType::of::<StepA>()).unwrap();
        plan.add("S1", "S2", StepType::of::<StepB>()).unwrap();
        plan.add("S2", "T0", StepType::noop()).unwrap();

        let before: Vec<String> = plan.states().map(str::to_string).collect();
        plan.copy_chain("T0", "S0", "S2", "T2").unwrap();

        let first = plan.transition("T0").unwrap().clone();
        assert_eq!(first.step, StepType::of::<StepA>());
        assert!(!before.contains(&first.target));
        assert!(first.target.starts_with('{') && first.target.ends_with('}'));

        let second = plan.transition(&first.target).unwrap();
        assert_eq!(second.step, StepType::of::<StepB>());
        assert_eq!(second.target, "T2");

        assert_eq!(plan.states().count(), before.len() + 2);
        assert_eq!(plan.final_state().unwrap(), "T2");
    }

    #[test]
    fn test_copy_chain_errors() {
        let mut plan = Plan::new("test");
        plan.add("a", "b", StepType::noop()).unwrap();
        plan.add("b", "c", StepType::noop()).unwrap();

        assert!(matches!(
            plan.copy_chain("c", "a", "a", "z"),
            Err(PlanError::Graph(_))
        ));
        assert!(matches!(
            plan.copy_chain("c", "a", "missing", "z"),
            Err(PlanError::Graph(_))
        ));
        assert!(matches!(
            plan.copy_chain("c", "b", "a", "z"),
            Err(PlanError::Graph(_))
        ));
        // failed copies leave the graph alone
        assert_eq!(plan.states().count(), 3);
    }

    #[test]
    fn test_copy_chain_detects_loop() {
        let mut plan = Plan::new("test");
        plan.add("a", "b", StepType::noop()).unwrap();
        plan.add("b", "a", StepType::noop()).unwrap();
        assert!(matches!(
            plan.copy_chain("x", "a", "z", "y"),
            Err(PlanError::Graph(message)) if message.contains("loop")
        ));
    }

    #[test]
    fn test_to_with_clone_uses_cursor() {
        let mut plan = linear_plan();
        plan.from("3.0").to_with_clone("1.0", "3.0", "4.0").unwrap();
        let path = plan.follow_path("3.0", None).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.last().unwrap(), "4.0");
    }

    #[test]
    fn test_to_with_replace() {
        let mut plan = Plan::new("test");
        plan.to("a").unwrap().to("b").unwrap();
        plan.to_with_replace("x", "c", StepType::of::<StepA>(), StepType::of::<StepB>())
            .unwrap();

        assert_eq!(plan.transition("b").unwrap().step, StepType::of::<StepA>());
        assert_eq!(plan.transition("x").unwrap().step, StepType::of::<StepB>());
        assert_eq!(plan.final_state().unwrap(), "c");
        assert_eq!(plan.follow_path("x", None).unwrap(), vec!["x", "c"]);

        // the recover state must not already lead somewhere
        let states = plan.states().count();
        assert!(matches!(
            plan.from("c")
                .to_with_replace("a", "d", StepType::noop(), StepType::noop()),
            Err(PlanError::AlreadyDefined { state }) if state == "a"
        ));
        assert!(plan.transition("c").is_none());
        assert!(!plan.contains_state("d"));
        assert_eq!(plan.states().count(), states);
        assert_eq!(plan.cursor(), "c");
        assert_eq!(plan.final_state().unwrap(), "c");
    }

    #[test]
    fn test_to_with_replace_rejects_cursor_or_target_as_recover_state() {
        let mut plan = Plan::new("test");
        plan.to("a").unwrap();

        assert!(matches!(
            plan.to_with_replace("a", "b", StepType::noop(), StepType::noop()),
            Err(PlanError::AlreadyDefined { state }) if state == "a"
        ));
        assert!(matches!(
            plan.to_with_replace("b", "b", StepType::noop(), StepType::noop()),
            Err(PlanError::InvalidArgument(_))
        ));
        assert!(plan.transition("a").is_none());
        assert!(!plan.contains_state("b"));
    }

    #[test]
    fn test_copy_chain_onto_defined_source_leaves_graph_alone() {
        let mut plan = Plan::new("test");
        plan.add("a", "b", StepType::noop()).unwrap();
        plan.add("b", "c", StepType::noop()).unwrap();
        plan.from("c");

        assert!(matches!(
            plan.copy_chain("a", "a", "c", "z"),
            Err(PlanError::AlreadyDefined { state }) if state == "a"
        ));
        assert!(matches!(
            plan.copy_chain("z", "b", "c", "z"),
            Err(PlanError::InvalidArgument(_))
        ));
        assert_eq!(plan.states().count(), 3);
        assert!(!plan.contains_state("z"));
        assert_eq!(plan.cursor(), "c");
        assert_eq!(plan.transition("a").unwrap().target, "b");
    }

    #[test]
    fn test_follow_path() {
        let plan = linear_plan();
        assert_eq!(
            plan.follow_path("", None).unwrap(),
            vec!["", "1.0", "2.0", "3.0"]
        );
        assert_eq!(plan.follow_path("1.0", Some("2.0")).unwrap(), vec!["1.0", "2.0"]);
        assert_eq!(plan.follow_path("3.0", None).unwrap(), vec!["3.0"]);
        assert!(matches!(
            plan.follow_path("9.9", None),
            Err(MigrationError::UnknownState { .. })
        ));
        assert!(matches!(
            plan.follow_path("2.0", Some("1.0")),
            Err(MigrationError::Plan(PlanError::Graph(_)))
        ));
    }

    #[test]
    fn test_type_mismatch_with_factory() {
        let mut registry = StepRegistry::new();
        registry.register::<StepA>();
        let mut plan = Plan::with_factory("test", Arc::new(registry));

        assert!(plan.chain("1.0", StepType::of::<StepA>()).is_ok());
        assert_eq!(
            plan.chain("2.0", StepType::of::<StepB>()).unwrap_err(),
            PlanError::TypeMismatch { step: "StepB".to_string() }
        );
    }

    #[test]
    fn test_initial_state_override() {
        let mut plan = Plan::new("test").with_initial_state("origin");
        plan.to("1.0").unwrap();
        assert_eq!(plan.initial_state(), "origin");
        assert!(plan.transition("origin").is_some());
        assert!(!plan.contains_state(""));
    }

    #[test]
    fn test_fingerprint_tracks_changes() {
        let mut plan = linear_plan();
        let before = plan.fingerprint();
        assert_eq!(before, linear_plan().fingerprint());
        plan.to("4.0").unwrap();
        assert_ne!(before, plan.fingerprint());
    }

    #[test]
    fn test_post_migrations_deduplicated() {
        let mut plan = linear_plan();
        plan.add_post_migration(StepType::of::<StepA>())
            .add_post_migration(StepType::of::<StepB>())
            .add_post_migration(StepType::of::<StepA>());
        assert_eq!(
            plan.post_migrations(),
            [StepType::of::<StepA>(), StepType::of::<StepB>()]
        );
    }
}
