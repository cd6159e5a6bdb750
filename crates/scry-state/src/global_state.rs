// SPDX-License-Identifier: AGPL-3.0

use crate::{
    Annotations, Constraints, Environment, Instruction, MachineState, StateAnnotation, WorldState,
};
use scry_exceptions::{ScryException, ScryResult};
use scry_smt::Constraint;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_PATH_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a node in the execution tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathId(u64);

impl PathId {
    fn next() -> Self {
        PathId(NEXT_PATH_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path-{}", self.0)
    }
}

/// One node of the symbolic execution tree.
///
/// A state is owned by exactly one worker at a time. It is not `Clone`: new
/// states come from [`fork`](Self::fork), [`enter_call`](Self::enter_call) or
/// [`new_transaction`](Self::new_transaction), all of which copy annotations
/// through their own duplication rule.
#[derive(Debug)]
pub struct GlobalState {
    id: PathId,
    parent: Option<PathId>,
    environment: Arc<Environment>,
    pub mstate: MachineState,
    constraints: Constraints,
    annotations: Annotations,
    transaction_ids: Vec<String>,
}

impl GlobalState {
    /// Root state of a first transaction
    pub fn new(environment: Arc<Environment>, transaction_id: impl Into<String>) -> Self {
        Self::new_transaction(&WorldState::default(), environment, transaction_id)
    }

    /// Entry state of a transaction on top of a committed world state. The
    /// world state's annotations are duplicated so several transactions can
    /// start from the same commit.
    pub fn new_transaction(
        world_state: &WorldState,
        environment: Arc<Environment>,
        transaction_id: impl Into<String>,
    ) -> Self {
        let mut transaction_ids = world_state.transaction_ids.clone();
        transaction_ids.push(transaction_id.into());
        Self {
            id: PathId::next(),
            parent: None,
            environment,
            mstate: MachineState::new(),
            constraints: world_state.constraints.clone(),
            annotations: world_state.annotations.fork(),
            transaction_ids,
        }
    }

    pub fn id(&self) -> PathId {
        self.id
    }

    pub fn parent(&self) -> Option<PathId> {
        self.parent
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.append(constraint);
    }

    /// Transaction ids of this path, oldest first
    pub fn transaction_ids(&self) -> &[String] {
        &self.transaction_ids
    }

    pub fn current_transaction_id(&self) -> Option<&str> {
        self.transaction_ids.last().map(String::as_str)
    }

    pub fn get_current_instruction(&self) -> ScryResult<Instruction> {
        self.environment
            .code
            .instructions()
            .get(self.mstate.pc)
            .copied()
            .ok_or_else(|| {
                ScryException::MalformedState(format!(
                    "pc {} is out of range for {} ({} instructions)",
                    self.mstate.pc,
                    self.environment.active_contract,
                    self.environment.code.instructions().len()
                ))
            })
    }

    /// Split this state into one child per branch. Each child gets the
    /// parent's constraints plus its branch constraint, if any, and its own
    /// duplicate of every annotation that has a duplication rule.
    pub fn fork(&self, branches: Vec<Option<Constraint>>) -> Vec<GlobalState> {
        branches
            .into_iter()
            .map(|branch| {
                let mut child = self.child(self.environment.clone(), self.annotations.fork());
                if let Some(constraint) = branch {
                    child.constraints.append(constraint);
                }
                child
            })
            .collect()
    }

    /// Callee frame of an external call. Only annotations that persist over
    /// calls are carried into it.
    pub fn enter_call(&self, callee: Arc<Environment>) -> GlobalState {
        let annotations = self
            .annotations
            .duplicate_where(|annotation| annotation.persist_over_calls());
        let mut frame = self.child(callee, annotations);
        frame.mstate = MachineState {
            depth: self.mstate.depth + 1,
            ..MachineState::default()
        };
        frame
    }

    /// Fold a finished callee frame back into this caller state.
    pub fn return_from_call(&mut self, callee: GlobalState) -> ScryResult<()> {
        if callee.mstate.depth != self.mstate.depth + 1 {
            return Err(ScryException::MalformedState(format!(
                "returning frame at depth {} into caller at depth {}",
                callee.mstate.depth, self.mstate.depth
            )));
        }
        self.constraints.extend(callee.constraints.iter().cloned());
        self.annotations.absorb(
            callee
                .annotations
                .duplicate_where(|annotation| annotation.persist_over_calls()),
        );
        self.mstate.min_gas_used = self
            .mstate
            .min_gas_used
            .saturating_add(callee.mstate.min_gas_used);
        self.mstate.max_gas_used = self
            .mstate
            .max_gas_used
            .saturating_add(callee.mstate.max_gas_used);
        Ok(())
    }

    /// What survives the end of the current transaction.
    pub fn commit_transaction(&self) -> WorldState {
        WorldState {
            annotations: self
                .annotations
                .duplicate_where(|annotation| annotation.persist_to_world_state()),
            constraints: self.constraints.clone(),
            transaction_ids: self.transaction_ids.clone(),
        }
    }

    pub fn annotations(&self) -> &Annotations {
        &self.annotations
    }

    pub fn annotations_mut(&mut self) -> &mut Annotations {
        &mut self.annotations
    }

    pub fn annotate(&mut self, annotation: Box<dyn StateAnnotation>) {
        self.annotations.insert(annotation);
    }

    /// The undiscriminated annotation of type `A`; see [`Annotations::get`]
    pub fn get_annotation<A: StateAnnotation>(&self) -> Option<&A> {
        self.annotations.get::<A>()
    }

    pub fn get_or_create_annotation<A: StateAnnotation + Default>(&mut self) -> ScryResult<&mut A> {
        self.annotations.get_or_create::<A>()
    }

    fn child(&self, environment: Arc<Environment>, annotations: Annotations) -> GlobalState {
        GlobalState {
            id: PathId::next(),
            parent: Some(self.id),
            environment,
            mstate: self.mstate.clone(),
            constraints: self.constraints.clone(),
            annotations,
            transaction_ids: self.transaction_ids.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;
    use crate::Code;
    use scry_smt::BitVec;

    #[derive(Debug, Default, Clone)]
    struct Offsets(Vec<usize>);

    impl StateAnnotation for Offsets {
        fn duplicate(&self) -> Option<Box<dyn StateAnnotation>> {
            Some(Box::new(self.clone()))
        }
    }

    #[derive(Debug, Default, Clone)]
    struct Sticky(u32);

    impl StateAnnotation for Sticky {
        fn persist_over_calls(&self) -> bool {
            true
        }

        fn persist_to_world_state(&self) -> bool {
            true
        }

        fn duplicate(&self) -> Option<Box<dyn StateAnnotation>> {
            Some(Box::new(self.clone()))
        }
    }

    fn env(contract: &str) -> Arc<Environment> {
        let code = Code::from_bytes(vec![OP_PUSH1, 0x00, OP_CALL, OP_STOP]);
        Arc::new(Environment::new(contract, "run()", code))
    }

    fn cond(name: &str) -> Constraint {
        BitVec::var(name, 256).ugt(BitVec::constant(0, 256))
    }

    #[test]
    fn test_fork_gives_each_child_independent_copies() {
        let mut parent = GlobalState::new(env("A"), "1");
        parent.get_or_create_annotation::<Offsets>().unwrap().0.push(10);
        parent.get_or_create_annotation::<Sticky>().unwrap().0 = 1;

        let mut children = parent.fork(vec![Some(cond("x")), Some(!cond("x")), None]);
        assert_eq!(children.len(), 3);

        children[0].get_or_create_annotation::<Offsets>().unwrap().0.push(20);
        children[1].get_or_create_annotation::<Sticky>().unwrap().0 = 7;

        assert_eq!(parent.get_annotation::<Offsets>().unwrap().0, vec![10]);
        assert_eq!(parent.get_annotation::<Sticky>().unwrap().0, 1);
        assert_eq!(children[0].get_annotation::<Offsets>().unwrap().0, vec![10, 20]);
        assert_eq!(children[1].get_annotation::<Offsets>().unwrap().0, vec![10]);
        assert_eq!(children[2].get_annotation::<Offsets>().unwrap().0, vec![10]);
        assert_eq!(children[0].get_annotation::<Sticky>().unwrap().0, 1);
        assert_eq!(children[1].get_annotation::<Sticky>().unwrap().0, 7);
    }

    #[test]
    fn test_fork_only_adds_constraints() {
        let mut parent = GlobalState::new(env("A"), "1");
        parent.add_constraint(cond("a"));

        let children = parent.fork(vec![Some(cond("b")), None]);
        assert_eq!(children[0].constraints().len(), 2);
        assert_eq!(children[1].constraints().len(), 1);
        for child in &children {
            assert!(child.constraints().extends(parent.constraints()));
            assert_eq!(child.parent(), Some(parent.id()));
            assert_ne!(child.id(), parent.id());
        }
    }

    #[test]
    fn test_call_boundary_keeps_only_call_persistent_annotations() {
        let mut caller = GlobalState::new(env("A"), "1");
        caller.get_or_create_annotation::<Offsets>().unwrap().0.push(2);
        caller.get_or_create_annotation::<Sticky>().unwrap().0 = 3;

        let mut callee = caller.enter_call(env("B"));
        assert_eq!(callee.mstate.depth, 1);
        assert_eq!(callee.environment().active_contract, "B");
        assert!(callee.get_annotation::<Offsets>().is_none());

        callee.get_or_create_annotation::<Sticky>().unwrap().0 = 9;
        callee.get_or_create_annotation::<Offsets>().unwrap().0.push(99);
        callee.add_constraint(cond("inner"));
        callee.mstate.use_gas(5, 8);

        caller.return_from_call(callee).unwrap();
        assert_eq!(caller.get_annotation::<Sticky>().unwrap().0, 9);
        assert_eq!(caller.get_annotation::<Offsets>().unwrap().0, vec![2]);
        assert_eq!(caller.constraints().len(), 1);
        assert_eq!(caller.mstate.max_gas_used, 8);
    }

    #[test]
    fn test_return_from_wrong_depth_is_rejected() {
        let mut caller = GlobalState::new(env("A"), "1");
        let stranger = GlobalState::new(env("B"), "1");
        assert!(matches!(
            caller.return_from_call(stranger),
            Err(ScryException::MalformedState(_))
        ));
    }

    #[test]
    fn test_commit_resets_transaction_scoped_annotations() {
        let mut state = GlobalState::new(env("A"), "1");
        state.get_or_create_annotation::<Offsets>().unwrap().0.push(2);
        state.get_or_create_annotation::<Sticky>().unwrap().0 = 4;
        state.add_constraint(cond("first"));

        let world = state.commit_transaction();
        let next = GlobalState::new_transaction(&world, env("A"), "2");

        assert!(next.get_annotation::<Offsets>().is_none());
        assert_eq!(next.get_annotation::<Sticky>().unwrap().0, 4);
        assert_eq!(next.transaction_ids(), ["1".to_string(), "2".to_string()]);
        assert_eq!(next.current_transaction_id(), Some("2"));
        assert_eq!(next.constraints().len(), 1);
    }

    #[test]
    fn test_current_instruction() {
        let mut state = GlobalState::new(env("A"), "1");
        state.mstate.pc = 1;
        assert_eq!(
            state.get_current_instruction().unwrap(),
            Instruction {
                address: 2,
                opcode: OP_CALL
            }
        );
        state.mstate.pc = 3;
        assert!(state.get_current_instruction().is_err());
    }
}
