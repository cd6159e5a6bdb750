// SPDX-License-Identifier: AGPL-3.0

//! Replay of recorded control-flow traces
//!
//! A trace names the contract, its bytecode and, per transaction, the
//! instructions that matter to the walker: gas bounds, and the branch arms
//! leaving an instruction (one constraint and one target address each).
//! Every other instruction falls through to the next one.

use crate::{ExplorationSummary, Interpreter, SevmEvent, Sevm, StepOutcome};
use scry_exceptions::{ScryException, ScryResult};
use scry_smt::Constraint;
use scry_state::opcodes::{HALTING_OPCODES, OP_SELFDESTRUCT, TRANSACTION_END_OPCODES};
use scry_state::{Code, Environment, GlobalState, WorldState};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One way out of a branching instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchArm {
    /// Condition of taking this arm; absent for an unconditional jump
    #[serde(default)]
    pub constraint: Option<Constraint>,
    /// Byte offset of the instruction the arm continues at
    pub target: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceInstruction {
    pub address: usize,
    #[serde(default)]
    pub gas_min: u64,
    #[serde(default)]
    pub gas_max: u64,
    #[serde(default)]
    pub branches: Vec<BranchArm>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionTrace {
    pub id: String,
    pub function: String,
    #[serde(default)]
    pub instructions: Vec<TraceInstruction>,
}

/// Recorded execution of one contract over a sequence of transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    pub contract: String,
    /// Hex, with or without `0x`
    pub bytecode: String,
    pub transactions: Vec<TransactionTrace>,
}

impl ExecutionTrace {
    pub fn from_json(json: &str) -> ScryResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ScryException::Config(format!("invalid execution trace: {}", e)))
    }

    pub fn from_file(path: &Path) -> ScryResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ScryException::Config(format!("cannot read trace {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn code(&self) -> ScryResult<Code> {
        Code::from_hex(&self.bytecode)
    }
}

/// Interpreter stand-in driven by one [`TransactionTrace`]
#[derive(Debug, Clone)]
pub struct ReplayInterpreter {
    recorded: HashMap<usize, TraceInstruction>,
}

impl ReplayInterpreter {
    pub fn new(transaction: &TransactionTrace) -> Self {
        Self {
            recorded: transaction
                .instructions
                .iter()
                .map(|insn| (insn.address, insn.clone()))
                .collect(),
        }
    }
}

impl Interpreter for ReplayInterpreter {
    fn execute(&self, mut state: GlobalState) -> ScryResult<StepOutcome> {
        let insn = state.get_current_instruction()?;
        let recorded = self.recorded.get(&insn.address);
        if let Some(recorded) = recorded {
            state.mstate.use_gas(recorded.gas_min, recorded.gas_max);
        }

        if TRANSACTION_END_OPCODES.contains(&insn.opcode) || insn.opcode == OP_SELFDESTRUCT {
            return Ok(StepOutcome::TransactionEnd(state));
        }
        if HALTING_OPCODES.contains(&insn.opcode) {
            return Ok(StepOutcome::Halted);
        }

        match recorded.filter(|r| !r.branches.is_empty()) {
            Some(recorded) => {
                let mut children = state.fork(
                    recorded
                        .branches
                        .iter()
                        .map(|arm| arm.constraint.clone())
                        .collect(),
                );
                for (child, arm) in children.iter_mut().zip(&recorded.branches) {
                    child.mstate.pc = state.environment().code.index_of(arm.target).ok_or_else(|| {
                        ScryException::MalformedState(format!(
                            "branch target {:#x} at {:#x} is not an instruction",
                            arm.target, insn.address
                        ))
                    })?;
                }
                Ok(StepOutcome::Continue(children))
            }
            None => {
                state.mstate.pc += 1;
                if state.mstate.pc >= state.environment().code.instructions().len() {
                    // running off the end of the code is an implicit STOP
                    Ok(StepOutcome::TransactionEnd(state))
                } else {
                    Ok(StepOutcome::Continue(vec![state]))
                }
            }
        }
    }
}

/// Replay every transaction of `trace`. Each transaction starts from every
/// world state the previous one committed.
pub fn replay(sevm: &Sevm, trace: &ExecutionTrace) -> ScryResult<ExplorationSummary> {
    let code = trace.code()?;
    let mut summary = ExplorationSummary::default();
    let mut world_states: Vec<WorldState> = Vec::new();

    sevm.fire_event(SevmEvent::StartExecution);
    for (index, transaction) in trace.transactions.iter().enumerate() {
        let environment = Arc::new(Environment::new(
            trace.contract.clone(),
            transaction.function.clone(),
            code.clone(),
        ));
        let interpreter = ReplayInterpreter::new(transaction);
        let roots: Vec<GlobalState> = if index == 0 {
            vec![GlobalState::new(environment, transaction.id.clone())]
        } else {
            world_states
                .iter()
                .map(|world| GlobalState::new_transaction(world, environment.clone(), transaction.id.clone()))
                .collect()
        };
        tracing::info!(
            transaction = %transaction.id,
            function = %transaction.function,
            roots = roots.len(),
            "replaying transaction"
        );

        let explored = sevm.explore_roots(roots, &interpreter);
        summary.completed_paths += explored.completed_paths;
        summary.pruned_paths += explored.pruned_paths;
        world_states = explored.world_states;

        if sevm.is_cancelled() {
            break;
        }
    }
    sevm.fire_event(SevmEvent::StopExecution);

    summary.world_states = world_states;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StateHook;
    use scry_state::opcodes::*;
    use scry_state::StateAnnotation;

    #[derive(Debug, Default, Clone)]
    struct Seen(Vec<String>);

    impl StateAnnotation for Seen {
        fn persist_to_world_state(&self) -> bool {
            true
        }

        fn duplicate(&self) -> Option<Box<dyn StateAnnotation>> {
            Some(Box::new(self.clone()))
        }
    }

    // PUSH1 0x08, JUMPI, CALL, STOP, JUMPDEST, STOP, REVERT, JUMPDEST, STOP
    const BYTECODE: &str = "0x600857f1005b00fd5b00";

    fn trace_json() -> String {
        r#"{
            "contract": "Wallet",
            "bytecode": "0x600857f1005b00fd5b00",
            "transactions": [
                {
                    "id": "1",
                    "function": "withdraw()",
                    "instructions": [
                        {"address": 3, "gas_min": 100, "gas_max": 2600},
                        {"address": 2, "branches": [
                            {"constraint": {"op": "var", "name": "flag"}, "target": 8},
                            {"constraint": {"op": "not", "arg": {"op": "var", "name": "flag"}}, "target": 3}
                        ]}
                    ]
                },
                {"id": "2", "function": "deposit()"}
            ]
        }"#
        .to_string()
    }

    fn interp(trace: &ExecutionTrace, tx: usize) -> ReplayInterpreter {
        ReplayInterpreter::new(&trace.transactions[tx])
    }

    fn root(trace: &ExecutionTrace) -> GlobalState {
        let env = Environment::new(
            trace.contract.clone(),
            trace.transactions[0].function.clone(),
            trace.code().unwrap(),
        );
        GlobalState::new(Arc::new(env), "1")
    }

    #[test]
    fn test_parse_trace() {
        let trace = ExecutionTrace::from_json(&trace_json()).unwrap();
        assert_eq!(trace.bytecode, BYTECODE);
        assert_eq!(trace.transactions.len(), 2);
        assert_eq!(trace.transactions[0].instructions[1].branches.len(), 2);
        assert!(trace.transactions[1].instructions.is_empty());
        assert!(ExecutionTrace::from_json("{}").is_err());
    }

    #[test]
    fn test_replay_branches_and_gas() {
        let trace = ExecutionTrace::from_json(&trace_json()).unwrap();
        let interpreter = interp(&trace, 0);

        // PUSH1 falls through, JUMPI forks
        let mut state = root(&trace);
        state = match interpreter.execute(state).unwrap() {
            StepOutcome::Continue(mut next) => next.pop().unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        let children = match interpreter.execute(state).unwrap() {
            StepOutcome::Continue(children) => children,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(children.len(), 2);
        let taken = children[0].get_current_instruction().unwrap();
        let fallthrough = children[1].get_current_instruction().unwrap();
        assert_eq!((taken.address, taken.opcode), (8, OP_JUMPDEST));
        assert_eq!((fallthrough.address, fallthrough.opcode), (3, OP_CALL));

        // CALL charges its recorded gas
        let mut fallthrough = children.into_iter().nth(1).unwrap();
        fallthrough = match interpreter.execute(fallthrough).unwrap() {
            StepOutcome::Continue(mut next) => next.pop().unwrap(),
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(fallthrough.mstate.min_gas_used, 100);
        assert_eq!(fallthrough.mstate.max_gas_used, 2600);
        assert!(matches!(
            interpreter.execute(fallthrough).unwrap(),
            StepOutcome::TransactionEnd(_)
        ));
    }

    #[test]
    fn test_bad_branch_target() {
        let mut trace = ExecutionTrace::from_json(&trace_json()).unwrap();
        trace.transactions[0].instructions[1].branches[0].target = 1;
        let interpreter = interp(&trace, 0);
        let mut state = root(&trace);
        state.mstate.pc = 1;
        assert!(matches!(
            interpreter.execute(state),
            Err(ScryException::MalformedState(_))
        ));
    }

    #[test]
    fn test_replay_chains_transactions() {
        let trace = ExecutionTrace::from_json(&trace_json()).unwrap();
        let mut sevm = Sevm::default();
        let hook: StateHook = Arc::new(|state: &mut GlobalState| {
            let function = state.environment().active_function.clone();
            state.get_or_create_annotation::<Seen>()?.0.push(function);
            Ok(())
        });
        sevm.register_transaction_end_hook(hook);

        let summary = replay(&sevm, &trace).unwrap();
        // tx 1: two paths commit; tx 2 runs once from each and commits again
        assert_eq!(summary.completed_paths, 4);
        assert_eq!(summary.world_states.len(), 2);
        for world in &summary.world_states {
            assert_eq!(
                world.annotations.get::<Seen>().unwrap().0,
                vec!["withdraw()".to_string(), "deposit()".to_string()]
            );
            assert_eq!(world.transaction_ids, vec!["1".to_string(), "2".to_string()]);
        }
    }
}
