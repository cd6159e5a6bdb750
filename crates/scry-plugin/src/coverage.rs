// SPDX-License-Identifier: AGPL-3.0

//! Instruction coverage

use crate::{LaserPlugin, PluginBuilder};
use scry_sevm::{Sevm, SevmEvent};
use scry_state::GlobalState;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};

pub const COVERAGE_PLUGIN_NAME: &str = "coverage";

#[derive(Debug, Default)]
struct ContractCoverage {
    instructions: usize,
    visited: BTreeSet<usize>,
}

/// Visited instruction addresses per contract, shared by all workers
#[derive(Debug, Default)]
pub struct InstructionCoverage {
    contracts: Mutex<BTreeMap<String, ContractCoverage>>,
}

impl InstructionCoverage {
    pub fn record(&self, state: &GlobalState) {
        let Ok(instruction) = state.get_current_instruction() else {
            return;
        };
        let environment = state.environment();
        let mut contracts = self.contracts.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = contracts
            .entry(environment.active_contract.clone())
            .or_default();
        entry.instructions = environment.code.instructions().len();
        entry.visited.insert(instruction.address);
    }

    /// Percentage of instructions visited in `contract`
    pub fn percentage(&self, contract: &str) -> Option<f64> {
        let contracts = self.contracts.lock().unwrap_or_else(PoisonError::into_inner);
        contracts.get(contract).map(|entry| {
            if entry.instructions == 0 {
                0.0
            } else {
                entry.visited.len() as f64 * 100.0 / entry.instructions as f64
            }
        })
    }

    /// One line per contract: `<contract>: <pct>% (<visited>/<total>)`
    pub fn report(&self) -> Vec<String> {
        let contracts = self.contracts.lock().unwrap_or_else(PoisonError::into_inner);
        contracts
            .iter()
            .map(|(name, entry)| {
                let pct = if entry.instructions == 0 {
                    0.0
                } else {
                    entry.visited.len() as f64 * 100.0 / entry.instructions as f64
                };
                format!(
                    "{}: {:.2}% ({}/{})",
                    name,
                    pct,
                    entry.visited.len(),
                    entry.instructions
                )
            })
            .collect()
    }
}

/// Records every executed instruction and logs coverage when execution stops
pub struct InstructionCoveragePlugin {
    coverage: Arc<InstructionCoverage>,
}

impl LaserPlugin for InstructionCoveragePlugin {
    fn initialize(&self, sevm: &mut Sevm) {
        let all_opcodes: Vec<u8> = (0..=u8::MAX).collect();
        let coverage = self.coverage.clone();
        sevm.register_pre_hook(
            &all_opcodes,
            Arc::new(move |state: &mut GlobalState| {
                coverage.record(state);
                Ok(())
            }),
        );

        let coverage = self.coverage.clone();
        sevm.register_event_hook(
            SevmEvent::StopExecution,
            Arc::new(move || {
                for line in coverage.report() {
                    tracing::info!("Achieved {} coverage", line);
                }
            }),
        );
    }
}

/// Builds coverage plugins that all report into one shared table
#[derive(Debug, Default)]
pub struct InstructionCoveragePluginBuilder {
    coverage: Arc<InstructionCoverage>,
}

impl InstructionCoveragePluginBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coverage(&self) -> Arc<InstructionCoverage> {
        self.coverage.clone()
    }
}

impl PluginBuilder for InstructionCoveragePluginBuilder {
    fn name(&self) -> &str {
        COVERAGE_PLUGIN_NAME
    }

    fn build(&self) -> Box<dyn LaserPlugin> {
        Box::new(InstructionCoveragePlugin {
            coverage: self.coverage.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PluginLoader;
    use scry_exceptions::ScryResult;
    use scry_sevm::{Interpreter, StepOutcome};
    use scry_state::opcodes::*;
    use scry_state::{Code, Environment};

    struct Linear;

    impl Interpreter for Linear {
        fn execute(&self, mut state: GlobalState) -> ScryResult<StepOutcome> {
            if state.get_current_instruction()?.opcode == OP_STOP {
                return Ok(StepOutcome::TransactionEnd(state));
            }
            state.mstate.pc += 1;
            Ok(StepOutcome::Continue(vec![state]))
        }
    }

    #[test]
    fn test_coverage_through_loader() {
        let builder = Arc::new(InstructionCoveragePluginBuilder::new());
        let coverage = builder.coverage();
        let loader = PluginLoader::new();
        loader.load(builder);

        let mut sevm = Sevm::default();
        loader.instrument(&mut sevm, None);

        // CALL, STOP, then two unreachable bytes
        let code = Code::from_bytes(vec![OP_CALL, OP_STOP, OP_REVERT, OP_STOP]);
        let root = GlobalState::new(Arc::new(Environment::new("Vault", "f()", code)), "1");
        sevm.explore(root, &Linear);

        assert_eq!(coverage.percentage("Vault"), Some(50.0));
        assert_eq!(coverage.report(), vec!["Vault: 50.00% (2/4)"]);
        assert_eq!(coverage.percentage("Other"), None);
    }
}
