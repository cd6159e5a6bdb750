// SPDX-License-Identifier: AGPL-3.0

//! Multiple external calls executed in one transaction

use crate::modules::{DetectionModule, ModuleState};
use crate::swc::MULTIPLE_SENDS;
use crate::{Issue, IssueDetails, Severity};
use scry_exceptions::ScryResult;
use scry_logs::{warn_code, ErrorCode};
use scry_solver::{get_transaction_sequence, SolveError, SolverBridge};
use scry_state::opcodes::{CALL_OPCODES, OP_CALL, OP_CALLCODE, OP_DELEGATECALL, OP_RETURN, OP_STATICCALL, OP_STOP};
use scry_state::{GlobalState, StateAnnotation};
use std::sync::Arc;

const PRE_HOOKS: &[u8] = &[
    OP_CALL,
    OP_DELEGATECALL,
    OP_STATICCALL,
    OP_CALLCODE,
    OP_RETURN,
    OP_STOP,
];

/// Addresses of the call instructions met so far in the current transaction
#[derive(Debug, Clone, Default)]
pub struct MultipleSendsAnnotation {
    pub call_offsets: Vec<usize>,
}

impl StateAnnotation for MultipleSendsAnnotation {
    fn duplicate(&self) -> Option<Box<dyn StateAnnotation>> {
        Some(Box::new(self.clone()))
    }
}

pub struct MultipleSendsModule {
    base: ModuleState,
    solver: Arc<dyn SolverBridge>,
}

impl MultipleSendsModule {
    pub fn new(solver: Arc<dyn SolverBridge>) -> Self {
        Self {
            base: ModuleState::new(),
            solver,
        }
    }
}

impl std::fmt::Debug for MultipleSendsModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipleSendsModule")
            .field("base", &self.base)
            .field("solver", &self.solver.name())
            .finish()
    }
}

impl DetectionModule for MultipleSendsModule {
    fn name(&self) -> &str {
        "Multiple Sends"
    }

    fn swc_id(&self) -> &str {
        MULTIPLE_SENDS
    }

    fn description(&self) -> &str {
        "Check for multiple sends in a single transaction"
    }

    fn pre_hooks(&self) -> &[u8] {
        PRE_HOOKS
    }

    fn base(&self) -> &ModuleState {
        &self.base
    }

    fn analyze_state(&self, state: &mut GlobalState) -> ScryResult<Vec<Issue>> {
        let instruction = state.get_current_instruction()?;

        let annotation = state.get_or_create_annotation::<MultipleSendsAnnotation>()?;
        if CALL_OPCODES.contains(&instruction.opcode) {
            annotation.call_offsets.push(instruction.address);
            return Ok(Vec::new());
        }

        // RETURN or STOP: the first call on its own is fine
        let later_calls = annotation.call_offsets.iter().skip(1).copied().collect::<Vec<_>>();
        for offset in later_calls {
            let transaction_sequence = match get_transaction_sequence(
                self.solver.as_ref(),
                state,
                state.constraints().as_slice(),
            ) {
                Ok(sequence) => sequence,
                Err(SolveError::Unsat(_)) => continue,
                Err(SolveError::Failed(e)) => {
                    warn_code(
                        ErrorCode::SolverFailure,
                        &format!("multiple sends at {:#x}: {}", offset, e),
                        false,
                    );
                    continue;
                }
            };

            let details = IssueDetails {
                address: offset,
                swc_id: MULTIPLE_SENDS.to_string(),
                title: "Multiple Calls in a Single Transaction".to_string(),
                severity: Severity::Low,
                description_head: "Multiple calls are executed in the same transaction.".to_string(),
                description_tail: "This call is executed after a previous call in the same transaction. \
                    Try to isolate each call, transfer or send into its own transaction."
                    .to_string(),
            };
            return Ok(vec![Issue::from_state(state, details, Some(transaction_sequence))?]);
        }

        Ok(Vec::new())
    }
}
