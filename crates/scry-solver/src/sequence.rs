// SPDX-License-Identifier: AGPL-3.0

use crate::{Model, SolveError, SolverBridge};
use scry_smt::Constraint;
use scry_state::GlobalState;
use serde::Serialize;

/// Concrete inputs of one transaction of a witness
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionStep {
    pub transaction_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calldata: Option<String>,
}

/// Transactions that drive the contract into a reported state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionSequence {
    pub steps: Vec<TransactionStep>,
    pub model: Model,
}

impl TransactionSequence {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn field(model: &Model, name: &str, transaction_id: &str) -> Option<String> {
    model
        .get(&format!("{}_{}", name, transaction_id))
        .map(|value| format!("0x{:x}", value))
}

/// Solve `constraints` and read the model back as one step per transaction
/// of `state`, oldest first.
pub fn get_transaction_sequence(
    solver: &dyn SolverBridge,
    state: &GlobalState,
    constraints: &[Constraint],
) -> Result<TransactionSequence, SolveError> {
    let model = solver.solve(constraints)?;

    let steps = state
        .transaction_ids()
        .iter()
        .map(|transaction_id| TransactionStep {
            transaction_id: transaction_id.clone(),
            caller: field(&model, "caller", transaction_id),
            call_value: field(&model, "call_value", transaction_id),
            calldata: field(&model, "calldata", transaction_id),
        })
        .collect();

    Ok(TransactionSequence { steps, model })
}
