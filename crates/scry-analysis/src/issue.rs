// SPDX-License-Identifier: AGPL-3.0

//! Findings reported by detection modules

use crate::swc::swc_title;
use scry_exceptions::ScryResult;
use scry_solver::TransactionSequence;
use scry_state::GlobalState;
use serde::Serialize;
use sha3::{Digest, Keccak256};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
        }
    }
}

/// What a detector found, before the state supplies the location context
#[derive(Debug, Clone)]
pub struct IssueDetails {
    pub address: usize,
    pub swc_id: String,
    pub title: String,
    pub severity: Severity,
    pub description_head: String,
    pub description_tail: String,
}

/// Keccak-256 of the bytecode, `0x`-prefixed hex
pub fn bytecode_hash(bytecode: &[u8]) -> String {
    format!("0x{}", hex::encode(Keccak256::digest(bytecode)))
}

/// A reported vulnerability. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    contract: String,
    function: String,
    address: usize,
    swc_id: String,
    title: String,
    severity: Severity,
    description_head: String,
    description_tail: String,
    min_gas_used: u64,
    max_gas_used: u64,
    bytecode_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction_sequence: Option<TransactionSequence>,
}

impl Issue {
    /// Fails with `MalformedState` when the state's environment lacks a
    /// contract name, function name or bytecode.
    pub fn from_state(
        state: &GlobalState,
        details: IssueDetails,
        transaction_sequence: Option<TransactionSequence>,
    ) -> ScryResult<Issue> {
        let environment = state.environment();
        environment.require_complete()?;

        Ok(Issue {
            contract: environment.active_contract.clone(),
            function: environment.active_function.clone(),
            address: details.address,
            swc_id: details.swc_id,
            title: details.title,
            severity: details.severity,
            description_head: details.description_head,
            description_tail: details.description_tail,
            min_gas_used: state.mstate.min_gas_used,
            max_gas_used: state.mstate.max_gas_used,
            bytecode_hash: bytecode_hash(environment.code.bytecode()),
            transaction_sequence,
        })
    }

    /// A copy of this issue carrying `transaction_sequence` as its witness
    pub fn with_transaction_sequence(&self, transaction_sequence: TransactionSequence) -> Issue {
        Issue {
            transaction_sequence: Some(transaction_sequence),
            ..self.clone()
        }
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn address(&self) -> usize {
        self.address
    }

    pub fn swc_id(&self) -> &str {
        &self.swc_id
    }

    pub fn swc_title(&self) -> Option<&'static str> {
        swc_title(&self.swc_id)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn description_head(&self) -> &str {
        &self.description_head
    }

    pub fn description_tail(&self) -> &str {
        &self.description_tail
    }

    pub fn description(&self) -> String {
        format!("{}\n{}", self.description_head, self.description_tail)
    }

    pub fn gas_used(&self) -> (u64, u64) {
        (self.min_gas_used, self.max_gas_used)
    }

    pub fn bytecode_hash(&self) -> &str {
        &self.bytecode_hash
    }

    pub fn transaction_sequence(&self) -> Option<&TransactionSequence> {
        self.transaction_sequence.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swc::MULTIPLE_SENDS;
    use scry_exceptions::ScryException;
    use scry_state::{Code, Environment};
    use std::sync::Arc;

    fn details() -> IssueDetails {
        IssueDetails {
            address: 20,
            swc_id: MULTIPLE_SENDS.to_string(),
            title: "Multiple Calls in a Single Transaction".to_string(),
            severity: Severity::Low,
            description_head: "head".to_string(),
            description_tail: "tail".to_string(),
        }
    }

    fn state(contract: &str) -> GlobalState {
        let env = Environment::new(contract, "pay()", Code::from_bytes(vec![0xf1, 0x00]));
        let mut state = GlobalState::new(Arc::new(env), "1");
        state.mstate.use_gas(700, 9000);
        state
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert_eq!(Severity::High.to_string(), "High");
    }

    #[test]
    fn test_from_state() {
        let issue = Issue::from_state(&state("Wallet"), details(), None).unwrap();
        assert_eq!(issue.contract(), "Wallet");
        assert_eq!(issue.function(), "pay()");
        assert_eq!(issue.address(), 20);
        assert_eq!(issue.gas_used(), (700, 9000));
        assert_eq!(issue.swc_title(), Some("DoS with Failed Call"));
        assert_eq!(issue.description(), "head\ntail");
        assert_eq!(issue.bytecode_hash(), bytecode_hash(&[0xf1, 0x00]));
        assert!(issue.transaction_sequence().is_none());
    }

    #[test]
    fn test_malformed_state() {
        assert!(matches!(
            Issue::from_state(&state(""), details(), None),
            Err(ScryException::MalformedState(_))
        ));
    }

    #[test]
    fn test_with_transaction_sequence_leaves_original() {
        let issue = Issue::from_state(&state("Wallet"), details(), None).unwrap();
        let witnessed = issue.with_transaction_sequence(TransactionSequence::default());
        assert!(issue.transaction_sequence().is_none());
        assert!(witnessed.transaction_sequence().is_some());
        assert_eq!(witnessed.address(), issue.address());
    }

    #[test]
    fn test_bytecode_hash_of_empty_input() {
        assert_eq!(
            bytecode_hash(&[]),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_serialize() {
        let issue = Issue::from_state(&state("Wallet"), details(), None).unwrap();
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["severity"], "Low");
        assert_eq!(json["swc_id"], "113");
        assert!(json.get("transaction_sequence").is_none());
    }
}
