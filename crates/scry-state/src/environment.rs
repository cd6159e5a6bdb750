// SPDX-License-Identifier: AGPL-3.0

//! Read-only execution environment of a state

use crate::opcodes::{insn_len, mnemonic};
use scry_exceptions::{ScryException, ScryResult};
use std::fmt;

/// One decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Byte offset in the bytecode
    pub address: usize,
    pub opcode: u8,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x} {}", self.address, mnemonic(self.opcode))
    }
}

/// Bytecode of a contract together with its instruction list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    bytecode: Vec<u8>,
    instructions: Vec<Instruction>,
}

impl Code {
    /// Linear-sweep decode of raw bytecode. Push immediates are skipped; a
    /// truncated trailing push still yields its instruction.
    pub fn from_bytes(bytecode: Vec<u8>) -> Self {
        let mut instructions = Vec::new();
        let mut address = 0;
        while address < bytecode.len() {
            let opcode = bytecode[address];
            instructions.push(Instruction { address, opcode });
            address += insn_len(opcode);
        }
        Self {
            bytecode,
            instructions,
        }
    }

    pub fn from_hex(hexcode: &str) -> ScryResult<Self> {
        let trimmed = hexcode.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(stripped)
            .map_err(|e| ScryException::MalformedState(format!("invalid bytecode hex: {}", e)))?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Instruction-list index of the instruction at byte offset `address`
    pub fn index_of(&self, address: usize) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&address, |insn| insn.address)
            .ok()
    }
}

/// Active contract, function and code of a state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub active_contract: String,
    pub active_function: String,
    pub code: Code,
}

impl Environment {
    pub fn new(
        active_contract: impl Into<String>,
        active_function: impl Into<String>,
        code: Code,
    ) -> Self {
        Self {
            active_contract: active_contract.into(),
            active_function: active_function.into(),
            code,
        }
    }

    /// Fails when a field needed to describe a finding is missing.
    pub fn require_complete(&self) -> ScryResult<()> {
        if self.active_contract.is_empty() {
            return Err(ScryException::MalformedState(
                "environment has no active contract".to_string(),
            ));
        }
        if self.active_function.is_empty() {
            return Err(ScryException::MalformedState(
                "environment has no active function".to_string(),
            ));
        }
        if self.code.bytecode().is_empty() {
            return Err(ScryException::MalformedState(format!(
                "contract {} has no bytecode",
                self.active_contract
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::*;

    #[test]
    fn test_linear_sweep_skips_push_data() {
        // PUSH1 0x01 PUSH2 0xf1f1 CALL STOP
        let code = Code::from_hex("0x600161f1f1f100").unwrap();
        let ops: Vec<_> = code
            .instructions()
            .iter()
            .map(|i| (i.address, i.opcode))
            .collect();
        assert_eq!(
            ops,
            vec![(0, OP_PUSH1), (2, 0x61), (5, OP_CALL), (6, OP_STOP)]
        );
        assert_eq!(code.index_of(5), Some(2));
        assert_eq!(code.index_of(3), None);
    }

    #[test]
    fn test_invalid_hex() {
        assert!(matches!(
            Code::from_hex("0xzz"),
            Err(ScryException::MalformedState(_))
        ));
    }

    #[test]
    fn test_require_complete() {
        let code = Code::from_hex("00").unwrap();
        assert!(Environment::new("Token", "transfer()", code.clone())
            .require_complete()
            .is_ok());
        assert!(Environment::new("", "transfer()", code.clone())
            .require_complete()
            .is_err());
        assert!(Environment::new("Token", "", code).require_complete().is_err());
        assert!(Environment::new("Token", "f()", Code::from_bytes(vec![]))
            .require_complete()
            .is_err());
    }

    #[test]
    fn test_instruction_display() {
        let insn = Instruction {
            address: 0x20,
            opcode: OP_CALL,
        };
        assert_eq!(insn.to_string(), "0x0020 CALL");
    }
}
