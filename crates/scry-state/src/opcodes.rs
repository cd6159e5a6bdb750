// SPDX-License-Identifier: AGPL-3.0

//! Opcode numbering and mnemonics
//!
//! Only what hooks and disassembly need: byte values, names, instruction
//! lengths and the opcode groups detectors subscribe to.

pub const OP_STOP: u8 = 0x00;
pub const OP_ADD: u8 = 0x01;
pub const OP_MUL: u8 = 0x02;
pub const OP_SUB: u8 = 0x03;
pub const OP_DIV: u8 = 0x04;
pub const OP_LT: u8 = 0x10;
pub const OP_GT: u8 = 0x11;
pub const OP_EQ: u8 = 0x14;
pub const OP_ISZERO: u8 = 0x15;
pub const OP_AND: u8 = 0x16;
pub const OP_OR: u8 = 0x17;
pub const OP_NOT: u8 = 0x19;
pub const OP_SHA3: u8 = 0x20;
pub const OP_ADDRESS: u8 = 0x30;
pub const OP_BALANCE: u8 = 0x31;
pub const OP_ORIGIN: u8 = 0x32;
pub const OP_CALLER: u8 = 0x33;
pub const OP_CALLVALUE: u8 = 0x34;
pub const OP_CALLDATALOAD: u8 = 0x35;
pub const OP_CALLDATASIZE: u8 = 0x36;
pub const OP_RETURNDATASIZE: u8 = 0x3d;
pub const OP_TIMESTAMP: u8 = 0x42;
pub const OP_NUMBER: u8 = 0x43;
pub const OP_POP: u8 = 0x50;
pub const OP_MLOAD: u8 = 0x51;
pub const OP_MSTORE: u8 = 0x52;
pub const OP_SLOAD: u8 = 0x54;
pub const OP_SSTORE: u8 = 0x55;
pub const OP_JUMP: u8 = 0x56;
pub const OP_JUMPI: u8 = 0x57;
pub const OP_PC: u8 = 0x58;
pub const OP_GAS: u8 = 0x5a;
pub const OP_JUMPDEST: u8 = 0x5b;
pub const OP_PUSH0: u8 = 0x5f;
pub const OP_PUSH1: u8 = 0x60;
pub const OP_PUSH32: u8 = 0x7f;
pub const OP_DUP1: u8 = 0x80;
pub const OP_DUP16: u8 = 0x8f;
pub const OP_SWAP1: u8 = 0x90;
pub const OP_SWAP16: u8 = 0x9f;
pub const OP_LOG0: u8 = 0xa0;
pub const OP_LOG4: u8 = 0xa4;
pub const OP_CREATE: u8 = 0xf0;
pub const OP_CALL: u8 = 0xf1;
pub const OP_CALLCODE: u8 = 0xf2;
pub const OP_RETURN: u8 = 0xf3;
pub const OP_DELEGATECALL: u8 = 0xf4;
pub const OP_CREATE2: u8 = 0xf5;
pub const OP_STATICCALL: u8 = 0xfa;
pub const OP_REVERT: u8 = 0xfd;
pub const OP_INVALID: u8 = 0xfe;
pub const OP_SELFDESTRUCT: u8 = 0xff;

// Opcode groups
pub const CALL_OPCODES: &[u8] = &[OP_CALL, OP_DELEGATECALL, OP_STATICCALL, OP_CALLCODE];
/// Instructions that end the transaction successfully
pub const TRANSACTION_END_OPCODES: &[u8] = &[OP_RETURN, OP_STOP];
/// Instructions that end the transaction and roll its effects back
pub const HALTING_OPCODES: &[u8] = &[OP_REVERT, OP_INVALID];

/// Returns the length of an instruction with the given opcode
pub fn insn_len(opcode: u8) -> usize {
    if (OP_PUSH1..=OP_PUSH32).contains(&opcode) {
        1 + (opcode - OP_PUSH0) as usize
    } else {
        1
    }
}

/// Returns a human-readable mnemonic for an opcode
pub fn mnemonic(opcode: u8) -> String {
    let name = match opcode {
        OP_STOP => "STOP",
        OP_ADD => "ADD",
        OP_MUL => "MUL",
        OP_SUB => "SUB",
        OP_DIV => "DIV",
        OP_LT => "LT",
        OP_GT => "GT",
        OP_EQ => "EQ",
        OP_ISZERO => "ISZERO",
        OP_AND => "AND",
        OP_OR => "OR",
        OP_NOT => "NOT",
        OP_SHA3 => "SHA3",
        OP_ADDRESS => "ADDRESS",
        OP_BALANCE => "BALANCE",
        OP_ORIGIN => "ORIGIN",
        OP_CALLER => "CALLER",
        OP_CALLVALUE => "CALLVALUE",
        OP_CALLDATALOAD => "CALLDATALOAD",
        OP_CALLDATASIZE => "CALLDATASIZE",
        OP_RETURNDATASIZE => "RETURNDATASIZE",
        OP_TIMESTAMP => "TIMESTAMP",
        OP_NUMBER => "NUMBER",
        OP_POP => "POP",
        OP_MLOAD => "MLOAD",
        OP_MSTORE => "MSTORE",
        OP_SLOAD => "SLOAD",
        OP_SSTORE => "SSTORE",
        OP_JUMP => "JUMP",
        OP_JUMPI => "JUMPI",
        OP_PC => "PC",
        OP_GAS => "GAS",
        OP_JUMPDEST => "JUMPDEST",
        OP_PUSH0 => "PUSH0",
        OP_CREATE => "CREATE",
        OP_CALL => "CALL",
        OP_CALLCODE => "CALLCODE",
        OP_RETURN => "RETURN",
        OP_DELEGATECALL => "DELEGATECALL",
        OP_CREATE2 => "CREATE2",
        OP_STATICCALL => "STATICCALL",
        OP_REVERT => "REVERT",
        OP_INVALID => "INVALID",
        OP_SELFDESTRUCT => "SELFDESTRUCT",
        OP_PUSH1..=OP_PUSH32 => return format!("PUSH{}", opcode - OP_PUSH0),
        OP_DUP1..=OP_DUP16 => return format!("DUP{}", opcode - OP_DUP1 + 1),
        OP_SWAP1..=OP_SWAP16 => return format!("SWAP{}", opcode - OP_SWAP1 + 1),
        OP_LOG0..=OP_LOG4 => return format!("LOG{}", opcode - OP_LOG0),
        _ => return format!("0x{:02x}", opcode),
    };
    name.to_string()
}
