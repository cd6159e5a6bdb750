// SPDX-License-Identifier: AGPL-3.0

//! Smart contract weakness classification (SWC) identifiers

pub const DEFAULT_FUNCTION_VISIBILITY: &str = "100";
pub const INTEGER_OVERFLOW_AND_UNDERFLOW: &str = "101";
pub const UNCHECKED_RET_VAL: &str = "104";
pub const UNPROTECTED_ETHER_WITHDRAWAL: &str = "105";
pub const UNPROTECTED_SELFDESTRUCT: &str = "106";
pub const REENTRANCY: &str = "107";
pub const ASSERT_VIOLATION: &str = "110";
pub const DELEGATECALL_TO_UNTRUSTED_CONTRACT: &str = "112";
pub const MULTIPLE_SENDS: &str = "113";
pub const TX_ORDER_DEPENDENCE: &str = "114";
pub const TX_ORIGIN_USAGE: &str = "115";
pub const TIMESTAMP_DEPENDENCE: &str = "116";
pub const UNEXPECTED_ETHER_BALANCE: &str = "132";

const SWC_TITLES: &[(&str, &str)] = &[
    (DEFAULT_FUNCTION_VISIBILITY, "Function Default Visibility"),
    (INTEGER_OVERFLOW_AND_UNDERFLOW, "Integer Overflow and Underflow"),
    (UNCHECKED_RET_VAL, "Unchecked Call Return Value"),
    (UNPROTECTED_ETHER_WITHDRAWAL, "Unprotected Ether Withdrawal"),
    (UNPROTECTED_SELFDESTRUCT, "Unprotected SELFDESTRUCT Instruction"),
    (REENTRANCY, "Reentrancy"),
    (ASSERT_VIOLATION, "Assert Violation"),
    (DELEGATECALL_TO_UNTRUSTED_CONTRACT, "Delegatecall to Untrusted Callee"),
    (MULTIPLE_SENDS, "DoS with Failed Call"),
    (TX_ORDER_DEPENDENCE, "Transaction Order Dependence"),
    (TX_ORIGIN_USAGE, "Authorization through tx.origin"),
    (TIMESTAMP_DEPENDENCE, "Block values as a proxy for time"),
    (UNEXPECTED_ETHER_BALANCE, "Unexpected Ether balance"),
];

pub fn swc_title(swc_id: &str) -> Option<&'static str> {
    SWC_TITLES
        .iter()
        .find(|(id, _)| *id == swc_id)
        .map(|(_, title)| *title)
}
