// SPDX-License-Identifier: AGPL-3.0

//! Symbolic terms for path constraints
//!
//! Terms are plain owned trees, so states carrying them can be moved freely
//! between exploration workers. A solver bridge lowers them into whatever its
//! backend needs; the [`Display`](std::fmt::Display) impls render SMT-LIB 2.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// All-ones value of a `width`-bit vector
pub fn mask(width: u32) -> BigUint {
    if width == 0 {
        BigUint::zero()
    } else {
        (BigUint::one() << width as usize) - BigUint::one()
    }
}

/// Serde helpers carrying a [`BigUint`] as text.
///
/// Writes decimal; reads decimal, `0x`-prefixed hex or a plain JSON integer.
pub mod biguint_text {
    use num_bigint::BigUint;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Num(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigUint, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Num(n) => Ok(BigUint::from(n)),
            Repr::Text(text) => {
                let parsed = match text.strip_prefix("0x") {
                    Some(digits) => BigUint::parse_bytes(digits.as_bytes(), 16),
                    None => BigUint::parse_bytes(text.as_bytes(), 10),
                };
                parsed.ok_or_else(|| de::Error::custom(format!("invalid integer: {}", text)))
            }
        }
    }
}

/// Sort of a free variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sort {
    Bool,
    BitVec(u32),
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "Bool"),
            Sort::BitVec(width) => write!(f, "(_ BitVec {})", width),
        }
    }
}

/// Free variables of a term, by name
pub type FreeVars = BTreeMap<String, Sort>;

/// A fixed-width bit-vector term
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BitVec {
    Const {
        #[serde(with = "biguint_text")]
        value: BigUint,
        width: u32,
    },
    Var { name: String, width: u32 },
    Add { lhs: Box<BitVec>, rhs: Box<BitVec> },
    Sub { lhs: Box<BitVec>, rhs: Box<BitVec> },
}

impl BitVec {
    pub fn constant(value: u64, width: u32) -> Self {
        BitVec::Const {
            value: BigUint::from(value),
            width,
        }
    }

    /// Constant of any width, e.g. a full 256-bit word
    pub fn big_constant(value: BigUint, width: u32) -> Self {
        BitVec::Const { value, width }
    }

    pub fn var(name: impl Into<String>, width: u32) -> Self {
        BitVec::Var {
            name: name.into(),
            width,
        }
    }

    /// Width in bits. Binary operations take the width of their left operand;
    /// [`Constraint::check_sorts`] rejects mismatched operands.
    pub fn width(&self) -> u32 {
        match self {
            BitVec::Const { width, .. } | BitVec::Var { width, .. } => *width,
            BitVec::Add { lhs, .. } | BitVec::Sub { lhs, .. } => lhs.width(),
        }
    }

    pub fn add(self, rhs: BitVec) -> BitVec {
        BitVec::Add {
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn sub(self, rhs: BitVec) -> BitVec {
        BitVec::Sub {
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn eq_to(self, rhs: BitVec) -> Constraint {
        Constraint::Eq { lhs: self, rhs }
    }

    pub fn ult(self, rhs: BitVec) -> Constraint {
        Constraint::Ult { lhs: self, rhs }
    }

    pub fn ule(self, rhs: BitVec) -> Constraint {
        Constraint::Ule { lhs: self, rhs }
    }

    pub fn ugt(self, rhs: BitVec) -> Constraint {
        Constraint::Ugt { lhs: self, rhs }
    }

    pub fn uge(self, rhs: BitVec) -> Constraint {
        Constraint::Uge { lhs: self, rhs }
    }

    fn collect_vars(&self, vars: &mut FreeVars) {
        match self {
            BitVec::Const { .. } => {}
            BitVec::Var { name, width } => {
                vars.insert(name.clone(), Sort::BitVec(*width));
            }
            BitVec::Add { lhs, rhs } | BitVec::Sub { lhs, rhs } => {
                lhs.collect_vars(vars);
                rhs.collect_vars(vars);
            }
        }
    }

    fn check_sorts(&self) -> Result<(), String> {
        match self {
            BitVec::Const { value, width } => {
                if *width == 0 {
                    return Err("zero-width constant".to_string());
                }
                if value.bits() > u64::from(*width) {
                    return Err(format!("constant {} does not fit in {} bits", value, width));
                }
                Ok(())
            }
            BitVec::Var { name, width } => {
                if *width == 0 {
                    Err(format!("zero-width variable {}", name))
                } else {
                    Ok(())
                }
            }
            BitVec::Add { lhs, rhs } | BitVec::Sub { lhs, rhs } => check_binary(lhs, rhs),
        }
    }
}

fn check_binary(lhs: &BitVec, rhs: &BitVec) -> Result<(), String> {
    lhs.check_sorts()?;
    rhs.check_sorts()?;
    if lhs.width() != rhs.width() {
        return Err(format!(
            "width mismatch: {} has {} bits, {} has {} bits",
            lhs,
            lhs.width(),
            rhs,
            rhs.width()
        ));
    }
    Ok(())
}

impl fmt::Display for BitVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitVec::Const { value, width } => write!(f, "(_ bv{} {})", value, width),
            BitVec::Var { name, .. } => write!(f, "|{}|", name),
            BitVec::Add { lhs, rhs } => write!(f, "(bvadd {} {})", lhs, rhs),
            BitVec::Sub { lhs, rhs } => write!(f, "(bvsub {} {})", lhs, rhs),
        }
    }
}

/// A boolean predicate, the unit of a path condition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Constraint {
    Const { value: bool },
    Var { name: String },
    Not { arg: Box<Constraint> },
    And { args: Vec<Constraint> },
    Or { args: Vec<Constraint> },
    Eq { lhs: BitVec, rhs: BitVec },
    Ult { lhs: BitVec, rhs: BitVec },
    Ule { lhs: BitVec, rhs: BitVec },
    Ugt { lhs: BitVec, rhs: BitVec },
    Uge { lhs: BitVec, rhs: BitVec },
}

impl Constraint {
    pub fn truth() -> Self {
        Constraint::Const { value: true }
    }

    pub fn falsity() -> Self {
        Constraint::Const { value: false }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Constraint::Var { name: name.into() }
    }

    pub fn and(args: Vec<Constraint>) -> Self {
        Constraint::And { args }
    }

    pub fn or(args: Vec<Constraint>) -> Self {
        Constraint::Or { args }
    }

    /// Concrete truth value, if the term is a literal
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Constraint::Const { value } => Some(*value),
            _ => None,
        }
    }

    /// Free variables with their sorts
    pub fn free_vars(&self) -> FreeVars {
        let mut vars = FreeVars::new();
        self.collect_vars(&mut vars);
        vars
    }

    fn collect_vars(&self, vars: &mut FreeVars) {
        match self {
            Constraint::Const { .. } => {}
            Constraint::Var { name } => {
                vars.insert(name.clone(), Sort::Bool);
            }
            Constraint::Not { arg } => arg.collect_vars(vars),
            Constraint::And { args } | Constraint::Or { args } => {
                for arg in args {
                    arg.collect_vars(vars);
                }
            }
            Constraint::Eq { lhs, rhs }
            | Constraint::Ult { lhs, rhs }
            | Constraint::Ule { lhs, rhs }
            | Constraint::Ugt { lhs, rhs }
            | Constraint::Uge { lhs, rhs } => {
                lhs.collect_vars(vars);
                rhs.collect_vars(vars);
            }
        }
    }

    /// Reject terms a backend cannot lower: zero widths, oversized constants
    /// and operands of different widths.
    pub fn check_sorts(&self) -> Result<(), String> {
        match self {
            Constraint::Const { .. } | Constraint::Var { .. } => Ok(()),
            Constraint::Not { arg } => arg.check_sorts(),
            Constraint::And { args } | Constraint::Or { args } => {
                args.iter().try_for_each(Constraint::check_sorts)
            }
            Constraint::Eq { lhs, rhs }
            | Constraint::Ult { lhs, rhs }
            | Constraint::Ule { lhs, rhs }
            | Constraint::Ugt { lhs, rhs }
            | Constraint::Uge { lhs, rhs } => check_binary(lhs, rhs),
        }
    }
}

impl std::ops::Not for Constraint {
    type Output = Constraint;

    fn not(self) -> Constraint {
        match self {
            Constraint::Const { value } => Constraint::Const { value: !value },
            other => Constraint::Not {
                arg: Box::new(other),
            },
        }
    }
}

/// Free variables of a whole constraint set
pub fn free_vars_of(constraints: &[Constraint]) -> FreeVars {
    let mut vars = FreeVars::new();
    for constraint in constraints {
        constraint.collect_vars(&mut vars);
    }
    vars
}

fn write_nary(f: &mut fmt::Formatter<'_>, op: &str, args: &[Constraint], unit: bool) -> fmt::Result {
    match args {
        [] => write!(f, "{}", unit),
        [single] => write!(f, "{}", single),
        _ => {
            write!(f, "({}", op)?;
            for arg in args {
                write!(f, " {}", arg)?;
            }
            write!(f, ")")
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Const { value } => write!(f, "{}", value),
            Constraint::Var { name } => write!(f, "|{}|", name),
            Constraint::Not { arg } => write!(f, "(not {})", arg),
            Constraint::And { args } => write_nary(f, "and", args, true),
            Constraint::Or { args } => write_nary(f, "or", args, false),
            Constraint::Eq { lhs, rhs } => write!(f, "(= {} {})", lhs, rhs),
            Constraint::Ult { lhs, rhs } => write!(f, "(bvult {} {})", lhs, rhs),
            Constraint::Ule { lhs, rhs } => write!(f, "(bvule {} {})", lhs, rhs),
            Constraint::Ugt { lhs, rhs } => write!(f, "(bvugt {} {})", lhs, rhs),
            Constraint::Uge { lhs, rhs } => write!(f, "(bvuge {} {})", lhs, rhs),
        }
    }
}
