// SPDX-License-Identifier: AGPL-3.0

use num_bigint::BigUint;
use num_traits::Zero;
use regex::Regex;
use scry_exceptions::ScryException;
use scry_smt::Sort;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One assignment of a satisfying model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelVariable {
    pub name: String,
    pub sort: Sort,
    #[serde(serialize_with = "scry_smt::biguint_text::serialize")]
    pub value: BigUint,
}

/// Satisfying assignment returned by a solver bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Model {
    variables: BTreeMap<String, ModelVariable>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, sort: Sort, value: impl Into<BigUint>) {
        let name = name.into();
        let value = value.into();
        self.variables.insert(
            name.clone(),
            ModelVariable { name, sort, value },
        );
    }

    pub fn get(&self, name: &str) -> Option<&BigUint> {
        self.variables.get(name).map(|var| &var.value)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelVariable> {
        self.variables.values()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variables.is_empty() {
            return write!(f, "∅");
        }

        for var in self.variables.values() {
            match var.sort {
                Sort::Bool => writeln!(f, "    {} = {}", var.name, !var.value.is_zero())?,
                Sort::BitVec(_) => writeln!(f, "    {} = 0x{:x}", var.name, var.value)?,
            }
        }
        Ok(())
    }
}

fn parse_digits(digits: &str, radix: u32, kind: &str) -> Result<BigUint, String> {
    BigUint::parse_bytes(digits.as_bytes(), radix)
        .ok_or_else(|| format!("Failed to parse {} value: {}", kind, digits))
}

/// Parse constant value from SMT output
pub fn parse_const_value(value: &str) -> Result<BigUint, String> {
    let value = value.trim();
    if let Some(bits) = value.strip_prefix("#b") {
        parse_digits(bits, 2, "binary")
    } else if let Some(digits) = value.strip_prefix("#x") {
        parse_digits(digits, 16, "hex")
    } else if let Some(decimal) = value.strip_prefix("bv") {
        parse_digits(decimal, 10, "bv")
    } else if value.contains("bv") {
        // Pattern: (_ bv123 256)
        for token in value.split_whitespace() {
            if let Some(decimal) = token.strip_prefix("bv") {
                return parse_digits(decimal, 10, "bv token");
            }
        }
        Err(format!("No bv token found in: {}", value))
    } else {
        match value {
            "true" => Ok(BigUint::from(1u32)),
            "false" => Ok(BigUint::zero()),
            _ => Err(format!("Unknown value format: {}", value)),
        }
    }
}

/// Parse `(define-fun ...)` lines of a `(get-model)` answer
pub fn parse_model_str(smtlib_str: &str) -> Result<Model, ScryException> {
    let pattern = Regex::new(
        r"(?x)
        \(\s*define-fun\s+
        \|?([^\s|()]+)\|?\s+             # name
        \(\)\s+
        (Bool|\(_\s+BitVec\s+(\d+)\))\s+ # sort, bit-width
        (                                # value
            \#b[01]+
            |\#x[0-9a-fA-F]+
            |\(_\s+bv\d+\s+\d+\)
            |true|false
        )
        ",
    )
    .map_err(|e| ScryException::Internal(format!("model pattern: {}", e)))?;

    let mut model = Model::new();
    for captures in pattern.captures_iter(smtlib_str) {
        let name = captures[1].to_string();
        let sort = match captures.get(3) {
            Some(width) => Sort::BitVec(
                width
                    .as_str()
                    .parse()
                    .map_err(|e| ScryException::Solver(format!("bad width for {}: {}", name, e)))?,
            ),
            None => Sort::Bool,
        };
        let value = parse_const_value(&captures[4]).map_err(ScryException::Solver)?;
        model.insert(name, sort, value);
    }
    Ok(model)
}
