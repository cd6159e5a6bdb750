// SPDX-License-Identifier: AGPL-3.0

use crate::{parse_const_value, precheck, Model, SolveError, SolverBridge};
use num_bigint::BigUint;
use scry_exceptions::{ScryException, UnsatError};
use scry_smt::{free_vars_of, BitVec, Constraint, Sort};
use z3::ast::{Ast, Bool, BV};

/// In-process z3 bridge.
///
/// Every query gets a fresh context, so one bridge can be shared by all
/// exploration workers.
#[derive(Debug, Clone, Default)]
pub struct Z3Solver {
    timeout_ms: u64,
}

impl Z3Solver {
    /// `timeout_ms == 0` disables the per-query timeout
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }
}

impl SolverBridge for Z3Solver {
    fn solve(&self, constraints: &[Constraint]) -> Result<Model, SolveError> {
        precheck(constraints)?;

        let mut cfg = z3::Config::new();
        cfg.set_model_generation(true);
        if self.timeout_ms > 0 {
            cfg.set_timeout_msec(self.timeout_ms);
        }
        let ctx = z3::Context::new(&cfg);
        let solver = z3::Solver::new(&ctx);

        for constraint in constraints {
            solver.assert(&lower_constraint(&ctx, constraint)?);
        }

        match solver.check() {
            z3::SatResult::Unsat => {
                tracing::trace!(constraints = constraints.len(), "z3: unsat");
                Err(UnsatError::new(format!("{} constraints", constraints.len())).into())
            }
            z3::SatResult::Unknown => {
                let reason = solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "unknown".to_string());
                Err(ScryException::Solver(format!("z3 returned unknown: {}", reason)).into())
            }
            z3::SatResult::Sat => {
                let z3_model = solver
                    .get_model()
                    .ok_or_else(|| ScryException::Solver("z3 returned sat without a model".to_string()))?;
                let mut model = Model::new();
                for (name, sort) in free_vars_of(constraints) {
                    let value = match sort {
                        Sort::Bool => z3_model
                            .eval(&Bool::new_const(&ctx, name.as_str()), true)
                            .and_then(|b| b.as_bool())
                            .map(|b| BigUint::from(u8::from(b))),
                        Sort::BitVec(width) => z3_model
                            .eval(&BV::new_const(&ctx, name.as_str(), width), true)
                            .map(|bv| parse_const_value(&bv.to_string()))
                            .transpose()
                            .map_err(|e| {
                                ScryException::Solver(format!("value of {}: {}", name, e))
                            })?,
                    };
                    if let Some(value) = value {
                        model.insert(name, sort, value);
                    }
                }
                Ok(model)
            }
        }
    }

    fn name(&self) -> &str {
        "z3"
    }
}

fn lower_constraint<'ctx>(
    ctx: &'ctx z3::Context,
    constraint: &Constraint,
) -> Result<Bool<'ctx>, ScryException> {
    Ok(match constraint {
        Constraint::Const { value } => Bool::from_bool(ctx, *value),
        Constraint::Var { name } => Bool::new_const(ctx, name.as_str()),
        Constraint::Not { arg } => lower_constraint(ctx, arg)?.not(),
        Constraint::And { args } | Constraint::Or { args } => {
            let lowered = args
                .iter()
                .map(|arg| lower_constraint(ctx, arg))
                .collect::<Result<Vec<_>, _>>()?;
            let refs: Vec<&Bool<'ctx>> = lowered.iter().collect();
            if matches!(constraint, Constraint::And { .. }) {
                Bool::and(ctx, &refs)
            } else {
                Bool::or(ctx, &refs)
            }
        }
        Constraint::Eq { lhs, rhs } => lower_bv(ctx, lhs)?._eq(&lower_bv(ctx, rhs)?),
        Constraint::Ult { lhs, rhs } => lower_bv(ctx, lhs)?.bvult(&lower_bv(ctx, rhs)?),
        Constraint::Ule { lhs, rhs } => lower_bv(ctx, lhs)?.bvule(&lower_bv(ctx, rhs)?),
        Constraint::Ugt { lhs, rhs } => lower_bv(ctx, lhs)?.bvugt(&lower_bv(ctx, rhs)?),
        Constraint::Uge { lhs, rhs } => lower_bv(ctx, lhs)?.bvuge(&lower_bv(ctx, rhs)?),
    })
}

fn lower_bv<'ctx>(ctx: &'ctx z3::Context, term: &BitVec) -> Result<BV<'ctx>, ScryException> {
    Ok(match term {
        BitVec::Const { value, width } => BV::from_str(ctx, *width, &value.to_str_radix(10))
            .ok_or_else(|| ScryException::Solver(format!("cannot build constant {}", term)))?,
        BitVec::Var { name, width } => BV::new_const(ctx, name.as_str(), *width),
        BitVec::Add { lhs, rhs } => lower_bv(ctx, lhs)?.bvadd(&lower_bv(ctx, rhs)?),
        BitVec::Sub { lhs, rhs } => lower_bv(ctx, lhs)?.bvsub(&lower_bv(ctx, rhs)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_model_str;
    use scry_smt::mask;

    fn big(value: u64) -> BigUint {
        BigUint::from(value)
    }

    fn x() -> BitVec {
        BitVec::var("call_value_1", 256)
    }

    #[test]
    fn test_sat_with_model() {
        let solver = Z3Solver::new(0);
        let model = solver
            .solve(&[
                x().ugt(BitVec::constant(10, 256)),
                x().ult(BitVec::constant(12, 256)),
            ])
            .unwrap();
        assert_eq!(model.get("call_value_1"), Some(&big(11)));
    }

    #[test]
    fn test_unsat() {
        let solver = Z3Solver::new(1000);
        let err = solver
            .solve(&[
                x().ult(BitVec::constant(5, 256)),
                x().ugt(BitVec::constant(5, 256)),
            ])
            .unwrap_err();
        assert!(err.is_unsat());
    }

    #[test]
    fn test_boolean_structure() {
        let solver = Z3Solver::default();
        let a = Constraint::var("a");
        let b = Constraint::var("b");
        let model = solver
            .solve(&[Constraint::or(vec![a.clone(), b.clone()]), !a])
            .unwrap();
        assert_eq!(model.get("a"), Some(&big(0)));
        assert_eq!(model.get("b"), Some(&big(1)));
    }

    #[test]
    fn test_wrapping_arithmetic() {
        let solver = Z3Solver::default();
        let y = BitVec::var("y", 8);
        let model = solver
            .solve(&[y
                .clone()
                .add(BitVec::constant(1, 8))
                .eq_to(BitVec::constant(0, 8))])
            .unwrap();
        assert_eq!(model.get("y"), Some(&big(255)));
    }

    #[test]
    fn test_full_width_witness() {
        let solver = Z3Solver::default();
        let word = BitVec::var("caller_1", 256);
        let model = solver
            .solve(&[word
                .clone()
                .add(BitVec::constant(1, 256))
                .eq_to(BitVec::constant(0, 256))])
            .unwrap();
        assert_eq!(model.get("caller_1"), Some(&mask(256)));

        // The all-ones constant lowers intact and reads back through text.
        let pinned = solver
            .solve(&[word.eq_to(BitVec::big_constant(mask(256), 256))])
            .unwrap();
        assert_eq!(pinned.get("caller_1"), Some(&mask(256)));

        let text = format!("(define-fun caller_1 () (_ BitVec 256) #x{:064x})", mask(256));
        assert_eq!(parse_model_str(&text).unwrap(), pinned);
    }
}
