// SPDX-License-Identifier: AGPL-3.0

//! Solver bridge: satisfiability of path constraints and witness models
//!
//! Detectors only see [`SolverBridge`]. Two backends implement it: the
//! in-process [`Z3Solver`] and [`ExternalSolver`], which hands an SMT-LIB
//! file to a solver process. An unsatisfiable query is the ordinary negative
//! answer ([`SolveError::Unsat`]); anything else that prevents an answer is
//! [`SolveError::Failed`].

mod external;
mod model;
mod sequence;
pub mod testing;
mod z3_bridge;

pub use external::*;
pub use model::*;
pub use sequence::*;
pub use z3_bridge::*;

use scry_exceptions::{ScryException, UnsatError};
use scry_smt::Constraint;
use thiserror::Error;

/// Why a query produced no model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    #[error(transparent)]
    Unsat(#[from] UnsatError),

    #[error(transparent)]
    Failed(#[from] ScryException),
}

impl SolveError {
    pub fn is_unsat(&self) -> bool {
        matches!(self, SolveError::Unsat(_))
    }
}

/// Decides satisfiability of a conjunction of constraints.
///
/// Implementations are called from any exploration worker. Solving the same
/// constraints twice must give the same kind of answer.
pub trait SolverBridge: Send + Sync {
    fn solve(&self, constraints: &[Constraint]) -> Result<Model, SolveError>;

    fn name(&self) -> &str;
}

/// Checks shared by every backend before a query is lowered
pub(crate) fn precheck(constraints: &[Constraint]) -> Result<(), SolveError> {
    for constraint in constraints {
        constraint
            .check_sorts()
            .map_err(|e| ScryException::Solver(format!("ill-sorted constraint: {}", e)))?;
    }
    if constraints.iter().any(|c| c.as_bool() == Some(false)) {
        return Err(UnsatError::new("query contains a literal false").into());
    }
    Ok(())
}
