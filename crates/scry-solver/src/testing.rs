// SPDX-License-Identifier: AGPL-3.0

//! Deterministic solver bridge for tests

use crate::{precheck, Model, SolveError, SolverBridge};
use scry_exceptions::{ScryException, UnsatError};
use scry_smt::{free_vars_of, Constraint, Sort};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Canned answer of a [`ScriptedSolver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Sat,
    Unsat,
    Fail,
}

/// Bridge that answers from a script instead of solving.
///
/// Queries are answered, in order: literal `false` and marked constraints
/// are unsat; then the next queued answer; then the fallback. A sat answer
/// assigns 1 to every free variable.
#[derive(Debug)]
pub struct ScriptedSolver {
    queue: Mutex<VecDeque<Answer>>,
    fallback: Answer,
    unsat_markers: Vec<Constraint>,
    queries: Mutex<Vec<Vec<Constraint>>>,
}

impl ScriptedSolver {
    pub fn new(fallback: Answer) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            unsat_markers: Vec::new(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn always_sat() -> Self {
        Self::new(Answer::Sat)
    }

    pub fn always_unsat() -> Self {
        Self::new(Answer::Unsat)
    }

    /// Queue answers for the next queries
    pub fn then(self, answers: impl IntoIterator<Item = Answer>) -> Self {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(answers);
        self
    }

    /// Any query containing `constraint` is unsat
    pub fn unsat_when(mut self, constraint: Constraint) -> Self {
        self.unsat_markers.push(constraint);
        self
    }

    /// Every query received so far
    pub fn queries(&self) -> Vec<Vec<Constraint>> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SolverBridge for ScriptedSolver {
    fn solve(&self, constraints: &[Constraint]) -> Result<Model, SolveError> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(constraints.to_vec());
        precheck(constraints)?;

        let answer = if constraints.iter().any(|c| self.unsat_markers.contains(c)) {
            Answer::Unsat
        } else {
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front()
                .unwrap_or(self.fallback)
        };

        match answer {
            Answer::Sat => {
                let mut model = Model::new();
                for (name, sort) in free_vars_of(constraints) {
                    model.insert(name, sort, 1u32);
                }
                if model.is_empty() {
                    model.insert("witness", Sort::Bool, 1u32);
                }
                Ok(model)
            }
            Answer::Unsat => Err(UnsatError::new("scripted").into()),
            Answer::Fail => Err(ScryException::Solver("scripted failure".to_string()).into()),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
