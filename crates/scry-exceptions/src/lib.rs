// SPDX-License-Identifier: AGPL-3.0

//! Error types shared by every scry crate.
//!
//! Two families live here. [`ScryException`] covers conditions that stop
//! something: a plugin wiring mistake, a malformed state, a hook asking for its
//! path to be pruned, a solver that could not produce an answer. [`UnsatError`]
//! is the solver's ordinary negative answer and is kept as its own type so that
//! callers match on it and move on instead of propagating it.

use thiserror::Error;

/// Errors raised by the analysis core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScryException {
    /// `enable`/`disable` was called with a plugin name that was never loaded.
    #[error("Plugin with name: {0} was not loaded")]
    PluginNotFound(String),

    /// The state is missing data an operation requires (e.g. no instruction at
    /// the program counter, empty environment fields).
    #[error("Malformed state: {0}")]
    MalformedState(String),

    /// A hook asked for the current path to be abandoned.
    #[error("State skipped: {0}")]
    SkipState(String),

    /// The solver failed for a reason other than unsatisfiability.
    #[error("Solver error: {0}")]
    Solver(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScryException {
    /// Whether the error only ends the path that raised it.
    ///
    /// The explorer prunes the path on every hook error; this separates the
    /// expected prunes from the ones worth a warning.
    pub fn is_path_ending(&self) -> bool {
        matches!(
            self,
            ScryException::SkipState(_) | ScryException::MalformedState(_)
        )
    }
}

/// Raised when the path constraints handed to a solver have no model.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsatisfiable: {0}")]
pub struct UnsatError(pub String);

impl UnsatError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Result type for scry operations
pub type ScryResult<T> = Result<T, ScryException>;
