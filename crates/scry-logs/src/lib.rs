// SPDX-License-Identifier: AGPL-3.0

//! Logging and diagnostic utilities
//!
//! Library crates log through `tracing` directly. This crate adds the pieces
//! on top: subscriber installation, a catalogue of warning codes with stable
//! documentation anchors, and "log once" helpers for messages that would
//! otherwise repeat on every explored path.

use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing_subscriber::EnvFilter;

/// Warnings base URL
pub const WARNINGS_BASE_URL: &str = "https://github.com/scry/scry/wiki/warnings";

/// Error codes for warnings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InternalError,
    SolverFailure,
    MalformedState,
    DuplicatePlugin,
    UnknownModule,
    PrunedPath,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::InternalError => "internal-error",
            ErrorCode::SolverFailure => "solver-failure",
            ErrorCode::MalformedState => "malformed-state",
            ErrorCode::DuplicatePlugin => "duplicate-plugin",
            ErrorCode::UnknownModule => "unknown-module",
            ErrorCode::PrunedPath => "pruned-path",
        }
    }

    pub fn url(&self) -> String {
        format!("{}#{}", WARNINGS_BASE_URL, self.code())
    }
}

/// Messages already emitted by the `*_once`/unique helpers
static UNIQUE_MESSAGES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Returns true the first time `message` is seen.
fn first_time(message: &str) -> bool {
    let mut messages = UNIQUE_MESSAGES
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    messages.insert(message.to_string())
}

fn is_logged(message: &str) -> bool {
    UNIQUE_MESSAGES
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(message)
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the verbosity count picks the level.
/// Calling this more than once is harmless, later calls are ignored.
pub fn init(verbosity: u8, json: bool) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbosity > 2);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Log a debug message once (no duplicates)
pub fn debug_once(text: &str) {
    if first_time(text) {
        tracing::debug!("{}", text);
    }
}

/// Log a warning once (no duplicates)
pub fn warn_unique(text: &str) {
    if first_time(text) {
        tracing::warn!("{}", text);
    }
}

/// Log a warning with an error code
pub fn warn_code(error_code: ErrorCode, msg: &str, allow_duplicate: bool) {
    let full_msg = format!("{}\n(see {})", msg, error_code.url());
    if allow_duplicate || first_time(&full_msg) {
        tracing::warn!(code = error_code.code(), "{}", full_msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_url() {
        let code = ErrorCode::SolverFailure;
        assert_eq!(code.code(), "solver-failure");
        assert!(code.url().starts_with(WARNINGS_BASE_URL));
        assert!(code.url().ends_with("#solver-failure"));
    }

    #[test]
    fn test_all_error_codes() {
        let codes = [
            ErrorCode::InternalError,
            ErrorCode::SolverFailure,
            ErrorCode::MalformedState,
            ErrorCode::DuplicatePlugin,
            ErrorCode::UnknownModule,
            ErrorCode::PrunedPath,
        ];
        let unique: HashSet<_> = codes.iter().map(|c| c.code()).collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_unique_logging() {
        let msg = "scry-logs test unique message";
        assert!(!is_logged(msg));

        debug_once(msg);
        assert!(is_logged(msg));
        assert!(!first_time(msg));
    }

    #[test]
    fn test_warn_code_duplicates_not_tracked() {
        let msg = "scry-logs duplicate allowed";
        warn_code(ErrorCode::InternalError, msg, true);
        let full = format!("{}\n(see {})", msg, ErrorCode::InternalError.url());
        assert!(!is_logged(&full));

        warn_code(ErrorCode::InternalError, msg, false);
        assert!(is_logged(&full));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(1, false);
        init(3, true);
    }
}
