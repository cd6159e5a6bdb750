// SPDX-License-Identifier: AGPL-3.0

//! Run summary and exit status

use scry_analysis::{Issue, Severity};
use serde::Serialize;
use std::time::Duration;

/// Process exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exitcode {
    NoIssues = 0,
    IssuesFound = 1,
    Error = 2,
}

/// Everything one run produced, as written to `--json-output`
#[derive(Debug, Clone, Serialize)]
pub struct MainResult {
    pub exitcode: i32,
    pub completed_paths: usize,
    pub pruned_paths: usize,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub issues: Vec<Issue>,
}

impl MainResult {
    pub fn new(issues: Vec<Issue>, completed_paths: usize, pruned_paths: usize, duration: Duration) -> Self {
        let exitcode = if issues.is_empty() {
            Exitcode::NoIssues
        } else {
            Exitcode::IssuesFound
        };
        Self {
            exitcode: exitcode as i32,
            completed_paths,
            pruned_paths,
            duration,
            issues,
        }
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Issue count per severity, highest first
    pub fn count_by_severity(&self) -> Vec<(Severity, usize)> {
        [Severity::High, Severity::Medium, Severity::Low]
            .into_iter()
            .map(|severity| {
                let count = self.issues.iter().filter(|i| i.severity() == severity).count();
                (severity, count)
            })
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exitcode_values() {
        assert_eq!(Exitcode::NoIssues as i32, 0);
        assert_eq!(Exitcode::IssuesFound as i32, 1);
        assert_eq!(Exitcode::Error as i32, 2);
    }

    #[test]
    fn test_empty_result() {
        let result = MainResult::new(Vec::new(), 0, 0, Duration::ZERO);
        assert!(!result.has_issues());
        assert_eq!(result.exitcode, 0);
        assert!(result.count_by_severity().is_empty());
    }

    #[test]
    fn test_duration_is_human_readable() {
        let result = MainResult::new(Vec::new(), 3, 1, Duration::from_millis(1500));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration"], "1s 500ms");
        assert_eq!(json["completed_paths"], 3);
    }
}
