// SPDX-License-Identifier: AGPL-3.0

use crate::Issue;
use scry_exceptions::ScryResult;
use scry_state::GlobalState;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

/// How a module is invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// Before (pre-hooks) or after (post-hooks) each listed opcode
    Callback,
    /// On the final state of every committed transaction
    Post,
}

#[derive(Debug, Default)]
struct Findings {
    cache: HashSet<usize>,
    issues: Vec<Issue>,
}

/// Findings of one module instance, shared by every explored path
#[derive(Debug, Default)]
pub struct ModuleState {
    findings: Mutex<Findings>,
}

impl ModuleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an issue was already reported at `address`
    pub fn is_cached(&self, address: usize) -> bool {
        self.findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cache
            .contains(&address)
    }

    /// Append `issue` unless its address was already reported. Returns
    /// whether it was appended.
    pub fn record_issue(&self, issue: Issue) -> bool {
        let mut findings = self.findings.lock().unwrap_or_else(PoisonError::into_inner);
        if !findings.cache.insert(issue.address()) {
            return false;
        }
        findings.issues.push(issue);
        true
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .issues
            .clone()
    }

    pub fn reset(&self) {
        let mut findings = self.findings.lock().unwrap_or_else(PoisonError::into_inner);
        findings.cache.clear();
        findings.issues.clear();
    }
}

/// A detector observing execution at declared hook points.
///
/// One instance serves the whole run. [`execute`](Self::execute) skips
/// states whose current address was already reported and records what
/// [`analyze_state`](Self::analyze_state) returns. Only confirmed findings
/// enter the address cache, so an infeasible candidate never hides a later
/// feasible one at the same address.
pub trait DetectionModule: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn swc_id(&self) -> &str;

    fn description(&self) -> &str;

    fn entry_point(&self) -> EntryPoint {
        EntryPoint::Callback
    }

    fn pre_hooks(&self) -> &[u8] {
        &[]
    }

    fn post_hooks(&self) -> &[u8] {
        &[]
    }

    fn base(&self) -> &ModuleState;

    /// Detection logic proper. May read and mutate the state's annotations.
    fn analyze_state(&self, state: &mut GlobalState) -> ScryResult<Vec<Issue>>;

    /// Returns the findings that were newly recorded.
    fn execute(&self, state: &mut GlobalState) -> ScryResult<Vec<Issue>> {
        let address = state.get_current_instruction()?.address;
        if self.base().is_cached(address) {
            return Ok(Vec::new());
        }

        // analysis runs unlocked; it may wait on the solver
        let issues = self.analyze_state(state)?;
        Ok(issues
            .into_iter()
            .filter(|issue| self.base().record_issue(issue.clone()))
            .collect())
    }

    fn record_issue(&self, issue: Issue) -> bool {
        self.base().record_issue(issue)
    }

    fn issues(&self) -> Vec<Issue> {
        self.base().issues()
    }

    fn reset_module(&self) {
        self.base().reset()
    }
}
