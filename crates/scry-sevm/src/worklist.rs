// SPDX-License-Identifier: AGPL-3.0

//! Worklist for sequential depth-first exploration

use scry_state::GlobalState;

/// A state waiting to be stepped, with the length of its path so far
#[derive(Debug)]
pub struct Pending {
    pub state: GlobalState,
    pub steps: usize,
}

/// Stack of pending states plus path counters.
#[derive(Debug, Default)]
pub struct Worklist {
    stack: Vec<Pending>,
    completed_paths: usize,
    pruned_paths: usize,
}

impl Worklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pending: Pending) {
        self.stack.push(pending);
    }

    /// Push successors so that the first one is popped first
    pub fn push_successors(&mut self, successors: Vec<Pending>) {
        self.stack.extend(successors.into_iter().rev());
    }

    /// DFS: last in, first out
    pub fn pop(&mut self) -> Option<Pending> {
        self.stack.pop()
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    pub fn mark_completed(&mut self) {
        self.completed_paths += 1;
    }

    /// Count `paths` paths that ended without completing
    pub fn mark_pruned(&mut self, paths: usize) {
        self.pruned_paths += paths;
    }

    pub fn completed_paths(&self) -> usize {
        self.completed_paths
    }

    pub fn pruned_paths(&self) -> usize {
        self.pruned_paths
    }

    /// Drop every pending state, e.g. on cancellation
    pub fn clear(&mut self) {
        self.stack.clear();
    }
}
