// SPDX-License-Identifier: AGPL-3.0

//! Symbolic executor integration point
//!
//! [`Sevm`] owns the hook table that plugins register against and walks the
//! execution tree. Stepping a single state is delegated to an
//! [`Interpreter`]; the walker only decides which state runs next, fires
//! hooks around each step and records how each path ended.

mod hooks;
mod replay;
mod worklist;

pub use hooks::*;
pub use replay::*;
pub use worklist::*;

use rayon::{Scope, ThreadPool, ThreadPoolBuilder};
use scry_exceptions::{ScryException, ScryResult};
use scry_logs::{warn_code, ErrorCode};
use scry_state::{GlobalState, WorldState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// Result of stepping one state
#[derive(Debug)]
pub enum StepOutcome {
    /// Successor states; more than one means the path forked
    Continue(Vec<GlobalState>),
    /// The transaction finished normally and can be committed
    TransactionEnd(GlobalState),
    /// The path ended without committing (revert, invalid instruction)
    Halted,
}

/// Executes the instruction at a state's program counter.
pub trait Interpreter: Sync {
    fn execute(&self, state: GlobalState) -> ScryResult<StepOutcome>;
}

/// Counters and committed world states of an exploration
#[derive(Debug, Default)]
pub struct ExplorationSummary {
    pub completed_paths: usize,
    pub pruned_paths: usize,
    pub world_states: Vec<WorldState>,
}

impl ExplorationSummary {
    pub fn absorb(&mut self, other: ExplorationSummary) {
        self.completed_paths += other.completed_paths;
        self.pruned_paths += other.pruned_paths;
        self.world_states.extend(other.world_states);
    }
}

#[derive(Debug, Clone)]
pub struct SevmOptions {
    /// Worker threads; 0 or 1 explores sequentially
    pub workers: usize,
    /// Max steps per path; 0 means unlimited
    pub max_depth: usize,
}

impl Default for SevmOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            max_depth: 0,
        }
    }
}

/// How one step of one path ended
enum Advance {
    /// Surviving successors, plus how many a post-hook rejected
    Successors(Vec<Pending>, usize),
    Completed(Option<WorldState>),
    /// Number of paths that ended here without completing
    Pruned(usize),
}

/// Symbolic executor: hook table plus tree walker
#[derive(Debug, Default)]
pub struct Sevm {
    hooks: HookTable,
    options: SevmOptions,
    cancelled: AtomicBool,
    /// Worker pool, built once when `options.workers > 1`
    pool: Option<ThreadPool>,
}

impl Sevm {
    pub fn new(options: SevmOptions) -> Self {
        let pool = if options.workers > 1 {
            match ThreadPoolBuilder::new()
                .num_threads(options.workers)
                .thread_name(|index| format!("scry-worker-{}", index))
                .build()
            {
                Ok(pool) => Some(pool),
                Err(e) => {
                    warn_code(
                        ErrorCode::InternalError,
                        &format!("cannot start {} workers, exploring sequentially: {}", options.workers, e),
                        false,
                    );
                    None
                }
            }
        } else {
            None
        };

        Self {
            hooks: HookTable::default(),
            options,
            cancelled: AtomicBool::new(false),
            pool,
        }
    }

    pub fn options(&self) -> &SevmOptions {
        &self.options
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    /// Run `hook` before each instruction whose opcode is in `opcodes`
    pub fn register_pre_hook(&mut self, opcodes: &[u8], hook: StateHook) {
        self.hooks.add_pre(opcodes, hook);
    }

    /// Run `hook` on every successor of an instruction whose opcode is in `opcodes`
    pub fn register_post_hook(&mut self, opcodes: &[u8], hook: StateHook) {
        self.hooks.add_post(opcodes, hook);
    }

    pub fn register_event_hook(&mut self, event: SevmEvent, hook: EventHook) {
        self.hooks.add_event(event, hook);
    }

    /// Run `hook` on a state whose transaction ended, before it is committed
    pub fn register_transaction_end_hook(&mut self, hook: StateHook) {
        self.hooks.add_transaction_end(hook);
    }

    /// Stop exploration. Paths in flight finish their current step and are
    /// then dropped.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn fire_event(&self, event: SevmEvent) {
        for hook in self.hooks.events(event) {
            hook();
        }
    }

    /// Explore the tree under `root`, firing the start and stop events
    /// around it.
    pub fn explore(&self, root: GlobalState, interpreter: &dyn Interpreter) -> ExplorationSummary {
        self.fire_event(SevmEvent::StartExecution);
        let summary = self.explore_root(root, interpreter);
        self.fire_event(SevmEvent::StopExecution);
        summary
    }

    /// Explore the tree under `root` without lifecycle events
    pub fn explore_root(&self, root: GlobalState, interpreter: &dyn Interpreter) -> ExplorationSummary {
        self.explore_roots(vec![root], interpreter)
    }

    /// Explore the trees under all of `roots` without lifecycle events.
    ///
    /// With a worker pool every root and every fork becomes a pool task, so
    /// independent roots are explored concurrently.
    pub fn explore_roots(&self, roots: Vec<GlobalState>, interpreter: &dyn Interpreter) -> ExplorationSummary {
        let roots = roots.into_iter().map(|state| Pending { state, steps: 0 });
        match &self.pool {
            Some(pool) => self.explore_parallel(pool, roots.collect(), interpreter),
            None => {
                let mut summary = ExplorationSummary::default();
                for root in roots {
                    summary.absorb(self.explore_sequential(root, interpreter));
                }
                summary
            }
        }
    }

    fn explore_sequential(&self, root: Pending, interpreter: &dyn Interpreter) -> ExplorationSummary {
        let mut worklist = Worklist::new();
        let mut world_states = Vec::new();
        worklist.push(root);

        while let Some(pending) = worklist.pop() {
            if self.is_cancelled() {
                tracing::debug!(dropped = worklist.len() + 1, "exploration cancelled");
                worklist.clear();
                break;
            }
            match self.advance(pending, interpreter) {
                Advance::Successors(successors, rejected) => {
                    worklist.mark_pruned(rejected);
                    worklist.push_successors(successors);
                }
                Advance::Completed(world_state) => {
                    worklist.mark_completed();
                    world_states.extend(world_state);
                }
                Advance::Pruned(paths) => worklist.mark_pruned(paths),
            }
        }

        ExplorationSummary {
            completed_paths: worklist.completed_paths(),
            pruned_paths: worklist.pruned_paths(),
            world_states,
        }
    }

    fn explore_parallel(
        &self,
        pool: &ThreadPool,
        roots: Vec<Pending>,
        interpreter: &dyn Interpreter,
    ) -> ExplorationSummary {
        let summary = Mutex::new(ExplorationSummary::default());
        pool.install(|| {
            rayon::scope(|scope| {
                for root in roots {
                    let summary = &summary;
                    scope.spawn(move |scope| self.walk_path(scope, root, interpreter, summary));
                }
            })
        });
        summary.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    /// Follow one path to its end. The first successor of a fork continues
    /// here; the others are spawned as new tasks, so the native stack stays
    /// flat however deep the tree is.
    fn walk_path<'s>(
        &'s self,
        scope: &Scope<'s>,
        root: Pending,
        interpreter: &'s dyn Interpreter,
        summary: &'s Mutex<ExplorationSummary>,
    ) {
        let mut local = ExplorationSummary::default();
        let mut current = Some(root);

        while let Some(pending) = current.take() {
            if self.is_cancelled() {
                break;
            }
            match self.advance(pending, interpreter) {
                Advance::Successors(successors, rejected) => {
                    local.pruned_paths += rejected;
                    let mut successors = successors.into_iter();
                    current = successors.next();
                    for child in successors {
                        scope.spawn(move |scope| self.walk_path(scope, child, interpreter, summary));
                    }
                }
                Advance::Completed(world_state) => {
                    local.completed_paths += 1;
                    local.world_states.extend(world_state);
                }
                Advance::Pruned(paths) => local.pruned_paths += paths,
            }
        }

        summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .absorb(local);
    }

    /// Pre-hooks, one interpreter step, then post-hooks on each successor.
    fn advance(&self, pending: Pending, interpreter: &dyn Interpreter) -> Advance {
        let Pending { mut state, steps } = pending;

        if self.options.max_depth > 0 && steps >= self.options.max_depth {
            tracing::debug!(path = %state.id(), steps, "path reached max depth");
            return Advance::Pruned(1);
        }

        let instruction = match state.get_current_instruction() {
            Ok(instruction) => instruction,
            Err(e) => return self.prune(&state, e),
        };

        if let Err(e) = run_state_hooks(self.hooks.pre(instruction.opcode), &mut state) {
            return self.prune(&state, e);
        }

        let path = state.id();
        let outcome = match interpreter.execute(state) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::debug!(%path, address = instruction.address, error = %e, "interpreter error");
                return Advance::Pruned(1);
            }
        };

        match outcome {
            StepOutcome::Continue(successors) => {
                let post = self.hooks.post(instruction.opcode);
                let mut rejected = 0;
                let successors = successors
                    .into_iter()
                    .filter(|successor| {
                        let possible = successor.constraints().is_possible();
                        if !possible {
                            tracing::debug!(path = %successor.id(), "infeasible branch dropped");
                        }
                        possible
                    })
                    .filter_map(|mut successor| match run_state_hooks(post, &mut successor) {
                        Ok(()) => Some(Pending {
                            state: successor,
                            steps: steps + 1,
                        }),
                        Err(e) => {
                            self.log_pruned(&successor, &e);
                            rejected += 1;
                            None
                        }
                    })
                    .collect::<Vec<_>>();
                if successors.is_empty() {
                    // a path whose every arm is infeasible still ends here
                    Advance::Pruned(rejected.max(1))
                } else {
                    Advance::Successors(successors, rejected)
                }
            }
            StepOutcome::TransactionEnd(mut state) => {
                if let Err(e) = run_state_hooks(self.hooks.transaction_end(), &mut state) {
                    return self.prune(&state, e);
                }
                Advance::Completed(Some(state.commit_transaction()))
            }
            StepOutcome::Halted => Advance::Completed(None),
        }
    }

    fn prune(&self, state: &GlobalState, error: ScryException) -> Advance {
        self.log_pruned(state, &error);
        Advance::Pruned(1)
    }

    fn log_pruned(&self, state: &GlobalState, error: &ScryException) {
        if error.is_path_ending() {
            tracing::debug!(path = %state.id(), error = %error, "path pruned");
        } else {
            warn_code(
                ErrorCode::PrunedPath,
                &format!("{} pruned: {}", state.id(), error),
                true,
            );
        }
    }
}
