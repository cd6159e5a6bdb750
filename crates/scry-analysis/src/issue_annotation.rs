// SPDX-License-Identifier: AGPL-3.0

//! Tentative findings carried on a state until they can be confirmed

use crate::modules::DetectionModule;
use crate::Issue;
use scry_logs::{warn_code, ErrorCode};
use scry_plugin::{LaserPlugin, PluginBuilder};
use scry_sevm::Sevm;
use scry_smt::Constraint;
use scry_solver::{get_transaction_sequence, SolveError, SolverBridge};
use scry_state::{GlobalState, StateAnnotation};
use std::sync::Arc;

pub const ISSUE_CONFIRMATION_PLUGIN_NAME: &str = "issue-confirmation";

/// A draft issue plus the conditions that must all hold for it to stand.
///
/// Travels over calls and into the world state, so a finding raised in one
/// transaction can be confirmed by constraints gathered in a later one.
#[derive(Debug, Clone)]
pub struct IssueAnnotation {
    pub conditions: Vec<Constraint>,
    pub issue: Issue,
    pub detector: Arc<dyn DetectionModule>,
}

impl IssueAnnotation {
    pub fn new(conditions: Vec<Constraint>, issue: Issue, detector: Arc<dyn DetectionModule>) -> Self {
        Self {
            conditions,
            issue,
            detector,
        }
    }
}

impl StateAnnotation for IssueAnnotation {
    fn persist_to_world_state(&self) -> bool {
        true
    }

    fn persist_over_calls(&self) -> bool {
        true
    }

    fn discriminator(&self) -> Option<String> {
        Some(format!("{}@{}", self.detector.name(), self.issue.address()))
    }

    fn duplicate(&self) -> Option<Box<dyn StateAnnotation>> {
        Some(Box::new(self.clone()))
    }
}

/// Check every tentative issue on `state` against its current constraints.
///
/// Each condition is first checked on its own; one unsatisfiable condition
/// discards the issue. The survivors are solved together for a witness that
/// becomes the confirmed issue's transaction sequence. Issues whose detector
/// already reported their address are skipped.
pub fn confirm_issue_annotations(
    state: &GlobalState,
    solver: &dyn SolverBridge,
) -> Vec<(Arc<dyn DetectionModule>, Issue)> {
    let mut confirmed = Vec::new();

    for annotation in state.annotations().of_type::<IssueAnnotation>() {
        if annotation.detector.base().is_cached(annotation.issue.address()) {
            continue;
        }

        let each_holds = annotation.conditions.iter().all(|condition| {
            let query = state.constraints().with([condition.clone()]);
            match solver.solve(&query) {
                Ok(_) => true,
                Err(SolveError::Unsat(_)) => false,
                Err(SolveError::Failed(e)) => {
                    warn_code(
                        ErrorCode::SolverFailure,
                        &format!("confirming {}: {}", annotation.issue.title(), e),
                        false,
                    );
                    false
                }
            }
        });
        if !each_holds {
            continue;
        }

        let query = state.constraints().with(annotation.conditions.iter().cloned());
        match get_transaction_sequence(solver, state, &query) {
            Ok(sequence) => confirmed.push((
                annotation.detector.clone(),
                annotation.issue.with_transaction_sequence(sequence),
            )),
            Err(SolveError::Unsat(_)) => {}
            Err(SolveError::Failed(e)) => warn_code(
                ErrorCode::SolverFailure,
                &format!("confirming {}: {}", annotation.issue.title(), e),
                false,
            ),
        }
    }

    confirmed
}

/// Promotes confirmed tentative issues when a transaction ends
pub struct IssueConfirmationPlugin {
    solver: Arc<dyn SolverBridge>,
}

impl LaserPlugin for IssueConfirmationPlugin {
    fn initialize(&self, sevm: &mut Sevm) {
        let solver = self.solver.clone();
        sevm.register_transaction_end_hook(Arc::new(move |state: &mut GlobalState| {
            for (detector, issue) in confirm_issue_annotations(state, solver.as_ref()) {
                if detector.record_issue(issue) {
                    tracing::debug!(detector = detector.name(), "tentative issue confirmed");
                }
            }
            Ok(())
        }));
    }
}

pub struct IssueConfirmationPluginBuilder {
    solver: Arc<dyn SolverBridge>,
}

impl IssueConfirmationPluginBuilder {
    pub fn new(solver: Arc<dyn SolverBridge>) -> Self {
        Self { solver }
    }
}

impl PluginBuilder for IssueConfirmationPluginBuilder {
    fn name(&self) -> &str {
        ISSUE_CONFIRMATION_PLUGIN_NAME
    }

    fn build(&self) -> Box<dyn LaserPlugin> {
        Box::new(IssueConfirmationPlugin {
            solver: self.solver.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::{ModuleState, MultipleSendsModule};
    use crate::{IssueDetails, Severity};
    use scry_smt::BitVec;
    use scry_solver::testing::ScriptedSolver;
    use scry_state::{Code, Environment};

    fn state() -> GlobalState {
        let env = Environment::new("Bank", "withdraw()", Code::from_bytes(vec![0xf1, 0x00]));
        GlobalState::new(Arc::new(env), "1")
    }

    fn draft(state: &GlobalState, address: usize) -> Issue {
        let details = IssueDetails {
            address,
            swc_id: "107".to_string(),
            title: "Tentative".to_string(),
            severity: Severity::Medium,
            description_head: "head".to_string(),
            description_tail: "tail".to_string(),
        };
        Issue::from_state(state, details, None).unwrap()
    }

    fn detector() -> Arc<dyn DetectionModule> {
        Arc::new(MultipleSendsModule::new(Arc::new(ScriptedSolver::always_sat())))
    }

    fn x_is(value: u64) -> Constraint {
        BitVec::var("x", 256).eq_to(BitVec::constant(value, 256))
    }

    #[test]
    fn test_annotation_survives_fork_call_and_commit() {
        let mut state = state();
        let issue = draft(&state, 0);
        state.annotate(Box::new(IssueAnnotation::new(vec![x_is(1)], issue, detector())));

        let child = state.fork(vec![None]).remove(0);
        assert_eq!(child.annotations().of_type::<IssueAnnotation>().count(), 1);

        let frame = child.enter_call(Arc::new(child.environment().clone()));
        assert_eq!(frame.annotations().of_type::<IssueAnnotation>().count(), 1);

        let world = child.commit_transaction();
        assert_eq!(world.annotations.of_type::<IssueAnnotation>().count(), 1);
    }

    #[test]
    fn test_discriminator_keeps_separate_slots() {
        let mut state = state();
        let detector = detector();
        state.annotate(Box::new(IssueAnnotation::new(vec![], draft(&state, 0), detector.clone())));
        state.annotate(Box::new(IssueAnnotation::new(vec![], draft(&state, 1), detector)));
        assert_eq!(state.annotations().of_type::<IssueAnnotation>().count(), 2);
    }

    #[test]
    fn test_confirmed_issue_gets_witness() {
        let mut state = state();
        let issue = draft(&state, 0);
        state.annotate(Box::new(IssueAnnotation::new(vec![x_is(1)], issue, detector())));

        let confirmed = confirm_issue_annotations(&state, &ScriptedSolver::always_sat());
        assert_eq!(confirmed.len(), 1);
        assert!(confirmed[0].1.transaction_sequence().is_some());
    }

    #[test]
    fn test_one_unsat_condition_discards_issue() {
        let mut state = state();
        let issue = draft(&state, 0);
        state.annotate(Box::new(IssueAnnotation::new(
            vec![x_is(1), x_is(2)],
            issue,
            detector(),
        )));

        let solver = ScriptedSolver::always_sat().unsat_when(x_is(2));
        assert!(confirm_issue_annotations(&state, &solver).is_empty());
    }

    #[test]
    fn test_already_reported_address_is_skipped() {
        #[derive(Debug, Default)]
        struct Quiet {
            base: ModuleState,
        }

        impl DetectionModule for Quiet {
            fn name(&self) -> &str {
                "quiet"
            }

            fn swc_id(&self) -> &str {
                "107"
            }

            fn description(&self) -> &str {
                ""
            }

            fn base(&self) -> &ModuleState {
                &self.base
            }

            fn analyze_state(&self, _state: &mut GlobalState) -> scry_exceptions::ScryResult<Vec<Issue>> {
                Ok(Vec::new())
            }
        }

        let mut state = state();
        let detector: Arc<dyn DetectionModule> = Arc::new(Quiet::default());
        assert!(detector.record_issue(draft(&state, 0)));
        state.annotate(Box::new(IssueAnnotation::new(vec![], draft(&state, 0), detector)));

        let solver = ScriptedSolver::always_sat();
        assert!(confirm_issue_annotations(&state, &solver).is_empty());
        assert!(solver.queries().is_empty());
    }
}
