// SPDX-License-Identifier: AGPL-3.0

use crate::modules::{DetectionModule, EntryPoint, MultipleSendsModule};
use indexmap::IndexMap;
use scry_exceptions::{ScryException, ScryResult};
use scry_logs::{warn_code, ErrorCode};
use scry_solver::SolverBridge;
use std::sync::Arc;

pub const MULTIPLE_SENDS_MODULE: &str = "multiple_sends";

/// Shared services handed to module factories
#[derive(Clone)]
pub struct ModuleContext {
    pub solver: Arc<dyn SolverBridge>,
}

impl ModuleContext {
    pub fn new(solver: Arc<dyn SolverBridge>) -> Self {
        Self { solver }
    }
}

pub type ModuleFactory = Box<dyn Fn(&ModuleContext) -> Arc<dyn DetectionModule> + Send + Sync>;

/// Registry of detection modules, keyed by identifier.
///
/// Each module is built once from its factory and the same instance is handed
/// out on every lookup, so findings accumulate across the whole run.
pub struct ModuleLoader {
    context: ModuleContext,
    modules: IndexMap<String, Arc<dyn DetectionModule>>,
}

impl ModuleLoader {
    pub fn new(context: ModuleContext) -> Self {
        Self {
            context,
            modules: IndexMap::new(),
        }
    }

    /// A loader with every built-in detector registered
    pub fn with_default_modules(context: ModuleContext) -> Self {
        let mut loader = Self::new(context);
        loader.register(
            MULTIPLE_SENDS_MODULE,
            Box::new(|context: &ModuleContext| {
                Arc::new(MultipleSendsModule::new(context.solver.clone())) as Arc<dyn DetectionModule>
            }),
        );
        loader
    }

    /// Build and register a module. A second registration under the same
    /// identifier replaces the first.
    pub fn register(&mut self, name: impl Into<String>, factory: ModuleFactory) {
        let module = factory(&self.context);
        self.modules.insert(name.into(), module);
    }

    pub fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Modules with the given entry point, restricted to `white_list` when it
    /// names anything. Fails on identifiers that were never registered.
    pub fn get_detection_modules(
        &self,
        entry_point: EntryPoint,
        white_list: Option<&[String]>,
    ) -> ScryResult<Vec<Arc<dyn DetectionModule>>> {
        let white_list = white_list.filter(|names| !names.is_empty());

        if let Some(names) = white_list {
            let unknown: Vec<&str> = names
                .iter()
                .filter(|name| !self.modules.contains_key(name.as_str()))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                warn_code(
                    ErrorCode::UnknownModule,
                    &format!("unknown detection module(s): {}", unknown.join(", ")),
                    false,
                );
                return Err(ScryException::Config(format!(
                    "invalid detection module: {} (available: {})",
                    unknown.join(", "),
                    self.names().join(", ")
                )));
            }
        }

        Ok(self
            .modules
            .iter()
            .filter(|(name, _)| white_list.map_or(true, |names| names.iter().any(|n| n == *name)))
            .filter(|(_, module)| module.entry_point() == entry_point)
            .map(|(_, module)| module.clone())
            .collect())
    }

    /// Forget every module's findings
    pub fn reset_modules(&self) {
        for module in self.modules.values() {
            module.reset_module();
        }
    }

    /// Findings of all modules, in registration order
    pub fn issues(&self) -> Vec<crate::Issue> {
        self.modules.values().flat_map(|module| module.issues()).collect()
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("modules", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleState;
    use crate::Issue;
    use scry_solver::testing::ScriptedSolver;
    use scry_state::GlobalState;

    #[derive(Debug, Default)]
    struct PostModule {
        base: ModuleState,
    }

    impl DetectionModule for PostModule {
        fn name(&self) -> &str {
            "Post"
        }

        fn swc_id(&self) -> &str {
            "0"
        }

        fn description(&self) -> &str {
            "runs at transaction end"
        }

        fn entry_point(&self) -> EntryPoint {
            EntryPoint::Post
        }

        fn base(&self) -> &ModuleState {
            &self.base
        }

        fn analyze_state(&self, _state: &mut GlobalState) -> ScryResult<Vec<Issue>> {
            Ok(Vec::new())
        }
    }

    fn loader() -> ModuleLoader {
        let mut loader =
            ModuleLoader::with_default_modules(ModuleContext::new(Arc::new(ScriptedSolver::always_sat())));
        loader.register(
            "post",
            Box::new(|_: &ModuleContext| Arc::new(PostModule::default()) as Arc<dyn DetectionModule>),
        );
        loader
    }

    #[test]
    fn test_filter_by_entry_point() {
        let loader = loader();
        let callbacks = loader.get_detection_modules(EntryPoint::Callback, None).unwrap();
        assert_eq!(callbacks.len(), 1);
        assert_eq!(callbacks[0].name(), "Multiple Sends");

        let post = loader.get_detection_modules(EntryPoint::Post, None).unwrap();
        assert_eq!(post.len(), 1);
        assert_eq!(post[0].name(), "Post");
    }

    #[test]
    fn test_white_list() {
        let loader = loader();
        let only_post = vec!["post".to_string()];
        assert!(loader
            .get_detection_modules(EntryPoint::Callback, Some(only_post.as_slice()))
            .unwrap()
            .is_empty());

        // an empty white list selects everything
        assert_eq!(
            loader
                .get_detection_modules(EntryPoint::Callback, Some(&[][..]))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_unknown_module_is_config_error() {
        let loader = loader();
        let names = vec!["multiple_sends".to_string(), "nope".to_string()];
        let err = loader
            .get_detection_modules(EntryPoint::Callback, Some(names.as_slice()))
            .unwrap_err();
        assert!(matches!(err, ScryException::Config(ref msg) if msg.contains("nope")));
    }

    #[test]
    fn test_reset_modules_clears_findings() {
        use scry_state::opcodes::{OP_CALL, OP_STOP};
        use scry_state::{Code, Environment};

        let loader = loader();
        let module = loader.get_detection_modules(EntryPoint::Callback, None).unwrap()[0].clone();
        let code = Code::from_bytes(vec![OP_CALL, OP_CALL, OP_STOP]);
        let mut state = GlobalState::new(Arc::new(Environment::new("C", "f()", code)), "1");
        for pc in 0..3 {
            state.mstate.pc = pc;
            module.execute(&mut state).unwrap();
        }
        assert_eq!(loader.issues().len(), 1);

        loader.reset_modules();
        assert!(loader.issues().is_empty());
    }

    #[test]
    fn test_same_instance_every_lookup() {
        let loader = loader();
        let a = loader.get_detection_modules(EntryPoint::Callback, None).unwrap();
        let b = loader.get_detection_modules(EntryPoint::Callback, None).unwrap();
        assert!(Arc::ptr_eq(&a[0], &b[0]));
    }
}
