// SPDX-License-Identifier: AGPL-3.0

use crate::modules::{DetectionModule, EntryPoint};
use scry_exceptions::{ScryException, ScryResult};
use scry_logs::{warn_code, ErrorCode};
use scry_plugin::{LaserPlugin, PluginBuilder};
use scry_sevm::Sevm;
use scry_state::GlobalState;
use std::sync::Arc;

pub const DETECTION_MODULES_PLUGIN_NAME: &str = "detection-modules";

/// Run one module on `state`. A malformed state ends this detection attempt
/// only; any other error is handed back to the executor.
fn run_module(module: &dyn DetectionModule, state: &mut GlobalState) -> ScryResult<()> {
    match module.execute(state) {
        Ok(issues) => {
            for issue in &issues {
                tracing::info!(
                    module = module.name(),
                    contract = issue.contract(),
                    address = issue.address(),
                    "{}",
                    issue.title()
                );
            }
            Ok(())
        }
        Err(ScryException::MalformedState(msg)) => {
            warn_code(
                ErrorCode::MalformedState,
                &format!("{}: {}", module.name(), msg),
                false,
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Wires detection modules into the executor's hooks
pub struct DetectionModulePlugin {
    modules: Vec<Arc<dyn DetectionModule>>,
}

impl LaserPlugin for DetectionModulePlugin {
    fn initialize(&self, sevm: &mut Sevm) {
        for module in &self.modules {
            match module.entry_point() {
                EntryPoint::Callback => {
                    if !module.pre_hooks().is_empty() {
                        let hooked = module.clone();
                        sevm.register_pre_hook(
                            module.pre_hooks(),
                            Arc::new(move |state: &mut GlobalState| run_module(hooked.as_ref(), state)),
                        );
                    }
                    if !module.post_hooks().is_empty() {
                        let hooked = module.clone();
                        sevm.register_post_hook(
                            module.post_hooks(),
                            Arc::new(move |state: &mut GlobalState| run_module(hooked.as_ref(), state)),
                        );
                    }
                }
                EntryPoint::Post => {
                    let hooked = module.clone();
                    sevm.register_transaction_end_hook(Arc::new(move |state: &mut GlobalState| {
                        run_module(hooked.as_ref(), state)
                    }));
                }
            }
            tracing::debug!(module = module.name(), "detection module installed");
        }
    }
}

pub struct DetectionModulePluginBuilder {
    modules: Vec<Arc<dyn DetectionModule>>,
}

impl DetectionModulePluginBuilder {
    pub fn new(modules: Vec<Arc<dyn DetectionModule>>) -> Self {
        Self { modules }
    }
}

impl PluginBuilder for DetectionModulePluginBuilder {
    fn name(&self) -> &str {
        DETECTION_MODULES_PLUGIN_NAME
    }

    fn build(&self) -> Box<dyn LaserPlugin> {
        Box::new(DetectionModulePlugin {
            modules: self.modules.clone(),
        })
    }
}
