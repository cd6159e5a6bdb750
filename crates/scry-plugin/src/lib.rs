// SPDX-License-Identifier: AGPL-3.0

//! Plugins instrument the executor through its hook table.
//!
//! The executor knows nothing about individual plugins. A [`PluginBuilder`]
//! is registered with the [`PluginLoader`] during setup; at instrumentation
//! time the loader builds a fresh [`LaserPlugin`] from every enabled builder
//! and lets it install whatever hooks it needs.

mod coverage;
mod loader;

pub use coverage::*;
pub use loader::*;

use scry_sevm::Sevm;

/// An instance that installs its hooks on an executor
pub trait LaserPlugin: Send + Sync {
    fn initialize(&self, sevm: &mut Sevm);
}

/// Factory for a plugin, registered under a unique name
pub trait PluginBuilder: Send + Sync {
    fn name(&self) -> &str;

    /// Initial value of the plugin's enabled flag
    fn enabled_by_default(&self) -> bool {
        true
    }

    fn build(&self) -> Box<dyn LaserPlugin>;
}
