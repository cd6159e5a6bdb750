// SPDX-License-Identifier: AGPL-3.0

//! Registry of plugin builders

use crate::PluginBuilder;
use indexmap::IndexMap;
use scry_exceptions::{ScryException, ScryResult};
use scry_logs::{warn_code, ErrorCode};
use scry_sevm::Sevm;
use std::sync::{Arc, PoisonError, RwLock};

struct PluginEntry {
    builder: Arc<dyn PluginBuilder>,
    enabled: bool,
}

/// Name-keyed table of plugin builders with an enabled flag each.
///
/// One loader is created per run and handed to whatever sets up
/// exploration. Registration and flag changes happen during setup; reads
/// are safe from any thread afterwards.
#[derive(Default)]
pub struct PluginLoader {
    plugins: RwLock<IndexMap<String, PluginEntry>>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `builder` under its name. A name that is already taken keeps
    /// its first builder; the new one is ignored with a warning.
    pub fn load(&self, builder: Arc<dyn PluginBuilder>) {
        let name = builder.name().to_string();
        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        if plugins.contains_key(&name) {
            warn_code(
                ErrorCode::DuplicatePlugin,
                &format!("Plugin with name: {} was already loaded, skipping...", name),
                true,
            );
            return;
        }
        tracing::debug!(plugin = %name, "loading plugin");
        let enabled = builder.enabled_by_default();
        plugins.insert(name, PluginEntry { builder, enabled });
    }

    /// False for names that were never loaded
    pub fn is_enabled(&self, name: &str) -> bool {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|entry| entry.enabled)
            .unwrap_or(false)
    }

    pub fn enable(&self, name: &str) -> ScryResult<()> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> ScryResult<()> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> ScryResult<()> {
        let mut plugins = self.plugins.write().unwrap_or_else(PoisonError::into_inner);
        match plugins.get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                Ok(())
            }
            None => Err(ScryException::PluginNotFound(name.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn builder(&self, name: &str) -> Option<Arc<dyn PluginBuilder>> {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|entry| entry.builder.clone())
    }

    /// Build and initialize every effectively enabled plugin against `sevm`,
    /// in registration order. With `with_plugins`, a plugin is enabled
    /// exactly when the list names it; otherwise its stored flag decides.
    /// Returns the names of the instrumented plugins.
    pub fn instrument(&self, sevm: &mut Sevm, with_plugins: Option<&[String]>) -> Vec<String> {
        let selected: Vec<(String, Arc<dyn PluginBuilder>)> = {
            let plugins = self.plugins.read().unwrap_or_else(PoisonError::into_inner);

            if let Some(list) = with_plugins {
                for name in list.iter().filter(|name| !plugins.contains_key(name.as_str())) {
                    scry_logs::warn_unique(&format!(
                        "Plugin with name: {} was requested but never loaded",
                        name
                    ));
                }
            }

            plugins
                .iter()
                .filter(|(name, entry)| {
                    let enabled = match with_plugins {
                        Some(list) => list.iter().any(|listed| listed == *name),
                        None => entry.enabled,
                    };
                    if !enabled {
                        scry_logs::debug_once(&format!("Plugin {} is disabled, not instrumented", name));
                    }
                    enabled
                })
                .map(|(name, entry)| (name.clone(), entry.builder.clone()))
                .collect()
        };

        for (name, builder) in &selected {
            tracing::info!(plugin = %name, "instrumenting");
            builder.build().initialize(sevm);
        }
        selected.into_iter().map(|(name, _)| name).collect()
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let plugins = self.plugins.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_map()
            .entries(plugins.iter().map(|(name, entry)| (name, entry.enabled)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LaserPlugin;
    use scry_state::opcodes::OP_STOP;
    use scry_state::GlobalState;

    /// Installs one no-op STOP pre-hook
    struct TagPlugin;

    impl LaserPlugin for TagPlugin {
        fn initialize(&self, sevm: &mut Sevm) {
            sevm.register_pre_hook(&[OP_STOP], Arc::new(|_: &mut GlobalState| Ok(())));
        }
    }

    struct TagBuilder {
        name: &'static str,
        default_on: bool,
    }

    impl PluginBuilder for TagBuilder {
        fn name(&self) -> &str {
            self.name
        }

        fn enabled_by_default(&self) -> bool {
            self.default_on
        }

        fn build(&self) -> Box<dyn LaserPlugin> {
            Box::new(TagPlugin)
        }
    }

    fn builder(name: &'static str, default_on: bool) -> Arc<dyn PluginBuilder> {
        Arc::new(TagBuilder { name, default_on })
    }

    #[test]
    fn test_enable_unknown_plugin_fails() {
        let loader = PluginLoader::new();
        assert_eq!(
            loader.enable("ghost"),
            Err(ScryException::PluginNotFound("ghost".to_string()))
        );
        assert!(loader.is_empty());
        assert!(!loader.is_enabled("ghost"));
        assert!(loader.disable("ghost").is_err());
    }

    #[test]
    fn test_duplicate_load_keeps_first_builder() {
        let loader = PluginLoader::new();
        let first = builder("coverage", false);
        loader.load(first.clone());
        loader.load(builder("coverage", true));

        assert_eq!(loader.len(), 1);
        assert!(Arc::ptr_eq(&loader.builder("coverage").unwrap(), &first));
        assert!(!loader.is_enabled("coverage"));
    }

    #[test]
    fn test_enable_disable() {
        let loader = PluginLoader::new();
        loader.load(builder("a", false));
        assert!(!loader.is_enabled("a"));
        loader.enable("a").unwrap();
        assert!(loader.is_enabled("a"));
        loader.disable("a").unwrap();
        assert!(!loader.is_enabled("a"));
    }

    #[test]
    fn test_instrument_uses_stored_flags_in_order() {
        let loader = PluginLoader::new();
        loader.load(builder("c", true));
        loader.load(builder("a", false));
        loader.load(builder("b", true));

        let mut sevm = Sevm::default();
        assert_eq!(loader.instrument(&mut sevm, None), vec!["c", "b"]);
        assert_eq!(sevm.hooks().pre(OP_STOP).len(), 2);
        assert_eq!(loader.names(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_override_list_is_exact() {
        let loader = PluginLoader::new();
        loader.load(builder("on", true));
        loader.load(builder("off", false));
        loader.load(builder("other", true));

        let mut sevm = Sevm::default();
        let list = vec!["off".to_string(), "missing".to_string()];
        assert_eq!(loader.instrument(&mut sevm, Some(list.as_slice())), vec!["off"]);
        assert_eq!(sevm.hooks().pre(OP_STOP).len(), 1);

        // stored flags are untouched by an override
        assert!(loader.is_enabled("on"));
        assert!(!loader.is_enabled("off"));

        let mut bare = Sevm::default();
        assert!(loader.instrument(&mut bare, Some(&[][..])).is_empty());
        assert!(bare.hooks().is_empty());
    }
}
