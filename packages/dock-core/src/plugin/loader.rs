//! Plugin discovery and loading.
//!
//! Plugins are described by small JSON files dropped into the plugin
//! directories. A descriptor names a module; modules are resolved through a
//! factory table filled in by the binary. Nothing that goes wrong while
//! loading one plugin stops the others from loading.

use super::{ItemProvider, PluginEnv, PluginId, PluginProxy, ProviderHandle, ProxyRequest, ITEM_PROVIDER_INTERFACE};
use crate::debounce::earliest;
use crate::queue::TaskQueue;
use crate::services::{ServiceRequest, SystemEvent};
use crate::settings::SharedSettings;
use crate::DockContext;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read descriptor {path}: {reason}")]
    Descriptor { path: PathBuf, reason: String },
    #[error("plugin {name} declares interface {found}, expected {}", ITEM_PROVIDER_INTERFACE)]
    InterfaceMismatch { name: String, found: String },
    #[error("plugin {name}: no module named {module}")]
    MissingModule { name: String, module: String },
    #[error("plugin {name}: constructor failed: {reason}")]
    Constructor { name: String, reason: String },
    #[error("plugin {name}: constructor panicked")]
    Panicked { name: String },
    #[error("plugin {name} is already loaded")]
    Duplicate { name: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub name: String,
    pub interface: String,
    pub module: String,
    /// File the descriptor was read from; empty for built-ins
    #[serde(skip)]
    pub source: PathBuf,
}

impl PluginDescriptor {
    pub fn builtin(name: &str, module: &str) -> Self {
        Self {
            name: name.to_string(),
            interface: ITEM_PROVIDER_INTERFACE.to_string(),
            module: module.to_string(),
            source: PathBuf::new(),
        }
    }

    pub fn read(path: &Path) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path).map_err(|e| LoadError::Descriptor {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut descriptor: PluginDescriptor = serde_json::from_str(&text).map_err(|e| LoadError::Descriptor {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if descriptor.interface != ITEM_PROVIDER_INTERFACE {
            return Err(LoadError::InterfaceMismatch {
                name: descriptor.name,
                found: descriptor.interface,
            });
        }
        descriptor.source = path.to_path_buf();
        Ok(descriptor)
    }
}

/// Module constructor
pub type ProviderFactory = fn() -> Result<ProviderHandle, String>;

#[derive(Default, Clone)]
pub struct FactoryTable {
    factories: BTreeMap<String, ProviderFactory>,
}

impl FactoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: &str, factory: ProviderFactory) {
        self.factories.insert(module.to_string(), factory);
    }

    pub fn get(&self, module: &str) -> Option<ProviderFactory> {
        self.factories.get(module).copied()
    }
}

struct LoadedPlugin {
    id: PluginId,
    provider: ProviderHandle,
}

pub struct PluginHost {
    dirs: Vec<PathBuf>,
    factories: FactoryTable,
    plugins: Vec<LoadedPlugin>,
    queue: TaskQueue<ProxyRequest>,
}

impl PluginHost {
    pub fn new(dirs: Vec<PathBuf>, factories: FactoryTable) -> Self {
        Self {
            dirs,
            factories,
            plugins: Vec::new(),
            queue: TaskQueue::new(),
        }
    }

    /// Default search path: system-wide first, then per-user.
    pub fn default_dirs() -> Vec<PathBuf> {
        let mut dirs = vec![PathBuf::from("/usr/lib/dock-panel/plugins")];
        if let Some(data) = dirs::data_dir() {
            dirs.push(data.join("dock-panel").join("plugins"));
        }
        dirs
    }

    /// Queue every proxy of this host feeds
    pub fn proxy_queue(&self) -> TaskQueue<ProxyRequest> {
        self.queue.clone()
    }

    /// Valid descriptors found in the plugin directories, in directory
    /// order, sorted by file name within a directory.
    pub fn discover(&self) -> Vec<PluginDescriptor> {
        let mut found = Vec::new();
        for dir in &self.dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::debug!(dir = %dir.display(), error = %e, "skipping plugin directory");
                    continue;
                }
            };
            let mut paths: Vec<PathBuf> = entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
                .collect();
            paths.sort();

            for path in paths {
                match PluginDescriptor::read(&path) {
                    Ok(descriptor) => found.push(descriptor),
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "ignoring plugin descriptor"),
                }
            }
        }
        found
    }

    /// Construct the plugin a descriptor names.
    pub fn load(&mut self, descriptor: &PluginDescriptor) -> Result<PluginId, LoadError> {
        if descriptor.interface != ITEM_PROVIDER_INTERFACE {
            return Err(LoadError::InterfaceMismatch {
                name: descriptor.name.clone(),
                found: descriptor.interface.clone(),
            });
        }
        if self.plugins.iter().any(|p| p.id.as_str() == descriptor.name) {
            return Err(LoadError::Duplicate {
                name: descriptor.name.clone(),
            });
        }
        let factory = self
            .factories
            .get(&descriptor.module)
            .ok_or_else(|| LoadError::MissingModule {
                name: descriptor.name.clone(),
                module: descriptor.module.clone(),
            })?;

        let provider = match catch_unwind(AssertUnwindSafe(factory)) {
            Ok(Ok(provider)) => provider,
            Ok(Err(reason)) => {
                return Err(LoadError::Constructor {
                    name: descriptor.name.clone(),
                    reason,
                })
            }
            Err(_) => {
                return Err(LoadError::Panicked {
                    name: descriptor.name.clone(),
                })
            }
        };

        let id = self.insert(&descriptor.name, provider)?;
        tracing::info!(plugin = %id, module = %descriptor.module, "plugin loaded");
        Ok(id)
    }

    /// Register an already constructed provider.
    pub fn insert(&mut self, name: &str, provider: ProviderHandle) -> Result<PluginId, LoadError> {
        if self.plugins.iter().any(|p| p.id.as_str() == name) {
            return Err(LoadError::Duplicate { name: name.to_string() });
        }
        let id = PluginId::new(name);
        self.plugins.push(LoadedPlugin {
            id: id.clone(),
            provider,
        });
        Ok(id)
    }

    /// Load `builtins`, then everything discovered on disk. Failures are
    /// logged and skipped.
    pub fn load_all(&mut self, builtins: &[PluginDescriptor]) -> Vec<PluginId> {
        let discovered = self.discover();
        builtins
            .iter()
            .chain(discovered.iter())
            .filter_map(|descriptor| match self.load(descriptor) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!(error = %e, "plugin not loaded");
                    None
                }
            })
            .collect()
    }

    /// Hand each loaded provider its proxy and collaborators.
    pub fn init_all(&mut self, ctx: &DockContext, requests: &TaskQueue<ServiceRequest>, settings: &SharedSettings, now: Instant) {
        for plugin in &self.plugins {
            let env = PluginEnv {
                proxy: PluginProxy::new(plugin.id.clone(), self.queue.clone()),
                requests: requests.clone(),
                settings: settings.clone(),
            };
            plugin.provider.borrow_mut().init(env, ctx, now);
        }
    }

    pub fn provider(&self, id: &PluginId) -> Option<ProviderHandle> {
        self.plugins
            .iter()
            .find(|p| p.id == *id)
            .map(|p| p.provider.clone())
    }

    pub fn plugin_ids(&self) -> Vec<PluginId> {
        self.plugins.iter().map(|p| p.id.clone()).collect()
    }

    pub fn display_mode_changed(&self, ctx: &DockContext, now: Instant) {
        self.each(|p| p.display_mode_changed(ctx, now));
    }

    pub fn position_changed(&self, ctx: &DockContext, now: Instant) {
        self.each(|p| p.position_changed(ctx, now));
    }

    pub fn system_event(&self, event: &SystemEvent, ctx: &DockContext, now: Instant) {
        self.each(|p| p.system_event(event, ctx, now));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(
            self.plugins
                .iter()
                .map(|p| p.provider.try_borrow().ok().and_then(|p| p.next_deadline())),
        )
    }

    pub fn on_timer(&self, now: Instant, ctx: &DockContext) {
        self.each(|p| p.on_timer(now, ctx));
    }

    fn each(&self, mut f: impl FnMut(&mut dyn ItemProvider)) {
        for plugin in &self.plugins {
            match plugin.provider.try_borrow_mut() {
                Ok(mut provider) => f(&mut *provider),
                Err(_) => tracing::warn!(plugin = %plugin.id, "provider busy, skipping notification"),
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::widget::{Label, WidgetHandle};
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    /// Provider serving labels for whatever keys a test configures.
    #[derive(Default)]
    pub struct TestProvider {
        pub name: String,
        pub env: Option<PluginEnv>,
        pub widgets: HashMap<String, Rc<RefCell<Label>>>,
        pub sort_keys: HashMap<String, i32>,
        pub in_container: HashMap<String, bool>,
        /// item_widget(key) adds this key through the proxy while running
        pub chain: HashMap<String, String>,
        pub command: Option<String>,
        pub invoked: Vec<(String, String)>,
    }

    impl TestProvider {
        pub fn named(name: &str) -> Self {
            Self {
                name: name.to_string(),
                ..Default::default()
            }
        }

        pub fn with_item(mut self, key: &str, sort_key: i32) -> Self {
            self.widgets.insert(key.to_string(), Label::handle(key));
            self.sort_keys.insert(key.to_string(), sort_key);
            self
        }

        pub fn proxy(&self) -> &PluginProxy {
            &self.env.as_ref().expect("provider initialized").proxy
        }
    }

    impl ItemProvider for TestProvider {
        fn plugin_name(&self) -> &str {
            &self.name
        }

        fn init(&mut self, env: PluginEnv, _ctx: &DockContext, _now: Instant) {
            self.env = Some(env);
        }

        fn item_widget(&mut self, key: &str) -> Option<WidgetHandle> {
            if let Some(next) = self.chain.get(key) {
                self.proxy().item_added(next);
            }
            let widget: WidgetHandle = self.widgets.get(key)?.clone();
            Some(widget)
        }

        fn item_tips_widget(&mut self, key: &str) -> Option<WidgetHandle> {
            let widget: WidgetHandle = self.widgets.get(key)?.clone();
            Some(widget)
        }

        fn item_command(&self, _key: &str) -> Option<String> {
            self.command.clone()
        }

        fn invoked_menu_item(&mut self, key: &str, menu_id: &str, _checked: bool) {
            self.invoked.push((key.to_string(), menu_id.to_string()));
        }

        fn item_allow_container(&self, _key: &str) -> bool {
            true
        }

        fn item_is_in_container(&self, key: &str) -> bool {
            self.in_container.get(key).copied().unwrap_or(false)
        }

        fn set_item_is_in_container(&mut self, key: &str, in_container: bool) {
            self.in_container.insert(key.to_string(), in_container);
        }

        fn item_sort_key(&self, key: &str) -> i32 {
            self.sort_keys.get(key).copied().unwrap_or(0)
        }

        fn set_sort_key(&mut self, key: &str, order: i32) {
            self.sort_keys.insert(key.to_string(), order);
        }
    }
}
