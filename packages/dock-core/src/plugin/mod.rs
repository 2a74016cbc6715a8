//! Item provider contract and the proxy handed to each loaded provider.

pub mod loader;

use crate::queue::TaskQueue;
use crate::services::{ServiceRequest, SystemEvent};
use crate::settings::SharedSettings;
use crate::widget::{ContextMenu, WidgetHandle};
use crate::DockContext;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

pub use loader::{FactoryTable, LoadError, PluginDescriptor, PluginHost, ProviderFactory};

/// Interface id every descriptor must declare
pub const ITEM_PROVIDER_INTERFACE: &str = "org.dock.ItemProvider/1";

/// Sort key that pins an item after every other item
pub const SORT_KEY_LAST: i32 = -1;

/// Loaded plugin identity (its descriptor name, unique per host)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub String);

impl PluginId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Deferred registry mutation requested by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyRequest {
    ItemAdded { plugin: PluginId, key: String },
    ItemUpdate { plugin: PluginId, key: String },
    ItemRemoved { plugin: PluginId, key: String },
    RequestContextMenu { plugin: PluginId, key: String },
}

/// Channel from one provider back to the dock.
///
/// Calls only enqueue; the registry applies them after the current callback
/// returns, so a provider may call these from anywhere.
#[derive(Clone)]
pub struct PluginProxy {
    plugin: PluginId,
    queue: TaskQueue<ProxyRequest>,
}

impl PluginProxy {
    pub fn new(plugin: PluginId, queue: TaskQueue<ProxyRequest>) -> Self {
        Self { plugin, queue }
    }

    pub fn plugin(&self) -> &PluginId {
        &self.plugin
    }

    pub fn item_added(&self, key: &str) {
        self.queue.push(ProxyRequest::ItemAdded {
            plugin: self.plugin.clone(),
            key: key.to_string(),
        });
    }

    pub fn item_update(&self, key: &str) {
        self.queue.push(ProxyRequest::ItemUpdate {
            plugin: self.plugin.clone(),
            key: key.to_string(),
        });
    }

    pub fn item_removed(&self, key: &str) {
        self.queue.push(ProxyRequest::ItemRemoved {
            plugin: self.plugin.clone(),
            key: key.to_string(),
        });
    }

    pub fn request_context_menu(&self, key: &str) {
        self.queue.push(ProxyRequest::RequestContextMenu {
            plugin: self.plugin.clone(),
            key: key.to_string(),
        });
    }
}

/// Everything a provider receives on init
#[derive(Clone)]
pub struct PluginEnv {
    pub proxy: PluginProxy,
    /// Outgoing requests to system services
    pub requests: TaskQueue<ServiceRequest>,
    pub settings: SharedSettings,
}

/// A loadable source of dock items.
///
/// All calls happen on the dock thread. Widgets returned from the `item_*`
/// accessors stay owned by the provider; the dock only holds handles.
pub trait ItemProvider {
    fn plugin_name(&self) -> &str;

    fn init(&mut self, env: PluginEnv, ctx: &DockContext, now: Instant);

    fn display_mode_changed(&mut self, _ctx: &DockContext, _now: Instant) {}

    fn position_changed(&mut self, _ctx: &DockContext, _now: Instant) {}

    /// Widget placed in the dock for `key`
    fn item_widget(&mut self, key: &str) -> Option<WidgetHandle>;

    fn item_tips_widget(&mut self, _key: &str) -> Option<WidgetHandle> {
        None
    }

    /// Content shown modally on click when the item has no command
    fn item_popup_applet(&mut self, _key: &str) -> Option<WidgetHandle> {
        None
    }

    fn item_command(&self, _key: &str) -> Option<String> {
        None
    }

    fn item_context_menu(&self, _key: &str) -> Option<ContextMenu> {
        None
    }

    fn invoked_menu_item(&mut self, _key: &str, _menu_id: &str, _checked: bool) {}

    fn item_allow_container(&self, _key: &str) -> bool {
        false
    }

    fn item_is_in_container(&self, _key: &str) -> bool {
        false
    }

    fn set_item_is_in_container(&mut self, _key: &str, _in_container: bool) {}

    fn item_sort_key(&self, _key: &str) -> i32 {
        0
    }

    fn set_sort_key(&mut self, _key: &str, _order: i32) {}

    /// Bus notification relayed by the dock
    fn system_event(&mut self, _event: &SystemEvent, _ctx: &DockContext, _now: Instant) {}

    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    fn on_timer(&mut self, _now: Instant, _ctx: &DockContext) {}
}

pub type ProviderHandle = Rc<RefCell<dyn ItemProvider>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_only_enqueues() {
        let queue = TaskQueue::new();
        let proxy = PluginProxy::new(PluginId::new("trash"), queue.clone());
        proxy.item_added("trash");
        proxy.item_update("trash");
        proxy.item_removed("trash");

        let requests = queue.drain();
        assert_eq!(requests.len(), 3);
        assert_eq!(
            requests[0],
            ProxyRequest::ItemAdded {
                plugin: PluginId::new("trash"),
                key: "trash".into()
            }
        );
    }
}
