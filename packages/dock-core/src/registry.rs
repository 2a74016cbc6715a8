//! Plugin item registry: the dock side of every plugin proxy.
//!
//! Providers never touch the registry directly. Their proxy calls land in
//! a queue that [`ItemRegistry::pump`] drains after the callback that
//! produced them has returned, so a provider can add or remove items from
//! inside any of its own callbacks.

use crate::item::{ItemRef, PluginItem};
use crate::plugin::{PluginHost, PluginId, ProxyRequest, SORT_KEY_LAST};
use crate::queue::TaskQueue;
use crate::services::ServiceRequest;
use std::collections::BTreeMap;

/// Structural change, reported to the panel after a pump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Inserted(ItemRef),
    Updated(ItemRef),
    Removed(ItemRef),
    ContextMenuRequested(ItemRef),
}

pub struct ItemRegistry {
    items: BTreeMap<PluginId, BTreeMap<String, PluginItem>>,
    queue: TaskQueue<ProxyRequest>,
    requests: TaskQueue<ServiceRequest>,
    graveyard: Vec<PluginItem>,
    next_sequence: u64,
    events: Vec<RegistryEvent>,
}

impl ItemRegistry {
    pub fn new(queue: TaskQueue<ProxyRequest>, requests: TaskQueue<ServiceRequest>) -> Self {
        Self {
            items: BTreeMap::new(),
            queue,
            requests,
            graveyard: Vec::new(),
            next_sequence: 0,
            events: Vec::new(),
        }
    }

    /// Apply every queued proxy request, including ones queued while
    /// applying, then release removed items.
    pub fn pump(&mut self, host: &PluginHost) -> Vec<RegistryEvent> {
        while let Some(request) = self.queue.pop() {
            self.apply(request, host);
        }
        // widgets of removed items may be the last references to popup content
        self.graveyard.clear();
        std::mem::take(&mut self.events)
    }

    fn apply(&mut self, request: ProxyRequest, host: &PluginHost) {
        match request {
            ProxyRequest::ItemAdded { plugin, key } => self.item_added(host, plugin, key),
            ProxyRequest::ItemUpdate { plugin, key } => self.item_update(&plugin, &key),
            ProxyRequest::ItemRemoved { plugin, key } => self.item_removed(&plugin, &key),
            ProxyRequest::RequestContextMenu { plugin, key } => {
                if self.contains(&plugin, &key) {
                    self.events
                        .push(RegistryEvent::ContextMenuRequested(ItemRef::Plugin { plugin, key }));
                } else {
                    tracing::debug!(plugin = %plugin, key = %key, "context menu for unknown item");
                }
            }
        }
    }

    fn item_added(&mut self, host: &PluginHost, plugin: PluginId, key: String) {
        if self.contains(&plugin, &key) {
            self.item_update(&plugin, &key);
            return;
        }
        let Some(provider) = host.provider(&plugin) else {
            tracing::warn!(plugin = %plugin, key = %key, "item added by unknown plugin");
            return;
        };
        let widget = match provider.try_borrow_mut() {
            Ok(mut p) => p.item_widget(&key),
            Err(_) => {
                tracing::warn!(plugin = %plugin, key = %key, "provider busy while adding item");
                None
            }
        };
        let Some(widget) = widget else {
            tracing::warn!(plugin = %plugin, key = %key, "plugin returned no widget, item ignored");
            return;
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let item = PluginItem::new(
            plugin.clone(),
            key.clone(),
            provider,
            widget,
            self.requests.clone(),
            sequence,
        );
        tracing::debug!(plugin = %plugin, key = %key, sort_key = item.sort_key(), "item inserted");
        self.items.entry(plugin.clone()).or_default().insert(key.clone(), item);
        self.events.push(RegistryEvent::Inserted(ItemRef::Plugin { plugin, key }));
    }

    fn item_update(&mut self, plugin: &PluginId, key: &str) {
        match self.get_mut(plugin, key) {
            Some(item) => {
                let provider = item.provider().clone();
                let widget = provider.try_borrow_mut().ok().and_then(|mut p| p.item_widget(key));
                if let Some(widget) = widget {
                    item.set_widget(widget);
                }
                item.refresh();
                self.events.push(RegistryEvent::Updated(ItemRef::Plugin {
                    plugin: plugin.clone(),
                    key: key.to_string(),
                }));
            }
            None => tracing::debug!(plugin = %plugin, key = %key, "update for unknown item"),
        }
    }

    fn item_removed(&mut self, plugin: &PluginId, key: &str) {
        let Some(items) = self.items.get_mut(plugin) else {
            return;
        };
        let Some(item) = items.remove(key) else {
            tracing::debug!(plugin = %plugin, key = %key, "remove for unknown item");
            return;
        };
        if items.is_empty() {
            self.items.remove(plugin);
        }
        self.graveyard.push(item);
        self.events.push(RegistryEvent::Removed(ItemRef::Plugin {
            plugin: plugin.clone(),
            key: key.to_string(),
        }));
    }

    pub fn contains(&self, plugin: &PluginId, key: &str) -> bool {
        self.get(plugin, key).is_some()
    }

    pub fn get(&self, plugin: &PluginId, key: &str) -> Option<&PluginItem> {
        self.items.get(plugin)?.get(key)
    }

    pub fn get_mut(&mut self, plugin: &PluginId, key: &str) -> Option<&mut PluginItem> {
        self.items.get_mut(plugin)?.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.items.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginItem> {
        self.items.values().flat_map(BTreeMap::values)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PluginItem> {
        self.items.values_mut().flat_map(BTreeMap::values_mut)
    }

    /// Items in dock order: ascending sort key, ties in registration
    /// order, the sentinel key after everything else.
    pub fn ordered(&self) -> Vec<&PluginItem> {
        let mut items: Vec<&PluginItem> = self.iter().collect();
        items.sort_by_key(|item| (item.sort_key() == SORT_KEY_LAST, item.sort_key(), item.sequence()));
        items
    }

    pub fn ordered_refs(&self) -> Vec<ItemRef> {
        use crate::item::DockItem;
        self.ordered().into_iter().map(|item| item.item_ref()).collect()
    }

    /// Move an item in or out of its plugin's container. The provider
    /// persists the choice.
    pub fn set_in_container(&mut self, plugin: &PluginId, key: &str, in_container: bool) {
        let Some(item) = self.get_mut(plugin, key) else {
            return;
        };
        if !item.allow_container() {
            tracing::debug!(plugin = %plugin, key = %key, "item does not allow the container");
            return;
        }
        item.provider()
            .borrow_mut()
            .set_item_is_in_container(key, in_container);
        item.refresh();
        self.events.push(RegistryEvent::Updated(ItemRef::Plugin {
            plugin: plugin.clone(),
            key: key.to_string(),
        }));
    }

    /// Move `source` to the position `target` currently holds. Only items
    /// of the same plugin are reordered; their keys are renumbered in the
    /// new order and the provider persists them. Pinned items stay put.
    pub fn reorder(&mut self, source: &ItemRef, target: &ItemRef) {
        let (
            ItemRef::Plugin { plugin, key: source_key },
            ItemRef::Plugin {
                plugin: target_plugin,
                key: target_key,
            },
        ) = (source, target)
        else {
            return;
        };
        if plugin != target_plugin || source_key == target_key {
            return;
        }

        let mut keys: Vec<String> = self
            .ordered()
            .into_iter()
            .filter(|item| item.plugin() == plugin && item.sort_key() != SORT_KEY_LAST)
            .map(|item| item.key().to_string())
            .collect();
        let (Some(from), Some(to)) = (
            keys.iter().position(|k| k == source_key),
            keys.iter().position(|k| k == target_key),
        ) else {
            return;
        };
        let moved = keys.remove(from);
        keys.insert(to, moved);

        for (order, key) in keys.iter().enumerate() {
            let order = order as i32;
            let Some(item) = self.get_mut(plugin, key) else {
                continue;
            };
            if item.sort_key() == order {
                continue;
            }
            item.provider().borrow_mut().set_sort_key(key, order);
            item.refresh();
            self.events.push(RegistryEvent::Updated(ItemRef::Plugin {
                plugin: plugin.clone(),
                key: key.clone(),
            }));
        }
    }

    /// Events produced outside of a pump (container and reorder changes)
    pub fn take_events(&mut self) -> Vec<RegistryEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::DockItem;
    use crate::plugin::loader::test_support::TestProvider;
    use crate::plugin::{FactoryTable, PluginProxy};
    use crate::settings::MemorySettings;
    use crate::DockContext;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Instant;

    struct Fixture {
        host: PluginHost,
        registry: ItemRegistry,
        provider: Rc<RefCell<TestProvider>>,
    }

    impl Fixture {
        fn new(provider: TestProvider) -> Self {
            let provider = Rc::new(RefCell::new(provider));
            let mut host = PluginHost::new(Vec::new(), FactoryTable::new());
            host.insert("test", provider.clone()).unwrap();
            let requests = TaskQueue::new();
            host.init_all(&DockContext::default(), &requests, &MemorySettings::shared(), Instant::now());
            let registry = ItemRegistry::new(host.proxy_queue(), requests);
            Self {
                host,
                registry,
                provider,
            }
        }

        fn proxy(&self) -> PluginProxy {
            self.provider.borrow().proxy().clone()
        }

        fn pump(&mut self) -> Vec<RegistryEvent> {
            self.registry.pump(&self.host)
        }
    }

    fn plugin_ref(key: &str) -> ItemRef {
        ItemRef::Plugin {
            plugin: PluginId::new("test"),
            key: key.to_string(),
        }
    }

    #[test]
    fn test_add_update_remove_keeps_at_most_one_entry() {
        let mut fx = Fixture::new(TestProvider::named("test").with_item("a", 0));
        let proxy = fx.proxy();
        let plugin = PluginId::new("test");

        proxy.item_added("a");
        proxy.item_added("a");
        proxy.item_update("a");
        let events = fx.pump();
        assert_eq!(fx.registry.len(), 1);
        assert_eq!(
            events,
            vec![
                RegistryEvent::Inserted(plugin_ref("a")),
                RegistryEvent::Updated(plugin_ref("a")),
                RegistryEvent::Updated(plugin_ref("a")),
            ]
        );

        proxy.item_removed("a");
        proxy.item_update("a");
        proxy.item_removed("a");
        let events = fx.pump();
        assert_eq!(events, vec![RegistryEvent::Removed(plugin_ref("a"))]);
        assert!(!fx.registry.contains(&plugin, "a"));
        assert!(fx.registry.is_empty());
    }

    #[test]
    fn test_missing_widget_is_ignored() {
        let mut fx = Fixture::new(TestProvider::named("test"));
        fx.proxy().item_added("ghost");
        fx.proxy().request_context_menu("ghost");
        assert!(fx.pump().is_empty());
        assert!(fx.registry.is_empty());
    }

    #[test]
    fn test_sentinel_sorts_last() {
        let mut fx = Fixture::new(
            TestProvider::named("test")
                .with_item("A", 5)
                .with_item("B", SORT_KEY_LAST)
                .with_item("C", 2),
        );
        let proxy = fx.proxy();
        proxy.item_added("A");
        proxy.item_added("B");
        proxy.item_added("C");
        fx.pump();

        let keys: Vec<&str> = fx.registry.ordered().into_iter().map(PluginItem::key).collect();
        assert_eq!(keys, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let mut fx = Fixture::new(
            TestProvider::named("test")
                .with_item("z", 1)
                .with_item("y", 1)
                .with_item("x", SORT_KEY_LAST)
                .with_item("w", SORT_KEY_LAST),
        );
        let proxy = fx.proxy();
        for key in ["x", "z", "w", "y"] {
            proxy.item_added(key);
        }
        fx.pump();

        let keys: Vec<&str> = fx.registry.ordered().into_iter().map(PluginItem::key).collect();
        assert_eq!(keys, vec!["z", "y", "x", "w"]);
    }

    #[test]
    fn test_proxy_call_inside_callback_is_deferred() {
        let mut provider = TestProvider::named("test").with_item("first", 0).with_item("second", 1);
        provider.chain.insert("first".into(), "second".into());
        let mut fx = Fixture::new(provider);

        fx.proxy().item_added("first");
        let events = fx.pump();
        assert_eq!(
            events,
            vec![
                RegistryEvent::Inserted(plugin_ref("first")),
                RegistryEvent::Inserted(plugin_ref("second")),
            ]
        );
    }

    #[test]
    fn test_context_menu_request_for_known_item() {
        let mut fx = Fixture::new(TestProvider::named("test").with_item("a", 0));
        fx.proxy().item_added("a");
        fx.proxy().request_context_menu("a");
        let events = fx.pump();
        assert_eq!(events.last(), Some(&RegistryEvent::ContextMenuRequested(plugin_ref("a"))));
    }

    #[test]
    fn test_container_membership_is_forwarded() {
        let mut fx = Fixture::new(TestProvider::named("test").with_item("a", 0));
        fx.proxy().item_added("a");
        fx.pump();
        let plugin = PluginId::new("test");

        fx.registry.set_in_container(&plugin, "a", true);
        assert!(fx.registry.get(&plugin, "a").unwrap().in_container());
        assert_eq!(fx.provider.borrow().in_container.get("a"), Some(&true));
        assert_eq!(fx.registry.take_events(), vec![RegistryEvent::Updated(plugin_ref("a"))]);
    }

    #[test]
    fn test_reorder_takes_target_position() {
        let mut fx = Fixture::new(
            TestProvider::named("test")
                .with_item("a", 1)
                .with_item("b", 4)
                .with_item("c", 7)
                .with_item("pinned", SORT_KEY_LAST),
        );
        for key in ["a", "b", "c", "pinned"] {
            fx.proxy().item_added(key);
        }
        fx.pump();

        fx.registry.reorder(&plugin_ref("a"), &plugin_ref("c"));
        let keys: Vec<&str> = fx.registry.ordered().into_iter().map(PluginItem::key).collect();
        assert_eq!(keys, vec!["b", "c", "a", "pinned"]);
        assert_eq!(fx.provider.borrow().sort_keys.get("a"), Some(&2));

        fx.registry.reorder(&plugin_ref("pinned"), &plugin_ref("b"));
        let keys: Vec<&str> = fx.registry.ordered().into_iter().map(PluginItem::key).collect();
        assert_eq!(keys, vec!["b", "c", "a", "pinned"]);
        assert_eq!(fx.registry.ordered_refs()[2], plugin_ref("a"));
        assert_eq!(fx.registry.get(&PluginId::new("test"), "a").unwrap().item_ref(), plugin_ref("a"));
    }
}
