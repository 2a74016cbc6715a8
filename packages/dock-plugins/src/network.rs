//! Wired network indicator: one item per wired device.

use dock_core::debounce::earliest;
use dock_core::item::WiredItem;
use dock_core::plugin::{ItemProvider, PluginEnv, ProviderHandle};
use dock_core::services::{DeviceState, GlobalNetworkState, ServiceRequest, SystemEvent};
use dock_core::widget::{ContextMenu, MenuItem, WidgetHandle};
use dock_core::DockContext;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Instant;

const MENU_ENABLE: &str = "enable";
const MENU_DISABLE: &str = "disable";
const MENU_SETTINGS: &str = "settings";

fn sort_setting(path: &str) -> String {
    format!("network/sort/{}", path)
}

#[derive(Default)]
pub struct NetworkProvider {
    env: Option<PluginEnv>,
    devices: BTreeMap<String, Rc<RefCell<WiredItem>>>,
    /// Last known driving state, handed to devices that appear later
    active: Vec<String>,
    global: GlobalNetworkState,
    disabled: BTreeSet<String>,
}

impl NetworkProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory() -> Result<ProviderHandle, String> {
        Ok(Rc::new(RefCell::new(Self::new())))
    }

    pub fn device(&self, path: &str) -> Option<&Rc<RefCell<WiredItem>>> {
        self.devices.get(path)
    }

    pub fn device_paths(&self) -> Vec<&str> {
        self.devices.keys().map(String::as_str).collect()
    }

    fn set_devices(&mut self, paths: &[String], ctx: &DockContext, now: Instant) {
        let Some(env) = &self.env else { return };
        let wanted: BTreeSet<&String> = paths.iter().collect();

        let gone: Vec<String> = self
            .devices
            .keys()
            .filter(|p| !wanted.contains(p))
            .cloned()
            .collect();
        for path in gone {
            tracing::debug!(device = %path, "wired device removed");
            self.devices.remove(&path);
            self.disabled.remove(&path);
            env.proxy.item_removed(&path);
        }

        for path in paths {
            if self.devices.contains_key(path) {
                continue;
            }
            tracing::debug!(device = %path, "wired device added");
            let mut item = WiredItem::new(path.clone(), ctx, now);
            item.set_active_devices(&self.active, now);
            item.set_global_state(self.global, now);
            self.devices.insert(path.clone(), Rc::new(RefCell::new(item)));
            env.proxy.item_added(path);
        }
    }

    fn request(&self, request: ServiceRequest) {
        if let Some(env) = &self.env {
            env.requests.push(request);
        }
    }
}

impl ItemProvider for NetworkProvider {
    fn plugin_name(&self) -> &str {
        "network"
    }

    fn init(&mut self, env: PluginEnv, _ctx: &DockContext, _now: Instant) {
        self.env = Some(env);
    }

    fn display_mode_changed(&mut self, ctx: &DockContext, now: Instant) {
        for item in self.devices.values() {
            let mut item = item.borrow_mut();
            item.set_display_mode(ctx.display_mode, now);
            item.set_extent(ctx.plugin_item_size().width, now);
        }
    }

    fn position_changed(&mut self, ctx: &DockContext, now: Instant) {
        for item in self.devices.values() {
            item.borrow_mut().set_extent(ctx.plugin_item_size().width, now);
        }
    }

    fn item_widget(&mut self, key: &str) -> Option<WidgetHandle> {
        let widget: WidgetHandle = self.devices.get(key)?.clone();
        Some(widget)
    }

    fn item_tips_widget(&mut self, key: &str) -> Option<WidgetHandle> {
        let tips: WidgetHandle = self.devices.get(key)?.borrow().tips();
        Some(tips)
    }

    fn item_command(&self, key: &str) -> Option<String> {
        self.devices.get(key).map(|d| d.borrow().command().to_string())
    }

    fn item_context_menu(&self, key: &str) -> Option<ContextMenu> {
        if !self.devices.contains_key(key) {
            return None;
        }
        let toggle = if self.disabled.contains(key) {
            MenuItem::new(MENU_ENABLE, "Enable network")
        } else {
            MenuItem::new(MENU_DISABLE, "Disable network")
        };
        Some(ContextMenu::new(vec![
            toggle,
            MenuItem::new(MENU_SETTINGS, "Network settings"),
        ]))
    }

    fn invoked_menu_item(&mut self, key: &str, menu_id: &str, _checked: bool) {
        let Some(device) = self.devices.get(key) else {
            tracing::debug!(device = key, "menu for unknown device");
            return;
        };
        match menu_id {
            MENU_ENABLE | MENU_DISABLE => {
                let enabled = menu_id == MENU_ENABLE;
                if enabled {
                    self.disabled.remove(key);
                } else {
                    self.disabled.insert(key.to_string());
                }
                self.request(ServiceRequest::SetDeviceEnabled {
                    path: key.to_string(),
                    enabled,
                });
            }
            MENU_SETTINGS => {
                let command = device.borrow().command().to_string();
                self.request(ServiceRequest::RunCommand { command });
            }
            other => tracing::debug!(menu_id = other, "unknown network menu item"),
        }
    }

    fn item_sort_key(&self, key: &str) -> i32 {
        self.env
            .as_ref()
            .and_then(|env| env.settings.borrow().get_int(&sort_setting(key)))
            .map_or(0, |v| v as i32)
    }

    fn set_sort_key(&mut self, key: &str, order: i32) {
        if let Some(env) = &self.env {
            env.settings.borrow_mut().set_int(&sort_setting(key), order.into());
        }
    }

    fn system_event(&mut self, event: &SystemEvent, ctx: &DockContext, now: Instant) {
        match event {
            SystemEvent::NetworkDevices { devices } => self.set_devices(devices, ctx, now),
            SystemEvent::DeviceState { path, state } => match self.devices.get(path) {
                Some(item) => item.borrow_mut().set_device_state(DeviceState::from_code(*state), now),
                None => tracing::debug!(device = %path, "state for unknown device"),
            },
            SystemEvent::GlobalNetworkState { state } => {
                self.global = GlobalNetworkState::from_code(*state);
                for item in self.devices.values() {
                    item.borrow_mut().set_global_state(self.global, now);
                }
            }
            SystemEvent::ActiveConnections { devices } => {
                self.active = devices.clone();
                for item in self.devices.values() {
                    item.borrow_mut().set_active_devices(&self.active, now);
                }
            }
            SystemEvent::DeviceConnInfo { path, info } => {
                if let Some(item) = self.devices.get(path) {
                    item.borrow_mut().set_conn_info(info.clone());
                }
            }
            _ => {}
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest(self.devices.values().map(|d| d.borrow().next_deadline()))
    }

    fn on_timer(&mut self, now: Instant, _ctx: &DockContext) {
        let Some(env) = &self.env else { return };
        for (path, item) in &self.devices {
            if item.borrow_mut().on_timer(now) {
                env.proxy.item_update(path);
            }
        }
    }
}
