//! System tray.
//!
//! In Fashion mode every tray icon folds into a single item whose click opens
//! an applet listing them all. In Efficient mode each icon is its own dock
//! item and may be moved into the plugin container.

use dock_core::plugin::{ItemProvider, PluginEnv, ProviderHandle};
use dock_core::services::SystemEvent;
use dock_core::widget::{next_widget_id, Label, Visual, Widget, WidgetHandle, WidgetId};
use dock_core::{DisplayMode, DockContext, Size};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Instant;

/// Key of the aggregate item shown in Fashion mode
pub const FASHION_TRAY_KEY: &str = "fashion-tray";

const APPLET_CELL: u32 = 26;

fn container_setting(key: &str) -> String {
    format!("tray/container/{}", key)
}

fn sort_setting(key: &str) -> String {
    format!("tray/sort/{}", key)
}

fn tray_visual(key: &str, ctx: &DockContext) -> Visual {
    Visual::icon(key, ctx.icon_pixels(ctx.plugin_item_size().width))
}

/// One tray icon, keyed by the tray manager
pub struct TrayIcon {
    id: WidgetId,
    key: String,
}

impl TrayIcon {
    fn new(key: &str) -> Self {
        Self {
            id: next_widget_id(),
            key: key.to_string(),
        }
    }
}

impl Widget for TrayIcon {
    fn id(&self) -> WidgetId {
        self.id
    }

    fn visual(&self, ctx: &DockContext) -> Visual {
        tray_visual(&self.key, ctx)
    }
}

/// Aggregate dock item and applet content share this shape: a row of icons.
pub struct TrayGroup {
    id: WidgetId,
    keys: Vec<String>,
}

impl TrayGroup {
    fn new() -> Self {
        Self {
            id: next_widget_id(),
            keys: Vec::new(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Widget for TrayGroup {
    fn id(&self) -> WidgetId {
        self.id
    }

    fn size_hint(&self) -> Size {
        Size::new(APPLET_CELL * self.keys.len().max(1) as u32, APPLET_CELL)
    }

    fn visual(&self, ctx: &DockContext) -> Visual {
        Visual {
            children: self.keys.iter().map(|k| tray_visual(k, ctx)).collect(),
            ..Default::default()
        }
    }
}

pub struct TrayProvider {
    env: Option<PluginEnv>,
    mode: DisplayMode,
    trays: BTreeMap<String, Rc<RefCell<TrayIcon>>>,
    fashion: Rc<RefCell<TrayGroup>>,
    applet: Rc<RefCell<TrayGroup>>,
    tips: Rc<RefCell<Label>>,
}

impl Default for TrayProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TrayProvider {
    pub fn new() -> Self {
        Self {
            env: None,
            mode: DisplayMode::Fashion,
            trays: BTreeMap::new(),
            fashion: Rc::new(RefCell::new(TrayGroup::new())),
            applet: Rc::new(RefCell::new(TrayGroup::new())),
            tips: Label::handle(""),
        }
    }

    pub fn factory() -> Result<ProviderHandle, String> {
        Ok(Rc::new(RefCell::new(Self::new())))
    }

    pub fn tray_keys(&self) -> Vec<&str> {
        self.trays.keys().map(String::as_str).collect()
    }

    fn sync_groups(&mut self) {
        let keys: Vec<String> = self.trays.keys().cloned().collect();
        self.tips.borrow_mut().set_text(match keys.len() {
            1 => "1 tray icon".to_string(),
            n => format!("{} tray icons", n),
        });
        self.fashion.borrow_mut().keys = keys.clone();
        self.applet.borrow_mut().keys = keys;
    }

    fn switch_to_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
        self.sync_groups();
        let Some(env) = &self.env else { return };
        match mode {
            DisplayMode::Fashion => {
                for key in self.trays.keys() {
                    env.proxy.item_removed(key);
                }
                if !self.trays.is_empty() {
                    env.proxy.item_added(FASHION_TRAY_KEY);
                }
            }
            DisplayMode::Efficient => {
                env.proxy.item_removed(FASHION_TRAY_KEY);
                for key in self.trays.keys() {
                    env.proxy.item_added(key);
                }
            }
        }
    }

    fn tray_added(&mut self, key: &str) {
        if self.trays.contains_key(key) {
            return;
        }
        tracing::debug!(tray = key, "tray added");
        self.trays.insert(key.to_string(), Rc::new(RefCell::new(TrayIcon::new(key))));
        self.sync_groups();
        let Some(env) = &self.env else { return };
        match self.mode {
            DisplayMode::Fashion if self.trays.len() == 1 => env.proxy.item_added(FASHION_TRAY_KEY),
            DisplayMode::Fashion => env.proxy.item_update(FASHION_TRAY_KEY),
            DisplayMode::Efficient => env.proxy.item_added(key),
        }
    }

    fn tray_removed(&mut self, key: &str) {
        if self.trays.remove(key).is_none() {
            return;
        }
        tracing::debug!(tray = key, "tray removed");
        self.sync_groups();
        let Some(env) = &self.env else { return };
        match self.mode {
            DisplayMode::Fashion if self.trays.is_empty() => env.proxy.item_removed(FASHION_TRAY_KEY),
            DisplayMode::Fashion => env.proxy.item_update(FASHION_TRAY_KEY),
            DisplayMode::Efficient => env.proxy.item_removed(key),
        }
    }

    fn tray_changed(&self, key: &str) {
        let Some(env) = &self.env else { return };
        if !self.trays.contains_key(key) {
            return;
        }
        match self.mode {
            DisplayMode::Fashion => env.proxy.item_update(FASHION_TRAY_KEY),
            DisplayMode::Efficient => env.proxy.item_update(key),
        }
    }

    fn tray_list(&mut self, keys: &[String]) {
        let wanted: BTreeSet<&str> = keys.iter().map(String::as_str).collect();
        let gone: Vec<String> = self
            .trays
            .keys()
            .filter(|k| !wanted.contains(k.as_str()))
            .cloned()
            .collect();
        for key in gone {
            self.tray_removed(&key);
        }
        for key in keys {
            self.tray_added(key);
        }
    }
}

impl ItemProvider for TrayProvider {
    fn plugin_name(&self) -> &str {
        "system-tray"
    }

    fn init(&mut self, env: PluginEnv, ctx: &DockContext, _now: Instant) {
        self.env = Some(env);
        self.switch_to_mode(ctx.display_mode);
    }

    fn display_mode_changed(&mut self, ctx: &DockContext, _now: Instant) {
        if ctx.display_mode != self.mode {
            self.switch_to_mode(ctx.display_mode);
        }
    }

    fn item_widget(&mut self, key: &str) -> Option<WidgetHandle> {
        if key == FASHION_TRAY_KEY {
            let widget: WidgetHandle = self.fashion.clone();
            return Some(widget);
        }
        let widget: WidgetHandle = self.trays.get(key)?.clone();
        Some(widget)
    }

    fn item_tips_widget(&mut self, key: &str) -> Option<WidgetHandle> {
        if key != FASHION_TRAY_KEY {
            return None;
        }
        let tips: WidgetHandle = self.tips.clone();
        Some(tips)
    }

    fn item_popup_applet(&mut self, key: &str) -> Option<WidgetHandle> {
        if key != FASHION_TRAY_KEY || self.trays.is_empty() {
            return None;
        }
        let applet: WidgetHandle = self.applet.clone();
        Some(applet)
    }

    fn item_allow_container(&self, key: &str) -> bool {
        key != FASHION_TRAY_KEY
    }

    fn item_is_in_container(&self, key: &str) -> bool {
        self.env
            .as_ref()
            .and_then(|env| env.settings.borrow().get_bool(&container_setting(key)))
            .unwrap_or(false)
    }

    fn set_item_is_in_container(&mut self, key: &str, in_container: bool) {
        if let Some(env) = &self.env {
            env.settings.borrow_mut().set_bool(&container_setting(key), in_container);
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

    fn system_event(&mut self, event: &SystemEvent, _ctx: &DockContext, _now: Instant) {
        match event {
            SystemEvent::TrayList { keys } => self.tray_list(keys),
            SystemEvent::TrayAdded { key } => self.tray_added(key),
            SystemEvent::TrayRemoved { key } => self.tray_removed(key),
            SystemEvent::TrayChanged { key } => self.tray_changed(key),
            _ => {}
        }
    }
}
