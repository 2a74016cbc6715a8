//! Panel controller.
//!
//! Owns the dock context, the shared popup, the plugin host and registry
//! and the application items. Bus notifications, pointer input and timer
//! expiries all enter here; the result is a serializable [`PanelState`]
//! plus a queue of outgoing service requests.

use crate::debounce::earliest;
use crate::item::{AppItem, DockItem, DragOutcome, DropPayload, ItemEnv, ItemRef};
use crate::plugin::{PluginHost, PluginId};
use crate::popup::{PopupEvent, PopupState, PopupSurface};
use crate::queue::TaskQueue;
use crate::registry::{ItemRegistry, RegistryEvent};
use crate::services::{ServiceRequest, SystemEvent};
use crate::settings::SharedSettings;
use crate::snapshot::{SnapshotCapture, WindowSystem};
use crate::widget::{ContextMenu, Visual};
use crate::{DisplayMode, DockContext, DockPosition, Point, Rect, WindowId};
use serde::Serialize;
use std::rc::Rc;
use std::time::Instant;

/// Result of feeding one input into the panel
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PanelUpdate {
    /// Whether the published state should be refreshed
    pub state_changed: bool,
}

impl PanelUpdate {
    fn changed(state_changed: bool) -> Self {
        Self { state_changed }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemState {
    pub item: ItemRef,
    pub geometry: Rect,
    pub visual: Visual,
    /// Shown inside its plugin's container instead of the dock strip
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub in_container: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MenuState {
    pub owner: ItemRef,
    pub menu: ContextMenu,
}

/// Everything a renderer needs to draw the dock
#[derive(Debug, Clone, Serialize)]
pub struct PanelState {
    pub context: DockContext,
    /// Screen rect of the dock strip
    pub dock: Rect,
    pub items: Vec<ItemState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popup: Option<PopupState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu: Option<MenuState>,
}

/// Item rects along the dock edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub dock: Rect,
    pub apps: Vec<Rect>,
    pub plugins: Vec<Rect>,
}

/// Place `apps` application items and `plugins` plugin items on the dock edge.
///
/// Fashion mode centers everything as one group. Efficient mode spans the
/// whole edge with applications at the start and plugins at the end.
pub fn compute_layout(ctx: &DockContext, apps: usize, plugins: usize) -> Layout {
    let horizontal = ctx.position.is_horizontal();
    let thickness = ctx.dock_thickness();
    let app_len = ctx.item_base_width() as i32;
    let plugin_len = ctx.plugin_item_size().width as i32;
    let screen = ctx.screen;

    let (edge_start, edge_len) = if horizontal {
        (screen.x, screen.width as i32)
    } else {
        (screen.y, screen.height as i32)
    };
    let cross = match ctx.position {
        DockPosition::Top => screen.y,
        DockPosition::Bottom => screen.bottom() - thickness as i32,
        DockPosition::Left => screen.x,
        DockPosition::Right => screen.right() - thickness as i32,
    };
    let rect = |main: i32, len: i32| {
        if horizontal {
            Rect::new(main, cross, len.max(0) as u32, thickness)
        } else {
            Rect::new(cross, main, thickness, len.max(0) as u32)
        }
    };

    let apps_total = app_len * apps as i32;
    let plugins_total = plugin_len * plugins as i32;

    let (dock, apps_start, plugins_start) = match ctx.display_mode {
        DisplayMode::Fashion => {
            let total = apps_total + plugins_total;
            let start = edge_start + (edge_len - total).max(0) / 2;
            (rect(start, total), start, start + apps_total)
        }
        DisplayMode::Efficient => (
            rect(edge_start, edge_len),
            edge_start,
            edge_start + edge_len - plugins_total,
        ),
    };

    Layout {
        dock,
        apps: (0..apps as i32).map(|i| rect(apps_start + i * app_len, app_len)).collect(),
        plugins: (0..plugins as i32)
            .map(|i| rect(plugins_start + i * plugin_len, plugin_len))
            .collect(),
    }
}

/// Point on the item's screen-interior edge where its popup attaches.
pub fn popup_anchor(position: DockPosition, rect: Rect) -> Point {
    let center = rect.center();
    match position {
        DockPosition::Bottom => Point::new(center.x, rect.y),
        DockPosition::Top => Point::new(center.x, rect.bottom()),
        DockPosition::Left => Point::new(rect.right(), center.y),
        DockPosition::Right => Point::new(rect.x, center.y),
    }
}

fn find_item<'a>(
    apps: &'a mut [AppItem],
    registry: &'a mut ItemRegistry,
    item: &ItemRef,
) -> Option<&'a mut dyn DockItem> {
    match item {
        ItemRef::App(id) => apps
            .iter_mut()
            .find(|a| a.id() == id.as_str())
            .map(|a| a as &mut dyn DockItem),
        ItemRef::Plugin { plugin, key } => registry.get_mut(plugin, key).map(|p| p as &mut dyn DockItem),
    }
}

pub struct Panel {
    ctx: DockContext,
    popup: PopupSurface,
    host: PluginHost,
    registry: ItemRegistry,
    apps: Vec<AppItem>,
    ws: Rc<dyn WindowSystem>,
    capture: SnapshotCapture,
    requests: TaskQueue<ServiceRequest>,
    menu: Option<MenuState>,
    drag: Option<ItemRef>,
    dock: Rect,
    popup_events: Vec<PopupEvent>,
}

impl Panel {
    /// Build the panel and initialize every loaded plugin.
    pub fn new(
        ctx: DockContext,
        ws: Rc<dyn WindowSystem>,
        mut host: PluginHost,
        settings: SharedSettings,
        now: Instant,
    ) -> Self {
        let requests = TaskQueue::new();
        let registry = ItemRegistry::new(host.proxy_queue(), requests.clone());
        host.init_all(&ctx, &requests, &settings, now);

        let mut panel = Self {
            ctx,
            popup: PopupSurface::new(),
            host,
            registry,
            apps: Vec::new(),
            ws,
            capture: SnapshotCapture::default(),
            requests,
            menu: None,
            drag: None,
            dock: Rect::default(),
            popup_events: Vec::new(),
        };
        panel.after_dispatch(now);
        panel.relayout(now);
        panel
    }

    pub fn context(&self) -> &DockContext {
        &self.ctx
    }

    pub fn popup(&self) -> &PopupSurface {
        &self.popup
    }

    pub fn registry(&self) -> &ItemRegistry {
        &self.registry
    }

    pub fn apps(&self) -> &[AppItem] {
        &self.apps
    }

    pub fn app(&self, id: &str) -> Option<&AppItem> {
        self.apps.iter().find(|a| a.id() == id)
    }

    pub fn menu(&self) -> Option<&MenuState> {
        self.menu.as_ref()
    }

    pub fn plugin_ids(&self) -> Vec<PluginId> {
        self.host.plugin_ids()
    }

    /// Outgoing service requests queued since the last call
    pub fn take_requests(&mut self) -> Vec<ServiceRequest> {
        self.requests.drain()
    }

    /// Popup transitions since the last call (raise requests in particular)
    pub fn take_popup_events(&mut self) -> Vec<PopupEvent> {
        std::mem::take(&mut self.popup_events)
    }

    // ============================================
    // Bus notifications
    // ============================================

    pub fn handle_event(&mut self, event: SystemEvent, now: Instant) -> PanelUpdate {
        let changed = match event {
            SystemEvent::CompositeChanged { enabled } => {
                self.ctx.composite = enabled;
                for app in &mut self.apps {
                    app.composite_changed(enabled);
                }
                self.refresh_visible_preview();
                self.host.system_event(&SystemEvent::CompositeChanged { enabled }, &self.ctx, now);
                self.popup.reposition(&self.ctx);
                true
            }
            SystemEvent::ScreenChanged { geometry, scale } => {
                self.ctx.screen = geometry;
                self.ctx.scale = scale;
                self.relayout(now);
                self.popup.reposition(&self.ctx);
                true
            }
            SystemEvent::DisplayModeChanged { mode } => {
                self.ctx.display_mode = mode;
                for app in &mut self.apps {
                    app.set_display_mode(mode);
                }
                self.host.display_mode_changed(&self.ctx, now);
                self.relayout(now);
                self.popup.reposition(&self.ctx);
                true
            }
            SystemEvent::PositionChanged { position } => {
                self.ctx.position = position;
                self.popup.hide();
                self.menu = None;
                self.host.position_changed(&self.ctx, now);
                self.relayout(now);
                true
            }
            SystemEvent::PointerPress { x, y } => self.popup.on_global_press(Point::new(x, y)),

            SystemEvent::EntryAdded { entry, index } => {
                match self.apps.iter_mut().find(|a| a.id() == entry.id) {
                    Some(app) => {
                        tracing::debug!(entry = %entry.id, "entry re-added, refreshing");
                        app.set_active(entry.active);
                        app.set_icon(entry.icon);
                        app.set_menu(&entry.menu);
                        app.set_windows(entry.windows, now);
                    }
                    None => {
                        let app = AppItem::new(entry, &self.ctx, self.requests.clone(), now);
                        let index = index.unwrap_or(self.apps.len()).min(self.apps.len());
                        self.apps.insert(index, app);
                    }
                }
                self.relayout(now);
                true
            }
            SystemEvent::EntryRemoved { id } => {
                let Some(index) = self.apps.iter().position(|a| a.id() == id) else {
                    tracing::debug!(entry = %id, "remove for unknown entry");
                    return PanelUpdate::default();
                };
                let app = self.apps.remove(index);
                self.forget_item(&app.item_ref());
                drop(app);
                self.relayout(now);
                true
            }
            SystemEvent::EntryWindows { id, windows } => {
                let owner = ItemRef::App(id.clone());
                let Some(app) = self.apps.iter_mut().find(|a| a.id() == id) else {
                    return PanelUpdate::default();
                };
                app.set_windows(windows, now);
                let empty = app.windows().is_empty();
                if empty && self.popup.owner() == Some(&owner) && self.popup.is_modal() {
                    self.popup.hide();
                }
                true
            }
            SystemEvent::EntryActive { id, active } => self.with_app(&id, |app| app.set_active(active)),
            SystemEvent::EntryIcon { id, icon } => self.with_app(&id, |app| app.set_icon(icon)),
            SystemEvent::EntryCurrentWindow { id, window } => {
                self.with_app(&id, |app| app.set_current_window(window))
            }
            SystemEvent::EntryMenu { id, menu } => self.with_app(&id, |app| app.set_menu(&menu)),

            other => {
                self.host.system_event(&other, &self.ctx, now);
                false
            }
        };

        let structural = self.after_dispatch(now);
        PanelUpdate::changed(changed || structural)
    }

    fn with_app(&mut self, id: &str, f: impl FnOnce(&mut AppItem)) -> bool {
        match self.apps.iter_mut().find(|a| a.id() == id) {
            Some(app) => {
                f(app);
                true
            }
            None => {
                tracing::debug!(entry = %id, "update for unknown entry");
                false
            }
        }
    }

    // ============================================
    // Pointer input
    // ============================================

    /// Pointer entered an item.
    pub fn hover(&mut self, item: &ItemRef, now: Instant) -> PanelUpdate {
        if self.drag.is_some() || self.menu.is_some() {
            return PanelUpdate::default();
        }
        let Some(target) = find_item(&mut self.apps, &mut self.registry, item) else {
            return PanelUpdate::default();
        };
        let env = ItemEnv {
            ctx: &self.ctx,
            ws: &*self.ws,
            capture: &self.capture,
        };
        let request = target.popup_content(&env);
        let anchor = popup_anchor(self.ctx.position, target.geometry());

        let Some(request) = request else {
            return self.finish(now, false);
        };
        // hover tips never replace a modal popup
        if !request.modal && self.popup.is_visible() && self.popup.is_modal() {
            return self.finish(now, false);
        }
        self.popup
            .show(&request.widget, item.clone(), anchor, request.modal, &self.ctx, now);
        self.finish(now, true)
    }

    /// Pointer left an item.
    pub fn leave(&mut self, item: &ItemRef, now: Instant) -> PanelUpdate {
        if let Some(target) = find_item(&mut self.apps, &mut self.registry, item) {
            target.leave(now);
        }
        let hidden = self.popup.cancel_from(item);
        self.finish(now, hidden)
    }

    /// Pointer entered the popup of an application item.
    pub fn enter_preview(&mut self, item: &ItemRef) {
        if let ItemRef::App(id) = item {
            if let Some(app) = self.apps.iter_mut().find(|a| a.id() == *id) {
                app.enter_preview();
            }
        }
    }

    pub fn click(&mut self, item: &ItemRef, now: Instant) -> PanelUpdate {
        self.popup.hide();
        self.menu = None;
        let Some(target) = find_item(&mut self.apps, &mut self.registry, item) else {
            return self.finish(now, true);
        };
        let applet = target.activate(now);
        let anchor = popup_anchor(self.ctx.position, target.geometry());
        if let Some(applet) = applet {
            self.popup
                .show(&applet.widget, item.clone(), anchor, applet.modal, &self.ctx, now);
        }
        self.finish(now, true)
    }

    pub fn middle_click(&mut self, item: &ItemRef, now: Instant) -> PanelUpdate {
        if let Some(target) = find_item(&mut self.apps, &mut self.registry, item) {
            target.middle_click();
        }
        self.finish(now, false)
    }

    pub fn wheel(&mut self, item: &ItemRef, delta: i32, now: Instant) -> PanelUpdate {
        if let Some(target) = find_item(&mut self.apps, &mut self.registry, item) {
            target.wheel(delta);
        }
        self.finish(now, false)
    }

    /// Open the item's context menu, if it has one.
    pub fn right_click(&mut self, item: &ItemRef, now: Instant) -> PanelUpdate {
        self.popup.hide();
        self.open_menu(item);
        self.finish(now, true)
    }

    fn open_menu(&mut self, item: &ItemRef) {
        let menu = find_item(&mut self.apps, &mut self.registry, item).and_then(|t| t.context_menu());
        self.menu = menu.map(|menu| MenuState {
            owner: item.clone(),
            menu,
        });
    }

    pub fn invoke_menu(&mut self, id: &str, checked: bool, now: Instant) -> PanelUpdate {
        let Some(state) = self.menu.take() else {
            return PanelUpdate::default();
        };
        if let Some(target) = find_item(&mut self.apps, &mut self.registry, &state.owner) {
            target.invoke_menu_action(id, checked);
        }
        self.finish(now, true)
    }

    pub fn dismiss_menu(&mut self) -> PanelUpdate {
        PanelUpdate::changed(self.menu.take().is_some())
    }

    /// Button pressed on an item at `pos` (screen coordinates).
    pub fn press(&mut self, item: &ItemRef, pos: Point) {
        if let Some(target) = find_item(&mut self.apps, &mut self.registry, item) {
            target.press(pos);
        }
    }

    /// Pointer moved with the button held after a press on `item`.
    pub fn drag_motion(&mut self, item: &ItemRef, pos: Point, now: Instant) -> PanelUpdate {
        let Some(target) = find_item(&mut self.apps, &mut self.registry, item) else {
            return PanelUpdate::default();
        };
        if !target.drag_motion(pos) {
            return PanelUpdate::default();
        }
        tracing::debug!(item = %item, "drag started");
        self.drag = Some(item.clone());
        self.popup.hide();
        self.finish(now, true)
    }

    pub fn end_drag(&mut self, outcome: DragOutcome, now: Instant) -> PanelUpdate {
        let Some(source) = self.drag.take() else {
            return PanelUpdate::default();
        };
        if let Some(target) = find_item(&mut self.apps, &mut self.registry, &source) {
            target.end_drag(&outcome);
        }
        if let DragOutcome::DroppedOn(target) = &outcome {
            if *target != source {
                self.reorder(&source, target, now);
            }
        }
        self.finish(now, true)
    }

    /// Something from outside the panel (or another item) was dropped on `target`.
    pub fn drop_on(&mut self, target: &ItemRef, payload: DropPayload, now: Instant) -> PanelUpdate {
        if let DropPayload::RequestDock { uri } = payload {
            self.requests.push(ServiceRequest::RequestDock { uri });
            return PanelUpdate::default();
        }
        let Some(item) = find_item(&mut self.apps, &mut self.registry, target) else {
            return PanelUpdate::default();
        };
        if !item.accepts_drop(&payload) {
            tracing::debug!(item = %target, "drop rejected");
            return PanelUpdate::default();
        }
        match payload {
            DropPayload::Item { source } => self.reorder(&source, target, now),
            payload => item.handle_drop(payload),
        }
        self.finish(now, true)
    }

    fn reorder(&mut self, source: &ItemRef, target: &ItemRef, now: Instant) {
        match (source, target) {
            (ItemRef::App(from), ItemRef::App(to)) => {
                let (Some(a), Some(b)) = (
                    self.apps.iter().position(|x| x.id() == from.as_str()),
                    self.apps.iter().position(|x| x.id() == to.as_str()),
                ) else {
                    return;
                };
                let app = self.apps.remove(a);
                self.apps.insert(b, app);
            }
            (ItemRef::Plugin { .. }, ItemRef::Plugin { .. }) => self.registry.reorder(source, target),
            _ => return,
        }
        self.relayout(now);
    }

    // ============================================
    // Preview popup
    // ============================================

    fn preview_owner(&self) -> Option<&AppItem> {
        match self.popup.owner()? {
            ItemRef::App(id) if self.popup.is_modal() => self.apps.iter().find(|a| a.id() == id.as_str()),
            _ => None,
        }
    }

    pub fn preview_hover(&mut self, window: WindowId) -> PanelUpdate {
        let Some(app) = self.preview_owner() else {
            return PanelUpdate::default();
        };
        let preview = app.preview().clone();
        preview.borrow_mut().enter_window(window);
        self.refresh_visible_preview();
        PanelUpdate::changed(true)
    }

    /// Re-capture the cells of the preview on screen, if any.
    fn refresh_visible_preview(&mut self) {
        let id = match self.popup.owner() {
            Some(ItemRef::App(id)) if self.popup.is_visible() && self.popup.is_modal() => id.clone(),
            _ => return,
        };
        if let Some(app) = self.apps.iter_mut().find(|a| a.id() == id) {
            app.refresh_preview(&*self.ws, &self.capture, self.ctx.scale);
        }
    }

    pub fn preview_activate(&mut self, window: WindowId, now: Instant) -> PanelUpdate {
        let Some(app) = self.preview_owner() else {
            return PanelUpdate::default();
        };
        let preview = app.preview().clone();
        preview.borrow_mut().activate_window(window);
        self.popup.hide();
        self.finish(now, true)
    }

    pub fn preview_close(&mut self, window: WindowId) -> PanelUpdate {
        let Some(app) = self.preview_owner() else {
            return PanelUpdate::default();
        };
        let preview = app.preview().clone();
        preview.borrow_mut().close_window(window, &*self.ws);
        PanelUpdate::default()
    }

    // ============================================
    // Plugin container
    // ============================================

    pub fn set_in_container(&mut self, plugin: &PluginId, key: &str, in_container: bool, now: Instant) -> PanelUpdate {
        self.registry.set_in_container(plugin, key, in_container);
        let changed = self.after_dispatch(now);
        PanelUpdate::changed(changed)
    }

    // ============================================
    // Timers
    // ============================================

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(
            [self.popup.next_deadline(), self.host.next_deadline()]
                .into_iter()
                .chain(self.apps.iter().map(|a| a.next_deadline()))
                .chain(self.registry.iter().map(|p| p.next_deadline())),
        )
    }

    pub fn on_timer(&mut self, now: Instant) -> PanelUpdate {
        self.popup.on_timer(now);

        let env = ItemEnv {
            ctx: &self.ctx,
            ws: &*self.ws,
            capture: &self.capture,
        };
        let mut changed = false;
        let mut cancel = Vec::new();
        for app in &mut self.apps {
            if app.next_deadline().is_some_and(|d| d <= now) {
                let out = app.on_timer(now, &env);
                changed |= out.repaint;
                if out.cancel_popup {
                    cancel.push(app.item_ref());
                }
            }
        }
        for owner in cancel {
            if self.popup.owner() == Some(&owner) {
                self.popup.hide();
                changed = true;
            }
        }

        if self.host.next_deadline().is_some_and(|d| d <= now) {
            self.host.on_timer(now, &self.ctx);
        }

        self.finish(now, changed)
    }

    // ============================================
    // State
    // ============================================

    pub fn state(&self) -> PanelState {
        let mut items: Vec<ItemState> = self
            .apps
            .iter()
            .map(|app| ItemState {
                item: app.item_ref(),
                geometry: app.geometry(),
                visual: app.paint(&self.ctx),
                in_container: false,
            })
            .collect();
        items.extend(self.registry.ordered().into_iter().map(|p| ItemState {
            item: p.item_ref(),
            geometry: p.geometry(),
            visual: p.paint(&self.ctx),
            in_container: p.in_container(),
        }));

        PanelState {
            context: self.ctx.clone(),
            dock: self.dock,
            items,
            popup: self.popup.state(&self.ctx),
            menu: self.menu.clone(),
        }
    }

    fn finish(&mut self, now: Instant, changed: bool) -> PanelUpdate {
        let structural = self.after_dispatch(now);
        PanelUpdate::changed(changed || structural)
    }

    /// Apply queued plugin requests and collect popup transitions.
    fn after_dispatch(&mut self, now: Instant) -> bool {
        let mut events = self.registry.pump(&self.host);
        events.extend(self.registry.take_events());

        let mut relayout = false;
        for event in &events {
            match event {
                RegistryEvent::Inserted(_) | RegistryEvent::Updated(_) => relayout = true,
                RegistryEvent::Removed(item) => {
                    self.forget_item(item);
                    relayout = true;
                }
                RegistryEvent::ContextMenuRequested(item) => {
                    self.popup.hide();
                    self.open_menu(item);
                }
            }
        }
        if relayout {
            self.relayout(now);
        }

        let popup_events = self.popup.take_events();
        let popup_changed = !popup_events.is_empty();
        for event in &popup_events {
            tracing::trace!(?event, "popup");
        }
        self.popup_events.extend(popup_events);

        !events.is_empty() || popup_changed
    }

    fn forget_item(&mut self, item: &ItemRef) {
        if self.popup.owner() == Some(item) {
            self.popup.hide();
        }
        if self.menu.as_ref().is_some_and(|m| m.owner == *item) {
            self.menu = None;
        }
        if self.drag.as_ref() == Some(item) {
            self.drag = None;
        }
    }

    fn relayout(&mut self, now: Instant) {
        let visible: Vec<ItemRef> = self
            .registry
            .ordered()
            .into_iter()
            .filter(|p| !p.in_container())
            .map(|p| p.item_ref())
            .collect();
        let layout = compute_layout(&self.ctx, self.apps.len(), visible.len());

        for (app, rect) in self.apps.iter_mut().zip(&layout.apps) {
            app.set_geometry(*rect, now);
        }
        for (item, rect) in visible.iter().zip(&layout.plugins) {
            if let ItemRef::Plugin { plugin, key } = item {
                if let Some(p) = self.registry.get_mut(plugin, key) {
                    p.set_geometry(*rect, now);
                }
            }
        }
        for p in self.registry.iter_mut().filter(|p| p.in_container()) {
            p.set_geometry(Rect::default(), now);
        }
        self.dock = layout.dock;
    }
}
