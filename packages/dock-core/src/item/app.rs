//! Application launcher item bound to one dock daemon entry.

use super::preview::Preview;
use super::{DockItem, DragOutcome, DropPayload, ItemEnv, ItemRef, PopupRequest, TimerOutcome};
use crate::debounce::{earliest, Debounce};
use crate::queue::TaskQueue;
use crate::services::{EntryAction, EntryInfo, ServiceRequest};
use crate::snapshot::{SnapshotCapture, WindowSystem};
use crate::widget::{Background, ContextMenu, Label, Visual, WidgetHandle};
use crate::window_info::WindowInfoRegistry;
use crate::{window_map, DisplayMode, DockContext, Point, Rect, WindowId, WindowInfo};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Manhattan distance the pointer must travel with the button held to start a drag
pub const DRAG_THRESHOLD: i32 = 20;

/// Delay before confirming that attention really went away
pub const ATTENTION_RECHECK: Duration = Duration::from_secs(1);

/// Quiet period before publishing minimize targets to the window manager
pub const ICON_GEOMETRY_DELAY: Duration = Duration::from_millis(500);

pub const SWING_DURATION: Duration = Duration::from_millis(1200);

const SWING_FRAME_INTERVAL: Duration = Duration::from_millis(20);

/// Rotation in degrees for each frame of the swing effect
const SWING_FRAMES: [f64; 60] = [
    0.0, 0.327013, 0.987033, 1.77584, 2.61157, 3.45043, 4.26461, 5.03411, 5.74306, 6.37782, 6.92583,
    7.37484, 7.71245, 7.92557, 8.0, 7.86164, 7.43184, 6.69344, 5.64142, 4.2916, 2.68986, 0.91694,
    -0.91694, -2.68986, -4.2916, -5.64142, -6.69344, -7.43184, -7.86164, -8.0, -7.86164, -7.43184,
    -6.69344, -5.64142, -4.2916, -2.68986, -0.91694, 0.91694, 2.68986, 4.2916, 5.64142, 6.69344,
    7.43184, 7.86164, 8.0, 7.93082, 7.71592, 7.34672, 6.82071, 6.1458, 5.34493, 4.45847, 3.54153,
    2.65507, 1.8542, 1.17929, 0.653279, 0.28408, 0.0691776, 0.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Pinned, no windows
    Idle,
    Running { active: bool },
    Attention,
}

enum SwingTick {
    Idle,
    Frame,
    Finished,
}

#[derive(Debug, Default)]
struct SwingEffect {
    started: Option<Instant>,
    frame: usize,
}

impl SwingEffect {
    /// Start playing. A running effect is never restarted.
    fn play(&mut self, now: Instant) -> bool {
        if self.started.is_some() {
            return false;
        }
        self.started = Some(now);
        self.frame = 0;
        true
    }

    fn stop(&mut self) {
        self.started = None;
        self.frame = 0;
    }

    fn is_playing(&self) -> bool {
        self.started.is_some()
    }

    fn advance(&mut self, now: Instant) -> SwingTick {
        let Some(start) = self.started else {
            return SwingTick::Idle;
        };
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= SWING_DURATION {
            self.stop();
            return SwingTick::Finished;
        }
        let frame = (elapsed.as_millis() / SWING_FRAME_INTERVAL.as_millis()) as usize;
        if frame == self.frame {
            return SwingTick::Idle;
        }
        self.frame = frame;
        SwingTick::Frame
    }

    fn next_frame(&self) -> Option<Instant> {
        self.started
            .map(|start| start + SWING_FRAME_INTERVAL * (self.frame as u32 + 1))
    }

    fn rotation(&self) -> Option<f64> {
        self.started
            .map(|_| SWING_FRAMES[self.frame.min(SWING_FRAMES.len() - 1)])
    }
}

pub struct AppItem {
    id: String,
    name: String,
    icon: String,
    active: bool,
    current_window: Option<WindowId>,
    menu: Option<ContextMenu>,
    windows: WindowInfoRegistry,
    display_mode: DisplayMode,

    geometry: Rect,
    press_pos: Option<Point>,
    dragging: bool,

    swing: SwingEffect,
    attention_latched: bool,
    attention_check: Debounce,
    icon_geometry: Debounce,

    tips: Rc<RefCell<Label>>,
    preview: Rc<RefCell<Preview>>,
    requests: TaskQueue<ServiceRequest>,
}

impl AppItem {
    pub fn new(entry: EntryInfo, ctx: &DockContext, requests: TaskQueue<ServiceRequest>, now: Instant) -> Self {
        let menu = ContextMenu::parse(&entry.menu);
        let mut item = Self {
            tips: Label::handle(entry.name.clone()),
            preview: Rc::new(RefCell::new(Preview::new(ctx.composite, requests.clone()))),
            id: entry.id,
            name: entry.name,
            icon: entry.icon,
            active: entry.active,
            current_window: entry.current_window,
            menu,
            windows: WindowInfoRegistry::new(),
            display_mode: ctx.display_mode,
            geometry: Rect::default(),
            press_pos: None,
            dragging: false,
            swing: SwingEffect::default(),
            attention_latched: false,
            attention_check: Debounce::new(ATTENTION_RECHECK),
            icon_geometry: Debounce::new(ICON_GEOMETRY_DELAY),
            requests,
        };
        item.set_windows(entry.windows, now);
        item
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> AppState {
        if self.windows.is_empty() {
            AppState::Idle
        } else if self.attention_latched {
            AppState::Attention
        } else {
            AppState::Running { active: self.active }
        }
    }

    pub fn is_swinging(&self) -> bool {
        self.swing.is_playing()
    }

    pub fn windows(&self) -> &WindowInfoRegistry {
        &self.windows
    }

    pub fn preview(&self) -> &Rc<RefCell<Preview>> {
        &self.preview
    }

    // ============================================
    // Entry updates
    // ============================================

    /// Replace the window set.
    pub fn set_windows(&mut self, windows: Vec<WindowInfo>, now: Instant) {
        let change = self.windows.replace(window_map(windows));
        self.preview.borrow_mut().set_window_infos(self.windows.map());
        self.icon_geometry.trigger(now);

        if self.windows.has_attention() {
            self.attention_latched = true;
            self.attention_check.stop();
            if self.display_mode == DisplayMode::Fashion {
                self.swing.play(now);
            }
        } else {
            self.swing.stop();
            if change.attention_cleared() || self.attention_latched {
                self.attention_check.trigger(now);
            }
        }
        self.update_tips();
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn set_icon(&mut self, icon: String) {
        self.icon = icon;
    }

    pub fn set_current_window(&mut self, window: WindowId) {
        self.current_window = Some(window);
        self.update_tips();
    }

    pub fn set_menu(&mut self, menu: &str) {
        self.menu = ContextMenu::parse(menu);
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        self.display_mode = mode;
        if mode != DisplayMode::Fashion && self.attention_latched {
            self.swing.stop();
        }
    }

    pub fn composite_changed(&mut self, composite: bool) {
        self.preview.borrow_mut().composite_changed(composite);
    }

    /// Pointer reached the preview popup.
    pub fn enter_preview(&mut self) {
        self.preview.borrow_mut().cancel_hide();
    }

    /// A capture reported a vanished window: prune and ask the daemon to re-check.
    pub fn recheck_windows(&mut self, ws: &dyn WindowSystem) {
        let gone = self.windows.revalidate(ws);
        if !gone.is_empty() {
            self.preview.borrow_mut().set_window_infos(self.windows.map());
            self.update_tips();
        }
        self.send(EntryAction::Check);
    }

    /// Capture every preview cell whose image was dropped (hover, resize,
    /// compositing toggled). Vanished windows trigger a recheck.
    pub fn refresh_preview(&mut self, ws: &dyn WindowSystem, capture: &SnapshotCapture, scale: f64) {
        if self.windows.is_empty() {
            return;
        }
        let rechecks = {
            let mut preview = self.preview.borrow_mut();
            preview.set_window_infos(self.windows.map());
            preview.update_snapshots(ws, capture, scale)
        };
        if !rechecks.is_empty() {
            self.recheck_windows(ws);
        }
    }

    fn update_tips(&mut self) {
        let title = self
            .current_window
            .and_then(|id| self.windows.get(id))
            .map(|w| w.title.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or(self.name.as_str());
        self.tips.borrow_mut().set_text(title);
    }

    fn send(&self, action: EntryAction) {
        self.requests.push(ServiceRequest::Entry {
            id: self.id.clone(),
            action,
        });
    }

    fn update_icon_geometries(&self, ws: &dyn WindowSystem) {
        if self.geometry.is_empty() {
            return;
        }
        for id in self.windows.ids() {
            if let Err(e) = ws.set_icon_geometry(id, self.geometry) {
                tracing::debug!(window = id, error = %e, "failed to set icon geometry");
            }
        }
    }
}

impl DockItem for AppItem {
    fn item_ref(&self) -> ItemRef {
        ItemRef::App(self.id.clone())
    }

    fn paint(&self, ctx: &DockContext) -> Visual {
        let extent = match (self.geometry.is_empty(), ctx.position.is_horizontal()) {
            (true, _) => ctx.item_base_height(),
            (false, true) => self.geometry.height,
            (false, false) => self.geometry.width,
        };
        let background = match self.state() {
            AppState::Idle => Background::None,
            AppState::Running { active: true } => Background::Active,
            AppState::Running { active: false } => Background::Running,
            AppState::Attention => Background::Attention,
        };
        Visual {
            icon: (!self.dragging).then(|| self.icon.clone()),
            icon_size: Some(ctx.icon_pixels(extent)),
            background,
            rotation: self.swing.rotation(),
            ..Default::default()
        }
    }

    fn popup_content(&mut self, env: &ItemEnv) -> Option<PopupRequest> {
        if self.dragging {
            return None;
        }

        self.preview.borrow_mut().set_orientation(env.ctx.position.is_horizontal());
        self.refresh_preview(env.ws, env.capture, env.ctx.scale);

        if self.windows.is_empty() {
            let tips: WidgetHandle = self.tips.clone();
            return Some(PopupRequest::tips(tips));
        }
        let preview: WidgetHandle = self.preview.clone();
        Some(PopupRequest::applet(preview))
    }

    fn context_menu(&self) -> Option<ContextMenu> {
        self.menu.clone()
    }

    fn invoke_menu_action(&mut self, id: &str, _checked: bool) {
        match self.menu.as_ref().and_then(|m| m.item(id)) {
            Some(item) if item.enabled => self.send(EntryAction::HandleMenuItem { item: id.to_string() }),
            Some(_) => tracing::debug!(entry = %self.id, item = id, "ignoring disabled menu item"),
            None => tracing::debug!(entry = %self.id, item = id, "ignoring unknown menu item"),
        }
    }

    fn activate(&mut self, now: Instant) -> Option<PopupRequest> {
        self.send(EntryAction::Activate);
        if self.windows.is_empty() {
            self.swing.play(now);
        }
        None
    }

    fn middle_click(&mut self) {
        self.send(EntryAction::NewInstance);
    }

    fn wheel(&mut self, _delta: i32) {
        self.send(EntryAction::PresentWindows);
    }

    fn leave(&mut self, now: Instant) {
        self.press_pos = None;
        self.preview.borrow_mut().prepare_hide(now);
    }

    fn press(&mut self, pos: Point) {
        self.press_pos = Some(pos);
    }

    fn drag_motion(&mut self, pos: Point) -> bool {
        match self.press_pos {
            Some(origin) if !self.dragging && (pos - origin).manhattan_length() > DRAG_THRESHOLD => self.start_drag(),
            _ => false,
        }
    }

    fn start_drag(&mut self) -> bool {
        self.press_pos = None;
        self.dragging = true;
        self.icon_geometry.stop();
        true
    }

    fn end_drag(&mut self, outcome: &DragOutcome) {
        self.dragging = false;
        if *outcome == DragOutcome::OutsideDock {
            self.send(EntryAction::RequestUndock);
        }
    }

    fn is_dragging(&self) -> bool {
        self.dragging
    }

    fn accepts_drop(&self, payload: &DropPayload) -> bool {
        matches!(payload, DropPayload::Uris { uris } if !uris.is_empty())
    }

    fn handle_drop(&mut self, payload: DropPayload) {
        if let DropPayload::Uris { uris } = payload {
            if !uris.is_empty() {
                self.send(EntryAction::HandleDragDrop { uris });
            }
        }
    }

    fn geometry(&self) -> Rect {
        self.geometry
    }

    fn set_geometry(&mut self, rect: Rect, now: Instant) {
        if self.geometry != rect {
            self.geometry = rect;
            self.icon_geometry.trigger(now);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.swing.next_frame(),
            self.attention_check.deadline(),
            self.icon_geometry.deadline(),
            self.preview.borrow().hide_deadline(),
        ])
    }

    fn on_timer(&mut self, now: Instant, env: &ItemEnv) -> TimerOutcome {
        let mut out = TimerOutcome::default();

        match self.swing.advance(now) {
            SwingTick::Idle => {}
            SwingTick::Frame => out.repaint = true,
            SwingTick::Finished => {
                out.repaint = true;
                self.attention_check.trigger(now);
            }
        }

        if self.attention_check.fire(now) {
            if self.windows.has_attention() {
                if self.display_mode == DisplayMode::Fashion {
                    self.swing.play(now);
                }
            } else if self.attention_latched {
                self.attention_latched = false;
                tracing::debug!(entry = %self.id, "attention cleared");
            }
            out.repaint = true;
        }

        if self.icon_geometry.fire(now) {
            self.update_icon_geometries(env.ws);
        }

        if self.preview.borrow_mut().fire_hide(now) {
            out.cancel_popup = true;
        }

        out
    }
}
