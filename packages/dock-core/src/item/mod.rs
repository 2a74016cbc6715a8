//! Dock items: the common contract and its three variants.

pub mod app;
pub mod plugin;
pub mod preview;
pub mod wired;

use crate::plugin::PluginId;
use crate::snapshot::{SnapshotCapture, WindowSystem};
use crate::widget::{ContextMenu, Visual, WidgetHandle};
use crate::{DockContext, Point, Rect};
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub use app::AppItem;
pub use plugin::PluginItem;
pub use preview::Preview;
pub use wired::WiredItem;

/// Stable identity of an item inside the panel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ItemRef {
    /// Application entry, keyed by its bus object path
    App(String),
    Plugin { plugin: PluginId, key: String },
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemRef::App(id) => write!(f, "app:{}", id),
            ItemRef::Plugin { plugin, key } => write!(f, "{}:{}", plugin, key),
        }
    }
}

/// Content an item wants shown in the shared popup
pub struct PopupRequest {
    pub widget: WidgetHandle,
    pub modal: bool,
}

impl PopupRequest {
    pub fn tips(widget: WidgetHandle) -> Self {
        Self { widget, modal: false }
    }

    pub fn applet(widget: WidgetHandle) -> Self {
        Self { widget, modal: true }
    }
}

/// What is being dragged onto an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum DropPayload {
    /// URI list from another application
    Uris { uris: Vec<String> },
    /// Another item of this panel being rearranged
    Item { source: ItemRef },
    /// Desktop file dragged in to be pinned; handled by the panel, not by items
    RequestDock { uri: String },
}

/// How a drag started on an item ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DragOutcome {
    /// Released outside the dock
    OutsideDock,
    /// Released over an item (possibly the dragged one)
    DroppedOn(ItemRef),
    Cancelled,
}

/// Collaborators lent to items during timer and popup hooks
pub struct ItemEnv<'a> {
    pub ctx: &'a DockContext,
    pub ws: &'a dyn WindowSystem,
    pub capture: &'a SnapshotCapture,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimerOutcome {
    /// The item's visual changed
    pub repaint: bool,
    /// The item's popup should go away
    pub cancel_popup: bool,
}

impl TimerOutcome {
    pub fn merge(&mut self, other: TimerOutcome) {
        self.repaint |= other.repaint;
        self.cancel_popup |= other.cancel_popup;
    }
}

/// Common contract of every element placed in the dock.
pub trait DockItem {
    fn item_ref(&self) -> ItemRef;

    fn paint(&self, ctx: &DockContext) -> Visual;

    /// Hover content. `None` means nothing to show right now.
    fn popup_content(&mut self, env: &ItemEnv) -> Option<PopupRequest>;

    fn context_menu(&self) -> Option<ContextMenu> {
        None
    }

    fn invoke_menu_action(&mut self, _id: &str, _checked: bool) {}

    /// Primary click. May return content to show modally.
    fn activate(&mut self, _now: Instant) -> Option<PopupRequest> {
        None
    }

    fn middle_click(&mut self) {}

    fn wheel(&mut self, _delta: i32) {}

    /// Pointer left the item.
    fn leave(&mut self, _now: Instant) {}

    /// Button pressed at `pos` (screen coordinates).
    fn press(&mut self, _pos: Point) {}

    /// Pointer moved with the button held. Returns true once a drag starts.
    fn drag_motion(&mut self, _pos: Point) -> bool {
        false
    }

    /// Whether the item can be dragged at all.
    fn start_drag(&mut self) -> bool {
        false
    }

    fn end_drag(&mut self, _outcome: &DragOutcome) {}

    fn is_dragging(&self) -> bool {
        false
    }

    fn accepts_drop(&self, _payload: &DropPayload) -> bool {
        false
    }

    fn handle_drop(&mut self, _payload: DropPayload) {}

    fn geometry(&self) -> Rect;

    fn set_geometry(&mut self, rect: Rect, now: Instant);

    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    fn on_timer(&mut self, _now: Instant, _env: &ItemEnv) -> TimerOutcome {
        TimerOutcome::default()
    }
}
