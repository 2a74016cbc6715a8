//! Toolkit-neutral widget adapter, paint result and context menu model.

use crate::{DockContext, Size};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique widget identity
pub type WidgetId = u64;

static NEXT_WIDGET_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_widget_id() -> WidgetId {
    NEXT_WIDGET_ID.fetch_add(1, Ordering::Relaxed)
}

/// A UI object owned by an item or plugin.
///
/// The popup surface only ever borrows widgets (through [`WeakWidget`]) and
/// calls the show/hide notifications around its own visibility changes.
pub trait Widget {
    fn id(&self) -> WidgetId;

    fn size_hint(&self) -> Size {
        Size::new(120, 32)
    }

    fn visual(&self, ctx: &DockContext) -> Visual;

    fn about_to_show(&mut self) {}

    fn about_to_hide(&mut self) {}
}

pub type WidgetHandle = Rc<RefCell<dyn Widget>>;
pub type WeakWidget = Weak<RefCell<dyn Widget>>;

pub fn widget_id(handle: &WidgetHandle) -> WidgetId {
    handle.borrow().id()
}

/// Background treatment of an item
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Background {
    #[default]
    None,
    /// At least one window open
    Running,
    /// Focused application
    Active,
    /// A window demands attention
    Attention,
}

/// What a renderer needs to draw one widget or item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Visual {
    /// Theme icon name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Icon edge length in device pixels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub background: Background,
    /// Logical size of a captured window image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Size>,
    /// Swing effect rotation in degrees, present while the effect plays
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    /// Child visuals (preview thumbnails, tray applet entries)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<Visual>,
}

impl Visual {
    pub fn icon(name: impl Into<String>, size: u32) -> Self {
        Self {
            icon: Some(name.into()),
            icon_size: Some(size),
            ..Default::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Plain text widget used for hover tips.
pub struct Label {
    id: WidgetId,
    text: String,
}

impl Label {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: next_widget_id(),
            text: text.into(),
        }
    }

    pub fn handle(text: impl Into<String>) -> Rc<RefCell<Label>> {
        Rc::new(RefCell::new(Self::new(text)))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

impl Widget for Label {
    fn id(&self) -> WidgetId {
        self.id
    }

    fn size_hint(&self) -> Size {
        // rough metrics, the renderer lays text out itself
        Size::new(self.text.chars().count() as u32 * 8 + 6, 24)
    }

    fn visual(&self, _ctx: &DockContext) -> Visual {
        Visual::text(self.text.clone())
    }
}

// ============================================
// Context menu
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MenuItem {
    #[serde(rename = "itemId")]
    pub id: String,
    #[serde(rename = "itemText")]
    pub text: String,
    #[serde(rename = "isActive", default = "default_true")]
    pub enabled: bool,
    #[serde(rename = "isCheckable", default)]
    pub checkable: bool,
    #[serde(default)]
    pub checked: bool,
}

fn default_true() -> bool {
    true
}

impl MenuItem {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            enabled: true,
            checkable: false,
            checked: false,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Structured context menu, in the JSON shape dock entries and plugins exchange.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContextMenu {
    #[serde(rename = "checkableMenu", default)]
    pub checkable: bool,
    #[serde(rename = "singleCheck", default)]
    pub single_check: bool,
    #[serde(default)]
    pub items: Vec<MenuItem>,
}

impl ContextMenu {
    pub fn new(items: Vec<MenuItem>) -> Self {
        Self {
            items,
            ..Default::default()
        }
    }

    /// Parse a menu description. Empty or malformed input means "no menu".
    pub fn parse(json: &str) -> Option<Self> {
        if json.trim().is_empty() {
            return None;
        }
        match serde_json::from_str::<ContextMenu>(json) {
            Ok(menu) if !menu.items.is_empty() => Some(menu),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed context menu");
                None
            }
        }
    }

    pub fn item(&self, id: &str) -> Option<&MenuItem> {
        self.items.iter().find(|i| i.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_menu() {
        let menu = ContextMenu::parse(
            r#"{"checkableMenu":false,"singleCheck":false,"items":[
                {"itemId":"0","itemText":"Open","isActive":true},
                {"itemId":"1","itemText":"Undock","isActive":false}
            ]}"#,
        )
        .unwrap();
        assert_eq!(menu.items.len(), 2);
        assert_eq!(menu.item("0").unwrap().text, "Open");
        assert!(!menu.item("1").unwrap().enabled);
    }

    #[test]
    fn test_malformed_menu_is_none() {
        assert!(ContextMenu::parse("").is_none());
        assert!(ContextMenu::parse("{not json").is_none());
        assert!(ContextMenu::parse(r#"{"items":[]}"#).is_none());
    }

    #[test]
    fn test_widget_ids_are_unique() {
        let a = Label::new("a");
        let b = Label::new("b");
        assert_ne!(a.id(), b.id());
    }
}
