pub mod bridge;
pub mod context;
pub mod debounce;
pub mod item;
pub mod panel;
pub mod plugin;
pub mod popup;
pub mod queue;
pub mod registry;
pub mod services;
pub mod settings;
pub mod snapshot;
pub mod widget;
pub mod window_info;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use context::DockContext;
pub use debounce::Debounce;
pub use panel::{Panel, PanelState};
pub use popup::PopupSurface;
pub use queue::TaskQueue;
pub use registry::ItemRegistry;
pub use services::{ServiceRequest, SystemEvent};

/// X11 window id
pub type WindowId = u32;

// ============================================
// Geometry
// ============================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_length(&self) -> i32 {
        self.x.abs() + self.y.abs()
    }
}

impl std::ops::Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_size(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, size.width, size.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn center(&self) -> Point {
        Point::new(
            self.x + self.width as i32 / 2,
            self.y + self.height as i32 / 2,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Half-open containment: the right and bottom edges are outside.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.right() && p.y >= self.y && p.y < self.bottom()
    }

    /// Move the rect so it lies inside `bounds` where possible.
    /// A rect larger than `bounds` is pinned to the top-left of `bounds`.
    pub fn clamped_to(&self, bounds: &Rect) -> Rect {
        let max_x = bounds.right() - self.width as i32;
        let max_y = bounds.bottom() - self.height as i32;
        Rect {
            x: self.x.min(max_x).max(bounds.x),
            y: self.y.min(max_y).max(bounds.y),
            width: self.width,
            height: self.height,
        }
    }
}

// ============================================
// Dock-wide enums
// ============================================

/// How the dock lays out and paints its items
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    /// Centered, large icons, floating look
    #[default]
    Fashion,
    /// Edge-to-edge compact bar
    Efficient,
}

/// Screen edge the dock is attached to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DockPosition {
    Top,
    #[default]
    Bottom,
    Left,
    Right,
}

impl DockPosition {
    pub fn is_horizontal(&self) -> bool {
        matches!(self, DockPosition::Top | DockPosition::Bottom)
    }
}

// ============================================
// Window metadata
// ============================================

/// Metadata for a single running window, as reported by the dock daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WindowInfo {
    pub id: WindowId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub attention: bool,
    #[serde(default)]
    pub geometry: Rect,
}

/// Window set of one application entry, keyed (and therefore deduplicated) by id
pub type WindowInfoMap = BTreeMap<WindowId, WindowInfo>;

/// Build a window map from a reported list. Later duplicates replace earlier ones.
pub fn window_map(windows: Vec<WindowInfo>) -> WindowInfoMap {
    windows.into_iter().map(|w| (w.id, w)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_contains_is_half_open() {
        let r = Rect::new(10, 10, 20, 20);
        assert!(r.contains(Point::new(10, 10)));
        assert!(r.contains(Point::new(29, 29)));
        assert!(!r.contains(Point::new(30, 10)));
        assert!(!r.contains(Point::new(9, 15)));
    }

    #[test]
    fn test_rect_clamped_to_screen() {
        let screen = Rect::new(0, 0, 1920, 1080);

        let r = Rect::new(1900, -20, 100, 50).clamped_to(&screen);
        assert_eq!(r, Rect::new(1820, 0, 100, 50));

        let inside = Rect::new(100, 100, 10, 10);
        assert_eq!(inside.clamped_to(&screen), inside);

        let huge = Rect::new(50, 50, 4000, 10).clamped_to(&screen);
        assert_eq!(huge.x, 0);
    }

    #[test]
    fn test_window_map_deduplicates_ids() {
        let map = window_map(vec![
            WindowInfo {
                id: 1,
                title: "old".into(),
                ..Default::default()
            },
            WindowInfo {
                id: 2,
                ..Default::default()
            },
            WindowInfo {
                id: 1,
                title: "new".into(),
                ..Default::default()
            },
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&1].title, "new");
    }
}
