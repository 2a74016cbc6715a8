//! Dock-wide presentation state passed explicitly to items and plugins.

use crate::{DisplayMode, DockPosition, Rect, Size};
use serde::Serialize;

/// Default icon base size in logical pixels
pub const DEFAULT_ICON_SIZE: u32 = 48;

/// Everything an item needs to know about the dock it is placed in.
///
/// Owned by the [`Panel`](crate::Panel) and handed by reference to item
/// constructors, paint calls and plugin hooks.
#[derive(Debug, Clone, Serialize)]
pub struct DockContext {
    pub display_mode: DisplayMode,
    pub position: DockPosition,
    /// Icon base size in logical pixels
    pub icon_size: u32,
    /// Device pixel ratio of the screen the dock lives on
    pub scale: f64,
    /// Geometry of the screen the dock lives on
    pub screen: Rect,
    /// Whether a compositing manager is running
    pub composite: bool,
}

impl Default for DockContext {
    fn default() -> Self {
        Self {
            display_mode: DisplayMode::Fashion,
            position: DockPosition::Bottom,
            icon_size: DEFAULT_ICON_SIZE,
            scale: 1.0,
            screen: Rect::new(0, 0, 1920, 1080),
            composite: false,
        }
    }
}

impl DockContext {
    /// Extent of an application item along the dock's thickness axis.
    pub fn item_base_height(&self) -> u32 {
        match self.display_mode {
            DisplayMode::Efficient => (self.icon_size as f64 * 1.2) as u32,
            DisplayMode::Fashion => (self.icon_size as f64 * 1.5) as u32,
        }
    }

    /// Extent of an application item along the dock's main axis.
    pub fn item_base_width(&self) -> u32 {
        let height = self.item_base_height() as f64;
        match self.display_mode {
            DisplayMode::Fashion => (height * 1.1) as u32,
            DisplayMode::Efficient => (height * 1.4) as u32,
        }
    }

    /// Size of an application item, oriented for the current dock position.
    pub fn app_item_size(&self) -> Size {
        let (main, cross) = (self.item_base_width(), self.item_base_height());
        if self.position.is_horizontal() {
            Size::new(main, cross)
        } else {
            Size::new(cross, main)
        }
    }

    /// Size of a plugin item: square, as thick as the dock.
    pub fn plugin_item_size(&self) -> Size {
        let side = self.item_base_height();
        Size::new(side, side)
    }

    /// Thickness of the dock strip.
    pub fn dock_thickness(&self) -> u32 {
        self.item_base_height()
    }

    /// Edge length of a theme icon drawn inside an item of `extent`.
    pub fn icon_pixels(&self, extent: u32) -> u32 {
        match self.display_mode {
            DisplayMode::Efficient => (extent as f64 * 0.7) as u32,
            DisplayMode::Fashion => (extent as f64 * 0.8) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_sizes_follow_display_mode() {
        let mut ctx = DockContext {
            icon_size: 40,
            ..Default::default()
        };
        assert_eq!(ctx.item_base_height(), 60);
        assert_eq!(ctx.item_base_width(), 66);

        ctx.display_mode = DisplayMode::Efficient;
        assert_eq!(ctx.item_base_height(), 48);
        assert_eq!(ctx.item_base_width(), 67);
    }

    #[test]
    fn test_vertical_dock_swaps_axes() {
        let ctx = DockContext {
            icon_size: 40,
            position: DockPosition::Left,
            ..Default::default()
        };
        assert_eq!(ctx.app_item_size(), Size::new(60, 66));
    }
}
