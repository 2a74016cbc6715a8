//! Compositing-aware window snapshots.
//!
//! With a compositor running, window contents live in off-screen buffers and
//! can be read back at any time; without one the preview shows titles only.

use crate::widget::{Background, Visual};
use crate::{Rect, Size, WindowId, WindowInfo};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use thiserror::Error;

/// Default thumbnail size of one window in the preview
pub const SNAP_WIDTH: u32 = 200;
pub const SNAP_HEIGHT: u32 = 130;

/// Inner margin between the thumbnail cell and the image
pub const SNAP_MARGIN: u32 = 8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowSystemError {
    #[error("window {0:#x} no longer exists")]
    WindowGone(WindowId),
    #[error("window {0:#x} has zero size")]
    ZeroSize(WindowId),
    #[error("window system request failed: {0}")]
    Request(String),
}

/// `_GTK_FRAME_EXTENTS`: transparent shadow border drawn by client-side decorations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameExtents {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl FrameExtents {
    /// Whether cropping these extents leaves a non-empty image.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        let fits = |a: u32, b: u32, limit: u32| a.checked_add(b).is_some_and(|sum| sum < limit);
        fits(self.left, self.right, width) && fits(self.top, self.bottom, height)
    }
}

/// Window-manager level queries and requests the dock relies on.
pub trait WindowSystem {
    /// Whether a compositing manager currently owns the screen.
    fn has_composite(&self) -> bool;

    fn window_geometry(&self, window: WindowId) -> Result<Rect, WindowSystemError>;

    /// Read back the window contents at its full size.
    fn grab_pixels(&self, window: WindowId, size: Size) -> Result<RgbaImage, WindowSystemError>;

    /// Client-side decoration shadow, if the window publishes one.
    fn frame_extents(&self, window: WindowId) -> Option<FrameExtents>;

    /// Ask the window manager to close the window politely (`_NET_CLOSE_WINDOW`).
    fn close_window(&self, window: WindowId) -> Result<(), WindowSystemError>;

    /// Tell the window manager where the window minimizes to (`_NET_WM_ICON_GEOMETRY`).
    fn set_icon_geometry(&self, window: WindowId, rect: Rect) -> Result<(), WindowSystemError>;
}

/// Window system used when no display connection is available.
#[derive(Debug, Default)]
pub struct HeadlessWindowSystem;

impl WindowSystem for HeadlessWindowSystem {
    fn has_composite(&self) -> bool {
        false
    }

    fn window_geometry(&self, window: WindowId) -> Result<Rect, WindowSystemError> {
        Err(WindowSystemError::Request(format!(
            "no display to query window {:#x}",
            window
        )))
    }

    fn grab_pixels(&self, window: WindowId, _size: Size) -> Result<RgbaImage, WindowSystemError> {
        Err(WindowSystemError::Request(format!(
            "no display to grab window {:#x}",
            window
        )))
    }

    fn frame_extents(&self, _window: WindowId) -> Option<FrameExtents> {
        None
    }

    fn close_window(&self, window: WindowId) -> Result<(), WindowSystemError> {
        Err(WindowSystemError::Request(format!(
            "no display to close window {:#x}",
            window
        )))
    }

    fn set_icon_geometry(&self, _window: WindowId, _rect: Rect) -> Result<(), WindowSystemError> {
        Ok(())
    }
}

/// Captured, cropped and scaled window image
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    pub image: RgbaImage,
    /// Device pixel ratio the image was scaled for
    pub scale: f64,
}

impl SnapshotBuffer {
    /// Size in logical pixels
    pub fn logical_size(&self) -> Size {
        Size::new(
            (self.image.width() as f64 / self.scale).round() as u32,
            (self.image.height() as f64 / self.scale).round() as u32,
        )
    }
}

#[derive(Debug)]
pub enum CaptureOutcome {
    Captured(SnapshotBuffer),
    /// Compositing is off; show the title instead
    NoComposite,
    /// The grab failed; the owner should re-validate that the window still exists
    Recheck(WindowId),
}

#[derive(Debug, Clone)]
pub struct SnapshotCapture {
    /// Thumbnail cell size in logical pixels
    pub cell: Size,
    pub margin: u32,
}

impl Default for SnapshotCapture {
    fn default() -> Self {
        Self {
            cell: Size::new(SNAP_WIDTH, SNAP_HEIGHT),
            margin: SNAP_MARGIN,
        }
    }
}

impl SnapshotCapture {
    /// Largest image that fits the cell, in device pixels.
    pub fn target_size(&self, cell: Size, scale: f64) -> Size {
        let w = cell.width.saturating_sub(self.margin * 2) as f64 * scale;
        let h = cell.height.saturating_sub(self.margin * 2) as f64 * scale;
        Size::new(w as u32, h as u32)
    }

    pub fn fetch(&self, ws: &dyn WindowSystem, window: WindowId, cell: Size, scale: f64) -> CaptureOutcome {
        if !ws.has_composite() {
            return CaptureOutcome::NoComposite;
        }

        let geometry = match ws.window_geometry(window) {
            Ok(g) if !g.is_empty() => g,
            Ok(_) => {
                tracing::debug!(window, "zero-sized window, requesting recheck");
                return CaptureOutcome::Recheck(window);
            }
            Err(e) => {
                tracing::debug!(window, error = %e, "geometry query failed");
                return CaptureOutcome::Recheck(window);
            }
        };

        let raw = match ws.grab_pixels(window, geometry.size()) {
            Ok(img) if img.width() > 0 && img.height() > 0 => img,
            Ok(_) => return CaptureOutcome::Recheck(window),
            Err(e) => {
                tracing::debug!(window, error = %e, "pixel grab failed");
                return CaptureOutcome::Recheck(window);
            }
        };

        let cropped = match ws.frame_extents(window) {
            Some(ext) if ext.fits(raw.width(), raw.height()) => imageops::crop_imm(
                &raw,
                ext.left,
                ext.top,
                raw.width() - ext.left - ext.right,
                raw.height() - ext.top - ext.bottom,
            )
            .to_image(),
            _ => raw,
        };

        let target = self.target_size(cell, scale);
        if target.is_empty() {
            return CaptureOutcome::Recheck(window);
        }
        let (w, h) = fit_preserving_aspect(cropped.width(), cropped.height(), target);
        let image = imageops::resize(&cropped, w, h, FilterType::Triangle);

        CaptureOutcome::Captured(SnapshotBuffer { image, scale })
    }
}

/// Scale (width, height) to the largest size inside `bounds` with the same aspect ratio.
pub fn fit_preserving_aspect(width: u32, height: u32, bounds: Size) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (0, 0);
    }
    let factor = (bounds.width as f64 / width as f64).min(bounds.height as f64 / height as f64);
    let w = ((width as f64 * factor).round() as u32).clamp(1, bounds.width.max(1));
    let h = ((height as f64 * factor).round() as u32).clamp(1, bounds.height.max(1));
    (w, h)
}

/// One window's cell in an application preview.
#[derive(Debug)]
pub struct WindowSnapshot {
    info: WindowInfo,
    cell: Size,
    composite: bool,
    buffer: Option<SnapshotBuffer>,
    hovered: bool,
}

impl WindowSnapshot {
    pub fn new(info: WindowInfo, composite: bool) -> Self {
        Self {
            info,
            cell: Size::new(SNAP_WIDTH, SNAP_HEIGHT),
            composite,
            buffer: None,
            hovered: false,
        }
    }

    pub fn window(&self) -> WindowId {
        self.info.id
    }

    pub fn set_window_info(&mut self, info: WindowInfo) {
        self.info = info;
    }

    pub fn buffer(&self) -> Option<&SnapshotBuffer> {
        self.buffer.as_ref()
    }

    pub fn resize(&mut self, cell: Size) {
        if self.cell != cell {
            self.cell = cell;
            self.buffer = None;
        }
    }

    pub fn composite_changed(&mut self, composite: bool) {
        self.composite = composite;
        self.buffer = None;
    }

    /// Pointer entered the cell. Drops the image so the next refresh
    /// captures current contents. Returns true when the window should be
    /// previewed on screen (compositing only).
    pub fn enter(&mut self) -> bool {
        self.hovered = true;
        if self.composite {
            self.buffer = None;
        }
        self.composite
    }

    pub fn leave(&mut self) {
        self.hovered = false;
    }

    pub fn needs_fetch(&self) -> bool {
        self.composite && self.buffer.is_none()
    }

    /// Capture if needed. Returns the window id when the capture asks for a recheck.
    pub fn refresh(&mut self, ws: &dyn WindowSystem, capture: &SnapshotCapture, scale: f64) -> Option<WindowId> {
        if !self.needs_fetch() {
            return None;
        }
        match capture.fetch(ws, self.info.id, self.cell, scale) {
            CaptureOutcome::Captured(buffer) => {
                self.buffer = Some(buffer);
                None
            }
            CaptureOutcome::NoComposite => {
                self.composite = false;
                None
            }
            CaptureOutcome::Recheck(id) => Some(id),
        }
    }

    pub fn close(&self, ws: &dyn WindowSystem) {
        if let Err(e) = ws.close_window(self.info.id) {
            tracing::warn!(window = self.info.id, error = %e, "failed to close window");
        }
    }

    pub fn visual(&self) -> Visual {
        let background = if self.info.attention {
            Background::Attention
        } else if self.hovered {
            Background::Active
        } else {
            Background::None
        };
        match (&self.buffer, self.composite) {
            (Some(buffer), true) => Visual {
                thumbnail: Some(buffer.logical_size()),
                background,
                ..Default::default()
            },
            _ => Visual {
                text: Some(self.info.title.clone()),
                background,
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use image::Rgba;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory window system for tests
    #[derive(Default)]
    pub struct FakeWindowSystem {
        pub composite: bool,
        pub windows: RefCell<HashMap<WindowId, Rect>>,
        pub extents: HashMap<WindowId, FrameExtents>,
        pub closed: RefCell<Vec<WindowId>>,
        pub icon_geometries: RefCell<Vec<(WindowId, Rect)>>,
    }

    impl FakeWindowSystem {
        pub fn composited() -> Self {
            Self {
                composite: true,
                ..Default::default()
            }
        }

        pub fn add_window(&self, id: WindowId, width: u32, height: u32) {
            self.windows.borrow_mut().insert(id, Rect::new(0, 0, width, height));
        }

        pub fn destroy_window(&self, id: WindowId) {
            self.windows.borrow_mut().remove(&id);
        }
    }

    impl WindowSystem for FakeWindowSystem {
        fn has_composite(&self) -> bool {
            self.composite
        }

        fn window_geometry(&self, window: WindowId) -> Result<Rect, WindowSystemError> {
            self.windows
                .borrow()
                .get(&window)
                .copied()
                .ok_or(WindowSystemError::WindowGone(window))
        }

        fn grab_pixels(&self, window: WindowId, size: Size) -> Result<RgbaImage, WindowSystemError> {
            if !self.windows.borrow().contains_key(&window) {
                return Err(WindowSystemError::WindowGone(window));
            }
            Ok(RgbaImage::from_pixel(size.width, size.height, Rgba([10, 20, 30, 255])))
        }

        fn frame_extents(&self, window: WindowId) -> Option<FrameExtents> {
            self.extents.get(&window).copied()
        }

        fn close_window(&self, window: WindowId) -> Result<(), WindowSystemError> {
            self.closed.borrow_mut().push(window);
            Ok(())
        }

        fn set_icon_geometry(&self, window: WindowId, rect: Rect) -> Result<(), WindowSystemError> {
            self.icon_geometries.borrow_mut().push((window, rect));
            Ok(())
        }
    }
}
