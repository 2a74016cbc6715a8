//! Per-application window preview shown as the hover popup of an [`AppItem`](super::AppItem).

use crate::debounce::Debounce;
use crate::queue::TaskQueue;
use crate::services::ServiceRequest;
use crate::snapshot::{SnapshotCapture, WindowSnapshot, WindowSystem, SNAP_HEIGHT, SNAP_WIDTH};
use crate::widget::{next_widget_id, Visual, Widget, WidgetId};
use crate::{DockContext, Size, WindowId, WindowInfoMap};
use std::time::{Duration, Instant};

/// Delay between leaving the item and hiding its preview
pub const PREVIEW_HIDE_DELAY: Duration = Duration::from_millis(300);

const CELL_SPACING: u32 = 4;
const TITLE_ROW_HEIGHT: u32 = 30;

pub struct Preview {
    id: WidgetId,
    snapshots: Vec<WindowSnapshot>,
    composite: bool,
    horizontal: bool,
    shown: bool,
    previewing: Option<WindowId>,
    hide: Debounce,
    requests: TaskQueue<ServiceRequest>,
}

impl Preview {
    pub fn new(composite: bool, requests: TaskQueue<ServiceRequest>) -> Self {
        Self {
            id: next_widget_id(),
            snapshots: Vec::new(),
            composite,
            horizontal: true,
            shown: false,
            previewing: None,
            hide: Debounce::new(PREVIEW_HIDE_DELAY),
            requests,
        }
    }

    pub fn windows(&self) -> Vec<WindowId> {
        self.snapshots.iter().map(|s| s.window()).collect()
    }

    pub fn snapshot(&self, window: WindowId) -> Option<&WindowSnapshot> {
        self.snapshots.iter().find(|s| s.window() == window)
    }

    /// Sync cells with the item's window set. Existing cells keep their
    /// captured image.
    pub fn set_window_infos(&mut self, windows: &WindowInfoMap) {
        self.snapshots.retain(|s| windows.contains_key(&s.window()));
        for (id, info) in windows {
            match self.snapshots.iter_mut().find(|s| s.window() == *id) {
                Some(snap) => snap.set_window_info(info.clone()),
                None => self.snapshots.push(WindowSnapshot::new(info.clone(), self.composite)),
            }
        }
        self.snapshots.sort_by_key(|s| s.window());
        if let Some(id) = self.previewing {
            if !windows.contains_key(&id) {
                self.stop_previewing();
            }
        }
    }

    pub fn composite_changed(&mut self, composite: bool) {
        self.composite = composite;
        for snap in &mut self.snapshots {
            snap.composite_changed(composite);
        }
    }

    pub fn set_orientation(&mut self, horizontal: bool) {
        self.horizontal = horizontal;
    }

    /// Capture every cell that lacks an image. Returns windows whose
    /// capture asked for a recheck.
    pub fn update_snapshots(&mut self, ws: &dyn WindowSystem, capture: &SnapshotCapture, scale: f64) -> Vec<WindowId> {
        let cell = capture.cell;
        self.snapshots
            .iter_mut()
            .filter_map(|snap| {
                snap.resize(cell);
                snap.refresh(ws, capture, scale)
            })
            .collect()
    }

    /// Pointer moved onto a window cell.
    pub fn enter_window(&mut self, window: WindowId) {
        self.hide.stop();
        let mut preview = false;
        for snap in &mut self.snapshots {
            if snap.window() == window {
                preview = snap.enter();
            } else {
                snap.leave();
            }
        }
        if preview && self.previewing != Some(window) {
            self.previewing = Some(window);
            self.requests.push(ServiceRequest::PreviewWindow { window });
        }
    }

    pub fn activate_window(&mut self, window: WindowId) {
        if self.snapshot(window).is_none() {
            tracing::debug!(window, "activate for unknown preview cell");
            return;
        }
        self.previewing = None;
        self.requests.push(ServiceRequest::ActivateWindow { window });
    }

    pub fn close_window(&mut self, window: WindowId, ws: &dyn WindowSystem) {
        if let Some(snap) = self.snapshot(window) {
            snap.close(ws);
        }
    }

    /// Pointer left the owning item; hide unless it reaches the preview in time.
    pub fn prepare_hide(&mut self, now: Instant) {
        if self.shown {
            self.hide.trigger(now);
        }
    }

    /// Pointer reached the preview.
    pub fn cancel_hide(&mut self) {
        self.hide.stop();
    }

    pub fn hide_deadline(&self) -> Option<Instant> {
        self.hide.deadline()
    }

    /// True when the hide delay ran out.
    pub fn fire_hide(&mut self, now: Instant) -> bool {
        self.hide.fire(now) && self.shown
    }

    fn stop_previewing(&mut self) {
        if self.previewing.take().is_some() {
            self.requests.push(ServiceRequest::CancelPreview);
        }
    }
}

impl Widget for Preview {
    fn id(&self) -> WidgetId {
        self.id
    }

    fn size_hint(&self) -> Size {
        let n = self.snapshots.len().max(1) as u32;
        if !self.composite {
            return Size::new(SNAP_WIDTH, TITLE_ROW_HEIGHT * n);
        }
        let spacing = CELL_SPACING * (n - 1);
        if self.horizontal {
            Size::new(SNAP_WIDTH * n + spacing, SNAP_HEIGHT)
        } else {
            Size::new(SNAP_WIDTH, SNAP_HEIGHT * n + spacing)
        }
    }

    fn visual(&self, _ctx: &DockContext) -> Visual {
        Visual {
            children: self.snapshots.iter().map(|s| s.visual()).collect(),
            ..Default::default()
        }
    }

    fn about_to_show(&mut self) {
        self.shown = true;
    }

    fn about_to_hide(&mut self) {
        self.shown = false;
        self.hide.stop();
        for snap in &mut self.snapshots {
            snap.leave();
        }
        self.stop_previewing();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fake::FakeWindowSystem;
    use crate::{window_map, WindowInfo};

    fn windows(ids: &[WindowId]) -> WindowInfoMap {
        window_map(
            ids.iter()
                .map(|&id| WindowInfo {
                    id,
                    title: format!("w{}", id),
                    ..Default::default()
                })
                .collect(),
        )
    }

    #[test]
    fn test_cells_follow_window_set() {
        let mut preview = Preview::new(true, TaskQueue::new());
        preview.set_window_infos(&windows(&[3, 1]));
        assert_eq!(preview.windows(), vec![1, 3]);

        preview.set_window_infos(&windows(&[3, 4]));
        assert_eq!(preview.windows(), vec![3, 4]);
        assert_eq!(preview.size_hint(), Size::new(SNAP_WIDTH * 2 + CELL_SPACING, SNAP_HEIGHT));
    }

    #[test]
    fn test_hover_requests_single_window_preview() {
        let requests = TaskQueue::new();
        let mut preview = Preview::new(true, requests.clone());
        preview.set_window_infos(&windows(&[1, 2]));
        preview.about_to_show();

        preview.enter_window(1);
        preview.enter_window(1);
        preview.enter_window(2);
        preview.about_to_hide();

        assert_eq!(
            requests.drain(),
            vec![
                ServiceRequest::PreviewWindow { window: 1 },
                ServiceRequest::PreviewWindow { window: 2 },
                ServiceRequest::CancelPreview,
            ]
        );
    }

    #[test]
    fn test_no_window_preview_without_composite() {
        let requests = TaskQueue::new();
        let mut preview = Preview::new(false, requests.clone());
        preview.set_window_infos(&windows(&[1]));
        preview.enter_window(1);
        assert!(requests.is_empty());
        assert_eq!(preview.visual(&DockContext::default()).children[0].text.as_deref(), Some("w1"));
    }

    #[test]
    fn test_hide_delay_is_cancelled_by_entering() {
        let t0 = Instant::now();
        let mut preview = Preview::new(true, TaskQueue::new());
        preview.set_window_infos(&windows(&[1]));
        preview.about_to_show();

        preview.prepare_hide(t0);
        preview.enter_window(1);
        assert!(!preview.fire_hide(t0 + PREVIEW_HIDE_DELAY));

        preview.prepare_hide(t0);
        assert!(!preview.fire_hide(t0 + Duration::from_millis(100)));
        assert!(preview.fire_hide(t0 + PREVIEW_HIDE_DELAY));
    }

    #[test]
    fn test_update_snapshots_reports_vanished_windows() {
        let ws = FakeWindowSystem::composited();
        ws.add_window(1, 640, 480);
        let mut preview = Preview::new(true, TaskQueue::new());
        preview.set_window_infos(&windows(&[1, 2]));

        let rechecks = preview.update_snapshots(&ws, &SnapshotCapture::default(), 1.0);
        assert_eq!(rechecks, vec![2]);
        assert!(preview.snapshot(1).unwrap().buffer().is_some());
    }

    #[test]
    fn test_close_and_activate() {
        let ws = FakeWindowSystem::composited();
        let requests = TaskQueue::new();
        let mut preview = Preview::new(true, requests.clone());
        preview.set_window_infos(&windows(&[9]));

        preview.close_window(9, &ws);
        preview.close_window(10, &ws);
        preview.activate_window(9);
        preview.activate_window(10);

        assert_eq!(*ws.closed.borrow(), vec![9]);
        assert_eq!(requests.drain(), vec![ServiceRequest::ActivateWindow { window: 9 }]);
    }
}
