//! The single transient popup shared by every dock item.
//!
//! Exactly one instance exists, owned by the panel. Content is borrowed:
//! the surface keeps a weak reference to a widget owned by the requesting
//! item and lets go of it on hide.

use crate::debounce::Debounce;
use crate::item::ItemRef;
use crate::widget::{widget_id, Visual, WeakWidget, WidgetHandle, WidgetId};
use crate::{DockContext, DockPosition, Point, Rect, Size};
use serde::Serialize;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Delay between showing the popup and asking the WM to raise it
pub const RAISE_DELAY: Duration = Duration::from_millis(50);

/// How many raise requests follow one show
pub const RAISE_ATTEMPTS: u32 = 3;

const ARROW_SIZE: u32 = 10;
const PADDING: u32 = 6;

/// Observable transitions, drained by the panel after each dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "popup", rename_all = "kebab-case")]
pub enum PopupEvent {
    Shown { widget: WidgetId, modal: bool },
    Hidden { widget: WidgetId },
    /// Bring the popup window to the top of the stacking order
    Raise { widget: WidgetId },
    /// A modal popup was dismissed by the user
    Accepted { widget: WidgetId },
}

#[derive(Debug, Clone, Serialize)]
pub struct PopupState {
    pub widget: WidgetId,
    pub owner: ItemRef,
    pub geometry: Rect,
    pub modal: bool,
    pub content: Visual,
}

pub struct PopupSurface {
    content: Option<WeakWidget>,
    content_id: Option<WidgetId>,
    owner: Option<ItemRef>,
    modal: bool,
    visible: bool,
    last_point: Point,
    geometry: Rect,
    raise: Debounce,
    raise_left: u32,
    events: Vec<PopupEvent>,
}

impl PopupSurface {
    pub fn new() -> Self {
        Self {
            content: None,
            content_id: None,
            owner: None,
            modal: false,
            visible: false,
            last_point: Point::default(),
            geometry: Rect::default(),
            raise: Debounce::new(RAISE_DELAY),
            raise_left: 0,
            events: Vec::new(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_modal(&self) -> bool {
        self.modal
    }

    pub fn content_id(&self) -> Option<WidgetId> {
        self.content_id
    }

    pub fn owner(&self) -> Option<&ItemRef> {
        self.owner.as_ref()
    }

    pub fn geometry(&self) -> Rect {
        self.geometry
    }

    pub fn is_showing(&self, widget: WidgetId) -> bool {
        self.visible && self.content_id == Some(widget)
    }

    /// Show `content` anchored at `anchor`.
    ///
    /// Showing the content that is already up only moves the surface. Showing
    /// different content hides the current one first, so its `about_to_hide`
    /// runs before the new content's `about_to_show`.
    pub fn show(
        &mut self,
        content: &WidgetHandle,
        owner: ItemRef,
        anchor: Point,
        modal: bool,
        ctx: &DockContext,
        now: Instant,
    ) {
        let id = widget_id(content);

        if self.is_showing(id) {
            self.owner = Some(owner);
            self.modal = modal;
            if anchor != self.last_point {
                self.last_point = anchor;
                self.geometry = place(content.borrow().size_hint(), anchor, ctx);
            }
            return;
        }

        if self.visible {
            self.hide();
        }

        content.borrow_mut().about_to_show();
        let size = content.borrow().size_hint();

        self.content = Some(Rc::downgrade(content));
        self.content_id = Some(id);
        self.owner = Some(owner);
        self.modal = modal;
        self.last_point = anchor;
        self.geometry = place(size, anchor, ctx);
        self.visible = true;
        self.raise_left = RAISE_ATTEMPTS;
        self.raise.trigger(now);
        self.events.push(PopupEvent::Shown { widget: id, modal });
    }

    /// Notify the content, drop the reference, hide the surface.
    pub fn hide(&mut self) {
        if !self.visible {
            return;
        }
        if let Some(widget) = self.content.take().and_then(|w| w.upgrade()) {
            match widget.try_borrow_mut() {
                Ok(mut w) => w.about_to_hide(),
                Err(_) => tracing::warn!("popup content busy during hide, skipping notification"),
            }
        }
        if let Some(id) = self.content_id.take() {
            self.events.push(PopupEvent::Hidden { widget: id });
        }
        self.visible = false;
        self.modal = false;
        self.owner = None;
        self.raise.stop();
        self.raise_left = 0;
    }

    /// Explicit acceptance of a modal popup.
    pub fn accept(&mut self) {
        if !self.visible || !self.modal {
            return;
        }
        if let Some(id) = self.content_id {
            self.events.push(PopupEvent::Accepted { widget: id });
        }
        self.hide();
    }

    /// Global pointer press from the region monitor. Returns true if it
    /// dismissed the popup.
    pub fn on_global_press(&mut self, pos: Point) -> bool {
        if !self.visible || self.geometry.contains(pos) {
            return false;
        }
        if self.modal {
            self.accept();
        } else {
            self.hide();
        }
        true
    }

    /// The anchoring item gave up its popup (for example the pointer left
    /// it). Modal popups ignore this.
    pub fn cancel_from(&mut self, owner: &ItemRef) -> bool {
        if self.visible && !self.modal && self.owner.as_ref() == Some(owner) {
            self.hide();
            return true;
        }
        false
    }

    /// Re-place a visible popup at its last anchor, for screen or dock changes.
    pub fn reposition(&mut self, ctx: &DockContext) {
        if !self.visible {
            return;
        }
        match self.content.as_ref().and_then(|w| w.upgrade()) {
            Some(widget) => {
                let size = widget.borrow().size_hint();
                self.geometry = place(size, self.last_point, ctx);
            }
            None => self.content_gone(),
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.raise.deadline()
    }

    pub fn on_timer(&mut self, now: Instant) {
        if self.visible && self.content.as_ref().map_or(true, |w| w.upgrade().is_none()) {
            self.content_gone();
            return;
        }
        if self.raise.fire(now) && self.visible {
            if let Some(id) = self.content_id {
                self.events.push(PopupEvent::Raise { widget: id });
            }
            self.raise_left = self.raise_left.saturating_sub(1);
            if self.raise_left > 0 {
                self.raise.trigger(now);
            }
        }
    }

    pub fn take_events(&mut self) -> Vec<PopupEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn state(&self, ctx: &DockContext) -> Option<PopupState> {
        if !self.visible {
            return None;
        }
        let widget = self.content.as_ref()?.upgrade()?;
        let content = widget.try_borrow().ok()?.visual(ctx);
        Some(PopupState {
            widget: self.content_id?,
            owner: self.owner.clone()?,
            geometry: self.geometry,
            modal: self.modal,
            content,
        })
    }

    // The owner dropped the widget while it was shown.
    fn content_gone(&mut self) {
        tracing::debug!("popup content dropped by its owner");
        self.content = None;
        if let Some(id) = self.content_id.take() {
            self.events.push(PopupEvent::Hidden { widget: id });
        }
        self.visible = false;
        self.modal = false;
        self.owner = None;
        self.raise.stop();
    }
}

impl Default for PopupSurface {
    fn default() -> Self {
        Self::new()
    }
}

/// Place a popup of content `size` on the screen-interior side of `anchor`,
/// clamped to the screen.
fn place(size: Size, anchor: Point, ctx: &DockContext) -> Rect {
    let w = size.width + PADDING * 2;
    let h = size.height + PADDING * 2;
    let rect = match ctx.position {
        DockPosition::Bottom => {
            let h = h + ARROW_SIZE;
            Rect::new(anchor.x - w as i32 / 2, anchor.y - h as i32, w, h)
        }
        DockPosition::Top => Rect::new(anchor.x - w as i32 / 2, anchor.y, w, h + ARROW_SIZE),
        DockPosition::Left => Rect::new(anchor.x, anchor.y - h as i32 / 2, w + ARROW_SIZE, h),
        DockPosition::Right => {
            let w = w + ARROW_SIZE;
            Rect::new(anchor.x - w as i32, anchor.y - h as i32 / 2, w, h)
        }
    };
    rect.clamped_to(&ctx.screen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::{next_widget_id, Widget};
    use std::cell::RefCell;

    struct RecordingWidget {
        id: WidgetId,
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Widget for RecordingWidget {
        fn id(&self) -> WidgetId {
            self.id
        }

        fn size_hint(&self) -> Size {
            Size::new(100, 40)
        }

        fn visual(&self, _ctx: &DockContext) -> Visual {
            Visual::text(self.name)
        }

        fn about_to_show(&mut self) {
            self.log.borrow_mut().push(format!("show {}", self.name));
        }

        fn about_to_hide(&mut self) {
            self.log.borrow_mut().push(format!("hide {}", self.name));
        }
    }

    fn widget(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> WidgetHandle {
        Rc::new(RefCell::new(RecordingWidget {
            id: next_widget_id(),
            name,
            log: log.clone(),
        }))
    }

    fn owner(key: &str) -> ItemRef {
        ItemRef::App(key.to_string())
    }

    #[test]
    fn test_switching_content_hides_old_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = widget("a", &log);
        let b = widget("b", &log);
        let ctx = DockContext::default();
        let now = Instant::now();
        let mut popup = PopupSurface::new();

        popup.show(&a, owner("a"), Point::new(500, 1000), false, &ctx, now);
        popup.show(&b, owner("b"), Point::new(600, 1000), false, &ctx, now);

        assert_eq!(*log.borrow(), vec!["show a", "hide a", "show b"]);
        assert!(popup.is_showing(widget_id(&b)));
        let events = popup.take_events();
        assert_eq!(
            events,
            vec![
                PopupEvent::Shown {
                    widget: widget_id(&a),
                    modal: false
                },
                PopupEvent::Hidden { widget: widget_id(&a) },
                PopupEvent::Shown {
                    widget: widget_id(&b),
                    modal: false
                },
            ]
        );
    }

    #[test]
    fn test_show_same_content_is_idempotent() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = widget("a", &log);
        let ctx = DockContext::default();
        let now = Instant::now();
        let mut popup = PopupSurface::new();

        popup.show(&a, owner("a"), Point::new(500, 1000), false, &ctx, now);
        popup.take_events();
        popup.show(&a, owner("a"), Point::new(500, 1000), false, &ctx, now);

        assert_eq!(*log.borrow(), vec!["show a"]);
        assert!(popup.take_events().is_empty());
        assert!(popup.is_visible());
    }

    #[test]
    fn test_outside_press_dismisses() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = widget("a", &log);
        let ctx = DockContext::default();
        let mut popup = PopupSurface::new();
        popup.show(&a, owner("a"), Point::new(500, 1000), true, &ctx, Instant::now());

        let inside = popup.geometry().center();
        assert!(!popup.on_global_press(inside));
        assert!(popup.is_visible());

        assert!(popup.on_global_press(Point::new(5, 5)));
        assert!(!popup.is_visible());
        let events = popup.take_events();
        assert!(events.contains(&PopupEvent::Accepted { widget: widget_id(&a) }));
        assert_eq!(*log.borrow(), vec!["show a", "hide a"]);
    }

    #[test]
    fn test_hover_out_only_cancels_non_modal() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = widget("a", &log);
        let ctx = DockContext::default();
        let mut popup = PopupSurface::new();

        popup.show(&a, owner("a"), Point::new(500, 1000), true, &ctx, Instant::now());
        assert!(!popup.cancel_from(&owner("a")));
        assert!(popup.is_visible());

        popup.hide();
        popup.show(&a, owner("a"), Point::new(500, 1000), false, &ctx, Instant::now());
        assert!(!popup.cancel_from(&owner("other")));
        assert!(popup.cancel_from(&owner("a")));
        assert!(!popup.is_visible());
    }

    #[test]
    fn test_popup_is_clamped_to_screen() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = widget("a", &log);
        let ctx = DockContext::default();
        let mut popup = PopupSurface::new();

        popup.show(&a, owner("a"), Point::new(3, 1040), false, &ctx, Instant::now());
        let g = popup.geometry();
        assert_eq!(g.x, 0);
        assert!(g.bottom() <= 1040);
        assert_eq!(g.width, 112);
    }

    #[test]
    fn test_raise_timer_retries_then_stops() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = widget("a", &log);
        let ctx = DockContext::default();
        let t0 = Instant::now();
        let mut popup = PopupSurface::new();
        popup.show(&a, owner("a"), Point::new(500, 1000), false, &ctx, t0);
        popup.take_events();

        let mut t = t0;
        for _ in 0..5 {
            t += RAISE_DELAY;
            popup.on_timer(t);
        }
        let raises = popup
            .take_events()
            .into_iter()
            .filter(|e| matches!(e, PopupEvent::Raise { .. }))
            .count();
        assert_eq!(raises, RAISE_ATTEMPTS as usize);
        assert!(popup.next_deadline().is_none());
    }

    #[test]
    fn test_dropped_content_counts_as_hidden() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = widget("a", &log);
        let id = widget_id(&a);
        let ctx = DockContext::default();
        let t0 = Instant::now();
        let mut popup = PopupSurface::new();
        popup.show(&a, owner("a"), Point::new(500, 1000), false, &ctx, t0);
        drop(a);

        popup.on_timer(t0);
        assert!(!popup.is_visible());
        assert!(popup.take_events().contains(&PopupEvent::Hidden { widget: id }));
    }
}
