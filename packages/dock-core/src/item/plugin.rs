//! Dock-side shim for an item served by a plugin.

use super::{DockItem, DragOutcome, DropPayload, ItemEnv, ItemRef, PopupRequest};
use crate::item::app::DRAG_THRESHOLD;
use crate::plugin::{PluginId, ProviderHandle};
use crate::queue::TaskQueue;
use crate::services::ServiceRequest;
use crate::widget::{ContextMenu, Visual, WidgetHandle};
use crate::{DockContext, Point, Rect};
use std::time::Instant;

pub struct PluginItem {
    plugin: PluginId,
    key: String,
    provider: ProviderHandle,
    widget: WidgetHandle,
    requests: TaskQueue<ServiceRequest>,

    sort_key: i32,
    allow_container: bool,
    in_container: bool,
    /// Registration order, breaks sort key ties
    sequence: u64,

    geometry: Rect,
    press_pos: Option<Point>,
    dragging: bool,
}

impl PluginItem {
    pub fn new(
        plugin: PluginId,
        key: String,
        provider: ProviderHandle,
        widget: WidgetHandle,
        requests: TaskQueue<ServiceRequest>,
        sequence: u64,
    ) -> Self {
        let mut item = Self {
            plugin,
            key,
            provider,
            widget,
            requests,
            sort_key: 0,
            allow_container: false,
            in_container: false,
            sequence,
            geometry: Rect::default(),
            press_pos: None,
            dragging: false,
        };
        item.refresh();
        item
    }

    pub fn plugin(&self) -> &PluginId {
        &self.plugin
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn sort_key(&self) -> i32 {
        self.sort_key
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn allow_container(&self) -> bool {
        self.allow_container
    }

    pub fn in_container(&self) -> bool {
        self.in_container
    }

    pub fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    /// Re-read the cached sort key and container flags.
    pub fn refresh(&mut self) {
        match self.provider.try_borrow() {
            Ok(provider) => {
                self.sort_key = provider.item_sort_key(&self.key);
                self.allow_container = provider.item_allow_container(&self.key);
                self.in_container = self.allow_container && provider.item_is_in_container(&self.key);
            }
            Err(_) => tracing::warn!(plugin = %self.plugin, key = %self.key, "provider busy, keeping cached flags"),
        }
    }

    /// Replace the widget after the provider rebuilt it.
    pub fn set_widget(&mut self, widget: WidgetHandle) {
        self.widget = widget;
    }
}

impl DockItem for PluginItem {
    fn item_ref(&self) -> ItemRef {
        ItemRef::Plugin {
            plugin: self.plugin.clone(),
            key: self.key.clone(),
        }
    }

    fn paint(&self, ctx: &DockContext) -> Visual {
        match self.widget.try_borrow() {
            Ok(widget) => widget.visual(ctx),
            Err(_) => Visual::default(),
        }
    }

    fn popup_content(&mut self, _env: &ItemEnv) -> Option<PopupRequest> {
        if self.dragging {
            return None;
        }
        let tips = self.provider.borrow_mut().item_tips_widget(&self.key)?;
        Some(PopupRequest::tips(tips))
    }

    fn context_menu(&self) -> Option<ContextMenu> {
        self.provider.borrow().item_context_menu(&self.key)
    }

    fn invoke_menu_action(&mut self, id: &str, checked: bool) {
        self.provider.borrow_mut().invoked_menu_item(&self.key, id, checked);
    }

    fn activate(&mut self, _now: Instant) -> Option<PopupRequest> {
        let command = self.provider.borrow().item_command(&self.key);
        if let Some(command) = command.filter(|c| !c.is_empty()) {
            self.requests.push(ServiceRequest::RunCommand { command });
            return None;
        }
        let applet = self.provider.borrow_mut().item_popup_applet(&self.key)?;
        Some(PopupRequest::applet(applet))
    }

    fn press(&mut self, pos: Point) {
        self.press_pos = Some(pos);
    }

    fn leave(&mut self, _now: Instant) {
        self.press_pos = None;
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
        true
    }

    fn end_drag(&mut self, _outcome: &DragOutcome) {
        self.dragging = false;
    }

    fn is_dragging(&self) -> bool {
        self.dragging
    }

    fn accepts_drop(&self, payload: &DropPayload) -> bool {
        // plugin items only take part in reordering among themselves
        matches!(payload, DropPayload::Item { source: ItemRef::Plugin { .. } })
    }

    fn geometry(&self) -> Rect {
        self.geometry
    }

    fn set_geometry(&mut self, rect: Rect, _now: Instant) {
        self.geometry = rect;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::loader::test_support::TestProvider;
    use crate::plugin::{ItemProvider, ProviderHandle};
    use crate::snapshot::{HeadlessWindowSystem, SnapshotCapture};
    use crate::widget::Label;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn item(provider: &Rc<RefCell<TestProvider>>, requests: &TaskQueue<ServiceRequest>) -> PluginItem {
        let handle: ProviderHandle = provider.clone();
        let widget: WidgetHandle = Label::handle("w");
        PluginItem::new(PluginId::new("test"), "k".into(), handle, widget, requests.clone(), 0)
    }

    #[test]
    fn test_click_runs_command() {
        let mut provider = TestProvider::named("test").with_item("k", 3);
        provider.command = Some("gvfs-open trash:///".into());
        let provider = Rc::new(RefCell::new(provider));
        let requests = TaskQueue::new();
        let mut item = item(&provider, &requests);

        assert_eq!(item.sort_key(), 3);
        assert!(item.activate(Instant::now()).is_none());
        assert_eq!(
            requests.drain(),
            vec![ServiceRequest::RunCommand {
                command: "gvfs-open trash:///".into()
            }]
        );
    }

    #[test]
    fn test_cached_flags_refresh() {
        let provider = Rc::new(RefCell::new(TestProvider::named("test").with_item("k", 3)));
        let mut item = item(&provider, &TaskQueue::new());
        assert!(item.allow_container());
        assert!(!item.in_container());

        provider.borrow_mut().set_item_is_in_container("k", true);
        provider.borrow_mut().set_sort_key("k", 9);
        assert_eq!(item.sort_key(), 3);

        item.refresh();
        assert!(item.in_container());
        assert_eq!(item.sort_key(), 9);
    }

    #[test]
    fn test_tips_and_menu_forwarding() {
        let provider = Rc::new(RefCell::new(TestProvider::named("test").with_item("k", 0)));
        let mut item = item(&provider, &TaskQueue::new());
        let ctx = DockContext::default();
        let capture = SnapshotCapture::default();
        let env = ItemEnv {
            ctx: &ctx,
            ws: &HeadlessWindowSystem,
            capture: &capture,
        };

        let tips = item.popup_content(&env).unwrap();
        assert!(!tips.modal);

        item.invoke_menu_action("settings", false);
        assert_eq!(provider.borrow().invoked, vec![("k".to_string(), "settings".to_string())]);
        assert!(item.context_menu().is_none());
    }
}
