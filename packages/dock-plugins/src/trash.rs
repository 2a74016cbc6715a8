//! Trash shortcut: one pinned-last item, present in Fashion mode only.

use dock_core::plugin::{ItemProvider, PluginEnv, ProviderHandle, SORT_KEY_LAST};
use dock_core::services::{ServiceRequest, SystemEvent};
use dock_core::widget::{next_widget_id, ContextMenu, Label, MenuItem, Visual, Widget, WidgetHandle, WidgetId};
use dock_core::{DisplayMode, DockContext};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

pub const TRASH_KEY: &str = "trash";
pub const OPEN_TRASH_COMMAND: &str = "gvfs-open trash:///";

const MENU_OPEN: &str = "open";
const MENU_EMPTY: &str = "empty";

/// Tips text for a trash holding `count` files.
pub fn trash_tips(count: u32) -> String {
    if count < 2 {
        format!("Trash - {} file", count)
    } else {
        format!("Trash - {} files", count)
    }
}

pub struct TrashWidget {
    id: WidgetId,
    count: u32,
}

impl TrashWidget {
    fn new() -> Self {
        Self {
            id: next_widget_id(),
            count: 0,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Widget for TrashWidget {
    fn id(&self) -> WidgetId {
        self.id
    }

    fn visual(&self, ctx: &DockContext) -> Visual {
        let name = if self.count == 0 { "user-trash" } else { "user-trash-full" };
        Visual::icon(name, ctx.icon_pixels(ctx.plugin_item_size().width))
    }
}

pub struct TrashProvider {
    env: Option<PluginEnv>,
    widget: Rc<RefCell<TrashWidget>>,
    tips: Rc<RefCell<Label>>,
    shown: bool,
}

impl Default for TrashProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TrashProvider {
    pub fn new() -> Self {
        Self {
            env: None,
            widget: Rc::new(RefCell::new(TrashWidget::new())),
            tips: Label::handle(trash_tips(0)),
            shown: false,
        }
    }

    pub fn factory() -> Result<ProviderHandle, String> {
        Ok(Rc::new(RefCell::new(Self::new())))
    }

    pub fn count(&self) -> u32 {
        self.widget.borrow().count()
    }

    fn switch_mode(&mut self, mode: DisplayMode) {
        let Some(env) = &self.env else { return };
        self.shown = mode == DisplayMode::Fashion;
        if self.shown {
            env.proxy.item_added(TRASH_KEY);
        } else {
            env.proxy.item_removed(TRASH_KEY);
        }
    }

    fn request(&self, request: ServiceRequest) {
        if let Some(env) = &self.env {
            env.requests.push(request);
        }
    }
}

impl ItemProvider for TrashProvider {
    fn plugin_name(&self) -> &str {
        "trash"
    }

    fn init(&mut self, env: PluginEnv, ctx: &DockContext, _now: Instant) {
        self.env = Some(env);
        self.switch_mode(ctx.display_mode);
    }

    fn display_mode_changed(&mut self, ctx: &DockContext, _now: Instant) {
        self.switch_mode(ctx.display_mode);
    }

    fn item_widget(&mut self, _key: &str) -> Option<WidgetHandle> {
        let widget: WidgetHandle = self.widget.clone();
        Some(widget)
    }

    fn item_tips_widget(&mut self, _key: &str) -> Option<WidgetHandle> {
        self.tips.borrow_mut().set_text(trash_tips(self.count()));
        let tips: WidgetHandle = self.tips.clone();
        Some(tips)
    }

    fn item_command(&self, _key: &str) -> Option<String> {
        Some(OPEN_TRASH_COMMAND.to_string())
    }

    fn item_context_menu(&self, _key: &str) -> Option<ContextMenu> {
        Some(ContextMenu::new(vec![
            MenuItem::new(MENU_OPEN, "Open"),
            MenuItem::new(MENU_EMPTY, "Empty").enabled(self.count() > 0),
        ]))
    }

    fn invoked_menu_item(&mut self, _key: &str, menu_id: &str, _checked: bool) {
        match menu_id {
            MENU_OPEN => self.request(ServiceRequest::RunCommand {
                command: OPEN_TRASH_COMMAND.to_string(),
            }),
            MENU_EMPTY => self.request(ServiceRequest::EmptyTrash),
            other => tracing::debug!(menu_id = other, "unknown trash menu item"),
        }
    }

    fn item_sort_key(&self, _key: &str) -> i32 {
        SORT_KEY_LAST
    }

    fn system_event(&mut self, event: &SystemEvent, _ctx: &DockContext, _now: Instant) {
        let SystemEvent::TrashCount { count } = event else {
            return;
        };
        if self.count() == *count {
            return;
        }
        self.widget.borrow_mut().count = *count;
        if let (true, Some(env)) = (self.shown, &self.env) {
            env.proxy.item_update(TRASH_KEY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dock_core::plugin::{PluginId, PluginProxy, ProxyRequest};
    use dock_core::settings::MemorySettings;
    use dock_core::TaskQueue;

    struct Fixture {
        provider: TrashProvider,
        proxy_queue: TaskQueue<ProxyRequest>,
        requests: TaskQueue<ServiceRequest>,
    }

    fn fixture(mode: DisplayMode) -> Fixture {
        let proxy_queue = TaskQueue::new();
        let requests = TaskQueue::new();
        let mut provider = TrashProvider::new();
        let ctx = DockContext {
            display_mode: mode,
            ..Default::default()
        };
        provider.init(
            PluginEnv {
                proxy: PluginProxy::new(PluginId::new("trash"), proxy_queue.clone()),
                requests: requests.clone(),
                settings: MemorySettings::shared(),
            },
            &ctx,
            Instant::now(),
        );
        Fixture {
            provider,
            proxy_queue,
            requests,
        }
    }

    fn added() -> ProxyRequest {
        ProxyRequest::ItemAdded {
            plugin: PluginId::new("trash"),
            key: TRASH_KEY.into(),
        }
    }

    #[test]
    fn test_item_follows_display_mode() {
        let mut fx = fixture(DisplayMode::Efficient);
        assert_eq!(
            fx.proxy_queue.drain(),
            vec![ProxyRequest::ItemRemoved {
                plugin: PluginId::new("trash"),
                key: TRASH_KEY.into()
            }]
        );

        let fashion = DockContext::default();
        fx.provider.display_mode_changed(&fashion, Instant::now());
        assert_eq!(fx.proxy_queue.drain(), vec![added()]);
        assert_eq!(fx.provider.item_sort_key(TRASH_KEY), SORT_KEY_LAST);
    }

    #[test]
    fn test_tips_pluralize() {
        assert_eq!(trash_tips(0), "Trash - 0 file");
        assert_eq!(trash_tips(1), "Trash - 1 file");
        assert_eq!(trash_tips(7), "Trash - 7 files");
    }

    #[test]
    fn test_count_updates_item_once() {
        let mut fx = fixture(DisplayMode::Fashion);
        fx.proxy_queue.drain();
        let ctx = DockContext::default();

        fx.provider.system_event(&SystemEvent::TrashCount { count: 3 }, &ctx, Instant::now());
        fx.provider.system_event(&SystemEvent::TrashCount { count: 3 }, &ctx, Instant::now());
        assert_eq!(fx.proxy_queue.len(), 1);

        let visual = fx.provider.item_widget(TRASH_KEY).unwrap().borrow().visual(&ctx);
        assert_eq!(visual.icon.as_deref(), Some("user-trash-full"));
        let tips = fx.provider.item_tips_widget(TRASH_KEY).unwrap().borrow().visual(&ctx);
        assert_eq!(tips.text.as_deref(), Some("Trash - 3 files"));
    }

    #[test]
    fn test_menu_actions() {
        let mut fx = fixture(DisplayMode::Fashion);
        let menu = fx.provider.item_context_menu(TRASH_KEY).unwrap();
        assert!(!menu.item(MENU_EMPTY).unwrap().enabled);

        fx.provider.invoked_menu_item(TRASH_KEY, MENU_EMPTY, false);
        fx.provider.invoked_menu_item(TRASH_KEY, MENU_OPEN, false);
        assert_eq!(
            fx.requests.drain(),
            vec![
                ServiceRequest::EmptyTrash,
                ServiceRequest::RunCommand {
                    command: OPEN_TRASH_COMMAND.into()
                },
            ]
        );
        assert_eq!(fx.provider.item_command(TRASH_KEY).as_deref(), Some(OPEN_TRASH_COMMAND));
    }
}
