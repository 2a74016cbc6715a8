//! Wired network device indicator.
//!
//! Every driving signal (device state, global state, active set, resize,
//! display mode) restarts one short debounce; the icon is recomputed only
//! when it expires, so bursts of notifications cost a single repaint.

use crate::debounce::Debounce;
use crate::services::{ipv4_address, DeviceState, GlobalNetworkState};
use crate::widget::{next_widget_id, Label, Visual, Widget, WidgetId};
use crate::{DisplayMode, DockContext, Size};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub const WIRED_REFRESH_DELAY: Duration = Duration::from_millis(200);

/// Number of frames in the "connecting" animation
pub const CONNECTING_FRAMES: u128 = 5;

/// Icon edge length in Efficient mode
const SYMBOLIC_ICON_SIZE: u32 = 16;

/// Opens the network page of the control center
pub const NETWORK_SETTINGS_COMMAND: &str = "dbus-send --print-reply --dest=com.deepin.dde.ControlCenter /com/deepin/dde/ControlCenter com.deepin.dde.ControlCenter.ShowModule \"string:network\"";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiredIcon {
    pub name: String,
    pub size: u32,
    /// Still connecting: the next frame follows one refresh interval later
    pub animating: bool,
}

/// Pick the indicator icon. `elapsed` is the animation clock.
pub fn wired_icon(
    connected: bool,
    device: DeviceState,
    global: GlobalNetworkState,
    mode: DisplayMode,
    extent: u32,
    elapsed: Duration,
) -> WiredIcon {
    let size = match mode {
        DisplayMode::Efficient => SYMBOLIC_ICON_SIZE,
        DisplayMode::Fashion => (extent as f64 * 0.8) as u32,
    };

    if connected && global == GlobalNetworkState::Connecting {
        let frame = (elapsed.as_millis() / WIRED_REFRESH_DELAY.as_millis()) % CONNECTING_FRAMES + 1;
        return WiredIcon {
            name: format!("network-wired-symbolic-connecting{}", frame),
            size,
            animating: true,
        };
    }

    let base = match (connected, global) {
        (false, _) if device.is_error_like() => "network-error",
        (false, _) => "network-offline",
        (true, GlobalNetworkState::ConnectedGlobal) => "network-online",
        (true, _) => "network-idle",
    };
    let name = match mode {
        DisplayMode::Efficient => format!("{}-symbolic", base),
        DisplayMode::Fashion => base.to_string(),
    };
    WiredIcon {
        name,
        size,
        animating: false,
    }
}

/// Hover text for a wired device.
pub fn wired_tips(connected: bool, info: &Value) -> String {
    if !connected {
        return "No Network".to_string();
    }
    match ipv4_address(info) {
        Some(addr) => format!("Wired connection: {}", addr),
        None => "Unknown".to_string(),
    }
}

pub struct WiredItem {
    id: WidgetId,
    path: String,
    connected: bool,
    device_state: DeviceState,
    global_state: GlobalNetworkState,
    conn_info: Value,
    display_mode: DisplayMode,
    extent: u32,

    delay: Debounce,
    clock: Instant,
    icon: Option<WiredIcon>,
    revision: u64,

    tips: Rc<RefCell<Label>>,
}

impl WiredItem {
    pub fn new(path: impl Into<String>, ctx: &DockContext, now: Instant) -> Self {
        let mut delay = Debounce::new(WIRED_REFRESH_DELAY);
        delay.trigger(now);
        Self {
            id: next_widget_id(),
            path: path.into(),
            connected: false,
            device_state: DeviceState::Unknown,
            global_state: GlobalNetworkState::Unknown,
            conn_info: Value::Null,
            display_mode: ctx.display_mode,
            extent: ctx.plugin_item_size().width,
            delay,
            clock: now,
            icon: None,
            revision: 0,
            tips: Label::handle(""),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn icon(&self) -> Option<&WiredIcon> {
        self.icon.as_ref()
    }

    /// Bumped on every recompute
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn command(&self) -> &'static str {
        NETWORK_SETTINGS_COMMAND
    }

    pub fn set_active_devices(&mut self, active: &[String], now: Instant) {
        self.connected = active.iter().any(|p| *p == self.path);
        self.delay.trigger(now);
    }

    pub fn set_device_state(&mut self, state: DeviceState, now: Instant) {
        self.device_state = state;
        self.delay.trigger(now);
    }

    pub fn set_global_state(&mut self, state: GlobalNetworkState, now: Instant) {
        self.global_state = state;
        self.delay.trigger(now);
    }

    pub fn set_conn_info(&mut self, info: Value) {
        self.conn_info = info;
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode, now: Instant) {
        self.display_mode = mode;
        self.delay.trigger(now);
    }

    pub fn set_extent(&mut self, extent: u32, now: Instant) {
        if self.extent != extent {
            self.extent = extent;
            self.delay.trigger(now);
        }
    }

    /// Tips label with its text brought up to date.
    pub fn tips(&self) -> Rc<RefCell<Label>> {
        self.tips
            .borrow_mut()
            .set_text(wired_tips(self.connected, &self.conn_info));
        self.tips.clone()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.delay.deadline()
    }

    /// Returns true when the icon was recomputed.
    pub fn on_timer(&mut self, now: Instant) -> bool {
        if !self.delay.fire(now) {
            return false;
        }
        let icon = wired_icon(
            self.connected,
            self.device_state,
            self.global_state,
            self.display_mode,
            self.extent,
            now.saturating_duration_since(self.clock),
        );
        if icon.animating {
            self.delay.trigger(now);
        }
        tracing::trace!(device = %self.path, icon = %icon.name, "wired icon reloaded");
        self.icon = Some(icon);
        self.revision += 1;
        true
    }
}

impl Widget for WiredItem {
    fn id(&self) -> WidgetId {
        self.id
    }

    fn size_hint(&self) -> Size {
        Size::new(self.extent, self.extent)
    }

    fn visual(&self, _ctx: &DockContext) -> Visual {
        match &self.icon {
            Some(icon) => Visual::icon(icon.name.clone(), icon.size),
            None => Visual::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PATH: &str = "/org/freedesktop/NetworkManager/Devices/2";

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_icon_selection() {
        use DisplayMode::*;
        use GlobalNetworkState as G;
        let z = Duration::ZERO;

        assert_eq!(wired_icon(false, DeviceState::Unavailable, G::Unknown, Fashion, 60, z).name, "network-error");
        assert_eq!(wired_icon(false, DeviceState::Disconnected, G::Unknown, Fashion, 60, z).name, "network-offline");
        assert_eq!(wired_icon(true, DeviceState::Activated, G::ConnectedGlobal, Fashion, 60, z).name, "network-online");
        assert_eq!(wired_icon(true, DeviceState::Activated, G::ConnectedLocal, Fashion, 60, z).name, "network-idle");

        let efficient = wired_icon(true, DeviceState::Activated, G::ConnectedGlobal, Efficient, 60, z);
        assert_eq!(efficient.name, "network-online-symbolic");
        assert_eq!(efficient.size, 16);
        assert_eq!(wired_icon(false, DeviceState::Failed, G::Unknown, Fashion, 60, z).size, 48);
    }

    #[test]
    fn test_connecting_animation_frames() {
        let icon = |elapsed| wired_icon(true, DeviceState::IpConfig, GlobalNetworkState::Connecting, DisplayMode::Fashion, 60, elapsed);
        assert_eq!(icon(ms(0)).name, "network-wired-symbolic-connecting1");
        assert_eq!(icon(ms(450)).name, "network-wired-symbolic-connecting3");
        assert_eq!(icon(ms(1000)).name, "network-wired-symbolic-connecting1");
        assert!(icon(ms(0)).animating);

        let offline = wired_icon(false, DeviceState::Prepare, GlobalNetworkState::Connecting, DisplayMode::Fashion, 60, ms(0));
        assert!(!offline.animating);
    }

    #[test]
    fn test_burst_recomputes_once_with_final_state() {
        let t0 = Instant::now();
        let mut item = WiredItem::new(PATH, &DockContext::default(), t0);
        item.set_active_devices(&[PATH.to_string()], t0);

        item.set_device_state(DeviceState::Disconnected, t0 + ms(20));
        item.set_global_state(GlobalNetworkState::Connecting, t0 + ms(60));
        item.set_global_state(GlobalNetworkState::ConnectedGlobal, t0 + ms(120));

        assert!(!item.on_timer(t0 + ms(200)));
        assert!(!item.on_timer(t0 + ms(319)));
        assert!(item.on_timer(t0 + ms(320)));
        assert!(!item.on_timer(t0 + ms(1000)));

        assert_eq!(item.revision(), 1);
        assert_eq!(item.icon().unwrap().name, "network-online");
        assert_eq!(item.next_deadline(), None);
    }

    #[test]
    fn test_connecting_rearms_until_settled() {
        let t0 = Instant::now();
        let mut item = WiredItem::new(PATH, &DockContext::default(), t0);
        item.set_active_devices(&[PATH.to_string()], t0);
        item.set_global_state(GlobalNetworkState::Connecting, t0);

        assert!(item.on_timer(t0 + ms(200)));
        assert_eq!(item.next_deadline(), Some(t0 + ms(400)));
        assert!(item.on_timer(t0 + ms(400)));
        assert_eq!(item.icon().unwrap().name, "network-wired-symbolic-connecting3");

        item.set_global_state(GlobalNetworkState::ConnectedGlobal, t0 + ms(450));
        assert!(item.on_timer(t0 + ms(650)));
        assert_eq!(item.next_deadline(), None);
        assert_eq!(item.revision(), 3);
    }

    #[test]
    fn test_tips_text() {
        assert_eq!(wired_tips(false, &json!({"Ip4": {"Address": "10.0.0.2"}})), "No Network");
        assert_eq!(wired_tips(true, &json!({"Ip4": {"Address": "10.0.0.2"}})), "Wired connection: 10.0.0.2");
        assert_eq!(wired_tips(true, &json!({"Ip6": {}})), "Unknown");

        let mut item = WiredItem::new(PATH, &DockContext::default(), Instant::now());
        item.set_conn_info(json!({"Ip4": {"Address": "192.168.1.4"}}));
        assert_eq!(item.tips().borrow().text(), "No Network");
        item.set_active_devices(&[PATH.to_string()], Instant::now());
        assert_eq!(item.tips().borrow().text(), "Wired connection: 192.168.1.4");
    }
}
