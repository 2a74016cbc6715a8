//! System service notifications and requests.
//!
//! The dock talks to the dock daemon, the network service, the tray manager
//! and the file manager over the session bus. Those clients live in a bridge
//! process; these types are what crosses the bridge in either direction.

use crate::{DisplayMode, DockPosition, Rect, WindowId, WindowInfo};
use serde::{Deserialize, Serialize};

/// A running or pinned application entry of the dock daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EntryInfo {
    /// Bus object path of the entry
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub windows: Vec<WindowInfo>,
    #[serde(default)]
    pub current_window: Option<WindowId>,
    #[serde(default)]
    pub menu: String,
}

/// Notifications flowing into the dock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SystemEvent {
    CompositeChanged {
        enabled: bool,
    },
    ScreenChanged {
        geometry: Rect,
        #[serde(default = "default_scale")]
        scale: f64,
    },
    DisplayModeChanged {
        mode: DisplayMode,
    },
    PositionChanged {
        position: DockPosition,
    },
    /// Global pointer press reported by the screen-wide region monitor
    PointerPress {
        x: i32,
        y: i32,
    },

    EntryAdded {
        entry: EntryInfo,
        /// Insert position, appended when absent
        #[serde(default)]
        index: Option<usize>,
    },
    EntryRemoved {
        id: String,
    },
    EntryWindows {
        id: String,
        windows: Vec<WindowInfo>,
    },
    EntryActive {
        id: String,
        active: bool,
    },
    EntryIcon {
        id: String,
        icon: String,
    },
    EntryCurrentWindow {
        id: String,
        window: WindowId,
    },
    EntryMenu {
        id: String,
        menu: String,
    },

    NetworkDevices {
        devices: Vec<String>,
    },
    DeviceState {
        path: String,
        state: u32,
    },
    GlobalNetworkState {
        state: u32,
    },
    ActiveConnections {
        devices: Vec<String>,
    },
    /// Per-device connection details, JSON shaped like `{"Ip4": {"Address": "..."}}`
    DeviceConnInfo {
        path: String,
        info: serde_json::Value,
    },

    TrayList {
        keys: Vec<String>,
    },
    TrayAdded {
        key: String,
    },
    TrayRemoved {
        key: String,
    },
    TrayChanged {
        key: String,
    },

    TrashCount {
        count: u32,
    },
}

fn default_scale() -> f64 {
    1.0
}

/// Calls on a dock daemon entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum EntryAction {
    Activate,
    NewInstance,
    PresentWindows,
    RequestUndock,
    HandleMenuItem { item: String },
    HandleDragDrop { uris: Vec<String> },
    /// Ask the daemon to re-validate its window list
    Check,
}

/// Requests flowing out of the dock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "request", rename_all = "kebab-case")]
pub enum ServiceRequest {
    Entry {
        id: String,
        #[serde(flatten)]
        action: EntryAction,
    },
    ActivateWindow {
        window: WindowId,
    },
    /// Show a single window on screen while hovering its thumbnail
    PreviewWindow {
        window: WindowId,
    },
    CancelPreview,
    /// Pin the application a dropped desktop file describes
    RequestDock {
        uri: String,
    },
    RunCommand {
        command: String,
    },
    EmptyTrash,
    SetDeviceEnabled {
        path: String,
        enabled: bool,
    },
    Shutdown,
}

// ============================================
// Network states
// ============================================

/// Per-interface device state, numbered as NetworkManager does
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DeviceState {
    #[default]
    Unknown = 0,
    Unmanaged = 10,
    Unavailable = 20,
    Disconnected = 30,
    Prepare = 40,
    Config = 50,
    NeedAuth = 60,
    IpConfig = 70,
    IpCheck = 80,
    Secondaries = 90,
    Activated = 100,
    Deactivating = 110,
    Failed = 120,
}

impl DeviceState {
    pub fn from_code(code: u32) -> Self {
        match code {
            10 => DeviceState::Unmanaged,
            20 => DeviceState::Unavailable,
            30 => DeviceState::Disconnected,
            40 => DeviceState::Prepare,
            50 => DeviceState::Config,
            60 => DeviceState::NeedAuth,
            70 => DeviceState::IpConfig,
            80 => DeviceState::IpCheck,
            90 => DeviceState::Secondaries,
            100 => DeviceState::Activated,
            110 => DeviceState::Deactivating,
            120 => DeviceState::Failed,
            _ => DeviceState::Unknown,
        }
    }

    /// States ordered below `Disconnected` mean the device cannot be used.
    pub fn is_error_like(&self) -> bool {
        *self < DeviceState::Disconnected
    }
}

/// Aggregate connectivity, numbered as NetworkManager does
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum GlobalNetworkState {
    #[default]
    Unknown = 0,
    Asleep = 10,
    Disconnected = 20,
    Disconnecting = 30,
    Connecting = 40,
    ConnectedLocal = 50,
    ConnectedSite = 60,
    ConnectedGlobal = 70,
}

impl GlobalNetworkState {
    pub fn from_code(code: u32) -> Self {
        match code {
            10 => GlobalNetworkState::Asleep,
            20 => GlobalNetworkState::Disconnected,
            30 => GlobalNetworkState::Disconnecting,
            40 => GlobalNetworkState::Connecting,
            50 => GlobalNetworkState::ConnectedLocal,
            60 => GlobalNetworkState::ConnectedSite,
            70 => GlobalNetworkState::ConnectedGlobal,
            _ => GlobalNetworkState::Unknown,
        }
    }
}

/// IPv4 address out of a device connection info object, if present.
pub fn ipv4_address(info: &serde_json::Value) -> Option<&str> {
    info.get("Ip4")?.get("Address")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_state_ordering() {
        assert!(DeviceState::Unavailable.is_error_like());
        assert!(DeviceState::Unknown.is_error_like());
        assert!(!DeviceState::Disconnected.is_error_like());
        assert!(!DeviceState::Failed.is_error_like());
        assert_eq!(DeviceState::from_code(100), DeviceState::Activated);
        assert_eq!(DeviceState::from_code(7), DeviceState::Unknown);
        assert_eq!(GlobalNetworkState::from_code(70), GlobalNetworkState::ConnectedGlobal);
    }

    #[test]
    fn test_ipv4_address_tolerates_missing_fields() {
        let full = serde_json::json!({"Ip4": {"Address": "10.0.0.2"}});
        assert_eq!(ipv4_address(&full), Some("10.0.0.2"));
        assert_eq!(ipv4_address(&serde_json::json!({"Ip4": {}})), None);
        assert_eq!(ipv4_address(&serde_json::json!({})), None);
        assert_eq!(ipv4_address(&serde_json::json!({"Ip4": {"Address": 5}})), None);
    }

    #[test]
    fn test_request_wire_shape() {
        let req = ServiceRequest::Entry {
            id: "/entries/firefox".into(),
            action: EntryAction::HandleMenuItem { item: "3".into() },
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "request": "entry",
                "id": "/entries/firefox",
                "action": "handle-menu-item",
                "item": "3"
            })
        );
    }
}
