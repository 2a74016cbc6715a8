//! Service bridge integration
//!
//! Session bus clients (dock daemon, network service, tray manager, file
//! manager) live in a separate bridge process. The panel talks to it over
//! stdio, one JSON object per line.
//!
//! ## Key components:
//! - `protocol` - Parse bridge lines and encode requests
//! - `connection` - Manage the bridge subprocess
//! - `monitor` - Drive the panel from bridge events, input commands and timers

mod connection;
mod monitor;
mod protocol;

pub use connection::BridgeConnection;
pub use monitor::{apply_command, DockMonitor, MonitorCommand, MonitorCommandSender, MonitorConfig, MonitorExit, PanelEmitter};
pub use protocol::{encode_request, parse_line, BridgeMessage};
