//! Line protocol spoken with the bridge process
//!
//! Every line in either direction is one JSON object:
//! - `{"event": "entry-added", ...}` - a [`SystemEvent`] notification
//! - `{"bridge": "ready"}` - the bridge finished its initial sync
//! - `{"bridge": "error", "message": "..."}` - a request failed on the bus side
//! - `{"bridge": "exit", "reason": "..."}` - the bridge is going away
//!
//! Requests flow the other way as serialized [`ServiceRequest`]s.

use crate::services::{ServiceRequest, SystemEvent};
use serde::Deserialize;

/// Messages parsed from bridge output
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeMessage {
    Event(SystemEvent),
    Ready,
    Error { message: String },
    Exit { reason: Option<String> },
}

#[derive(Deserialize)]
#[serde(tag = "bridge", rename_all = "kebab-case")]
enum Control {
    Ready,
    Error { message: String },
    Exit {
        #[serde(default)]
        reason: Option<String>,
    },
}

/// Parse one line of bridge output. Blank and malformed lines yield `None`.
pub fn parse_line(line: &str) -> Option<BridgeMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, line, "unparseable bridge line");
            return None;
        }
    };

    if value.get("event").is_some() {
        return match serde_json::from_value::<SystemEvent>(value) {
            Ok(event) => Some(BridgeMessage::Event(event)),
            Err(e) => {
                // newer bridges may send events this build does not know
                tracing::debug!(error = %e, line, "ignoring unknown bridge event");
                None
            }
        };
    }

    if value.get("bridge").is_some() {
        return match serde_json::from_value::<Control>(value) {
            Ok(Control::Ready) => Some(BridgeMessage::Ready),
            Ok(Control::Error { message }) => Some(BridgeMessage::Error { message }),
            Ok(Control::Exit { reason }) => Some(BridgeMessage::Exit { reason }),
            Err(e) => {
                tracing::warn!(error = %e, line, "bad bridge control line");
                None
            }
        };
    }

    tracing::warn!(line, "bridge line has neither event nor bridge field");
    None
}

/// Encode a request as one newline-terminated line.
pub fn encode_request(request: &ServiceRequest) -> Result<String, String> {
    let mut line = serde_json::to_string(request).map_err(|e| format!("Failed to encode request: {}", e))?;
    line.push('\n');
    Ok(line)
}
