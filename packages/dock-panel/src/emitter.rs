//! Publishes panel output to the renderer as JSON lines on stdout.

use dock_core::bridge::PanelEmitter;
use dock_core::popup::PopupEvent;
use dock_core::PanelState;
use serde::Serialize;
use std::cell::RefCell;
use std::io::Write;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum Output<'a> {
    State { state: &'a PanelState },
    Popup { event: &'a PopupEvent },
    Error { message: &'a str },
}

/// Writes one JSON object per line to `W`.
pub struct JsonLinesEmitter<W: Write> {
    out: RefCell<W>,
}

impl<W: Write> JsonLinesEmitter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn write(&self, output: &Output) {
        let mut out = self.out.borrow_mut();
        let result = serde_json::to_writer(&mut *out, output)
            .map_err(|e| e.to_string())
            .and_then(|_| out.write_all(b"\n").map_err(|e| e.to_string()))
            .and_then(|_| out.flush().map_err(|e| e.to_string()));
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to write panel output");
        }
    }
}

impl JsonLinesEmitter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> PanelEmitter for JsonLinesEmitter<W> {
    fn emit_state(&self, state: &PanelState) {
        self.write(&Output::State { state });
    }

    fn emit_popup(&self, event: &PopupEvent) {
        self.write(&Output::Popup { event });
    }

    fn emit_error(&self, error: String) {
        tracing::warn!(error = %error, "panel error");
        self.write(&Output::Error { message: &error });
    }
}
