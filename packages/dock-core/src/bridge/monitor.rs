//! DockMonitor - drives the panel with an emitter adapter
//!
//! Bridge notifications, renderer commands and panel timers all arrive on one
//! task; every resulting state change goes out through a [`PanelEmitter`].

use super::connection::BridgeConnection;
use super::protocol::BridgeMessage;
use crate::item::{DragOutcome, DropPayload, ItemRef};
use crate::panel::{Panel, PanelState, PanelUpdate};
use crate::plugin::PluginId;
use crate::popup::PopupEvent;
use crate::services::SystemEvent;
use crate::{Point, WindowId};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Commands from the renderer (pointer input, menu choices) or the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum MonitorCommand {
    Hover {
        item: ItemRef,
    },
    Leave {
        item: ItemRef,
    },
    Click {
        item: ItemRef,
    },
    MiddleClick {
        item: ItemRef,
    },
    Wheel {
        item: ItemRef,
        delta: i32,
    },
    RightClick {
        item: ItemRef,
    },
    InvokeMenu {
        id: String,
        #[serde(default)]
        checked: bool,
    },
    DismissMenu,
    Press {
        item: ItemRef,
        x: i32,
        y: i32,
    },
    DragMotion {
        item: ItemRef,
        x: i32,
        y: i32,
    },
    EndDrag {
        outcome: DragOutcome,
    },
    Drop {
        item: ItemRef,
        payload: DropPayload,
    },
    /// Pointer entered the popup of an application item
    EnterPreview {
        item: ItemRef,
    },
    PreviewHover {
        window: WindowId,
    },
    PreviewActivate {
        window: WindowId,
    },
    PreviewClose {
        window: WindowId,
    },
    SetInContainer {
        plugin: PluginId,
        key: String,
        in_container: bool,
    },
    /// Notification produced on the renderer side, such as a global pointer press
    Inject {
        event: SystemEvent,
    },
    /// Close the bridge and stop the monitor
    Shutdown,
}

/// Adapter receiving everything the monitor publishes.
pub trait PanelEmitter {
    fn emit_state(&self, state: &PanelState);

    fn emit_popup(&self, event: &PopupEvent);

    fn emit_error(&self, error: String);
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Bridge program and arguments
    pub bridge_command: Vec<String>,

    /// Minimum interval between state emissions; changes in between coalesce.
    pub emit_interval: Duration,

    /// How long the bridge gets to exit after a shutdown request
    pub shutdown_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bridge_command: vec!["dock-bridge".to_string()],
            emit_interval: Duration::from_millis(16),
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

/// Why [`DockMonitor::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Shutdown was requested (or every command sender is gone)
    Shutdown,
    /// The bridge exited or closed its output
    BridgeClosed,
}

pub type MonitorCommandSender = mpsc::Sender<MonitorCommand>;

/// Route one renderer command into the panel.
pub fn apply_command(panel: &mut Panel, command: MonitorCommand, now: Instant) -> PanelUpdate {
    match command {
        MonitorCommand::Hover { item } => panel.hover(&item, now),
        MonitorCommand::Leave { item } => panel.leave(&item, now),
        MonitorCommand::Click { item } => panel.click(&item, now),
        MonitorCommand::MiddleClick { item } => panel.middle_click(&item, now),
        MonitorCommand::Wheel { item, delta } => panel.wheel(&item, delta, now),
        MonitorCommand::RightClick { item } => panel.right_click(&item, now),
        MonitorCommand::InvokeMenu { id, checked } => panel.invoke_menu(&id, checked, now),
        MonitorCommand::DismissMenu => panel.dismiss_menu(),
        MonitorCommand::Press { item, x, y } => {
            panel.press(&item, Point::new(x, y));
            PanelUpdate::default()
        }
        MonitorCommand::DragMotion { item, x, y } => panel.drag_motion(&item, Point::new(x, y), now),
        MonitorCommand::EndDrag { outcome } => panel.end_drag(outcome, now),
        MonitorCommand::Drop { item, payload } => panel.drop_on(&item, payload, now),
        MonitorCommand::EnterPreview { item } => {
            panel.enter_preview(&item);
            PanelUpdate::default()
        }
        MonitorCommand::PreviewHover { window } => panel.preview_hover(window),
        MonitorCommand::PreviewActivate { window } => panel.preview_activate(window, now),
        MonitorCommand::PreviewClose { window } => panel.preview_close(window),
        MonitorCommand::SetInContainer {
            plugin,
            key,
            in_container,
        } => panel.set_in_container(&plugin, &key, in_container, now),
        MonitorCommand::Inject { event } => panel.handle_event(event, now),
        MonitorCommand::Shutdown => PanelUpdate::default(),
    }
}

/// The panel event loop.
///
/// Owns the bridge connection and the panel. Runs on the current thread;
/// the panel is single-threaded.
pub struct DockMonitor {
    connection: BridgeConnection,
    panel: Panel,
    config: MonitorConfig,
    command_rx: mpsc::Receiver<MonitorCommand>,
}

impl DockMonitor {
    /// Drive `panel` with an already running bridge. Returns the monitor and a
    /// sender for commands.
    pub fn new(config: MonitorConfig, panel: Panel, connection: BridgeConnection) -> (Self, MonitorCommandSender) {
        let (command_tx, command_rx) = mpsc::channel(256);
        (
            Self {
                connection,
                panel,
                config,
                command_rx,
            },
            command_tx,
        )
    }

    /// Start the bridge. Returns the monitor and a sender for commands.
    pub async fn connect(config: MonitorConfig, panel: Panel) -> Result<(Self, MonitorCommandSender), String> {
        let connection = BridgeConnection::spawn(&config.bridge_command).await?;
        Ok(Self::new(config, panel, connection))
    }

    /// Replace the bridge after [`MonitorExit::BridgeClosed`]. The panel and
    /// the command channel carry over; the new bridge re-announces its entries.
    pub fn attach(&mut self, connection: BridgeConnection) {
        self.connection = connection;
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn panel(&self) -> &Panel {
        &self.panel
    }

    /// Run until shutdown or until the bridge goes away.
    pub async fn run<E: PanelEmitter>(&mut self, emitter: &E) -> MonitorExit {
        let idle = Duration::from_secs(3600);
        let emit_interval = self.config.emit_interval;
        let mut pending_emit = true;
        let mut last_emit: Option<Instant> = None;

        loop {
            self.flush_requests(emitter).await;
            for event in self.panel.take_popup_events() {
                emitter.emit_popup(&event);
            }

            if pending_emit && last_emit.map_or(true, |t| t.elapsed() >= emit_interval) {
                emitter.emit_state(&self.panel.state());
                last_emit = Some(Instant::now());
                pending_emit = false;
            }

            let emit_sleep = match last_emit {
                Some(t) if pending_emit => emit_interval.saturating_sub(t.elapsed()),
                _ => idle,
            };
            let wake = self
                .panel
                .next_deadline()
                .map(tokio::time::Instant::from_std)
                .unwrap_or_else(|| tokio::time::Instant::now() + idle);

            tokio::select! {
                message = self.connection.recv() => {
                    match message {
                        Some(BridgeMessage::Event(event)) => {
                            tracing::trace!(?event, "bridge event");
                            let update = self.panel.handle_event(event, Instant::now());
                            pending_emit |= update.state_changed;
                        }
                        Some(BridgeMessage::Ready) => tracing::info!("bridge ready"),
                        Some(BridgeMessage::Error { message }) => {
                            emitter.emit_error(format!("Bridge error: {}", message));
                        }
                        Some(BridgeMessage::Exit { reason }) => {
                            let reason = reason.unwrap_or_else(|| "disconnected".to_string());
                            self.finish(emitter, pending_emit).await;
                            emitter.emit_error(format!("Bridge exited: {}", reason));
                            return MonitorExit::BridgeClosed;
                        }
                        None => {
                            tracing::warn!("bridge output closed");
                            self.finish(emitter, pending_emit).await;
                            emitter.emit_error("Bridge connection closed".to_string());
                            return MonitorExit::BridgeClosed;
                        }
                    }
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(MonitorCommand::Shutdown) | None => {
                            tracing::info!("monitor shutting down");
                            self.finish(emitter, pending_emit).await;
                            self.connection.graceful_close(self.config.shutdown_timeout).await;
                            return MonitorExit::Shutdown;
                        }
                        Some(command) => {
                            tracing::trace!(?command, "monitor command");
                            let update = apply_command(&mut self.panel, command, Instant::now());
                            pending_emit |= update.state_changed;
                        }
                    }
                }

                _ = tokio::time::sleep_until(wake) => {
                    let update = self.panel.on_timer(Instant::now());
                    pending_emit |= update.state_changed;
                }

                _ = tokio::time::sleep(emit_sleep), if pending_emit => {}
            }
        }
    }

    async fn flush_requests<E: PanelEmitter>(&mut self, emitter: &E) {
        let requests = self.panel.take_requests();
        if requests.is_empty() {
            return;
        }
        tracing::debug!(count = requests.len(), "sending requests to bridge");
        if let Err(e) = self.connection.send_requests_batch(&requests).await {
            emitter.emit_error(format!("Failed to send requests: {}", e));
        }
    }

    /// Last flush before leaving the loop.
    async fn finish<E: PanelEmitter>(&mut self, emitter: &E, pending_emit: bool) {
        self.flush_requests(emitter).await;
        for event in self.panel.take_popup_events() {
            emitter.emit_popup(&event);
        }
        if pending_emit {
            emitter.emit_state(&self.panel.state());
        }
    }
}
