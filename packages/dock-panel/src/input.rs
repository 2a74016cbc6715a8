//! Renderer commands arriving as JSON lines on stdin.

use dock_core::bridge::{MonitorCommand, MonitorCommandSender};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

/// Parse one command line. Blank lines and malformed commands yield `None`.
pub fn parse_command(line: &str) -> Option<MonitorCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(command) => Some(command),
        Err(e) => {
            tracing::warn!(error = %e, line, "ignoring malformed command");
            None
        }
    }
}

/// Forward commands from `reader` until it closes, then ask the monitor to
/// shut down: a renderer that went away takes the dock with it.
pub async fn forward_commands<R: AsyncBufRead + Unpin>(reader: R, tx: MonitorCommandSender) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(command) = parse_command(&line) else { continue };
                if tx.send(command).await.is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "command input: read error");
                break;
            }
        }
    }
    tracing::info!("command input closed");
    let _ = tx.send(MonitorCommand::Shutdown).await;
}

pub fn spawn_stdin_reader(tx: MonitorCommandSender) {
    tokio::spawn(forward_commands(BufReader::new(tokio::io::stdin()), tx));
}

/// Turn Ctrl-C into an orderly shutdown.
pub fn spawn_interrupt_handler(tx: MonitorCommandSender) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for interrupts");
            return;
        }
        tracing::info!("interrupted");
        let _ = tx.send(MonitorCommand::Shutdown).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use dock_core::item::ItemRef;
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_command() {
        assert_eq!(
            parse_command(r#" {"command":"click","item":{"app":"/entries/1"}} "#),
            Some(MonitorCommand::Click {
                item: ItemRef::App("/entries/1".into())
            })
        );
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command(r#"{"command":"levitate"}"#), None);
    }

    #[tokio::test]
    async fn test_forward_then_shutdown_on_eof() {
        let input: &[u8] = b"{\"command\":\"dismiss-menu\"}\nnot json\n\n{\"command\":\"dismiss-menu\"}\n";
        let (tx, mut rx) = mpsc::channel(8);

        forward_commands(input, tx).await;

        assert_eq!(rx.recv().await, Some(MonitorCommand::DismissMenu));
        assert_eq!(rx.recv().await, Some(MonitorCommand::DismissMenu));
        assert_eq!(rx.recv().await, Some(MonitorCommand::Shutdown));
        assert_eq!(rx.recv().await, None);
    }
}
