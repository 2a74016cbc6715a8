//! Connection manager for the service bridge
//!
//! Spawns the bridge process and exchanges JSON lines with it.

use super::protocol::{encode_request, parse_line, BridgeMessage};
use crate::services::ServiceRequest;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;

/// Connection to the bridge process
pub struct BridgeConnection {
    child: Child,
    stdin: ChildStdin,
    /// Receiver for parsed messages
    message_rx: mpsc::Receiver<BridgeMessage>,
    /// Requests written since connect
    sent: u64,
}

/// Spawn the stdout reader task: raw bytes in, lossily decoded lines through
/// the protocol parser, messages out.
fn spawn_reader_task(stdout: tokio::process::ChildStdout, tx: mpsc::Sender<BridgeMessage>) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::with_capacity(4096);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                    let line = String::from_utf8_lossy(&buf);

                    if let Some(message) = parse_line(&line) {
                        if tx.send(message).await.is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "bridge reader: read error");
                    break;
                }
            }
        }
        tracing::debug!("bridge reader finished");
    });
}

impl BridgeConnection {
    /// Start the bridge. `command[0]` is the program, the rest its arguments.
    pub async fn spawn(command: &[String]) -> Result<Self, String> {
        let (program, args) = command.split_first().ok_or("Empty bridge command")?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .map_err(|e| format!("Failed to start bridge '{}': {}", program, e))?;

        let stdin = child.stdin.take().ok_or("Failed to get stdin handle")?;
        let stdout = child.stdout.take().ok_or("Failed to get stdout handle")?;

        let (tx, rx) = mpsc::channel(1000);
        spawn_reader_task(stdout, tx);

        tracing::info!(program = %program, "bridge started");
        Ok(Self {
            child,
            stdin,
            message_rx: rx,
            sent: 0,
        })
    }

    /// Send one request.
    pub async fn send_request(&mut self, request: &ServiceRequest) -> Result<(), String> {
        let line = encode_request(request)?;
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("Failed to send request: {}", e))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| format!("Failed to flush stdin: {}", e))?;
        self.sent += 1;
        Ok(())
    }

    /// Send several requests with a single flush.
    pub async fn send_requests_batch(&mut self, requests: &[ServiceRequest]) -> Result<(), String> {
        if requests.is_empty() {
            return Ok(());
        }

        for request in requests {
            let line = encode_request(request)?;
            self.stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|e| format!("Failed to send request: {}", e))?;
            self.sent += 1;
        }

        self.stdin
            .flush()
            .await
            .map_err(|e| format!("Failed to flush stdin: {}", e))
    }

    /// Receive the next message. `None` once the bridge closed its stdout.
    pub async fn recv(&mut self) -> Option<BridgeMessage> {
        self.message_rx.recv().await
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn requests_sent(&self) -> u64 {
        self.sent
    }

    pub async fn kill(&mut self) -> Result<(), String> {
        self.child
            .kill()
            .await
            .map_err(|e| format!("Failed to kill bridge: {}", e))
    }

    /// Ask the bridge to shut down, wait up to `timeout`, then kill it.
    pub async fn graceful_close(&mut self, timeout: Duration) {
        if let Err(e) = self.send_request(&ServiceRequest::Shutdown).await {
            tracing::debug!(error = %e, "bridge already closing");
        }

        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => tracing::info!(%status, "bridge exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "error waiting for bridge exit"),
            Err(_) => {
                tracing::warn!("bridge did not exit in time, killing");
                if let Err(e) = self.kill().await {
                    tracing::warn!(error = %e, "failed to kill bridge");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SystemEvent;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn test_reads_messages_until_eof() {
        let script = r#"printf '%s\n' 'garbage' '{"event":"trash-count","count":3}' '{"bridge":"ready"}'"#;
        let mut conn = BridgeConnection::spawn(&sh(script)).await.unwrap();

        assert_eq!(
            conn.recv().await,
            Some(BridgeMessage::Event(SystemEvent::TrashCount { count: 3 }))
        );
        assert_eq!(conn.recv().await, Some(BridgeMessage::Ready));
        assert_eq!(conn.recv().await, None);
    }

    #[tokio::test]
    async fn test_requests_reach_the_bridge() {
        let script = r#"read line; case "$line" in *empty-trash*) printf '%s\n' '{"bridge":"ready"}';; esac"#;
        let mut conn = BridgeConnection::spawn(&sh(script)).await.unwrap();

        conn.send_request(&ServiceRequest::EmptyTrash).await.unwrap();
        assert_eq!(conn.requests_sent(), 1);
        assert_eq!(conn.recv().await, Some(BridgeMessage::Ready));
        assert_eq!(conn.recv().await, None);
    }

    #[tokio::test]
    async fn test_graceful_close_kills_stubborn_bridge() {
        let mut conn = BridgeConnection::spawn(&sh("sleep 30")).await.unwrap();
        assert!(conn.is_alive());
        conn.graceful_close(Duration::from_millis(100)).await;
        assert!(!conn.is_alive());
    }

    #[tokio::test]
    async fn test_empty_command_is_an_error() {
        assert!(BridgeConnection::spawn(&[]).await.is_err());
    }
}
