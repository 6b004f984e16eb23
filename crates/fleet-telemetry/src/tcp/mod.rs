// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Telemetry stream transport.
//!
//! A [`Connection`] keeps a line-delimited TCP feed open in a background task.
//! Each line is one telemetry message. Failed or closed connections are retried
//! with a linearly growing delay, and the server address can be swapped while
//! running.

use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Configuration for the telemetry connection.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address in "host:port" format.
    pub address: String,
    /// Delay after the first failure; each further failure adds this again.
    pub reconnect_delay: Duration,
    /// Upper bound for the reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Channel buffer size for received lines.
    pub buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: "localhost:9300".to_string(),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(5),
            buffer_size: 1024,
        }
    }
}

impl ConnectionConfig {
    /// Delay before reconnect attempt number `failures` (1-based).
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        self.reconnect_delay
            .saturating_mul(failures.max(1))
            .min(self.max_reconnect_delay)
    }
}

/// Connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Closed by the server; a reconnect is scheduled.
    Disconnected,
    Error(String),
}

/// Events emitted by the connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// One line of the stream, without the terminator.
    DataReceived(Vec<u8>),
}

/// Handle to a managed telemetry connection.
///
/// Dropping the handle stops the background task.
pub struct Connection {
    event_rx: mpsc::Receiver<ConnectionEvent>,
    address_tx: watch::Sender<String>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &*self.address_tx.borrow())
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Spawn the connection task on the current tokio runtime.
    #[must_use]
    pub fn spawn(config: ConnectionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.buffer_size);
        let (address_tx, address_rx) = watch::channel(config.address.clone());
        let cancel_token = CancellationToken::new();

        let task_cancel = cancel_token.clone();
        tokio::spawn(async move {
            connection_loop(event_tx, address_rx, task_cancel, config).await;
        });

        Self {
            event_rx,
            address_tx,
            cancel_token,
        }
    }

    /// Receive the next event. Returns `None` once the task has stopped.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Point the connection at a new server. Reconnects immediately.
    pub fn set_address(&self, address: String) {
        let _ = self.address_tx.send(address);
    }

    #[must_use]
    pub fn current_address(&self) -> String {
        self.address_tx.borrow().clone()
    }

    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Token that is cancelled when this connection shuts down.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn connection_loop(
    event_tx: mpsc::Sender<ConnectionEvent>,
    mut address_rx: watch::Receiver<String>,
    cancel_token: CancellationToken,
    config: ConnectionConfig,
) {
    let mut failures: u32 = 0;

    loop {
        if cancel_token.is_cancelled() {
            info!("Telemetry connection cancelled");
            return;
        }

        let current_address = address_rx.borrow_and_update().clone();

        if event_tx
            .send(ConnectionEvent::StateChanged(ConnectionState::Connecting))
            .await
            .is_err()
        {
            return;
        }

        info!("Connecting to telemetry feed at {current_address}...");

        match connect_and_process(
            &current_address,
            &event_tx,
            &mut address_rx,
            &cancel_token,
            &mut failures,
        )
        .await
        {
            Ok(ReconnectReason::AddressChanged) => {
                info!("Telemetry address changed, reconnecting immediately");
                failures = 0;
                continue;
            }
            Ok(ReconnectReason::ConnectionClosed) => {
                let _ = event_tx
                    .send(ConnectionEvent::StateChanged(ConnectionState::Disconnected))
                    .await;
            }
            Ok(ReconnectReason::Cancelled) => {
                info!("Telemetry connection cancelled");
                return;
            }
            Err(e) => {
                error!("Telemetry connection error: {e}");
                let _ = event_tx
                    .send(ConnectionEvent::StateChanged(ConnectionState::Error(
                        e.to_string(),
                    )))
                    .await;
            }
        }

        failures = failures.saturating_add(1);
        let delay = config.backoff(failures);
        warn!(
            "Reconnecting in {} ms (attempt {failures})",
            delay.as_millis()
        );

        tokio::select! {
            () = sleep(delay) => {}
            _ = address_rx.changed() => {
                debug!("Address changed during reconnect delay");
                failures = 0;
            }
            () = cancel_token.cancelled() => {
                info!("Telemetry connection cancelled during reconnect delay");
                return;
            }
        }
    }
}

enum ReconnectReason {
    AddressChanged,
    ConnectionClosed,
    Cancelled,
}

async fn connect_and_process(
    address: &str,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    address_rx: &mut watch::Receiver<String>,
    cancel_token: &CancellationToken,
    failures: &mut u32,
) -> Result<ReconnectReason, std::io::Error> {
    let stream = tokio::select! {
        result = TcpStream::connect(address) => result?,
        () = cancel_token.cancelled() => return Ok(ReconnectReason::Cancelled),
    };
    info!("Connected to telemetry feed at {address}");
    *failures = 0;

    if event_tx
        .send(ConnectionEvent::StateChanged(ConnectionState::Connected))
        .await
        .is_err()
    {
        return Ok(ReconnectReason::Cancelled);
    }

    // Raw bytes: a malformed line is the parser's problem, not the connection's.
    let mut reader = BufReader::new(stream);
    let mut line = Vec::new();

    loop {
        tokio::select! {
            // read_until keeps partial input in `line` if another branch wins.
            read = reader.read_until(b'\n', &mut line) => {
                if read? == 0 {
                    info!("Telemetry feed closed by server");
                    return Ok(ReconnectReason::ConnectionClosed);
                }
                let payload = trim_line_ending(&line).to_vec();
                line.clear();
                if event_tx
                    .send(ConnectionEvent::DataReceived(payload))
                    .await
                    .is_err()
                {
                    return Ok(ReconnectReason::Cancelled);
                }
            }

            _ = address_rx.changed() => {
                let new_address = address_rx.borrow_and_update().clone();
                if new_address != address {
                    info!("Telemetry address changed from {address} to {new_address}");
                    return Ok(ReconnectReason::AddressChanged);
                }
            }

            () = cancel_token.cancelled() => {
                return Ok(ReconnectReason::Cancelled);
            }
        }
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let config = ConnectionConfig::default();
        assert_eq!(config.backoff(0), Duration::from_secs(1));
        assert_eq!(config.backoff(1), Duration::from_secs(1));
        assert_eq!(config.backoff(3), Duration::from_secs(3));
        assert_eq!(config.backoff(5), Duration::from_secs(5));
        assert_eq!(config.backoff(40), Duration::from_secs(5));
    }

    async fn next_line(conn: &mut Connection) -> Vec<u8> {
        loop {
            match conn.recv().await {
                Some(ConnectionEvent::DataReceived(line)) => return line,
                Some(ConnectionEvent::StateChanged(_)) => {}
                None => panic!("connection closed"),
            }
        }
    }

    #[tokio::test]
    async fn test_receives_lines_from_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"first\nsecond\n").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let mut conn = Connection::spawn(ConnectionConfig {
            address,
            ..Default::default()
        });

        let first = timeout(Duration::from_secs(2), next_line(&mut conn))
            .await
            .unwrap();
        let second = timeout(Duration::from_secs(2), next_line(&mut conn))
            .await
            .unwrap();
        assert_eq!(first, b"first");
        assert_eq!(second, b"second");
    }

    #[test]
    fn test_trim_line_ending() {
        assert_eq!(trim_line_ending(b"abc\r\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc\n"), b"abc");
        assert_eq!(trim_line_ending(b"abc"), b"abc");
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"\xff\xfe\nvalid\r\n").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
        });

        let mut conn = Connection::spawn(ConnectionConfig {
            address,
            reconnect_delay: Duration::from_millis(20),
            ..Default::default()
        });

        let events = timeout(Duration::from_secs(2), async {
            let mut events = Vec::new();
            while let Some(event) = conn.recv().await {
                let done = matches!(&event, ConnectionEvent::DataReceived(line) if line == b"valid");
                events.push(event);
                if done {
                    break;
                }
            }
            events
        })
        .await
        .unwrap();

        let lines: Vec<&[u8]> = events
            .iter()
            .filter_map(|e| match e {
                ConnectionEvent::DataReceived(line) => Some(line.as_slice()),
                ConnectionEvent::StateChanged(_) => None,
            })
            .collect();
        assert_eq!(lines, vec![&b"\xff\xfe"[..], &b"valid"[..]]);

        let connects = events
            .iter()
            .filter(|e| matches!(e, ConnectionEvent::StateChanged(ConnectionState::Connected)))
            .count();
        assert_eq!(connects, 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ConnectionEvent::StateChanged(ConnectionState::Error(_)))));
    }

    #[tokio::test]
    async fn test_reconnects_after_server_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            for n in 0..2 {
                let (mut socket, _) = listener.accept().await.unwrap();
                socket
                    .write_all(format!("session {n}\n").as_bytes())
                    .await
                    .unwrap();
            }
        });

        let mut conn = Connection::spawn(ConnectionConfig {
            address,
            reconnect_delay: Duration::from_millis(50),
            max_reconnect_delay: Duration::from_millis(100),
            ..Default::default()
        });

        let first = timeout(Duration::from_secs(2), next_line(&mut conn))
            .await
            .unwrap();
        let second = timeout(Duration::from_secs(2), next_line(&mut conn))
            .await
            .unwrap();
        assert_eq!(first, b"session 0");
        assert_eq!(second, b"session 1");
    }

    #[tokio::test]
    async fn test_shutdown_ends_event_stream() {
        let mut conn = Connection::spawn(ConnectionConfig {
            address: "127.0.0.1:1".to_string(),
            reconnect_delay: Duration::from_millis(10),
            ..Default::default()
        });
        conn.shutdown();

        let drained = timeout(Duration::from_secs(2), async {
            while conn.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }
}
