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

//! Full-stack client: connection, parser and store wired together.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::protocol::{FeatureCollectionParser, Protocol};
use crate::store::{StoreConfig, VehicleHistoryStore, VehicleRecord};
use crate::tcp::{Connection, ConnectionConfig, ConnectionEvent, ConnectionState};

/// Called after every accepted sample, from the network task.
pub type IngestCallback = Arc<dyn Fn() + Send + Sync>;

/// Configuration for the full-stack client.
#[derive(Clone, Default)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    pub store: StoreConfig,
    /// Typically used to wake the UI thread.
    pub on_ingest: Option<IngestCallback>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("connection", &self.connection)
            .field("store", &self.store)
            .field("on_ingest", &self.on_ingest.is_some())
            .finish()
    }
}

/// Counters for the status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub messages_received: u64,
    pub samples_ingested: u64,
    /// Lines that failed to parse plus samples without an identity.
    pub samples_dropped: u64,
    pub state: ConnectionState,
    pub last_message: Option<DateTime<Utc>>,
}

impl Default for ClientStats {
    fn default() -> Self {
        Self {
            messages_received: 0,
            samples_ingested: 0,
            samples_dropped: 0,
            state: ConnectionState::Disconnected,
            last_message: None,
        }
    }
}

/// Owns the network task and the shared vehicle store.
///
/// Must be spawned from within a tokio runtime.
pub struct Client {
    store: Arc<RwLock<VehicleHistoryStore>>,
    stats: Arc<RwLock<ClientStats>>,
    address_tx: watch::Sender<String>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &*self.address_tx.borrow())
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Connect and start ingesting in the background.
    #[must_use]
    pub fn spawn(config: ClientConfig) -> Self {
        let store = Arc::new(RwLock::new(VehicleHistoryStore::new(config.store)));
        let stats = Arc::new(RwLock::new(ClientStats::default()));
        let (address_tx, address_rx) = watch::channel(config.connection.address.clone());
        let cancel_token = CancellationToken::new();

        let connection = Connection::spawn(config.connection);
        let mut ingest = Ingest {
            parser: FeatureCollectionParser::new(),
            store: Arc::clone(&store),
            stats: Arc::clone(&stats),
            on_ingest: config.on_ingest,
        };
        let task_cancel = cancel_token.clone();

        tokio::spawn(async move {
            ingest.run(connection, address_rx, task_cancel).await;
        });

        Self {
            store,
            stats,
            address_tx,
            cancel_token,
        }
    }

    /// Shared store handle, for readers and the interaction layer.
    #[must_use]
    pub fn store(&self) -> Arc<RwLock<VehicleHistoryStore>> {
        Arc::clone(&self.store)
    }

    /// Owned copy of every vehicle record.
    #[must_use]
    pub fn vehicles(&self) -> Vec<VehicleRecord> {
        self.store
            .read()
            .map(|s| s.snapshot())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn vehicle_count(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Store version; changes whenever any vehicle or interaction state does.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.store.read().map(|s| s.version()).unwrap_or(0)
    }

    #[must_use]
    pub fn stats(&self) -> ClientStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Reconnect to a different server.
    pub fn set_address(&self, address: String) {
        let _ = self.address_tx.send(address);
    }

    #[must_use]
    pub fn current_address(&self) -> String {
        self.address_tx.borrow().clone()
    }

    /// Stop the network task. The store stays readable.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Network-side half of the client.
struct Ingest {
    parser: FeatureCollectionParser,
    store: Arc<RwLock<VehicleHistoryStore>>,
    stats: Arc<RwLock<ClientStats>>,
    on_ingest: Option<IngestCallback>,
}

impl Ingest {
    async fn run(
        &mut self,
        mut connection: Connection,
        mut address_rx: watch::Receiver<String>,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                event = connection.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                changed = address_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let address = address_rx.borrow_and_update().clone();
                    connection.set_address(address);
                }
                () = cancel_token.cancelled() => break,
            }
        }

        connection.shutdown();
        if let Ok(mut stats) = self.stats.write() {
            stats.state = ConnectionState::Disconnected;
        }
        info!("Telemetry client stopped");
    }

    fn handle(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged(state) => {
                debug!("Connection state: {state:?}");
                if let Ok(mut stats) = self.stats.write() {
                    stats.state = state;
                }
            }
            ConnectionEvent::DataReceived(line) => {
                if self.process_line(&line, Utc::now()) {
                    if let Some(callback) = &self.on_ingest {
                        callback();
                    }
                }
            }
        }
    }

    /// Parse one line into the store. Returns `true` if a sample was stored.
    fn process_line(&mut self, line: &[u8], now: DateTime<Utc>) -> bool {
        let parsed = self.parser.parse(line);

        let mut stats = match self.stats.write() {
            Ok(stats) => stats,
            Err(poisoned) => poisoned.into_inner(),
        };
        stats.messages_received += 1;
        stats.last_message = Some(now);

        let sample = match parsed {
            Ok(Some(sample)) => sample,
            Ok(None) => return false,
            Err(e) => {
                stats.samples_dropped += 1;
                warn!("Dropping telemetry message: {e}");
                return false;
            }
        };

        let accepted = self
            .store
            .write()
            .map(|mut store| store.ingest_at(sample, now.timestamp_millis()))
            .unwrap_or(false);

        if accepted {
            stats.samples_ingested += 1;
        } else {
            stats.samples_dropped += 1;
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const LINE: &str = r#"{"type":"FeatureCollection","features":[{"type":"Feature","geometry":{"type":"Point","coordinates":[35.9,31.9]},"properties":{"serial":"X1","registration":"SD-B1","yaw":0.5,"Name":"Scout","altitude":120.0}}]}"#;

    fn ingest() -> Ingest {
        Ingest {
            parser: FeatureCollectionParser::new(),
            store: Arc::new(RwLock::new(VehicleHistoryStore::default())),
            stats: Arc::new(RwLock::new(ClientStats::default())),
            on_ingest: None,
        }
    }

    #[test]
    fn test_process_line_counts_outcomes() {
        let mut ingest = ingest();
        let now = Utc::now();

        assert!(ingest.process_line(LINE.as_bytes(), now));
        assert!(!ingest.process_line(b"not json", now));
        assert!(!ingest.process_line(b"", now));
        assert!(!ingest.process_line(b"\xff\xfe", now));

        let stats = ingest.stats.read().unwrap().clone();
        assert_eq!(stats.messages_received, 4);
        assert_eq!(stats.samples_ingested, 1);
        assert_eq!(stats.samples_dropped, 2);
        assert_eq!(stats.last_message, Some(now));

        let store = ingest.store.read().unwrap();
        let record = store.get("X1").unwrap();
        assert_eq!(record.registration(), "SD-B1");
        assert_eq!(record.first_seen(), now.timestamp_millis());
    }

    #[test]
    fn test_state_change_is_recorded() {
        let mut ingest = ingest();
        ingest.handle(ConnectionEvent::StateChanged(ConnectionState::Connected));
        assert_eq!(
            ingest.stats.read().unwrap().state,
            ConnectionState::Connected
        );
    }

    #[tokio::test]
    async fn test_end_to_end_ingest() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(format!("{LINE}\n").as_bytes())
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        let wakeups = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakeups);
        let client = Client::spawn(ClientConfig {
            connection: ConnectionConfig {
                address,
                ..Default::default()
            },
            on_ingest: Some(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        });

        tokio::time::timeout(Duration::from_secs(2), async {
            while client.vehicle_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(client.version(), 1);
        assert_eq!(client.vehicles()[0].serial(), "X1");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(wakeups.load(Ordering::SeqCst), 1);
        assert_eq!(client.stats().samples_ingested, 1);

        client.shutdown();
        assert!(client.is_shut_down());
    }
}
