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

//! Background network runtime.
//!
//! The UI thread belongs to eframe, so the telemetry client runs on its own
//! thread with a dedicated tokio runtime.

use std::io;
use std::thread::JoinHandle;

use fleet_telemetry::{Client, ClientConfig};
use log::{error, info, warn};
use tokio::sync::oneshot;

/// Owns the network thread; the client it started is handed back separately.
pub struct TelemetryRuntime {
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for TelemetryRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryRuntime")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl TelemetryRuntime {
    /// Start the runtime thread and spawn a [`Client`] on it.
    pub fn start(config: ClientConfig) -> io::Result<(Self, Client)> {
        let (client_tx, client_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        info!("Starting telemetry runtime for {}", config.connection.address);
        let thread = std::thread::Builder::new()
            .name("telemetry".to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Runtime::new() {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to create tokio runtime: {e}");
                        return;
                    }
                };
                rt.block_on(async move {
                    let client = Client::spawn(config);
                    if client_tx.send(client).is_err() {
                        return;
                    }
                    // Keep the runtime alive until the UI shuts down.
                    let _ = shutdown_rx.await;
                });
                info!("Telemetry runtime stopped");
            })?;

        let client = client_rx.recv().map_err(io::Error::other)?;

        Ok((
            Self {
                shutdown_tx: Some(shutdown_tx),
                thread: Some(thread),
            },
            client,
        ))
    }

    /// Stop the runtime and wait for its thread.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Telemetry thread panicked during shutdown");
            }
        }
    }
}

impl Drop for TelemetryRuntime {
    fn drop(&mut self) {
        self.stop();
    }
}
