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

//! Vehicle history store.
//!
//! Owns one [`VehicleRecord`] per serial with a bounded, time-ordered position
//! history, plus the interaction state (selected serial, hovered sample and
//! popup position). Every mutation bumps [`VehicleHistoryStore::version`] and
//! emits a [`StoreEvent`], so readers can either poll the version or subscribe.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use log::{debug, info};
use tokio::sync::broadcast;

use crate::geo::{LngLat, ScreenPoint};
use crate::protocol::Sample;

/// Default number of positions retained per vehicle.
pub const HISTORY_WINDOW: usize = 200;

/// One retained position with the time it was observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub position: LngLat,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Everything known about one physical vehicle.
#[derive(Debug, Clone)]
pub struct VehicleRecord {
    latest: Sample,
    first_seen: i64,
    history: VecDeque<HistoryPoint>,
    sequence: u64,
    samples_received: u64,
}

impl VehicleRecord {
    fn new(sample: Sample, timestamp: i64, sequence: u64, window: usize) -> Self {
        let mut history = VecDeque::with_capacity(window.min(HISTORY_WINDOW));
        history.push_back(HistoryPoint {
            position: sample.position,
            timestamp,
        });
        let mut latest = sample;
        latest.start_time = Some(timestamp);

        Self {
            latest,
            first_seen: timestamp,
            history,
            sequence,
            samples_received: 1,
        }
    }

    fn apply(&mut self, mut sample: Sample, timestamp: i64, window: usize) {
        self.history.push_back(HistoryPoint {
            position: sample.position,
            timestamp,
        });
        while self.history.len() > window {
            self.history.pop_front();
        }
        sample.start_time = Some(self.first_seen);
        self.latest = sample;
        self.samples_received += 1;
    }

    #[must_use]
    pub fn serial(&self) -> &str {
        &self.latest.serial
    }

    #[must_use]
    pub fn registration(&self) -> &str {
        &self.latest.registration
    }

    /// Most recent sample. Its `start_time` is always the first-seen time.
    #[must_use]
    pub fn latest(&self) -> &Sample {
        &self.latest
    }

    /// Time of the first sample ever ingested for this serial.
    #[must_use]
    pub fn first_seen(&self) -> i64 {
        self.first_seen
    }

    /// Time of the most recent sample.
    #[must_use]
    pub fn last_seen(&self) -> i64 {
        self.history.back().map_or(self.first_seen, |p| p.timestamp)
    }

    /// Retained positions, oldest first. Never empty.
    #[must_use]
    pub fn history(&self) -> &VecDeque<HistoryPoint> {
        &self.history
    }

    /// Creation order across the whole store, used as a stable tie-breaker.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Number of samples ever ingested for this serial, including trimmed ones.
    #[must_use]
    pub fn samples_received(&self) -> u64 {
        self.samples_received
    }
}

/// Events emitted by the store when its state changes.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// First sample for a serial.
    VehicleAdded(String),
    /// A sample was appended to an existing serial.
    SampleIngested(String),
    /// The selected serial changed.
    SelectionChanged(Option<String>),
    /// Hovered sample or popup position changed.
    HoverChanged,
    /// All vehicles were dropped.
    Cleared,
}

/// Configuration for the vehicle history store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Positions retained per vehicle.
    pub history_window: usize,
    /// Broadcast channel capacity for events.
    pub event_channel_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            history_window: HISTORY_WINDOW,
            event_channel_capacity: 256,
        }
    }
}

/// Ownership root for all vehicle state.
pub struct VehicleHistoryStore {
    vehicles: HashMap<String, VehicleRecord>,
    history_window: usize,
    next_sequence: u64,
    version: u64,
    selected: Option<String>,
    hovered: Option<Sample>,
    hover_position: Option<ScreenPoint>,
    event_tx: broadcast::Sender<StoreEvent>,
}

impl std::fmt::Debug for VehicleHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VehicleHistoryStore")
            .field("vehicle_count", &self.vehicles.len())
            .field("history_window", &self.history_window)
            .field("version", &self.version)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl Default for VehicleHistoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl VehicleHistoryStore {
    /// Create a new store with the given configuration.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_channel_capacity.max(1));

        Self {
            vehicles: HashMap::new(),
            history_window: config.history_window.max(1),
            next_sequence: 0,
            version: 0,
            selected: None,
            hovered: None,
            hover_position: None,
            event_tx,
        }
    }

    /// Ingest a sample, stamping it with the current time if it carries none.
    ///
    /// Returns `false` when the sample was dropped for lacking an identity.
    pub fn ingest(&mut self, sample: Sample) -> bool {
        self.ingest_at(sample, Utc::now().timestamp_millis())
    }

    /// Ingest a sample using `now_ms` as the fallback timestamp.
    pub fn ingest_at(&mut self, sample: Sample, now_ms: i64) -> bool {
        if sample.serial.is_empty() || sample.registration.is_empty() {
            debug!("Dropping sample without serial or registration");
            return false;
        }

        let requested = sample.start_time.unwrap_or(now_ms);
        let window = self.history_window;
        let serial = sample.serial.clone();

        let event = if let Some(record) = self.vehicles.get_mut(&serial) {
            // History stays non-decreasing even if the feed goes backwards.
            let timestamp = requested.max(record.last_seen());
            record.apply(sample, timestamp, window);
            StoreEvent::SampleIngested(serial)
        } else {
            info!(
                "Tracking new vehicle {} ({})",
                sample.serial, sample.registration
            );
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            self.vehicles.insert(
                serial.clone(),
                VehicleRecord::new(sample, requested, sequence, window),
            );
            StoreEvent::VehicleAdded(serial)
        };

        self.touch(event);
        true
    }

    /// All vehicle records in creation order.
    #[must_use]
    pub fn get_all(&self) -> Vec<&VehicleRecord> {
        let mut records: Vec<&VehicleRecord> = self.vehicles.values().collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    /// Owned copy of every record, for readers that must release the lock quickly.
    #[must_use]
    pub fn snapshot(&self) -> Vec<VehicleRecord> {
        self.get_all().into_iter().cloned().collect()
    }

    #[must_use]
    pub fn get(&self, serial: &str) -> Option<&VehicleRecord> {
        self.vehicles.get(serial)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    #[must_use]
    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Monotonic change counter, bumped by every mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Subscribe to store events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.event_tx.subscribe()
    }

    pub fn set_selected(&mut self, serial: Option<String>) {
        if self.selected == serial {
            return;
        }
        self.selected.clone_from(&serial);
        self.touch(StoreEvent::SelectionChanged(serial));
    }

    #[must_use]
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn set_hovered(&mut self, sample: Option<Sample>) {
        if self.hovered == sample {
            return;
        }
        self.hovered = sample;
        self.touch(StoreEvent::HoverChanged);
    }

    #[must_use]
    pub fn hovered(&self) -> Option<&Sample> {
        self.hovered.as_ref()
    }

    pub fn set_hover_position(&mut self, position: Option<ScreenPoint>) {
        if self.hover_position == position {
            return;
        }
        self.hover_position = position;
        self.touch(StoreEvent::HoverChanged);
    }

    #[must_use]
    pub fn hover_position(&self) -> Option<ScreenPoint> {
        self.hover_position
    }

    /// Drop every vehicle and reset interaction state.
    pub fn clear(&mut self) {
        self.vehicles.clear();
        self.selected = None;
        self.hovered = None;
        self.hover_position = None;
        self.touch(StoreEvent::Cleared);
    }

    fn touch(&mut self, event: StoreEvent) {
        self.version += 1;
        let _ = self.event_tx.send(event);
    }
}
