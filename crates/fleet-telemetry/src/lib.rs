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

//! Live drone telemetry aggregation and incremental map rendering.
//!
//! The crate is split into layers that can be used on their own or wired
//! together through [`Client`]:
//!
//! - **Protocol layer**: parses the newline-delimited feature collection feed
//!   into [`Sample`]s
//! - **Connection layer**: async TCP with linear reconnect backoff and address
//!   hot-reload
//! - **Store layer**: one [`VehicleRecord`] per serial with bounded history and
//!   the selection/hover state
//! - **Fleet layer**: groups vehicles by registration into [`FleetRecord`]s
//! - **Render layer**: [`RenderAdapter`] keeps point and line collections in
//!   sync with the fleets and pushes them to a [`MapRenderer`] at most once per
//!   frame, via [`FrameScheduler`]
//! - **Interaction layer**: hover popups, click-to-select and fly-to
//!
//! # Quick Start
//!
//! ```no_run
//! use fleet_telemetry::{aggregate, Client, ClientConfig, ConnectionConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Client::spawn(ClientConfig {
//!         connection: ConnectionConfig {
//!             address: "localhost:9300".to_string(),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     });
//!
//!     loop {
//!         let store = client.store();
//!         if let Ok(store) = store.read() {
//!             for fleet in aggregate(store.get_all()) {
//!                 println!("{}: {} positions", fleet.registration(), fleet.path().len());
//!             }
//!         }
//!         tokio::time::sleep(Duration::from_secs(1)).await;
//!     }
//! }
//! ```
//!
//! # Protocol Layer Only
//!
//! ```
//! use fleet_telemetry::protocol::{FeatureCollectionParser, Protocol};
//!
//! let mut parser = FeatureCollectionParser::new();
//! let line = br#"{"features":[{"properties":{"serial":"X1","registration":"SD-B1"},"geometry":{"type":"Point","coordinates":[35.9,31.9]}}]}"#;
//! let sample = parser.parse(line).unwrap().unwrap();
//! assert_eq!(sample.registration, "SD-B1");
//! ```

pub mod analytics;
pub mod client;
pub mod fleet;
pub mod geo;
pub mod interaction;
pub mod protocol;
pub mod render;
pub mod scheduler;
pub mod store;
pub mod tcp;

pub use client::{Client, ClientConfig, ClientStats, IngestCallback};
pub use fleet::{aggregate, is_allowed, FleetRecord, FlightSummary};
pub use geo::{LngLat, ScreenPoint};
pub use interaction::{HoverState, InteractionLayer};
pub use protocol::{DisplayAttributes, FeatureCollectionParser, ParseError, Protocol, Sample};
pub use render::{LineFeature, MapRenderer, PointFeature, RenderAdapter, RenderError};
pub use scheduler::FrameScheduler;
pub use store::{HistoryPoint, StoreConfig, StoreEvent, VehicleHistoryStore, VehicleRecord};
pub use tcp::{Connection, ConnectionConfig, ConnectionEvent, ConnectionState};
