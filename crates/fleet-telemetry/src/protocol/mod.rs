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

//! Protocol layer for drone telemetry parsing.
//!
//! This module provides a trait-based abstraction over feed formats. The feed
//! currently spoken by the fleet gateway is a newline-delimited JSON feature
//! collection, handled by [`FeatureCollectionParser`].

mod feature_collection;

pub use feature_collection::FeatureCollectionParser;

use thiserror::Error;

use crate::geo::LngLat;

/// Fallback used for every missing text attribute at display time.
pub const UNKNOWN_TEXT: &str = "Unknown";

/// Errors that can occur during message parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for field '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Optional descriptive attributes carried by a sample.
///
/// Each field is explicitly optional on the wire. Consumers never read the raw
/// options for display; they go through the accessors, which apply the same
/// fallbacks everywhere (`"Unknown"` for text, `0.0` for altitude).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayAttributes {
    pub name: Option<String>,
    pub altitude: Option<f64>,
    pub pilot: Option<String>,
    pub organization: Option<String>,
}

impl DisplayAttributes {
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_TEXT)
    }

    #[must_use]
    pub fn altitude(&self) -> f64 {
        self.altitude.unwrap_or(0.0)
    }

    #[must_use]
    pub fn pilot(&self) -> &str {
        self.pilot.as_deref().unwrap_or(UNKNOWN_TEXT)
    }

    #[must_use]
    pub fn organization(&self) -> &str {
        self.organization.as_deref().unwrap_or(UNKNOWN_TEXT)
    }
}

/// One telemetry observation for a single vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Unique identifier of the physical vehicle.
    pub serial: String,
    /// Fleet identifier, possibly shared by several serials over time.
    pub registration: String,
    /// Current position.
    pub position: LngLat,
    /// Heading in radians, clockwise from north.
    pub yaw: f64,
    /// Descriptive attributes.
    pub attributes: DisplayAttributes,
    /// Sample time in milliseconds since the Unix epoch.
    ///
    /// Absent on the wire for most gateways; the store fills it in at
    /// ingestion so every stored sample carries a time.
    pub start_time: Option<i64>,
}

impl Sample {
    /// Heading in degrees, not yet corrected for camera bearing.
    #[must_use]
    pub fn heading_degrees(&self) -> f64 {
        self.yaw.to_degrees()
    }
}

/// Trait for protocol parsers.
///
/// Implement this trait to add support for new telemetry feed formats.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a message.
    ///
    /// Returns `Ok(Some(message))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but doesn't produce a message,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}
