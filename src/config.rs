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

//! Application configuration management.
//!
//! Settings are persisted as TOML through `confy`. Every field has a serde
//! default so older or hand-edited files keep loading as fields are added.

use std::time::Duration;

use fleet_telemetry::render::FLY_TO_ZOOM;
use fleet_telemetry::{ClientConfig, ConnectionConfig, LngLat};
use log::info;
use serde::{Deserialize, Serialize};

pub(crate) const APP_NAME: &str = "fleetwatch";
const CONFIG_NAME: &str = "config";

/// Default telemetry gateway address.
pub const DEFAULT_SERVER_ADDRESS: &str = "localhost:9300";

/// Current schema version.
const CONFIG_VERSION: u32 = 1;

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Telemetry feed address in host:port format
    #[serde(default = "default_server_address")]
    pub server_address: String,

    /// Initial map center as `[longitude, latitude]`
    #[serde(default = "default_center")]
    pub default_center: [f64; 2],

    /// Initial map zoom level
    #[serde(default = "default_zoom")]
    pub default_zoom: f64,

    /// Zoom level used when flying to a selected vehicle
    #[serde(default = "default_fly_to_zoom")]
    pub fly_to_zoom: f64,

    /// First reconnect delay; later attempts grow linearly
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Reconnect delay cap
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Show the dashboard panel at startup
    #[serde(default = "default_true")]
    pub show_dashboard: bool,

    /// Fleet list panel width in pixels
    #[serde(default = "default_fleet_list_width")]
    pub fleet_list_width: f32,

    /// Draw downloaded base map tiles under the markers
    #[serde(default = "default_true")]
    pub show_base_map: bool,
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

fn default_server_address() -> String {
    DEFAULT_SERVER_ADDRESS.to_string()
}

fn default_center() -> [f64; 2] {
    [35.91, 31.95]
}

fn default_zoom() -> f64 {
    11.0
}

fn default_fly_to_zoom() -> f64 {
    FLY_TO_ZOOM
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_fleet_list_width() -> f32 {
    320.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            server_address: default_server_address(),
            default_center: default_center(),
            default_zoom: default_zoom(),
            fly_to_zoom: default_fly_to_zoom(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            show_dashboard: true,
            fleet_list_width: default_fleet_list_width(),
            show_base_map: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating it with defaults if missing.
    pub fn load() -> Result<Self, confy::ConfyError> {
        let mut config: AppConfig = confy::load(APP_NAME, CONFIG_NAME)?;

        if config.config_version < CONFIG_VERSION {
            info!(
                "Upgrading configuration from version {} to {CONFIG_VERSION}",
                config.config_version
            );
            config.config_version = CONFIG_VERSION;
            config.save()?;
        }

        Ok(config.sanitized())
    }

    /// Overwrite the stored configuration with defaults.
    pub fn reset() -> Result<Self, confy::ConfyError> {
        let config = Self::default();
        config.save()?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Replace out-of-range values with their defaults.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        if !self.center().is_valid() {
            self.default_center = default_center();
        }
        if !(0.0..=22.0).contains(&self.default_zoom) {
            self.default_zoom = default_zoom();
        }
        if !(0.0..=22.0).contains(&self.fly_to_zoom) {
            self.fly_to_zoom = default_fly_to_zoom();
        }
        if self.reconnect_delay_ms == 0 {
            self.reconnect_delay_ms = default_reconnect_delay_ms();
        }
        self.max_reconnect_delay_ms = self.max_reconnect_delay_ms.max(self.reconnect_delay_ms);
        self
    }

    #[must_use]
    pub fn center(&self) -> LngLat {
        LngLat::from(self.default_center)
    }

    /// Client settings derived from this configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connection: ConnectionConfig {
                address: self.server_address.clone(),
                reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
                max_reconnect_delay: Duration::from_millis(self.max_reconnect_delay_ms),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: AppConfig = toml::from_str("server_address = \"10.0.0.5:9300\"").unwrap();
        assert_eq!(config.server_address, "10.0.0.5:9300");
        assert_eq!(config.reconnect_delay_ms, 1_000);
        assert_eq!(config.max_reconnect_delay_ms, 5_000);
        assert!(config.show_dashboard);
        assert!(config.show_base_map);
    }

    #[test]
    fn test_sanitized_repairs_bad_values() {
        let config = AppConfig {
            default_center: [500.0, 0.0],
            default_zoom: 99.0,
            reconnect_delay_ms: 3_000,
            max_reconnect_delay_ms: 1_000,
            ..Default::default()
        }
        .sanitized();

        assert_eq!(config.default_center, default_center());
        assert!((config.default_zoom - default_zoom()).abs() < f64::EPSILON);
        assert_eq!(config.max_reconnect_delay_ms, 3_000);
    }

    #[test]
    fn test_client_config_uses_backoff_settings() {
        let client = AppConfig::default().client_config();
        assert_eq!(client.connection.address, DEFAULT_SERVER_ADDRESS);
        assert_eq!(client.connection.backoff(2), Duration::from_secs(2));
        assert_eq!(client.connection.backoff(9), Duration::from_secs(5));
    }
}
