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

mod app;
mod config;
mod map;
mod network;
mod ui;

use clap::Parser;
use log::{info, warn};

use app::FleetApp;
use config::AppConfig;

/// Live drone fleet telemetry map.
#[derive(Parser, Debug)]
#[command(name = "fleetwatch", version, about)]
struct Cli {
    /// Telemetry feed address (host:port), overrides the saved config
    #[arg(short, long)]
    address: Option<String>,

    /// Initial map zoom level
    #[arg(short, long)]
    zoom: Option<f64>,

    /// Restore the default configuration before starting
    #[arg(long)]
    reset_config: bool,

    /// Disable base map tile downloads
    #[arg(long)]
    no_base_map: bool,
}

fn load_config(cli: &Cli) -> AppConfig {
    let loaded = if cli.reset_config {
        info!("Resetting configuration to defaults");
        AppConfig::reset()
    } else {
        AppConfig::load()
    };

    let mut config = loaded.unwrap_or_else(|e| {
        warn!("Failed to load configuration, using defaults: {e}");
        AppConfig::default()
    });

    if let Some(address) = &cli.address {
        config.server_address.clone_from(address);
    }
    if let Some(zoom) = cli.zoom {
        config.default_zoom = zoom;
    }
    if cli.no_base_map {
        config.show_base_map = false;
    }
    config.sanitized()
}

fn main() -> Result<(), eframe::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(&cli);
    if let Ok(path) = AppConfig::get_config_path() {
        info!("Using configuration at {}", path.display());
    }
    info!("Starting Fleetwatch, feed {}", config.server_address);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1400.0, 860.0])
            .with_title("Fleetwatch"),
        ..Default::default()
    };

    eframe::run_native(
        "Fleetwatch",
        options,
        Box::new(move |cc| Ok(Box::new(FleetApp::new(cc, config)?))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from(["fleetwatch", "--address", "10.0.0.5:9300", "--zoom", "13"]);
        assert_eq!(cli.address.as_deref(), Some("10.0.0.5:9300"));
        assert_eq!(cli.zoom, Some(13.0));
        assert!(!cli.reset_config);
        assert!(!cli.no_base_map);

        let cli = Cli::parse_from(["fleetwatch", "--no-base-map"]);
        assert!(cli.no_base_map);
    }

    #[test]
    fn test_cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
