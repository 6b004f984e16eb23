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

//! The eframe application.
//!
//! Each frame: pick up store changes, re-aggregate fleets, flush the render
//! adapter, draw the map and panels, then feed map input back through the
//! interaction layer.

use std::io;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use fleet_telemetry::{
    aggregate, Client, FleetRecord, InteractionLayer, MapRenderer, RenderAdapter,
    VehicleHistoryStore, VehicleRecord,
};
use log::{info, warn};

use crate::config::AppConfig;
use crate::map::{Camera, MapCanvas, MapEvent, TileManager};
use crate::network::TelemetryRuntime;
use crate::ui::status_pane::StatusAction;
use crate::ui::{popup, DashboardPanel, FleetListPanel, StatusPane};

pub struct FleetApp {
    config: AppConfig,
    runtime: TelemetryRuntime,
    client: Client,
    store: Arc<RwLock<VehicleHistoryStore>>,
    adapter: RenderAdapter<MapCanvas>,
    interaction: InteractionLayer,
    records: Vec<VehicleRecord>,
    fleets: Vec<FleetRecord>,
    seen_version: Option<u64>,
    map_rect: egui::Rect,
    fleet_list: FleetListPanel,
    dashboard: DashboardPanel,
    status: StatusPane,
}

impl std::fmt::Debug for FleetApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetApp")
            .field("client", &self.client)
            .field("adapter", &self.adapter)
            .field("fleets", &self.fleets.len())
            .finish_non_exhaustive()
    }
}

impl FleetApp {
    pub fn new(cc: &eframe::CreationContext<'_>, config: AppConfig) -> io::Result<Self> {
        let ctx = cc.egui_ctx.clone();
        let mut client_config = config.client_config();
        client_config.on_ingest = Some(Arc::new(move || ctx.request_repaint()));

        let (runtime, client) = TelemetryRuntime::start(client_config)?;
        let store = client.store();

        let mut adapter = RenderAdapter::new();
        let mut canvas = MapCanvas::new(Camera {
            center: config.center(),
            zoom: config.default_zoom,
            bearing: 0.0,
        });
        if config.show_base_map {
            canvas = canvas.with_tiles(TileManager::new());
        }
        if let Err(e) = adapter.attach(canvas) {
            warn!("Map view disabled, panels keep running: {e}");
        }

        Ok(Self {
            interaction: InteractionLayer::new(config.fly_to_zoom),
            fleet_list: FleetListPanel::new(config.fleet_list_width),
            dashboard: DashboardPanel::new(config.show_dashboard),
            status: StatusPane::new(&config.server_address),
            config,
            runtime,
            client,
            store,
            adapter,
            records: Vec::new(),
            fleets: Vec::new(),
            seen_version: None,
            map_rect: egui::Rect::NOTHING,
        })
    }

    /// Re-aggregate if the store changed since the last frame.
    fn refresh_records(&mut self) {
        {
            let Ok(store) = self.store.read() else {
                return;
            };
            let version = store.version();
            if self.seen_version == Some(version) {
                return;
            }
            self.seen_version = Some(version);
            self.records = store.snapshot();
        }

        self.fleets = aggregate(&self.records);
        self.adapter.apply_fleets(&self.fleets);

        if let Some(canvas) = self.adapter.renderer() {
            let mut store = match self.store.write() {
                Ok(store) => store,
                Err(poisoned) => poisoned.into_inner(),
            };
            self.interaction.refresh_hover(&self.fleets, canvas, &mut store);
        }
    }

    fn selected(&self) -> Option<(String, String)> {
        let store = self.store.read().ok()?;
        let serial = store.selected()?;
        let registration = store.get(serial)?.registration().to_string();
        Some((serial.to_string(), registration))
    }

    fn select(&mut self, serial: String) {
        info!("Selected {serial} from the fleet list");
        let mut store = match self.store.write() {
            Ok(store) => store,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.interaction.select_serial(Some(serial), &mut store);
    }

    fn draw_map(&mut self, ui: &mut egui::Ui, highlighted: Option<String>) {
        // Frame boundary for the render adapter.
        self.adapter.on_frame();

        let Some(canvas) = self.adapter.renderer_mut() else {
            ui.centered_and_justified(|ui| {
                ui.label("Map unavailable");
            });
            return;
        };
        canvas.set_highlighted(highlighted);
        let response = canvas.show(ui);
        let events = canvas.take_events();
        self.map_rect = response.rect;

        self.dispatch(events);

        if let Some(canvas) = self.adapter.renderer_mut() {
            let store = match self.store.read() {
                Ok(store) => store,
                Err(poisoned) => poisoned.into_inner(),
            };
            if self.interaction.update_fly_to(canvas, &store) {
                ui.ctx().request_repaint();
            }
        }

        if self.adapter.has_pending_flush() {
            ui.ctx().request_repaint();
        }
    }

    fn dispatch(&mut self, events: Vec<MapEvent>) {
        if events.is_empty() {
            return;
        }
        let mut store = match self.store.write() {
            Ok(store) => store,
            Err(poisoned) => poisoned.into_inner(),
        };

        for event in events {
            let Some(canvas) = self.adapter.renderer() else {
                return;
            };
            match event {
                MapEvent::MoveStart => self.interaction.on_move_start(&mut store),
                MapEvent::Move => self.interaction.on_camera_move(&self.fleets, canvas, &mut store),
                MapEvent::Rotate => {
                    let bearing = canvas.bearing();
                    self.adapter.set_bearing(bearing);
                }
                MapEvent::PointerMove(at) => {
                    self.interaction
                        .on_pointer_move(at, &self.fleets, canvas, &mut store);
                }
                MapEvent::PointerLeave => self.interaction.on_pointer_leave(&mut store),
                MapEvent::Click(at) => self.interaction.on_click(at, &self.fleets, canvas, &mut store),
            }
        }
    }

    fn show_popup(&self, ctx: &egui::Context) {
        let Ok(store) = self.store.read() else {
            return;
        };
        if let (Some(sample), Some(position)) = (store.hovered(), store.hover_position()) {
            popup::show(ctx, self.map_rect, sample, position);
        }
    }

    fn handle_status_action(&mut self, action: StatusAction) {
        match action {
            StatusAction::ChangeAddress(address) => {
                if address == self.client.current_address() {
                    return;
                }
                info!("Switching telemetry feed to {address}");
                self.client.set_address(address.clone());
                self.config.server_address = address;
            }
            StatusAction::ToggleDashboard => {
                self.dashboard.visible = !self.dashboard.visible;
                self.config.show_dashboard = self.dashboard.visible;
            }
        }
        if let Err(e) = self.config.save() {
            warn!("Failed to save configuration: {e}");
        }
    }

    fn shutdown(&mut self) {
        info!("Shutting down");
        self.client.shutdown();
        if let Some(canvas) = self.adapter.detach() {
            // Reopen where the user left off.
            let camera = canvas.camera();
            self.config.default_center = [camera.center.longitude, camera.center.latitude];
            self.config.default_zoom = camera.zoom;
            if let Err(e) = self.config.save() {
                warn!("Failed to save map view: {e}");
            }
        }
        self.runtime.stop();
    }
}

impl eframe::App for FleetApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Flight durations tick even without new telemetry.
        ctx.request_repaint_after(Duration::from_secs(1));

        let now = Utc::now();
        self.refresh_records();
        let selected = self.selected();

        let stats = self.client.stats();
        if let Some(action) = self.status.render(ctx, &stats, self.records.len(), now) {
            self.handle_status_action(action);
        }

        let clicked = egui::SidePanel::right("fleet_list")
            .default_width(self.fleet_list.width)
            .resizable(true)
            .show(ctx, |ui| {
                self.fleet_list.render(
                    ui,
                    &self.fleets,
                    selected.as_ref().map(|(serial, _)| serial.as_str()),
                    now,
                )
            })
            .inner;
        if let Some(serial) = clicked {
            self.select(serial);
        }

        if self.dashboard.visible {
            egui::TopBottomPanel::bottom("dashboard")
                .resizable(true)
                .default_height(280.0)
                .show(ctx, |ui| {
                    self.dashboard.render(ui, &self.records, &self.fleets, now);
                });
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                self.draw_map(ui, selected.map(|(_, registration)| registration));
            });

        self.show_popup(ctx);
    }
}

impl Drop for FleetApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}
