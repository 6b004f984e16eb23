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

use chrono::{DateTime, Utc};
use egui::{Color32, RichText};
use fleet_telemetry::{ClientStats, ConnectionState};

use super::{DIM_COLOR, LABEL_COLOR};

/// Requests raised from the status pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusAction {
    /// Reconnect to a new feed address.
    ChangeAddress(String),
    ToggleDashboard,
}

#[derive(Debug)]
pub struct StatusPane {
    pub collapsed: bool,
    address_input: String,
}

impl StatusPane {
    pub fn new(address: &str) -> Self {
        Self {
            collapsed: false,
            address_input: address.to_string(),
        }
    }

    /// Render the status pane as a floating window
    pub fn render(
        &mut self,
        ctx: &egui::Context,
        stats: &ClientStats,
        vehicle_count: usize,
        now: DateTime<Utc>,
    ) -> Option<StatusAction> {
        let mut action = None;

        egui::Window::new("Feed Status")
            .anchor(egui::Align2::LEFT_BOTTOM, egui::vec2(10.0, -10.0))
            .fixed_size(egui::vec2(260.0, if self.collapsed { 30.0 } else { 180.0 }))
            .resizable(false)
            .collapsible(false)
            .title_bar(false)
            .frame(
                egui::Frame::window(&ctx.style())
                    .fill(Color32::from_rgba_unmultiplied(25, 30, 35, 230))
                    .stroke(egui::Stroke::new(1.0, Color32::from_rgb(60, 80, 100)))
                    .corner_radius(6.0),
            )
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    let (color, text, icon) = state_style(&stats.state);
                    ui.label(RichText::new(icon).color(color).size(10.0));
                    ui.label(RichText::new(text).color(color).size(10.0).monospace().strong());

                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let collapse_icon = if self.collapsed { "▲" } else { "▼" };
                        if ui.button(RichText::new(collapse_icon).size(10.0)).clicked() {
                            self.collapsed = !self.collapsed;
                        }
                        if ui
                            .button(RichText::new("📊").size(10.0))
                            .on_hover_text("Toggle dashboard")
                            .clicked()
                        {
                            action = Some(StatusAction::ToggleDashboard);
                        }
                    });
                });

                if self.collapsed {
                    return;
                }
                ui.separator();

                ui.horizontal(|ui| {
                    let response = ui.add(
                        egui::TextEdit::singleline(&mut self.address_input)
                            .desired_width(170.0)
                            .font(egui::TextStyle::Monospace),
                    );
                    let submitted =
                        response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                    if ui.button("Connect").clicked() || submitted {
                        let address = self.address_input.trim().to_string();
                        if !address.is_empty() {
                            action = Some(StatusAction::ChangeAddress(address));
                        }
                    }
                });

                metric(ui, "Vehicles:", vehicle_count.to_string());
                metric(ui, "Messages:", stats.messages_received.to_string());
                metric(ui, "Ingested:", stats.samples_ingested.to_string());
                metric(ui, "Dropped:", stats.samples_dropped.to_string());
                metric(
                    ui,
                    "Last msg:",
                    stats.last_message.map_or_else(
                        || "never".to_string(),
                        |t| format!("{}s ago", (now - t).num_seconds().max(0)),
                    ),
                );
            });

        action
    }
}

fn metric(ui: &mut egui::Ui, label: &str, value: String) {
    ui.horizontal(|ui| {
        ui.label(RichText::new(label).color(LABEL_COLOR).size(9.0));
        ui.label(RichText::new(value).color(Color32::from_rgb(200, 200, 200)).size(9.0).monospace());
    });
}

fn state_style(state: &ConnectionState) -> (Color32, String, &'static str) {
    match state {
        ConnectionState::Connected => (Color32::from_rgb(100, 255, 100), "CONNECTED".to_string(), "●"),
        ConnectionState::Connecting => (Color32::from_rgb(255, 200, 100), "CONNECTING".to_string(), "◐"),
        ConnectionState::Disconnected => (DIM_COLOR, "DISCONNECTED".to_string(), "○"),
        ConnectionState::Error(e) => (Color32::from_rgb(255, 100, 100), format!("ERROR: {e}"), "✕"),
    }
}
