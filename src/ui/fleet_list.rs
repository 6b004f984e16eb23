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

//! Selection list, one entry per registration with its flight history.

use chrono::{DateTime, Utc};
use egui::RichText;
use fleet_telemetry::analytics::{flight_duration, format_duration};
use fleet_telemetry::FleetRecord;

use super::{category_color, local_time, DIM_COLOR, HEADER_COLOR, LABEL_COLOR, VALUE_COLOR};

#[derive(Debug)]
pub struct FleetListPanel {
    pub width: f32,
    filter: String,
}

impl FleetListPanel {
    pub fn new(width: f32) -> Self {
        Self {
            width,
            filter: String::new(),
        }
    }

    /// Draw the list. Returns the serial the user clicked, if any.
    pub fn render(
        &mut self,
        ui: &mut egui::Ui,
        fleets: &[FleetRecord],
        selected: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let mut clicked = None;

        ui.label(RichText::new("◈ FLEET").color(HEADER_COLOR).size(14.0).strong());
        ui.label(
            RichText::new(format!("REGISTRATIONS: {}", fleets.len()))
                .color(LABEL_COLOR)
                .size(10.0)
                .monospace(),
        );
        ui.add(
            egui::TextEdit::singleline(&mut self.filter)
                .hint_text("Filter registration")
                .desired_width(f32::INFINITY),
        );
        ui.add_space(4.0);

        let filter = self.filter.trim().to_uppercase();

        egui::ScrollArea::vertical().show(ui, |ui| {
            for fleet in fleets
                .iter()
                .filter(|f| filter.is_empty() || f.registration().to_uppercase().contains(&filter))
            {
                if let Some(serial) = Self::render_fleet(ui, fleet, selected, now) {
                    clicked = Some(serial);
                }
                ui.add_space(3.0);
            }
        });

        clicked
    }

    fn render_fleet(
        ui: &mut egui::Ui,
        fleet: &FleetRecord,
        selected: Option<&str>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let latest = fleet.latest();
        let is_selected = fleet.flights().iter().any(|f| Some(f.serial.as_str()) == selected);
        let mut clicked = None;

        let frame = if is_selected {
            egui::Frame::group(ui.style()).fill(egui::Color32::from_rgba_unmultiplied(100, 140, 180, 90))
        } else {
            egui::Frame::group(ui.style())
        };

        let response = frame
            .show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label(RichText::new("●").color(category_color(fleet.allowed())).size(12.0));
                    ui.label(
                        RichText::new(fleet.registration())
                            .color(VALUE_COLOR)
                            .size(11.0)
                            .monospace()
                            .strong(),
                    );
                    ui.label(
                        RichText::new(format!("│ {}", latest.latest().attributes.name()))
                            .color(LABEL_COLOR)
                            .size(11.0),
                    );
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        ui.label(
                            RichText::new(format_duration(flight_duration(latest, now)))
                                .color(LABEL_COLOR)
                                .size(10.0)
                                .monospace(),
                        );
                    });
                });

                let position = latest.latest().position;
                ui.label(
                    RichText::new(format!("{:>8.4}° {:>9.4}°", position.latitude, position.longitude))
                        .color(DIM_COLOR)
                        .size(8.5)
                        .monospace(),
                );

                egui::CollapsingHeader::new(
                    RichText::new(format!("Flights ({})", fleet.flights().len())).size(9.0),
                )
                .id_salt(("flights", fleet.registration()))
                .show(ui, |ui| {
                    for flight in fleet.flights().iter().rev() {
                        let text = format!(
                            "{}  {} → {}  {} pts",
                            flight.serial,
                            local_time(flight.first_seen),
                            local_time(flight.last_seen),
                            flight.samples
                        );
                        let color = if Some(flight.serial.as_str()) == selected {
                            egui::Color32::from_rgb(255, 80, 80)
                        } else {
                            LABEL_COLOR
                        };
                        if ui
                            .add(
                                egui::Label::new(RichText::new(text).color(color).size(9.0).monospace())
                                    .sense(egui::Sense::click()),
                            )
                            .clicked()
                        {
                            clicked = Some(flight.serial.clone());
                        }
                    }
                });
            })
            .response;

        if clicked.is_none() && response.interact(egui::Sense::click()).clicked() {
            clicked = Some(latest.serial().to_string());
        }
        clicked
    }
}
