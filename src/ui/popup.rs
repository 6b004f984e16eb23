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

use egui::RichText;
use fleet_telemetry::{Sample, ScreenPoint};

use super::{category_color, LABEL_COLOR, VALUE_COLOR};

/// Offset so the popup does not cover the marker it describes.
const POPUP_OFFSET: egui::Vec2 = egui::vec2(14.0, -14.0);

/// Rows shown in the hover popup, with fallbacks applied.
pub fn popup_rows(sample: &Sample) -> [(&'static str, String); 6] {
    let attributes = &sample.attributes;
    [
        ("Name", attributes.name().to_string()),
        ("Serial", sample.serial.clone()),
        ("Registration", sample.registration.clone()),
        ("Altitude", format!("{:.0} m", attributes.altitude())),
        ("Pilot", attributes.pilot().to_string()),
        ("Organization", attributes.organization().to_string()),
    ]
}

/// Draw the hover popup anchored at `position`, relative to `map_rect`.
pub fn show(ctx: &egui::Context, map_rect: egui::Rect, sample: &Sample, position: ScreenPoint) {
    let anchor = map_rect.min + egui::vec2(position.x, position.y) + POPUP_OFFSET;
    if !map_rect.contains(anchor) {
        return;
    }

    egui::Area::new(egui::Id::new("vehicle_popup"))
        .fixed_pos(anchor)
        .pivot(egui::Align2::LEFT_BOTTOM)
        .order(egui::Order::Tooltip)
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::popup(ui.style()).show(ui, |ui| {
                ui.horizontal(|ui| {
                    ui.label(
                        RichText::new("●")
                            .color(category_color(fleet_telemetry::is_allowed(&sample.registration))),
                    );
                    ui.label(RichText::new(&sample.registration).color(VALUE_COLOR).strong());
                });
                egui::Grid::new("vehicle_popup_grid")
                    .num_columns(2)
                    .spacing([8.0, 2.0])
                    .show(ui, |ui| {
                        for (label, value) in popup_rows(sample) {
                            ui.label(RichText::new(label).color(LABEL_COLOR).size(10.0));
                            ui.label(RichText::new(value).size(10.0).monospace());
                            ui.end_row();
                        }
                    });
            });
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_telemetry::{DisplayAttributes, LngLat};

    #[test]
    fn test_missing_attributes_fall_back() {
        let sample = Sample {
            serial: "X1".to_string(),
            registration: "SD-B1".to_string(),
            position: LngLat::new(35.9, 31.9),
            yaw: 0.0,
            attributes: DisplayAttributes {
                pilot: Some("Dana".to_string()),
                ..Default::default()
            },
            start_time: None,
        };

        let rows = popup_rows(&sample);
        assert_eq!(rows[0], ("Name", "Unknown".to_string()));
        assert_eq!(rows[3], ("Altitude", "0 m".to_string()));
        assert_eq!(rows[4], ("Pilot", "Dana".to_string()));
        assert_eq!(rows[5], ("Organization", "Unknown".to_string()));
    }
}
