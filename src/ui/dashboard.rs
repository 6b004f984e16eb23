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

//! Dashboard panel: KPIs, per-minute activity chart and recent vehicles.

use chrono::{DateTime, Utc};
use egui::RichText;
use egui_plot::{Bar, BarChart, Plot};
use fleet_telemetry::analytics::{
    active_now, activity_per_minute, allowed_count, average_altitude, category_split,
    flight_duration, format_duration, recent_vehicles, top_registrations, ActivityBucket,
    CategorySplit,
};
use fleet_telemetry::{FleetRecord, VehicleRecord};

use super::{category_color, local_time, HEADER_COLOR, LABEL_COLOR, VALUE_COLOR};

const ACTIVITY_MINUTES: u32 = 60;
const TOP_REGISTRATIONS: usize = 5;
const RECENT_VEHICLES: usize = 8;

#[derive(Debug)]
pub struct DashboardPanel {
    pub visible: bool,
}

impl DashboardPanel {
    pub fn new(visible: bool) -> Self {
        Self { visible }
    }

    pub fn render(
        &self,
        ui: &mut egui::Ui,
        records: &[VehicleRecord],
        fleets: &[FleetRecord],
        now: DateTime<Utc>,
    ) {
        ui.label(RichText::new("◈ DASHBOARD").color(HEADER_COLOR).size(14.0).strong());
        ui.add_space(4.0);

        ui.horizontal(|ui| {
            kpi(ui, "ACTIVE", active_now(records, now).to_string());
            kpi(
                ui,
                "TODAY",
                fleet_telemetry::analytics::unique_today(records, now).to_string(),
            );
            kpi(
                ui,
                "AVG ALT",
                average_altitude(records).map_or_else(|| "--".to_string(), |a| format!("{a:.0} m")),
            );
            kpi(ui, "FLYING", allowed_count(fleets).to_string());
        });

        ui.add_space(6.0);
        ui.columns(2, |columns| {
            columns[0].label(RichText::new("ACTIVITY / MIN").color(LABEL_COLOR).size(9.0).strong());
            activity_chart(&mut columns[0], &activity_per_minute(records, now, ACTIVITY_MINUTES));

            columns[1].label(RichText::new("ALLOWED VS NOT").color(LABEL_COLOR).size(9.0).strong());
            category_chart(&mut columns[1], category_split(records));
        });

        ui.add_space(6.0);
        ui.columns(2, |columns| {
            columns[0].label(RichText::new("TOP REGISTRATIONS").color(LABEL_COLOR).size(9.0).strong());
            for row in top_registrations(records, TOP_REGISTRATIONS) {
                columns[0].horizontal(|ui| {
                    ui.label(
                        RichText::new("●")
                            .color(category_color(fleet_telemetry::is_allowed(&row.registration)))
                            .size(9.0),
                    );
                    ui.label(RichText::new(&row.registration).color(VALUE_COLOR).size(10.0).monospace());
                    ui.label(RichText::new(format!("{} pts", row.samples)).color(LABEL_COLOR).size(9.0));
                });
            }

            columns[1].label(RichText::new("RECENT").color(LABEL_COLOR).size(9.0).strong());
            for record in recent_vehicles(records, RECENT_VEHICLES) {
                columns[1].horizontal(|ui| {
                    ui.label(RichText::new(record.serial()).color(VALUE_COLOR).size(10.0).monospace());
                    ui.label(
                        RichText::new(format!(
                            "{} {}",
                            local_time(record.last_seen()),
                            format_duration(flight_duration(record, now))
                        ))
                        .color(LABEL_COLOR)
                        .size(9.0)
                        .monospace(),
                    );
                });
            }
        });
    }
}

#[allow(clippy::cast_precision_loss, reason = "vehicle counts are small")]
fn category_chart(ui: &mut egui::Ui, split: CategorySplit) {
    let share = split.allowed_share();
    ui.label(
        RichText::new(share.map_or_else(
            || "no vehicles".to_string(),
            |s| format!("allowed {:.0}%  not allowed {:.0}%", s * 100.0, (1.0 - s) * 100.0),
        ))
        .color(VALUE_COLOR)
        .size(9.0)
        .monospace(),
    );

    Plot::new("category_split")
        .height(94.0)
        .allow_drag(false)
        .allow_zoom(false)
        .allow_scroll(false)
        .allow_boxed_zoom(false)
        .show_axes([false, true])
        .include_y(0.0)
        .include_x(-0.6)
        .include_x(1.6)
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(
                BarChart::new("Allowed", vec![Bar::new(0.0, split.allowed as f64).width(0.7)])
                    .color(category_color(true)),
            );
            plot_ui.bar_chart(
                BarChart::new("Not allowed", vec![Bar::new(1.0, split.not_allowed as f64).width(0.7)])
                    .color(category_color(false)),
            );
        });
}

fn kpi(ui: &mut egui::Ui, label: &str, value: String) {
    egui::Frame::group(ui.style()).show(ui, |ui| {
        ui.vertical(|ui| {
            ui.label(RichText::new(label).color(LABEL_COLOR).size(9.0));
            ui.label(RichText::new(value).color(VALUE_COLOR).size(16.0).strong());
        });
    });
}

#[allow(clippy::cast_precision_loss, reason = "bucket counts are small")]
fn activity_chart(ui: &mut egui::Ui, buckets: &[ActivityBucket]) {
    let bars: Vec<Bar> = buckets
        .iter()
        .enumerate()
        .map(|(i, bucket)| {
            Bar::new(i as f64, bucket.registrations as f64)
                .width(0.8)
                .name(&bucket.label)
        })
        .collect();

    Plot::new("activity_per_minute")
        .height(110.0)
        .allow_drag(false)
        .allow_zoom(false)
        .allow_scroll(false)
        .allow_boxed_zoom(false)
        .show_axes([false, true])
        .include_y(0.0)
        .show(ui, |plot_ui| {
            plot_ui.bar_chart(
                BarChart::new("registrations", bars).color(egui::Color32::from_rgb(46, 204, 113)),
            );
        });
}
