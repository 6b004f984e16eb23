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

//! UI components for Fleetwatch.
//!
//! Every panel here is a pure consumer of vehicle and fleet records.

pub mod dashboard;
pub mod fleet_list;
pub mod popup;
pub mod status_pane;

pub use dashboard::DashboardPanel;
pub use fleet_list::FleetListPanel;
pub use status_pane::StatusPane;

use egui::Color32;

pub(crate) const HEADER_COLOR: Color32 = Color32::from_rgb(100, 200, 100);
pub(crate) const LABEL_COLOR: Color32 = Color32::from_rgb(150, 150, 150);
pub(crate) const VALUE_COLOR: Color32 = Color32::from_rgb(200, 220, 255);
pub(crate) const DIM_COLOR: Color32 = Color32::from_rgb(110, 110, 110);

/// Marker color for the allowed flag.
pub(crate) fn category_color(allowed: bool) -> Color32 {
    if allowed {
        Color32::from_rgb(46, 204, 113)
    } else {
        Color32::from_rgb(231, 76, 60)
    }
}

/// Local wall-clock time for an epoch millisecond timestamp.
pub(crate) fn local_time(timestamp_ms: i64) -> String {
    use chrono::TimeZone;
    chrono::Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map_or_else(|| "--:--:--".to_string(), |t| t.format("%H:%M:%S").to_string())
}
