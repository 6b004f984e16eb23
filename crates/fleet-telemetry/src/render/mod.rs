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

//! Renderer boundary.
//!
//! The map engine is abstracted behind [`MapRenderer`]: it receives whole
//! point and line collections, answers pixel hit-tests, projects world
//! coordinates and owns the camera. [`RenderAdapter`] turns fleet records into
//! those collections incrementally.

mod adapter;

pub use adapter::RenderAdapter;

use thiserror::Error;

use crate::geo::{LngLat, ScreenPoint};

/// Zoom level used when flying the camera to a selected vehicle.
pub const FLY_TO_ZOOM: f64 = 15.0;

/// Errors raised by a renderer backend.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer failed to initialize: {0}")]
    Initialization(String),
}

/// One vehicle marker, keyed by registration.
#[derive(Debug, Clone, PartialEq)]
pub struct PointFeature {
    /// Feature id; equal to the registration.
    pub id: String,
    pub registration: String,
    pub serial: String,
    /// 1 selects the "allowed" icon, 0 the other one.
    pub allowed: u8,
    /// Icon rotation in degrees, relative to the current camera bearing.
    pub rotation: f64,
    pub position: LngLat,
    /// Raw heading in degrees before bearing correction.
    pub heading: f64,
}

/// One trailing path, keyed by registration.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFeature {
    pub registration: String,
    pub allowed: u8,
    pub coordinates: Vec<LngLat>,
}

/// Opaque point/line renderer.
pub trait MapRenderer {
    /// Register the point and line sources and their layers.
    fn initialize(&mut self) -> Result<(), RenderError>;

    /// Replace the point source contents.
    fn set_point_data(&mut self, points: &[PointFeature]);

    /// Replace the line source contents.
    fn set_line_data(&mut self, lines: &[LineFeature]);

    /// Ids of the point features drawn under `at`, topmost first.
    fn query_rendered_points(&self, at: ScreenPoint) -> Vec<String>;

    /// World to viewport pixel projection.
    fn project(&self, position: LngLat) -> ScreenPoint;

    /// Camera bearing in degrees, clockwise from north.
    fn bearing(&self) -> f64;

    /// Start an animated camera move.
    fn fly_to(&mut self, center: LngLat, zoom: f64);

    /// Whether the user is currently dragging, rotating or zooming.
    fn is_interacting(&self) -> bool;
}

/// Encode the allowed flag the way the layers expect it.
#[must_use]
pub fn allowed_flag(registration: &str) -> u8 {
    u8::from(crate::fleet::is_allowed(registration))
}

/// Heading corrected for the camera bearing, normalized to `[0, 360)`.
#[must_use]
pub fn display_rotation(heading_degrees: f64, bearing_degrees: f64) -> f64 {
    (heading_degrees - bearing_degrees).rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_flag() {
        assert_eq!(allowed_flag("SD-B1"), 1);
        assert_eq!(allowed_flag("SD-C9"), 0);
    }

    #[test]
    fn test_display_rotation() {
        assert!((display_rotation(90.0, 30.0) - 60.0).abs() < 1e-9);
        assert!((display_rotation(0.0, 30.0) - 330.0).abs() < 1e-9);
        assert!((display_rotation(370.0, 0.0) - 10.0).abs() < 1e-9);
    }
}
