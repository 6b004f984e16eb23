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

use std::f64::consts::PI;

use fleet_telemetry::LngLat;

/// Edge length of one map tile in pixels.
pub const TILE_SIZE: f64 = 256.0;

/// Latitude limit of the square Web Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// Web Mercator projection utilities
///
/// Zoom is fractional; coordinates are in tile units at that zoom.
pub struct WebMercator;

impl WebMercator {
    /// Convert latitude to Web Mercator Y coordinate
    pub fn lat_to_y(lat: f64, zoom: f64) -> f64 {
        let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
        let n = zoom.exp2();
        let y = (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;
        y * n
    }

    /// Convert longitude to Web Mercator X coordinate
    pub fn lon_to_x(lon: f64, zoom: f64) -> f64 {
        let n = zoom.exp2();
        ((lon + 180.0) / 360.0) * n
    }

    /// Convert tile coordinates back to latitude
    pub fn tile_to_lat(y: f64, zoom: f64) -> f64 {
        let n = zoom.exp2();
        let lat_rad = (PI * (1.0 - 2.0 * y / n)).sinh().atan();
        lat_rad.to_degrees()
    }

    /// Convert tile coordinates back to longitude
    pub fn tile_to_lon(x: f64, zoom: f64) -> f64 {
        let n = zoom.exp2();
        x / n * 360.0 - 180.0
    }

    /// World pixel position of `position` at `zoom`.
    pub fn to_pixels(position: LngLat, zoom: f64) -> (f64, f64) {
        (
            Self::lon_to_x(position.longitude, zoom) * TILE_SIZE,
            Self::lat_to_y(position.latitude, zoom) * TILE_SIZE,
        )
    }

    /// Inverse of [`WebMercator::to_pixels`].
    pub fn from_pixels(x: f64, y: f64, zoom: f64) -> LngLat {
        LngLat::new(
            Self::tile_to_lon(x / TILE_SIZE, zoom),
            Self::tile_to_lat(y / TILE_SIZE, zoom),
        )
    }
}
