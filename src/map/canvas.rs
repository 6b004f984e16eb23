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

//! Painter-backed map renderer.
//!
//! [`MapCanvas`] draws the point and line collections it is handed with the
//! egui painter, owns the camera (center, zoom, bearing) and turns raw pointer
//! input into [`MapEvent`]s for the application to dispatch.

use egui::epaint::Vertex;
use egui::{Color32, FontId, Mesh, PointerButton, Pos2, Rect, Sense, Shape, Stroke, Vec2};
use fleet_telemetry::{LineFeature, LngLat, MapRenderer, PointFeature, RenderError, ScreenPoint};
use log::{debug, info};

use super::projection::{WebMercator, MAX_LATITUDE, TILE_SIZE};
use super::tiles::{tile_zoom, visible_tiles, TileManager};

/// Marker radius in pixels; also the hit-test radius.
pub const ICON_RADIUS: f32 = 10.0;

const MIN_ZOOM: f64 = 2.0;
const MAX_ZOOM: f64 = 19.0;
const FLY_TO_SECONDS: f64 = 1.2;
const ROTATE_DEGREES_PER_PIXEL: f64 = 0.4;

const ALLOWED_COLOR: Color32 = Color32::from_rgb(46, 204, 113);
const DENIED_COLOR: Color32 = Color32::from_rgb(231, 76, 60);
const BACKGROUND_COLOR: Color32 = Color32::from_rgb(24, 28, 34);
const GRID_COLOR: Color32 = Color32::from_rgb(40, 46, 54);

/// 60% opacity for path lines.
const PATH_ALPHA: u8 = 153;

/// Camera position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub center: LngLat,
    pub zoom: f64,
    /// Degrees clockwise from north.
    pub bearing: f64,
}

/// Input-derived events, drained by the application once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MapEvent {
    /// The user started a pan, zoom or rotate gesture.
    MoveStart,
    /// The camera moved, by the user or by an animation.
    Move,
    /// The bearing changed.
    Rotate,
    PointerMove(ScreenPoint),
    PointerLeave,
    Click(ScreenPoint),
}

#[derive(Debug, Clone, Copy)]
struct FlyTo {
    from: Camera,
    to_center: LngLat,
    to_zoom: f64,
    started: Option<f64>,
}

/// Map renderer drawing with the egui painter.
pub struct MapCanvas {
    camera: Camera,
    viewport: Vec2,
    points: Vec<PointFeature>,
    lines: Vec<LineFeature>,
    initialized: bool,
    dragging: bool,
    zooming: bool,
    fly_to: Option<FlyTo>,
    pointer: Option<ScreenPoint>,
    highlighted: Option<String>,
    events: Vec<MapEvent>,
    tiles: Option<TileManager>,
}

impl std::fmt::Debug for MapCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapCanvas")
            .field("camera", &self.camera)
            .field("points", &self.points.len())
            .field("lines", &self.lines.len())
            .field("initialized", &self.initialized)
            .field("base_map", &self.tiles.is_some())
            .finish_non_exhaustive()
    }
}

impl MapCanvas {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            viewport: Vec2::ZERO,
            points: Vec::new(),
            lines: Vec::new(),
            initialized: false,
            dragging: false,
            zooming: false,
            fly_to: None,
            pointer: None,
            highlighted: None,
            events: Vec::new(),
            tiles: None,
        }
    }

    /// Draw raster base map tiles under the graticule.
    #[must_use]
    pub fn with_tiles(mut self, tiles: TileManager) -> Self {
        self.tiles = Some(tiles);
        self
    }

    pub fn camera(&self) -> Camera {
        self.camera
    }

    /// Draw a selection ring around this registration's marker.
    pub fn set_highlighted(&mut self, registration: Option<String>) {
        self.highlighted = registration;
    }

    /// Events produced since the last call.
    pub fn take_events(&mut self) -> Vec<MapEvent> {
        std::mem::take(&mut self.events)
    }

    /// Handle input and paint the map into the remaining space of `ui`.
    pub fn show(&mut self, ui: &mut egui::Ui) -> egui::Response {
        let (response, painter) = ui.allocate_painter(ui.available_size(), Sense::click_and_drag());
        let rect = response.rect;
        self.viewport = rect.size();

        self.handle_drag(&response);
        self.handle_zoom(ui, &response);
        self.handle_pointer(&response, rect);
        self.step_fly_to(ui);

        self.paint(&painter, rect);
        response
    }

    fn handle_drag(&mut self, response: &egui::Response) {
        if response.drag_started() {
            self.dragging = true;
            self.fly_to = None;
            self.events.push(MapEvent::MoveStart);
        }

        let delta = response.drag_delta();
        if response.dragged_by(PointerButton::Primary) && delta != Vec2::ZERO {
            self.pan_by(delta);
            self.events.push(MapEvent::Move);
        } else if response.dragged_by(PointerButton::Secondary) && delta.x.abs() > 0.0 {
            self.rotate_by(f64::from(delta.x) * ROTATE_DEGREES_PER_PIXEL);
        }

        if response.drag_stopped() {
            self.dragging = false;
        }

        if response.double_clicked() && self.camera.bearing.abs() > f64::EPSILON {
            self.rotate_by(-self.camera.bearing);
        }
    }

    fn handle_zoom(&mut self, ui: &egui::Ui, response: &egui::Response) {
        if !response.hovered() {
            self.zooming = false;
            return;
        }

        let (pinch, scroll) = ui.input(|i| (i.zoom_delta(), i.smooth_scroll_delta.y));
        let mut change = 0.0_f64;
        if (pinch - 1.0).abs() > 0.001 {
            change += f64::from(pinch.log2());
        }
        if scroll.abs() > 0.1 {
            change += f64::from(scroll) / 200.0;
        }

        if change.abs() < f64::EPSILON {
            self.zooming = false;
            return;
        }
        if !self.zooming {
            self.zooming = true;
            self.fly_to = None;
            self.events.push(MapEvent::MoveStart);
        }
        self.camera.zoom = (self.camera.zoom + change).clamp(MIN_ZOOM, MAX_ZOOM);
        self.events.push(MapEvent::Move);
    }

    fn handle_pointer(&mut self, response: &egui::Response, rect: Rect) {
        let relative = |pos: Pos2| ScreenPoint::new(pos.x - rect.min.x, pos.y - rect.min.y);

        match response.hover_pos() {
            Some(pos) => {
                let point = relative(pos);
                if self.pointer != Some(point) {
                    self.pointer = Some(point);
                    self.events.push(MapEvent::PointerMove(point));
                }
            }
            None => {
                if self.pointer.take().is_some() {
                    self.events.push(MapEvent::PointerLeave);
                }
            }
        }

        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                self.events.push(MapEvent::Click(relative(pos)));
            }
        }
    }

    fn step_fly_to(&mut self, ui: &egui::Ui) {
        let Some(mut flight) = self.fly_to else {
            return;
        };
        let now = ui.input(|i| i.time);
        let started = *flight.started.get_or_insert(now);
        let t = ((now - started) / FLY_TO_SECONDS).clamp(0.0, 1.0);
        let eased = t * t * (3.0 - 2.0 * t);

        let lerp = |a: f64, b: f64| a + (b - a) * eased;
        self.camera.center = LngLat::new(
            lerp(flight.from.center.longitude, flight.to_center.longitude),
            lerp(flight.from.center.latitude, flight.to_center.latitude),
        );
        self.camera.zoom = lerp(flight.from.zoom, flight.to_zoom);
        self.events.push(MapEvent::Move);

        if t >= 1.0 {
            debug!("Fly-to finished at zoom {:.1}", self.camera.zoom);
            self.fly_to = None;
        } else {
            self.fly_to = Some(flight);
            ui.ctx().request_repaint();
        }
    }

    fn pan_by(&mut self, delta: Vec2) {
        let (cx, cy) = WebMercator::to_pixels(self.camera.center, self.camera.zoom);
        let (dx, dy) = rotate(f64::from(delta.x), f64::from(delta.y), self.camera.bearing);
        let mut center = WebMercator::from_pixels(cx - dx, cy - dy, self.camera.zoom);
        center.latitude = center.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        center.longitude = (center.longitude + 180.0).rem_euclid(360.0) - 180.0;
        self.camera.center = center;
    }

    fn rotate_by(&mut self, degrees: f64) {
        self.camera.bearing = (self.camera.bearing + degrees).rem_euclid(360.0);
        self.events.push(MapEvent::Rotate);
        self.events.push(MapEvent::Move);
    }

    fn paint(&self, painter: &egui::Painter, rect: Rect) {
        painter.rect_filled(rect, 0.0, BACKGROUND_COLOR);
        if let Some(tiles) = &self.tiles {
            self.paint_tiles(painter, rect, tiles);
        }
        self.paint_graticule(painter, rect);

        let to_screen = |position: LngLat| {
            let p = self.project(position);
            Pos2::new(rect.min.x + p.x, rect.min.y + p.y)
        };

        for line in &self.lines {
            if line.coordinates.len() < 2 {
                continue;
            }
            let [r, g, b, _] = feature_color(line.allowed).to_array();
            let color = Color32::from_rgba_unmultiplied(r, g, b, PATH_ALPHA);
            let points: Vec<Pos2> = line.coordinates.iter().map(|c| to_screen(*c)).collect();
            painter.add(Shape::line(points, Stroke::new(3.0, color)));
        }

        for point in &self.points {
            let center = to_screen(point.position);
            if !rect.expand(ICON_RADIUS * 2.0).contains(center) {
                continue;
            }
            self.paint_marker(painter, center, point);
        }

        painter.text(
            rect.left_bottom() + egui::vec2(10.0, -10.0),
            egui::Align2::LEFT_BOTTOM,
            format!(
                "{:.4}, {:.4}  z{:.1}  {:.0}°",
                self.camera.center.latitude,
                self.camera.center.longitude,
                self.camera.zoom,
                self.camera.bearing
            ),
            FontId::monospace(10.0),
            Color32::from_gray(140),
        );
    }

    fn paint_marker(&self, painter: &egui::Painter, center: Pos2, point: &PointFeature) {
        let color = feature_color(point.allowed);

        if self.highlighted.as_deref() == Some(point.registration.as_str()) {
            painter.circle_stroke(center, ICON_RADIUS + 4.0, Stroke::new(2.0, Color32::WHITE));
        }
        painter.circle_filled(center, ICON_RADIUS, color);
        painter.circle_stroke(center, ICON_RADIUS, Stroke::new(1.5, Color32::from_gray(20)));

        // Heading arrow, rotation is clockwise from screen-up.
        #[allow(clippy::cast_possible_truncation, reason = "screen-space angles")]
        let angle = point.rotation.to_radians() as f32;
        let dir = egui::vec2(angle.sin(), -angle.cos());
        let side = egui::vec2(-dir.y, dir.x);
        let tip = center + dir * (ICON_RADIUS - 2.0);
        let base = center - dir * (ICON_RADIUS * 0.4);
        painter.add(Shape::convex_polygon(
            vec![tip, base + side * 4.0, base - side * 4.0],
            Color32::from_gray(20),
            Stroke::NONE,
        ));

        painter.text(
            center + egui::vec2(ICON_RADIUS + 4.0, 0.0),
            egui::Align2::LEFT_CENTER,
            &point.registration,
            FontId::proportional(11.0),
            Color32::from_gray(220),
        );
    }

    /// Each tile is a textured quad through the camera rotation.
    #[allow(clippy::cast_precision_loss, reason = "tile indices are small")]
    fn paint_tiles(&self, painter: &egui::Painter, rect: Rect, tiles: &TileManager) {
        let zoom = tile_zoom(self.camera.zoom);
        // Tile edge in screen pixels at the camera zoom.
        let scale = TILE_SIZE * (self.camera.zoom - f64::from(zoom)).exp2();
        let (cx, cy) = WebMercator::to_pixels(self.camera.center, self.camera.zoom);
        let radius = f64::from(rect.size().length()) / 2.0 / scale;

        for tile in visible_tiles(cx / scale, cy / scale, zoom, radius) {
            let Some(texture) = tiles.get_tile(tile.coord, painter.ctx()) else {
                continue;
            };
            let left = tile.column as f64 * scale;
            let top = f64::from(tile.coord.y) * scale;
            let corner = |dx: f64, dy: f64| {
                let p = self.world_to_screen(left + dx * scale, top + dy * scale, cx, cy);
                Pos2::new(rect.min.x + p.x, rect.min.y + p.y)
            };

            let mut mesh = Mesh::with_texture(texture.id());
            for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                #[allow(clippy::cast_possible_truncation, reason = "uv is 0 or 1")]
                let uv = Pos2::new(dx as f32, dy as f32);
                mesh.vertices.push(Vertex {
                    pos: corner(dx, dy),
                    uv,
                    color: Color32::WHITE,
                });
            }
            mesh.add_triangle(0, 1, 2);
            mesh.add_triangle(0, 2, 3);
            painter.add(Shape::mesh(mesh));
        }

        let status = if tiles.has_loading_tiles() {
            "Loading map tiles...".to_string()
        } else {
            match tiles.failed_count() {
                0 => String::new(),
                n => format!("{n} map tiles unavailable"),
            }
        };
        painter.text(
            rect.right_bottom() + egui::vec2(-10.0, -10.0),
            egui::Align2::RIGHT_BOTTOM,
            format!("{status}  © OpenStreetMap contributors, © CARTO").trim_start(),
            FontId::proportional(10.0),
            Color32::from_gray(140),
        );
    }

    /// Screen position of a world pixel at the camera zoom, `(cx, cy)` being the center.
    #[allow(clippy::cast_possible_truncation, reason = "pixel coordinates")]
    fn world_to_screen(&self, x: f64, y: f64, cx: f64, cy: f64) -> ScreenPoint {
        let (dx, dy) = rotate(x - cx, y - cy, -self.camera.bearing);
        ScreenPoint::new(
            self.viewport.x / 2.0 + dx as f32,
            self.viewport.y / 2.0 + dy as f32,
        )
    }

    /// Lines every `step` degrees, over the tiles when there are any.
    fn paint_graticule(&self, painter: &egui::Painter, rect: Rect) {
        let step = grid_step(self.camera.zoom);
        let half = f64::from(rect.width().max(rect.height())) * 0.75;
        let (cx, cy) = WebMercator::to_pixels(self.camera.center, self.camera.zoom);
        let nw = WebMercator::from_pixels(cx - half, cy - half, self.camera.zoom);
        let se = WebMercator::from_pixels(cx + half, cy + half, self.camera.zoom);

        let to_screen = |position: LngLat| {
            let p = self.project(position);
            Pos2::new(rect.min.x + p.x, rect.min.y + p.y)
        };
        let stroke = Stroke::new(1.0, GRID_COLOR);

        let mut lon = (nw.longitude / step).floor() * step;
        while lon <= se.longitude {
            painter.line_segment(
                [
                    to_screen(LngLat::new(lon, nw.latitude)),
                    to_screen(LngLat::new(lon, se.latitude)),
                ],
                stroke,
            );
            lon += step;
        }
        let mut lat = (se.latitude / step).floor() * step;
        while lat <= nw.latitude {
            painter.line_segment(
                [
                    to_screen(LngLat::new(nw.longitude, lat)),
                    to_screen(LngLat::new(se.longitude, lat)),
                ],
                stroke,
            );
            lat += step;
        }
    }
}

impl MapRenderer for MapCanvas {
    fn initialize(&mut self) -> Result<(), RenderError> {
        if !self.camera.center.is_valid() || !self.camera.zoom.is_finite() {
            return Err(RenderError::Initialization(format!(
                "invalid camera {:?}",
                self.camera
            )));
        }
        self.camera.zoom = self.camera.zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        self.initialized = true;
        info!("Map canvas ready at zoom {:.1}", self.camera.zoom);
        Ok(())
    }

    fn set_point_data(&mut self, points: &[PointFeature]) {
        self.points.clear();
        self.points.extend_from_slice(points);
    }

    fn set_line_data(&mut self, lines: &[LineFeature]) {
        self.lines.clear();
        self.lines.extend_from_slice(lines);
    }

    fn query_rendered_points(&self, at: ScreenPoint) -> Vec<String> {
        // Later features are drawn on top.
        self.points
            .iter()
            .rev()
            .filter(|p| self.project(p.position).distance(at) <= ICON_RADIUS)
            .map(|p| p.id.clone())
            .collect()
    }

    fn project(&self, position: LngLat) -> ScreenPoint {
        let (x, y) = WebMercator::to_pixels(position, self.camera.zoom);
        let (cx, cy) = WebMercator::to_pixels(self.camera.center, self.camera.zoom);
        self.world_to_screen(x, y, cx, cy)
    }

    fn bearing(&self) -> f64 {
        self.camera.bearing
    }

    fn fly_to(&mut self, center: LngLat, zoom: f64) {
        debug!("Flying to {center:?} at zoom {zoom:.1}");
        self.fly_to = Some(FlyTo {
            from: self.camera,
            to_center: center,
            to_zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            started: None,
        });
    }

    fn is_interacting(&self) -> bool {
        self.dragging || self.zooming
    }
}

fn feature_color(allowed: u8) -> Color32 {
    if allowed == 1 {
        ALLOWED_COLOR
    } else {
        DENIED_COLOR
    }
}

/// Rotate a screen-space vector clockwise by `degrees`.
fn rotate(x: f64, y: f64, degrees: f64) -> (f64, f64) {
    let (sin, cos) = degrees.to_radians().sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

fn grid_step(zoom: f64) -> f64 {
    match zoom {
        z if z >= 14.0 => 0.01,
        z if z >= 11.0 => 0.05,
        z if z >= 8.0 => 0.5,
        z if z >= 5.0 => 5.0,
        _ => 20.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> MapCanvas {
        let mut canvas = MapCanvas::new(Camera {
            center: LngLat::new(35.9, 31.9),
            zoom: 12.0,
            bearing: 0.0,
        });
        canvas.viewport = Vec2::new(800.0, 600.0);
        canvas.initialize().unwrap();
        canvas
    }

    fn feature(registration: &str, position: LngLat) -> PointFeature {
        PointFeature {
            id: registration.to_string(),
            registration: registration.to_string(),
            serial: format!("{registration}-serial"),
            allowed: 1,
            rotation: 0.0,
            position,
            heading: 0.0,
        }
    }

    #[test]
    fn test_center_projects_to_viewport_middle() {
        let canvas = canvas();
        let p = canvas.project(LngLat::new(35.9, 31.9));
        assert!((p.x - 400.0).abs() < 1e-3);
        assert!((p.y - 300.0).abs() < 1e-3);
    }

    #[test]
    fn test_bearing_rotates_east_to_up() {
        let mut canvas = canvas();
        canvas.camera.bearing = 90.0;
        let p = canvas.project(LngLat::new(35.91, 31.9));
        assert!((p.x - 400.0).abs() < 1e-2);
        assert!(p.y < 300.0);
    }

    #[test]
    fn test_query_hits_within_icon_radius() {
        let mut canvas = canvas();
        canvas.set_point_data(&[feature("SD-B1", LngLat::new(35.9, 31.9))]);

        assert_eq!(
            canvas.query_rendered_points(ScreenPoint::new(405.0, 302.0)),
            vec!["SD-B1".to_string()]
        );
        assert!(canvas
            .query_rendered_points(ScreenPoint::new(430.0, 300.0))
            .is_empty());
    }

    #[test]
    fn test_pan_moves_center_against_drag() {
        let mut canvas = canvas();
        canvas.pan_by(Vec2::new(100.0, 0.0));
        assert!(canvas.camera().center.longitude < 35.9);
    }

    #[test]
    fn test_rotate_emits_events() {
        let mut canvas = canvas();
        canvas.rotate_by(-30.0);
        assert!((canvas.bearing() - 330.0).abs() < 1e-9);
        assert_eq!(canvas.take_events(), vec![MapEvent::Rotate, MapEvent::Move]);
        assert!(canvas.take_events().is_empty());
    }

    #[test]
    fn test_tile_corner_matches_projection() {
        let mut canvas = canvas();
        canvas.camera.bearing = 30.0;
        canvas.camera.zoom = 12.4;

        // North-west corner of the tile under the center, placed the way paint_tiles does.
        let zoom = tile_zoom(canvas.camera.zoom);
        let scale = TILE_SIZE * (canvas.camera.zoom - f64::from(zoom)).exp2();
        let (cx, cy) = WebMercator::to_pixels(canvas.camera.center, canvas.camera.zoom);
        let (column, row) = ((cx / scale).floor(), (cy / scale).floor());
        let placed = canvas.world_to_screen(column * scale, row * scale, cx, cy);

        let corner = WebMercator::from_pixels(column * scale, row * scale, canvas.camera.zoom);
        let projected = canvas.project(corner);
        assert!(placed.distance(projected) < 1e-2);
    }

    #[test]
    fn test_invalid_camera_fails_initialization() {
        let mut canvas = MapCanvas::new(Camera {
            center: LngLat::new(f64::NAN, 0.0),
            zoom: 12.0,
            bearing: 0.0,
        });
        assert!(canvas.initialize().is_err());
    }
}
