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

//! Incremental renderer adapter.
//!
//! Keeps a dense array of point features and one of line features, plus a
//! registration → slot index for each. Slots are mutated in place while the
//! set of registrations is unchanged; any change to that set (or the first
//! load) clears both arrays and rebuilds them from the fleet records. The
//! index is only a cache and can always be rebuilt from the records.
//!
//! Collections are kept even while no renderer is attached; the renderer gets
//! the buffered state as soon as it attaches.

use std::collections::HashMap;

use log::{debug, error, info};

use super::{
    allowed_flag, display_rotation, LineFeature, MapRenderer, PointFeature, RenderError,
};
use crate::fleet::{FleetRecord, MAX_PATH_LENGTH};
use crate::geo::LngLat;
use crate::scheduler::FrameScheduler;

/// Translates fleet records into renderer geometry.
pub struct RenderAdapter<R> {
    renderer: Option<R>,
    points: Vec<PointFeature>,
    lines: Vec<LineFeature>,
    point_index: HashMap<String, usize>,
    line_index: HashMap<String, usize>,
    bearing: f64,
    path_limit: usize,
    loaded: bool,
    rebuilds: u64,
    scheduler: FrameScheduler<RenderAdapter<R>>,
}

impl<R> std::fmt::Debug for RenderAdapter<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderAdapter")
            .field("attached", &self.renderer.is_some())
            .field("points", &self.points.len())
            .field("lines", &self.lines.len())
            .field("bearing", &self.bearing)
            .field("rebuilds", &self.rebuilds)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl<R: MapRenderer + 'static> Default for RenderAdapter<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: MapRenderer + 'static> RenderAdapter<R> {
    /// Create a detached adapter.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path_limit(MAX_PATH_LENGTH)
    }

    #[must_use]
    pub fn with_path_limit(path_limit: usize) -> Self {
        Self {
            renderer: None,
            points: Vec::new(),
            lines: Vec::new(),
            point_index: HashMap::new(),
            line_index: HashMap::new(),
            bearing: 0.0,
            path_limit: path_limit.max(1),
            loaded: false,
            rebuilds: 0,
            scheduler: FrameScheduler::new(),
        }
    }

    /// Initialize and attach a renderer, then hand it everything buffered so far.
    ///
    /// On failure the renderer is dropped and the adapter keeps buffering.
    pub fn attach(&mut self, mut renderer: R) -> Result<(), RenderError> {
        if let Err(e) = renderer.initialize() {
            error!("Map renderer initialization failed: {e}");
            return Err(e);
        }

        self.bearing = renderer.bearing();
        for point in &mut self.points {
            point.rotation = display_rotation(point.heading, self.bearing);
        }
        renderer.set_point_data(&self.points);
        renderer.set_line_data(&self.lines);
        info!(
            "Map renderer attached with {} buffered vehicles",
            self.points.len()
        );

        self.renderer = Some(renderer);
        Ok(())
    }

    /// Detach the renderer, dropping any pending flush.
    pub fn detach(&mut self) -> Option<R> {
        self.scheduler.cancel();
        self.renderer.take()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.renderer.is_some()
    }

    #[must_use]
    pub fn renderer(&self) -> Option<&R> {
        self.renderer.as_ref()
    }

    pub fn renderer_mut(&mut self) -> Option<&mut R> {
        self.renderer.as_mut()
    }

    /// Bring the collections in line with `fleets` and schedule one flush.
    pub fn apply_fleets(&mut self, fleets: &[FleetRecord]) {
        if self.needs_rebuild(fleets) {
            debug!("Rebuilding render collections for {} fleets", fleets.len());
            self.point_index.clear();
            self.line_index.clear();
            self.points.clear();
            self.lines.clear();
            self.rebuilds += 1;
            self.loaded = true;
        }

        for fleet in fleets {
            let latest = fleet.latest().latest();
            self.upsert_point(
                fleet.registration(),
                &latest.serial,
                latest.position,
                latest.heading_degrees(),
            );
            self.upsert_path(fleet.registration(), fleet.path());
        }

        self.schedule_flush();
    }

    fn needs_rebuild(&self, fleets: &[FleetRecord]) -> bool {
        !self.loaded
            || fleets.len() != self.point_index.len()
            || fleets
                .iter()
                .any(|f| !self.point_index.contains_key(f.registration()))
    }

    /// Insert or update the marker for `registration`.
    pub fn upsert_point(
        &mut self,
        registration: &str,
        serial: &str,
        position: LngLat,
        heading_degrees: f64,
    ) {
        let rotation = display_rotation(heading_degrees, self.bearing);
        let allowed = allowed_flag(registration);

        if let Some(&i) = self.point_index.get(registration) {
            let feature = &mut self.points[i];
            feature.position = position;
            feature.heading = heading_degrees;
            feature.rotation = rotation;
            feature.allowed = allowed;
            if feature.serial != serial {
                feature.serial = serial.to_string();
            }
        } else {
            self.point_index
                .insert(registration.to_string(), self.points.len());
            self.points.push(PointFeature {
                id: registration.to_string(),
                registration: registration.to_string(),
                serial: serial.to_string(),
                allowed,
                rotation,
                position,
                heading: heading_degrees,
            });
        }
    }

    /// Insert or update the trailing path for `registration`.
    pub fn upsert_path(&mut self, registration: &str, coordinates: &[LngLat]) {
        let start = coordinates.len().saturating_sub(self.path_limit);
        let tail = &coordinates[start..];
        let allowed = allowed_flag(registration);

        if let Some(&i) = self.line_index.get(registration) {
            let feature = &mut self.lines[i];
            feature.coordinates.clear();
            feature.coordinates.extend_from_slice(tail);
            feature.allowed = allowed;
        } else {
            self.line_index
                .insert(registration.to_string(), self.lines.len());
            self.lines.push(LineFeature {
                registration: registration.to_string(),
                allowed,
                coordinates: tail.to_vec(),
            });
        }
    }

    /// Re-apply the bearing correction to every marker after a camera rotation.
    pub fn set_bearing(&mut self, bearing: f64) {
        self.bearing = bearing;
        for point in &mut self.points {
            point.rotation = display_rotation(point.heading, bearing);
        }
        self.schedule_flush();
    }

    #[must_use]
    pub fn bearing(&self) -> f64 {
        self.bearing
    }

    fn schedule_flush(&mut self) {
        self.scheduler.schedule(Self::push_to_renderer);
    }

    fn push_to_renderer(&mut self) {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.set_point_data(&self.points);
            renderer.set_line_data(&self.lines);
        }
    }

    /// Frame boundary: run the pending flush, if any.
    pub fn on_frame(&mut self) -> bool {
        match self.scheduler.take() {
            Some(job) => {
                job(self);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn has_pending_flush(&self) -> bool {
        self.scheduler.is_pending()
    }

    #[must_use]
    pub fn points(&self) -> &[PointFeature] {
        &self.points
    }

    #[must_use]
    pub fn lines(&self) -> &[LineFeature] {
        &self.lines
    }

    #[must_use]
    pub fn point_slot(&self, registration: &str) -> Option<usize> {
        self.point_index.get(registration).copied()
    }

    #[must_use]
    pub fn line_slot(&self, registration: &str) -> Option<usize> {
        self.line_index.get(registration).copied()
    }

    /// Number of full rebuilds performed so far.
    #[must_use]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::aggregate;
    use crate::geo::ScreenPoint;
    use crate::protocol::{DisplayAttributes, Sample};
    use crate::store::VehicleHistoryStore;

    #[derive(Debug, Default)]
    struct RecordingRenderer {
        fail_init: bool,
        bearing: f64,
        point_sets: usize,
        line_sets: usize,
        last_points: Vec<PointFeature>,
        last_lines: Vec<LineFeature>,
    }

    impl MapRenderer for RecordingRenderer {
        fn initialize(&mut self) -> Result<(), RenderError> {
            if self.fail_init {
                Err(RenderError::Initialization("no GPU".to_string()))
            } else {
                Ok(())
            }
        }

        fn set_point_data(&mut self, points: &[PointFeature]) {
            self.point_sets += 1;
            self.last_points = points.to_vec();
        }

        fn set_line_data(&mut self, lines: &[LineFeature]) {
            self.line_sets += 1;
            self.last_lines = lines.to_vec();
        }

        fn query_rendered_points(&self, _at: ScreenPoint) -> Vec<String> {
            Vec::new()
        }

        fn project(&self, _position: LngLat) -> ScreenPoint {
            ScreenPoint::new(0.0, 0.0)
        }

        fn bearing(&self) -> f64 {
            self.bearing
        }

        fn fly_to(&mut self, _center: LngLat, _zoom: f64) {}

        fn is_interacting(&self) -> bool {
            false
        }
    }

    fn sample(serial: &str, registration: &str, lng: f64, yaw: f64, t: i64) -> Sample {
        Sample {
            serial: serial.to_string(),
            registration: registration.to_string(),
            position: LngLat::new(lng, 31.9),
            yaw,
            attributes: DisplayAttributes::default(),
            start_time: Some(t),
        }
    }

    #[test]
    fn test_updates_mutate_slots_in_place() {
        let mut store = VehicleHistoryStore::default();
        let mut adapter: RenderAdapter<RecordingRenderer> = RenderAdapter::new();
        adapter.attach(RecordingRenderer::default()).unwrap();

        store.ingest_at(sample("X1", "SD-B1", 35.9, 0.0, 1000), 0);
        store.ingest_at(sample("Y1", "SD-C9", 36.0, 0.0, 1000), 0);
        adapter.apply_fleets(&aggregate(store.get_all()));
        assert_eq!(adapter.rebuild_count(), 1);
        let slot = adapter.point_slot("SD-C9").unwrap();

        store.ingest_at(sample("Y1", "SD-C9", 36.1, 0.0, 2000), 0);
        adapter.apply_fleets(&aggregate(store.get_all()));

        assert_eq!(adapter.rebuild_count(), 1);
        assert_eq!(adapter.point_slot("SD-C9"), Some(slot));
        assert_eq!(adapter.points()[slot].position.longitude, 36.1);
        assert_eq!(adapter.lines()[adapter.line_slot("SD-C9").unwrap()].coordinates.len(), 2);
        assert_eq!(adapter.points()[slot].allowed, 0);
    }

    #[test]
    fn test_new_registration_triggers_rebuild() {
        let mut store = VehicleHistoryStore::default();
        let mut adapter: RenderAdapter<RecordingRenderer> = RenderAdapter::new();

        store.ingest_at(sample("X1", "SD-B1", 35.9, 0.0, 1000), 0);
        adapter.apply_fleets(&aggregate(store.get_all()));
        store.ingest_at(sample("X2", "SD-B2", 35.9, 0.0, 1000), 0);
        adapter.apply_fleets(&aggregate(store.get_all()));

        assert_eq!(adapter.rebuild_count(), 2);
        assert_eq!(adapter.points().len(), 2);
        assert_eq!(adapter.lines().len(), 2);
    }

    #[test]
    fn test_one_set_data_per_frame() {
        let mut store = VehicleHistoryStore::default();
        let mut adapter: RenderAdapter<RecordingRenderer> = RenderAdapter::new();
        adapter.attach(RecordingRenderer::default()).unwrap();
        let baseline = adapter.renderer().unwrap().point_sets;

        for t in 0..20 {
            #[allow(clippy::cast_precision_loss, reason = "small test values")]
            let lng = 35.0 + t as f64 * 0.001;
            store.ingest_at(sample("X1", "SD-B1", lng, 0.0, t), 0);
            adapter.apply_fleets(&aggregate(store.get_all()));
        }
        assert!(adapter.has_pending_flush());
        assert!(adapter.on_frame());
        assert!(!adapter.on_frame());

        let renderer = adapter.renderer().unwrap();
        assert_eq!(renderer.point_sets, baseline + 1);
        assert_eq!(renderer.line_sets, baseline + 1);
        // The flush saw the newest state, not the one at first schedule.
        assert_eq!(renderer.last_lines[0].coordinates.len(), 20);
    }

    #[test]
    fn test_buffers_until_renderer_attached() {
        let mut store = VehicleHistoryStore::default();
        let mut adapter: RenderAdapter<RecordingRenderer> = RenderAdapter::new();

        store.ingest_at(sample("X1", "SD-B1", 35.9, 0.0, 1000), 0);
        adapter.apply_fleets(&aggregate(store.get_all()));
        adapter.on_frame();

        adapter.attach(RecordingRenderer::default()).unwrap();
        let renderer = adapter.renderer().unwrap();
        assert_eq!(renderer.last_points.len(), 1);
        assert_eq!(renderer.last_lines.len(), 1);
    }

    #[test]
    fn test_failed_initialization_keeps_buffering() {
        let mut store = VehicleHistoryStore::default();
        let mut adapter: RenderAdapter<RecordingRenderer> = RenderAdapter::new();
        let result = adapter.attach(RecordingRenderer {
            fail_init: true,
            ..Default::default()
        });

        assert!(result.is_err());
        assert!(!adapter.is_attached());
        store.ingest_at(sample("X1", "SD-B1", 35.9, 0.0, 1000), 0);
        adapter.apply_fleets(&aggregate(store.get_all()));
        adapter.on_frame();
        assert_eq!(adapter.points().len(), 1);
    }

    #[test]
    fn test_rotation_is_bearing_relative() {
        let mut store = VehicleHistoryStore::default();
        let mut adapter: RenderAdapter<RecordingRenderer> = RenderAdapter::new();
        adapter
            .attach(RecordingRenderer {
                bearing: 30.0,
                ..Default::default()
            })
            .unwrap();

        store.ingest_at(
            sample("X1", "SD-B1", 35.9, std::f64::consts::FRAC_PI_2, 1000),
            0,
        );
        adapter.apply_fleets(&aggregate(store.get_all()));
        assert!((adapter.points()[0].rotation - 60.0).abs() < 1e-9);

        adapter.set_bearing(90.0);
        assert!(adapter.points()[0].rotation.abs() < 1e-9);
        adapter.on_frame();
        assert!(adapter.renderer().unwrap().last_points[0].rotation.abs() < 1e-9);
    }

    #[test]
    fn test_path_truncated_to_limit() {
        let mut adapter: RenderAdapter<RecordingRenderer> = RenderAdapter::with_path_limit(3);
        let coords: Vec<LngLat> = (0..10)
            .map(|i| LngLat::new(f64::from(i), 0.0))
            .collect();
        adapter.upsert_path("SD-B1", &coords);
        assert_eq!(
            adapter.lines()[0].coordinates,
            vec![
                LngLat::new(7.0, 0.0),
                LngLat::new(8.0, 0.0),
                LngLat::new(9.0, 0.0)
            ]
        );

        adapter.upsert_path("SD-B1", &coords[..2]);
        assert_eq!(adapter.lines()[0].coordinates.len(), 2);
    }

    #[test]
    fn test_detach_cancels_pending_flush() {
        let mut adapter: RenderAdapter<RecordingRenderer> = RenderAdapter::new();
        adapter.attach(RecordingRenderer::default()).unwrap();
        adapter.upsert_point("SD-B1", "X1", LngLat::new(1.0, 1.0), 0.0);
        adapter.set_bearing(10.0);

        assert!(adapter.detach().is_some());
        assert!(!adapter.has_pending_flush());
    }
}
