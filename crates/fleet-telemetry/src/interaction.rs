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

//! Selection and hover handling.
//!
//! Links renderer hit-tests to the store's selection and hover fields.
//!
//! Hover: `Idle → Hovering(registration)` when the pointer is over a marker,
//! back to `Idle` when it leaves or a pan/zoom starts. While hovering, the
//! popup position follows the marker on every camera move and every new tick.
//!
//! Selection: a click selects the serial flying the clicked registration and
//! arms a one-shot fly-to. Any pan/zoom start deselects. The fly-to waits while
//! the user is interacting with the camera.

use log::debug;

use crate::fleet::{find_by_registration, FleetRecord};
use crate::geo::ScreenPoint;
use crate::render::{MapRenderer, FLY_TO_ZOOM};
use crate::store::VehicleHistoryStore;

/// Hover state machine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HoverState {
    #[default]
    Idle,
    Hovering(String),
}

/// Pointer and camera event handling for the map.
#[derive(Debug)]
pub struct InteractionLayer {
    hover: HoverState,
    pending_fly_to: Option<String>,
    fly_to_zoom: f64,
}

impl Default for InteractionLayer {
    fn default() -> Self {
        Self::new(FLY_TO_ZOOM)
    }
}

impl InteractionLayer {
    #[must_use]
    pub fn new(fly_to_zoom: f64) -> Self {
        Self {
            hover: HoverState::Idle,
            pending_fly_to: None,
            fly_to_zoom,
        }
    }

    #[must_use]
    pub fn hover_state(&self) -> &HoverState {
        &self.hover
    }

    /// Serial whose fly-to has not run yet.
    #[must_use]
    pub fn pending_fly_to(&self) -> Option<&str> {
        self.pending_fly_to.as_deref()
    }

    /// Pointer moved over the map.
    pub fn on_pointer_move<R: MapRenderer + ?Sized>(
        &mut self,
        at: ScreenPoint,
        fleets: &[FleetRecord],
        renderer: &R,
        store: &mut VehicleHistoryStore,
    ) {
        let hits = renderer.query_rendered_points(at);
        let Some(registration) = hits.first() else {
            self.clear_hover(store);
            return;
        };
        let Some(fleet) = find_by_registration(fleets, registration) else {
            return;
        };

        self.hover = HoverState::Hovering(fleet.registration().to_string());
        Self::show_popup(fleet, renderer, store);
    }

    /// Pointer left the map area.
    pub fn on_pointer_leave(&mut self, store: &mut VehicleHistoryStore) {
        self.clear_hover(store);
    }

    /// Pointer clicked on the map.
    pub fn on_click<R: MapRenderer + ?Sized>(
        &mut self,
        at: ScreenPoint,
        fleets: &[FleetRecord],
        renderer: &R,
        store: &mut VehicleHistoryStore,
    ) {
        let hits = renderer.query_rendered_points(at);
        let Some(fleet) = hits
            .first()
            .and_then(|registration| find_by_registration(fleets, registration))
        else {
            return;
        };

        let serial = fleet.latest().serial().to_string();
        debug!("Selected {} via map click", serial);
        self.select_serial(Some(serial), store);
    }

    /// Select a serial (from the map or the fleet list), arming a fly-to.
    pub fn select_serial(&mut self, serial: Option<String>, store: &mut VehicleHistoryStore) {
        self.pending_fly_to.clone_from(&serial);
        store.set_selected(serial);
    }

    /// A pan or zoom gesture started: deselect and drop the hover popup.
    pub fn on_move_start(&mut self, store: &mut VehicleHistoryStore) {
        self.pending_fly_to = None;
        store.set_selected(None);
        self.clear_hover(store);
    }

    /// The camera moved; keep the popup pinned to the hovered marker.
    pub fn on_camera_move<R: MapRenderer + ?Sized>(
        &mut self,
        fleets: &[FleetRecord],
        renderer: &R,
        store: &mut VehicleHistoryStore,
    ) {
        self.refresh_hover(fleets, renderer, store);
    }

    /// Re-read the hovered fleet from the current records.
    pub fn refresh_hover<R: MapRenderer + ?Sized>(
        &mut self,
        fleets: &[FleetRecord],
        renderer: &R,
        store: &mut VehicleHistoryStore,
    ) {
        let HoverState::Hovering(registration) = &self.hover else {
            return;
        };
        match find_by_registration(fleets, registration) {
            Some(fleet) => Self::show_popup(fleet, renderer, store),
            None => self.clear_hover(store),
        }
    }

    /// Run the pending fly-to unless the user is moving the camera.
    ///
    /// Returns `true` if the camera was told to fly.
    pub fn update_fly_to<R: MapRenderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        store: &VehicleHistoryStore,
    ) -> bool {
        let Some(serial) = self.pending_fly_to.as_deref() else {
            return false;
        };
        if renderer.is_interacting() {
            return false;
        }

        if let Some(record) = store.get(serial) {
            renderer.fly_to(record.latest().position, self.fly_to_zoom);
        } else {
            debug!("Selected serial {} is no longer tracked", serial);
        }
        self.pending_fly_to = None;
        true
    }

    fn show_popup<R: MapRenderer + ?Sized>(
        fleet: &FleetRecord,
        renderer: &R,
        store: &mut VehicleHistoryStore,
    ) {
        let latest = fleet.latest().latest();
        store.set_hover_position(Some(renderer.project(latest.position)));
        store.set_hovered(Some(latest.clone()));
    }

    fn clear_hover(&mut self, store: &mut VehicleHistoryStore) {
        self.hover = HoverState::Idle;
        store.set_hovered(None);
        store.set_hover_position(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::aggregate;
    use crate::geo::LngLat;
    use crate::protocol::{DisplayAttributes, Sample};
    use crate::render::{LineFeature, PointFeature, RenderError};

    /// Projects longitude/latitude straight onto pixels scaled by 10 and
    /// offset by the camera center.
    #[derive(Debug, Default)]
    struct GridRenderer {
        points: Vec<PointFeature>,
        offset_x: f32,
        interacting: bool,
        flights: Vec<LngLat>,
    }

    impl MapRenderer for GridRenderer {
        fn initialize(&mut self) -> Result<(), RenderError> {
            Ok(())
        }

        fn set_point_data(&mut self, points: &[PointFeature]) {
            self.points = points.to_vec();
        }

        fn set_line_data(&mut self, _lines: &[LineFeature]) {}

        fn query_rendered_points(&self, at: ScreenPoint) -> Vec<String> {
            self.points
                .iter()
                .filter(|p| self.project(p.position).distance(at) <= 5.0)
                .map(|p| p.id.clone())
                .collect()
        }

        #[allow(clippy::cast_possible_truncation, reason = "test projection")]
        fn project(&self, position: LngLat) -> ScreenPoint {
            ScreenPoint::new(
                (position.longitude * 10.0) as f32 + self.offset_x,
                (position.latitude * 10.0) as f32,
            )
        }

        fn bearing(&self) -> f64 {
            0.0
        }

        fn fly_to(&mut self, center: LngLat, _zoom: f64) {
            self.flights.push(center);
        }

        fn is_interacting(&self) -> bool {
            self.interacting
        }
    }

    fn sample(serial: &str, registration: &str, lng: f64, lat: f64, t: i64) -> Sample {
        Sample {
            serial: serial.to_string(),
            registration: registration.to_string(),
            position: LngLat::new(lng, lat),
            yaw: 0.0,
            attributes: DisplayAttributes::default(),
            start_time: Some(t),
        }
    }

    fn setup() -> (VehicleHistoryStore, Vec<FleetRecord>, GridRenderer) {
        let mut store = VehicleHistoryStore::default();
        store.ingest_at(sample("X1", "SD-B1", 10.0, 10.0, 1000), 0);
        store.ingest_at(sample("Y1", "SD-C9", 20.0, 20.0, 1000), 0);
        let fleets = aggregate(store.get_all());

        let mut renderer = GridRenderer::default();
        let mut adapter = crate::render::RenderAdapter::<GridRenderer>::new();
        adapter.apply_fleets(&fleets);
        renderer.set_point_data(adapter.points());
        (store, fleets, renderer)
    }

    #[test]
    fn test_hover_sets_sample_and_position() {
        let (mut store, fleets, renderer) = setup();
        let mut layer = InteractionLayer::default();

        layer.on_pointer_move(ScreenPoint::new(101.0, 99.0), &fleets, &renderer, &mut store);

        assert_eq!(layer.hover_state(), &HoverState::Hovering("SD-B1".to_string()));
        assert_eq!(store.hovered().unwrap().serial, "X1");
        assert_eq!(store.hover_position(), Some(ScreenPoint::new(100.0, 100.0)));
    }

    #[test]
    fn test_pointer_off_marker_clears_hover() {
        let (mut store, fleets, renderer) = setup();
        let mut layer = InteractionLayer::default();

        layer.on_pointer_move(ScreenPoint::new(100.0, 100.0), &fleets, &renderer, &mut store);
        layer.on_pointer_move(ScreenPoint::new(150.0, 150.0), &fleets, &renderer, &mut store);

        assert_eq!(layer.hover_state(), &HoverState::Idle);
        assert!(store.hovered().is_none());
        assert!(store.hover_position().is_none());
    }

    #[test]
    fn test_pan_start_clears_hover_without_new_telemetry() {
        let (mut store, fleets, renderer) = setup();
        let mut layer = InteractionLayer::default();
        layer.on_pointer_move(ScreenPoint::new(100.0, 100.0), &fleets, &renderer, &mut store);
        let version = store.version();

        layer.on_move_start(&mut store);

        assert!(store.hovered().is_none());
        assert!(store.hover_position().is_none());
        assert!(store.version() > version);
    }

    #[test]
    fn test_camera_move_tracks_marker() {
        let (mut store, fleets, mut renderer) = setup();
        let mut layer = InteractionLayer::default();
        layer.on_pointer_move(ScreenPoint::new(200.0, 200.0), &fleets, &renderer, &mut store);

        renderer.offset_x = -50.0;
        layer.on_camera_move(&fleets, &renderer, &mut store);
        assert_eq!(store.hover_position(), Some(ScreenPoint::new(150.0, 200.0)));
    }

    #[test]
    fn test_hover_follows_latest_tick() {
        let (mut store, _, renderer) = setup();
        let mut layer = InteractionLayer::default();
        let fleets = aggregate(store.get_all());
        layer.on_pointer_move(ScreenPoint::new(100.0, 100.0), &fleets, &renderer, &mut store);

        store.ingest_at(sample("X1", "SD-B1", 11.0, 10.0, 2000), 0);
        let fleets = aggregate(store.get_all());
        layer.refresh_hover(&fleets, &renderer, &mut store);

        assert_eq!(store.hover_position(), Some(ScreenPoint::new(110.0, 100.0)));
        assert_eq!(store.hovered().unwrap().position, LngLat::new(11.0, 10.0));
    }

    #[test]
    fn test_click_selects_and_flies_once() {
        let (mut store, fleets, mut renderer) = setup();
        let mut layer = InteractionLayer::default();

        layer.on_click(ScreenPoint::new(200.0, 200.0), &fleets, &renderer, &mut store);
        assert_eq!(store.selected(), Some("Y1"));

        assert!(layer.update_fly_to(&mut renderer, &store));
        assert!(!layer.update_fly_to(&mut renderer, &store));
        assert_eq!(renderer.flights, vec![LngLat::new(20.0, 20.0)]);
    }

    #[test]
    fn test_click_on_empty_map_keeps_selection() {
        let (mut store, fleets, renderer) = setup();
        let mut layer = InteractionLayer::default();
        layer.select_serial(Some("X1".to_string()), &mut store);

        layer.on_click(ScreenPoint::new(500.0, 500.0), &fleets, &renderer, &mut store);
        assert_eq!(store.selected(), Some("X1"));
    }

    #[test]
    fn test_fly_to_waits_for_interaction_to_end() {
        let (mut store, _, mut renderer) = setup();
        let mut layer = InteractionLayer::default();
        layer.select_serial(Some("X1".to_string()), &mut store);

        renderer.interacting = true;
        assert!(!layer.update_fly_to(&mut renderer, &store));
        assert_eq!(layer.pending_fly_to(), Some("X1"));

        renderer.interacting = false;
        assert!(layer.update_fly_to(&mut renderer, &store));
        assert_eq!(renderer.flights.len(), 1);
    }

    #[test]
    fn test_move_start_deselects() {
        let (mut store, _, mut renderer) = setup();
        let mut layer = InteractionLayer::default();
        layer.select_serial(Some("X1".to_string()), &mut store);

        layer.on_move_start(&mut store);
        assert!(store.selected().is_none());
        assert!(!layer.update_fly_to(&mut renderer, &store));
        assert!(renderer.flights.is_empty());
    }
}
