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

//! Fleet aggregation.
//!
//! Derives one [`FleetRecord`] per registration from the vehicle records in the
//! store. Several serials can fly under the same registration (hardware swaps),
//! so the record picks the most recently started serial as `latest` and merges
//! every serial's history into one trailing path.
//!
//! Aggregation is a pure function: the same record set always yields the same
//! output, independent of hash map iteration order.

use std::collections::BTreeMap;

use crate::geo::LngLat;
use crate::store::{HistoryPoint, VehicleRecord};

/// Maximum number of coordinates in a fleet's trailing path.
pub const MAX_PATH_LENGTH: usize = 200;

/// Registrations starting with this prefix are cleared to fly.
pub const ALLOWED_PREFIX: &str = "SD-B";

/// Whether a registration belongs to the allowed category.
#[must_use]
pub fn is_allowed(registration: &str) -> bool {
    registration.starts_with(ALLOWED_PREFIX)
}

/// One serial's participation in a registration, for the flight history list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlightSummary {
    pub serial: String,
    pub first_seen: i64,
    pub last_seen: i64,
    pub samples: u64,
}

/// Aggregated state of one registration.
#[derive(Debug, Clone)]
pub struct FleetRecord {
    registration: String,
    latest: VehicleRecord,
    path: Vec<LngLat>,
    flights: Vec<FlightSummary>,
}

impl FleetRecord {
    #[must_use]
    pub fn registration(&self) -> &str {
        &self.registration
    }

    /// The vehicle with the newest start time under this registration.
    #[must_use]
    pub fn latest(&self) -> &VehicleRecord {
        &self.latest
    }

    /// Trailing path, oldest first, at most [`MAX_PATH_LENGTH`] long.
    #[must_use]
    pub fn path(&self) -> &[LngLat] {
        &self.path
    }

    /// Serials seen under this registration, ordered like the aggregation.
    #[must_use]
    pub fn flights(&self) -> &[FlightSummary] {
        &self.flights
    }

    /// Recomputed on every call from the registration.
    #[must_use]
    pub fn allowed(&self) -> bool {
        is_allowed(&self.registration)
    }
}

/// Group vehicle records by registration, ordered by registration.
#[must_use]
pub fn aggregate<'a, I>(records: I) -> Vec<FleetRecord>
where
    I: IntoIterator<Item = &'a VehicleRecord>,
{
    aggregate_with_limit(records, MAX_PATH_LENGTH)
}

/// Same as [`aggregate`] with a custom path limit.
#[must_use]
pub fn aggregate_with_limit<'a, I>(records: I, path_limit: usize) -> Vec<FleetRecord>
where
    I: IntoIterator<Item = &'a VehicleRecord>,
{
    let mut groups: BTreeMap<&str, Vec<&VehicleRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.registration()).or_default().push(record);
    }

    groups
        .into_iter()
        .filter_map(|(registration, mut members)| {
            // Stable order: start time, then creation order.
            members.sort_by_key(|r| (r.first_seen(), r.sequence()));
            let latest = (*members.last()?).clone();

            let mut points: Vec<(HistoryPoint, u64)> = members
                .iter()
                .flat_map(|r| r.history().iter().map(move |p| (*p, r.sequence())))
                .collect();
            // sort_by_key is stable, so equal keys keep per-vehicle history order.
            points.sort_by_key(|(p, sequence)| (p.timestamp, *sequence));
            let skip = points.len().saturating_sub(path_limit);
            let path = points.into_iter().skip(skip).map(|(p, _)| p.position).collect();

            let flights = members
                .iter()
                .map(|r| FlightSummary {
                    serial: r.serial().to_string(),
                    first_seen: r.first_seen(),
                    last_seen: r.last_seen(),
                    samples: r.samples_received(),
                })
                .collect();

            Some(FleetRecord {
                registration: registration.to_string(),
                latest,
                path,
                flights,
            })
        })
        .collect()
}

/// Find the fleet record for `registration`.
#[must_use]
pub fn find_by_registration<'a>(
    fleets: &'a [FleetRecord],
    registration: &str,
) -> Option<&'a FleetRecord> {
    fleets.iter().find(|f| f.registration == registration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{DisplayAttributes, Sample};
    use crate::store::VehicleHistoryStore;

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

    #[test]
    fn test_is_allowed_prefix() {
        assert!(is_allowed("SD-B1"));
        assert!(!is_allowed("SD-C9"));
        assert!(!is_allowed("sd-b1"));
    }

    #[test]
    fn test_single_vehicle_scenario() {
        let mut store = VehicleHistoryStore::default();
        store.ingest_at(sample("X1", "SD-B1", 35.9, 31.9, 1000), 0);
        store.ingest_at(
            Sample {
                yaw: 1.57,
                ..sample("X1", "SD-B1", 35.91, 31.91, 2000)
            },
            0,
        );

        let fleets = aggregate(store.get_all());
        assert_eq!(fleets.len(), 1);
        let fleet = &fleets[0];
        assert_eq!(fleet.registration(), "SD-B1");
        assert!((fleet.latest().latest().position.longitude - 35.91).abs() < f64::EPSILON);
        assert_eq!(fleet.path().len(), 2);
        assert!(fleet.allowed());
    }

    #[test]
    fn test_single_sample_yields_degenerate_path() {
        let mut store = VehicleHistoryStore::default();
        store.ingest_at(sample("X1", "SD-C9", 1.0, 1.0, 1000), 0);
        let fleets = aggregate(store.get_all());
        assert_eq!(fleets[0].path(), &[LngLat::new(1.0, 1.0)]);
        assert!(!fleets[0].allowed());
    }

    #[test]
    fn test_grouping_picks_newest_started_serial() {
        let mut store = VehicleHistoryStore::default();
        store.ingest_at(sample("S1", "SD-B7", 1.0, 1.0, 1000), 0);
        store.ingest_at(sample("S2", "SD-B7", 2.0, 2.0, 1500), 0);
        // S1 keeps reporting, but S2 was registered later.
        store.ingest_at(sample("S1", "SD-B7", 1.1, 1.1, 3000), 0);

        let fleets = aggregate(store.get_all());
        assert_eq!(fleets.len(), 1);
        let fleet = &fleets[0];
        assert_eq!(fleet.latest().serial(), "S2");
        assert_eq!(fleet.latest().latest().start_time, Some(1500));
        // Merged path in time order across serials.
        assert_eq!(
            fleet.path(),
            &[
                LngLat::new(1.0, 1.0),
                LngLat::new(2.0, 2.0),
                LngLat::new(1.1, 1.1)
            ]
        );
        assert_eq!(fleet.flights().len(), 2);
    }

    #[test]
    fn test_ties_broken_by_creation_order() {
        let mut store = VehicleHistoryStore::default();
        store.ingest_at(sample("S1", "SD-B7", 1.0, 1.0, 1000), 0);
        store.ingest_at(sample("S2", "SD-B7", 2.0, 2.0, 1000), 0);

        let fleets = aggregate(store.get_all());
        assert_eq!(fleets[0].latest().serial(), "S2");
        assert_eq!(fleets[0].path(), &[LngLat::new(1.0, 1.0), LngLat::new(2.0, 2.0)]);
    }

    #[test]
    fn test_latest_start_time_is_group_maximum() {
        let mut store = VehicleHistoryStore::default();
        store.ingest_at(sample("S1", "SD-B3", 1.0, 1.0, 2000), 0);
        store.ingest_at(sample("S2", "SD-B3", 2.0, 2.0, 1200), 0);
        store.ingest_at(sample("S3", "SD-B3", 3.0, 3.0, 1800), 0);
        store.ingest_at(sample("S2", "SD-B3", 2.1, 2.1, 9000), 0);

        let expected = store.get_all().iter().map(|r| r.first_seen()).max();
        let fleets = aggregate(store.get_all());
        let latest = fleets[0].latest();
        assert_eq!(latest.serial(), "S1");
        assert_eq!(latest.latest().start_time, expected);
    }

    #[test]
    fn test_latest_is_monotonic_across_recomputation() {
        let mut store = VehicleHistoryStore::default();
        store.ingest_at(sample("S1", "SD-B7", 1.0, 1.0, 5000), 0);
        let before = aggregate(store.get_all())[0].latest().first_seen();

        // An older serial must not displace the newer one.
        store.ingest_at(sample("S2", "SD-B7", 2.0, 2.0, 4000), 0);
        // Nor may an out-of-order sample for the same serial.
        store.ingest_at(sample("S1", "SD-B7", 1.5, 1.5, 100), 0);

        let fleets = aggregate(store.get_all());
        assert_eq!(fleets[0].latest().serial(), "S1");
        assert!(fleets[0].latest().first_seen() >= before);
    }

    #[test]
    fn test_path_limited_to_most_recent_points() {
        let mut store = VehicleHistoryStore::default();
        for t in 0..150 {
            #[allow(clippy::cast_precision_loss, reason = "small test values")]
            let lng = t as f64 * 0.001;
            store.ingest_at(sample("S1", "SD-B7", lng, 0.0, t), 0);
            store.ingest_at(sample("S2", "SD-B7", -lng, 0.0, t), 0);
        }

        let fleets = aggregate(store.get_all());
        assert_eq!(fleets[0].path().len(), MAX_PATH_LENGTH);
        assert_eq!(
            fleets[0].path().last(),
            Some(&LngLat::new(-(149.0_f64 * 0.001), 0.0))
        );
    }

    #[test]
    fn test_output_ordered_and_deterministic() {
        let mut store = VehicleHistoryStore::default();
        store.ingest_at(sample("Z", "SD-C1", 1.0, 1.0, 10), 0);
        store.ingest_at(sample("A", "SD-B2", 1.0, 1.0, 10), 0);
        store.ingest_at(sample("M", "SD-B1", 1.0, 1.0, 10), 0);

        let first: Vec<String> = aggregate(store.get_all())
            .iter()
            .map(|f| f.registration().to_string())
            .collect();
        let second: Vec<String> = aggregate(store.snapshot().iter())
            .iter()
            .map(|f| f.registration().to_string())
            .collect();
        assert_eq!(first, vec!["SD-B1", "SD-B2", "SD-C1"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_lookup_helpers() {
        let mut store = VehicleHistoryStore::default();
        store.ingest_at(sample("X1", "SD-B1", 1.0, 1.0, 10), 0);
        let fleets = aggregate(store.get_all());
        assert!(find_by_registration(&fleets, "SD-B1").is_some());
        assert!(find_by_registration(&fleets, "SD-B9").is_none());
    }
}
