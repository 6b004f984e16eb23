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

//! Dashboard figures derived from the vehicle records.
//!
//! Everything here is a pure function of a record slice and a reference time,
//! so panels can recompute on each repaint without touching the store lock.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, DurationRound, Local, TimeZone, Utc};

use crate::fleet::{is_allowed, FleetRecord};
use crate::store::VehicleRecord;

/// A vehicle counts as active if heard within this many seconds.
pub const ACTIVE_WINDOW_SECS: i64 = 60;

/// One minute of the activity chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityBucket {
    /// Local wall-clock label, `HH:MM`.
    pub label: String,
    /// Bucket start in milliseconds since the Unix epoch.
    pub start: i64,
    /// Distinct registrations heard during the minute.
    pub registrations: usize,
}

/// Sample volume for one registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationActivity {
    pub registration: String,
    pub samples: u64,
}

/// Latest record per registration, by last heard time.
fn latest_by_registration<'a>(records: &'a [VehicleRecord]) -> HashMap<&'a str, &'a VehicleRecord> {
    let mut latest: HashMap<&str, &VehicleRecord> = HashMap::new();
    for record in records {
        latest
            .entry(record.registration())
            .and_modify(|prev| {
                if record.last_seen() > prev.last_seen() {
                    *prev = record;
                }
            })
            .or_insert(record);
    }
    latest
}

/// Registrations heard within [`ACTIVE_WINDOW_SECS`] of `now`.
#[must_use]
pub fn active_now(records: &[VehicleRecord], now: DateTime<Utc>) -> usize {
    let cutoff = (now - Duration::seconds(ACTIVE_WINDOW_SECS)).timestamp_millis();
    latest_by_registration(records)
        .values()
        .filter(|r| r.last_seen() >= cutoff)
        .count()
}

/// Distinct registrations first seen on the local calendar day of `now`.
#[must_use]
pub fn unique_today(records: &[VehicleRecord], now: DateTime<Utc>) -> usize {
    let today = now.with_timezone(&Local).date_naive();
    records
        .iter()
        .filter(|r| {
            Local
                .timestamp_millis_opt(r.first_seen())
                .single()
                .is_some_and(|t| t.date_naive() == today)
        })
        .map(VehicleRecord::registration)
        .collect::<HashSet<_>>()
        .len()
}

/// Mean altitude over the latest sample of each registration that reports one.
#[must_use]
pub fn average_altitude(records: &[VehicleRecord]) -> Option<f64> {
    let altitudes: Vec<f64> = latest_by_registration(records)
        .values()
        .filter_map(|r| r.latest().attributes.altitude)
        .collect();
    if altitudes.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss, reason = "fleet sizes are small")]
    let count = altitudes.len() as f64;
    Some(altitudes.iter().sum::<f64>() / count)
}

/// Distinct registrations per minute over the last `minutes` minutes.
///
/// Every retained history point counts toward the minute it falls in.
#[must_use]
pub fn activity_per_minute(
    records: &[VehicleRecord],
    now: DateTime<Utc>,
    minutes: u32,
) -> Vec<ActivityBucket> {
    let minute = Duration::minutes(1);
    let current = now.duration_trunc(minute).unwrap_or(now);

    let mut buckets: BTreeMap<i64, HashSet<&str>> = (0..minutes)
        .map(|i| {
            let start = current - Duration::minutes(i64::from(minutes - 1 - i));
            (start.timestamp_millis(), HashSet::new())
        })
        .collect();

    for record in records {
        for point in record.history() {
            let start = point.timestamp - point.timestamp.rem_euclid(60_000);
            if let Some(regs) = buckets.get_mut(&start) {
                regs.insert(record.registration());
            }
        }
    }

    buckets
        .into_iter()
        .map(|(start, regs)| ActivityBucket {
            label: Local
                .timestamp_millis_opt(start)
                .single()
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_default(),
            start,
            registrations: regs.len(),
        })
        .collect()
}

/// Registrations with the most samples received, busiest first.
#[must_use]
pub fn top_registrations(records: &[VehicleRecord], top_n: usize) -> Vec<RegistrationActivity> {
    let mut counts: BTreeMap<&str, u64> = BTreeMap::new();
    for record in records {
        *counts.entry(record.registration()).or_default() += record.samples_received();
    }

    let mut rows: Vec<RegistrationActivity> = counts
        .into_iter()
        .map(|(registration, samples)| RegistrationActivity {
            registration: registration.to_string(),
            samples,
        })
        .collect();
    // Stable sort keeps registration order among equal counts.
    rows.sort_by(|a, b| b.samples.cmp(&a.samples));
    rows.truncate(top_n);
    rows
}

/// The `n` most recently heard vehicles, newest first.
#[must_use]
pub fn recent_vehicles(records: &[VehicleRecord], n: usize) -> Vec<&VehicleRecord> {
    let mut sorted: Vec<&VehicleRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        b.last_seen()
            .cmp(&a.last_seen())
            .then(a.sequence().cmp(&b.sequence()))
    });
    sorted.truncate(n);
    sorted
}

/// Fleets whose registration is in the allowed category.
#[must_use]
pub fn allowed_count(fleets: &[FleetRecord]) -> usize {
    fleets.iter().filter(|f| f.allowed()).count()
}

/// Tracked vehicles split by registration category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategorySplit {
    pub allowed: usize,
    pub not_allowed: usize,
}

impl CategorySplit {
    #[must_use]
    pub fn total(&self) -> usize {
        self.allowed + self.not_allowed
    }

    /// Fraction of vehicles in the allowed category, `None` when nothing is tracked.
    #[must_use]
    #[allow(clippy::cast_precision_loss, reason = "fleet sizes are small")]
    pub fn allowed_share(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.allowed as f64 / total as f64),
        }
    }
}

/// Count every tracked serial as allowed or not by its registration.
#[must_use]
pub fn category_split(records: &[VehicleRecord]) -> CategorySplit {
    records
        .iter()
        .fold(CategorySplit::default(), |mut split, record| {
            if is_allowed(record.registration()) {
                split.allowed += 1;
            } else {
                split.not_allowed += 1;
            }
            split
        })
}

/// Time since the vehicle was first seen, never negative.
#[must_use]
pub fn flight_duration(record: &VehicleRecord, now: DateTime<Utc>) -> Duration {
    let elapsed = now.timestamp_millis() - record.first_seen();
    Duration::milliseconds(elapsed.max(0))
}

/// Format a duration as `HH:MM:SS`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let total = duration.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
