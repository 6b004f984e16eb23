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

//! GeoJSON-style feature collection parser.
//!
//! The fleet gateway pushes one JSON document per line:
//! ```text
//! {"features":[{"properties":{"serial":"X1","registration":"SD-B1","yaw":1.57},
//!   "geometry":{"type":"Point","coordinates":[35.91,31.91]},"startTime":2000}]}
//! ```
//! Only the first feature of each document is consumed.

use serde::Deserialize;

use super::{DisplayAttributes, ParseError, Protocol, Sample};
use crate::geo::LngLat;

#[derive(Debug, Deserialize)]
struct WirePayload {
    #[serde(default)]
    features: Vec<WireFeature>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFeature {
    properties: WireProperties,
    geometry: WireGeometry,
    #[serde(default)]
    start_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireProperties {
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    registration: Option<String>,
    #[serde(default, rename = "Name")]
    name: Option<String>,
    #[serde(default)]
    altitude: Option<f64>,
    #[serde(default)]
    pilot: Option<String>,
    #[serde(default)]
    organization: Option<String>,
    #[serde(default)]
    yaw: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WireGeometry {
    coordinates: [f64; 2],
}

/// Parser for newline-delimited feature collection payloads.
#[derive(Debug, Default)]
pub struct FeatureCollectionParser;

impl FeatureCollectionParser {
    /// Create a new feature collection parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Protocol for FeatureCollectionParser {
    type Message = Sample;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<Sample>, ParseError> {
        let line = std::str::from_utf8(input)
            .map_err(|e| ParseError::InvalidFormat(format!("invalid UTF-8: {e}")))?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let payload: WirePayload = serde_json::from_str(line)
            .map_err(|e| ParseError::InvalidFormat(e.to_string()))?;

        match payload.features.into_iter().next() {
            Some(feature) => feature_to_sample(feature).map(Some),
            None => Ok(None),
        }
    }
}

/// Keep only non-blank text; blank strings count as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn feature_to_sample(feature: WireFeature) -> Result<Sample, ParseError> {
    let props = feature.properties;

    let serial = non_blank(props.serial).ok_or(ParseError::MissingField("serial"))?;
    let registration =
        non_blank(props.registration).ok_or(ParseError::MissingField("registration"))?;

    let position = LngLat::from(feature.geometry.coordinates);
    if !position.is_valid() {
        return Err(ParseError::InvalidValue {
            field: "coordinates",
            value: format!("[{}, {}]", position.longitude, position.latitude),
        });
    }

    let yaw = props.yaw.filter(|y| y.is_finite()).unwrap_or(0.0);

    #[allow(
        clippy::cast_possible_truncation,
        reason = "epoch milliseconds fit comfortably in i64"
    )]
    let start_time = feature
        .start_time
        .filter(|t| t.is_finite() && *t >= 0.0)
        .map(|t| t.round() as i64);

    Ok(Sample {
        serial,
        registration,
        position,
        yaw,
        attributes: DisplayAttributes {
            name: non_blank(props.name),
            altitude: props.altitude.filter(|a| a.is_finite()),
            pilot: non_blank(props.pilot),
            organization: non_blank(props.organization),
        },
        start_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Option<Sample>, ParseError> {
        FeatureCollectionParser::new().parse(line.as_bytes())
    }

    #[test]
    fn test_parse_full_feature() {
        let line = r#"{"features":[{"type":"Feature","properties":{"serial":"X1","registration":"SD-B1","Name":"Scout","altitude":120.5,"pilot":"Dana","organization":"Survey","yaw":1.57},"geometry":{"type":"Point","coordinates":[35.91,31.91]},"startTime":2000}]}"#;
        let sample = parse(line).unwrap().unwrap();

        assert_eq!(sample.serial, "X1");
        assert_eq!(sample.registration, "SD-B1");
        assert_eq!(sample.position, LngLat::new(35.91, 31.91));
        assert!((sample.yaw - 1.57).abs() < f64::EPSILON);
        assert_eq!(sample.attributes.name(), "Scout");
        assert_eq!(sample.attributes.pilot(), "Dana");
        assert_eq!(sample.start_time, Some(2000));
    }

    #[test]
    fn test_only_first_feature_consumed() {
        let line = r#"{"features":[
            {"properties":{"serial":"A","registration":"SD-B1"},"geometry":{"coordinates":[1.0,2.0]}},
            {"properties":{"serial":"B","registration":"SD-B2"},"geometry":{"coordinates":[3.0,4.0]}}
        ]}"#;
        let sample = parse(line).unwrap().unwrap();
        assert_eq!(sample.serial, "A");
    }

    #[test]
    fn test_optional_fields_default() {
        let line = r#"{"features":[{"properties":{"serial":"X1","registration":"SD-C9"},"geometry":{"coordinates":[1.0,2.0]}}]}"#;
        let sample = parse(line).unwrap().unwrap();
        assert!(sample.yaw.abs() < f64::EPSILON);
        assert_eq!(sample.start_time, None);
        assert_eq!(sample.attributes, DisplayAttributes::default());
    }

    #[test]
    fn test_empty_features_is_not_an_error() {
        assert!(parse(r#"{"features":[]}"#).unwrap().is_none());
        assert!(parse("{}").unwrap().is_none());
        assert!(parse("   ").unwrap().is_none());
    }

    #[test]
    fn test_missing_serial_rejected() {
        let line = r#"{"features":[{"properties":{"registration":"SD-B1"},"geometry":{"coordinates":[1.0,2.0]}}]}"#;
        assert!(matches!(parse(line), Err(ParseError::MissingField("serial"))));

        let blank = r#"{"features":[{"properties":{"serial":"  ","registration":"SD-B1"},"geometry":{"coordinates":[1.0,2.0]}}]}"#;
        assert!(matches!(parse(blank), Err(ParseError::MissingField("serial"))));
    }

    #[test]
    fn test_missing_registration_rejected() {
        let line = r#"{"features":[{"properties":{"serial":"X1"},"geometry":{"coordinates":[1.0,2.0]}}]}"#;
        assert!(matches!(
            parse(line),
            Err(ParseError::MissingField("registration"))
        ));
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let line = r#"{"features":[{"properties":{"serial":"X1","registration":"SD-B1"},"geometry":{"coordinates":[200.0,2.0]}}]}"#;
        assert!(matches!(
            parse(line),
            Err(ParseError::InvalidValue {
                field: "coordinates",
                ..
            })
        ));
    }

    #[test]
    fn test_garbage_is_invalid_format() {
        assert!(matches!(parse("not json"), Err(ParseError::InvalidFormat(_))));
        assert!(matches!(
            FeatureCollectionParser::new().parse(&[0xff, 0xfe]),
            Err(ParseError::InvalidFormat(_))
        ));
    }
}
