//! Measurement — a typed reading extracted from one sensor line.
//!
//! The sensor firmware prints lines such as `Soil Moisture: 42`. The parser
//! here is a pure function: no IO, no shared state, trivially testable.

use serde::Serialize;

use crate::time::Timestamp;

/// Marker the sensor prints in front of the moisture percentage.
pub const SOIL_MOISTURE_PREFIX: &str = "Soil Moisture: ";

/// What a [`Measurement`] measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasurementKind {
    /// Volumetric soil moisture, in percent.
    SoilMoisture,
}

/// An immutable reading produced by [`parse_line`].
///
/// `value` is the percentage exactly as printed by the sensor. Values above
/// 100 are kept as-is; the gateway does not clamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    kind: MeasurementKind,
    value: u32,
    observed_at: Timestamp,
}

impl Measurement {
    /// Build a soil moisture measurement.
    #[must_use]
    pub fn soil_moisture(value: u32, observed_at: Timestamp) -> Self {
        Self {
            kind: MeasurementKind::SoilMoisture,
            value,
            observed_at,
        }
    }

    #[must_use]
    pub fn kind(&self) -> MeasurementKind {
        self.kind
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.value
    }

    #[must_use]
    pub fn observed_at(&self) -> Timestamp {
        self.observed_at
    }

    /// Whether the value lies in the physical 0–100 % range of the sensor.
    #[must_use]
    pub fn is_in_sensor_range(&self) -> bool {
        self.value <= 100
    }
}

/// Extract a [`Measurement`] from a raw sensor line.
///
/// Surrounding whitespace is ignored and the marker may appear anywhere in
/// the line, followed by at least one ASCII digit. Returns `None` for any
/// line that does not carry a reading, including digit runs that overflow
/// `u32`.
#[must_use]
pub fn parse_line(line: &str, observed_at: Timestamp) -> Option<Measurement> {
    let line = line.trim();
    let start = line.find(SOIL_MOISTURE_PREFIX)? + SOIL_MOISTURE_PREFIX.len();
    let rest = &line[start..];
    let digits_len = rest
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits_len == 0 {
        return None;
    }
    let value = rest[..digits_len].parse::<u32>().ok()?;
    Some(Measurement::soil_moisture(value, observed_at))
}
