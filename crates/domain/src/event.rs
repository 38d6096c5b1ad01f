//! Outbound events — what subscribers see on the push channel.
//!
//! Every event is a JSON object tagged by `type`:
//!
//! | Event | JSON |
//! |-------|------|
//! | connection ack | `{"type":"connection","message":"..."}` |
//! | measurement | `{"type":"soilMoisture","value":42}` |

use serde::{Deserialize, Serialize};

use crate::measurement::{Measurement, MeasurementKind};

/// Greeting sent to every subscriber right after it connects.
pub const DEFAULT_GREETING: &str = "Connected to soil moisture server";

/// An event pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundEvent {
    /// Connection acknowledgement, sent to the new subscriber only.
    Connection { message: String },
    /// A soil moisture reading.
    SoilMoisture { value: u32 },
}

impl OutboundEvent {
    /// Build the acknowledgement event.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Encode as a compact JSON string.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; cannot happen for the variants above but
    /// is propagated rather than unwrapped.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&Measurement> for OutboundEvent {
    fn from(measurement: &Measurement) -> Self {
        match measurement.kind() {
            MeasurementKind::SoilMoisture => Self::SoilMoisture {
                value: measurement.value(),
            },
        }
    }
}
