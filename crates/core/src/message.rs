//! Control messages sent by the page.
//!
//! Wire shape: `{ "type": "...", "payload": ... }`. Messages are one-way;
//! parsing failures are reported to the caller so it can log and drop them.

use serde::Deserialize;
use serde_json::Value;

use crate::Error;

pub const CACHE_URGENT: &str = "HEALTHCARE_CACHE_URGENT";
pub const CLEAR_SENSITIVE: &str = "HEALTHCARE_CLEAR_SENSITIVE";
pub const UPDATE_EMERGENCY: &str = "HEALTHCARE_UPDATE_EMERGENCY";

#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Fetch these URLs into the Emergency pool, bypassing classification.
    CacheUrgent { urls: Vec<String> },
    /// Delete pools that may hold medical-API or patient data.
    ClearSensitive,
    /// Replace the emergency contacts entry with this payload.
    UpdateEmergency(Value),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Deserialize)]
struct UrgentPayload {
    urls: Vec<String>,
}

impl ControlMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::CacheUrgent { .. } => CACHE_URGENT,
            ControlMessage::ClearSensitive => CLEAR_SENSITIVE,
            ControlMessage::UpdateEmergency(_) => UPDATE_EMERGENCY,
        }
    }

    /// Parse a raw message value.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidMessage` for non-object input, a missing or
    /// unknown `type`, or a payload that does not fit the type.
    pub fn parse(raw: &Value) -> Result<Self, Error> {
        let envelope = Envelope::deserialize(raw).map_err(|e| Error::InvalidMessage(e.to_string()))?;
        let kind = envelope
            .kind
            .ok_or_else(|| Error::InvalidMessage("missing message type".into()))?;

        match kind.as_str() {
            CACHE_URGENT => {
                let payload = envelope
                    .payload
                    .ok_or_else(|| Error::InvalidMessage(format!("{CACHE_URGENT} requires a payload")))?;
                let UrgentPayload { urls } = serde_json::from_value(payload)
                    .map_err(|e| Error::InvalidMessage(format!("{CACHE_URGENT}: {e}")))?;
                Ok(ControlMessage::CacheUrgent { urls })
            }
            CLEAR_SENSITIVE => Ok(ControlMessage::ClearSensitive),
            UPDATE_EMERGENCY => match envelope.payload {
                Some(Value::Null) | None => {
                    Err(Error::InvalidMessage(format!("{UPDATE_EMERGENCY} requires a payload")))
                }
                Some(payload) => Ok(ControlMessage::UpdateEmergency(payload)),
            },
            other => Err(Error::InvalidMessage(format!("unknown message type: {other}"))),
        }
    }
}
