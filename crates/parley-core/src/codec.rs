//! Text frame decoding.

use serde_json::Value;

use crate::errors::ProtocolError;
use crate::messages::Payload;

/// Decode one inbound text frame into a key/value payload.
pub fn decode_frame(text: &str) -> Result<Payload, ProtocolError> {
    let value: Value = serde_json::from_str(text).map_err(|_| ProtocolError::InvalidJson)?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ProtocolError::InvalidPayload),
    }
}
