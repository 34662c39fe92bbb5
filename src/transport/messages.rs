//! Wire Messages
//!
//! Text frames are two element JSON arrays, `[channel, payload]`.

use serde_json::{json, Value};

use crate::event::{ERROR, MALFORMED_JSON};
use crate::session::{Frame, SERVER_CHANNEL};

/// What an inbound text frame turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A payload for the hub on the `server` channel
    Server(Value),
    /// A well-formed frame on some other channel
    Other(String),
    /// Not a `[channel, payload]` frame
    Malformed(String),
}

/// Classify an inbound text frame
pub fn decode(text: &str) -> Inbound {
    match serde_json::from_str::<Frame>(text) {
        Ok(frame) if frame.channel == SERVER_CHANNEL => Inbound::Server(frame.payload),
        Ok(frame) => Inbound::Other(frame.channel),
        Err(e) => Inbound::Malformed(e.to_string()),
    }
}

/// Serialize an outbound frame
pub fn encode(frame: &Frame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Reply for input that is not a JSON event
pub fn malformed_json() -> Value {
    json!({ ERROR: MALFORMED_JSON })
}
