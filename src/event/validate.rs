//! Inbound event validation
//!
//! Structural checks applied to every event a client sends before any
//! handler sees it. Failures are reported as `e` codes on the reply.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::types::{Event, ID, TYPE};

/// System event types a client may send despite failing the type pattern
pub const WHITELISTED_TYPES: [&str; 1] = [INSTANCE_TYPE];

/// Instance resolution request
pub const INSTANCE_TYPE: &str = "_instance";

pub const MALFORMED_PROPERTY: &str = "malformed--property";
pub const MALFORMED_TYPE: &str = "malformed--type";
pub const MALFORMED_JSON: &str = "malformed--json";

/// True when `t` is a lowercase routing key (`^[a-z][a-z_]*$`)
pub fn is_valid_type(t: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z][a-z_]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(t))
}

/// Check an inbound event, returning the `e` code it must be rejected with
pub fn validate_inbound(event: &Event) -> Result<(), String> {
    if event
        .fields()
        .keys()
        .any(|key| key.starts_with('_') && key != ID)
    {
        return Err(MALFORMED_PROPERTY.to_string());
    }

    let event_type = match event.get(TYPE) {
        None | Some(Value::Null) => return Err(MALFORMED_TYPE.to_string()),
        Some(value) => value,
    };

    match event_type.as_str() {
        Some(t) if is_valid_type(t) || WHITELISTED_TYPES.contains(&t) => Ok(()),
        Some(t) => Err(format!("{MALFORMED_TYPE}:{t}")),
        None => Err(format!("{MALFORMED_TYPE}:{event_type}")),
    }
}
