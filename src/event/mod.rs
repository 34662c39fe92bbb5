//! Events
//!
//! The open JSON object that flows through the hub, plus the helpers that
//! validate inbound events and sandbox what handlers receive.
//!
//! ## Reserved keys
//!
//! - `type`: routing key, `^[a-z][a-z_]*$` unless whitelisted (`_instance`)
//! - `_id`: caller correlation id, the only underscore key a client may send
//! - `_session` / `_conn`: hub context, stripped before a reply leaves
//! - `e` / `i`: error and info markers

mod sandbox;
mod types;
mod validate;

pub use sandbox::{clone_event, reorder_reply, update_event};
pub use types::{
    AccessError, Attachment, Event, Fields, CONN, ERROR, ID, INFO, SESSION, STACKTRACE, TYPE,
    USERNAME,
};
pub use validate::{
    is_valid_type, validate_inbound, INSTANCE_TYPE, MALFORMED_JSON, MALFORMED_PROPERTY,
    MALFORMED_TYPE, WHITELISTED_TYPES,
};
