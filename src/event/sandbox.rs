//! Event Sandbox
//!
//! Copy and merge helpers that keep handlers from holding references into
//! hub-owned session and connection state.

use serde_json::Value;

use super::types::{Event, Fields, CONN, ERROR, ID, INFO, TYPE};

/// Keys that lead a reply, in order
const LEADING_KEYS: [&str; 4] = [TYPE, "from", "to", ID];
/// Keys that close a reply, in order
const TRAILING_KEYS: [&str; 2] = [INFO, ERROR];

/// Deep copy of `event` without `keys_to_skip`.
///
/// Only the JSON fields are copied. The connection record and attachments
/// are handles, not data, so the copy never carries them; callers that need
/// them on the copy re-attach them explicitly.
pub fn clone_event(event: &Event, keys_to_skip: &[&str]) -> Event {
    let fields: Fields = event
        .fields()
        .iter()
        .filter(|(key, _)| !keys_to_skip.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Event::from_fields(fields)
}

/// Copy every key of `source` into `target` except `keys_to_skip`,
/// writing only where the value differs.
///
/// `_conn` and attachment names are honoured as keys too, so a sandboxed
/// result can be spliced back without touching the live connection.
pub fn update_event(target: &mut Event, source: &Event, keys_to_skip: &[&str]) {
    for (key, value) in source.fields() {
        if keys_to_skip.contains(&key.as_str()) {
            continue;
        }
        if target.get(key) != Some(value) {
            target.set(key.clone(), value.clone());
        }
    }

    if !keys_to_skip.contains(&CONN) {
        if let Some(conn) = source.conn() {
            target.set_conn(conn.clone());
        }
    }

    for key in source.attachment_keys() {
        if keys_to_skip.contains(&key) {
            continue;
        }
        if let Some(attachment) = source.attachment(key) {
            target.attach(key, attachment.clone());
        }
    }
}

/// Rebuild the reply with `type, from, to, _id` first and `i, e` last
pub fn reorder_reply(event: Event) -> Event {
    let mut event = event;
    let conn = event.take_conn();
    let attachments = event.take_attachments();

    let mut leading: [Option<Value>; 4] = Default::default();
    let mut trailing: [Option<Value>; 2] = Default::default();
    let mut middle = Fields::new();

    // single pass keeps insertion order of the middle keys
    for (key, value) in event.into_fields() {
        if let Some(slot) = LEADING_KEYS.iter().position(|k| *k == key) {
            leading[slot] = Some(value);
        } else if let Some(slot) = TRAILING_KEYS.iter().position(|k| *k == key) {
            trailing[slot] = Some(value);
        } else {
            middle.insert(key, value);
        }
    }

    let mut ordered = Fields::new();
    for (key, value) in LEADING_KEYS.iter().zip(leading) {
        if let Some(value) = value {
            ordered.insert(key.to_string(), value);
        }
    }
    ordered.extend(middle);
    for (key, value) in TRAILING_KEYS.iter().zip(trailing) {
        if let Some(value) = value {
            ordered.insert(key.to_string(), value);
        }
    }

    let mut reply = Event::from_fields(ordered);
    if let Some(conn) = conn {
        reply.set_conn(conn);
    }
    reply.set_attachments(attachments);
    reply
}
