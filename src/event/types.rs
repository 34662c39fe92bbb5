//! Event Type
//!
//! An event is an open JSON object keyed by string. The hub reserves a few
//! keys (see the constants below) and carries two kinds of out-of-band
//! context that never appear on the wire: the originating connection and
//! named attachments for payloads that cannot be serialized.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::session::Conn;

/// Ordered key/value bag backing every event and every `session_data`
pub type Fields = Map<String, Value>;

/// Opaque handle carried alongside an event (open streams, file handles)
pub type Attachment = Arc<dyn Any + Send + Sync>;

/// Routing key
pub const TYPE: &str = "type";
/// Caller correlation id
pub const ID: &str = "_id";
/// Hub-injected session data
pub const SESSION: &str = "_session";
/// Hub-injected connection record
pub const CONN: &str = "_conn";
/// Error marker
pub const ERROR: &str = "e";
/// Info marker
pub const INFO: &str = "i";
/// Diagnostic attached to handler failures
pub const STACKTRACE: &str = "e_stacktrace";
/// Authenticated user inside `_session`
pub const USERNAME: &str = "_username";

/// A transient request/response object routed through the hub
#[derive(Clone, Default)]
pub struct Event {
    fields: Fields,
    conn: Option<Conn>,
    attachments: BTreeMap<String, Attachment>,
}

/// Typed access failures for event fields
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccessError {
    #[error("missing field '{0}'")]
    Missing(String),

    #[error("field '{key}' is not {expected}")]
    WrongType { key: String, expected: &'static str },
}

impl Event {
    /// Create an event with the given type
    pub fn new(event_type: impl Into<String>) -> Self {
        let mut fields = Fields::new();
        fields.insert(TYPE.to_string(), Value::String(event_type.into()));
        Self::from_fields(fields)
    }

    pub fn from_fields(fields: Fields) -> Self {
        Self {
            fields,
            conn: None,
            attachments: BTreeMap::new(),
        }
    }

    /// Builder-style setter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    pub fn into_fields(self) -> Fields {
        self.fields
    }

    /// The JSON form of the event. Connection and attachments are not included.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// String field, or a typed error naming what went wrong
    pub fn get_str(&self, key: &str) -> Result<&str, AccessError> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Err(AccessError::Missing(key.to_string())),
            Some(Value::String(s)) => Ok(s),
            Some(_) => Err(AccessError::WrongType {
                key: key.to_string(),
                expected: "a string",
            }),
        }
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, AccessError> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Err(AccessError::Missing(key.to_string())),
            Some(v) => v.as_i64().ok_or_else(|| AccessError::WrongType {
                key: key.to_string(),
                expected: "an integer",
            }),
        }
    }

    pub fn get_object(&self, key: &str) -> Result<&Fields, AccessError> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Err(AccessError::Missing(key.to_string())),
            Some(Value::Object(map)) => Ok(map),
            Some(_) => Err(AccessError::WrongType {
                key: key.to_string(),
                expected: "an object",
            }),
        }
    }

    /// The routing key, when present and a string
    pub fn event_type(&self) -> Option<&str> {
        self.fields.get(TYPE).and_then(Value::as_str)
    }

    pub fn error(&self) -> Option<&Value> {
        self.fields.get(ERROR).filter(|v| !v.is_null())
    }

    pub fn has_error(&self) -> bool {
        self.error().is_some()
    }

    /// True when `e` is exactly the given string
    pub fn error_is(&self, code: &str) -> bool {
        self.error().and_then(Value::as_str) == Some(code)
    }

    pub fn set_error(&mut self, error: impl Into<Value>) {
        self.set(ERROR, error);
    }

    pub fn clear_error(&mut self) {
        self.fields.remove(ERROR);
    }

    pub fn info(&self) -> Option<&str> {
        self.fields.get(INFO).and_then(Value::as_str)
    }

    pub fn set_info(&mut self, info: impl Into<Value>) {
        self.set(INFO, info);
    }

    pub fn session(&self) -> Option<&Fields> {
        self.fields.get(SESSION).and_then(Value::as_object)
    }

    pub fn session_mut(&mut self) -> Option<&mut Fields> {
        self.fields.get_mut(SESSION).and_then(Value::as_object_mut)
    }

    pub fn set_session(&mut self, session: Fields) {
        self.fields.insert(SESSION.to_string(), Value::Object(session));
    }

    /// Detach `_session`, returning it only when it is an object
    pub fn take_session(&mut self) -> Option<Fields> {
        match self.fields.remove(SESSION) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Non-empty `_session._username`
    pub fn username(&self) -> Option<&str> {
        self.session()
            .and_then(|s| s.get(USERNAME))
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn is_authenticated(&self) -> bool {
        self.username().is_some()
    }

    /// Mark the session behind this event as signed in as `username`.
    /// The protocol persists the change when the reply comes back.
    pub fn sign_in(&mut self, username: impl Into<String>) {
        let username = Value::String(username.into());
        match self.session_mut() {
            Some(session) => {
                session.insert(USERNAME.to_string(), username);
            }
            None => {
                let mut session = Fields::new();
                session.insert(USERNAME.to_string(), username);
                self.set_session(session);
            }
        }
    }

    pub fn sign_out(&mut self) {
        if let Some(session) = self.session_mut() {
            session.remove(USERNAME);
        }
    }

    pub fn conn(&self) -> Option<&Conn> {
        self.conn.as_ref()
    }

    pub fn set_conn(&mut self, conn: Conn) {
        self.conn = Some(conn);
    }

    pub fn take_conn(&mut self) -> Option<Conn> {
        self.conn.take()
    }

    pub fn attach(&mut self, key: impl Into<String>, attachment: Attachment) {
        self.attachments.insert(key.into(), attachment);
    }

    pub fn attachment(&self, key: &str) -> Option<&Attachment> {
        self.attachments.get(key)
    }

    /// Downcast an attachment to its concrete type
    pub fn attachment_as<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.attachments
            .get(key)
            .and_then(|a| Arc::clone(a).downcast::<T>().ok())
    }

    pub fn attachment_keys(&self) -> impl Iterator<Item = &str> {
        self.attachments.keys().map(String::as_str)
    }

    pub(crate) fn take_attachments(&mut self) -> BTreeMap<String, Attachment> {
        std::mem::take(&mut self.attachments)
    }

    pub(crate) fn set_attachments(&mut self, attachments: BTreeMap<String, Attachment>) {
        self.attachments = attachments;
    }
}

impl From<Fields> for Event {
    fn from(fields: Fields) -> Self {
        Self::from_fields(fields)
    }
}

impl PartialEq for Event {
    /// Events compare by their JSON fields
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("fields", &self.fields)
            .field("conn", &self.conn.as_ref().map(|c| c.socket().id()))
            .field("attachments", &self.attachments.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Fields::deserialize(deserializer).map(Event::from_fields)
    }
}
