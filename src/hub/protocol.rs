//! Connection protocol
//!
//! The three transport callbacks. Connect creates an ephemeral session,
//! message validates, resolves `_instance`, dispatches and persists session
//! changes, and disconnect detaches the socket before running housekeeping.

use serde_json::Value;
use std::fmt;

use super::{Hub, HubError};
use crate::event::{
    reorder_reply, validate_inbound, Event, Fields, ERROR, INSTANCE_TYPE, MALFORMED_JSON,
};
use crate::session::{
    generate_instance_id, is_valid_instance_id, Conn, Session, SessionDirectory, Socket,
    CLIENT_CHANNEL, INSTANCE_ID,
};
use crate::trigger::UNIMPLEMENTED;

/// Event key carrying the requested or resolved instance id
const INSTANCE_KEY: &str = "instance";

/// How an `_instance` request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceOutcome {
    /// No usable id was given; a fresh one was generated
    Created,
    /// The id belongs to a live session, which the socket joined
    Retrieved,
    /// A well-formed id with no live session was adopted
    Recreated,
}

impl fmt::Display for InstanceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceOutcome::Created => write!(f, "created"),
            InstanceOutcome::Retrieved => write!(f, "retrieved"),
            InstanceOutcome::Recreated => write!(f, "recreated"),
        }
    }
}

impl Hub {
    /// A transport connection opened
    pub async fn connect(&self, socket: &Socket) -> Result<(), HubError> {
        let mut directory = self.directory().lock().await;
        if directory.get_session_index(socket.id()).is_some() {
            return Ok(());
        }

        self.admit(&directory, socket)?;
        directory.add_session(socket.clone());
        tracing::info!(
            socket_id = %socket.id(),
            sessions = directory.len(),
            "Socket connected"
        );
        Ok(())
    }

    /// A payload arrived on the `server` channel. The reply is emitted on
    /// `client` to the originating socket and also returned.
    pub async fn handle_message(&self, socket: &Socket, payload: Value) -> Event {
        let reply = self.process_message(socket, payload).await;
        if let Err(e) = socket.emit(CLIENT_CHANNEL, reply.to_value()) {
            tracing::debug!(socket_id = %socket.id(), error = %e, "Reply dropped");
        }
        reply
    }

    /// Build the reply for one inbound payload without emitting it
    pub async fn process_message(&self, socket: &Socket, payload: Value) -> Event {
        let mut event = match payload {
            Value::Object(fields) => Event::from_fields(fields),
            _ => return Event::default().with(ERROR, MALFORMED_JSON),
        };

        if let Err(code) = validate_inbound(&event) {
            tracing::debug!(socket_id = %socket.id(), error = %code, "Rejected inbound event");
            event.set_error(code);
            return reorder_reply(event);
        }

        let is_instance = event.event_type() == Some(INSTANCE_TYPE);
        let snapshot = {
            let mut directory = self.directory().lock().await;
            if directory.get_session_index(socket.id()).is_none() {
                tracing::warn!(socket_id = %socket.id(), "Message from unregistered socket");
                if let Err(e) = self.admit(&directory, socket) {
                    event.set_error(e.to_string());
                    return reorder_reply(event);
                }
                directory.add_session(socket.clone());
            }

            if is_instance {
                let outcome = resolve_instance(&mut directory, socket, &mut event);
                let instance = event
                    .get(INSTANCE_KEY)
                    .and_then(Value::as_str)
                    .unwrap_or("");
                tracing::info!(
                    socket_id = %socket.id(),
                    instance = %instance,
                    outcome = %outcome,
                    "Resolved instance"
                );
            }
            attach_context(&directory, socket, &mut event)
        };

        let mut reply = self.trigger(event).await;

        if let Some(after) = reply.take_session() {
            if after != snapshot {
                let mut directory = self.directory().lock().await;
                let mut current = directory
                    .get_session(socket.id())
                    .map(|s| s.session_data)
                    .unwrap_or_default();
                apply_session_changes(&mut current, &snapshot, after);
                directory.set_session_data(socket.id(), current);
            }
        }
        reply.take_conn();

        if reply.event_type() == Some(INSTANCE_TYPE) && reply.error_is(UNIMPLEMENTED) {
            reply.clear_error();
        }
        reorder_reply(reply)
    }

    /// A transport connection closed
    pub async fn disconnect(&self, socket_id: &str, reason: &str) {
        let removal = self
            .directory()
            .lock()
            .await
            .remove_socket_from_session(socket_id);
        tracing::info!(socket_id, reason, removal = ?removal, "Socket disconnected");

        if let Err(e) = self.check_clock().await {
            tracing::warn!(error = %e, "Housekeeping after disconnect failed");
        }
    }
}

impl Hub {
    /// Refuse a new socket once `max_connections` sockets are attached
    fn admit(&self, directory: &SessionDirectory, socket: &Socket) -> Result<(), HubError> {
        let limit = self.config().max_connections;
        if directory.socket_count() >= limit {
            tracing::warn!(socket_id = %socket.id(), limit, "Connection limit reached");
            return Err(HubError::TooManyConnections(limit));
        }
        Ok(())
    }
}

/// Give the socket's session an instance id. Runs under the caller's
/// directory lock so concurrent resolutions of one id cannot interleave.
fn resolve_instance(
    directory: &mut SessionDirectory,
    socket: &Socket,
    event: &mut Event,
) -> InstanceOutcome {
    let requested = event
        .get(INSTANCE_KEY)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let (instance, outcome) = if directory.get_session_by_instance(&requested).is_some() {
        directory.combine_sessions(&requested, socket.id());
        (requested, InstanceOutcome::Retrieved)
    } else if is_valid_instance_id(&requested) {
        (requested, InstanceOutcome::Recreated)
    } else {
        (generate_instance_id(), InstanceOutcome::Created)
    };

    if outcome != InstanceOutcome::Retrieved {
        let mut data = directory
            .get_session(socket.id())
            .map(|s| s.session_data)
            .unwrap_or_default();
        data.insert(INSTANCE_ID.to_string(), Value::String(instance.clone()));
        directory.set_session_data(socket.id(), data);
    }

    event.set(INSTANCE_KEY, instance);
    event.set_info(format!("instance {outcome}"));
    outcome
}

/// Attach `_session` and `_conn` for the socket's current session and
/// return the attached session data
fn attach_context(directory: &SessionDirectory, socket: &Socket, event: &mut Event) -> Fields {
    let session = directory
        .get_session(socket.id())
        .unwrap_or_else(|| Session::new(socket.clone()));
    event.set_session(session.session_data.clone());
    event.set_conn(Conn::new(socket.clone(), session.conn));
    session.session_data
}

/// Replay what a handler changed in `_session` onto the directory's
/// current data, leaving keys it did not touch as they are now
fn apply_session_changes(current: &mut Fields, before: &Fields, after: Fields) {
    for key in before.keys() {
        if !after.contains_key(key) {
            current.remove(key);
        }
    }
    for (key, value) in after {
        if before.get(&key) != Some(&value) {
            current.insert(key, value);
        }
    }
}
