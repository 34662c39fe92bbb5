//! Addressing and delivery
//!
//! `send` routes an event to the sessions of a username (or `"all"`),
//! optionally through the application's `__send` handler. `receive`
//! collects queued events for a session through `__receive`.

use serde_json::Value;

use super::Hub;
use crate::event::{clone_event, update_event, Event, Fields, CONN, ID, SESSION};
use crate::session::CLIENT_CHANNEL;
use crate::trigger::UNIMPLEMENTED;

/// System event letting the application route outbound events
pub const SEND_EVENT: &str = "__send";
/// System event letting the application hand over queued events
pub const RECEIVE_EVENT: &str = "__receive";
/// Key of the queued events in a `__receive` reply
pub const EVENT_QUEUE: &str = "eventQueue";

const SENT_EVENT: &str = "event";
const FORWARDED_ID: &str = "__id";
const RECIPIENT: &str = "to";

impl Hub {
    /// Deliver `event` to `recipient` (or `event.to`).
    ///
    /// With `emit_only` the hub emits directly to every socket of every
    /// matching session. Otherwise the event is offered to `__send` first,
    /// with `_id` renamed to `__id`; changes the handler makes to the
    /// carried event are copied back into `event`. Without a `__send`
    /// handler the hub falls back to emitting directly.
    ///
    /// Returns the number of sockets emitted to by the hub itself.
    pub async fn send(
        &self,
        event: &mut Event,
        recipient: Option<&str>,
        emit_only: bool,
    ) -> usize {
        if emit_only {
            return self.emit_to(event, recipient).await;
        }

        let mut outbound = clone_event(event, &[SESSION, CONN, ID]);
        if let Some(id) = event.get(ID) {
            outbound.set(FORWARDED_ID, id.clone());
        }

        let request = Event::new(SEND_EVENT).with(SENT_EVENT, outbound.to_value());
        let reply = self.trigger(request).await;

        if reply.event_type() == Some(SEND_EVENT) && reply.error_is(UNIMPLEMENTED) {
            return self.emit_to(&outbound, recipient).await;
        }
        if let Some(e) = reply.error() {
            tracing::warn!(error = %e, "Send handler failed");
        }

        if let Ok(sent) = reply.get_object(SENT_EVENT) {
            let sent = Event::from_fields(sent.clone());
            update_event(event, &sent, &[SESSION, CONN, ID, FORWARDED_ID]);
        }
        0
    }

    /// Append events queued for `session` by the application's
    /// `__receive` handler. With `collect_only` the events are returned as is.
    pub async fn receive(
        &self,
        mut events: Vec<Event>,
        session: &Fields,
        collect_only: bool,
    ) -> Vec<Event> {
        if collect_only {
            return events;
        }

        let mut request = Event::new(RECEIVE_EVENT);
        request.set_session(session.clone());
        let reply = self.trigger(request).await;

        if reply.error_is(UNIMPLEMENTED) {
            return events;
        }

        if let Some(Value::Array(queue)) = reply.get(EVENT_QUEUE) {
            events.extend(
                queue
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|fields| Event::from_fields(fields.clone())),
            );
        }
        events
    }

    async fn emit_to(&self, event: &Event, recipient: Option<&str>) -> usize {
        let address = recipient
            .or_else(|| event.get(RECIPIENT).and_then(Value::as_str))
            .unwrap_or("");
        if address.is_empty() {
            tracing::debug!(event_type = event.event_type().unwrap_or(""), "Send without recipient");
            return 0;
        }

        let sessions = self.directory().lock().await.get_sessions_by_username(address);
        let mut emitted = 0;
        for session in &sessions {
            let payload = clone_event(event, &[SESSION, CONN]).to_value();
            for socket in &session.conn {
                match socket.emit(CLIENT_CHANNEL, payload.clone()) {
                    Ok(()) => emitted += 1,
                    Err(e) => tracing::debug!(error = %e, "Emit dropped"),
                }
            }
        }

        tracing::debug!(
            recipient = address,
            sessions = sessions.len(),
            emitted,
            "Delivered event"
        );
        emitted
    }
}
