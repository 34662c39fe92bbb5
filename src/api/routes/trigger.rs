//! Trigger Routes
//!
//! Dispatch one event over plain HTTP, for clients that cannot hold a
//! socket open (uploads, scripts).
//!
//! - POST /api/v1/trigger - Run an event, optionally under a live instance

use axum::{extract::State, Json};
use serde_json::Value;
use std::sync::Arc;

use crate::api::dto::TriggerRequest;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::event::{reorder_reply, validate_inbound, Event, ERROR, MALFORMED_JSON};
use crate::session::{is_valid_instance_id, INSTANCE_ID_LEN};

/// POST /api/v1/trigger
///
/// The reply comes back as a one element array, like a socket reply. No
/// session changes made by the handler are persisted. A malformed
/// `instance` is a 400 and a well-formed one with no live session a 404.
pub async fn trigger_event(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TriggerRequest>,
) -> ApiResult<Json<Vec<Value>>> {
    let mut event = match req.event {
        Value::Object(fields) => Event::from_fields(fields),
        _ => {
            let reply = Event::default().with(ERROR, MALFORMED_JSON);
            return Ok(Json(vec![reply.to_value()]));
        }
    };

    if let Err(code) = validate_inbound(&event) {
        event.set_error(code);
        return Ok(Json(vec![reorder_reply(event).to_value()]));
    }

    if let Some(instance) = req.instance.as_deref().filter(|i| !i.is_empty()) {
        if !is_valid_instance_id(instance) {
            return Err(ApiError::Validation(format!(
                "instance must be {INSTANCE_ID_LEN} letters or digits"
            )));
        }
        let session = state
            .hub
            .get_session_by_instance(instance)
            .await
            .ok_or_else(|| ApiError::NotFound(format!("instance {instance}")))?;
        event.set_session(session.session_data);
    }

    tracing::debug!(
        event_type = event.event_type().unwrap_or(""),
        instance = req.instance.as_deref().unwrap_or(""),
        "HTTP trigger"
    );

    let mut reply = state.hub.trigger(event).await;
    reply.take_session();
    reply.take_conn();

    Ok(Json(vec![reorder_reply(reply).to_value()]))
}
