//! Trigger Pipeline
//!
//! Resolves the handler for an event, runs it under a panic guard and turns
//! every failure into data on the reply. Nothing in here ever fails the
//! caller: the result is always an event.

use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::registry::{HandlerContext, HandlerLoader, NoopLoader, Registry, Tier};
use crate::event::{Event, STACKTRACE, TYPE};

/// No handler in either tier
pub const UNIMPLEMENTED: &str = "unimplemented";
/// Only an `on` handler exists and the caller is not signed in
pub const UNAUTHENTICATED: &str = "unauthenticated";

/// Registry plus the fallback loader for unknown types
#[derive(Clone)]
pub struct Dispatcher {
    registry: Registry,
    loader: Arc<dyn HandlerLoader>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Registry::new(), Arc::new(NoopLoader))
    }
}

impl Dispatcher {
    pub fn new(registry: Registry, loader: Arc<dyn HandlerLoader>) -> Self {
        Self { registry, loader }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Dispatch `event` and return the reply.
    ///
    /// The event is taken by value together with its `_session`, connection
    /// and attachments, so the handler owns everything it is given and the
    /// caller keeps nothing it could observe being mutated.
    ///
    /// An event that already carries `e` is returned untouched. Otherwise an
    /// `on` handler wins for signed-in callers, an `api` handler serves
    /// everyone else, an `on`-only type answers `unauthenticated` and an
    /// unknown type answers `unimplemented`.
    pub async fn trigger(&self, event: Event, ctx: HandlerContext) -> Event {
        let mut event = event;
        if event.has_error() {
            return event;
        }

        let event_type = event.event_type().unwrap_or_default().to_string();
        let authenticated = event.is_authenticated();

        let (mut on, mut api) = self.registry.lookup(&event_type).await;
        if on.is_none() && api.is_none() {
            let loaded = self.loader.load(&event_type, &self.registry).await;
            tracing::debug!(event_type = %event_type, loaded, "Handler load attempted");
            (on, api) = self.registry.lookup(&event_type).await;
        }

        let (tier, handler) = match (on, api) {
            (Some(handler), _) if authenticated => (Tier::On, handler),
            (_, Some(handler)) => (Tier::Api, handler),
            (Some(_), None) => {
                event.set_error(UNAUTHENTICATED);
                return event;
            }
            (None, None) => {
                event.set_error(UNIMPLEMENTED);
                return event;
            }
        };

        tracing::debug!(event_type = %event_type, tier = %tier, "Dispatching event");

        let mut fallback = event.clone();
        let outcome = AssertUnwindSafe(async move { handler(event, ctx).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(reply)) if reply.contains(TYPE) => reply,
            Ok(Ok(reply)) => {
                tracing::warn!(
                    event_type = %event_type,
                    tier = %tier,
                    "Handler returned an event without a type"
                );
                fallback.set_error(reply.to_value());
                fallback
            }
            Ok(Err(err)) => {
                tracing::error!(
                    event_type = %event_type,
                    tier = %tier,
                    error = %err,
                    "Handler failed"
                );
                fallback.set_error(err.to_string());
                fallback.set(STACKTRACE, format!("{err:?}"));
                fallback
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    event_type = %event_type,
                    tier = %tier,
                    panic = %message,
                    "Handler panicked"
                );
                fallback.set(
                    STACKTRACE,
                    format!("panic in {tier} handler for '{event_type}': {message}"),
                );
                fallback.set_error(message);
                fallback
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
