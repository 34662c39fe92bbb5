//! Handler Registry
//!
//! One handler per `(tier, type)` pair. Registering again for the same
//! pair replaces the previous handler.

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::event::{Event, Fields};
use crate::hub::Hub;

/// Authorization tier a handler is registered under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Reachable only from an authenticated session
    On,
    /// Reachable by anyone
    Api,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::On => write!(f, "on"),
            Tier::Api => write!(f, "api"),
        }
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Tier::On),
            "api" => Ok(Tier::Api),
            other => Err(format!("unknown handler tier '{other}'")),
        }
    }
}

/// What every handler receives next to its event
#[derive(Clone)]
pub struct HandlerContext {
    /// The hub, for `send`, `receive` and directory lookups
    pub hub: Hub,
    /// Read-only application values from configuration
    pub vars: Arc<Fields>,
}

/// Boxed future returned by a handler
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Event>>;

/// Type-erased handler
pub type Handler = Arc<dyn Fn(Event, HandlerContext) -> HandlerFuture + Send + Sync>;

/// Handlers keyed by tier and event type
#[derive(Clone, Default)]
pub struct Registry {
    handlers: Arc<RwLock<HashMap<(Tier, String), Handler>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type` under `tier`
    pub async fn on<F, Fut>(&self, tier: Tier, event_type: impl Into<String>, handler: F)
    where
        F: Fn(Event, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Event>> + Send + 'static,
    {
        let event_type = event_type.into();
        let handler: Handler =
            Arc::new(move |event: Event, ctx: HandlerContext| -> HandlerFuture {
                Box::pin(handler(event, ctx))
            });

        let replaced = self
            .handlers
            .write()
            .await
            .insert((tier, event_type.clone()), handler)
            .is_some();

        if replaced {
            tracing::debug!(tier = %tier, event_type = %event_type, "Replaced handler");
        } else {
            tracing::debug!(tier = %tier, event_type = %event_type, "Registered handler");
        }
    }

    pub async fn get(&self, tier: Tier, event_type: &str) -> Option<Handler> {
        self.handlers
            .read()
            .await
            .get(&(tier, event_type.to_string()))
            .cloned()
    }

    /// The `on` and `api` handlers for a type
    pub async fn lookup(&self, event_type: &str) -> (Option<Handler>, Option<Handler>) {
        let handlers = self.handlers.read().await;
        (
            handlers.get(&(Tier::On, event_type.to_string())).cloned(),
            handlers.get(&(Tier::Api, event_type.to_string())).cloned(),
        )
    }

    pub async fn contains(&self, tier: Tier, event_type: &str) -> bool {
        self.get(tier, event_type).await.is_some()
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }
}

/// Resolves handlers on demand for types nobody registered
#[async_trait]
pub trait HandlerLoader: Send + Sync {
    /// Try to register handlers for `event_type` into `registry`.
    /// Returns true when something was registered.
    async fn load(&self, event_type: &str, registry: &Registry) -> bool;
}

/// Loader that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLoader;

#[async_trait]
impl HandlerLoader for NoopLoader {
    async fn load(&self, _event_type: &str, _registry: &Registry) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_replace() {
        let registry = Registry::new();
        assert!(registry.is_empty().await);

        registry.on(Tier::Api, "ping", |ev, _ctx| async move { Ok(ev) }).await;
        registry.on(Tier::Api, "ping", |ev, _ctx| async move { Ok(ev) }).await;
        registry.on(Tier::On, "ping", |ev, _ctx| async move { Ok(ev) }).await;

        assert_eq!(registry.len().await, 2);
        assert!(registry.contains(Tier::On, "ping").await);
        assert!(!registry.contains(Tier::On, "pong").await);

        let (on, api) = registry.lookup("ping").await;
        assert!(on.is_some() && api.is_some());
    }

    #[tokio::test]
    async fn test_noop_loader() {
        let registry = Registry::new();
        assert!(!NoopLoader.load("anything", &registry).await);
        assert!(registry.is_empty().await);
    }

    #[test]
    fn test_tier_names() {
        assert_eq!(Tier::On.to_string(), "on");
        assert_eq!("api".parse::<Tier>().unwrap(), Tier::Api);
        assert!("public".parse::<Tier>().is_err());
    }
}
