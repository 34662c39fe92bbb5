//! Event Hub
//!
//! Binds transport callbacks to the session directory and the trigger
//! pipeline, and drives the housekeeping ticker.
//!
//! ## Architecture
//!
//! - **Directory**: every live session, behind one mutex so merges and
//!   splits never interleave
//! - **Dispatcher**: handler registry plus the trigger pipeline
//! - **Store**: the global lock and GlobalVars used by housekeeping
//!
//! ## Usage
//!
//! ```rust,ignore
//! use switchyard::hub::{Hub, HubConfig};
//! use switchyard::store::MemoryStore;
//! use switchyard::trigger::Tier;
//! use std::sync::Arc;
//!
//! let hub = Hub::new(HubConfig::default(), Arc::new(MemoryStore::new()));
//! hub.on(Tier::Api, "ping", |mut event, _ctx| async move {
//!     event.set_info("pong");
//!     Ok(event)
//! })
//! .await;
//! let ticker = hub.start();
//! ```

mod clock;
mod delivery;
mod protocol;

pub use clock::{CLOCK_EVENT, GLOBAL_VARS, LAST_TICK};
pub use delivery::{EVENT_QUEUE, RECEIVE_EVENT, SEND_EVENT};
pub use protocol::InstanceOutcome;

use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::event::{Event, Fields};
use crate::session::{Session, SessionDirectory, SocketId};
use crate::store::{GlobalStore, StoreError};
use crate::trigger::{Dispatcher, HandlerContext, HandlerLoader, NoopLoader, Registry, Tier};

/// Configuration for the hub
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Housekeeping and poll-delivery interval
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Maximum number of concurrent sockets
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_max_connections() -> usize {
    1000
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            max_connections: default_max_connections(),
        }
    }
}

/// Errors that can occur at the hub's infrastructure seams
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Failed to send message to {0}")]
    SendFailed(SocketId),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

struct HubInner {
    directory: Mutex<SessionDirectory>,
    dispatcher: Dispatcher,
    store: Arc<dyn GlobalStore>,
    vars: Arc<Fields>,
    config: HubConfig,
    shutdown: RwLock<bool>,
}

/// The realtime event-routing hub. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

/// Step-by-step hub construction
pub struct HubBuilder {
    config: HubConfig,
    store: Arc<dyn GlobalStore>,
    registry: Registry,
    loader: Arc<dyn HandlerLoader>,
    vars: Fields,
}

impl HubBuilder {
    /// Resolve unknown event types through `loader`
    pub fn loader(mut self, loader: Arc<dyn HandlerLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Values handed read-only to every handler
    pub fn vars(mut self, vars: Fields) -> Self {
        self.vars = vars;
        self
    }

    /// Start from handlers registered elsewhere
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn build(self) -> Hub {
        tracing::debug!(
            store = self.store.backend(),
            tick_interval_ms = self.config.tick_interval_ms,
            "Creating hub"
        );
        Hub {
            inner: Arc::new(HubInner {
                directory: Mutex::new(SessionDirectory::new()),
                dispatcher: Dispatcher::new(self.registry, self.loader),
                store: self.store,
                vars: Arc::new(self.vars),
                config: self.config,
                shutdown: RwLock::new(false),
            }),
        }
    }
}

impl Hub {
    /// Create a hub with no handlers and no loader
    pub fn new(config: HubConfig, store: Arc<dyn GlobalStore>) -> Self {
        Self::builder(config, store).build()
    }

    pub fn builder(config: HubConfig, store: Arc<dyn GlobalStore>) -> HubBuilder {
        HubBuilder {
            config,
            store,
            registry: Registry::new(),
            loader: Arc::new(NoopLoader),
            vars: Fields::new(),
        }
    }

    /// Register a handler for `event_type` under `tier`; the last
    /// registration for a pair wins.
    pub async fn on<F, Fut>(&self, tier: Tier, event_type: impl Into<String>, handler: F)
    where
        F: Fn(Event, HandlerContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Event>> + Send + 'static,
    {
        self.inner.dispatcher.registry().on(tier, event_type, handler).await;
    }

    pub fn registry(&self) -> &Registry {
        self.inner.dispatcher.registry()
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn GlobalStore> {
        &self.inner.store
    }

    /// Context handed to handlers
    pub fn context(&self) -> HandlerContext {
        HandlerContext {
            hub: self.clone(),
            vars: Arc::clone(&self.inner.vars),
        }
    }

    /// Run `event` through the trigger pipeline
    pub async fn trigger(&self, event: Event) -> Event {
        self.inner.dispatcher.trigger(event, self.context()).await
    }

    pub async fn session_count(&self) -> usize {
        self.inner.directory.lock().await.len()
    }

    pub async fn socket_count(&self) -> usize {
        self.inner.directory.lock().await.socket_count()
    }

    /// Copy of the session owning a socket
    pub async fn get_session(&self, socket_id: &str) -> Option<Session> {
        self.inner.directory.lock().await.get_session(socket_id)
    }

    pub async fn get_session_by_instance(&self, instance_id: &str) -> Option<Session> {
        self.inner
            .directory
            .lock()
            .await
            .get_session_by_instance(instance_id)
    }

    pub async fn get_sessions_by_username(&self, username: &str) -> Vec<Session> {
        self.inner
            .directory
            .lock()
            .await
            .get_sessions_by_username(username)
    }

    /// Copies of every session
    pub async fn sessions(&self) -> Vec<Session> {
        self.inner.directory.lock().await.sessions().to_vec()
    }

    /// Ask the ticker to stop at its next wake-up
    pub async fn shutdown(&self) {
        *self.inner.shutdown.write().await = true;
        tracing::info!("Hub shutdown requested");
    }

    pub async fn is_shutdown(&self) -> bool {
        *self.inner.shutdown.read().await
    }

    fn directory(&self) -> &Mutex<SessionDirectory> {
        &self.inner.directory
    }
}
