//! # Switchyard
//!
//! Realtime event-routing hub. Clients hold WebSocket connections and send
//! JSON events; the hub groups connections into sessions that survive
//! reconnects, dispatches each event to an application handler under one
//! of two authorization tiers, and runs serialized housekeeping under a
//! global lock.
//!
//! ## Features
//!
//! - **Sessions**: socket to session to instance reconciliation, so a
//!   reloaded tab rejoins its session
//! - **Tiered dispatch**: `api` handlers for everyone, `on` handlers for
//!   signed-in sessions, with failures returned as data on the reply
//! - **System events**: `__send`, `__receive` and `__clock` let the
//!   application extend addressing, poll delivery and maintenance
//! - **Global lock**: in-process or SQLite row lock, self-healing after
//!   a crashed holder
//!
//! ## Modules
//!
//! - [`event`]: the open JSON event, validation and sandboxing
//! - [`session`]: sockets, sessions and the session directory
//! - [`trigger`]: handler registry and the dispatch pipeline
//! - [`store`]: global lock and GlobalVars backends
//! - [`hub`]: connection protocol, delivery and housekeeping
//! - [`transport`]: WebSocket transport
//! - [`api`]: HTTP server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use switchyard::hub::{Hub, HubConfig};
//! use switchyard::store::MemoryStore;
//! use switchyard::trigger::Tier;
//!
//! #[tokio::main]
//! async fn main() {
//!     let hub = Hub::new(HubConfig::default(), Arc::new(MemoryStore::new()));
//!
//!     hub.on(Tier::Api, "login", |mut event, _ctx| async move {
//!         let name = event.get_str("username")?.to_string();
//!         event.sign_in(name);
//!         Ok(event)
//!     })
//!     .await;
//!
//!     hub.on(Tier::On, "whoami", |event, _ctx| async move {
//!         let name = event.username().unwrap_or_default().to_string();
//!         Ok(event.with("username", name))
//!     })
//!     .await;
//!
//!     let ticker = hub.start();
//!     // hand `hub` to switchyard::api::serve ...
//!     hub.shutdown().await;
//!     let _ = ticker.await;
//! }
//! ```

pub mod api;
pub mod config;
pub mod event;
pub mod hub;
pub mod session;
pub mod store;
pub mod transport;
pub mod trigger;

// Re-export top-level types for convenience
pub use event::{AccessError, Event, Fields};

pub use session::{Session, SessionDirectory, Socket};

pub use trigger::{HandlerContext, HandlerLoader, Registry, Tier};

pub use store::{GlobalStore, MemoryStore, SqliteStore, StoreError, StoreResult};

pub use hub::{Hub, HubConfig, HubError};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError};
