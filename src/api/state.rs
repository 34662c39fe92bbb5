//! Application State
//!
//! Shared state accessible by all API handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::hub::Hub;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// The event hub behind both the WebSocket and HTTP surfaces
    pub hub: Hub,
    /// Loaded configuration
    pub config: Arc<Config>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(hub: Hub, config: Config) -> Self {
        Self {
            hub,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Number of open sockets
    pub async fn connection_count(&self) -> usize {
        self.hub.socket_count().await
    }
}
