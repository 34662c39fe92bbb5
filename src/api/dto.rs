//! Data Transfer Objects
//!
//! Request and response types for the API endpoints.
//! These types are serialized/deserialized to/from JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================
// TRIGGER DTOs
// ============================================

/// HTTP trigger request
#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    /// Instance whose session the event runs under
    #[serde(default)]
    pub instance: Option<String>,
    /// The event, validated like a socket message
    pub event: Value,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: healthy, degraded
    pub status: String,
    /// Global store status
    pub store: String,
    /// Global store backend name
    pub backend: String,
    /// Live sessions
    pub sessions: usize,
    /// Open sockets
    pub sockets: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
