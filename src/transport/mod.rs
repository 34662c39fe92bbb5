//! WebSocket Transport
//!
//! Connects browser clients to the hub over WebSocket.
//!
//! ## Architecture
//!
//! - **Handler**: upgrade, then one send task and one receive task per
//!   connection; the receive task feeds the hub sequentially
//! - **Messages**: `[channel, payload]` frame decoding
//!
//! ## Example
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:8000/ws');
//!
//! ws.onopen = () => {
//!   ws.send(JSON.stringify(['server', {type: '_instance', _id: 1}]));
//! };
//!
//! ws.onmessage = (msg) => {
//!   const [channel, event] = JSON.parse(msg.data);
//!   console.log(channel, event);
//! };
//! ```

mod handler;
mod messages;

pub use handler::websocket_handler;
pub use messages::{decode, encode, malformed_json, Inbound};
