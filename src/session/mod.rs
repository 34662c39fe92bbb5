//! Sessions
//!
//! Sockets, the sessions that group them, and the instance identities that
//! let a session survive reconnects.

mod directory;
mod instance;
mod socket;

pub use directory::{
    clone_session, Removal, Session, SessionDirectory, ALL_SESSIONS, INSTANCE_ID,
};
pub use instance::{generate_instance_id, is_valid_instance_id, INSTANCE_ID_LEN};
pub use socket::{Conn, Frame, Socket, SocketId, CLIENT_CHANNEL, SERVER_CHANNEL};
