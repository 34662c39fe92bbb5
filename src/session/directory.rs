//! Session Directory
//!
//! The list of live sessions and the socket to session to instance
//! relationship. Every socket belongs to exactly one session and at most
//! one session carries a given non-empty instance id.
//!
//! The directory itself is not synchronized; the hub owns it behind a
//! single mutex so merge and split operations never interleave.

use serde_json::Value;

use super::socket::Socket;
use crate::event::{Fields, USERNAME};

/// Key of the instance id inside `session_data`
pub const INSTANCE_ID: &str = "instance_id";

/// Recipient name that addresses every session
pub const ALL_SESSIONS: &str = "all";

/// One logical client identity and the sockets currently attached to it
#[derive(Debug, Clone)]
pub struct Session {
    /// Arbitrary JSON state: instance id, authenticated user, app data
    pub session_data: Fields,
    /// Sockets owned by this session
    pub conn: Vec<Socket>,
}

impl Session {
    /// Ephemeral session holding a single socket
    pub fn new(socket: Socket) -> Self {
        let mut session_data = Fields::new();
        session_data.insert(INSTANCE_ID.to_string(), Value::String(String::new()));
        Self {
            session_data,
            conn: vec![socket],
        }
    }

    /// Instance id, empty when the session is ephemeral
    pub fn instance_id(&self) -> &str {
        instance_of(&self.session_data)
    }

    pub fn username(&self) -> Option<&str> {
        self.session_data
            .get(USERNAME)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn has_socket(&self, socket_id: &str) -> bool {
        self.conn.iter().any(|s| s.id() == socket_id)
    }
}

/// What `remove_socket_from_session` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The socket left its session; the session stays
    SocketRemoved,
    /// The socket was the last one of an ephemeral session, which is gone
    SessionRemoved,
    /// No session owns the socket
    NotFound,
}

fn instance_of(data: &Fields) -> &str {
    data.get(INSTANCE_ID).and_then(Value::as_str).unwrap_or("")
}

/// Copy of a session: `session_data` is an independent deep copy, the
/// socket handles still reach the same connections.
pub fn clone_session(session: &Session) -> Session {
    Session {
        session_data: session.session_data.clone(),
        conn: session.conn.clone(),
    }
}

/// Live sessions, in insertion order
#[derive(Debug, Default)]
pub struct SessionDirectory {
    sessions: Vec<Session>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from existing sessions
    pub fn from_sessions(sessions: Vec<Session>) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Total sockets across all sessions
    pub fn socket_count(&self) -> usize {
        self.sessions.iter().map(|s| s.conn.len()).sum()
    }

    pub fn get_session_index(&self, socket_id: &str) -> Option<usize> {
        self.sessions.iter().position(|s| s.has_socket(socket_id))
    }

    /// Copy of the session owning the socket
    pub fn get_session(&self, socket_id: &str) -> Option<Session> {
        self.get_session_index(socket_id)
            .map(|i| clone_session(&self.sessions[i]))
    }

    fn instance_index(&self, instance_id: &str) -> Option<usize> {
        if instance_id.is_empty() {
            return None;
        }
        self.sessions
            .iter()
            .position(|s| s.instance_id() == instance_id)
    }

    /// Copy of the session carrying `instance_id`; empty ids never match
    pub fn get_session_by_instance(&self, instance_id: &str) -> Option<Session> {
        self.instance_index(instance_id)
            .map(|i| clone_session(&self.sessions[i]))
    }

    /// Copies of the sessions signed in as `username`, or every session for `"all"`
    pub fn get_sessions_by_username(&self, username: &str) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|s| username == ALL_SESSIONS || s.username() == Some(username))
            .map(clone_session)
            .collect()
    }

    /// Append an ephemeral session for a new socket
    pub fn add_session(&mut self, socket: Socket) {
        self.sessions.push(Session::new(socket));
    }

    /// Replace the session data behind a socket, reconciling instance ids.
    ///
    /// - same instance on both sides: replace in place
    /// - new data drops the instance: replace, keeping the old instance
    /// - another session already has the new instance: move the socket
    ///   there (dropping the old session if it is left empty) and give
    ///   that session the new data
    /// - otherwise: replace in place, promoting the session to the new instance
    ///
    /// Returns false when no session owns the socket.
    pub fn set_session_data(&mut self, socket_id: &str, new_data: Fields) -> bool {
        let Some(i1) = self.get_session_index(socket_id) else {
            return false;
        };
        let instance1 = self.sessions[i1].instance_id().to_string();
        let instance2 = instance_of(&new_data).to_string();

        if instance1 == instance2 {
            self.sessions[i1].session_data = new_data;
            return true;
        }

        if !instance1.is_empty() && instance2.is_empty() {
            let mut data = new_data;
            data.insert(INSTANCE_ID.to_string(), Value::String(instance1));
            self.sessions[i1].session_data = data;
            return true;
        }

        match self.instance_index(&instance2) {
            Some(mut i2) => {
                let socket = self.take_socket(i1, socket_id);
                if let Some(socket) = socket {
                    self.sessions[i2].conn.push(socket);
                }
                if self.sessions[i1].conn.is_empty() {
                    let last = self.sessions.len() - 1;
                    self.sessions.swap_remove(i1);
                    if i2 == last {
                        i2 = i1;
                    }
                }
                self.sessions[i2].session_data = new_data;
            }
            None => {
                self.sessions[i1].session_data = new_data;
            }
        }
        true
    }

    /// Detach a socket on disconnect.
    ///
    /// An instanced session is never removed here, even with no sockets
    /// left, so a reload can reclaim it.
    pub fn remove_socket_from_session(&mut self, socket_id: &str) -> Removal {
        let Some(index) = self.get_session_index(socket_id) else {
            return Removal::NotFound;
        };

        let session = &self.sessions[index];
        if session.conn.len() == 1 && session.instance_id().is_empty() {
            self.sessions.remove(index);
            return Removal::SessionRemoved;
        }

        self.take_socket(index, socket_id);
        Removal::SocketRemoved
    }

    /// Move a socket into the live session carrying `instance_id`,
    /// dropping the socket's previous session when it held only that socket.
    ///
    /// Returns false when no session carries the instance or owns the socket.
    pub fn combine_sessions(&mut self, instance_id: &str, socket_id: &str) -> bool {
        let (Some(from), Some(to)) = (
            self.get_session_index(socket_id),
            self.instance_index(instance_id),
        ) else {
            return false;
        };
        if from == to {
            return true;
        }

        let socket = if self.sessions[from].conn.len() == 1 {
            self.sessions.remove(from).conn.pop()
        } else {
            self.take_socket(from, socket_id)
        };

        let (Some(socket), Some(to)) = (socket, self.instance_index(instance_id)) else {
            return false;
        };
        self.sessions[to].conn.push(socket);
        true
    }

    fn take_socket(&mut self, index: usize, socket_id: &str) -> Option<Socket> {
        let conn = &mut self.sessions[index].conn;
        let pos = conn.iter().position(|s| s.id() == socket_id)?;
        Some(conn.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn socket(id: &str) -> Socket {
        let (tx, _rx) = mpsc::unbounded_channel();
        Socket::with_id(id, tx)
    }

    fn data(value: Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    fn session(value: Value, sockets: &[&Socket]) -> Session {
        Session {
            session_data: data(value),
            conn: sockets.iter().map(|s| (*s).clone()).collect(),
        }
    }

    fn three_instances() -> (SessionDirectory, Socket, Socket, Socket) {
        let (a, b, c) = (socket("sid_abc"), socket("sid_def"), socket("sid_ghi"));
        let dir = SessionDirectory::from_sessions(vec![
            session(json!({"instance_id": "instance_abc", "value": "quickbrownfox"}), &[&a]),
            session(json!({"instance_id": "instance_def", "value": "jumpedover"}), &[&b]),
            session(json!({"instance_id": "instance_ghi", "value": "lazydog"}), &[&c]),
        ]);
        (dir, a, b, c)
    }

    #[test]
    fn test_add_and_lookup() {
        let mut dir = SessionDirectory::new();
        dir.add_session(socket("s1"));
        dir.add_session(socket("s2"));

        assert_eq!(dir.len(), 2);
        assert_eq!(dir.get_session_index("s2"), Some(1));
        assert_eq!(dir.get_session("s1").unwrap().instance_id(), "");
        assert!(dir.get_session("nope").is_none());
    }

    #[test]
    fn test_get_session_returns_copy() {
        let mut dir = SessionDirectory::new();
        dir.add_session(socket("s1"));

        let mut copy = dir.get_session("s1").unwrap();
        copy.session_data.insert("x".to_string(), json!(1));

        assert!(dir.get_session("s1").unwrap().session_data.get("x").is_none());
    }

    #[test]
    fn test_empty_instance_never_matches() {
        let mut dir = SessionDirectory::new();
        dir.add_session(socket("s1"));

        assert!(dir.get_session_by_instance("").is_none());
    }

    #[test]
    fn test_sessions_by_username() {
        let (a, b, c) = (socket("a"), socket("b"), socket("c"));
        let dir = SessionDirectory::from_sessions(vec![
            session(json!({"_username": "bill"}), &[&a]),
            session(json!({"_username": "anne"}), &[&b]),
            session(json!({"_username": "bill"}), &[&c]),
        ]);

        let bills = dir.get_sessions_by_username("bill");
        assert_eq!(bills.len(), 2);
        assert!(bills.iter().all(|s| s.username() == Some("bill")));
        assert_eq!(dir.get_sessions_by_username("all").len(), 3);
        assert!(dir.get_sessions_by_username("nobody").is_empty());
    }

    #[test]
    fn test_set_session_data_same_instance_replaces() {
        let mut dir = SessionDirectory::new();
        dir.add_session(socket("s1"));

        assert!(dir.set_session_data("s1", data(json!({"instance_id": "", "k": 1}))));
        assert_eq!(dir.get_session("s1").unwrap().session_data["k"], json!(1));
        assert!(!dir.set_session_data("missing", Fields::new()));
    }

    #[test]
    fn test_set_session_data_keeps_existing_instance() {
        let (mut dir, ..) = three_instances();

        dir.set_session_data("sid_def", data(json!({"_username": "bill"})));

        let s = dir.get_session("sid_def").unwrap();
        assert_eq!(s.instance_id(), "instance_def");
        assert_eq!(s.username(), Some("bill"));
    }

    #[test]
    fn test_set_session_data_promotes_to_new_instance() {
        let mut dir = SessionDirectory::new();
        dir.add_session(socket("s1"));

        dir.set_session_data("s1", data(json!({"instance_id": "fresh"})));

        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get_session_by_instance("fresh").unwrap().conn.len(), 1);
    }

    #[test]
    fn test_set_session_data_moves_socket_to_existing_instance() {
        let (mut dir, ..) = three_instances();
        dir.add_session(socket("sid_new"));
        assert_eq!(dir.len(), 4);

        dir.set_session_data(
            "sid_new",
            data(json!({"instance_id": "instance_abc", "value": "moved"})),
        );

        assert_eq!(dir.len(), 3);
        let target = dir.get_session_by_instance("instance_abc").unwrap();
        assert_eq!(target.conn.len(), 2);
        assert!(target.has_socket("sid_new"));
        assert_eq!(target.session_data["value"], json!("moved"));
        assert_eq!(dir.socket_count(), 4);
    }

    #[test]
    fn test_set_session_data_target_was_last_element() {
        let (a, b) = (socket("a"), socket("b"));
        let mut dir = SessionDirectory::from_sessions(vec![
            session(json!({"instance_id": ""}), &[&a]),
            session(json!({"instance_id": ""}), &[&b]),
            session(json!({"instance_id": "tail"}), &[]),
        ]);

        dir.set_session_data("a", data(json!({"instance_id": "tail", "v": 2})));

        assert_eq!(dir.len(), 2);
        let tail = dir.get_session_by_instance("tail").unwrap();
        assert_eq!(tail.session_data["v"], json!(2));
        assert!(tail.has_socket("a"));
    }

    #[test]
    fn test_set_session_data_conserves_sockets() {
        let (mut dir, ..) = three_instances();
        let (d, e) = (socket("d"), socket("e"));
        dir.add_session(d.clone());
        dir.add_session(e.clone());
        let before = dir.socket_count();

        dir.set_session_data("d", data(json!({"instance_id": "instance_ghi"})));
        dir.set_session_data("e", data(json!({"instance_id": "instance_ghi"})));
        dir.set_session_data("sid_abc", data(json!({"instance_id": "instance_def"})));
        dir.combine_sessions("instance_abc", "e");
        dir.set_session_data("d", data(json!({"instance_id": "brand_new"})));

        assert_eq!(dir.socket_count(), before);
    }

    #[test]
    fn test_remove_socket_keeps_instanced_session() {
        let (mut dir, ..) = three_instances();

        assert_eq!(dir.remove_socket_from_session("sid_def"), Removal::SocketRemoved);

        assert_eq!(dir.len(), 3);
        assert_eq!(dir.sessions()[1].conn.len(), 0);
        assert_eq!(dir.sessions()[1].instance_id(), "instance_def");
    }

    #[test]
    fn test_remove_socket_drops_ephemeral_session() {
        let mut dir = SessionDirectory::new();
        dir.add_session(socket("s1"));
        dir.add_session(socket("s2"));

        assert_eq!(dir.remove_socket_from_session("s1"), Removal::SessionRemoved);
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.remove_socket_from_session("s1"), Removal::NotFound);
    }

    #[test]
    fn test_remove_socket_from_shared_ephemeral_session() {
        let (a, b) = (socket("a"), socket("b"));
        let mut dir =
            SessionDirectory::from_sessions(vec![session(json!({"instance_id": ""}), &[&a, &b])]);

        assert_eq!(dir.remove_socket_from_session("a"), Removal::SocketRemoved);
        assert_eq!(dir.remove_socket_from_session("b"), Removal::SessionRemoved);
        assert!(dir.is_empty());
    }

    #[test]
    fn test_combine_sessions() {
        let (mut dir, ..) = three_instances();

        assert!(dir.combine_sessions("instance_ghi", "sid_def"));

        assert_eq!(dir.len(), 2);
        assert_eq!(dir.sessions()[1].session_data["value"], json!("lazydog"));
        assert_eq!(dir.sessions()[1].conn.len(), 2);
        assert_eq!(dir.get_session_index("sid_def"), Some(1));
    }

    #[test]
    fn test_combine_sessions_unknown_instance() {
        let (mut dir, ..) = three_instances();

        assert!(!dir.combine_sessions("instance_zzz", "sid_def"));
        assert_eq!(dir.len(), 3);
    }

    #[test]
    fn test_clone_session_shares_sockets_not_data() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let s = Socket::with_id("s", tx);
        let original = session(json!({"nested": {"n": 1}}), &[&s]);

        let mut copy = clone_session(&original);
        copy.session_data["nested"]["n"] = json!(2);
        copy.conn[0].emit("client", json!({"hello": true})).unwrap();

        assert_eq!(original.session_data["nested"]["n"], json!(1));
        assert!(rx.try_recv().is_ok());
    }
}
