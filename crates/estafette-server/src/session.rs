//! In-memory session registry.
//!
//! A [`Session`] binds a live connection to an authenticated user and its
//! issued token, plus a queue of push notifications that could not be
//! delivered immediately. The registry is owned by the server's event-loop
//! task; nothing here is shared across threads.

use std::collections::{HashMap, VecDeque};

use estafette_shared::proto::{Request, User};

/// One logged-in user on one connection.
#[derive(Debug)]
pub struct Session {
    /// The authenticated user as it appears on the wire (id, login,
    /// verbose_name, token — never the password).
    pub user: User,
    /// The issued session token.
    pub token: String,
    /// The connection currently bound to this login.
    pub conn_id: u64,
    /// Push notifications that failed to send, retried on the peer's next
    /// request cycle.
    pub pending: VecDeque<Request>,
}

/// Mapping from login to live session. At most one session per login: a
/// second authentication for the same account replaces the first, and the
/// stale connection's next gated request is refused.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    by_login: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, returning the replaced one if the login was
    /// already online.
    pub fn register(&mut self, user: User, token: String, conn_id: u64) -> Option<Session> {
        let login = user.login.clone();
        self.by_login.insert(
            login,
            Session {
                user,
                token,
                conn_id,
                pending: VecDeque::new(),
            },
        )
    }

    pub fn lookup(&self, login: &str) -> Option<&Session> {
        self.by_login.get(login)
    }

    pub fn lookup_mut(&mut self, login: &str) -> Option<&mut Session> {
        self.by_login.get_mut(login)
    }

    pub fn unregister(&mut self, login: &str) -> Option<Session> {
        self.by_login.remove(login)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(login: &str) -> User {
        User {
            id: Some(1),
            login: login.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn register_lookup_unregister() {
        let mut registry = SessionRegistry::new();
        assert!(registry.register(user("alice"), "tok".into(), 7).is_none());

        let session = registry.lookup("alice").unwrap();
        assert_eq!(session.conn_id, 7);
        assert_eq!(session.token, "tok");

        registry.unregister("alice").unwrap();
        assert!(registry.lookup("alice").is_none());
    }

    #[test]
    fn second_login_replaces_session() {
        let mut registry = SessionRegistry::new();
        registry.register(user("alice"), "tok".into(), 1);

        let replaced = registry.register(user("alice"), "tok".into(), 2).unwrap();
        assert_eq!(replaced.conn_id, 1);
        assert_eq!(registry.lookup("alice").unwrap().conn_id, 2);

        // Only one entry survives the replacement.
        registry.unregister("alice").unwrap();
        assert!(registry.lookup("alice").is_none());
    }

    #[test]
    fn unknown_login_is_absent() {
        let registry = SessionRegistry::new();
        assert!(registry.lookup("nobody").is_none());
    }
}
