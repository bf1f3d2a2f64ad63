//! Request dispatch and the per-action handlers.
//!
//! A frame arrives sealed; anything that fails to decrypt is dropped without
//! an answer. Once decrypted, `presence`, `register` and `authenticate` are
//! open to anyone; every other action requires a session token that matches
//! both the login and the connection it was issued on.

use chrono::{DateTime, Utc};
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use estafette_shared::crypto;
use estafette_shared::envelope;
use estafette_shared::keys;
use estafette_shared::proto::{Action, ChatMessage, Request, Status, User};
use estafette_store::{StoreError, UserRecord};

use crate::server::Server;
use crate::session::SessionRegistry;
use crate::storage::Storage;

/// Check the token on a gated request against the session registry.
///
/// The token must match the login's live session byte-for-byte, and the
/// session must belong to this connection: tokens are derived from the login,
/// so a replaced connection would otherwise still hold a valid one.
pub(crate) fn authorize(
    sessions: &SessionRegistry,
    conn_id: u64,
    request: &Request,
) -> Option<User> {
    let user = request.user.as_ref()?;
    let token = user.token.as_deref()?;
    let session = sessions.lookup(&user.login)?;
    if session.conn_id != conn_id {
        return None;
    }
    if bool::from(session.token.as_bytes().ct_eq(token.as_bytes())) {
        Some(session.user.clone())
    } else {
        None
    }
}

fn wire_user(record: &UserRecord) -> User {
    User {
        id: Some(record.id),
        login: record.login.clone(),
        password: None,
        verbose_name: record.verbose_name.clone(),
        token: None,
    }
}

fn text_response(status: Status, action: Action, message: impl Into<String>) -> Request {
    Request::response(status, action, Some(Value::String(message.into())))
}

impl<S: Storage> Server<S> {
    pub(crate) async fn handle_frame(&mut self, conn_id: u64, payload: Vec<u8>) {
        let plaintext = match envelope::open(&payload, &self.private_key) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                debug!(conn_id, "Undecryptable frame dropped");
                return;
            }
        };

        let request = match Request::from_bytes(&plaintext) {
            Ok(request) => request,
            Err(e) => {
                self.reject_malformed(conn_id, &plaintext, e).await;
                return;
            }
        };

        match request.action {
            Action::Presence => self.handle_presence(conn_id, request).await,
            Action::Register => self.handle_register(conn_id, request).await,
            Action::Auth => self.handle_auth(conn_id, request).await,
            Action::ServerShutdown => {
                debug!(conn_id, "Client sent server_shutdown, ignored");
            }
            // `quit` never answers, whether or not a session exists.
            Action::Quit => {
                self.teardown(conn_id);
                return;
            }
            _ => {
                let Some(user) = authorize(&self.sessions, conn_id, &request) else {
                    let denial = text_response(
                        Status::Unauthorized,
                        request.action,
                        "Session is not authorized",
                    );
                    self.respond(conn_id, denial).await;
                    self.teardown(conn_id);
                    return;
                };
                match request.action {
                    Action::Msg => self.handle_msg(conn_id, &user, request).await,
                    Action::Contacts => self.handle_contacts(conn_id, &user).await,
                    Action::Search => self.handle_search(conn_id, &user, request).await,
                    Action::AddChat => self.handle_add_chat(conn_id, &user, request).await,
                    Action::DelChat => self.handle_del_chat(conn_id, &user, request).await,
                    Action::Messages => self.handle_messages(conn_id, &user).await,
                    _ => unreachable!("open actions handled above"),
                }
            }
        }

        // A request cycle is also the retry point for queued pushes.
        let login = self
            .peers
            .get(&conn_id)
            .and_then(|peer| peer.login.clone());
        if let Some(login) = login {
            self.drain_pending(&login).await;
        }
    }

    /// Valid JSON with a recognizable action gets a 400 naming the problem;
    /// anything less coherent is dropped.
    async fn reject_malformed(&mut self, conn_id: u64, plaintext: &[u8], error: serde_json::Error) {
        let action = serde_json::from_slice::<Value>(plaintext)
            .ok()
            .and_then(|value| value.get("action").cloned())
            .and_then(|value| serde_json::from_value::<Action>(value).ok());

        match action {
            Some(action) => {
                let reply =
                    text_response(Status::BadRequest, action, format!("Malformed request: {error}"));
                self.respond(conn_id, reply).await;
            }
            None => debug!(conn_id, %error, "Unparseable frame dropped"),
        }
    }

    /// `presence` carries the client's public key; nothing encrypted can go
    /// back to this peer until it succeeds.
    async fn handle_presence(&mut self, conn_id: u64, request: Request) {
        let key = request
            .data
            .as_ref()
            .ok_or(())
            .and_then(|value| keys::decode_public_key(value).map_err(|_| ()));
        let Ok(key) = key else {
            debug!(conn_id, "Presence without a usable public key dropped");
            return;
        };

        if let Some(peer) = self.peers.get_mut(&conn_id) {
            peer.public_key = Some(key);
        }
        let reply = text_response(Status::Ok, Action::Presence, "Success");
        self.respond(conn_id, reply).await;
    }

    async fn handle_register(&mut self, conn_id: u64, request: Request) {
        let Some(user) = request.user.as_ref() else {
            let reply = text_response(Status::Unauthorized, Action::Register, "Password required");
            self.respond(conn_id, reply).await;
            return;
        };
        let Some(password) = user.password.as_deref() else {
            let reply = text_response(Status::Unauthorized, Action::Register, "Password required");
            self.respond(conn_id, reply).await;
            return;
        };

        let hash = crypto::hash_password(password);
        match self
            .store
            .create_user(&user.login, &hash, user.verbose_name.as_deref())
        {
            Ok(id) => {
                debug!(login = %user.login, id, "User registered");
                // A fresh account logs straight in.
                self.handle_auth(conn_id, request).await;
            }
            Err(StoreError::AlreadyExists(_)) => {
                let reply = text_response(
                    Status::Unauthorized,
                    Action::Register,
                    format!("User {} already exist", user.login),
                );
                self.respond(conn_id, reply).await;
            }
            Err(e) => self.store_failure(conn_id, Action::Register, e).await,
        }
    }

    async fn handle_auth(&mut self, conn_id: u64, request: Request) {
        let denied = || {
            text_response(
                Status::Unauthorized,
                Action::Auth,
                "Wrong login and/or password",
            )
        };

        let credentials = request
            .user
            .as_ref()
            .and_then(|user| user.password.as_deref().map(|pw| (user.login.clone(), pw)));
        let Some((login, password)) = credentials else {
            self.respond(conn_id, denied()).await;
            return;
        };

        let record = match self.store.get_user(&login) {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.respond(conn_id, denied()).await;
                return;
            }
            Err(e) => {
                self.store_failure(conn_id, Action::Auth, e).await;
                return;
            }
        };

        let presented = crypto::hash_password(password);
        if !bool::from(presented.as_bytes().ct_eq(record.password_hash.as_bytes())) {
            self.respond(conn_id, denied()).await;
            return;
        }

        let address = self
            .peers
            .get(&conn_id)
            .map(|peer| peer.addr.ip().to_string())
            .unwrap_or_default();
        if let Err(e) = self.store.record_login(record.id, &address) {
            warn!(%login, error = %e, "Login not recorded");
        }

        let token = crypto::session_token(&login);
        let account = User {
            id: Some(record.id),
            login: login.clone(),
            password: None,
            verbose_name: record.verbose_name.clone(),
            token: Some(token.clone()),
        };

        if let Some(replaced) = self.sessions.register(account.clone(), token, conn_id) {
            debug!(%login, old_conn = replaced.conn_id, "Session replaced");
        }
        if let Some(peer) = self.peers.get_mut(&conn_id) {
            peer.login = Some(login.clone());
        }

        // Registration falls through here, so the reply always reads as a
        // completed login.
        let mut reply = Request::response(Status::Ok, Action::Auth, None);
        reply.user = Some(account);
        self.respond(conn_id, reply).await;
    }

    /// Store-and-forward. No response: the sender learns nothing unless the
    /// request itself was unusable.
    async fn handle_msg(&mut self, conn_id: u64, user: &User, request: Request) {
        let chat: ChatMessage = match request.data_as() {
            Ok(chat) => chat,
            Err(_) => {
                let reply = text_response(Status::BadRequest, Action::Msg, "Malformed message");
                self.respond(conn_id, reply).await;
                return;
            }
        };

        let recipient = match self.store.get_user(&chat.recipient) {
            Ok(Some(record)) => record,
            Ok(None) => {
                let reply = text_response(
                    Status::NotFound,
                    Action::Msg,
                    format!("User {} not found", chat.recipient),
                );
                self.respond(conn_id, reply).await;
                return;
            }
            Err(e) => {
                self.store_failure(conn_id, Action::Msg, e).await;
                return;
            }
        };

        let date = chat
            .date
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        let online = self
            .sessions
            .lookup(&recipient.login)
            .map(|session| session.conn_id);
        let delivered = online.is_some();

        let Some(sender_id) = user.id else {
            warn!(login = %user.login, "Session user without an id");
            return;
        };
        if let Err(e) = self
            .store
            .create_message(sender_id, recipient.id, &chat.text, date, delivered)
        {
            self.store_failure(conn_id, Action::Msg, e).await;
            return;
        }

        if let Some(recipient_conn) = online {
            // The forward reaches a third party; the sender's session token
            // must not.
            let mut push = request;
            if let Some(sender) = push.user.as_mut() {
                sender.token = None;
            }
            if let Err(e) = self.send_to(recipient_conn, &push).await {
                debug!(recipient = %recipient.login, error = %e, "Forward queued");
                if let Some(session) = self.sessions.lookup_mut(&recipient.login) {
                    session.pending.push_back(push);
                }
            }
        }
    }

    async fn handle_contacts(&mut self, conn_id: u64, user: &User) {
        let Some(user_id) = user.id else {
            return;
        };
        match self.store.get_contacts(user_id) {
            Ok(records) => {
                let contacts: Vec<User> = records.iter().map(wire_user).collect();
                let reply = Request::response(
                    Status::Ok,
                    Action::Contacts,
                    serde_json::to_value(contacts).ok(),
                );
                self.respond(conn_id, reply).await;
            }
            Err(e) => self.store_failure(conn_id, Action::Contacts, e).await,
        }
    }

    async fn handle_search(&mut self, conn_id: u64, _user: &User, request: Request) {
        let Some(pattern) = request.data_str() else {
            let reply = text_response(Status::BadRequest, Action::Search, "Search pattern required");
            self.respond(conn_id, reply).await;
            return;
        };
        let pattern = pattern.to_string();

        match self.store.search_users(&pattern) {
            Ok(records) => {
                let found: Vec<User> = records.iter().map(wire_user).collect();
                let reply = Request::response(
                    Status::Ok,
                    Action::Search,
                    serde_json::to_value(found).ok(),
                );
                self.respond(conn_id, reply).await;
            }
            Err(e) => self.store_failure(conn_id, Action::Search, e).await,
        }
    }

    async fn handle_add_chat(&mut self, conn_id: u64, user: &User, request: Request) {
        let Some(other_login) = request.data_str().map(str::to_string) else {
            let reply = text_response(Status::BadRequest, Action::AddChat, "Contact login required");
            self.respond(conn_id, reply).await;
            return;
        };
        let Some(user_id) = user.id else {
            return;
        };

        let other = match self.store.get_user(&other_login) {
            Ok(Some(record)) => record,
            Ok(None) => {
                let reply = text_response(
                    Status::NotFound,
                    Action::AddChat,
                    format!("User {other_login} not found"),
                );
                self.respond(conn_id, reply).await;
                return;
            }
            Err(e) => {
                self.store_failure(conn_id, Action::AddChat, e).await;
                return;
            }
        };

        match self.store.create_contact_edge(user_id, other.id) {
            Ok(_) => {}
            Err(StoreError::AlreadyExists(what)) => {
                let reply = text_response(
                    Status::BadRequest,
                    Action::AddChat,
                    format!("{what} already exists"),
                );
                self.respond(conn_id, reply).await;
                return;
            }
            Err(e) => {
                self.store_failure(conn_id, Action::AddChat, e).await;
                return;
            }
        }

        // The other party learns it gained a contact, immediately or on its
        // next request cycle.
        if let Some(other_conn) = self
            .sessions
            .lookup(&other.login)
            .map(|session| session.conn_id)
        {
            let mut initiator = user.clone();
            initiator.token = None;
            let mut notice = Request::new(
                Action::AddChat,
                None,
                serde_json::to_value(initiator).ok(),
            );
            notice.status = Some(Status::Ok);
            if self.send_to(other_conn, &notice).await.is_err() {
                if let Some(session) = self.sessions.lookup_mut(&other.login) {
                    session.pending.push_back(notice);
                }
            }
        }

        let reply = Request::response(
            Status::Ok,
            Action::AddChat,
            serde_json::to_value(wire_user(&other)).ok(),
        );
        self.respond(conn_id, reply).await;
    }

    async fn handle_del_chat(&mut self, conn_id: u64, user: &User, request: Request) {
        let Some(other_login) = request.data_str().map(str::to_string) else {
            let reply = text_response(Status::BadRequest, Action::DelChat, "Contact login required");
            self.respond(conn_id, reply).await;
            return;
        };
        let Some(user_id) = user.id else {
            return;
        };

        let other = match self.store.get_user(&other_login) {
            Ok(Some(record)) => record,
            Ok(None) => {
                let reply = text_response(
                    Status::NotFound,
                    Action::DelChat,
                    format!("User {other_login} not found"),
                );
                self.respond(conn_id, reply).await;
                return;
            }
            Err(e) => {
                self.store_failure(conn_id, Action::DelChat, e).await;
                return;
            }
        };

        match self.store.delete_contact_edge(user_id, other.id) {
            Ok(()) => {
                let reply = text_response(Status::Ok, Action::DelChat, "Success");
                self.respond(conn_id, reply).await;
            }
            Err(StoreError::NotFound) => {
                let reply = text_response(Status::NotFound, Action::DelChat, "Chat not found");
                self.respond(conn_id, reply).await;
            }
            Err(e) => self.store_failure(conn_id, Action::DelChat, e).await,
        }
    }

    /// Hand over everything stored while the user was offline, marking it
    /// delivered in the same call.
    async fn handle_messages(&mut self, conn_id: u64, user: &User) {
        let Some(user_id) = user.id else {
            return;
        };
        match self.store.get_undelivered_messages(user_id) {
            Ok(stored) => {
                let backlog: Vec<ChatMessage> = stored
                    .iter()
                    .map(|message| ChatMessage {
                        recipient: message.recipient.clone(),
                        sender: message.sender.clone(),
                        encoding: "utf-8".to_string(),
                        text: message.text.clone(),
                        date: Some(message.date.to_rfc3339()),
                    })
                    .collect();
                let reply = Request::response(
                    Status::Ok,
                    Action::Messages,
                    serde_json::to_value(backlog).ok(),
                );
                self.respond(conn_id, reply).await;
            }
            Err(e) => self.store_failure(conn_id, Action::Messages, e).await,
        }
    }

    async fn store_failure(&mut self, conn_id: u64, action: Action, error: StoreError) {
        warn!(conn_id, action = action.as_str(), %error, "Store operation failed");
        let reply = text_response(Status::BadRequest, action, "Request could not be processed");
        self.respond(conn_id, reply).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(login: &str, token: &str, conn_id: u64) -> SessionRegistry {
        let mut registry = SessionRegistry::new();
        let user = User {
            id: Some(1),
            login: login.to_string(),
            ..Default::default()
        };
        registry.register(user, token.to_string(), conn_id);
        registry
    }

    fn gated_request(login: &str, token: Option<&str>) -> Request {
        let user = User {
            login: login.to_string(),
            token: token.map(str::to_string),
            ..Default::default()
        };
        Request::new(Action::Contacts, Some(user), None)
    }

    #[test]
    fn valid_token_authorizes() {
        let registry = registry_with("alice", "tok", 3);
        let user = authorize(&registry, 3, &gated_request("alice", Some("tok"))).unwrap();
        assert_eq!(user.id, Some(1));
    }

    #[test]
    fn wrong_token_refused() {
        let registry = registry_with("alice", "tok", 3);
        assert!(authorize(&registry, 3, &gated_request("alice", Some("forged"))).is_none());
    }

    #[test]
    fn missing_token_refused() {
        let registry = registry_with("alice", "tok", 3);
        assert!(authorize(&registry, 3, &gated_request("alice", None)).is_none());
    }

    #[test]
    fn stale_connection_refused() {
        // The session moved to connection 4; the old connection still holds
        // a byte-identical token but no longer owns the session.
        let registry = registry_with("alice", "tok", 4);
        assert!(authorize(&registry, 3, &gated_request("alice", Some("tok"))).is_none());
    }

    #[test]
    fn unknown_login_refused() {
        let registry = SessionRegistry::new();
        assert!(authorize(&registry, 3, &gated_request("alice", Some("tok"))).is_none());
    }
}
