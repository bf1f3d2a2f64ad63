//! Events surfaced to the embedding application.
//!
//! The client pushes these over an unbounded channel as server traffic
//! arrives, so a UI can react without polling. Dropping the receiver simply
//! discards further events; the connection itself is unaffected.

use estafette_shared::proto::{ChatMessage, User};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake and presence exchange completed.
    Connected,
    /// Login accepted; carries the account with its session token.
    LoginSucceeded(User),
    /// Login refused, with the server's reason.
    LoginFailed(String),
    /// Registration refused, with the server's reason.
    RegistrationFailed(String),
    /// A fresh contact list, after a `contacts` fetch.
    ContactListUpdated(Vec<User>),
    /// An incoming chat message pushed by the server.
    NewMessage(ChatMessage),
    /// Another user added us as a contact.
    ContactRequest(User),
    /// The server no longer honors our session token.
    AuthorizationLost,
    /// The server announced it is going away.
    ServerShutdown,
    /// The connection is gone.
    Disconnected,
}
