//! Wire protocol messages exchanged between client and server.
//!
//! Everything on the wire is JSON. A [`Request`] is the decrypted unit; its
//! `data` payload is action-dependent (chat message, user record, plain
//! string, list of users, list of messages, or the two-integer public-key
//! tuple during the handshake), so it is kept as a raw [`serde_json::Value`]
//! and interpreted by the party that knows the action.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtoError;

/// Protocol actions. The string values are the wire format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Presence,
    Register,
    #[serde(rename = "authenticate")]
    Auth,
    Quit,
    Msg,
    Contacts,
    Search,
    AddChat,
    DelChat,
    Messages,
    ServerShutdown,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Presence => "presence",
            Action::Register => "register",
            Action::Auth => "authenticate",
            Action::Quit => "quit",
            Action::Msg => "msg",
            Action::Contacts => "contacts",
            Action::Search => "search",
            Action::AddChat => "add_chat",
            Action::DelChat => "del_chat",
            Action::Messages => "messages",
            Action::ServerShutdown => "server_shutdown",
        }
    }
}

/// Response statuses. Only ever present on server-originated messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Status {
    #[serde(rename = "200 OK")]
    Ok,
    #[serde(rename = "400 Bad Request")]
    BadRequest,
    #[serde(rename = "401 Unauthorized")]
    Unauthorized,
    #[serde(rename = "403 Forbidden")]
    Forbidden,
    #[serde(rename = "404 Not Found")]
    NotFound,
}

/// A user record as it travels on the wire.
///
/// `password` is only ever set on `register`/`authenticate` requests;
/// `token` is only ever set by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub login: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verbose_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

/// A chat message payload. Field names follow the wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    #[serde(rename = "to")]
    pub recipient: String,
    #[serde(rename = "from_")]
    pub sender: String,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl ChatMessage {
    pub fn new(sender: &str, recipient: &str, text: &str) -> Self {
        Self {
            recipient: recipient.to_string(),
            sender: sender.to_string(),
            encoding: default_encoding(),
            text: text.to_string(),
            date: Some(now()),
        }
    }
}

/// The decrypted protocol unit.
///
/// Invariants: `action` is always present; `status` appears only on
/// server-to-client messages; the shape of `data` is determined by `action`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    pub action: Action,
    pub time: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Current time in the wire format (RFC-3339).
pub fn now() -> String {
    Utc::now().to_rfc3339()
}

impl Request {
    /// A client-originated request.
    pub fn new(action: Action, user: Option<User>, data: Option<Value>) -> Self {
        Self {
            status: None,
            action,
            time: now(),
            kind: Some("request".to_string()),
            user,
            data,
        }
    }

    /// A server-originated response.
    pub fn response(status: Status, action: Action, data: Option<Value>) -> Self {
        Self {
            status: Some(status),
            action,
            time: now(),
            kind: Some("response".to_string()),
            user: None,
            data,
        }
    }

    pub fn is_response(&self) -> bool {
        self.kind.as_deref() == Some("response")
    }

    /// Interpret `data` as a typed payload.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtoError> {
        let value = self
            .data
            .clone()
            .ok_or_else(|| ProtoError::UnexpectedPayload(self.action.as_str().to_string()))?;
        serde_json::from_value(value)
            .map_err(|_| ProtoError::UnexpectedPayload(self.action.as_str().to_string()))
    }

    /// Interpret `data` as a plain string, if it is one.
    pub fn data_str(&self) -> Option<&str> {
        self.data.as_ref().and_then(Value::as_str)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_wire_names() {
        assert_eq!(serde_json::to_value(Action::Auth).unwrap(), "authenticate");
        assert_eq!(serde_json::to_value(Action::AddChat).unwrap(), "add_chat");
        assert_eq!(
            serde_json::to_value(Action::ServerShutdown).unwrap(),
            "server_shutdown"
        );
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_value(Status::Ok).unwrap(), "200 OK");
        assert_eq!(
            serde_json::to_value(Status::Unauthorized).unwrap(),
            "401 Unauthorized"
        );
    }

    #[test]
    fn absent_fields_are_excluded() {
        let request = Request::new(Action::Quit, None, None);
        let json = serde_json::to_value(&request).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("status"));
        assert!(!object.contains_key("user"));
        assert!(!object.contains_key("data"));
    }

    #[test]
    fn chat_message_wire_names() {
        let message = ChatMessage::new("alice", "bob", "hi");
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["to"], "bob");
        assert_eq!(json["from_"], "alice");
        assert_eq!(json["message"], "hi");
        assert_eq!(json["encoding"], "utf-8");
    }

    #[test]
    fn auth_request_literal() {
        let raw = r#"{"action":"authenticate","time":"2024-01-01T00:00:00Z",
                      "user":{"login":"alice","password":"pw"}}"#;
        let request = Request::from_bytes(raw.as_bytes()).unwrap();
        assert_eq!(request.action, Action::Auth);
        assert_eq!(request.user.as_ref().unwrap().login, "alice");
        assert_eq!(request.user.unwrap().password.as_deref(), Some("pw"));
    }

    #[test]
    fn round_trip() {
        let request = Request::response(
            Status::Ok,
            Action::Contacts,
            Some(
                serde_json::to_value(vec![User {
                    id: Some(1),
                    login: "alice".to_string(),
                    ..Default::default()
                }])
                .unwrap(),
            ),
        );
        let bytes = request.to_bytes().unwrap();
        let restored = Request::from_bytes(&bytes).unwrap();
        assert_eq!(restored, request);
        let users: Vec<User> = restored.data_as().unwrap();
        assert_eq!(users[0].login, "alice");
    }
}
