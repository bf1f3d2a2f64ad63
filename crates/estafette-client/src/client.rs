//! The async client handle.
//!
//! One read task decrypts everything coming off the socket and splits it into
//! two streams: responses resolve the single in-flight request, pushes become
//! [`ClientEvent`]s. Requests are serialized by an internal lock, matching a
//! protocol with no request ids.

use std::sync::Arc;
use std::time::Duration;

use rsa::{RsaPrivateKey, RsaPublicKey};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::debug;

use estafette_shared::proto::{Action, ChatMessage, Request, Status, User};
use estafette_shared::{envelope, framing, keys};

use crate::error::{ClientError, Result};
use crate::events::ClientEvent;

const CALL_TIMEOUT: Duration = Duration::from_secs(10);

struct Inner {
    writer: Mutex<OwnedWriteHalf>,
    server_key: RsaPublicKey,
    public_key: RsaPublicKey,
    private_key: RsaPrivateKey,
    /// The authenticated account, with its token, once login succeeds.
    user: std::sync::Mutex<Option<User>>,
    /// The single in-flight request's completion slot.
    pending: std::sync::Mutex<Option<oneshot::Sender<Request>>>,
    /// Serializes calls; the protocol has no way to match concurrent ones.
    call_lock: Mutex<()>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Connect with a freshly generated key pair.
    pub async fn connect(
        addr: impl ToSocketAddrs,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>)> {
        let (public_key, private_key) = keys::generate_keypair()?;
        Self::connect_with_keypair(addr, public_key, private_key).await
    }

    /// Connect with a caller-supplied key pair.
    ///
    /// Reads the server's clear-text key announcement, starts the read task,
    /// and completes the `presence` exchange before returning.
    pub async fn connect_with_keypair(
        addr: impl ToSocketAddrs,
        public_key: RsaPublicKey,
        private_key: RsaPrivateKey,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ClientEvent>)> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut read_half, write_half) = stream.into_split();

        let announcement = framing::read_frame(&mut read_half)
            .await?
            .ok_or(ClientError::ConnectionClosed)?;
        let server_key = keys::public_key_from_wire(&announcement)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            writer: Mutex::new(write_half),
            server_key,
            public_key,
            private_key,
            user: std::sync::Mutex::new(None),
            pending: std::sync::Mutex::new(None),
            call_lock: Mutex::new(()),
            events: events_tx,
        });

        tokio::spawn(read_loop(inner.clone(), read_half));

        let client = Self { inner };
        let key_tuple = keys::encode_public_key(&client.inner.public_key)?;
        let response = client
            .call(Request::new(Action::Presence, None, Some(key_tuple)))
            .await?;
        expect_ok(response)?;
        client.emit(ClientEvent::Connected);

        Ok((client, events_rx))
    }

    /// The logged-in account, if any.
    pub fn user(&self) -> Option<User> {
        self.inner.user.lock().ok().and_then(|guard| guard.clone())
    }

    /// Create an account; on success the server logs it straight in.
    pub async fn register(&self, login: &str, password: &str) -> Result<User> {
        self.finish_login(Action::Register, login, password).await
    }

    pub async fn authenticate(&self, login: &str, password: &str) -> Result<User> {
        self.finish_login(Action::Auth, login, password).await
    }

    async fn finish_login(&self, action: Action, login: &str, password: &str) -> Result<User> {
        let credentials = User {
            login: login.to_string(),
            password: Some(password.to_string()),
            ..Default::default()
        };
        let response = self.call(Request::new(action, Some(credentials), None)).await?;

        if response.status == Some(Status::Ok) {
            if let Some(account) = response.user.clone() {
                if let Ok(mut guard) = self.inner.user.lock() {
                    *guard = Some(account.clone());
                }
                self.emit(ClientEvent::LoginSucceeded(account.clone()));
                return Ok(account);
            }
        }

        let message = response
            .data_str()
            .unwrap_or("Login refused")
            .to_string();
        self.emit(match action {
            Action::Register => ClientEvent::RegistrationFailed(message.clone()),
            _ => ClientEvent::LoginFailed(message.clone()),
        });
        Err(ClientError::Rejected {
            status: response.status,
            message,
        })
    }

    /// Fire-and-forget: the server answers only if something is wrong, and
    /// that answer arrives as a push.
    pub async fn send_message(&self, recipient: &str, text: &str) -> Result<()> {
        let identity = self.identity()?;
        let chat = ChatMessage::new(&identity.login, recipient, text);
        let request = Request::new(
            Action::Msg,
            Some(identity),
            Some(serde_json::to_value(chat)?),
        );
        self.send(&request).await
    }

    /// Fetch the contact list; also emitted as [`ClientEvent::ContactListUpdated`].
    pub async fn contacts(&self) -> Result<Vec<User>> {
        let request = Request::new(Action::Contacts, Some(self.identity()?), None);
        let response = expect_ok(self.call(request).await?)?;
        let contacts: Vec<User> = response.data_as()?;
        self.emit(ClientEvent::ContactListUpdated(contacts.clone()));
        Ok(contacts)
    }

    /// Find users by a SQL LIKE pattern, e.g. `"ali%"`.
    pub async fn search(&self, pattern: &str) -> Result<Vec<User>> {
        let request = Request::new(
            Action::Search,
            Some(self.identity()?),
            Some(serde_json::Value::String(pattern.to_string())),
        );
        let response = expect_ok(self.call(request).await?)?;
        Ok(response.data_as()?)
    }

    /// Add a mutual contact; returns the other party's record.
    pub async fn add_contact(&self, login: &str) -> Result<User> {
        let request = Request::new(
            Action::AddChat,
            Some(self.identity()?),
            Some(serde_json::Value::String(login.to_string())),
        );
        let response = expect_ok(self.call(request).await?)?;
        Ok(response.data_as()?)
    }

    pub async fn del_contact(&self, login: &str) -> Result<()> {
        let request = Request::new(
            Action::DelChat,
            Some(self.identity()?),
            Some(serde_json::Value::String(login.to_string())),
        );
        expect_ok(self.call(request).await?)?;
        Ok(())
    }

    /// Collect everything stored while we were offline.
    pub async fn fetch_messages(&self) -> Result<Vec<ChatMessage>> {
        let request = Request::new(Action::Messages, Some(self.identity()?), None);
        let response = expect_ok(self.call(request).await?)?;
        Ok(response.data_as()?)
    }

    /// Announce departure. The server drops the connection without answering.
    pub async fn quit(&self) -> Result<()> {
        let request = Request::new(Action::Quit, Some(self.identity()?), None);
        self.send(&request).await
    }

    fn identity(&self) -> Result<User> {
        let mut identity = self.user().ok_or(ClientError::NotAuthenticated)?;
        identity.password = None;
        Ok(identity)
    }

    /// Send a request and wait for the response.
    async fn call(&self, request: Request) -> Result<Request> {
        let _serialized = self.inner.call_lock.lock().await;

        let (tx, rx) = oneshot::channel();
        if let Ok(mut slot) = self.inner.pending.lock() {
            *slot = Some(tx);
        }

        self.send(&request).await?;

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ClientError::ConnectionClosed),
            Err(_) => {
                if let Ok(mut slot) = self.inner.pending.lock() {
                    slot.take();
                }
                Err(ClientError::Timeout)
            }
        }
    }

    /// Seal and write one request without waiting for anything back.
    async fn send(&self, request: &Request) -> Result<()> {
        let plaintext = request.to_bytes()?;
        let sealed = envelope::seal(&plaintext, &self.inner.server_key)?;
        let mut writer = self.inner.writer.lock().await;
        framing::write_frame(&mut *writer, &sealed).await?;
        Ok(())
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.inner.events.send(event);
    }
}

async fn read_loop(inner: Arc<Inner>, mut read_half: OwnedReadHalf) {
    loop {
        let frame = match framing::read_frame(&mut read_half).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Read failed");
                break;
            }
        };

        let plaintext = match envelope::open(&frame, &inner.private_key) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                debug!("Undecryptable frame dropped");
                continue;
            }
        };
        let message = match Request::from_bytes(&plaintext) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Unparseable frame dropped");
                continue;
            }
        };

        dispatch(&inner, message);
    }

    // Fail the in-flight call, if any, then tell the application.
    if let Ok(mut slot) = inner.pending.lock() {
        slot.take();
    }
    let _ = inner.events.send(ClientEvent::Disconnected);
}

fn dispatch(inner: &Arc<Inner>, message: Request) {
    if message.is_response() {
        // A denial on anything but login means our session is gone.
        if message.status == Some(Status::Unauthorized)
            && !matches!(message.action, Action::Auth | Action::Register)
        {
            let _ = inner.events.send(ClientEvent::AuthorizationLost);
        }
        let slot = inner.pending.lock().ok().and_then(|mut guard| guard.take());
        match slot {
            Some(tx) => {
                let _ = tx.send(message);
            }
            None => debug!(action = message.action.as_str(), "Unmatched response dropped"),
        }
        return;
    }

    match message.action {
        Action::Msg => match message.data_as::<ChatMessage>() {
            Ok(chat) => {
                let _ = inner.events.send(ClientEvent::NewMessage(chat));
            }
            Err(_) => debug!("Push message without a chat payload dropped"),
        },
        Action::AddChat => match message.data_as::<User>() {
            Ok(initiator) => {
                let _ = inner.events.send(ClientEvent::ContactRequest(initiator));
            }
            Err(_) => debug!("Contact push without a user payload dropped"),
        },
        Action::ServerShutdown => {
            let _ = inner.events.send(ClientEvent::ServerShutdown);
        }
        other => debug!(action = other.as_str(), "Unexpected push dropped"),
    }
}

fn expect_ok(response: Request) -> Result<Request> {
    if response.status == Some(Status::Ok) {
        Ok(response)
    } else {
        let message = response.data_str().unwrap_or("Request refused").to_string();
        Err(ClientError::Rejected {
            status: response.status,
            message,
        })
    }
}
