//! The server event loop.
//!
//! Every connection gets a reader task that forwards decoded frames into one
//! mpsc channel; a single loop owns the listener, the peer table, the session
//! registry and the store, and handles one event at a time. Handlers run to
//! completion before the next event is taken, so no request ever observes
//! another request's partial effects.

use std::collections::HashMap;
use std::net::SocketAddr;

use rsa::{RsaPrivateKey, RsaPublicKey};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use estafette_shared::proto::{Action, Request};
use estafette_shared::{envelope, framing, keys};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::session::SessionRegistry;
use crate::storage::Storage;

/// What reader tasks feed into the event loop.
#[derive(Debug)]
pub(crate) enum ConnEvent {
    Frame { conn_id: u64, payload: Vec<u8> },
    Closed { conn_id: u64 },
}

/// Per-connection state owned by the event loop.
pub(crate) struct Peer {
    pub(crate) addr: SocketAddr,
    pub(crate) writer: OwnedWriteHalf,
    /// Set by the peer's `presence` request; required before we can push
    /// anything encrypted to it.
    pub(crate) public_key: Option<RsaPublicKey>,
    /// Set on successful authentication.
    pub(crate) login: Option<String>,
}

/// Asks the running server to broadcast `server_shutdown` and stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<()>,
}

impl ShutdownHandle {
    pub async fn trigger(&self) {
        let _ = self.tx.send(()).await;
    }
}

pub struct Server<S: Storage> {
    listener: TcpListener,
    pub(crate) store: S,
    pub(crate) sessions: SessionRegistry,
    pub(crate) peers: HashMap<u64, Peer>,
    next_conn_id: u64,
    public_key: RsaPublicKey,
    pub(crate) private_key: RsaPrivateKey,
    events_tx: mpsc::UnboundedSender<ConnEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnEvent>,
    shutdown_tx: mpsc::Sender<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl<S: Storage> Server<S> {
    /// Bind the listener and generate the server key pair.
    pub async fn bind(config: &ServerConfig, store: S) -> Result<Self> {
        let (public_key, private_key) = keys::generate_keypair()?;
        Self::bind_with_keypair(config, store, public_key, private_key).await
    }

    /// Bind with a pre-generated key pair.
    pub async fn bind_with_keypair(
        config: &ServerConfig,
        store: S,
        public_key: RsaPublicKey,
        private_key: RsaPrivateKey,
    ) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        info!(addr = %listener.local_addr()?, "Listening");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Ok(Self {
            listener,
            store,
            sessions: SessionRegistry::new(),
            peers: HashMap::new(),
            next_conn_id: 0,
            public_key,
            private_key,
            events_tx,
            events_rx,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Run until a shutdown is triggered.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.accept_connection(stream, addr).await,
                        Err(e) => warn!(error = %e, "Accept failed"),
                    }
                }
                Some(event) = self.events_rx.recv() => {
                    match event {
                        ConnEvent::Frame { conn_id, payload } => {
                            self.handle_frame(conn_id, payload).await;
                        }
                        ConnEvent::Closed { conn_id } => {
                            self.teardown(conn_id);
                        }
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Shutting down");
                    self.broadcast_shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    /// Announce our public key in clear text, then hand the read half to a
    /// reader task.
    async fn accept_connection(&mut self, stream: TcpStream, addr: SocketAddr) {
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "set_nodelay failed");
        }
        let (mut read_half, mut write_half) = stream.into_split();

        let handshake = match keys::public_key_to_wire(&self.public_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Could not encode server key");
                return;
            }
        };
        if let Err(e) = framing::write_frame(&mut write_half, &handshake).await {
            debug!(%addr, error = %e, "Handshake write failed");
            return;
        }

        info!(%addr, conn_id, "Connection accepted");
        self.peers.insert(
            conn_id,
            Peer {
                addr,
                writer: write_half,
                public_key: None,
                login: None,
            },
        );

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            loop {
                match framing::read_frame(&mut read_half).await {
                    Ok(Some(payload)) => {
                        if events.send(ConnEvent::Frame { conn_id, payload }).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        debug!(conn_id, error = %e, "Read failed");
                        break;
                    }
                }
            }
            let _ = events.send(ConnEvent::Closed { conn_id });
        });
    }

    /// Drop a connection and, if it owned its login's session, the session.
    /// A session stolen by a newer connection stays with the newer one.
    pub(crate) fn teardown(&mut self, conn_id: u64) {
        let Some(peer) = self.peers.remove(&conn_id) else {
            return;
        };
        info!(addr = %peer.addr, conn_id, "Connection closed");

        if let Some(login) = peer.login {
            if self
                .sessions
                .lookup(&login)
                .is_some_and(|session| session.conn_id == conn_id)
            {
                self.sessions.unregister(&login);
                debug!(%login, "Session ended");
            }
        }
    }

    /// Seal a request for a connection and write it out.
    pub(crate) async fn send_to(&mut self, conn_id: u64, request: &Request) -> Result<()> {
        let peer = self
            .peers
            .get_mut(&conn_id)
            .ok_or(ServerError::PeerNotConnected(conn_id))?;
        let key = peer
            .public_key
            .as_ref()
            .ok_or(ServerError::NoPeerKey(conn_id))?;

        let plaintext = request.to_bytes()?;
        let sealed = envelope::seal(&plaintext, key)?;
        framing::write_frame(&mut peer.writer, &sealed).await?;
        Ok(())
    }

    /// Send a response, logging instead of propagating write failures; the
    /// reader task will surface the close.
    pub(crate) async fn respond(&mut self, conn_id: u64, request: Request) {
        if let Err(e) = self.send_to(conn_id, &request).await {
            debug!(conn_id, error = %e, "Response not delivered");
        }
    }

    /// Flush queued push notifications to a login's live connection. Anything
    /// that still fails to send goes back on the queue.
    pub(crate) async fn drain_pending(&mut self, login: &str) {
        let Some(session) = self.sessions.lookup_mut(login) else {
            return;
        };
        let conn_id = session.conn_id;
        let mut queued = std::mem::take(&mut session.pending);

        while let Some(request) = queued.pop_front() {
            if let Err(e) = self.send_to(conn_id, &request).await {
                debug!(%login, error = %e, "Push still undeliverable");
                queued.push_front(request);
                break;
            }
        }

        if !queued.is_empty() {
            if let Some(session) = self.sessions.lookup_mut(login) {
                session.pending = queued;
            }
        }
    }

    /// Tell every keyed peer the server is going away.
    async fn broadcast_shutdown(&mut self) {
        let notice = Request::new(Action::ServerShutdown, None, None);
        let conn_ids: Vec<u64> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.public_key.is_some())
            .map(|(id, _)| *id)
            .collect();

        for conn_id in conn_ids {
            if let Err(e) = self.send_to(conn_id, &notice).await {
                debug!(conn_id, error = %e, "Shutdown notice not delivered");
            }
        }
    }
}
