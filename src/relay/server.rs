//! Multi-client relay server.
//!
//! Every accepted connection runs as a reader task plus a writer task that
//! drains the session's outbound queue. Routing locks the room only to pick
//! recipients; frames are queued after the lock is released. A session whose
//! queue is closed or full is dead and gets evicted once the current pass is
//! done. Eviction cancels the session's token, which stops its reader and
//! writer even when the peer has stopped reading.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::crypto::{self, CipherError, Secret};
use crate::store::RosterStore;

use super::config::{HandshakePolicy, RelayConfig};
use super::error::RelayError;
use super::protocol::{self, Handshake, Inbound};
use super::room::{Outbound, OutboundFrame, Room, Session, SessionId};
use super::transport::{Connection, FrameReader, FrameWriter};

/// Extra time allowed for connection tasks to wind down after the grace period.
const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

struct Shared {
    config: RelayConfig,
    port: u16,
    secret: Secret,
    room: Mutex<Room>,
    shutdown: CancellationToken,
    next_id: AtomicU64,
}

impl Shared {
    fn new(config: RelayConfig, port: u16, secret: Secret) -> Self {
        Self {
            config,
            port,
            secret,
            room: Mutex::new(Room::default()),
            shutdown: CancellationToken::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Encrypts `text` into a frame ready to queue.
    fn seal(&self, text: &str) -> OutboundFrame {
        crypto::encrypt(&self.secret, text.as_bytes())
            .to_string()
            .into_bytes()
            .into()
    }

    /// Sends `text` to every session except `exclude`, then evicts the dead
    /// ones and announces each departure.
    async fn broadcast(&self, text: String, exclude: Option<SessionId>) {
        let mut pending = VecDeque::from([(text, exclude)]);

        while let Some((text, exclude)) = pending.pop_front() {
            let targets = self.room.lock().await.recipients_except(exclude);
            for id in deliver(&targets, self.seal(&text)) {
                if let Some(session) = self.remove(id).await {
                    pending.push_back((protocol::left_notice(&session.username), None));
                }
            }
        }
    }

    async fn remove(&self, id: SessionId) -> Option<Session> {
        let removed = self.room.lock().await.remove(id);
        if let Some(session) = &removed {
            info!("{} left ({})", session.username, session.peer_addr);
        }
        removed
    }

    /// Removes a session and announces it. Only the first call for an id does anything.
    async fn evict(&self, id: SessionId) {
        if let Some(session) = self.remove(id).await {
            self.broadcast(protocol::left_notice(&session.username), None)
                .await;
        }
    }

    async fn send_to_session(&self, id: SessionId, text: &str) {
        let target = self.room.lock().await.recipient(id);
        if let Some(outbound) = target {
            if !deliver(&[(id, outbound)], self.seal(text)).is_empty() {
                self.evict(id).await;
            }
        }
    }

    /// Delivers to every session named `target`. True if at least one got it.
    async fn send_directed(&self, target: &str, text: &str) -> bool {
        let targets = self.room.lock().await.recipients_named(target);
        if targets.is_empty() {
            return false;
        }

        let dead = deliver(&targets, self.seal(text));
        let delivered = dead.len() < targets.len();
        for id in dead {
            self.evict(id).await;
        }
        delivered
    }

    /// Decrypts and routes one inbound frame.
    async fn dispatch(&self, id: SessionId, username: &str, frame: &[u8]) {
        let plaintext = match std::str::from_utf8(frame)
            .map_err(|_| CipherError::InvalidUtf8)
            .and_then(|envelope| crypto::decrypt_text(&self.secret, envelope))
        {
            Ok(text) => text,
            Err(e) => {
                warn!("Dropping undecryptable frame from {}: {}", username, e);
                return;
            }
        };

        match protocol::classify(&plaintext) {
            Inbound::Broadcast(text) => {
                debug!("Broadcast from {} ({} bytes)", username, text.len());
                self.broadcast(protocol::broadcast_line(username, text), Some(id))
                    .await;
            }
            Inbound::Directed { target, body } => {
                debug!("Directed message from {} to {}", username, target);
                let delivered = self
                    .send_directed(target, &protocol::private_line(username, body))
                    .await;
                let ack = if delivered {
                    protocol::private_sent_ack(target)
                } else {
                    protocol::user_not_found(target)
                };
                self.send_to_session(id, &ack).await;
            }
            Inbound::BadDirected => {
                debug!("Malformed directed message from {}", username);
                self.send_to_session(id, &protocol::usage_notice()).await;
            }
        }
    }

    /// Announces termination, waits the grace period, then drops every session.
    async fn close_all(&self) {
        let targets = self.room.lock().await.recipients_except(None);
        deliver(&targets, self.seal(&protocol::termination_notice(self.port)));

        tokio::time::sleep(self.config.shutdown_grace()).await;

        let sessions = self.room.lock().await.drain();
        info!("Closed {} session(s)", sessions.len());
    }
}

/// Queues `frame` for every target; returns the ids whose queue is closed or full.
fn deliver(targets: &[(SessionId, Outbound)], frame: OutboundFrame) -> Vec<SessionId> {
    targets
        .iter()
        .filter_map(|(id, outbound)| match outbound.try_send(Arc::clone(&frame)) {
            Ok(()) => None,
            Err(TrySendError::Full(_)) => {
                warn!("Session {} stopped reading, dropping it", id);
                Some(*id)
            }
            Err(TrySendError::Closed(_)) => Some(*id),
        })
        .collect()
}

/// The relay server.
pub struct RelayServer {
    listener: TcpListener,
    shared: Arc<Shared>,
    store: Option<RosterStore>,
    tracker: TaskTracker,
}

impl RelayServer {
    /// Binds the listener. Use port 0 to let the OS choose; see [`RelayServer::local_addr`].
    pub async fn bind(config: RelayConfig, secret: Secret) -> Result<Self, RelayError> {
        let address = config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| RelayError::Transport(format!("Failed to bind {}: {}", address, e)))?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            listener,
            shared: Arc::new(Shared::new(config, port, secret)),
            store: None,
            tracker: TaskTracker::new(),
        })
    }

    /// Loads known users from `store` and saves them back on shutdown.
    pub async fn with_roster_store(mut self, store: RosterStore) -> Result<Self, RelayError> {
        let users = store.load()?;
        {
            let mut room = self.shared.room.lock().await;
            for user in &users {
                room.remember(user);
            }
        }
        debug!("Loaded {} known user(s) from {}", users.len(), store.path().display());
        self.store = Some(store);
        Ok(self)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for inspecting the room and requesting shutdown.
    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Pre-registers a username in the roster.
    pub async fn create_user(&self, username: &str) -> bool {
        self.handle().create_user(username).await
    }

    /// Accepts connections until shutdown is requested, then closes every
    /// session and persists the roster.
    pub async fn run(self) -> Result<(), RelayError> {
        let Self {
            listener,
            shared,
            store,
            tracker,
        } = self;

        info!(
            "Relay '{}' listening on {}",
            shared.config.alias,
            listener.local_addr()?
        );

        loop {
            tokio::select! {
                _ = shared.shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        info!("Accepted connection from {}", peer_addr);
                        tracker.spawn(handle_connection(
                            Arc::clone(&shared),
                            tracker.clone(),
                            stream,
                            peer_addr,
                        ));
                    }
                    Err(e) => warn!("Accept failed: {}", e),
                },
            }
        }

        drop(listener);
        info!("Shutting down relay on port {}", shared.port);
        shared.close_all().await;

        tracker.close();
        if tokio::time::timeout(TASK_DRAIN_TIMEOUT, tracker.wait())
            .await
            .is_err()
        {
            warn!("Some connection tasks did not finish in time");
        }

        if let Some(store) = store {
            let users = shared.room.lock().await.known_users().to_vec();
            store.save(&users)?;
            info!("Saved {} known user(s) to {}", users.len(), store.path().display());
        }

        Ok(())
    }
}

/// Cloneable handle to a running relay.
#[derive(Clone)]
pub struct RelayHandle {
    shared: Arc<Shared>,
}

impl RelayHandle {
    /// Requests graceful shutdown.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    /// Token cancelled when shutdown is requested.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    /// Port the relay is bound to.
    pub fn port(&self) -> u16 {
        self.shared.port
    }

    /// Usernames of active sessions in join order.
    pub async fn connected(&self) -> Vec<String> {
        self.shared.room.lock().await.connected()
    }

    /// Every username the room has seen.
    pub async fn known_users(&self) -> Vec<String> {
        self.shared.room.lock().await.known_users().to_vec()
    }

    /// Adds a username to the roster; false if it was already known.
    pub async fn create_user(&self, username: &str) -> bool {
        let username = username.trim();
        if username.is_empty() || self.shared.config.is_roster_sentinel(username) {
            return false;
        }
        self.shared.room.lock().await.remember(username)
    }
}

async fn handle_connection(
    shared: Arc<Shared>,
    tracker: TaskTracker,
    stream: TcpStream,
    peer_addr: SocketAddr,
) {
    let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
    let connection = match Connection::new(stream, shared.config.max_frame_len) {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Failed to set up connection from {}: {}", peer_addr, e);
            return;
        }
    };
    let (mut reader, mut writer) = connection.split();

    let username = match handshake(&shared, &mut reader, &mut writer, peer_addr).await {
        Ok(Some(username)) => username,
        Ok(None) => {
            let _ = writer.shutdown().await;
            return;
        }
        Err(e) => {
            warn!("Handshake with {} failed: {}", peer_addr, e);
            let _ = writer.shutdown().await;
            return;
        }
    };

    let (outbound, queue) = mpsc::channel(shared.config.outbound_queue_len.max(1));
    let closed = CancellationToken::new();
    {
        let mut room = shared.room.lock().await;
        if shared.shutdown.is_cancelled() {
            return;
        }
        room.join(Session {
            id,
            username: username.clone(),
            peer_addr,
            outbound,
            closed: closed.clone(),
        });
    }
    tracker.spawn(write_loop(writer, queue, closed.clone()));

    info!("{} joined from {}", username, peer_addr);
    shared
        .broadcast(protocol::joined_notice(&username), Some(id))
        .await;

    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.cancelled() => return,
            _ = shared.shutdown.cancelled() => return,
            frame = reader.read_frame() => frame,
        };
        if closed.is_cancelled() {
            return;
        }

        match frame {
            Ok(Some(frame)) => shared.dispatch(id, &username, &frame).await,
            Ok(None) => break,
            Err(e) => {
                warn!("Connection error from {}: {}", username, e);
                break;
            }
        }
    }

    if !shared.shutdown.is_cancelled() {
        shared.evict(id).await;
    }
}

/// Reads the first frame. `Ok(None)` means the connection is done without
/// joining (roster probe answered, peer gone, or shutdown).
async fn handshake(
    shared: &Shared,
    reader: &mut FrameReader,
    writer: &mut FrameWriter,
    peer_addr: SocketAddr,
) -> Result<Option<String>, RelayError> {
    let first = tokio::select! {
        _ = shared.shutdown.cancelled() => return Ok(None),
        result = tokio::time::timeout(shared.config.handshake_timeout(), reader.read_frame()) => {
            result.map_err(|_| RelayError::Timeout("handshake"))??
        }
    };

    let Some(frame) = first else {
        debug!("{} disconnected before the handshake", peer_addr);
        return Ok(None);
    };

    match protocol::parse_handshake(&frame, |name| shared.config.is_roster_sentinel(name)) {
        Handshake::Join(username) => Ok(Some(username)),
        Handshake::RosterRequest => {
            let roster = shared.room.lock().await.roster_line();
            writer.write_frame(&shared.seal(&roster)).await?;
            info!("Sent roster to {}", peer_addr);
            Ok(None)
        }
        Handshake::Malformed => match shared.config.handshake_policy {
            HandshakePolicy::Strict => Err(RelayError::Protocol(format!(
                "expected {}<name> handshake",
                protocol::HANDSHAKE_PREFIX
            ))),
            HandshakePolicy::Lenient => {
                let username = format!("user_{}", peer_addr.port());
                warn!("Malformed handshake from {}, registering as {}", peer_addr, username);
                Ok(Some(username))
            }
        },
    }
}

/// Drains the outbound queue into the socket until the queue closes, a write
/// fails or the session is evicted. Eviction also interrupts a blocked write.
async fn write_loop(
    mut writer: FrameWriter,
    mut queue: mpsc::Receiver<OutboundFrame>,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => return,
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = closed.cancelled() => return,
            written = writer.write_frame(&frame) => written,
        };
        if let Err(e) = written {
            debug!("Write failed, closing outbound queue: {}", e);
            break;
        }
    }
    queue.close();
    let _ = writer.shutdown().await;
}
