//! One-to-one TCP chat session between a host and its single guest.
//!
//! # Handshake
//!
//! ```text
//!  guest                                host
//!    │ ──────── TCP connect ─────────────► │  accept_guest()
//!    │ ◄─────── Sentinel frame ─────────── │  (guest is now attached)
//!    │ ◄═══════ UserText frames ═════════► │
//! ```
//!
//! The host writes the attach sentinel as the very first frame.  The guest's
//! [`guest_connect`] only returns once that sentinel has arrived, so a host
//! that already has a guest (and therefore closes extra connections straight
//! away) shows up as [`ConnectionError::Rejected`] instead of a session that
//! silently never receives anything.
//!
//! # Framing
//!
//! TCP is a byte stream: one `read` can return half a frame or several frames
//! at once.  [`MessageStream`] keeps an accumulation buffer and calls
//! `decode_frame` until it reports `InsufficientData`, then reads again.
//! Sentinel frames are consumed here and never surface as messages.
//!
//! # Single guest
//!
//! After the first guest attaches, the listener moves into a reject loop that
//! accepts and immediately closes any further connection.  The loop is
//! aborted when the last handle of the session is dropped.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use lanlobby_core::protocol::{decode_frame, encode_frame, ProtocolError, SessionFrame};
use lanlobby_core::{Lobby, Message, Role};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Size of each socket read.
const READ_CHUNK: usize = 4096;

/// Errors while establishing a session.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The host could not bind its session port.
    #[error("failed to bind session listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// The guest's TCP connect failed.
    #[error("lobby host {addr} is unreachable: {source}")]
    Unreachable {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// The attach sentinel did not arrive in time.
    #[error("lobby host {addr} did not attach within {timeout:?}")]
    TimedOut { addr: SocketAddr, timeout: Duration },
    /// The host closed the connection before attaching (it already has a guest).
    #[error("lobby host {addr} rejected the connection")]
    Rejected { addr: SocketAddr },
    /// The host sent something other than the attach sentinel first.
    #[error("handshake with {addr} failed: {reason}")]
    Handshake { addr: SocketAddr, reason: String },
    /// The listener failed while waiting for a guest.
    #[error("failed to accept a guest: {source}")]
    Accept {
        #[source]
        source: io::Error,
    },
}

/// Errors on an established session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    Closed,
    #[error("session I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    /// The message stream of this session has already been handed out.
    #[error("session messages are already being received")]
    AlreadyReceiving,
}

/// Runtime settings for the session transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// TCP port the host listens on and the guest connects to.
    pub port: u16,
    /// Local IP the host's listener binds to.
    pub bind_address: IpAddr,
    /// Upper bound for the guest's connect + attach handshake.
    pub connect_timeout: Duration,
}

impl SessionConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: 47811,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            connect_timeout: Duration::from_millis(3000),
        }
    }
}

// ── Host side ─────────────────────────────────────────────────────────────────

/// A bound session port waiting for its one guest.
pub struct HostListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl HostListener {
    /// Binds the session port.
    pub async fn bind(config: &SessionConfig) -> Result<Self, ConnectionError> {
        let addr = config.listen_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ConnectionError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ConnectionError::Bind { addr, source })?;
        info!("session listener bound on {local_addr}");
        Ok(Self { listener, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for a guest, attaches it by sending the sentinel, and returns the
    /// session.
    ///
    /// A connection whose sentinel write fails is dropped and the host keeps
    /// waiting.  An error from the listener itself is fatal.
    pub async fn accept_guest(self) -> Result<Session, ConnectionError> {
        let sentinel = encode_frame(&SessionFrame::Sentinel).map_err(|e| {
            ConnectionError::Handshake {
                addr: self.local_addr,
                reason: e.to_string(),
            }
        })?;

        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|source| ConnectionError::Accept { source })?;
            if let Err(e) = stream.set_nodelay(true) {
                debug!("could not set TCP_NODELAY for {peer}: {e}");
            }
            let (reader, mut writer) = stream.into_split();

            if let Err(e) = writer.write_all(&sentinel).await {
                warn!("attach sentinel to {peer} failed, waiting for another guest: {e}");
                continue;
            }

            let session_id = Uuid::new_v4();
            info!("guest {peer} attached (session {session_id})");
            let reject = RejectLoop::spawn(self.listener, session_id);
            return Ok(Session::new(
                session_id,
                Role::Host,
                peer,
                reader,
                writer,
                Vec::new(),
                Some(Arc::new(reject)),
            ));
        }
    }
}

/// Accepts and closes connections beyond the first guest.
struct RejectLoop(JoinHandle<()>);

impl RejectLoop {
    fn spawn(listener: TcpListener, session_id: Uuid) -> Self {
        Self(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        warn!("rejecting extra guest {peer}: session {session_id} already has a guest");
                        drop(stream);
                    }
                    Err(e) => {
                        debug!("reject loop accept error: {e}");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                }
            }
        }))
    }
}

impl Drop for RejectLoop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ── Guest side ────────────────────────────────────────────────────────────────

/// Connects to `lobby` on the configured session port and waits for the
/// attach sentinel.
pub async fn guest_connect(lobby: &Lobby, config: &SessionConfig) -> Result<Session, ConnectionError> {
    connect_to(lobby.session_endpoint(config.port), config.connect_timeout).await
}

/// Connects to a host at an explicit address.
pub async fn connect_to(addr: SocketAddr, timeout: Duration) -> Result<Session, ConnectionError> {
    tokio::time::timeout(timeout, handshake(addr))
        .await
        .map_err(|_| ConnectionError::TimedOut { addr, timeout })?
}

async fn handshake(addr: SocketAddr) -> Result<Session, ConnectionError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ConnectionError::Unreachable { addr, source })?;
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not set TCP_NODELAY for {addr}: {e}");
    }
    let (mut reader, writer) = stream.into_split();

    let mut buf = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match decode_frame(&buf) {
            Ok((SessionFrame::Sentinel, consumed)) => {
                buf.drain(..consumed);
                break;
            }
            Ok((other, _)) => {
                return Err(ConnectionError::Handshake {
                    addr,
                    reason: format!("expected attach sentinel, got {:?} frame", other.frame_type()),
                });
            }
            Err(ProtocolError::InsufficientData { .. }) => {}
            Err(e) => {
                return Err(ConnectionError::Handshake {
                    addr,
                    reason: e.to_string(),
                })
            }
        }

        match reader.read(&mut chunk).await {
            Ok(0) => return Err(ConnectionError::Rejected { addr }),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                return Err(ConnectionError::Rejected { addr })
            }
            Err(e) => {
                return Err(ConnectionError::Handshake {
                    addr,
                    reason: e.to_string(),
                })
            }
        }
    }

    let session_id = Uuid::new_v4();
    info!("attached to lobby host {addr} (session {session_id})");
    // Bytes after the sentinel already belong to the message stream.
    Ok(Session::new(session_id, Role::Guest, addr, reader, writer, buf, None))
}

// ── Session ───────────────────────────────────────────────────────────────────

/// An attached host↔guest connection.
pub struct Session {
    id: Uuid,
    role: Role,
    peer: SocketAddr,
    inbound: Option<(OwnedReadHalf, Vec<u8>)>,
    sender: SessionSender,
}

impl Session {
    fn new(
        id: Uuid,
        role: Role,
        peer: SocketAddr,
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        pending: Vec<u8>,
        reject: Option<Arc<RejectLoop>>,
    ) -> Self {
        Self {
            id,
            role,
            peer,
            inbound: Some((reader, pending)),
            sender: SessionSender {
                id,
                peer,
                writer: Arc::new(Mutex::new(writer)),
                _reject: reject,
            },
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Returns a cloneable handle for sending messages.
    pub fn sender(&self) -> SessionSender {
        self.sender.clone()
    }

    /// Takes the inbound message stream.
    ///
    /// # Errors
    ///
    /// [`TransportError::AlreadyReceiving`] if the stream was already taken.
    pub fn messages(&mut self) -> Result<MessageStream, TransportError> {
        let (reader, buf) = self.inbound.take().ok_or(TransportError::AlreadyReceiving)?;
        Ok(MessageStream {
            id: self.id,
            peer: self.peer,
            reader,
            buf,
            finished: false,
            _reject: self.sender._reject.clone(),
        })
    }

    /// Splits the session into its sending and receiving halves.
    pub fn split(mut self) -> Result<(SessionSender, MessageStream), TransportError> {
        let inbox = self.messages()?;
        Ok((self.sender, inbox))
    }
}

/// Sending half of a session.  Cheap to clone.
#[derive(Clone)]
pub struct SessionSender {
    id: Uuid,
    peer: SocketAddr,
    writer: Arc<Mutex<OwnedWriteHalf>>,
    _reject: Option<Arc<RejectLoop>>,
}

impl SessionSender {
    /// Sends one user message as a single `UserText` frame.
    pub async fn send(&self, text: &str) -> Result<(), TransportError> {
        let bytes = encode_frame(&SessionFrame::UserText(text.to_string()))?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        debug!("session {}: sent {} bytes to {}", self.id, bytes.len(), self.peer);
        Ok(())
    }

    /// Half-closes the connection; the peer's stream ends with `Closed`.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("session {}: shutdown error: {e}", self.id);
        }
    }
}

/// Receiving half of a session.
///
/// [`MessageStream::next`] yields messages in arrival order, then a single
/// `Some(Err(..))` when the connection ends, then `None` forever.  It is
/// cancel-safe: buffered bytes survive a dropped `next()` future.
pub struct MessageStream {
    id: Uuid,
    peer: SocketAddr,
    reader: OwnedReadHalf,
    buf: Vec<u8>,
    finished: bool,
    _reject: Option<Arc<RejectLoop>>,
}

impl MessageStream {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub async fn next(&mut self) -> Option<Result<Message, TransportError>> {
        if self.finished {
            return None;
        }

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match decode_frame(&self.buf) {
                Ok((frame, consumed)) => {
                    self.buf.drain(..consumed);
                    match frame {
                        SessionFrame::Sentinel => {
                            debug!("session {}: filtered attach sentinel", self.id);
                        }
                        SessionFrame::UserText(text) => return Some(Ok(Message::remote(text))),
                    }
                    continue;
                }
                Err(ProtocolError::InsufficientData { .. }) => {}
                Err(e) => return Some(Err(self.finish(e.into()))),
            }

            match self.reader.read(&mut chunk).await {
                Ok(0) => return Some(Err(self.finish(TransportError::Closed))),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) => return Some(Err(self.finish(e.into()))),
            }
        }
    }

    fn finish(&mut self, error: TransportError) -> TransportError {
        info!("session {}: connection to {} ended: {error}", self.id, self.peer);
        self.finished = true;
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config() -> SessionConfig {
        SessionConfig {
            port: 0,
            bind_address: "127.0.0.1".parse().unwrap(),
            connect_timeout: Duration::from_secs(2),
        }
    }

    /// Binds a host, connects a guest, and returns both attached sessions.
    async fn attached_pair() -> (Session, Session) {
        let listener = HostListener::bind(&loopback_config()).await.unwrap();
        let addr = listener.local_addr();
        let host = tokio::spawn(listener.accept_guest());
        let guest = connect_to(addr, Duration::from_secs(2)).await.unwrap();
        let host = host.await.unwrap().unwrap();
        (host, guest)
    }

    #[test]
    fn test_default_session_config() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.port, 47811);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cfg = SessionConfig {
            port: taken.local_addr().unwrap().port(),
            ..loopback_config()
        };

        let result = HostListener::bind(&cfg).await;

        assert!(matches!(result, Err(ConnectionError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_guest_message_reaches_host() {
        // Arrange
        let (mut host, guest) = attached_pair().await;
        let mut inbox = host.messages().unwrap();

        // Act
        guest.sender().send("hi host").await.unwrap();

        // Assert
        let msg = inbox.next().await.unwrap().unwrap();
        assert_eq!(msg.content, "hi host");
        assert!(!msg.originated_locally);
        assert_eq!(host.role(), Role::Host);
    }

    #[tokio::test]
    async fn test_messages_can_only_be_taken_once() {
        let (mut host, _guest) = attached_pair().await;

        let _inbox = host.messages().unwrap();

        assert!(matches!(host.messages(), Err(TransportError::AlreadyReceiving)));
    }

    #[tokio::test]
    async fn test_empty_text_is_delivered() {
        let (host, guest) = attached_pair().await;
        let (_, mut inbox) = guest.split().unwrap();

        host.sender().send("").await.unwrap();

        assert_eq!(inbox.next().await.unwrap().unwrap().content, "");
    }

    #[tokio::test]
    async fn test_stream_reports_close_once_then_ends() {
        // Arrange
        let (host, guest) = attached_pair().await;
        let (_, mut inbox) = guest.split().unwrap();

        // Act
        drop(host);

        // Assert
        assert!(matches!(inbox.next().await, Some(Err(TransportError::Closed))));
        assert!(inbox.next().await.is_none());
        assert!(inbox.next().await.is_none());
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_is_unreachable() {
        // Arrange: grab a free port, then release it
        let addr = {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap()
        };

        // Act
        let result = connect_to(addr, Duration::from_secs(2)).await;

        // Assert
        assert!(matches!(result, Err(ConnectionError::Unreachable { .. })));
    }

    #[tokio::test]
    async fn test_silent_host_times_out() {
        // Arrange: accepts but never sends the sentinel
        let raw = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = raw.local_addr().unwrap();
        let _keep = tokio::spawn(async move {
            let (stream, _) = raw.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        // Act
        let result = connect_to(addr, Duration::from_millis(100)).await;

        // Assert
        assert!(matches!(result, Err(ConnectionError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_host_sending_text_first_fails_handshake() {
        // Arrange
        let raw = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = raw.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = raw.accept().await.unwrap();
            let bytes = encode_frame(&SessionFrame::UserText("too early".into())).unwrap();
            stream.write_all(&bytes).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        // Act
        let result = connect_to(addr, Duration::from_secs(2)).await;

        // Assert
        assert!(matches!(result, Err(ConnectionError::Handshake { .. })));
    }

    #[tokio::test]
    async fn test_text_coalesced_with_sentinel_is_not_lost() {
        // Arrange: sentinel and first message arrive in one write
        let raw = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = raw.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = raw.accept().await.unwrap();
            let mut bytes = encode_frame(&SessionFrame::Sentinel).unwrap();
            bytes.extend(encode_frame(&SessionFrame::UserText("hello".into())).unwrap());
            stream.write_all(&bytes).await.unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;
        });

        // Act
        let guest = connect_to(addr, Duration::from_secs(2)).await.unwrap();
        let (_, mut inbox) = guest.split().unwrap();

        // Assert
        assert_eq!(inbox.next().await.unwrap().unwrap().content, "hello");
    }

    #[tokio::test]
    async fn test_garbage_frame_is_protocol_error() {
        // Arrange
        let (host, guest) = attached_pair().await;
        let (_, mut inbox) = host.split().unwrap();
        let guest_sender = guest.sender();

        // Act: bypass the codec and write an unknown frame type
        guest_sender
            .writer
            .lock()
            .await
            .write_all(&[0x01, 0x7F, 0, 0, 0, 0])
            .await
            .unwrap();

        // Assert
        assert!(matches!(
            inbox.next().await,
            Some(Err(TransportError::Protocol(ProtocolError::UnknownFrameType(0x7F))))
        ));
        assert!(inbox.next().await.is_none());
    }
}
