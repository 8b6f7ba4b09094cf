//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The read and write halves of each socket sit behind separate locks so
//! a blocked `recv` (waiting for the next frame) never stalls an
//! outbound `send` on the same connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Listener, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// How long an outbound connection attempt may take before it counts as
/// refused.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type HostStream = tokio_tungstenite::WebSocketStream<TcpStream>;
type PeerStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<TcpStream>,
>;

/// The host's listening endpoint. Accepts one [`WsConnection`] per peer.
pub struct HostListener {
    listener: TcpListener,
}

impl HostListener {
    /// Binds the listening endpoint.
    ///
    /// # Errors
    /// Returns [`TransportError::Bind`] if the port is unavailable.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener =
            TcpListener::bind(addr).await.map_err(TransportError::Bind)?;
        tracing::info!(addr, "host transport listening");
        Ok(Self { listener })
    }

    /// The actual bound address (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }
}

impl Listener for HostListener {
    type Connection = WsConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Bind)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let conn = WsConnection::from_host_stream(ws);
        tracing::debug!(id = %conn.id(), %addr, "accepted peer connection");
        Ok(conn)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Opens an outbound connection to a session host.
///
/// Used by joining peers, and by a promoted host's former fellows when
/// they re-connect after a handoff. Handshake failures above this layer
/// are never auto-retried here.
///
/// # Errors
/// Returns [`TransportError::Connect`] on refusal or timeout.
pub async fn connect_to_host(addr: &str) -> Result<WsConnection, TransportError> {
    let url = format!("ws://{addr}");
    let attempt = tokio_tungstenite::connect_async(&url);

    let (ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, attempt)
        .await
        .map_err(|_| {
            TransportError::Connect(format!("timed out connecting to {addr}"))
        })?
        .map_err(|e| TransportError::Connect(e.to_string()))?;

    let conn = WsConnection::from_peer_stream(ws);
    tracing::debug!(id = %conn.id(), addr, "connected to host");
    Ok(conn)
}

// ---------------------------------------------------------------------------
// WsConnection
// ---------------------------------------------------------------------------

/// The two stream flavors tungstenite hands back, unified so host- and
/// peer-side code share one connection type.
enum Writer {
    Host(SplitSink<HostStream, Message>),
    Peer(SplitSink<PeerStream, Message>),
}

enum Reader {
    Host(SplitStream<HostStream>),
    Peer(SplitStream<PeerStream>),
}

/// A single WebSocket connection (either direction).
pub struct WsConnection {
    id: ConnectionId,
    writer: Arc<Mutex<Writer>>,
    reader: Arc<Mutex<Reader>>,
}

impl WsConnection {
    fn next_id() -> ConnectionId {
        ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    fn from_host_stream(ws: HostStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: Self::next_id(),
            writer: Arc::new(Mutex::new(Writer::Host(sink))),
            reader: Arc::new(Mutex::new(Reader::Host(stream))),
        }
    }

    fn from_peer_stream(ws: PeerStream) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: Self::next_id(),
            writer: Arc::new(Mutex::new(Writer::Peer(sink))),
            reader: Arc::new(Mutex::new(Reader::Peer(stream))),
        }
    }
}

impl Clone for WsConnection {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            writer: Arc::clone(&self.writer),
            reader: Arc::clone(&self.reader),
        }
    }
}

impl Connection for WsConnection {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let msg = Message::Binary(data.to_vec().into());
        let result = match &mut *self.writer.lock().await {
            Writer::Host(sink) => sink.send(msg).await,
            Writer::Peer(sink) => sink.send(msg).await,
        };
        result.map_err(|e| {
            TransportError::Send(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            let msg = match &mut *self.reader.lock().await {
                Reader::Host(stream) => stream.next().await,
                Reader::Peer(stream) => stream.next().await,
            };
            match msg {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ws-level ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::Receive(std::io::Error::new(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let result = match &mut *self.writer.lock().await {
            Writer::Host(sink) => sink.send(Message::Close(None)).await,
            Writer::Peer(sink) => sink.send(Message::Close(None)).await,
        };
        result.map_err(|e| {
            TransportError::Send(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
