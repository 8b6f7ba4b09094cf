//! Host server: accepts peer connections and bridges them onto the
//! session coordinator.
//!
//! Each accepted connection gets its own reader task plus a dedicated
//! writer task draining that participant's outbound channel, so the
//! coordinator never blocks on a slow socket. The flow per connection:
//!
//!   1. Receive `handshake` → check protocol version and validity
//!   2. Register the participant with the coordinator
//!   3. Send `handshake_ack` + full `game_state_sync`
//!   4. Loop: decode envelopes → forward to the coordinator

use std::time::{Duration, Instant};

use emberlink_combat::RuleEngine;
use emberlink_protocol::{
    Codec, Envelope, JsonCodec, PROTOCOL_VERSION, ParticipantId, Payload,
    ProtocolError, Role, validate,
};
use emberlink_session::{
    CoordinatorHandle, SessionConfig, spawn_coordinator,
};
use emberlink_transport::{Connection, HostListener, Listener, WsConnection};
use tokio::sync::mpsc;

use crate::EmberlinkError;

/// How long a fresh connection gets to present its handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Builder for configuring and starting a host.
pub struct HostServerBuilder {
    bind_addr: String,
    config: SessionConfig,
    host_name: String,
    host_character_id: u64,
}

impl HostServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:7870".to_string(),
            config: SessionConfig::default(),
            host_name: "host".to_string(),
            host_character_id: 0,
        }
    }

    /// Sets the address to listen on.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Display name for the host's own participant.
    pub fn host_name(mut self, name: &str) -> Self {
        self.host_name = name.to_string();
        self
    }

    pub fn host_character_id(mut self, id: u64) -> Self {
        self.host_character_id = id;
        self
    }

    /// Binds the listener and spawns the session coordinator.
    pub async fn build(
        self,
        engine: Box<dyn RuleEngine>,
    ) -> Result<HostServer, EmberlinkError> {
        let listener = HostListener::bind(&self.bind_addr).await?;
        let handle = spawn_coordinator(
            self.config,
            self.host_name,
            self.host_character_id,
            engine,
        );
        Ok(HostServer { listener, handle })
    }
}

impl Default for HostServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running host: a listening endpoint plus the coordinator actor.
pub struct HostServer {
    listener: HostListener,
    handle: CoordinatorHandle,
}

impl HostServer {
    pub fn builder() -> HostServerBuilder {
        HostServerBuilder::new()
    }

    /// Handle for local control: start the session, launch combats,
    /// register listeners.
    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, EmberlinkError> {
        Ok(self.listener.local_addr()?)
    }

    /// Runs the accept loop until the coordinator goes away.
    pub async fn run(mut self) -> Result<(), EmberlinkError> {
        tracing::info!(session = %self.handle.session_id(), "host accepting connections");

        loop {
            match self.listener.accept().await {
                Ok(conn) => {
                    let handle = self.handle.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, handle).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

/// Handles a single peer connection from accept to close.
async fn handle_connection(
    conn: WsConnection,
    handle: CoordinatorHandle,
) -> Result<(), EmberlinkError> {
    let codec = JsonCodec;
    let conn_id = conn.id();
    let start = Instant::now();
    tracing::debug!(%conn_id, "handling new connection");

    let participant =
        perform_handshake(&conn, &handle, &codec, &start).await?;
    tracing::info!(%conn_id, %participant, "participant connected");

    // Reader loop. The writer task owns the outbound half; when the
    // coordinator drops this participant, the outbound channel closes
    // and the writer closes the socket underneath us.
    loop {
        match conn.recv().await {
            Ok(Some(data)) => {
                let envelope = match codec.decode_envelope(&data) {
                    Ok(env) => env,
                    Err(ProtocolError::UnknownKind(tag)) => {
                        // Forward compatibility: unknown kinds drop
                        // silently.
                        tracing::debug!(%participant, %tag, "unknown message kind, dropping");
                        continue;
                    }
                    Err(e) => {
                        tracing::debug!(%participant, error = %e, "malformed envelope, dropping");
                        continue;
                    }
                };
                if envelope.sender != participant {
                    tracing::warn!(
                        %participant,
                        claimed = %envelope.sender,
                        "sender id mismatch, dropping"
                    );
                    continue;
                }
                if let Err(e) = validate(&envelope) {
                    send_rejected(&conn, &codec, e.to_string(), &start).await?;
                    continue;
                }
                if handle.inbound(envelope).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                tracing::info!(%participant, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%participant, error = %e, "recv error");
                break;
            }
        }
    }

    let _ = handle.remove_participant(participant).await;
    Ok(())
}

/// Receives and answers the handshake; registers the participant and
/// spawns its writer task.
async fn perform_handshake(
    conn: &WsConnection,
    handle: &CoordinatorHandle,
    codec: &JsonCodec,
    start: &Instant,
) -> Result<ParticipantId, EmberlinkError> {
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await
    {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(EmberlinkError::Handshake(
                "connection closed before handshake".into(),
            ));
        }
        Ok(Err(e)) => return Err(EmberlinkError::Transport(e)),
        Err(_) => {
            return Err(EmberlinkError::Handshake("handshake timed out".into()));
        }
    };

    let envelope = codec.decode_envelope(&data)?;
    validate(&envelope)?;

    let (version, role, character_name, listen_addr) = match envelope.payload {
        Payload::Handshake {
            version,
            role,
            character_name,
            listen_addr,
        } => (version, role, character_name, listen_addr),
        other => {
            let reason = format!(
                "first message must be handshake, got {}",
                other.kind().wire_tag()
            );
            send_rejected(conn, codec, reason.clone(), start).await?;
            return Err(EmberlinkError::Handshake(reason));
        }
    };

    if version != PROTOCOL_VERSION {
        let reason = format!(
            "protocol version mismatch: expected {PROTOCOL_VERSION}, got {version}"
        );
        send_rejected(conn, codec, reason.clone(), start).await?;
        return Err(EmberlinkError::Handshake(reason));
    }
    // Exactly one host per session, and it is this side.
    if role == Role::Host {
        let reason = "session already has a host".to_string();
        send_rejected(conn, codec, reason.clone(), start).await?;
        return Err(EmberlinkError::Handshake(reason));
    }
    if let Some(addr) = &listen_addr {
        tracing::debug!(%addr, "peer advertises a handoff listen address");
    }

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (participant, snapshot) = match handle
        .add_participant(
            role,
            character_name,
            0,
            listen_addr,
            Some(conn.id()),
            Some(out_tx),
        )
        .await
    {
        Ok(ok) => ok,
        Err(e) => {
            let reason = e.to_string();
            send_rejected(conn, codec, reason.clone(), start).await?;
            return Err(EmberlinkError::Handshake(reason));
        }
    };

    // Ack plus the full snapshot, so the peer has complete state before
    // it enters the lobby.
    let session = handle.session_id();
    send_direct(
        conn,
        codec,
        handle.host_id(),
        session,
        Payload::HandshakeAck {
            participant,
            session,
            server_time: start.elapsed().as_millis() as u64,
        },
        start,
    )
    .await?;
    send_direct(
        conn,
        codec,
        handle.host_id(),
        session,
        Payload::GameStateSync { snapshot },
        start,
    )
    .await?;

    spawn_writer(conn.clone(), out_rx, handle.clone(), participant);
    Ok(participant)
}

/// One writer task per participant: drains the coordinator's outbound
/// channel onto the socket. A persistent send failure (one retry)
/// marks the participant disconnected.
fn spawn_writer(
    conn: WsConnection,
    mut out_rx: mpsc::UnboundedReceiver<Envelope>,
    handle: CoordinatorHandle,
    participant: ParticipantId,
) {
    tokio::spawn(async move {
        let codec = JsonCodec;
        while let Some(envelope) = out_rx.recv().await {
            let bytes = match codec.encode(&envelope) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(%participant, error = %e, "encode failed, skipping");
                    continue;
                }
            };
            if let Err(e) = conn.send_retry(&bytes).await {
                tracing::warn!(
                    %participant,
                    error = %e,
                    "send failed twice, marking disconnected"
                );
                let _ = handle.remove_participant(participant).await;
                break;
            }
        }
        // Channel closed: the participant was removed upstream.
        let _ = conn.close().await;
    });
}

/// Sends a `rejected` reply straight down this connection. Only ever
/// the sender sees it.
async fn send_rejected(
    conn: &WsConnection,
    codec: &JsonCodec,
    reason: String,
    start: &Instant,
) -> Result<(), EmberlinkError> {
    tracing::debug!(conn = %conn.id(), %reason, "rejecting message");
    send_direct(
        conn,
        codec,
        ParticipantId::UNASSIGNED,
        emberlink_protocol::SessionId(0),
        Payload::Rejected { reason },
        start,
    )
    .await
}

/// Direct sends bypass the coordinator's sequence counter and carry
/// `seq` 0: they are control traffic, which peers never gate by
/// staleness.
async fn send_direct(
    conn: &WsConnection,
    codec: &JsonCodec,
    sender: ParticipantId,
    session: emberlink_protocol::SessionId,
    payload: Payload,
    start: &Instant,
) -> Result<(), EmberlinkError> {
    let envelope = Envelope {
        sender,
        session,
        seq: 0,
        timestamp: start.elapsed().as_millis() as u64,
        payload,
    };
    let bytes = codec.encode(&envelope)?;
    conn.send(&bytes).await.map_err(EmberlinkError::Transport)?;
    Ok(())
}
