//! Participant records, created on handshake and dropped on disconnect.

use emberlink_protocol::{ParticipantEntry, ParticipantId, Role};
use emberlink_transport::ConnectionId;
// Tokio's Instant, not std's: liveness math must follow the runtime
// clock in time-paused tests.
use tokio::time::Instant;

/// One connected participant as the host sees it.
///
/// The connection itself is owned by the transport layer; this record
/// only references it.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub role: Role,
    pub display_name: String,
    /// External character reference, opaque to this layer.
    pub character_id: u64,
    /// `None` for the local (host) participant.
    pub connection: Option<ConnectionId>,
    /// Where this participant would bind if promoted to host, from its
    /// handshake.
    pub listen_addr: Option<String>,
    /// Last inbound traffic; drives the liveness check.
    pub last_seen: Instant,
}

impl Participant {
    pub fn new(
        id: ParticipantId,
        role: Role,
        display_name: impl Into<String>,
        character_id: u64,
        connection: Option<ConnectionId>,
    ) -> Self {
        Self {
            id,
            role,
            display_name: display_name.into(),
            character_id,
            connection,
            listen_addr: None,
            last_seen: Instant::now(),
        }
    }

    /// Records the address the participant advertised for handoff.
    pub fn with_listen_addr(mut self, addr: Option<String>) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Spectators watch; everyone else takes turns.
    pub fn takes_turns(&self) -> bool {
        self.role != Role::Spectator
    }

    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn entry(&self) -> ParticipantEntry {
        ParticipantEntry {
            id: self.id,
            role: self.role,
            display_name: self.display_name.clone(),
            character_id: self.character_id,
            listen_addr: self.listen_addr.clone(),
        }
    }
}
