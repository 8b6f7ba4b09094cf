//! Core protocol types for Emberlink's wire format.
//!
//! Everything in this module travels on the wire between the host and its
//! peers. Messages are decoded exactly once at the protocol boundary into
//! these strongly typed values — nothing downstream ever pokes at raw
//! JSON maps.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a participant within a session.
///
/// Newtype over `u64` so a participant id can't be confused with a
/// session or actor id. Serialized transparently as the inner number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl ParticipantId {
    /// The sender id used before the handshake has assigned one.
    /// Only ever valid on a `handshake` message.
    pub const UNASSIGNED: ParticipantId = ParticipantId(0);
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p-{}", self.0)
    }
}

/// A unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s-{}", self.0)
    }
}

/// A unique identifier for one combat encounter within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombatId(pub u64);

impl fmt::Display for CombatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c-{}", self.0)
    }
}

/// A unique identifier for a combat actor (party member or enemy).
///
/// Actors are not participants: every participant's character is an
/// actor, but enemies and scripted NPCs are actors with no participant
/// behind them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Roles and action kinds
// ---------------------------------------------------------------------------

/// A participant's role within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Holds authoritative state and accepts inbound connections.
    Host,
    /// Holds a mirrored, non-authoritative copy of state.
    Peer,
    /// Observes only; never appears in the turn order.
    Spectator,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Peer => write!(f, "peer"),
            Self::Spectator => write!(f, "spectator"),
        }
    }
}

/// The allowed combat action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Attack,
    Skill,
    Item,
    Defend,
    Escape,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attack => write!(f, "attack"),
            Self::Skill => write!(f, "skill"),
            Self::Item => write!(f, "item"),
            Self::Defend => write!(f, "defend"),
            Self::Escape => write!(f, "escape"),
        }
    }
}

// ---------------------------------------------------------------------------
// Session and combat lifecycle tags
// ---------------------------------------------------------------------------

/// The lifecycle state of a session, as carried in snapshots.
///
/// Transitions are strict — nothing outside this graph is permitted:
///
/// ```text
/// Lobby → Playing ⇄ Paused
///            │        │
///            └──→ Ended ←┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Lobby,
    Playing,
    Paused,
    Ended,
}

impl SessionPhase {
    /// Returns `true` if transitioning to `target` is a permitted edge.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Lobby, Self::Playing)
                | (Self::Playing, Self::Paused)
                | (Self::Paused, Self::Playing)
                | (Self::Playing, Self::Ended)
                | (Self::Paused, Self::Ended)
        )
    }

    /// Returns `true` if new participants may still join.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Lobby)
    }

    /// Returns `true` if turns are being taken.
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lobby => write!(f, "lobby"),
            Self::Playing => write!(f, "playing"),
            Self::Paused => write!(f, "paused"),
            Self::Ended => write!(f, "ended"),
        }
    }
}

/// The phase of a combat encounter, as carried in combat snapshots.
///
/// The host's progression loop walks this machine; peers only ever see
/// the phase inside a snapshot.
///
/// ```text
/// WaitingForPlayers → CombatSetup → AtbProcessing ⇄ ActionSelection
///                                        │               │
///                                        ▼               ▼
///                                  TurnResolution ← ActionExecution
///                                        │
///                                        ▼ (loop back, or)
///                                    CombatEnd
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatPhase {
    WaitingForPlayers,
    CombatSetup,
    AtbProcessing,
    ActionSelection,
    ActionExecution,
    TurnResolution,
    CombatEnd,
}

impl fmt::Display for CombatPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::WaitingForPlayers => "waiting_for_players",
            Self::CombatSetup => "combat_setup",
            Self::AtbProcessing => "atb_processing",
            Self::ActionSelection => "action_selection",
            Self::ActionExecution => "action_execution",
            Self::TurnResolution => "turn_resolution",
            Self::CombatEnd => "combat_end",
        };
        write!(f, "{tag}")
    }
}

// ---------------------------------------------------------------------------
// Character snapshots
// ---------------------------------------------------------------------------

/// Who drives an actor's decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    /// A connected participant picks this actor's actions.
    Participant(ParticipantId),
    /// The host's rule engine picks this actor's actions.
    Npc,
}

/// A fully populated snapshot of one combat actor's state.
///
/// Every field is always present: missing source data is defaulted once,
/// here, at construction — never at read sites. The character manager
/// hands these over as opaque blobs; the synchronizer only reads the
/// fields it needs for turn arbitration and display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub id: ActorId,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub attack: i32,
    pub defense: i32,
    /// Gauge fill rate relative to other actors.
    pub speed: i32,
    /// Readiness gauge, 0–[`GAUGE_MAX`](crate::GAUGE_MAX).
    pub gauge: u32,
    pub controller: Controller,
}

impl CharacterSnapshot {
    /// Baseline stats used when the source data omits a field.
    const BASE_HP: i32 = 100;
    const BASE_MP: i32 = 20;
    const BASE_ATTACK: i32 = 10;
    const BASE_DEFENSE: i32 = 5;
    const BASE_SPEED: i32 = 10;

    /// Creates a snapshot with baseline stats for everything but
    /// identity. Callers with real character data overwrite fields
    /// before use; callers without it get a complete, usable actor.
    pub fn with_defaults(
        id: ActorId,
        name: impl Into<String>,
        controller: Controller,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            hp: Self::BASE_HP,
            max_hp: Self::BASE_HP,
            mp: Self::BASE_MP,
            max_mp: Self::BASE_MP,
            attack: Self::BASE_ATTACK,
            defense: Self::BASE_DEFENSE,
            speed: Self::BASE_SPEED,
            gauge: 0,
            controller,
        }
    }

    /// Returns `true` while the actor can still act.
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }
}

// ---------------------------------------------------------------------------
// Aggregate snapshots
// ---------------------------------------------------------------------------

/// One participant's entry in a session snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantEntry {
    pub id: ParticipantId,
    pub role: Role,
    pub display_name: String,
    /// External character reference, opaque to this layer.
    pub character_id: u64,
    /// Address this participant would bind if promoted to host, as
    /// advertised in its handshake. Surviving peers reconnect here
    /// after a handoff.
    pub listen_addr: Option<String>,
}

/// The full session state, broadcast periodically by the host.
///
/// Peers replace their mirror with this wholesale — never merged
/// field-by-field — so a snapshot heals any missed incremental update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: SessionId,
    pub name: String,
    pub phase: SessionPhase,
    pub participants: Vec<ParticipantEntry>,
    pub turn_order: Vec<ParticipantId>,
    /// Monotonic sequence number; stale snapshots are discarded by it.
    pub sequence: u64,
    pub turn_owner: Option<ParticipantId>,
}

/// The full combat state, broadcast periodically during an encounter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatSnapshot {
    pub combat: CombatId,
    pub phase: CombatPhase,
    pub turn: u32,
    pub party: Vec<CharacterSnapshot>,
    pub enemies: Vec<CharacterSnapshot>,
    /// The actor whose action is currently awaited, if any.
    pub awaiting: Option<ActorId>,
}

/// One actor's gauge level inside an `atb_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeEntry {
    pub actor: ActorId,
    pub gauge: u32,
}

// ---------------------------------------------------------------------------
// Payload — the typed message taxonomy
// ---------------------------------------------------------------------------

/// The content of a message, one variant per wire kind.
///
/// Adjacent tagging (`"type"` + `"data"`) plus `#[serde(flatten)]` on the
/// envelope produces the wire shape:
///
/// ```json
/// { "sender_id": 3, "session_id": 1, "seq": 7, "timestamp": 152000,
///   "type": "combat_action",
///   "data": { "action_type": "skill", "target_id": 9, "skill_name": "ember" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Peer → host, first message on a fresh connection.
    Handshake {
        version: u32,
        role: Role,
        character_name: String,
        /// Address this peer would bind if promoted to host.
        listen_addr: Option<String>,
    },

    /// Host → peer: identity assignment after a successful handshake.
    HandshakeAck {
        participant: ParticipantId,
        session: SessionId,
        server_time: u64,
    },

    /// Host → all: a participant entered the session.
    PeerJoin {
        participant: ParticipantId,
        display_name: String,
    },

    /// Host → all: a participant left. When the departing participant
    /// was the host, `promoted_host` names its replacement, which must
    /// re-bind as a listening endpoint.
    PeerLeave {
        participant: ParticipantId,
        promoted_host: Option<ParticipantId>,
    },

    /// Liveness probe, either direction.
    Ping { nonce: u64 },

    /// Liveness reply, echoing the probe's nonce.
    Pong { nonce: u64 },

    /// Relayed chat line.
    Chat { text: String },

    /// Host → all: periodic full session snapshot (state repair).
    GameStateSync { snapshot: SessionSnapshot },

    /// Peer → host: out-of-combat movement.
    PlayerMove { x: i32, y: i32 },

    /// Host → all: a combat encounter begins.
    CombatStart {
        combat: CombatId,
        party: Vec<CharacterSnapshot>,
        enemies: Vec<CharacterSnapshot>,
    },

    /// Peer → host: the awaited actor's chosen action.
    CombatAction {
        action_type: ActionKind,
        target_id: ActorId,
        skill_name: Option<String>,
    },

    /// Host → all: periodic full combat snapshot (state repair).
    CombatState { snapshot: CombatSnapshot },

    /// Host → all, exactly once: the encounter summary.
    CombatEnd { victory: bool, log_tail: Vec<String> },

    /// Host → all: gauge levels that drifted past the broadcast
    /// threshold since the last update.
    AtbUpdate { gauges: Vec<GaugeEntry> },

    /// Host → all: a resolved action's outcome. Synthesized default
    /// actions are broadcast through this exact shape, so other
    /// participants cannot tell them from real ones.
    DamageDealt {
        actor: ActorId,
        target: ActorId,
        action_type: ActionKind,
        skill_name: Option<String>,
        damage: i32,
        target_hp: i32,
    },

    /// Host → all: the turn order and current sequence number.
    TurnOrder {
        order: Vec<ParticipantId>,
        sequence: u64,
    },

    /// Host → one sender: a semantically invalid or disallowed message
    /// was refused. Never broadcast.
    Rejected { reason: String },

    /// Host → all: human-readable system notification (join/leave/
    /// handoff/turn-timeout). Raw internal errors never travel here.
    Notice { text: String },
}

impl Payload {
    /// The wire kind of this payload.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Handshake { .. } => MessageKind::Handshake,
            Self::HandshakeAck { .. } => MessageKind::HandshakeAck,
            Self::PeerJoin { .. } => MessageKind::PeerJoin,
            Self::PeerLeave { .. } => MessageKind::PeerLeave,
            Self::Ping { .. } => MessageKind::Ping,
            Self::Pong { .. } => MessageKind::Pong,
            Self::Chat { .. } => MessageKind::Chat,
            Self::GameStateSync { .. } => MessageKind::GameStateSync,
            Self::PlayerMove { .. } => MessageKind::PlayerMove,
            Self::CombatStart { .. } => MessageKind::CombatStart,
            Self::CombatAction { .. } => MessageKind::CombatAction,
            Self::CombatState { .. } => MessageKind::CombatState,
            Self::CombatEnd { .. } => MessageKind::CombatEnd,
            Self::AtbUpdate { .. } => MessageKind::AtbUpdate,
            Self::DamageDealt { .. } => MessageKind::DamageDealt,
            Self::TurnOrder { .. } => MessageKind::TurnOrder,
            Self::Rejected { .. } => MessageKind::Rejected,
            Self::Notice { .. } => MessageKind::Notice,
        }
    }
}

/// The declared message kinds, used to key handler registration and to
/// classify incoming wire tags before the typed decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Handshake,
    HandshakeAck,
    PeerJoin,
    PeerLeave,
    Ping,
    Pong,
    Chat,
    GameStateSync,
    PlayerMove,
    CombatStart,
    CombatAction,
    CombatState,
    CombatEnd,
    AtbUpdate,
    DamageDealt,
    TurnOrder,
    Rejected,
    Notice,
}

impl MessageKind {
    /// All declared kinds, in wire-tag order.
    pub const ALL: [MessageKind; 18] = [
        Self::Handshake,
        Self::HandshakeAck,
        Self::PeerJoin,
        Self::PeerLeave,
        Self::Ping,
        Self::Pong,
        Self::Chat,
        Self::GameStateSync,
        Self::PlayerMove,
        Self::CombatStart,
        Self::CombatAction,
        Self::CombatState,
        Self::CombatEnd,
        Self::AtbUpdate,
        Self::DamageDealt,
        Self::TurnOrder,
        Self::Rejected,
        Self::Notice,
    ];

    /// The snake_case tag this kind uses on the wire.
    pub fn wire_tag(self) -> &'static str {
        match self {
            Self::Handshake => "handshake",
            Self::HandshakeAck => "handshake_ack",
            Self::PeerJoin => "peer_join",
            Self::PeerLeave => "peer_leave",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Chat => "chat",
            Self::GameStateSync => "game_state_sync",
            Self::PlayerMove => "player_move",
            Self::CombatStart => "combat_start",
            Self::CombatAction => "combat_action",
            Self::CombatState => "combat_state",
            Self::CombatEnd => "combat_end",
            Self::AtbUpdate => "atb_update",
            Self::DamageDealt => "damage_dealt",
            Self::TurnOrder => "turn_order",
            Self::Rejected => "rejected",
            Self::Notice => "notice",
        }
    }

    /// Looks up a wire tag. `None` means the tag is not a declared kind
    /// — the caller drops the message for forward compatibility.
    pub fn from_wire_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.wire_tag() == tag)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_tag())
    }
}

// ---------------------------------------------------------------------------
// Envelope — the top-level wire format
// ---------------------------------------------------------------------------

/// The top-level message wrapper. Every message on the wire is an
/// `Envelope`, constructed once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Who sent this. [`ParticipantId::UNASSIGNED`] only on `handshake`.
    #[serde(rename = "sender_id")]
    pub sender: ParticipantId,

    /// Which session this belongs to.
    #[serde(rename = "session_id")]
    pub session: SessionId,

    /// The sender's view of the session sequence number. As observed by
    /// any one participant this is non-decreasing; older values are
    /// discarded as stale.
    pub seq: u64,

    /// Milliseconds since the session epoch.
    pub timestamp: u64,

    /// The typed message content, flattened into `type`/`data` fields.
    #[serde(flatten)]
    pub payload: Payload,
}

impl Envelope {
    /// The wire kind of the contained payload.
    pub fn kind(&self) -> MessageKind {
        self.payload.kind()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(payload: Payload) -> Envelope {
        Envelope {
            sender: ParticipantId(3),
            session: SessionId(1),
            seq: 7,
            timestamp: 152_000,
            payload,
        }
    }

    fn snapshot_char(id: u64) -> CharacterSnapshot {
        CharacterSnapshot::with_defaults(
            ActorId(id),
            format!("actor-{id}"),
            Controller::Npc,
        )
    }

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_participant_id_serializes_as_plain_number() {
        let json = serde_json::to_string(&ParticipantId(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn test_participant_id_display() {
        assert_eq!(ParticipantId(7).to_string(), "p-7");
        assert_eq!(SessionId(2).to_string(), "s-2");
        assert_eq!(CombatId(9).to_string(), "c-9");
        assert_eq!(ActorId(5).to_string(), "a-5");
    }

    // =====================================================================
    // Lifecycle tags
    // =====================================================================

    #[test]
    fn test_session_phase_permitted_transitions() {
        use SessionPhase::*;
        assert!(Lobby.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Playing));
        assert!(Playing.can_transition_to(Ended));
        assert!(Paused.can_transition_to(Ended));
    }

    #[test]
    fn test_session_phase_forbidden_transitions() {
        use SessionPhase::*;
        assert!(!Lobby.can_transition_to(Paused));
        assert!(!Lobby.can_transition_to(Ended));
        assert!(!Ended.can_transition_to(Playing));
        assert!(!Ended.can_transition_to(Lobby));
        assert!(!Playing.can_transition_to(Lobby));
    }

    #[test]
    fn test_session_phase_joinable_only_in_lobby() {
        assert!(SessionPhase::Lobby.is_joinable());
        assert!(!SessionPhase::Playing.is_joinable());
        assert!(!SessionPhase::Paused.is_joinable());
        assert!(!SessionPhase::Ended.is_joinable());
    }

    // =====================================================================
    // Character snapshots
    // =====================================================================

    #[test]
    fn test_with_defaults_is_fully_populated_and_alive() {
        let c = CharacterSnapshot::with_defaults(
            ActorId(1),
            "rook",
            Controller::Participant(ParticipantId(4)),
        );
        assert!(c.is_alive());
        assert_eq!(c.hp, c.max_hp);
        assert_eq!(c.gauge, 0);
        assert!(c.speed > 0, "defaulted speed must still fill the gauge");
    }

    #[test]
    fn test_is_alive_false_at_zero_hp() {
        let mut c = snapshot_char(1);
        c.hp = 0;
        assert!(!c.is_alive());
        c.hp = -3;
        assert!(!c.is_alive());
    }

    // =====================================================================
    // Wire shape
    // =====================================================================

    #[test]
    fn test_combat_action_wire_shape_matches_protocol() {
        // The external interface contract: flat envelope fields plus an
        // adjacent "type"/"data" pair for the payload.
        let env = envelope(Payload::CombatAction {
            action_type: ActionKind::Skill,
            target_id: ActorId(9),
            skill_name: Some("ember".into()),
        });
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();

        assert_eq!(json["type"], "combat_action");
        assert_eq!(json["sender_id"], 3);
        assert_eq!(json["session_id"], 1);
        assert_eq!(json["seq"], 7);
        assert_eq!(json["data"]["action_type"], "skill");
        assert_eq!(json["data"]["target_id"], 9);
        assert_eq!(json["data"]["skill_name"], "ember");
    }

    #[test]
    fn test_handshake_wire_shape() {
        let env = envelope(Payload::Handshake {
            version: 1,
            role: Role::Peer,
            character_name: "mira".into(),
            listen_addr: None,
        });
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();

        assert_eq!(json["type"], "handshake");
        assert_eq!(json["data"]["role"], "peer");
        assert_eq!(json["data"]["character_name"], "mira");
        assert!(json["data"]["listen_addr"].is_null());
    }

    #[test]
    fn test_payload_kind_matches_wire_tag() {
        // kind() and the serde tag must agree for every variant, because
        // the dispatcher keys handlers by MessageKind while serde writes
        // the tag string.
        let samples = all_payload_samples();
        assert_eq!(samples.len(), MessageKind::ALL.len());
        for payload in samples {
            let json: serde_json::Value =
                serde_json::to_value(&payload).unwrap();
            assert_eq!(json["type"], payload.kind().wire_tag());
        }
    }

    #[test]
    fn test_message_kind_from_wire_tag_round_trip() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_wire_tag(kind.wire_tag()), Some(kind));
        }
        assert_eq!(MessageKind::from_wire_tag("fly_to_moon"), None);
    }

    // =====================================================================
    // Round-trip losslessness, one representative value per declared kind
    // =====================================================================

    fn all_payload_samples() -> Vec<Payload> {
        vec![
            Payload::Handshake {
                version: 1,
                role: Role::Peer,
                character_name: "mira".into(),
                listen_addr: Some("127.0.0.1:7777".into()),
            },
            Payload::HandshakeAck {
                participant: ParticipantId(2),
                session: SessionId(1),
                server_time: 5_000,
            },
            Payload::PeerJoin {
                participant: ParticipantId(2),
                display_name: "mira".into(),
            },
            Payload::PeerLeave {
                participant: ParticipantId(1),
                promoted_host: Some(ParticipantId(2)),
            },
            Payload::Ping { nonce: 99 },
            Payload::Pong { nonce: 99 },
            Payload::Chat { text: "gg".into() },
            Payload::GameStateSync {
                snapshot: SessionSnapshot {
                    session: SessionId(1),
                    name: "depths".into(),
                    phase: SessionPhase::Playing,
                    participants: vec![ParticipantEntry {
                        id: ParticipantId(1),
                        role: Role::Host,
                        display_name: "rook".into(),
                        character_id: 17,
                        listen_addr: Some("127.0.0.1:7870".into()),
                    }],
                    turn_order: vec![ParticipantId(1)],
                    sequence: 12,
                    turn_owner: Some(ParticipantId(1)),
                },
            },
            Payload::PlayerMove { x: 4, y: -2 },
            Payload::CombatStart {
                combat: CombatId(1),
                party: vec![snapshot_char(1)],
                enemies: vec![snapshot_char(10)],
            },
            Payload::CombatAction {
                action_type: ActionKind::Attack,
                target_id: ActorId(10),
                skill_name: None,
            },
            Payload::CombatState {
                snapshot: CombatSnapshot {
                    combat: CombatId(1),
                    phase: CombatPhase::AtbProcessing,
                    turn: 3,
                    party: vec![snapshot_char(1)],
                    enemies: vec![snapshot_char(10)],
                    awaiting: None,
                },
            },
            Payload::CombatEnd {
                victory: true,
                log_tail: vec!["rook defeated wisp".into()],
            },
            Payload::AtbUpdate {
                gauges: vec![GaugeEntry {
                    actor: ActorId(1),
                    gauge: 640,
                }],
            },
            Payload::DamageDealt {
                actor: ActorId(1),
                target: ActorId(10),
                action_type: ActionKind::Skill,
                skill_name: Some("ember".into()),
                damage: 42,
                target_hp: 58,
            },
            Payload::TurnOrder {
                order: vec![ParticipantId(1), ParticipantId(2)],
                sequence: 4,
            },
            Payload::Rejected {
                reason: "not your turn".into(),
            },
            Payload::Notice {
                text: "mira joined the session".into(),
            },
        ]
    }

    #[test]
    fn test_envelope_round_trip_every_declared_kind() {
        for payload in all_payload_samples() {
            let env = envelope(payload);
            let bytes = serde_json::to_vec(&env).unwrap();
            let decoded: Envelope = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(env, decoded, "kind {}", env.kind());
        }
    }

    // =====================================================================
    // Malformed input
    // =====================================================================

    #[test]
    fn test_decode_garbage_returns_error() {
        let garbage = b"not json at all";
        let result: Result<Envelope, _> = serde_json::from_slice(garbage);
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_missing_fields_returns_error() {
        let wrong = r#"{"type": "ping"}"#;
        let result: Result<Envelope, _> = serde_json::from_str(wrong);
        assert!(result.is_err());
    }
}
