//! Peer client: one connection to the host, mirrored state, and an
//! event pump.
//!
//! A peer is deliberately thin. It never simulates: every inbound
//! envelope is routed through the [`Dispatcher`] into the session and
//! combat mirrors, and its own actions go to the host and take effect
//! only when the host's broadcast comes back.

use std::time::{Duration, Instant};

use emberlink_combat::{CombatEvent, CombatMirror};
use emberlink_protocol::{
    ActionKind, ActorId, Codec, CombatPhase, CombatSnapshot, Envelope,
    JsonCodec, MessageKind, PROTOCOL_VERSION, ParticipantId, Payload, Role,
    SessionId,
};
use emberlink_session::{ListenerSet, SessionListener, SessionMirror};
use emberlink_transport::{Connection, WsConnection, connect_to_host};
use tokio::time::Instant as TokioInstant;

use crate::dispatch::Dispatcher;
use crate::EmberlinkError;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Peer-side connection settings.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Address this peer would bind if promoted to host, advertised in
    /// the handshake so other peers can find it after a handoff.
    pub listen_addr: Option<String>,
    /// Liveness probe cadence. Silence from the host for twice this
    /// marks the connection dead even if the socket never closes.
    pub ping_interval: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            listen_addr: None,
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Something the event pump surfaced to the application.
#[derive(Debug)]
pub enum PeerEvent {
    /// An envelope arrived and was applied to the mirrors.
    Message(Envelope),
    /// The host left and promoted this peer: the process must re-bind
    /// as a listening host to keep the session alive.
    Promoted,
    /// The host left and promoted another peer. `addr` is where the
    /// new host advertised it would bind; reconnect there.
    HostMoved {
        participant: ParticipantId,
        addr: Option<String>,
    },
    /// The session is over or the host is gone.
    Closed,
}

/// How the pump finished, for callers that just [`run`](PeerClient::run)
/// to completion.
#[derive(Debug, PartialEq, Eq)]
pub enum PeerExit {
    Closed,
    Promoted,
    /// Another peer is the host now; reconnect at `addr` if it gave one.
    HostMoved {
        participant: ParticipantId,
        addr: Option<String>,
    },
}

/// Mirrored state plus pending outbound traffic, mutated only by
/// dispatch handlers.
struct PeerState {
    id: ParticipantId,
    session: SessionMirror,
    combat: CombatMirror,
    listeners: ListenerSet,
    /// Replies queued by handlers, flushed after each dispatch.
    outbound: Vec<Payload>,
    promoted: bool,
    /// Set when a handoff promoted somebody else: the new host's id
    /// and advertised address.
    host_moved: Option<(ParticipantId, Option<String>)>,
    host_gone: bool,
}

/// A connected, handshaken peer.
pub struct PeerClient {
    id: ParticipantId,
    session_id: SessionId,
    conn: WsConnection,
    codec: JsonCodec,
    state: PeerState,
    dispatcher: Dispatcher<PeerState>,
    next_seq: u64,
    epoch: Instant,
    ping: tokio::time::Interval,
    /// Any inbound traffic refreshes this; the pump declares the host
    /// gone when it ages past twice the ping interval.
    last_traffic: TokioInstant,
    liveness_timeout: Duration,
}

impl PeerClient {
    /// Dials the host and performs the handshake with default settings.
    ///
    /// `listen_addr` advertises where this peer would bind if promoted
    /// to host later.
    pub async fn connect(
        addr: &str,
        character_name: &str,
        listen_addr: Option<String>,
    ) -> Result<Self, EmberlinkError> {
        Self::connect_with(
            addr,
            character_name,
            PeerConfig {
                listen_addr,
                ..PeerConfig::default()
            },
        )
        .await
    }

    /// Dials the host and performs the handshake.
    pub async fn connect_with(
        addr: &str,
        character_name: &str,
        config: PeerConfig,
    ) -> Result<Self, EmberlinkError> {
        let conn = connect_to_host(addr).await?;
        let codec = JsonCodec;
        let epoch = Instant::now();

        let hello = Envelope {
            sender: ParticipantId::UNASSIGNED,
            session: SessionId(0),
            seq: 0,
            timestamp: 0,
            payload: Payload::Handshake {
                version: PROTOCOL_VERSION,
                role: Role::Peer,
                character_name: character_name.to_string(),
                listen_addr: config.listen_addr.clone(),
            },
        };
        let bytes = codec.encode(&hello)?;
        conn.send(&bytes).await.map_err(EmberlinkError::Transport)?;

        // The ack assigns our identity. Anything else is a refusal.
        let (id, session_id) = loop {
            let data =
                match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await
                {
                    Ok(Ok(Some(data))) => data,
                    Ok(Ok(None)) => {
                        return Err(EmberlinkError::Handshake(
                            "closed during handshake".into(),
                        ));
                    }
                    Ok(Err(e)) => return Err(EmberlinkError::Transport(e)),
                    Err(_) => {
                        return Err(EmberlinkError::Handshake(
                            "handshake timed out".into(),
                        ));
                    }
                };
            match codec.decode_envelope(&data)?.payload {
                Payload::HandshakeAck {
                    participant,
                    session,
                    ..
                } => break (participant, session),
                Payload::Rejected { reason } => {
                    return Err(EmberlinkError::Handshake(reason));
                }
                other => {
                    tracing::debug!(
                        kind = other.kind().wire_tag(),
                        "ignoring pre-ack message"
                    );
                }
            }
        };
        tracing::info!(participant = %id, session = %session_id, "handshake complete");

        let mut ping = tokio::time::interval(config.ping_interval);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ping.tick().await;

        Ok(Self {
            id,
            session_id,
            conn,
            codec,
            state: PeerState {
                id,
                session: SessionMirror::new(),
                combat: CombatMirror::new(),
                listeners: ListenerSet::new(),
                outbound: Vec::new(),
                promoted: false,
                host_moved: None,
                host_gone: false,
            },
            dispatcher: build_dispatcher(),
            next_seq: 0,
            epoch,
            ping,
            last_traffic: TokioInstant::now(),
            liveness_timeout: config.ping_interval * 2,
        })
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The mirrored session state.
    pub fn session(&self) -> &SessionMirror {
        &self.state.session
    }

    /// The mirrored combat state.
    pub fn combat(&self) -> &CombatMirror {
        &self.state.combat
    }

    pub fn register_listener(&mut self, listener: Box<dyn SessionListener>) {
        self.state.listeners.register(listener);
    }

    // -- Outbound ---------------------------------------------------------

    /// Submits a combat action. The local mirror is untouched until the
    /// host broadcasts the result (or a rejection comes back).
    pub async fn submit_action(
        &mut self,
        action_type: ActionKind,
        target_id: ActorId,
        skill_name: Option<String>,
    ) -> Result<(), EmberlinkError> {
        self.send(Payload::CombatAction {
            action_type,
            target_id,
            skill_name,
        })
        .await
    }

    pub async fn chat(&mut self, text: &str) -> Result<(), EmberlinkError> {
        self.send(Payload::Chat { text: text.to_string() }).await
    }

    pub async fn move_to(&mut self, x: i32, y: i32) -> Result<(), EmberlinkError> {
        self.send(Payload::PlayerMove { x, y }).await
    }

    /// Announces departure and closes the connection.
    pub async fn leave(mut self) -> Result<(), EmberlinkError> {
        self.send(Payload::PeerLeave {
            participant: self.id,
            promoted_host: None,
        })
        .await?;
        self.conn.close().await.map_err(EmberlinkError::Transport)
    }

    async fn send(&mut self, payload: Payload) -> Result<(), EmberlinkError> {
        self.next_seq += 1;
        let envelope = Envelope {
            sender: self.id,
            session: self.session_id,
            seq: self.next_seq,
            timestamp: self.epoch.elapsed().as_millis() as u64,
            payload,
        };
        let bytes = self.codec.encode(&envelope)?;
        self.conn
            .send_retry(&bytes)
            .await
            .map_err(EmberlinkError::Transport)
    }

    // -- Event pump -------------------------------------------------------

    /// Waits for and applies the next inbound message, interleaving the
    /// periodic liveness probe. A host that stays silent past twice the
    /// ping interval counts as gone even while the socket stays open.
    pub async fn next_event(&mut self) -> Result<PeerEvent, EmberlinkError> {
        loop {
            let deadline = self.last_traffic + self.liveness_timeout;
            tokio::select! {
                res = self.conn.recv() => match res {
                    Ok(Some(data)) => {
                        self.last_traffic = TokioInstant::now();
                        let envelope = match self.codec.decode_envelope(&data) {
                            Ok(env) => env,
                            Err(e) => {
                                // Unknown kinds and malformed data both
                                // drop without breaking the stream.
                                tracing::debug!(error = %e, "dropping inbound message");
                                continue;
                            }
                        };
                        self.dispatcher.dispatch(&mut self.state, &envelope);
                        self.flush().await?;
                        if self.state.promoted {
                            return Ok(PeerEvent::Promoted);
                        }
                        if let Some((participant, addr)) =
                            self.state.host_moved.take()
                        {
                            return Ok(PeerEvent::HostMoved { participant, addr });
                        }
                        if self.state.host_gone {
                            return Ok(PeerEvent::Closed);
                        }
                        return Ok(PeerEvent::Message(envelope));
                    }
                    Ok(None) => return Ok(PeerEvent::Closed),
                    Err(e) => {
                        tracing::debug!(error = %e, "connection lost");
                        return Ok(PeerEvent::Closed);
                    }
                },
                _ = self.ping.tick() => {
                    let nonce = self.next_seq;
                    self.send(Payload::Ping { nonce }).await?;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!(
                        timeout = ?self.liveness_timeout,
                        "no traffic from host within the liveness window"
                    );
                    return Ok(PeerEvent::Closed);
                }
            }
        }
    }

    /// Pumps events until the session closes, the host moves, or this
    /// peer is promoted.
    pub async fn run(mut self) -> Result<PeerExit, EmberlinkError> {
        loop {
            match self.next_event().await? {
                PeerEvent::Message(_) => {}
                PeerEvent::Promoted => return Ok(PeerExit::Promoted),
                PeerEvent::HostMoved { participant, addr } => {
                    return Ok(PeerExit::HostMoved { participant, addr });
                }
                PeerEvent::Closed => return Ok(PeerExit::Closed),
            }
        }
    }

    async fn flush(&mut self) -> Result<(), EmberlinkError> {
        let pending: Vec<Payload> = self.state.outbound.drain(..).collect();
        for payload in pending {
            self.send(payload).await?;
        }
        Ok(())
    }
}

/// Builds the peer's handler table: one handler per kind the peer
/// reacts to. Kinds absent here (for example `handshake`) are dropped
/// by the dispatcher.
fn build_dispatcher() -> Dispatcher<PeerState> {
    let mut d = Dispatcher::new();

    d.on(MessageKind::Ping, |state: &mut PeerState, env| {
        if let Payload::Ping { nonce } = env.payload {
            state.outbound.push(Payload::Pong { nonce });
        }
        Ok(())
    });
    // The arrival itself refreshed the pump's liveness window; nonces
    // are not matched.
    d.on(MessageKind::Pong, |_, _| Ok(()));

    d.on(MessageKind::GameStateSync, |state, env| {
        if !state.session.observe_seq(env.seq) {
            return Ok(());
        }
        if let Payload::GameStateSync { snapshot } = &env.payload {
            state.session.apply_snapshot(snapshot.clone());
            state.listeners.state_updated(snapshot);
        }
        Ok(())
    });

    d.on(MessageKind::TurnOrder, |state, env| {
        if !state.session.observe_seq(env.seq) {
            return Ok(());
        }
        if let Payload::TurnOrder { order, sequence } = &env.payload {
            state.session.apply_turn_order(order.clone(), *sequence);
        }
        Ok(())
    });

    d.on(MessageKind::PeerJoin, |state, env| {
        if let Payload::PeerJoin { display_name, .. } = &env.payload {
            state.listeners.notice(&format!("{display_name} joined"));
        }
        Ok(())
    });

    d.on(MessageKind::PeerLeave, |state, env| {
        if let Payload::PeerLeave {
            participant,
            promoted_host,
        } = &env.payload
        {
            state.listeners.participant_left(*participant);
            match promoted_host {
                Some(p) if *p == state.id => {
                    tracing::info!("promoted to host");
                    state.promoted = true;
                }
                Some(p) => {
                    // The new host's bind address came with the session
                    // snapshot; look it up before reconnecting.
                    let addr = state.session.state().and_then(|s| {
                        s.participants
                            .iter()
                            .find(|e| e.id == *p)
                            .and_then(|e| e.listen_addr.clone())
                    });
                    state.host_moved = Some((*p, addr));
                    state.listeners.host_changed(*p);
                }
                // The host left with nobody to promote: session over.
                None if *participant == env.sender => {
                    state.host_gone = true;
                }
                None => {}
            }
        }
        Ok(())
    });

    d.on(MessageKind::CombatStart, |state, env| {
        if let Payload::CombatStart {
            combat,
            party,
            enemies,
        } = &env.payload
        {
            state.combat.apply_snapshot(CombatSnapshot {
                combat: *combat,
                phase: CombatPhase::AtbProcessing,
                turn: 0,
                party: party.clone(),
                enemies: enemies.clone(),
                awaiting: None,
            });
            state.listeners.combat_event(&CombatEvent::Started);
        }
        Ok(())
    });

    d.on(MessageKind::CombatState, |state, env| {
        if !state.session.observe_seq(env.seq) {
            return Ok(());
        }
        if let Payload::CombatState { snapshot } = &env.payload {
            state.combat.apply_snapshot(snapshot.clone());
        }
        Ok(())
    });

    d.on(MessageKind::AtbUpdate, |state, env| {
        if !state.session.observe_seq(env.seq) {
            return Ok(());
        }
        if let Payload::AtbUpdate { gauges } = &env.payload {
            state.combat.apply_gauges(gauges);
            state
                .listeners
                .combat_event(&CombatEvent::GaugesDrifted(gauges.clone()));
        }
        Ok(())
    });

    d.on(MessageKind::DamageDealt, |state, env| {
        if !state.session.observe_seq(env.seq) {
            return Ok(());
        }
        if let Payload::DamageDealt {
            actor,
            target,
            action_type,
            skill_name,
            damage,
            target_hp,
        } = &env.payload
        {
            let line = damage_line(
                &state.combat,
                *actor,
                *target,
                *action_type,
                skill_name.as_deref(),
                *damage,
            );
            state.combat.apply_damage(*target, *target_hp, line);
            state.listeners.combat_event(&CombatEvent::ActionResolved {
                actor: *actor,
                target: *target,
                action: *action_type,
                skill_name: skill_name.clone(),
                damage: *damage,
                target_hp: *target_hp,
                synthesized: false,
            });
        }
        Ok(())
    });

    d.on(MessageKind::CombatEnd, |state, env| {
        if let Payload::CombatEnd { victory, log_tail } = &env.payload {
            state.combat.apply_end(log_tail);
            state.listeners.combat_event(&CombatEvent::Ended {
                victory: *victory,
                log_tail: log_tail.clone(),
            });
        }
        Ok(())
    });

    d.on(MessageKind::Chat, |state, env| {
        if let Payload::Chat { text } = &env.payload {
            state.listeners.notice(&format!("{}: {text}", env.sender));
        }
        Ok(())
    });

    d.on(MessageKind::Notice, |state, env| {
        if let Payload::Notice { text } = &env.payload {
            state.listeners.notice(text);
        }
        Ok(())
    });

    d.on(MessageKind::Rejected, |state, env| {
        if let Payload::Rejected { reason } = &env.payload {
            tracing::debug!(%reason, "host rejected our message");
            state.listeners.notice(&format!("rejected: {reason}"));
        }
        Ok(())
    });

    d
}

/// Rebuilds the host's log line for a resolved action from mirrored
/// names, so peer-side scrollback matches the host's.
fn damage_line(
    combat: &CombatMirror,
    actor: ActorId,
    target: ActorId,
    action: ActionKind,
    skill_name: Option<&str>,
    damage: i32,
) -> String {
    let name = |id: ActorId| -> String {
        combat
            .state()
            .and_then(|s| {
                s.party
                    .iter()
                    .chain(s.enemies.iter())
                    .find(|c| c.id == id)
                    .map(|c| c.name.clone())
            })
            .unwrap_or_else(|| id.to_string())
    };
    let actor = name(actor);
    let target = name(target);
    match action {
        ActionKind::Attack => format!("{actor} attacks {target} for {damage}"),
        ActionKind::Skill => {
            let skill = skill_name.unwrap_or("?");
            format!("{actor} uses {skill} on {target} for {damage}")
        }
        ActionKind::Item => format!("{actor} uses an item on {target}"),
        ActionKind::Defend => format!("{actor} defends"),
        ActionKind::Escape => format!("{actor} tries to escape"),
    }
}
