//! Session coordinator actor: an isolated Tokio task owning all
//! authoritative session state.
//!
//! Everything mutable lives inside the actor; the outside world talks
//! to it through [`CoordinatorHandle`], an mpsc sender wrapper. One
//! `tokio::select!` loop multiplexes inbound commands with the periodic
//! snapshot broadcast, the liveness probe, the turn deadline, and the
//! combat gauge clock — the single cooperative event loop for the whole
//! host process.

use std::time::Instant;

use emberlink_combat::{
    ChosenAction, CombatConfig, CombatError, CombatEvent, CombatInstance,
    GaugeClock, GaugeClockConfig, RuleEngine, TickInfo,
};
use emberlink_protocol::{
    ActorId, CharacterSnapshot, CombatId, Controller, Envelope, ParticipantId,
    Payload, Role, SessionId, SessionPhase, SessionSnapshot,
};
use emberlink_transport::ConnectionId;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant as TokioInstant, MissedTickBehavior};

use crate::{
    ListenerSet, Participant, Session, SessionConfig, SessionError,
    SessionListener,
};

/// Outbound channel for one participant's writer task.
pub type OutboundSender = mpsc::UnboundedSender<Envelope>;

/// Commands sent to the coordinator actor through its channel.
pub(crate) enum SessionCommand {
    AddParticipant {
        role: Role,
        display_name: String,
        character_id: u64,
        listen_addr: Option<String>,
        connection: Option<ConnectionId>,
        sender: Option<OutboundSender>,
        reply: oneshot::Sender<Result<(ParticipantId, SessionSnapshot), SessionError>>,
    },
    RemoveParticipant {
        participant: ParticipantId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    /// A decoded, validated envelope from a connected participant.
    Inbound { envelope: Envelope },
    Start {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Pause {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StartCombat {
        enemies: Vec<CharacterSnapshot>,
        config: CombatConfig,
        reply: oneshot::Sender<Result<CombatId, SessionError>>,
    },
    AdvanceTurn {
        reply: oneshot::Sender<Result<u64, SessionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
    RegisterListener { listener: Box<dyn SessionListener> },
    /// Stop the session. Replies with the promoted host, if any.
    Shutdown {
        reply: oneshot::Sender<Option<ParticipantId>>,
    },
}

/// Handle to a running coordinator. Cheap to clone.
#[derive(Clone)]
pub struct CoordinatorHandle {
    session: SessionId,
    host: ParticipantId,
    sender: mpsc::Sender<SessionCommand>,
}

impl CoordinatorHandle {
    pub fn session_id(&self) -> SessionId {
        self.session
    }

    /// The local (host) participant id.
    pub fn host_id(&self) -> ParticipantId {
        self.host
    }

    /// Registers a participant after a successful handshake. Returns
    /// the assigned id and the snapshot the new member must receive
    /// before entering the lobby.
    pub async fn add_participant(
        &self,
        role: Role,
        display_name: impl Into<String>,
        character_id: u64,
        listen_addr: Option<String>,
        connection: Option<ConnectionId>,
        sender: Option<OutboundSender>,
    ) -> Result<(ParticipantId, SessionSnapshot), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::AddParticipant {
                role,
                display_name: display_name.into(),
                character_id,
                listen_addr,
                connection,
                sender,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)?
    }

    pub async fn remove_participant(
        &self,
        participant: ParticipantId,
    ) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::RemoveParticipant {
                participant,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)?
    }

    /// Delivers an inbound envelope (fire-and-forget).
    pub async fn inbound(&self, envelope: Envelope) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::Inbound { envelope })
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    pub async fn start(&self) -> Result<(), SessionError> {
        self.simple(|reply| SessionCommand::Start { reply }).await
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.simple(|reply| SessionCommand::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.simple(|reply| SessionCommand::Resume { reply }).await
    }

    pub async fn start_combat(
        &self,
        enemies: Vec<CharacterSnapshot>,
        config: CombatConfig,
    ) -> Result<CombatId, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::StartCombat {
                enemies,
                config,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)?
    }

    /// Advances the turn by hand. Returns the new sequence number.
    pub async fn advance_turn(&self) -> Result<u64, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::AdvanceTurn { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)?
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    pub async fn register_listener(
        &self,
        listener: Box<dyn SessionListener>,
    ) -> Result<(), SessionError> {
        self.sender
            .send(SessionCommand::RegisterListener { listener })
            .await
            .map_err(|_| SessionError::Unavailable)
    }

    /// Ends the session and stops the actor. Returns the participant
    /// promoted to host, if any remain.
    pub async fn shutdown(&self) -> Result<Option<ParticipantId>, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    async fn simple(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), SessionError>>) -> SessionCommand,
    ) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)?
    }
}

/// The internal coordinator state. Runs inside a Tokio task.
struct Coordinator {
    session: Session,
    config: SessionConfig,
    host: ParticipantId,
    /// Per-participant outbound channels (remote members only).
    senders: std::collections::HashMap<ParticipantId, OutboundSender>,
    listeners: ListenerSet,
    engine: Box<dyn RuleEngine>,
    combat: Option<CombatInstance>,
    clock: GaugeClock,
    /// Armed while a peer's combat action is awaited.
    action_deadline: Option<TokioInstant>,
    /// Session epoch; envelope timestamps count from here.
    epoch: Instant,
    next_seq: u64,
    next_participant: u64,
    next_actor: u64,
    next_combat: u64,
    receiver: mpsc::Receiver<SessionCommand>,
}

/// Spawns a coordinator actor for a fresh session with the local
/// participant installed as host.
pub fn spawn_coordinator(
    config: SessionConfig,
    host_name: impl Into<String>,
    host_character_id: u64,
    engine: Box<dyn RuleEngine>,
) -> CoordinatorHandle {
    let session_id = SessionId(rand::rng().random());
    let host_id = ParticipantId(1);

    let mut session = Session::new(
        session_id,
        config.name.clone(),
        config.min_participants,
        config.max_participants,
    );
    // The host is a member like any other, just without a socket.
    session
        .add_participant(Participant::new(
            host_id,
            Role::Host,
            host_name,
            host_character_id,
            None,
        ))
        .unwrap_or_else(|_| unreachable!("fresh session accepts its host"));

    let (tx, rx) = mpsc::channel(config.channel_size);
    let actor = Coordinator {
        session,
        config,
        host: host_id,
        senders: std::collections::HashMap::new(),
        listeners: ListenerSet::new(),
        engine,
        combat: None,
        clock: GaugeClock::new(GaugeClockConfig::default()),
        action_deadline: None,
        epoch: Instant::now(),
        next_seq: 0,
        next_participant: 2,
        next_actor: 1,
        next_combat: 1,
        receiver: rx,
    };
    tokio::spawn(actor.run());

    CoordinatorHandle {
        session: session_id,
        host: host_id,
        sender: tx,
    }
}

/// Pends forever with no deadline, so the select branch stays inert.
async fn deadline_elapsed(deadline: Option<TokioInstant>) {
    match deadline {
        Some(d) => time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

impl Coordinator {
    async fn run(mut self) {
        tracing::info!(session = %self.session.id(), "session coordinator started");

        let mut snapshot_tick = time::interval(self.config.snapshot_interval);
        snapshot_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First interval tick fires immediately; swallow it.
        snapshot_tick.tick().await;

        let mut ping_tick = time::interval(self.config.ping_interval);
        ping_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ping_tick.tick().await;

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = snapshot_tick.tick() => self.broadcast_snapshots(),
                _ = ping_tick.tick() => self.run_liveness_round(),
                _ = deadline_elapsed(self.action_deadline) => {
                    self.handle_action_timeout();
                }
                tick = self.clock.wait_for_tick() => self.handle_gauge_tick(tick),
            }
        }

        tracing::info!(session = %self.session.id(), "session coordinator stopped");
    }

    /// Returns `true` when the actor should stop.
    fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::AddParticipant {
                role,
                display_name,
                character_id,
                listen_addr,
                connection,
                sender,
                reply,
            } => {
                let result = self.handle_add(
                    role,
                    display_name,
                    character_id,
                    listen_addr,
                    connection,
                    sender,
                );
                let _ = reply.send(result);
            }
            SessionCommand::RemoveParticipant { participant, reply } => {
                let result = self.handle_disconnect(participant);
                let _ = reply.send(result);
            }
            SessionCommand::Inbound { envelope } => self.handle_inbound(envelope),
            SessionCommand::Start { reply } => {
                let _ = reply.send(self.handle_start());
            }
            SessionCommand::Pause { reply } => {
                let _ = reply.send(self.handle_pause());
            }
            SessionCommand::Resume { reply } => {
                let _ = reply.send(self.handle_resume());
            }
            SessionCommand::StartCombat {
                enemies,
                config,
                reply,
            } => {
                let _ = reply.send(self.handle_start_combat(enemies, config));
            }
            SessionCommand::AdvanceTurn { reply } => {
                let result = if self.session.phase().is_playing() {
                    self.advance_turn();
                    Ok(self.session.sequence())
                } else {
                    Err(SessionError::InvalidTransition {
                        from: self.session.phase(),
                        to: self.session.phase(),
                    })
                };
                let _ = reply.send(result);
            }
            SessionCommand::Snapshot { reply } => {
                let _ = reply.send(self.session.snapshot());
            }
            SessionCommand::RegisterListener { listener } => {
                self.listeners.register(listener);
            }
            SessionCommand::Shutdown { reply } => {
                let promoted = self.handle_shutdown();
                let _ = reply.send(promoted);
                return true;
            }
        }
        false
    }

    // -- Membership -------------------------------------------------------

    fn handle_add(
        &mut self,
        role: Role,
        display_name: String,
        character_id: u64,
        listen_addr: Option<String>,
        connection: Option<ConnectionId>,
        sender: Option<OutboundSender>,
    ) -> Result<(ParticipantId, SessionSnapshot), SessionError> {
        let id = ParticipantId(self.next_participant);
        let participant = Participant::new(
            id,
            role,
            display_name.clone(),
            character_id,
            connection,
        )
        .with_listen_addr(listen_addr);
        let entry = participant.entry();
        self.session.add_participant(participant)?;
        self.next_participant += 1;

        if let Some(sender) = sender {
            self.senders.insert(id, sender);
        }

        self.broadcast(Payload::PeerJoin {
            participant: id,
            display_name: display_name.clone(),
        });
        self.notice(format!("{display_name} joined the session"));
        self.listeners.participant_joined(&entry);

        Ok((id, self.session.snapshot()))
    }

    fn handle_disconnect(
        &mut self,
        participant: ParticipantId,
    ) -> Result<(), SessionError> {
        // An awaited action from the departing member resolves as a
        // timeout-default before the membership change.
        if let Some(mut combat) = self.combat.take() {
            let events =
                combat.participant_disconnected(participant, self.engine.as_mut());
            self.combat = Some(combat);
            self.process_combat_events(events);
        }

        let removal = self.session.remove_participant(participant)?;
        self.senders.remove(&participant);
        if self.action_deadline.is_some()
            && self.combat.as_ref().is_none_or(|c| c.awaiting().is_none())
        {
            self.action_deadline = None;
        }

        self.broadcast(Payload::PeerLeave {
            participant,
            promoted_host: removal.promoted_host,
        });
        self.notice(format!(
            "{} left the session",
            removal.participant.display_name
        ));
        self.listeners.participant_left(participant);
        if let Some(promoted) = removal.promoted_host {
            self.listeners.host_changed(promoted);
        }
        self.broadcast(Payload::TurnOrder {
            order: self.session.turn_order().to_vec(),
            sequence: self.session.sequence(),
        });

        // A session cannot continue with a single member.
        if self.session.phase().is_playing() && self.session.turn_taker_count() < 2
        {
            self.end_session("not enough participants remain");
        }
        Ok(())
    }

    // -- Lifecycle --------------------------------------------------------

    fn handle_start(&mut self) -> Result<(), SessionError> {
        self.session.ready_to_start()?;
        self.session.transition(SessionPhase::Playing)?;
        self.broadcast(Payload::TurnOrder {
            order: self.session.turn_order().to_vec(),
            sequence: self.session.sequence(),
        });
        self.notice("session started");
        self.broadcast_snapshots();
        Ok(())
    }

    fn handle_pause(&mut self) -> Result<(), SessionError> {
        self.session.transition(SessionPhase::Paused)?;
        self.clock.pause();
        self.notice("session paused");
        self.broadcast_snapshots();
        Ok(())
    }

    fn handle_resume(&mut self) -> Result<(), SessionError> {
        self.session.transition(SessionPhase::Playing)?;
        if let Some(combat) = &self.combat {
            if combat.awaiting().is_none() && !combat.is_over() {
                self.clock.resume();
            }
        }
        self.notice("session resumed");
        self.broadcast_snapshots();
        Ok(())
    }

    fn handle_shutdown(&mut self) -> Option<ParticipantId> {
        // Cancel any awaited action before tearing down.
        if let Some(mut combat) = self.combat.take() {
            if combat.awaiting().is_some() {
                let events = combat.force_default_action(self.engine.as_mut());
                self.combat = Some(combat);
                self.process_combat_events(events);
            } else {
                self.combat = Some(combat);
            }
        }

        let promoted = self
            .session
            .participants()
            .find(|p| p.takes_turns() && p.id != self.host)
            .map(|p| p.id);

        self.broadcast(Payload::PeerLeave {
            participant: self.host,
            promoted_host: promoted,
        });
        if let Some(promoted) = promoted {
            tracing::info!(
                session = %self.session.id(),
                new_host = %promoted,
                "handing session off"
            );
            self.listeners.host_changed(promoted);
        }
        promoted
    }

    fn end_session(&mut self, reason: &str) {
        if let Some(mut combat) = self.combat.take() {
            if combat.awaiting().is_some() {
                let events = combat.force_default_action(self.engine.as_mut());
                self.combat = Some(combat);
                self.process_combat_events(events);
            } else {
                self.combat = Some(combat);
            }
        }
        self.combat = None;
        self.clock.pause();
        self.action_deadline = None;

        if self.session.transition(SessionPhase::Ended).is_ok() {
            self.notice(format!("session ended: {reason}"));
            self.broadcast_snapshots();
        }
    }

    // -- Inbound messages -------------------------------------------------

    fn handle_inbound(&mut self, envelope: Envelope) {
        let sender = envelope.sender;
        if let Some(p) = self.session.participant_mut(sender) {
            p.touch();
        } else {
            tracing::warn!(%sender, "message from non-member, ignoring");
            return;
        }

        match envelope.payload {
            Payload::Ping { nonce } => {
                self.send_to(sender, Payload::Pong { nonce });
            }
            Payload::Pong { .. } => {}
            Payload::Chat { text } => self.handle_chat(sender, text),
            Payload::PlayerMove { x, y } => {
                self.relay_except(sender, Payload::PlayerMove { x, y });
            }
            Payload::CombatAction {
                action_type,
                target_id,
                skill_name,
            } => {
                let action = ChosenAction {
                    kind: action_type,
                    target: target_id,
                    skill_name,
                };
                self.handle_combat_action(sender, action);
            }
            Payload::PeerLeave { participant, .. } => {
                // Members announce their own departure, nobody else's.
                if participant == sender {
                    let _ = self.handle_disconnect(participant);
                } else {
                    tracing::warn!(
                        %sender,
                        named = %participant,
                        "peer_leave naming another member, ignoring"
                    );
                }
            }
            other => {
                tracing::debug!(
                    %sender,
                    kind = other.kind().wire_tag(),
                    "unhandled message kind, ignoring"
                );
            }
        }
    }

    fn handle_chat(&mut self, sender: ParticipantId, text: String) {
        if !self.config.capabilities.chat {
            self.send_to(
                sender,
                Payload::Rejected {
                    reason: "chat is disabled in this session".into(),
                },
            );
            return;
        }
        // Relayed under the original sender's id so clients can
        // attribute the line.
        let envelope = self.envelope_from(sender, Payload::Chat { text });
        self.fan_out(&envelope, Some(sender));
    }

    fn handle_combat_action(&mut self, sender: ParticipantId, action: ChosenAction) {
        let Some(mut combat) = self.combat.take() else {
            let e = SessionError::from(CombatError::NotActive);
            tracing::debug!(%sender, error = %e, "combat action rejected");
            self.send_to(
                sender,
                Payload::Rejected {
                    reason: e.to_string(),
                },
            );
            return;
        };

        match combat.submit_action(sender, action, self.engine.as_mut()) {
            Ok(events) => {
                self.combat = Some(combat);
                self.process_combat_events(events);
            }
            Err(e) => {
                self.combat = Some(combat);
                let e = SessionError::from(e);
                tracing::debug!(%sender, error = %e, "combat action rejected");
                self.send_to(
                    sender,
                    Payload::Rejected {
                        reason: e.to_string(),
                    },
                );
            }
        }
    }

    // -- Combat -----------------------------------------------------------

    fn handle_start_combat(
        &mut self,
        enemies: Vec<CharacterSnapshot>,
        config: CombatConfig,
    ) -> Result<CombatId, SessionError> {
        if !self.session.phase().is_playing() {
            return Err(SessionError::InvalidTransition {
                from: self.session.phase(),
                to: self.session.phase(),
            });
        }

        let members: Vec<(ParticipantId, String)> = self
            .session
            .participants()
            .filter(|p| p.takes_turns())
            .map(|p| (p.id, p.display_name.clone()))
            .collect();
        let mut party = Vec::with_capacity(members.len());
        for (pid, name) in members {
            let actor = ActorId(self.next_actor);
            self.next_actor += 1;
            party.push(CharacterSnapshot::with_defaults(
                actor,
                name,
                Controller::Participant(pid),
            ));
        }

        let id = CombatId(self.next_combat);
        self.next_combat += 1;
        let mut combat =
            CombatInstance::new(id, self.host, party, enemies, config);
        let events = combat.begin();
        self.combat = Some(combat);
        self.process_combat_events(events);
        Ok(id)
    }

    fn handle_gauge_tick(&mut self, tick: TickInfo) {
        let Some(mut combat) = self.combat.take() else {
            self.clock.pause();
            return;
        };
        let events = combat.tick(self.engine.as_mut(), tick.dt);
        self.combat = Some(combat);
        self.process_combat_events(events);
    }

    fn handle_action_timeout(&mut self) {
        self.action_deadline = None;
        let Some(mut combat) = self.combat.take() else { return };
        tracing::info!(
            combat = %combat.id(),
            "turn deadline expired, applying default action"
        );
        let events = combat.force_default_action(self.engine.as_mut());
        self.combat = Some(combat);
        self.process_combat_events(events);
    }

    fn process_combat_events(&mut self, events: Vec<CombatEvent>) {
        for event in events {
            self.listeners.combat_event(&event);
            match event {
                CombatEvent::Started => {
                    let start = self.combat.as_ref().map(|c| Payload::CombatStart {
                        combat: c.id(),
                        party: c.party().to_vec(),
                        enemies: c.enemies().to_vec(),
                    });
                    if let Some(payload) = start {
                        self.broadcast(payload);
                    }
                    self.clock.resume();
                }
                CombatEvent::GaugesDrifted(gauges) => {
                    self.broadcast(Payload::AtbUpdate { gauges });
                }
                CombatEvent::AwaitingAction { actor, participant } => {
                    self.clock.pause();
                    self.action_deadline = Some(
                        TokioInstant::now() + self.config.turn_timeout,
                    );
                    tracing::debug!(
                        %actor,
                        %participant,
                        timeout = ?self.config.turn_timeout,
                        "awaiting combat action"
                    );
                    let snapshot = self.combat.as_ref().map(|c| c.snapshot());
                    if let Some(snapshot) = snapshot {
                        self.broadcast(Payload::CombatState { snapshot });
                    }
                }
                CombatEvent::ActionResolved {
                    actor,
                    target,
                    action,
                    skill_name,
                    damage,
                    target_hp,
                    synthesized,
                } => {
                    self.broadcast(Payload::DamageDealt {
                        actor,
                        target,
                        action_type: action,
                        skill_name,
                        damage,
                        target_hp,
                    });
                    if synthesized {
                        let name = self
                            .actor_name(actor)
                            .unwrap_or_else(|| actor.to_string());
                        self.notice(format!(
                            "{name} took too long and defends by default"
                        ));
                    }
                    self.action_deadline = None;
                    self.advance_turn();
                    if self
                        .combat
                        .as_ref()
                        .is_some_and(|c| !c.is_over() && c.awaiting().is_none())
                    {
                        self.clock.resume();
                    }
                }
                CombatEvent::ActorDown { actor } => {
                    let name = self
                        .actor_name(actor)
                        .unwrap_or_else(|| actor.to_string());
                    self.notice(format!("{name} is down"));
                }
                CombatEvent::Ended { victory, log_tail } => {
                    self.broadcast(Payload::CombatEnd { victory, log_tail });
                    self.clock.pause();
                    self.action_deadline = None;
                    self.combat = None;
                }
            }
        }
    }

    fn actor_name(&self, actor: ActorId) -> Option<String> {
        let combat = self.combat.as_ref()?;
        combat
            .party()
            .iter()
            .chain(combat.enemies().iter())
            .find(|c| c.id == actor)
            .map(|c| c.name.clone())
    }

    // -- Timers -----------------------------------------------------------

    fn advance_turn(&mut self) {
        self.session.advance_turn();
        self.broadcast(Payload::TurnOrder {
            order: self.session.turn_order().to_vec(),
            sequence: self.session.sequence(),
        });
    }

    /// Periodic state repair: peers replace their mirrors wholesale, so
    /// anything they missed heals here.
    fn broadcast_snapshots(&mut self) {
        let snapshot = self.session.snapshot();
        self.listeners.state_updated(&snapshot);
        self.broadcast(Payload::GameStateSync { snapshot });
        let combat_snapshot = self.combat.as_ref().map(|c| c.snapshot());
        if let Some(snapshot) = combat_snapshot {
            self.broadcast(Payload::CombatState { snapshot });
        }
    }

    /// Drops members that have been silent for two probe intervals,
    /// then probes the rest.
    fn run_liveness_round(&mut self) {
        let cutoff = self.config.ping_interval * 2;
        let stale: Vec<ParticipantId> = self
            .session
            .participants()
            .filter(|p| p.connection.is_some() && p.last_seen.elapsed() > cutoff)
            .map(|p| p.id)
            .collect();
        for id in stale {
            tracing::warn!(participant = %id, "liveness timeout, removing");
            let _ = self.handle_disconnect(id);
        }

        let nonce = rand::rng().random();
        self.broadcast(Payload::Ping { nonce });
    }

    // -- Outbound ---------------------------------------------------------

    fn envelope_from(&mut self, sender: ParticipantId, payload: Payload) -> Envelope {
        self.next_seq += 1;
        Envelope {
            sender,
            session: self.session.id(),
            seq: self.next_seq,
            timestamp: self.epoch.elapsed().as_millis() as u64,
            payload,
        }
    }

    fn broadcast(&mut self, payload: Payload) {
        let envelope = self.envelope_from(self.host, payload);
        self.fan_out(&envelope, None);
    }

    fn relay_except(&mut self, sender: ParticipantId, payload: Payload) {
        let envelope = self.envelope_from(sender, payload);
        self.fan_out(&envelope, Some(sender));
    }

    fn send_to(&mut self, participant: ParticipantId, payload: Payload) {
        let envelope = self.envelope_from(self.host, payload);
        if let Some(tx) = self.senders.get(&participant) {
            // A dead writer is caught by the liveness round.
            let _ = tx.send(envelope);
        }
    }

    fn fan_out(&self, envelope: &Envelope, except: Option<ParticipantId>) {
        for (id, tx) in &self.senders {
            if Some(*id) == except {
                continue;
            }
            let _ = tx.send(envelope.clone());
        }
    }

    fn notice(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.listeners.notice(&text);
        self.broadcast(Payload::Notice { text });
    }
}
