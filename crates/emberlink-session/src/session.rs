//! Authoritative session state: membership, lifecycle phase, turn order.
//!
//! `Session` is a plain synchronous state machine; the coordinator actor
//! owns one and drives it. Everything here is testable without a socket
//! or a runtime.

use std::collections::BTreeMap;

use emberlink_protocol::{
    ParticipantId, Role, SessionId, SessionPhase, SessionSnapshot,
};

use crate::{Participant, SessionError};

/// What removing a participant changed.
#[derive(Debug)]
pub struct Removal {
    pub participant: Participant,
    /// Set when the removed participant was the host; names the member
    /// promoted in their place.
    pub promoted_host: Option<ParticipantId>,
}

/// The host's authoritative view of one session.
pub struct Session {
    id: SessionId,
    name: String,
    phase: SessionPhase,
    min_participants: usize,
    max_participants: usize,
    /// Keyed by id; ids are assigned in join order, so iteration order
    /// is join order.
    participants: BTreeMap<ParticipantId, Participant>,
    turn_order: Vec<ParticipantId>,
    sequence: u64,
}

impl Session {
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        min_participants: usize,
        max_participants: usize,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            phase: SessionPhase::Lobby,
            min_participants,
            max_participants,
            participants: BTreeMap::new(),
            turn_order: Vec::new(),
            sequence: 0,
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn turn_order(&self) -> &[ParticipantId] {
        &self.turn_order
    }

    /// `turn_order[sequence % len]`, or `None` with an empty order.
    pub fn turn_owner(&self) -> Option<ParticipantId> {
        if self.turn_order.is_empty() {
            return None;
        }
        let idx = (self.sequence % self.turn_order.len() as u64) as usize;
        Some(self.turn_order[idx])
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn participant_mut(
        &mut self,
        id: ParticipantId,
    ) -> Option<&mut Participant> {
        self.participants.get_mut(&id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Number of members that take turns (everyone but spectators).
    pub fn turn_taker_count(&self) -> usize {
        self.participants
            .values()
            .filter(|p| p.takes_turns())
            .count()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn host(&self) -> Option<&Participant> {
        self.participants.values().find(|p| p.role == Role::Host)
    }

    // -- Mutations --------------------------------------------------------

    /// Adds a member and reindexes the turn order.
    ///
    /// # Errors
    /// Joining is only possible in the lobby, below the participant
    /// cap, and once per id.
    pub fn add_participant(
        &mut self,
        participant: Participant,
    ) -> Result<(), SessionError> {
        if !self.phase.is_joinable() {
            return Err(SessionError::InvalidTransition {
                from: self.phase,
                to: self.phase,
            });
        }
        if self.participants.contains_key(&participant.id) {
            return Err(SessionError::AlreadyJoined(participant.id));
        }
        if self.participants.len() >= self.max_participants {
            return Err(SessionError::SessionFull {
                max: self.max_participants,
            });
        }

        tracing::info!(
            session = %self.id,
            participant = %participant.id,
            role = %participant.role,
            name = %participant.display_name,
            "participant joined"
        );
        self.participants.insert(participant.id, participant);
        self.rebuild_turn_order();
        Ok(())
    }

    /// Removes a member and reindexes the turn order. Removing the host
    /// promotes the next turn-taking member in join order.
    pub fn remove_participant(
        &mut self,
        id: ParticipantId,
    ) -> Result<Removal, SessionError> {
        let participant = self
            .participants
            .remove(&id)
            .ok_or(SessionError::NotAMember(id))?;

        let promoted_host = if participant.role == Role::Host {
            let next = self
                .participants
                .values_mut()
                .find(|p| p.takes_turns());
            match next {
                Some(p) => {
                    p.role = Role::Host;
                    Some(p.id)
                }
                None => None,
            }
        } else {
            None
        };

        self.rebuild_turn_order();
        tracing::info!(
            session = %self.id,
            participant = %id,
            remaining = self.participants.len(),
            promoted = promoted_host.map(|p| p.to_string()),
            "participant left"
        );

        Ok(Removal {
            participant,
            promoted_host,
        })
    }

    /// Moves to `to` if it is a permitted lifecycle edge.
    pub fn transition(&mut self, to: SessionPhase) -> Result<(), SessionError> {
        if !self.phase.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::info!(session = %self.id, from = %self.phase, %to, "session phase change");
        self.phase = to;
        Ok(())
    }

    /// Checks the start precondition without transitioning.
    pub fn ready_to_start(&self) -> Result<(), SessionError> {
        let have = self.turn_taker_count();
        if have < self.min_participants {
            return Err(SessionError::InsufficientParticipants {
                have,
                need: self.min_participants,
            });
        }
        Ok(())
    }

    /// Advances the turn: bumps the sequence and recomputes the owner.
    pub fn advance_turn(&mut self) -> Option<ParticipantId> {
        self.sequence += 1;
        let owner = self.turn_owner();
        tracing::debug!(
            session = %self.id,
            sequence = self.sequence,
            owner = owner.map(|p| p.to_string()),
            "turn advanced"
        );
        owner
    }

    /// Turn order is always exactly the turn-taking members, in join
    /// order. Spectators never appear.
    fn rebuild_turn_order(&mut self) {
        self.turn_order = self
            .participants
            .values()
            .filter(|p| p.takes_turns())
            .map(|p| p.id)
            .collect();
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.id,
            name: self.name.clone(),
            phase: self.phase,
            participants: self.participants.values().map(|p| p.entry()).collect(),
            turn_order: self.turn_order.clone(),
            sequence: self.sequence,
            turn_owner: self.turn_owner(),
        }
    }
}
