//! Registered session listeners.
//!
//! The UI layer (or anything else local) observes the session by
//! registering a `SessionListener`. All methods default to no-ops so
//! implementors pick the callbacks they care about. Callbacks run
//! inline on the coordinator's loop and must not block.

use emberlink_combat::CombatEvent;
use emberlink_protocol::{ParticipantEntry, ParticipantId, SessionSnapshot};

/// Callbacks for local observers of a session.
pub trait SessionListener: Send + 'static {
    fn participant_joined(&mut self, _entry: &ParticipantEntry) {}

    fn participant_left(&mut self, _participant: ParticipantId) {}

    /// The host changed; `new_host` may be the local participant, in
    /// which case the process must re-bind as a listening host.
    fn host_changed(&mut self, _new_host: ParticipantId) {}

    /// A fresh full snapshot of session state.
    fn state_updated(&mut self, _snapshot: &SessionSnapshot) {}

    fn combat_event(&mut self, _event: &CombatEvent) {}

    /// A human-readable system notification (join/leave/handoff/
    /// timeout), same text remote participants receive as `notice`.
    fn notice(&mut self, _text: &str) {}
}

/// The set of registered listeners, fanned out in registration order.
#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<Box<dyn SessionListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn SessionListener>) {
        self.listeners.push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn participant_joined(&mut self, entry: &ParticipantEntry) {
        for l in &mut self.listeners {
            l.participant_joined(entry);
        }
    }

    pub fn participant_left(&mut self, participant: ParticipantId) {
        for l in &mut self.listeners {
            l.participant_left(participant);
        }
    }

    pub fn host_changed(&mut self, new_host: ParticipantId) {
        for l in &mut self.listeners {
            l.host_changed(new_host);
        }
    }

    pub fn state_updated(&mut self, snapshot: &SessionSnapshot) {
        for l in &mut self.listeners {
            l.state_updated(snapshot);
        }
    }

    pub fn combat_event(&mut self, event: &CombatEvent) {
        for l in &mut self.listeners {
            l.combat_event(event);
        }
    }

    pub fn notice(&mut self, text: &str) {
        for l in &mut self.listeners {
            l.notice(text);
        }
    }
}
