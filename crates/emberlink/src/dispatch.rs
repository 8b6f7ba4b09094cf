//! Message dispatch: one registered handler per message kind.
//!
//! The boundary between the wire and state mutation. Every inbound
//! envelope is routed by its kind; kinds with no registered handler are
//! logged and dropped, and a handler error becomes a typed
//! [`Disposition`] — it never propagates out of the dispatcher, so a
//! bad message can't take the process down.

use std::collections::HashMap;

use emberlink_protocol::{Envelope, MessageKind};

/// What dispatching an envelope produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The handler ran to completion.
    Handled,
    /// No handler is registered for this kind; the message was dropped.
    Unhandled,
    /// The handler refused the message; the reason may be sent back to
    /// the sender as a `rejected` reply.
    Rejected(String),
}

/// A handler mutates shared state `S` in response to one envelope.
/// Returning `Err` rejects the message without mutating further.
pub type Handler<S> =
    Box<dyn FnMut(&mut S, &Envelope) -> Result<(), String> + Send>;

/// Routes envelopes to per-kind handlers over state `S`.
pub struct Dispatcher<S> {
    handlers: HashMap<MessageKind, Handler<S>>,
}

impl<S> Dispatcher<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers the handler for `kind`, replacing any previous one.
    pub fn on(
        &mut self,
        kind: MessageKind,
        handler: impl FnMut(&mut S, &Envelope) -> Result<(), String> + Send + 'static,
    ) -> &mut Self {
        self.handlers.insert(kind, Box::new(handler));
        self
    }

    pub fn handles(&self, kind: MessageKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Routes one envelope. Never panics the caller: missing handlers
    /// and handler failures both come back as values.
    pub fn dispatch(&mut self, state: &mut S, envelope: &Envelope) -> Disposition {
        let kind = envelope.payload.kind();
        let Some(handler) = self.handlers.get_mut(&kind) else {
            tracing::debug!(
                kind = kind.wire_tag(),
                sender = %envelope.sender,
                "no handler for message kind, dropping"
            );
            return Disposition::Unhandled;
        };

        match handler(state, envelope) {
            Ok(()) => Disposition::Handled,
            Err(reason) => {
                tracing::debug!(
                    kind = kind.wire_tag(),
                    sender = %envelope.sender,
                    %reason,
                    "handler rejected message"
                );
                Disposition::Rejected(reason)
            }
        }
    }
}

impl<S> Default for Dispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emberlink_protocol::{ParticipantId, Payload, SessionId};

    fn envelope(payload: Payload) -> Envelope {
        Envelope {
            sender: ParticipantId(1),
            session: SessionId(1),
            seq: 1,
            timestamp: 0,
            payload,
        }
    }

    #[test]
    fn test_dispatch_routes_to_registered_handler() {
        let mut dispatcher: Dispatcher<u32> = Dispatcher::new();
        dispatcher.on(MessageKind::Ping, |count, _| {
            *count += 1;
            Ok(())
        });

        let mut count = 0;
        let result =
            dispatcher.dispatch(&mut count, &envelope(Payload::Ping { nonce: 7 }));
        assert_eq!(result, Disposition::Handled);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_dispatch_without_handler_is_unhandled() {
        let mut dispatcher: Dispatcher<u32> = Dispatcher::new();
        let mut state = 0;
        let result = dispatcher
            .dispatch(&mut state, &envelope(Payload::Notice { text: "x".into() }));
        assert_eq!(result, Disposition::Unhandled);
        assert_eq!(state, 0);
    }

    #[test]
    fn test_handler_error_becomes_rejection() {
        let mut dispatcher: Dispatcher<u32> = Dispatcher::new();
        dispatcher.on(MessageKind::Ping, |_, _| Err("not now".to_string()));

        let mut state = 0;
        let result =
            dispatcher.dispatch(&mut state, &envelope(Payload::Ping { nonce: 1 }));
        assert_eq!(result, Disposition::Rejected("not now".into()));
    }
}
