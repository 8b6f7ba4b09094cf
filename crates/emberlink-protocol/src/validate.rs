//! Semantic validation, run after decode and before any state change.
//!
//! Decoding guarantees shape; validation guarantees domain. A message
//! that fails here is never applied — the coordinator answers with a
//! `rejected` reply instead.

use crate::{ActionKind, Envelope, Payload, ProtocolError, GAUGE_MAX};

/// Longest accepted chat line / display name, in bytes.
const MAX_TEXT_LEN: usize = 512;

/// Checks the per-kind domain rules for an already-decoded envelope.
///
/// # Errors
/// Returns [`ProtocolError::Validation`] naming the first violated rule.
pub fn validate(envelope: &Envelope) -> Result<(), ProtocolError> {
    match &envelope.payload {
        Payload::Handshake {
            character_name, ..
        } => {
            if character_name.is_empty() {
                return fail("handshake requires a character_name");
            }
            if character_name.len() > MAX_TEXT_LEN {
                return fail("character_name too long");
            }
        }

        Payload::CombatAction {
            action_type,
            skill_name,
            ..
        } => {
            // target_id presence is enforced by the decode; the
            // conditional skill_name rule is not expressible in serde.
            match (action_type, skill_name) {
                (ActionKind::Skill, None) => {
                    return fail("skill action requires skill_name");
                }
                (ActionKind::Skill, Some(name)) if name.is_empty() => {
                    return fail("skill_name must not be empty");
                }
                (kind, Some(_)) if *kind != ActionKind::Skill => {
                    return fail("skill_name only valid on skill actions");
                }
                _ => {}
            }
        }

        Payload::Chat { text } => {
            if text.is_empty() {
                return fail("chat text must not be empty");
            }
            if text.len() > MAX_TEXT_LEN {
                return fail("chat text too long");
            }
        }

        Payload::AtbUpdate { gauges } => {
            if gauges.iter().any(|g| g.gauge > GAUGE_MAX) {
                return fail("gauge value above scale maximum");
            }
        }

        Payload::TurnOrder { order, .. } => {
            let mut seen = order.clone();
            seen.sort_unstable();
            seen.dedup();
            if seen.len() != order.len() {
                return fail("turn order contains duplicates");
            }
        }

        // Remaining kinds carry no domain rules beyond their shape.
        _ => {}
    }

    Ok(())
}

fn fail(reason: &str) -> Result<(), ProtocolError> {
    Err(ProtocolError::Validation(reason.to_string()))
}
