//! Combat synchronizer state machines for Emberlink.
//!
//! This crate is deliberately free of networking: the host-side
//! [`CombatInstance`] and peer-side [`CombatMirror`] are plain state
//! machines that consume inputs (clock ticks, submitted actions,
//! snapshots) and emit [`CombatEvent`]s. The session coordinator owns
//! the instance, drives it from its event loop, and turns the events
//! into wire messages — which keeps everything here testable without a
//! socket in sight.
//!
//! # Key types
//!
//! - [`CombatInstance`] — authoritative encounter state, host only
//! - [`CombatMirror`] — read-only peer copy, replaced wholesale
//! - [`RuleEngine`] — external damage/AI collaborator (never inspected)
//! - [`GaugeClock`] — fixed-timestep driver for readiness gauges
//! - [`EventLog`] — bounded in-memory record of what happened

mod clock;
mod engine;
mod error;
mod instance;
mod log;
mod mirror;

pub use clock::{GaugeClock, GaugeClockConfig, TickInfo};
pub use engine::{ActionOutcome, ChosenAction, RuleEngine};
pub use error::CombatError;
pub use instance::{CombatConfig, CombatEvent, CombatInstance, PendingAction};
pub use log::EventLog;
pub use mirror::CombatMirror;
