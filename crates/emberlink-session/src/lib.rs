//! Session coordination for Emberlink.
//!
//! The host side is an actor: [`spawn_coordinator`] starts a Tokio task
//! that owns the authoritative [`Session`], its participants, and any
//! running combat encounter, and exposes a cloneable
//! [`CoordinatorHandle`]. Peers hold a [`SessionMirror`] instead — a
//! read-only replica replaced wholesale by the host's periodic
//! snapshots.
//!
//! Local observers (the UI layer, bots, tests) register a
//! [`SessionListener`]; remote observers get the same information as
//! wire messages.

mod config;
mod coordinator;
mod error;
mod listener;
mod mirror;
mod participant;
mod session;

pub use config::{Capabilities, SessionConfig};
pub use coordinator::{CoordinatorHandle, OutboundSender, spawn_coordinator};
pub use error::SessionError;
pub use listener::{ListenerSet, SessionListener};
pub use mirror::SessionMirror;
pub use participant::Participant;
pub use session::{Removal, Session};
