//! Emberlink — peer-to-peer session networking for small turn-based
//! combat games.
//!
//! One participant hosts: it binds a WebSocket endpoint, owns the
//! authoritative session and combat state, and broadcasts every change.
//! The other participants are peers: each holds a single connection to
//! the host and a read-only mirror of its state. There is no central
//! server and no relay — the host is just a participant with extra
//! duties, and if it leaves, one of the peers is promoted to take over.
//!
//! # Hosting a session
//!
//! ```no_run
//! use emberlink::{HostServer, SessionConfig};
//! # use emberlink_combat::{ActionOutcome, ChosenAction, RuleEngine};
//! # use emberlink_protocol::CharacterSnapshot;
//! # struct MyRules;
//! # impl RuleEngine for MyRules {
//! #     fn resolve(&mut self, _: &CharacterSnapshot, _: &CharacterSnapshot,
//! #         _: &ChosenAction) -> ActionOutcome { unimplemented!() }
//! #     fn auto_action(&mut self, _: &CharacterSnapshot,
//! #         _: &[CharacterSnapshot], _: &[CharacterSnapshot]) -> ChosenAction {
//! #         unimplemented!() }
//! # }
//!
//! # async fn run() -> Result<(), emberlink::EmberlinkError> {
//! let server = HostServer::builder()
//!     .bind("127.0.0.1:7870")
//!     .host_name("rook")
//!     .session_config(SessionConfig::default())
//!     .build(Box::new(MyRules))
//!     .await?;
//!
//! let handle = server.handle();
//! tokio::spawn(server.run());
//! // ... wait for peers, then:
//! handle.start().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Joining as a peer
//!
//! ```no_run
//! use emberlink::{PeerClient, PeerExit};
//!
//! # async fn run() -> Result<(), emberlink::EmberlinkError> {
//! let peer = PeerClient::connect("127.0.0.1:7870", "mira", None).await?;
//! match peer.run().await? {
//!     PeerExit::Closed => println!("session over"),
//!     PeerExit::Promoted => println!("we are the host now, re-bind"),
//!     PeerExit::HostMoved { addr, .. } => {
//!         println!("reconnect at {addr:?}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Crates
//!
//! - `emberlink-transport` — WebSocket listener/connection plumbing
//! - `emberlink-protocol` — typed envelope, payload taxonomy, codec
//! - `emberlink-session` — coordinator actor and peer session mirror
//! - `emberlink-combat` — ATB combat instance and peer combat mirror

mod dispatch;
mod error;
mod host;
mod peer;

pub use dispatch::{Dispatcher, Disposition, Handler};
pub use error::EmberlinkError;
pub use host::{HostServer, HostServerBuilder};
pub use peer::{PeerClient, PeerConfig, PeerEvent, PeerExit};

// The pieces applications touch, re-exported so most users depend on
// this crate alone.
pub use emberlink_combat::{
    ActionOutcome, ChosenAction, CombatConfig, CombatEvent, CombatMirror,
    RuleEngine,
};
pub use emberlink_protocol::{
    ActionKind, ActorId, CharacterSnapshot, CombatId, CombatPhase,
    CombatSnapshot, Controller, Envelope, GaugeEntry, MessageKind,
    ParticipantId, Payload, Role, SessionId, SessionPhase, SessionSnapshot,
};
pub use emberlink_session::{
    Capabilities, CoordinatorHandle, SessionConfig, SessionListener,
    SessionMirror,
};
pub use emberlink_transport::{ConnectionId, TransportError};
