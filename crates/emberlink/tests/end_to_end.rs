//! Full-stack tests over real sockets: a bound host, connected peers,
//! and the wire protocol in between. Durations are kept small; every
//! wait is bounded so a regression fails instead of hanging.

use std::time::Duration;

use emberlink::{
    ActionKind, ActionOutcome, ActorId, CharacterSnapshot, ChosenAction,
    CombatConfig, Controller, CoordinatorHandle, Envelope, HostServer,
    ParticipantId, Payload, PeerClient, PeerConfig, PeerEvent, PeerExit, Role,
    RuleEngine, SessionConfig, SessionId,
};
use emberlink_protocol::{Codec, JsonCodec, PROTOCOL_VERSION};
use emberlink_transport::{Connection, HostListener, Listener, connect_to_host};

/// Upper bound on any single wait in these tests.
const DEADLINE: Duration = Duration::from_secs(5);

/// Attacks always land for 42; everything else does nothing.
struct FixedEngine;

impl RuleEngine for FixedEngine {
    fn resolve(
        &mut self,
        _actor: &CharacterSnapshot,
        _target: &CharacterSnapshot,
        action: &ChosenAction,
    ) -> ActionOutcome {
        let damage = match action.kind {
            ActionKind::Attack | ActionKind::Skill => 42,
            _ => 0,
        };
        ActionOutcome {
            damage,
            effects: Vec::new(),
            actor_gauge: 0,
        }
    }

    fn auto_action(
        &mut self,
        actor: &CharacterSnapshot,
        _allies: &[CharacterSnapshot],
        foes: &[CharacterSnapshot],
    ) -> ChosenAction {
        match foes.iter().find(|c| c.is_alive()) {
            Some(target) => ChosenAction {
                kind: ActionKind::Attack,
                target: target.id,
                skill_name: None,
            },
            None => ChosenAction::default_for(actor.id),
        }
    }
}

/// Binds a host on an ephemeral port and runs its accept loop.
async fn start_host() -> (CoordinatorHandle, String) {
    let server = HostServer::builder()
        .bind("127.0.0.1:0")
        .host_name("hesta")
        .session_config(SessionConfig::default())
        .build(Box::new(FixedEngine))
        .await
        .expect("bind on an ephemeral port must succeed");
    let addr = server
        .local_addr()
        .expect("bound listener has an address")
        .to_string();
    let handle = server.handle();
    tokio::spawn(server.run());
    (handle, addr)
}

async fn connect(addr: &str, name: &str) -> PeerClient {
    tokio::time::timeout(DEADLINE, PeerClient::connect(addr, name, None))
        .await
        .expect("connect within the deadline")
        .expect("handshake must succeed")
}

/// Pumps the peer until a message matching `pred` arrives.
async fn wait_for(
    peer: &mut PeerClient,
    pred: impl Fn(&Envelope) -> bool,
) -> Envelope {
    let fut = async {
        loop {
            match peer.next_event().await.expect("event pump stays healthy") {
                PeerEvent::Message(env) if pred(&env) => {
                    return env;
                }
                PeerEvent::Message(_) => {}
                other => panic!("pump ended early: {other:?}"),
            }
        }
    };
    tokio::time::timeout(DEADLINE, fut)
        .await
        .expect("expected message within the deadline")
}

/// One enemy that never gets a turn (speed 0 keeps its gauge at zero).
fn idle_enemy() -> CharacterSnapshot {
    let mut enemy =
        CharacterSnapshot::with_defaults(ActorId(100), "wisp", Controller::Npc);
    enemy.speed = 0;
    enemy
}

/// Fills every gauge in a single 100 ms clock tick.
fn fast_combat() -> CombatConfig {
    CombatConfig {
        gauge_rate: 1_000.0,
        ..CombatConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_handshake_assigns_identity_and_syncs_state() {
    let (handle, addr) = start_host().await;

    let mut peer = connect(&addr, "mira").await;
    assert_eq!(peer.id(), ParticipantId(2), "host is p-1, first peer p-2");
    assert_eq!(peer.session_id(), handle.session_id());

    // The first message after the ack is the full state sync.
    wait_for(&mut peer, |env| {
        matches!(env.payload, Payload::GameStateSync { .. })
    })
    .await;
    let state = peer.session().state().expect("mirror populated");
    assert_eq!(state.participants.len(), 2);
    assert!(state.participants.iter().any(|p| p.display_name == "mira"));
}

#[tokio::test]
async fn test_handshake_version_mismatch_rejected() {
    let (_handle, addr) = start_host().await;

    let conn = connect_to_host(&addr).await.expect("tcp connect");
    let codec = JsonCodec;
    let hello = Envelope {
        sender: ParticipantId::UNASSIGNED,
        session: SessionId(0),
        seq: 0,
        timestamp: 0,
        payload: Payload::Handshake {
            version: PROTOCOL_VERSION + 1,
            role: Role::Peer,
            character_name: "mira".into(),
            listen_addr: None,
        },
    };
    conn.send(&codec.encode(&hello).expect("encode"))
        .await
        .expect("send");

    let data = tokio::time::timeout(DEADLINE, conn.recv())
        .await
        .expect("reply within the deadline")
        .expect("recv")
        .expect("a reply, not a close");
    let reply = codec.decode_envelope(&data).expect("decode");
    match reply.payload {
        Payload::Rejected { reason } => {
            assert!(reason.contains("version"), "got: {reason}");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handshake_second_host_rejected() {
    let (_handle, addr) = start_host().await;

    let conn = connect_to_host(&addr).await.expect("tcp connect");
    let codec = JsonCodec;
    let hello = Envelope {
        sender: ParticipantId::UNASSIGNED,
        session: SessionId(0),
        seq: 0,
        timestamp: 0,
        payload: Payload::Handshake {
            version: PROTOCOL_VERSION,
            role: Role::Host,
            character_name: "usurper".into(),
            listen_addr: None,
        },
    };
    conn.send(&codec.encode(&hello).expect("encode"))
        .await
        .expect("send");

    let data = tokio::time::timeout(DEADLINE, conn.recv())
        .await
        .expect("reply within the deadline")
        .expect("recv")
        .expect("a reply, not a close");
    let reply = codec.decode_envelope(&data).expect("decode");
    assert!(
        matches!(reply.payload, Payload::Rejected { .. }),
        "a second host must be refused"
    );
}

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_chat_relayed_to_other_peers() {
    let (_handle, addr) = start_host().await;
    let mut alder = connect(&addr, "alder").await;
    let mut brook = connect(&addr, "brook").await;

    alder.chat("ready when you are").await.expect("send chat");

    let env = wait_for(&mut brook, |env| {
        matches!(env.payload, Payload::Chat { .. })
    })
    .await;
    assert_eq!(env.sender, alder.id(), "relay keeps the original sender");
    match env.payload {
        Payload::Chat { text } => assert_eq!(text, "ready when you are"),
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_peer_leave_announced_to_others() {
    let (_handle, addr) = start_host().await;
    let alder = connect(&addr, "alder").await;
    let mut brook = connect(&addr, "brook").await;
    let alder_id = alder.id();

    alder.leave().await.expect("leave");

    let env = wait_for(&mut brook, |env| {
        matches!(env.payload, Payload::PeerLeave { .. })
    })
    .await;
    match env.payload {
        Payload::PeerLeave {
            participant,
            promoted_host,
        } => {
            assert_eq!(participant, alder_id);
            assert_eq!(promoted_host, None, "a peer leaving promotes nobody");
        }
        _ => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_peer_marks_silent_host_gone() {
    // A host that acks the handshake and then never says another word,
    // keeping the socket open the whole time.
    let mut listener =
        HostListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener
        .local_addr()
        .expect("bound listener has an address")
        .to_string();
    tokio::spawn(async move {
        let conn = listener.accept().await.expect("accept");
        let codec = JsonCodec;
        let _hello = conn.recv().await.expect("recv").expect("handshake");
        let ack = Envelope {
            sender: ParticipantId(1),
            session: SessionId(7),
            seq: 0,
            timestamp: 0,
            payload: Payload::HandshakeAck {
                participant: ParticipantId(2),
                session: SessionId(7),
                server_time: 0,
            },
        };
        conn.send(&codec.encode(&ack).expect("encode"))
            .await
            .expect("send ack");
        // Swallow the peer's pings without ever answering.
        while let Ok(Some(_)) = conn.recv().await {}
    });

    let config = PeerConfig {
        ping_interval: Duration::from_millis(100),
        ..PeerConfig::default()
    };
    let mut peer =
        tokio::time::timeout(DEADLINE, PeerClient::connect_with(&addr, "mira", config))
            .await
            .expect("connect within the deadline")
            .expect("handshake must succeed");

    // Two silent ping intervals are the cutoff.
    let event = tokio::time::timeout(DEADLINE, peer.next_event())
        .await
        .expect("liveness must trip well before the deadline")
        .expect("pump stays healthy");
    assert!(matches!(event, PeerEvent::Closed), "got {event:?}");
}

// ---------------------------------------------------------------------------
// Combat over the wire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_combat_round_over_the_wire() {
    let (handle, addr) = start_host().await;
    let mut peer = connect(&addr, "mira").await;

    handle.start().await.expect("two participants suffice");
    handle
        .start_combat(vec![idle_enemy()], fast_combat())
        .await
        .expect("combat starts");

    wait_for(&mut peer, |env| {
        matches!(env.payload, Payload::CombatStart { .. })
    })
    .await;
    assert!(peer.combat().in_combat());

    // Party fills in gauge order: the host's actor acts on its own,
    // then the peer's actor is awaited.
    let first = wait_for(&mut peer, |env| {
        matches!(env.payload, Payload::DamageDealt { .. })
    })
    .await;
    match first.payload {
        Payload::DamageDealt {
            target, damage, ..
        } => {
            assert_eq!(target, ActorId(100));
            assert_eq!(damage, 42);
        }
        _ => unreachable!(),
    }

    let state = wait_for(&mut peer, |env| {
        matches!(
            &env.payload,
            Payload::CombatState { snapshot } if snapshot.awaiting.is_some()
        )
    })
    .await;
    let our_actor = match &state.payload {
        Payload::CombatState { snapshot } => {
            let awaited = snapshot.awaiting.expect("awaiting actor");
            let entry = snapshot
                .party
                .iter()
                .find(|c| c.id == awaited)
                .expect("awaited actor is in the party");
            assert_eq!(
                entry.controller,
                Controller::Participant(peer.id()),
                "the awaited actor belongs to this peer"
            );
            awaited
        }
        _ => unreachable!(),
    };

    peer.submit_action(ActionKind::Attack, ActorId(100), None)
        .await
        .expect("submit");

    let resolved = wait_for(&mut peer, |env| {
        matches!(
            env.payload,
            Payload::DamageDealt { actor, .. } if actor == our_actor
        )
    })
    .await;
    match resolved.payload {
        Payload::DamageDealt {
            damage, target_hp, ..
        } => {
            assert_eq!(damage, 42);
            assert_eq!(target_hp, 100 - 42 - 42, "two attacks landed so far");
        }
        _ => unreachable!(),
    }

    // The mirror tracked the incremental updates.
    let mirrored = peer.combat().state().expect("combat mirrored");
    assert_eq!(mirrored.enemies[0].hp, 16);
    assert!(!peer.combat().log().is_empty(), "resolved actions were logged");
}

// ---------------------------------------------------------------------------
// Host handoff
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_host_shutdown_promotes_the_peer() {
    let (handle, addr) = start_host().await;
    let peer = connect(&addr, "mira").await;
    let peer_id = peer.id();
    let pump = tokio::spawn(peer.run());

    let promoted = handle.shutdown().await.expect("shutdown");
    assert_eq!(promoted, Some(peer_id));

    let exit = tokio::time::timeout(DEADLINE, pump)
        .await
        .expect("pump ends within the deadline")
        .expect("pump task completes")
        .expect("pump ends cleanly");
    assert_eq!(exit, PeerExit::Promoted);
}

#[tokio::test]
async fn test_handoff_hands_survivors_the_new_host_address() {
    let (handle, addr) = start_host().await;

    // First peer in advertises where it would re-bind; it gets promoted.
    let alder = tokio::time::timeout(
        DEADLINE,
        PeerClient::connect_with(
            &addr,
            "alder",
            PeerConfig {
                listen_addr: Some("127.0.0.1:9551".into()),
                ..PeerConfig::default()
            },
        ),
    )
    .await
    .expect("connect within the deadline")
    .expect("handshake must succeed");
    let alder_id = alder.id();
    let brook = connect(&addr, "brook").await;

    let alder_pump = tokio::spawn(alder.run());
    let brook_pump = tokio::spawn(brook.run());

    let promoted = handle.shutdown().await.expect("shutdown");
    assert_eq!(promoted, Some(alder_id));

    // The survivor learns who took over and where to reconnect.
    let exit = tokio::time::timeout(DEADLINE, brook_pump)
        .await
        .expect("pump ends within the deadline")
        .expect("pump task completes")
        .expect("pump ends cleanly");
    assert_eq!(
        exit,
        PeerExit::HostMoved {
            participant: alder_id,
            addr: Some("127.0.0.1:9551".into()),
        }
    );
    // The promoted peer itself gets the promotion exit.
    let exit = tokio::time::timeout(DEADLINE, alder_pump)
        .await
        .expect("pump ends within the deadline")
        .expect("pump task completes")
        .expect("pump ends cleanly");
    assert_eq!(exit, PeerExit::Promoted);
}
