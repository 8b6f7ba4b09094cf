//! End-to-end coordinator tests, driven over channels with the runtime
//! clock paused. No sockets: peers are represented by their outbound
//! channels, exactly what the connection layer hands the coordinator.

use std::time::Duration;

use emberlink_combat::{
    ActionOutcome, ChosenAction, CombatConfig, RuleEngine,
};
use emberlink_protocol::{
    ActionKind, ActorId, CharacterSnapshot, Controller, Envelope,
    ParticipantId, Payload, Role, SessionPhase,
};
use emberlink_session::{
    Capabilities, CoordinatorHandle, SessionConfig, spawn_coordinator,
};
use emberlink_transport::ConnectionId;
use tokio::sync::mpsc;

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

fn config() -> SessionConfig {
    SessionConfig {
        turn_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    }
}

fn spawn(config: SessionConfig) -> CoordinatorHandle {
    spawn_coordinator(config, "hesta", 1, Box::new(FixedEngine))
}

/// Registers a peer and returns its id with the receiving end of its
/// outbound channel.
async fn join_peer(
    handle: &CoordinatorHandle,
    name: &str,
) -> (ParticipantId, mpsc::UnboundedReceiver<Envelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (id, _snapshot) = handle
        .add_participant(Role::Peer, name, 0, None, None, Some(tx))
        .await
        .expect("peer join must succeed in the lobby");
    (id, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Envelope>) -> Vec<Envelope> {
    let mut out = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        out.push(envelope);
    }
    out
}

fn envelope_from(
    handle: &CoordinatorHandle,
    sender: ParticipantId,
    payload: Payload,
) -> Envelope {
    Envelope {
        sender,
        session: handle.session_id(),
        seq: 1,
        timestamp: 0,
        payload,
    }
}

/// One enemy that never gets a turn (speed 0 keeps its gauge at zero),
/// so resolved actions are exactly the party's.
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

#[tokio::test(start_paused = true)]
async fn test_join_broadcasts_peer_join_and_updates_turn_order() {
    let handle = spawn(config());
    let (a, mut a_rx) = join_peer(&handle, "alder").await;
    let (b, _b_rx) = join_peer(&handle, "brook").await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Lobby);
    assert_eq!(snapshot.turn_order, vec![handle.host_id(), a, b]);

    // The earlier peer observed the later join.
    let seen = drain(&mut a_rx);
    assert!(seen.iter().any(|e| matches!(
        &e.payload,
        Payload::PeerJoin { participant, display_name }
            if *participant == b && display_name == "brook"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_start_with_too_few_participants_is_refused() {
    let handle = spawn(config());
    let err = handle.start().await.unwrap_err();
    assert!(matches!(
        err,
        emberlink_session::SessionError::InsufficientParticipants { have: 1, need: 2 }
    ));
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Lobby);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_transitions_and_rejections() {
    let handle = spawn(config());
    join_peer(&handle, "alder").await;

    // Resume from the lobby is not an edge.
    assert!(handle.resume().await.is_err());

    handle.start().await.unwrap();
    handle.pause().await.unwrap();
    assert_eq!(
        handle.snapshot().await.unwrap().phase,
        SessionPhase::Paused
    );
    handle.resume().await.unwrap();
    assert_eq!(
        handle.snapshot().await.unwrap().phase,
        SessionPhase::Playing
    );
}

#[tokio::test(start_paused = true)]
async fn test_remove_peer_shrinks_turn_order_and_broadcasts_leave() {
    let handle = spawn(config());
    let (a, mut a_rx) = join_peer(&handle, "alder").await;
    let (b, _b_rx) = join_peer(&handle, "brook").await;
    drain(&mut a_rx);

    handle.remove_participant(b).await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.turn_order, vec![handle.host_id(), a]);

    let seen = drain(&mut a_rx);
    assert!(seen.iter().any(|e| matches!(
        &e.payload,
        Payload::PeerLeave { participant, promoted_host: None }
            if *participant == b
    )));
}

#[tokio::test(start_paused = true)]
async fn test_session_ends_when_all_but_one_disconnect() {
    let handle = spawn(config());
    let (a, _a_rx) = join_peer(&handle, "alder").await;
    handle.start().await.unwrap();

    handle.remove_participant(a).await.unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.phase, SessionPhase::Ended);
}

#[tokio::test(start_paused = true)]
async fn test_turn_timeout_synthesizes_default_exactly_once() {
    let handle = spawn(config());
    let (a, mut a_rx) = join_peer(&handle, "alder").await;
    handle.start().await.unwrap();
    handle
        .start_combat(vec![idle_enemy()], fast_combat())
        .await
        .unwrap();

    // First tick: host auto-attacks, then alder's actor is awaited.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let before = handle.snapshot().await.unwrap().sequence;
    drain(&mut a_rx);

    // Never answer; the deadline fires at 5 s.
    tokio::time::sleep(Duration::from_millis(5_200)).await;

    let seen = drain(&mut a_rx);
    let defends: Vec<_> = seen
        .iter()
        .filter(|e| matches!(
            &e.payload,
            Payload::DamageDealt { action_type: ActionKind::Defend, .. }
        ))
        .collect();
    assert_eq!(defends.len(), 1, "exactly one synthesized default");
    assert!(seen.iter().any(|e| matches!(
        &e.payload,
        Payload::Notice { text } if text.contains("took too long")
    )));

    // The turn advanced past the silent owner.
    let after = handle.snapshot().await.unwrap().sequence;
    assert!(after > before);

    // Message sequence numbers never decrease for an observer.
    let seqs: Vec<u64> = seen.iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test(start_paused = true)]
async fn test_combat_action_without_active_combat_is_rejected() {
    let handle = spawn(config());
    let (a, mut a_rx) = join_peer(&handle, "alder").await;
    handle.start().await.unwrap();
    drain(&mut a_rx);

    handle
        .inbound(envelope_from(
            &handle,
            a,
            Payload::CombatAction {
                action_type: ActionKind::Attack,
                target_id: ActorId(100),
                skill_name: None,
            },
        ))
        .await
        .unwrap();
    // Commands are processed in order; the snapshot reply is the fence.
    handle.snapshot().await.unwrap();

    let seen = drain(&mut a_rx);
    assert!(seen.iter().any(|e| matches!(
        &e.payload,
        Payload::Rejected { reason } if reason.contains("no active combat")
    )));
}

#[tokio::test(start_paused = true)]
async fn test_non_owner_combat_action_is_rejected_without_broadcast() {
    let handle = spawn(config());
    let (_a, mut a_rx) = join_peer(&handle, "alder").await;
    let (b, mut b_rx) = join_peer(&handle, "brook").await;
    handle.start().await.unwrap();
    handle
        .start_combat(vec![idle_enemy()], fast_combat())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    drain(&mut a_rx);
    drain(&mut b_rx);

    // Alder's actor is awaited; brook butts in.
    handle
        .inbound(envelope_from(
            &handle,
            b,
            Payload::CombatAction {
                action_type: ActionKind::Attack,
                target_id: ActorId(100),
                skill_name: None,
            },
        ))
        .await
        .unwrap();
    // Commands are processed in order; the snapshot reply is the fence.
    handle.snapshot().await.unwrap();

    let to_b = drain(&mut b_rx);
    assert!(to_b.iter().any(|e| matches!(
        &e.payload,
        Payload::Rejected { .. }
    )));
    // Nothing resolved, nothing broadcast to the others.
    let to_a = drain(&mut a_rx);
    assert!(!to_a.iter().any(|e| matches!(
        &e.payload,
        Payload::DamageDealt { .. } | Payload::Rejected { .. }
    )));
}

/// The three-participant round from the design notes: the host
/// auto-resolves, alder attacks for 42, brook disconnects mid-wait and
/// gets a synthesized defend. Exactly three resolved actions.
#[tokio::test(start_paused = true)]
async fn test_full_round_with_disconnect_resolves_three_actions() {
    let handle = spawn(config());
    let (a, mut a_rx) = join_peer(&handle, "alder").await;
    let (b, _b_rx) = join_peer(&handle, "brook").await;
    handle.start().await.unwrap();
    // Four ticks to a full gauge, so nobody refills before the round
    // is over.
    handle
        .start_combat(
            vec![idle_enemy()],
            CombatConfig {
                gauge_rate: 250.0,
                ..CombatConfig::default()
            },
        )
        .await
        .unwrap();

    // Tick 4: everyone is ready; the host resolves, alder is awaited.
    tokio::time::sleep(Duration::from_millis(450)).await;

    handle
        .inbound(envelope_from(
            &handle,
            a,
            Payload::CombatAction {
                action_type: ActionKind::Attack,
                target_id: ActorId(100),
                skill_name: None,
            },
        ))
        .await
        .unwrap();

    // Next tick: brook (still full from tick 4) is awaited; then brook
    // drops mid-wait.
    tokio::time::sleep(Duration::from_millis(150)).await;
    handle.remove_participant(b).await.unwrap();

    let seen = drain(&mut a_rx);
    let resolved: Vec<&Payload> = seen
        .iter()
        .map(|e| &e.payload)
        .filter(|p| matches!(p, Payload::DamageDealt { .. }))
        .collect();
    assert_eq!(resolved.len(), 3, "host + alder + synthesized brook");

    assert!(resolved.iter().any(|p| matches!(
        p,
        Payload::DamageDealt {
            action_type: ActionKind::Attack,
            damage: 42,
            target: ActorId(100),
            ..
        }
    )));
    // Brook's default is indistinguishable from a chosen defend.
    assert!(resolved.iter().any(|p| matches!(
        p,
        Payload::DamageDealt { action_type: ActionKind::Defend, .. }
    )));
    assert!(seen.iter().any(|e| matches!(
        &e.payload,
        Payload::PeerLeave { participant, .. } if *participant == b
    )));
}

#[tokio::test(start_paused = true)]
async fn test_silent_peer_is_dropped_by_liveness_check() {
    let handle = spawn(SessionConfig {
        ping_interval: Duration::from_secs(1),
        ..config()
    });
    // The liveness sweep only considers members with a connection, so
    // register this peer the way the connection layer would: with a
    // ConnectionId attached.
    let (tx, _rx) = mpsc::unbounded_channel();
    handle
        .add_participant(
            Role::Peer,
            "alder",
            0,
            None,
            Some(ConnectionId::new(1)),
            Some(tx),
        )
        .await
        .expect("peer join must succeed in the lobby");
    assert_eq!(handle.snapshot().await.unwrap().participants.len(), 2);

    // Never answer a ping; the cutoff is two intervals.
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.participants.len(), 1);
    assert_eq!(snapshot.turn_order, vec![handle.host_id()]);
}

#[tokio::test(start_paused = true)]
async fn test_chat_relay_respects_capability() {
    let handle = spawn(SessionConfig {
        capabilities: Capabilities { chat: false },
        ..config()
    });
    let (a, mut a_rx) = join_peer(&handle, "alder").await;

    handle
        .inbound(envelope_from(
            &handle,
            a,
            Payload::Chat { text: "hello?".into() },
        ))
        .await
        .unwrap();
    // Commands are processed in order; the snapshot reply is the fence.
    handle.snapshot().await.unwrap();

    let seen = drain(&mut a_rx);
    assert!(seen.iter().any(|e| matches!(
        &e.payload,
        Payload::Rejected { reason } if reason.contains("chat")
    )));
}

#[tokio::test(start_paused = true)]
async fn test_chat_relays_to_other_participants_under_sender_id() {
    let handle = spawn(config());
    let (a, mut a_rx) = join_peer(&handle, "alder").await;
    let (_b, mut b_rx) = join_peer(&handle, "brook").await;
    drain(&mut a_rx);
    drain(&mut b_rx);

    handle
        .inbound(envelope_from(
            &handle,
            a,
            Payload::Chat { text: "onward".into() },
        ))
        .await
        .unwrap();
    // Commands are processed in order; the snapshot reply is the fence.
    handle.snapshot().await.unwrap();

    let to_b = drain(&mut b_rx);
    assert!(to_b.iter().any(|e| e.sender == a
        && matches!(&e.payload, Payload::Chat { text } if text == "onward")));
    // Not echoed back to the sender.
    assert!(drain(&mut a_rx).iter().all(|e| !matches!(
        &e.payload,
        Payload::Chat { .. }
    )));
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_carries_advertised_listen_addr() {
    let handle = spawn(config());
    let (tx, _rx) = mpsc::unbounded_channel();
    let (a, _snapshot) = handle
        .add_participant(
            Role::Peer,
            "alder",
            0,
            Some("127.0.0.1:9551".into()),
            None,
            Some(tx),
        )
        .await
        .unwrap();

    let snapshot = handle.snapshot().await.unwrap();
    let entry = snapshot
        .participants
        .iter()
        .find(|e| e.id == a)
        .expect("alder is a member");
    assert_eq!(entry.listen_addr.as_deref(), Some("127.0.0.1:9551"));
    // The host never advertised one.
    let host = snapshot
        .participants
        .iter()
        .find(|e| e.id == handle.host_id())
        .unwrap();
    assert_eq!(host.listen_addr, None);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_promotes_exactly_one_new_host() {
    let handle = spawn(config());
    let (a, mut a_rx) = join_peer(&handle, "alder").await;
    let (_b, mut b_rx) = join_peer(&handle, "brook").await;
    drain(&mut a_rx);
    drain(&mut b_rx);

    let promoted = handle.shutdown().await.unwrap();
    assert_eq!(promoted, Some(a), "first remaining turn-taker is promoted");

    let to_b = drain(&mut b_rx);
    assert!(to_b.iter().any(|e| matches!(
        &e.payload,
        Payload::PeerLeave { participant, promoted_host: Some(p) }
            if *participant == handle.host_id() && *p == a
    )));
}
