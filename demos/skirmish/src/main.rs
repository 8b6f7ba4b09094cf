//! Skirmish: a minimal two-player encounter over Emberlink.
//!
//! One terminal hosts, the others join:
//!
//! ```text
//! skirmish host 127.0.0.1:7870
//! skirmish join 127.0.0.1:7870 mira
//! ```
//!
//! The host starts the session once a second participant arrives, throws
//! a pair of wisps at the party, and the demo plays a full encounter:
//! the host's character and the enemies act through the rule engine
//! below, and each joined peer attacks whenever its character is up.

use std::time::Duration;

use emberlink::{
    ActionKind, ActionOutcome, ActorId, CharacterSnapshot, ChosenAction,
    CombatConfig, CombatEvent, Controller, HostServer, PeerClient, PeerEvent,
    RuleEngine, SessionConfig, SessionListener,
};
use rand::Rng;

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Plain stat-based rules: attacks scale on attack vs. defense with a
/// little variance, the `ember` skill hits harder, items heal.
struct EmberRules;

impl EmberRules {
    fn variance(base: i32) -> i32 {
        if base <= 1 {
            return base.max(1);
        }
        let spread = (base / 5).max(1);
        base + rand::rng().random_range(-spread..=spread)
    }
}

impl RuleEngine for EmberRules {
    fn resolve(
        &mut self,
        actor: &CharacterSnapshot,
        target: &CharacterSnapshot,
        action: &ChosenAction,
    ) -> ActionOutcome {
        let damage = match action.kind {
            ActionKind::Attack => {
                Self::variance((actor.attack * 2 - target.defense).max(1))
            }
            ActionKind::Skill => {
                Self::variance((actor.attack * 3 - target.defense).max(1))
            }
            ActionKind::Item => -15, // healing draught
            ActionKind::Defend | ActionKind::Escape => 0,
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

fn wisp(id: u64, name: &str) -> CharacterSnapshot {
    let mut enemy = CharacterSnapshot::with_defaults(
        ActorId(id),
        name,
        Controller::Npc,
    );
    enemy.hp = 60;
    enemy.max_hp = 60;
    enemy.attack = 6;
    enemy.speed = 7;
    enemy
}

// ---------------------------------------------------------------------------
// Console output
// ---------------------------------------------------------------------------

/// Prints what happens, and reports the encounter's end on a channel so
/// the host's main task knows when to stop.
struct Console {
    done: tokio::sync::mpsc::UnboundedSender<bool>,
}

impl SessionListener for Console {
    fn notice(&mut self, text: &str) {
        println!("* {text}");
    }

    fn combat_event(&mut self, event: &CombatEvent) {
        match event {
            CombatEvent::Started => println!("* combat begins"),
            CombatEvent::Ended { victory, log_tail } => {
                for line in log_tail {
                    println!("  {line}");
                }
                println!(
                    "* {}",
                    if *victory { "victory!" } else { "the party falls" }
                );
                let _ = self.done.send(*victory);
            }
            _ => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Host and peer mains
// ---------------------------------------------------------------------------

async fn run_host(addr: &str) -> Result<(), emberlink::EmberlinkError> {
    let server = HostServer::builder()
        .bind(addr)
        .host_name("rook")
        .session_config(SessionConfig::default())
        .build(Box::new(EmberRules))
        .await?;
    println!("* hosting on {}", server.local_addr()?);

    let handle = server.handle();
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    handle
        .register_listener(Box::new(Console { done: done_tx }))
        .await?;
    tokio::spawn(server.run());

    // Wait in the lobby until someone else shows up.
    loop {
        let snapshot = handle.snapshot().await?;
        if snapshot.participants.len() >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    handle.start().await?;
    handle
        .start_combat(
            vec![wisp(100, "wisp"), wisp(101, "ember wisp")],
            CombatConfig::default(),
        )
        .await?;

    let victory = done_rx.recv().await.unwrap_or(false);
    tracing::info!(victory, "encounter finished, shutting down");
    handle.shutdown().await?;
    Ok(())
}

async fn run_peer(addr: &str, name: &str) -> Result<(), emberlink::EmberlinkError> {
    let mut peer = PeerClient::connect(addr, name, None).await?;
    println!("* joined as {} ({})", name, peer.id());

    let mut acted_on_turn: Option<u32> = None;
    loop {
        match peer.next_event().await? {
            PeerEvent::Message(_) => {}
            PeerEvent::Promoted => {
                println!("* the host left; this peer was promoted");
                return Ok(());
            }
            PeerEvent::HostMoved { addr, .. } => {
                match addr {
                    Some(addr) => println!("* new host at {addr}; rejoin there"),
                    None => println!("* the host moved without an address"),
                }
                return Ok(());
            }
            PeerEvent::Closed => {
                println!("* session closed");
                return Ok(());
            }
        }

        // Attack whenever our character is the one being awaited.
        let Some(state) = peer.combat().state() else { continue };
        let Some(awaited) = state.awaiting else { continue };
        let ours = state.party.iter().any(|c| {
            c.id == awaited && c.controller == Controller::Participant(peer.id())
        });
        if !ours || acted_on_turn == Some(state.turn) {
            continue;
        }
        let Some(target) = state.enemies.iter().find(|c| c.is_alive()) else {
            continue;
        };
        println!("* {} attacks {}", name, target.name);
        acted_on_turn = Some(state.turn);
        peer.submit_action(ActionKind::Attack, target.id, None).await?;
    }
}

fn usage() -> ! {
    eprintln!("usage: skirmish host <addr>");
    eprintln!("       skirmish join <addr> <name>");
    std::process::exit(2);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skirmish=info,emberlink=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("host") => {
            let addr = args.get(2).map(String::as_str).unwrap_or("127.0.0.1:7870");
            run_host(addr).await?;
        }
        Some("join") => {
            let (Some(addr), Some(name)) = (args.get(2), args.get(3)) else {
                usage();
            };
            run_peer(addr, name).await?;
        }
        _ => usage(),
    }
    Ok(())
}
