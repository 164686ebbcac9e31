//! Whole games between two runners sharing an in-process hub, with spectators.
mod common;

use std::sync::Arc;
use std::time::Duration;

use chess_core::{Finish, Game, Method, Side};
use chess_session::source::HumanInput;
use chess_session::transport::{Hub, HubConfig, MemoryTransport, Transport};
use chess_session::{Ending, GameEvent, MoveEvent, Outcome, Report, Role, Runner, SessionError};
use common::{drain, script, wait_for_member, PRESENCE_TIMEOUT};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const ROOM: &str = "game1";

fn fools_mate() -> Finish {
    Finish {
        winner: Some(Side::Black),
        method: Method::Checkmate,
    }
}

struct Player {
    transport: Arc<MemoryTransport>,
    runner: Runner,
    events: mpsc::UnboundedReceiver<GameEvent>,
}

fn player(hub: &Arc<Hub>, name: &str) -> Player {
    let transport = Arc::new(MemoryTransport::new(hub.clone(), name));
    let (tx, events) = mpsc::unbounded_channel();
    let runner = Runner::new(transport.clone(), ROOM, PRESENCE_TIMEOUT, tx);
    Player {
        transport,
        runner,
        events,
    }
}

/// Alice arrives first and gets white; bob joins once she is present.
async fn play_game(
    hub: &Arc<Hub>,
    white: Box<dyn chess_session::MoveSource>,
    black: Box<dyn chess_session::MoveSource>,
) -> (Player, Report, Player, Report) {
    let alice = player(hub, "alice");
    let bob = player(hub, "bob");
    let cancel = CancellationToken::new();

    let (a, b) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(alice.runner.play(white, &cancel), async {
            wait_for_member(bob.transport.as_ref(), ROOM, "alice").await;
            bob.runner.play(black, &cancel).await
        })
    })
    .await
    .unwrap();

    (alice, a.unwrap(), bob, b.unwrap())
}

#[tokio::test]
async fn test_fools_mate_between_two_players() {
    let hub = Arc::new(Hub::default());
    let white = HumanInput::new(BufReader::new(&b"f3\ng4\n"[..]), tokio::io::sink());
    let (mut alice, a, mut bob, b) = play_game(
        &hub,
        Box::new(white),
        script(&["e5", "Qh4"]),
    )
    .await;

    assert_eq!(a.role, Role::FirstMover);
    assert_eq!(b.role, Role::SecondMover);
    assert_eq!(a.ending, Ending::Finished(fools_mate()));
    assert_eq!(b.ending, Ending::Finished(fools_mate()));
    assert_eq!(a.outcome, Outcome::Win(Side::Black));
    assert_eq!(a.snapshot, b.snapshot);
    assert_eq!(a.record.movetext(), "1. f3 e5 2. g4 Qh4# 0-1");
    assert_eq!(b.record.movetext(), a.record.movetext());

    let alice_events = drain(&mut alice.events);
    // Bob may already be parked by the time alice is seated.
    assert!(alice_events.iter().any(|e| matches!(
        e,
        GameEvent::Seated { side: Side::White, source, opponent }
            if source.is_empty() && opponent.as_deref().map_or(true, |peer| peer == "bob")
    )));
    assert!(alice_events
        .iter()
        .any(|e| matches!(e, GameEvent::Moved { san, .. } if san == "Qh4#")));
    let bob_events = drain(&mut bob.events);
    assert!(bob_events.contains(&GameEvent::Seated {
        side: Side::Black,
        source: String::new(),
        opponent: Some("alice".into()),
    }));
    assert!(matches!(bob_events.last(), Some(GameEvent::Finished { .. })));
}

#[tokio::test]
async fn test_history_events_replay_against_prior_position() {
    let hub = Arc::new(Hub::default());
    play_game(&hub, script(&["f3", "g4"]), script(&["e5", "Qh4"])).await;

    let history = hub.history(ROOM).await;
    assert_eq!(history.len(), 4);

    let mut game = Game::new();
    for (i, envelope) in history.iter().enumerate() {
        let event = MoveEvent::decode(&envelope.data).unwrap();
        let publisher = if i % 2 == 0 { "alice" } else { "bob" };
        assert_eq!(envelope.client_id, publisher);
        assert_eq!(event.move_index, i as u32 + 1);
        assert_eq!(event.side, game.side_to_move());

        let mv = game.decode_uci(&event.notation).unwrap();
        assert_eq!(game.san(&mv), event.display);
        game = game.play(&mv).unwrap();
        assert_eq!(game.snapshot(), event.snapshot);
    }
    let last = MoveEvent::decode(&history[3].data).unwrap();
    assert_eq!(last.result, "0-1 checkmate");
    assert_eq!(last.finish(), Some(fools_mate()));
}

#[tokio::test]
async fn test_spectator_reaches_same_outcome() {
    let hub = Arc::new(Hub::default());
    let (_alice, a, _bob, _b) =
        play_game(&hub, script(&["f3", "g4"]), script(&["e5", "Qh4"])).await;

    let mut carol = player(&hub, "carol");
    let report = carol.runner.watch(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.role, Role::Observer);
    assert_eq!(report.ending, Ending::Finished(fools_mate()));
    assert_eq!(report.snapshot, a.snapshot);
    // The record starts from the first retained position.
    assert_eq!(report.record.movetext(), "1... e5 2. g4 Qh4# 0-1");

    let events = drain(&mut carol.events);
    assert_eq!(
        events.first(),
        Some(&GameEvent::Watching {
            players: vec![
                ("alice".into(), Some("white".into())),
                ("bob".into(), Some("black".into())),
            ],
        })
    );
    // Watching never touches presence or history.
    assert_eq!(hub.members(ROOM).await.len(), 2);
    assert_eq!(hub.history(ROOM).await.len(), 4);
}

#[tokio::test]
async fn test_third_arrival_becomes_observer() {
    let hub = Arc::new(Hub::default());
    let (_alice, a, _bob, _b) =
        play_game(&hub, script(&["f3", "g4"]), script(&["e5", "Qh4"])).await;

    let dave = player(&hub, "dave");
    let report = tokio::time::timeout(
        Duration::from_secs(5),
        dave.runner.play(script(&["e4"]), &CancellationToken::new()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.role, Role::Observer);
    assert_eq!(report.snapshot, a.snapshot);
    assert_eq!(hub.history(ROOM).await.len(), 4);
}

#[tokio::test]
async fn test_spectator_with_truncated_history() {
    let hub = Arc::new(Hub::new(HubConfig {
        history_limit: 3,
        ..HubConfig::default()
    }));
    let (_alice, a, _bob, _b) =
        play_game(&hub, script(&["f3", "g4"]), script(&["e5", "Qh4"])).await;

    let carol = player(&hub, "carol");
    let report = carol.runner.watch(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.ending, Ending::Finished(fools_mate()));
    assert_eq!(report.snapshot, a.snapshot);
    assert!(report.record.setup.is_some());
}

#[tokio::test]
async fn test_resignation_ends_both_sides() {
    let hub = Arc::new(Hub::default());
    let (_alice, a, _bob, b) = play_game(
        &hub,
        script(&["e4", "resign"]),
        script(&["e5"]),
    )
    .await;

    let resigned = Finish::resignation(Side::White);
    assert_eq!(a.ending, Ending::Finished(resigned));
    assert_eq!(b.ending, Ending::Finished(resigned));
    assert_eq!(a.outcome, Outcome::Resigned(Side::White));
    assert_eq!(a.snapshot, b.snapshot);

    let history = hub.history(ROOM).await;
    let last = MoveEvent::decode(&history.last().unwrap().data).unwrap();
    assert!(last.resigned);
    assert_eq!(last.move_index, 3);
    assert_eq!(last.snapshot, a.snapshot);

    let carol = player(&hub, "carol");
    let report = carol.runner.watch(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.ending, Ending::Finished(resigned));
    assert_eq!(report.snapshot, a.snapshot);
}

#[tokio::test]
async fn test_cancel_while_waiting_for_opponent() {
    let hub = Arc::new(Hub::default());
    let alice = player(&hub, "alice");
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        alice.runner.play(script(&["e4"]), &cancel),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(report.role, Role::FirstMover);
    assert_eq!(report.ending, Ending::Cancelled);
    assert!(!report.completed());
    assert!(hub.history(ROOM).await.is_empty());
}

#[tokio::test]
async fn test_opponent_leaving_mid_game() {
    let hub = Arc::new(Hub::default());
    let alice = player(&hub, "alice");
    let bob = MemoryTransport::new(hub.clone(), "bob");
    let cancel = CancellationToken::new();

    let (result, _) = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(alice.runner.play(script(&["e4"]), &cancel), async {
            wait_for_member(&bob, ROOM, "alice").await;
            let _moves = bob.subscribe(ROOM, false).await.unwrap();
            bob.enter(ROOM, Some("bob".into())).await.unwrap();
            while hub.history(ROOM).await.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            bob.close().await;
        })
    })
    .await
    .unwrap();

    match result {
        Err(SessionError::PeerDeparted { peer }) => assert_eq!(peer, "bob"),
        other => panic!("expected a departure, got {other:?}"),
    }
    assert_eq!(hub.history(ROOM).await.len(), 1);
}
