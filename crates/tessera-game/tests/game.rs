//! A full match over real sessions and loopback WebSockets.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tessera_game::{
    GameBehavior, GameSessions, GameState, NoSpawn, Position, SpawnPolicy,
    TOPIC_STATE_CHANGED,
};
use tessera_notify::Notifier;
use tessera_protocol::{
    ApplyPowerData, GameId, IdentifyData, Message, MoveData, SubscribeData,
    UserId,
};
use tessera_session::{Session, SessionServices, StaticAuthenticator};
use tessera_store::{Game, MemoryRepository, Repository, User};
use tessera_transport::{Transport, WebSocketTransport};
use tokio_tungstenite::tungstenite;

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const WAIT: Duration = Duration::from_secs(2);

// =========================================================================
// Harness
// =========================================================================

struct Harness {
    addr: std::net::SocketAddr,
    state: GameState,
}

async fn start() -> Harness {
    let alice = UserId::from("alice");
    let bob = UserId::from("bob");
    let state = GameState::initial(&alice, &bob, &Default::default());

    let repo = Arc::new(MemoryRepository::new());
    let mut scope = repo.begin().await.unwrap();
    for (id, name) in [("alice", "Alice"), ("bob", "Bob"), ("mallory", "Mallory")] {
        repo.add_user(&mut scope, User::new(id, name)).await.unwrap();
    }
    repo.add_game(
        &mut scope,
        Game {
            id: GameId::from("g1"),
            player_a_id: alice,
            player_b_id: bob,
            expires_at: Utc::now() + chrono::Duration::hours(1),
            revision: 0,
            state: state.to_value().unwrap(),
        },
    )
    .await
    .unwrap();
    repo.commit(scope).await.unwrap();

    let auth = StaticAuthenticator::new()
        .with_token("t-alice", "alice")
        .with_token("t-bob", "bob")
        .with_token("t-mallory", "mallory");
    let notifier = Notifier::new();
    let games = Arc::new(
        GameSessions::new(notifier.clone())
            .spawn_policy(|_| -> Box<dyn SpawnPolicy> { Box::new(NoSpawn) }),
    );
    let services = Arc::new(SessionServices::new(auth, repo, notifier));

    let mut transport = WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
    let addr = transport.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok(conn) = transport.accept().await {
            let game = games.get_or_create(&GameId::from("g1")).await;
            let session = Session::new(conn, Arc::clone(&services));
            tokio::spawn(async move {
                let _ = session.run(GameBehavior::new(game)).await;
            });
        }
    });

    Harness { addr, state }
}

async fn send(ws: &mut ClientWs, message: Message) {
    let text = message.to_text().unwrap();
    ws.send(tungstenite::Message::Text(text.into())).await.unwrap();
}

async fn recv(ws: &mut ClientWs) -> Message {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            tungstenite::Message::Text(text) => {
                return Message::from_text(text.as_str()).unwrap();
            }
            tungstenite::Message::Close(frame) => {
                panic!("unexpected close: {frame:?}")
            }
            _ => continue,
        }
    }
}

async fn expect_close(ws: &mut ClientWs) -> u16 {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for close")
            .expect("stream ended")
            .expect("websocket error");
        if let tungstenite::Message::Close(Some(frame)) = frame {
            return u16::from(frame.code);
        }
    }
}

async fn connect(harness: &Harness, token: &str) -> ClientWs {
    let (mut ws, _) =
        tokio_tungstenite::connect_async(format!("ws://{}/game/g1/connect", harness.addr))
            .await
            .expect("client should connect");
    send(
        &mut ws,
        Message::Identify(IdentifyData {
            token: token.into(),
        }),
    )
    .await;
    assert_eq!(recv(&mut ws).await, Message::ServerReady);
    ws
}

/// Connects and returns the initial `GameState` payload.
async fn join(harness: &Harness, token: &str) -> (ClientWs, Value, String) {
    let mut ws = connect(harness, token).await;
    match recv(&mut ws).await {
        Message::GameState(data) => (ws, data.game_state, data.etag),
        other => panic!("expected game state, got {other:?}"),
    }
}

fn move_msg(state: &GameState, from: (u32, u32), to: (u32, u32)) -> Message {
    Message::Move(MoveData {
        piece_id: state
            .board
            .piece_at(Position::new(from.0, from.1))
            .unwrap()
            .id
            .to_string(),
        tile_id: state
            .board
            .tile_at(Position::new(to.0, to.1))
            .unwrap()
            .id
            .to_string(),
    })
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_both_players_receive_the_same_initial_board() {
    let harness = start().await;
    let (_a, state_a, etag_a) = join(&harness, "t-alice").await;
    let (_b, state_b, etag_b) = join(&harness, "t-bob").await;

    assert_eq!(state_a, state_b);
    assert_eq!(etag_a, etag_b);
    assert_eq!(state_a["current_player_id"], "alice");
    assert_eq!(state_a["settings"]["board_size"], json!({"x": 10, "y": 8}));
    assert_eq!(state_a["board"]["pieces"].as_object().unwrap().len(), 40);
}

#[tokio::test]
async fn test_first_move_yields_result_then_minimal_diff() {
    let harness = start().await;
    let (mut alice, _, etag_a) = join(&harness, "t-alice").await;
    let (mut bob, _, etag_b) = join(&harness, "t-bob").await;
    let state = &harness.state;

    send(&mut bob, move_msg(state, (0, 6), (0, 5))).await;
    assert_eq!(
        recv(&mut bob).await,
        Message::action_result(false, Some("Not your turn".into()))
    );

    send(&mut alice, move_msg(state, (0, 1), (0, 2))).await;
    assert_eq!(recv(&mut alice).await, Message::action_result(true, None));

    let piece = state.board.piece_at(Position::new(0, 1)).unwrap().id.to_string();
    let tile = state.board.tile_at(Position::new(0, 2)).unwrap().id.to_string();
    let expected = json!({
        "board": { "pieces": { piece: { "tile_id": tile } } },
        "current_player_id": "bob",
        "moves_played": 1,
    });
    for (ws, etag) in [(&mut alice, &etag_a), (&mut bob, &etag_b)] {
        match recv(ws).await {
            Message::GameStateDiff(d) => {
                assert_eq!(d.game_state_diff, expected);
                assert_eq!(&d.etag_from, etag);
                assert_ne!(&d.etag_to, etag);
            }
            other => panic!("expected diff, got {other:?}"),
        }
    }

    // Now it is alice who has to wait.
    send(&mut alice, move_msg(state, (1, 1), (1, 2))).await;
    assert_eq!(
        recv(&mut alice).await,
        Message::action_result(false, Some("Not your turn".into()))
    );
}

#[tokio::test]
async fn test_unknown_power_is_an_illegal_action() {
    let harness = start().await;
    let (mut alice, _, _) = join(&harness, "t-alice").await;

    send(
        &mut alice,
        Message::ApplyPower(ApplyPowerData {
            power_id: "missing".into(),
        }),
    )
    .await;
    assert_eq!(
        recv(&mut alice).await,
        Message::action_result(false, Some("Power not found".into()))
    );
}

#[tokio::test]
async fn test_second_connection_kicks_the_first() {
    let harness = start().await;
    let (mut first, _, _) = join(&harness, "t-alice").await;
    let (mut second, _, _) = join(&harness, "t-alice").await;

    assert_eq!(
        recv(&mut first).await,
        Message::kick("Connected from another location")
    );
    assert_eq!(expect_close(&mut first).await, 4002);

    send(&mut second, move_msg(&harness.state, (2, 1), (2, 2))).await;
    assert_eq!(recv(&mut second).await, Message::action_result(true, None));
    assert!(matches!(recv(&mut second).await, Message::GameStateDiff(_)));
}

#[tokio::test]
async fn test_outsider_is_turned_away() {
    let harness = start().await;
    let (mut ws, _) =
        tokio_tungstenite::connect_async(format!("ws://{}/game/g1/connect", harness.addr))
            .await
            .unwrap();
    send(
        &mut ws,
        Message::Identify(IdentifyData {
            token: "t-mallory".into(),
        }),
    )
    .await;
    match recv(&mut ws).await {
        Message::Error(e) => assert!(e.fatal),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(expect_close(&mut ws).await, 4001);
}

#[tokio::test]
async fn test_state_change_is_announced_to_subscribers() {
    let harness = start().await;
    let (mut alice, _, etag) = join(&harness, "t-alice").await;
    send(
        &mut alice,
        Message::Subscribe(SubscribeData {
            topic: "game.*".into(),
        }),
    )
    .await;
    assert_eq!(recv(&mut alice).await, Message::Subscribed);

    send(&mut alice, move_msg(&harness.state, (0, 1), (0, 2))).await;
    assert_eq!(recv(&mut alice).await, Message::action_result(true, None));
    assert!(matches!(recv(&mut alice).await, Message::GameStateDiff(_)));

    match recv(&mut alice).await {
        Message::Notification(n) => {
            assert_eq!(n.topic, TOPIC_STATE_CHANGED);
            assert_eq!(n.data["game_id"], "g1");
            assert_eq!(n.data["etag_from"], etag.as_str());
        }
        other => panic!("expected notification, got {other:?}"),
    }
}
