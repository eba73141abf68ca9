//! WebSocket Integration Tests for the change feed
//!
//! These tests verify that row changes made through the HTTP API reach
//! subscribed WebSocket clients.

use chess_wager_server::{
    create_test_app,
    ws::messages::{ClientMessage, ServerMessage},
    ws::{ChangeEvent, FeedTable},
    Services,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::{net::SocketAddr, time::Duration};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Test helper to spin up a server and return its address
async fn spawn_server() -> (SocketAddr, Services) {
    let (app, services) = create_test_app().await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, services)
}

async fn connect(addr: SocketAddr, services: &Services, address: &str) -> Socket {
    let token = services.jwt_manager.create_token(address).unwrap();
    let (socket, _) = connect_async(format!("ws://{}/ws?token={}", addr, token))
        .await
        .unwrap();
    socket
}

/// Next server message, skipping transport frames.
async fn next_message(socket: &mut Socket) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a server message")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send(socket: &mut Socket, msg: &ClientMessage) {
    socket
        .send(Message::Text(serde_json::to_string(msg).unwrap()))
        .await
        .unwrap();
}

async fn join(addr: SocketAddr, services: &Services, address: &str) -> serde_json::Value {
    let token = services.jwt_manager.create_token(address).unwrap();
    reqwest::Client::new()
        .post(format!("http://{}/api/tournaments/join", addr))
        .bearer_auth(token)
        .json(&json!({
            "playerAddress": address,
            "tournamentSize": 2,
            "entryFee": 1.0,
            "currency": "XAH"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_rejects_invalid_token() {
    let (addr, _services) = spawn_server().await;

    let result = connect_async(format!("ws://{}/ws?token=garbage", addr)).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_connect_and_ping() {
    let (addr, services) = spawn_server().await;
    let mut socket = connect(addr, &services, "rAlice").await;

    match next_message(&mut socket).await {
        ServerMessage::Connected { wallet_address } => assert_eq!(wallet_address, "rAlice"),
        other => panic!("expected Connected, got {:?}", other),
    }

    send(&mut socket, &ClientMessage::Ping).await;
    assert!(matches!(next_message(&mut socket).await, ServerMessage::Pong));

    socket
        .send(Message::Text("{\"type\":\"Nonsense\"}".to_string()))
        .await
        .unwrap();
    assert!(matches!(
        next_message(&mut socket).await,
        ServerMessage::Error { .. }
    ));
}

#[tokio::test]
async fn test_tournament_changes_reach_subscribers() {
    let (addr, services) = spawn_server().await;
    let mut socket = connect(addr, &services, "rWatcher").await;
    next_message(&mut socket).await;

    send(
        &mut socket,
        &ClientMessage::Subscribe {
            table: FeedTable::Tournaments,
            row_id: None,
        },
    )
    .await;
    assert!(matches!(
        next_message(&mut socket).await,
        ServerMessage::Subscribed { .. }
    ));

    let joined = join(addr, &services, "rAlice").await;
    let tournament_id = joined["tournamentId"].as_str().unwrap();

    match next_message(&mut socket).await {
        ServerMessage::Change(change) => {
            assert_eq!(change.table, FeedTable::Tournaments);
            assert_eq!(change.event, ChangeEvent::Insert);
            assert_eq!(change.row_id, tournament_id);
            assert_eq!(change.row["status"], "waiting");
        }
        other => panic!("expected Change, got {:?}", other),
    }
}

#[tokio::test]
async fn test_game_subscription_filters_by_tournament() {
    let (addr, services) = spawn_server().await;
    let first = join(addr, &services, "rWhite").await;
    let tournament_id = first["tournamentId"].as_str().unwrap().to_string();

    let mut socket = connect(addr, &services, "rWhite").await;
    next_message(&mut socket).await;
    send(
        &mut socket,
        &ClientMessage::Subscribe {
            table: FeedTable::TournamentGames,
            row_id: Some(tournament_id.clone()),
        },
    )
    .await;
    next_message(&mut socket).await;

    let second = join(addr, &services, "rBlack").await;
    let game_id = second["gameId"].as_str().unwrap();

    match next_message(&mut socket).await {
        ServerMessage::Change(change) => {
            assert_eq!(change.table, FeedTable::TournamentGames);
            assert_eq!(change.row_id, game_id);
            assert_eq!(change.tournament_id.as_deref(), Some(tournament_id.as_str()));
            assert_eq!(change.row["player_white"], "rWhite");
        }
        other => panic!("expected Change, got {:?}", other),
    }
}
