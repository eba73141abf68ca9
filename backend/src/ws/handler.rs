use super::{
    feed::{ChangeFeed, RowChange},
    messages::{ClientMessage, ServerMessage, Subscription},
    rate_limit::RateLimiter,
};
use crate::auth::JwtManager;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::Deserialize;
use std::{collections::HashSet, sync::Arc};
use tokio::{
    sync::broadcast::error::RecvError,
    time::{interval, Duration, Instant},
};

/// Most filters one connection may hold at once.
const MAX_SUBSCRIPTIONS: usize = 32;

pub struct RealtimeState {
    pub jwt_manager: Arc<JwtManager>,
    pub feed: ChangeFeed,
}

#[derive(Deserialize)]
pub struct WsQuery {
    token: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<RealtimeState>>,
) -> Response {
    let claims = match state.jwt_manager.verify_token(&query.token) {
        Ok(claims) => claims,
        Err(_) => return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
    };

    let token_expires_at = DateTime::from_timestamp(claims.exp as i64, 0)
        .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));

    ws.max_message_size(8 * 1024)
        .on_upgrade(move |socket| handle_socket(socket, claims.sub, state, token_expires_at))
}

async fn send(sender: &mut SplitSink<WebSocket, Message>, msg: &ServerMessage) -> bool {
    match serde_json::to_string(msg) {
        Ok(text) => sender.send(Message::Text(text)).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            true
        }
    }
}

async fn handle_socket(
    socket: WebSocket,
    wallet_address: String,
    state: Arc<RealtimeState>,
    token_expires_at: DateTime<Utc>,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut feed_rx = state.feed.subscribe();

    if !send(
        &mut sender,
        &ServerMessage::Connected {
            wallet_address: wallet_address.clone(),
        },
    )
    .await
    {
        return;
    }

    let mut subscriptions: HashSet<Subscription> = HashSet::new();
    let mut rate_limiter = RateLimiter::new(10.0, 20.0);
    let mut ping_interval = interval(Duration::from_secs(30));
    let mut token_check_interval = interval(Duration::from_secs(60));
    let mut last_pong = Instant::now();

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !rate_limiter.allow() {
                            let err = ServerMessage::Error {
                                message: "Rate limited: too many messages".to_string(),
                            };
                            if !send(&mut sender, &err).await {
                                break;
                            }
                            continue;
                        }

                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => handle_client_message(client_msg, &mut subscriptions),
                            Err(_) => ServerMessage::Error {
                                message: "Unrecognised message".to_string(),
                            },
                        };
                        if !send(&mut sender, &reply).await {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }

            change = feed_rx.recv() => {
                match change {
                    Ok(change) => {
                        if wanted(&subscriptions, &change)
                            && !send(&mut sender, &ServerMessage::Change(change)).await
                        {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Realtime client {} lagged by {} changes", wallet_address, skipped);
                        let err = ServerMessage::Error {
                            message: "Missed updates, please refetch".to_string(),
                        };
                        if !send(&mut sender, &err).await {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            _ = ping_interval.tick() => {
                if last_pong.elapsed() > Duration::from_secs(40) {
                    tracing::debug!("No pong from {} in 40s, closing connection", wallet_address);
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            _ = token_check_interval.tick() => {
                if Utc::now() >= token_expires_at {
                    let err = ServerMessage::Error {
                        message: "Token expired, please reconnect".to_string(),
                    };
                    let _ = send(&mut sender, &err).await;
                    break;
                }
            }
        }
    }

    tracing::debug!("Realtime connection for {} closed", wallet_address);
}

fn wanted(subscriptions: &HashSet<Subscription>, change: &RowChange) -> bool {
    subscriptions.iter().any(|sub| sub.wants(change))
}

fn handle_client_message(
    msg: ClientMessage,
    subscriptions: &mut HashSet<Subscription>,
) -> ServerMessage {
    match msg {
        ClientMessage::Subscribe { table, row_id } => {
            if subscriptions.len() >= MAX_SUBSCRIPTIONS {
                return ServerMessage::Error {
                    message: "Too many subscriptions".to_string(),
                };
            }
            subscriptions.insert(Subscription {
                table,
                row_id: row_id.clone(),
            });
            ServerMessage::Subscribed { table, row_id }
        }
        ClientMessage::Unsubscribe { table, row_id } => {
            subscriptions.remove(&Subscription {
                table,
                row_id: row_id.clone(),
            });
            ServerMessage::Unsubscribed { table, row_id }
        }
        ClientMessage::Ping => ServerMessage::Pong,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::feed::{ChangeEvent, FeedTable};

    #[test]
    fn subscribe_and_unsubscribe() {
        let mut subs = HashSet::new();
        let reply = handle_client_message(
            ClientMessage::Subscribe {
                table: FeedTable::Tournaments,
                row_id: Some("t1".to_string()),
            },
            &mut subs,
        );
        assert!(matches!(reply, ServerMessage::Subscribed { .. }));

        let change = RowChange {
            table: FeedTable::Tournaments,
            row_id: "t1".to_string(),
            tournament_id: None,
            event: ChangeEvent::Update,
            row: serde_json::json!({}),
        };
        assert!(wanted(&subs, &change));

        handle_client_message(
            ClientMessage::Unsubscribe {
                table: FeedTable::Tournaments,
                row_id: Some("t1".to_string()),
            },
            &mut subs,
        );
        assert!(!wanted(&subs, &change));
    }

    #[test]
    fn subscription_cap() {
        let mut subs = HashSet::new();
        for i in 0..MAX_SUBSCRIPTIONS {
            handle_client_message(
                ClientMessage::Subscribe {
                    table: FeedTable::TournamentGames,
                    row_id: Some(i.to_string()),
                },
                &mut subs,
            );
        }
        let reply = handle_client_message(
            ClientMessage::Subscribe {
                table: FeedTable::TournamentGames,
                row_id: None,
            },
            &mut subs,
        );
        assert!(matches!(reply, ServerMessage::Error { .. }));
    }
}
