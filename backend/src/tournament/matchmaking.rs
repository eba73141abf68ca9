use crate::{
    audit,
    db::{
        begin_write,
        models::{Game, ResultReason, Tournament, TournamentPlayer, TournamentStatus},
        to_db_time,
    },
    error::{AppError, Result},
    game::GameService,
    tournament::context::{GameOutcome, TournamentContext},
    ws::ChangeEvent,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// Tournament sizes players can queue for.
pub const ALLOWED_SIZES: [i64; 4] = [2, 4, 8, 16];

/// A waiting tournament that has not filled by then is expired.
pub const WAITING_LIFETIME_MINS: i64 = 10;

/// An in-progress game older than this is treated as abandoned.
pub const STALE_GAME_MINS: i64 = 30;

/// Attempts at the join transaction before reporting the bracket as busy.
const JOIN_ATTEMPTS: u32 = 5;
const JOIN_RETRY_MAX_MS: u64 = 50;

const FULL_MESSAGE: &str = "Tournament is full, please retry";

#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub player_address: String,
    pub tournament_size: i64,
    /// Micro-units (drops for XAH).
    pub entry_fee: i64,
    pub currency: String,
    pub issuer: Option<String>,
    /// Verified entry payment, recorded with the registration.
    pub payment_uuid: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub success: bool,
    pub tournament_id: String,
    pub player_count: i64,
    pub tournament_size: i64,
    pub is_full: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub enum JoinOutcome {
    Joined(JoinResponse),
    /// The player is already committed to a different tournament.
    AlreadyActive {
        tournament_id: String,
        status: TournamentStatus,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveResponse {
    pub success: bool,
    pub message: String,
    pub remaining_players: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    pub removed: usize,
    pub tournament_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentCheck {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TournamentStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentDetails {
    pub tournament: Tournament,
    pub players: Vec<TournamentPlayer>,
    pub game: Option<Game>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerCheck {
    pub has_active_game: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tournament_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub(crate) struct MatchmakingService {
    ctx: Arc<TournamentContext>,
}

impl MatchmakingService {
    pub(crate) fn new(ctx: Arc<TournamentContext>) -> Self {
        Self { ctx }
    }

    pub(crate) async fn join(&self, request: JoinRequest, now: DateTime<Utc>) -> Result<JoinOutcome> {
        validate_join(&request)?;
        let issuer = request.issuer.clone().filter(|i| !i.trim().is_empty());

        if let Some((tournament_id, status)) =
            self.active_entry(&request.player_address, now).await?
        {
            let tournament = self.ctx.load_tournament(&tournament_id).await?;
            let same_bracket = status == TournamentStatus::Waiting
                && tournament.tournament_size == request.tournament_size
                && tournament.entry_fee == request.entry_fee
                && tournament.currency == request.currency
                && tournament.issuer == issuer;

            if !same_bracket {
                return Ok(JoinOutcome::AlreadyActive {
                    tournament_id,
                    status,
                });
            }

            let player_count = self.ctx.count_players(&tournament_id).await?;
            return Ok(JoinOutcome::Joined(JoinResponse {
                success: true,
                tournament_id,
                player_count,
                tournament_size: tournament.tournament_size,
                is_full: player_count >= tournament.tournament_size,
                game_id: None,
                message: Some("Already joined".to_string()),
            }));
        }

        let mut attempt = 1;
        loop {
            match self.join_bracket(&request, issuer.clone(), now).await {
                Err(e) if e.is_busy() && attempt < JOIN_ATTEMPTS => {
                    let backoff = rand::thread_rng().gen_range(1..=JOIN_RETRY_MAX_MS);
                    tracing::debug!(
                        "Join by {} hit a busy database (attempt {}), retrying",
                        request.player_address,
                        attempt
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                    attempt += 1;
                }
                Err(e) if e.is_busy() => {
                    return Err(AppError::Conflict(
                        "Tournament is busy, please retry".to_string(),
                    ))
                }
                other => return other,
            }
        }
    }

    async fn join_bracket(
        &self,
        request: &JoinRequest,
        issuer: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome> {
        let mut tx = begin_write(&self.ctx.pool).await?;

        let candidate = sqlx::query_as::<_, Tournament>(
            "SELECT t.* FROM tournaments t
             WHERE t.status = 'waiting'
               AND t.tournament_size = ? AND t.entry_fee = ? AND t.currency = ? AND t.issuer IS ?
               AND t.expires_at > ?
               AND (SELECT COUNT(*) FROM tournament_players p WHERE p.tournament_id = t.id) < t.tournament_size
             ORDER BY t.created_at ASC
             LIMIT 1",
        )
        .bind(request.tournament_size)
        .bind(request.entry_fee)
        .bind(&request.currency)
        .bind(&issuer)
        .bind(to_db_time(now))
        .fetch_optional(&mut *tx)
        .await?;

        let (tournament, created) = match candidate {
            Some(tournament) => (tournament, false),
            None => {
                let tournament = Tournament::new(
                    request.tournament_size,
                    request.entry_fee,
                    request.currency.clone(),
                    issuer.clone(),
                    now,
                    Duration::minutes(WAITING_LIFETIME_MINS),
                );
                insert_tournament(&mut tx, &tournament).await?;
                (tournament, true)
            }
        };

        let player_id = Uuid::new_v4().to_string();
        match take_seat(&mut tx, &tournament.id, &player_id, &request.player_address, now).await {
            Ok(()) => {}
            Err(e) if e.is_unique_violation() => {
                tx.rollback().await?;
                // A clash on player_order means someone else took the seat.
                if !self.is_registered(&tournament.id, &request.player_address).await? {
                    return Err(AppError::Conflict(FULL_MESSAGE.to_string()));
                }
                let player_count = self.ctx.count_players(&tournament.id).await?;
                return Ok(JoinOutcome::Joined(JoinResponse {
                    success: true,
                    tournament_id: tournament.id,
                    player_count,
                    tournament_size: request.tournament_size,
                    is_full: player_count >= request.tournament_size,
                    game_id: None,
                    message: Some("Already joined".to_string()),
                }));
            }
            Err(e) => return Err(e),
        }

        if let Some(payment_uuid) = &request.payment_uuid {
            record_entry_payment(&mut tx, payment_uuid, request, &tournament.id, now).await?;
        }

        let players = sqlx::query_as::<_, TournamentPlayer>(
            "SELECT * FROM tournament_players WHERE tournament_id = ? ORDER BY player_order",
        )
        .bind(&tournament.id)
        .fetch_all(&mut *tx)
        .await?;
        let player_count = players.len() as i64;
        let is_full = player_count >= tournament.tournament_size;

        let mut game = None;
        if is_full {
            let started = sqlx::query(
                "UPDATE tournaments SET status = 'in_progress', started_at = ?
                 WHERE id = ? AND status = 'waiting'",
            )
            .bind(to_db_time(now))
            .bind(&tournament.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if started == 1 {
                sqlx::query("UPDATE tournament_players SET status = 'joined' WHERE tournament_id = ?")
                    .bind(&tournament.id)
                    .execute(&mut *tx)
                    .await?;

                if tournament.tournament_size == 2 {
                    game = Some(
                        GameService::create_in_tx(
                            &mut tx,
                            &tournament.id,
                            &players[0].player_address,
                            &players[1].player_address,
                            now,
                        )
                        .await?,
                    );
                }
            }
        }

        tx.commit().await?;

        if created {
            audit::log_tournament_event(
                &tournament.id,
                "created",
                &format!(
                    "size={} fee={} {}",
                    tournament.tournament_size, tournament.entry_fee, tournament.currency
                ),
            );
            self.ctx
                .publish_tournament(&tournament.id, ChangeEvent::Insert)
                .await;
        }
        audit::log_tournament_event(
            &tournament.id,
            "joined",
            &format!("{} ({}/{})", request.player_address, player_count, tournament.tournament_size),
        );
        if let Some(player) = players.iter().find(|p| p.id == player_id) {
            self.ctx.publish_player(player, ChangeEvent::Insert);
        }

        if is_full {
            audit::log_tournament_event(&tournament.id, "started", "tournament filled");
            self.ctx
                .publish_tournament(&tournament.id, ChangeEvent::Update)
                .await;
            if let Some(game) = &game {
                self.ctx.publish_game(&game.id, ChangeEvent::Insert).await;
            }
        }

        Ok(JoinOutcome::Joined(JoinResponse {
            success: true,
            tournament_id: tournament.id,
            player_count,
            tournament_size: tournament.tournament_size,
            is_full,
            game_id: game.map(|g| g.id),
            message: None,
        }))
    }

    async fn is_registered(&self, tournament_id: &str, address: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tournament_players WHERE tournament_id = ? AND player_address = ?",
        )
        .bind(tournament_id)
        .bind(address)
        .fetch_one(&self.ctx.pool)
        .await?;
        Ok(count > 0)
    }

    /// The in-progress or unexpired waiting tournament this wallet is
    /// committed to.
    async fn active_entry(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(String, TournamentStatus)>> {
        let entry = sqlx::query_as::<_, (String, TournamentStatus)>(
            "SELECT t.id, t.status FROM tournament_players p
             JOIN tournaments t ON t.id = p.tournament_id
             WHERE p.player_address = ? AND p.forfeited = 0
               AND (t.status = 'in_progress' OR (t.status = 'waiting' AND t.expires_at > ?))
             ORDER BY t.created_at DESC
             LIMIT 1",
        )
        .bind(address)
        .bind(to_db_time(now))
        .fetch_optional(&self.ctx.pool)
        .await?;
        Ok(entry)
    }

    pub(crate) async fn leave(
        &self,
        address: &str,
        tournament_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LeaveResponse> {
        let tournament = self.ctx.load_tournament(tournament_id).await?;
        if tournament.status != TournamentStatus::Waiting {
            return Err(AppError::BadRequest(
                "Only waiting tournaments can be left".to_string(),
            ));
        }

        let player = sqlx::query_as::<_, TournamentPlayer>(
            "SELECT * FROM tournament_players WHERE tournament_id = ? AND player_address = ?",
        )
        .bind(tournament_id)
        .bind(address)
        .fetch_optional(&self.ctx.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Player is not in this tournament".to_string()))?;

        let mut tx = self.ctx.pool.begin().await?;

        let removed = sqlx::query(
            "DELETE FROM tournament_players
             WHERE id = ?
               AND EXISTS (SELECT 1 FROM tournaments WHERE id = ? AND status = 'waiting')",
        )
        .bind(&player.id)
        .bind(tournament_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if removed == 0 {
            tx.rollback().await?;
            return Err(AppError::Conflict(
                "Tournament has already started".to_string(),
            ));
        }

        let (remaining,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tournament_players WHERE tournament_id = ?")
                .bind(tournament_id)
                .fetch_one(&mut *tx)
                .await?;

        let cancelled = if remaining == 0 {
            sqlx::query(
                "UPDATE tournaments
                 SET status = 'cancelled', cancelled_reason = 'All players left tournament', completed_at = ?
                 WHERE id = ? AND status = 'waiting'",
            )
            .bind(to_db_time(now))
            .bind(tournament_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1
        } else {
            false
        };

        tx.commit().await?;

        audit::log_tournament_event(tournament_id, "left", address);
        self.ctx.publish_player(&player, ChangeEvent::Delete);
        if cancelled {
            audit::log_tournament_event(tournament_id, "cancelled", "All players left tournament");
            self.ctx
                .publish_tournament(tournament_id, ChangeEvent::Update)
                .await;
        }

        Ok(LeaveResponse {
            success: true,
            message: "Left tournament successfully".to_string(),
            remaining_players: remaining,
        })
    }

    /// Removes the wallet from every tournament it is still waiting in.
    pub(crate) async fn cleanup_player(
        &self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<CleanupResponse> {
        let waiting: Vec<(String,)> = sqlx::query_as(
            "SELECT t.id FROM tournament_players p
             JOIN tournaments t ON t.id = p.tournament_id
             WHERE p.player_address = ? AND t.status = 'waiting'",
        )
        .bind(address)
        .fetch_all(&self.ctx.pool)
        .await?;

        let mut tournament_ids = Vec::new();
        for (tournament_id,) in waiting {
            match self.leave(address, &tournament_id, now).await {
                Ok(_) => tournament_ids.push(tournament_id),
                Err(e) => tracing::warn!(
                    "Cleanup could not remove {} from {}: {:?}",
                    address,
                    tournament_id,
                    e
                ),
            }
        }

        let message = if tournament_ids.is_empty() {
            "No waiting tournaments"
        } else {
            "Player removed from waiting tournaments"
        };

        Ok(CleanupResponse {
            success: true,
            message: message.to_string(),
            removed: tournament_ids.len(),
            tournament_ids,
        })
    }

    pub(crate) async fn check_tournament(&self, tournament_id: &str) -> Result<TournamentCheck> {
        Ok(match self.ctx.find_tournament(tournament_id).await? {
            Some(tournament) => TournamentCheck {
                exists: true,
                tournament_id: Some(tournament.id),
                status: Some(tournament.status),
            },
            None => TournamentCheck {
                exists: false,
                tournament_id: None,
                status: None,
            },
        })
    }

    pub(crate) async fn details(&self, tournament_id: &str) -> Result<TournamentDetails> {
        let tournament = self.ctx.load_tournament(tournament_id).await?;
        let players = self.ctx.load_players(tournament_id).await?;
        let game = self.ctx.latest_game(tournament_id).await?;

        Ok(TournamentDetails {
            tournament,
            players,
            game,
        })
    }

    /// Reports the wallet's running game, closing it first if it has gone stale.
    pub(crate) async fn check_player(&self, address: &str, now: DateTime<Utc>) -> Result<PlayerCheck> {
        let game = sqlx::query_as::<_, Game>(
            "SELECT * FROM tournament_games
             WHERE (player_white = ? OR player_black = ?) AND status = 'in_progress'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(address)
        .bind(address)
        .fetch_optional(&self.ctx.pool)
        .await?;

        let Some(game) = game else {
            return Ok(PlayerCheck {
                has_active_game: false,
                game_id: None,
                tournament_id: None,
                message: None,
            });
        };

        let stale_before = to_db_time(now - Duration::minutes(STALE_GAME_MINS));
        if game.created_at < stale_before {
            tracing::info!("Game {} is stale, marking abandoned", game.id);
            self.ctx
                .finish_game(
                    &game,
                    GameOutcome::Voided {
                        reason: ResultReason::Abandoned,
                    },
                    now,
                )
                .await?;
            return Ok(PlayerCheck {
                has_active_game: false,
                game_id: None,
                tournament_id: None,
                message: Some("Stale game cleaned up".to_string()),
            });
        }

        Ok(PlayerCheck {
            has_active_game: true,
            game_id: Some(game.id),
            tournament_id: Some(game.tournament_id),
            message: None,
        })
    }
}

fn validate_join(request: &JoinRequest) -> Result<()> {
    if request.player_address.trim().is_empty() || request.currency.trim().is_empty() {
        return Err(AppError::Validation("Missing required fields".to_string()));
    }
    if !ALLOWED_SIZES.contains(&request.tournament_size) {
        return Err(AppError::Validation(format!(
            "Tournament size must be one of {:?}",
            ALLOWED_SIZES
        )));
    }
    if request.entry_fee <= 0 {
        return Err(AppError::Validation(
            "Entry fee must be positive".to_string(),
        ));
    }
    Ok(())
}

/// Seats `address` if the tournament is still waiting and has room. A full
/// or started tournament inserts nothing and yields a conflict.
async fn take_seat(
    tx: &mut Transaction<'_, Sqlite>,
    tournament_id: &str,
    player_id: &str,
    address: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let inserted = sqlx::query(
        "INSERT INTO tournament_players (id, tournament_id, player_address, player_order, status, joined_at)
         SELECT ?, t.id, ?,
                COALESCE((SELECT MAX(player_order) FROM tournament_players WHERE tournament_id = t.id), 0) + 1,
                'waiting', ?
         FROM tournaments t
         WHERE t.id = ? AND t.status = 'waiting'
           AND (SELECT COUNT(*) FROM tournament_players WHERE tournament_id = t.id) < t.tournament_size",
    )
    .bind(player_id)
    .bind(address)
    .bind(to_db_time(now))
    .bind(tournament_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if inserted == 0 {
        return Err(AppError::Conflict(FULL_MESSAGE.to_string()));
    }
    Ok(())
}

async fn record_entry_payment(
    tx: &mut Transaction<'_, Sqlite>,
    payment_uuid: &str,
    request: &JoinRequest,
    tournament_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let recorded = sqlx::query(
        "INSERT INTO entry_payments (payload_uuid, wallet_address, tournament_id, amount, currency, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(payment_uuid)
    .bind(&request.player_address)
    .bind(tournament_id)
    .bind(request.entry_fee)
    .bind(&request.currency)
    .bind(to_db_time(now))
    .execute(&mut **tx)
    .await
    .map_err(AppError::from);

    match recorded {
        Ok(_) => Ok(()),
        Err(e) if e.is_unique_violation() => Err(AppError::Conflict(
            "Entry payment has already been used".to_string(),
        )),
        Err(e) => Err(e),
    }
}

async fn insert_tournament(
    tx: &mut Transaction<'_, Sqlite>,
    tournament: &Tournament,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO tournaments (
            id, tournament_size, entry_fee, currency, issuer, status, prize_pool,
            created_at, expires_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&tournament.id)
    .bind(tournament.tournament_size)
    .bind(tournament.entry_fee)
    .bind(&tournament.currency)
    .bind(&tournament.issuer)
    .bind(tournament.status)
    .bind(tournament.prize_pool)
    .bind(&tournament.created_at)
    .bind(&tournament.expires_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbPool;
    use axum::http::StatusCode;

    fn request(size: i64, fee: i64) -> JoinRequest {
        JoinRequest {
            player_address: "rAlice".to_string(),
            tournament_size: size,
            entry_fee: fee,
            currency: "XAH".to_string(),
            issuer: None,
            payment_uuid: None,
        }
    }

    #[test]
    fn join_validation() {
        assert!(validate_join(&request(2, 1_000_000)).is_ok());
        assert!(validate_join(&request(3, 1_000_000)).is_err());
        assert!(validate_join(&request(2, 0)).is_err());

        let mut missing = request(4, 1);
        missing.currency = String::new();
        assert!(matches!(validate_join(&missing), Err(AppError::Validation(_))));
    }

    async fn seated_tournament(pool: &DbPool, size: i64, players: &[&str]) -> Tournament {
        let now = Utc::now();
        let tournament = Tournament::new(
            size,
            1_000_000,
            "XAH".to_string(),
            None,
            now,
            Duration::minutes(WAITING_LIFETIME_MINS),
        );
        let mut tx = pool.begin().await.unwrap();
        insert_tournament(&mut tx, &tournament).await.unwrap();
        for address in players {
            take_seat(&mut tx, &tournament.id, &Uuid::new_v4().to_string(), address, now)
                .await
                .unwrap();
        }
        tx.commit().await.unwrap();
        tournament
    }

    async fn seat_count(pool: &DbPool, tournament_id: &str) -> i64 {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tournament_players WHERE tournament_id = ?")
                .bind(tournament_id)
                .fetch_one(pool)
                .await
                .unwrap();
        count
    }

    #[tokio::test]
    async fn full_tournament_takes_no_seat() {
        let pool = crate::create_test_db().await;
        // Still marked waiting, but every seat is taken.
        let tournament = seated_tournament(&pool, 2, &["rA", "rB"]).await;

        let mut tx = pool.begin().await.unwrap();
        let err = take_seat(&mut tx, &tournament.id, "late-seat", "rC", Utc::now())
            .await
            .unwrap_err();
        tx.commit().await.unwrap();

        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), FULL_MESSAGE);
        assert_eq!(seat_count(&pool, &tournament.id).await, 2);
    }

    #[tokio::test]
    async fn started_tournament_takes_no_seat() {
        let pool = crate::create_test_db().await;
        let tournament = seated_tournament(&pool, 4, &["rA"]).await;
        sqlx::query("UPDATE tournaments SET status = 'in_progress' WHERE id = ?")
            .bind(&tournament.id)
            .execute(&pool)
            .await
            .unwrap();

        let mut tx = pool.begin().await.unwrap();
        let err = take_seat(&mut tx, &tournament.id, "late-seat", "rB", Utc::now())
            .await
            .unwrap_err();
        drop(tx);

        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(seat_count(&pool, &tournament.id).await, 1);
    }

    #[tokio::test]
    async fn entry_payment_is_single_use() {
        let pool = crate::create_test_db().await;
        let tournament = seated_tournament(&pool, 2, &["rAlice"]).await;
        let now = Utc::now();

        let mut tx = pool.begin().await.unwrap();
        record_entry_payment(&mut tx, "payment-1", &request(2, 1_000_000), &tournament.id, now)
            .await
            .unwrap();
        let err = record_entry_payment(&mut tx, "payment-1", &request(2, 1_000_000), &tournament.id, now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
