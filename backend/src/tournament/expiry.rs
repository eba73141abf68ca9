//! Time-based cleanup: waiting tournaments that never filled, and games
//! nobody is playing any more.

use crate::{
    audit,
    db::{
        models::{Game, ResultReason},
        to_db_time,
    },
    error::Result,
    tournament::{
        context::{GameOutcome, TournamentContext},
        matchmaking::STALE_GAME_MINS,
    },
    ws::ChangeEvent,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

pub const EXPIRED_REASON: &str = "Tournament expired after 10 minutes";

/// How often the background sweep runs.
pub const EXPIRY_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryReport {
    pub success: bool,
    pub message: String,
    pub expired: usize,
    pub tournament_ids: Vec<String>,
    pub abandoned_games: usize,
}

pub(crate) struct ExpiryService {
    ctx: Arc<TournamentContext>,
}

impl ExpiryService {
    pub(crate) fn new(ctx: Arc<TournamentContext>) -> Self {
        Self { ctx }
    }

    /// Expires every waiting tournament whose deadline has passed and drops
    /// its registrations.
    pub(crate) async fn expire_waiting(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let due: Vec<(String,)> = sqlx::query_as(
            "SELECT id FROM tournaments WHERE status = 'waiting' AND expires_at <= ?",
        )
        .bind(to_db_time(now))
        .fetch_all(&self.ctx.pool)
        .await?;

        let mut expired = Vec::new();
        for (tournament_id,) in due {
            let mut tx = self.ctx.pool.begin().await?;

            let rows = sqlx::query(
                "UPDATE tournaments SET status = 'expired', cancelled_reason = ?, completed_at = ?
                 WHERE id = ? AND status = 'waiting'",
            )
            .bind(EXPIRED_REASON)
            .bind(to_db_time(now))
            .bind(&tournament_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if rows == 0 {
                // Filled or cancelled since the scan.
                tx.rollback().await?;
                continue;
            }

            sqlx::query("DELETE FROM tournament_players WHERE tournament_id = ?")
                .bind(&tournament_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            audit::log_tournament_event(&tournament_id, "expired", EXPIRED_REASON);
            self.ctx
                .publish_tournament(&tournament_id, ChangeEvent::Update)
                .await;
            expired.push(tournament_id);
        }

        Ok(expired)
    }

    /// Closes in-progress games older than the stale threshold. Their
    /// tournaments are cancelled without a payout.
    pub(crate) async fn abandon_stale_games(&self, now: DateTime<Utc>) -> Result<usize> {
        let stale_before = to_db_time(now - Duration::minutes(STALE_GAME_MINS));
        let stale = sqlx::query_as::<_, Game>(
            "SELECT * FROM tournament_games WHERE status = 'in_progress' AND created_at < ?",
        )
        .bind(stale_before)
        .fetch_all(&self.ctx.pool)
        .await?;

        let mut abandoned = 0;
        for game in stale {
            let outcome = GameOutcome::Voided {
                reason: ResultReason::Abandoned,
            };
            match self.ctx.finish_game(&game, outcome, now).await {
                Ok(Some(_)) => abandoned += 1,
                Ok(None) => {}
                Err(e) => tracing::warn!("Could not abandon game {}: {:?}", game.id, e),
            }
        }

        Ok(abandoned)
    }

    pub(crate) async fn sweep(&self, now: DateTime<Utc>) -> Result<ExpiryReport> {
        let tournament_ids = self.expire_waiting(now).await?;
        let abandoned_games = self.abandon_stale_games(now).await?;

        if !tournament_ids.is_empty() || abandoned_games > 0 {
            tracing::info!(
                "Expiry sweep: {} tournament(s) expired, {} game(s) abandoned",
                tournament_ids.len(),
                abandoned_games
            );
        }

        let message = if tournament_ids.is_empty() {
            "No expired tournaments".to_string()
        } else {
            format!("Expired {} tournament(s)", tournament_ids.len())
        };

        Ok(ExpiryReport {
            success: true,
            message,
            expired: tournament_ids.len(),
            tournament_ids,
            abandoned_games,
        })
    }
}
