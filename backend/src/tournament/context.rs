use crate::{
    audit,
    db::{
        models::{
            Game, GameResult, GameStatus, PrizeDistribution, ResultReason, Tournament,
            TournamentPlayer,
        },
        profiles::{self, MatchOutcome},
        to_db_time, DbPool,
    },
    error::{AppError, Result},
    game::fen::Side,
    tournament::prizes::{prize_rows, PayoutNotifier},
    ws::{ChangeEvent, ChangeFeed, FeedTable},
};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

/// How a game (and with it, its tournament) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Decisive { winner: Side, reason: ResultReason },
    Drawn { reason: ResultReason },
    /// Nobody wins and nothing is paid out.
    Voided { reason: ResultReason },
}

impl GameOutcome {
    pub fn reason(&self) -> ResultReason {
        match self {
            GameOutcome::Decisive { reason, .. }
            | GameOutcome::Drawn { reason }
            | GameOutcome::Voided { reason } => *reason,
        }
    }

    fn game_status(&self) -> GameStatus {
        match self {
            GameOutcome::Voided {
                reason: ResultReason::FirstMoveTimeout,
            } => GameStatus::Cancelled,
            _ => GameStatus::Completed,
        }
    }

    fn result(&self) -> Option<GameResult> {
        match self {
            GameOutcome::Decisive { winner, .. } => Some(winner.as_result()),
            GameOutcome::Drawn { .. } => Some(GameResult::Tie),
            GameOutcome::Voided { .. } => None,
        }
    }
}

/// The tournament-level consequence of a finished game or a forfeit.
#[derive(Debug, Clone)]
pub(crate) enum TournamentResolution {
    Won {
        winner: String,
        forfeit_reason: Option<String>,
    },
    Tied,
    Cancelled {
        reason: String,
    },
}

/// Everything that changed when a tournament resolved. Side effects that
/// must not roll back the result (stats, feed, payout) run from this.
#[derive(Debug, Clone, Default)]
pub struct Settlement {
    pub tournament_id: String,
    pub game_id: Option<String>,
    pub winner: Option<String>,
    pub prizes: Vec<PrizeDistribution>,
    pub(crate) results: Vec<(String, MatchOutcome)>,
}

pub(crate) struct TournamentContext {
    pub(crate) pool: DbPool,
    pub(crate) feed: ChangeFeed,
    pub(crate) payouts: PayoutNotifier,
}

impl TournamentContext {
    pub(crate) fn new(pool: DbPool, feed: ChangeFeed, payouts: PayoutNotifier) -> Self {
        Self {
            pool,
            feed,
            payouts,
        }
    }

    pub(crate) async fn find_tournament(&self, tournament_id: &str) -> Result<Option<Tournament>> {
        let tournament = sqlx::query_as::<_, Tournament>("SELECT * FROM tournaments WHERE id = ?")
            .bind(tournament_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tournament)
    }

    pub(crate) async fn load_tournament(&self, tournament_id: &str) -> Result<Tournament> {
        self.find_tournament(tournament_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Tournament not found".to_string()))
    }

    pub(crate) async fn load_players(&self, tournament_id: &str) -> Result<Vec<TournamentPlayer>> {
        let players = sqlx::query_as::<_, TournamentPlayer>(
            "SELECT * FROM tournament_players WHERE tournament_id = ? ORDER BY player_order",
        )
        .bind(tournament_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(players)
    }

    pub(crate) async fn find_game(&self, game_id: &str) -> Result<Option<Game>> {
        let game = sqlx::query_as::<_, Game>("SELECT * FROM tournament_games WHERE id = ?")
            .bind(game_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(game)
    }

    /// The running game of a tournament, or its most recent one.
    pub(crate) async fn latest_game(&self, tournament_id: &str) -> Result<Option<Game>> {
        let game = sqlx::query_as::<_, Game>(
            "SELECT * FROM tournament_games WHERE tournament_id = ?
             ORDER BY CASE WHEN status IN ('pending', 'in_progress') THEN 0 ELSE 1 END,
                      created_at DESC
             LIMIT 1",
        )
        .bind(tournament_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(game)
    }

    pub(crate) async fn count_players(&self, tournament_id: &str) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tournament_players WHERE tournament_id = ?")
                .bind(tournament_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Change feed
    // ------------------------------------------------------------------

    pub(crate) async fn publish_tournament(&self, tournament_id: &str, event: ChangeEvent) {
        match self.find_tournament(tournament_id).await {
            Ok(Some(tournament)) => self.feed.publish_row(
                FeedTable::Tournaments,
                event,
                &tournament.id,
                Some(&tournament.id),
                &tournament,
            ),
            Ok(None) => {}
            Err(e) => tracing::warn!("Could not publish tournament {}: {:?}", tournament_id, e),
        }
    }

    pub(crate) async fn publish_game(&self, game_id: &str, event: ChangeEvent) {
        match self.find_game(game_id).await {
            Ok(Some(game)) => self.feed.publish_row(
                FeedTable::TournamentGames,
                event,
                &game.id,
                Some(&game.tournament_id),
                &game,
            ),
            Ok(None) => {}
            Err(e) => tracing::warn!("Could not publish game {}: {:?}", game_id, e),
        }
    }

    pub(crate) fn publish_player(&self, player: &TournamentPlayer, event: ChangeEvent) {
        self.feed.publish_row(
            FeedTable::TournamentPlayers,
            event,
            &player.id,
            Some(&player.tournament_id),
            player,
        );
    }

    // ------------------------------------------------------------------
    // Terminal transitions
    // ------------------------------------------------------------------

    /// Writes the final state of `game` (position, clocks and result) if it
    /// is still active. Returns false when another request got there first.
    pub(crate) async fn close_game_tx(
        tx: &mut Transaction<'_, Sqlite>,
        game: &Game,
        outcome: GameOutcome,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let now = to_db_time(now);
        let winner = match outcome {
            GameOutcome::Decisive { winner, .. } => Some(match winner {
                Side::White => game.player_white.as_str(),
                Side::Black => game.player_black.as_str(),
            }),
            _ => None,
        };

        let rows = sqlx::query(
            "UPDATE tournament_games
             SET board_fen = ?, moves = ?, white_time_ms = ?, black_time_ms = ?,
                 turn_started_at = ?, first_move_made = ?,
                 status = ?, result_reason = ?, result = ?, winner = ?,
                 completed_at = ?, updated_at = ?
             WHERE id = ? AND status IN ('pending', 'in_progress')",
        )
        .bind(&game.board_fen)
        .bind(&game.moves)
        .bind(game.white_time_ms)
        .bind(game.black_time_ms)
        .bind(&game.turn_started_at)
        .bind(game.first_move_made)
        .bind(outcome.game_status())
        .bind(outcome.reason())
        .bind(outcome.result())
        .bind(winner)
        .bind(&now)
        .bind(&now)
        .bind(&game.id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        Ok(rows == 1)
    }

    /// Closes an in-progress tournament and records the prizes it owes.
    /// Returns the prize rows, or `None` if the tournament was already closed.
    pub(crate) async fn close_tournament_tx(
        tx: &mut Transaction<'_, Sqlite>,
        tournament: &Tournament,
        resolution: &TournamentResolution,
        tied_players: &[String],
        distribution_type: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<PrizeDistribution>>> {
        let at = to_db_time(now);

        let rows = match resolution {
            TournamentResolution::Won {
                winner,
                forfeit_reason,
            } => sqlx::query(
                "UPDATE tournaments
                 SET status = 'completed', winner = ?, forfeit_reason = ?, completed_at = ?
                 WHERE id = ? AND status = 'in_progress'",
            )
            .bind(winner)
            .bind(forfeit_reason)
            .bind(&at)
            .bind(&tournament.id)
            .execute(&mut **tx)
            .await?
            .rows_affected(),
            TournamentResolution::Tied => sqlx::query(
                "UPDATE tournaments SET status = 'completed', completed_at = ?
                 WHERE id = ? AND status = 'in_progress'",
            )
            .bind(&at)
            .bind(&tournament.id)
            .execute(&mut **tx)
            .await?
            .rows_affected(),
            TournamentResolution::Cancelled { reason } => sqlx::query(
                "UPDATE tournaments SET status = 'cancelled', cancelled_reason = ?, completed_at = ?
                 WHERE id = ? AND status = 'in_progress'",
            )
            .bind(reason)
            .bind(&at)
            .bind(&tournament.id)
            .execute(&mut **tx)
            .await?
            .rows_affected(),
        };

        if rows == 0 {
            return Ok(None);
        }

        let winners: Vec<String> = match resolution {
            TournamentResolution::Won { winner, .. } => vec![winner.clone()],
            TournamentResolution::Tied => tied_players.to_vec(),
            TournamentResolution::Cancelled { .. } => Vec::new(),
        };

        if let TournamentResolution::Won { winner, .. } = resolution {
            sqlx::query(
                "UPDATE tournament_players SET is_winner = 1
                 WHERE tournament_id = ? AND player_address = ?",
            )
            .bind(&tournament.id)
            .bind(winner)
            .execute(&mut **tx)
            .await?;
        }

        let prizes = prize_rows(tournament, &winners, distribution_type, now);
        for prize in &prizes {
            sqlx::query(
                "INSERT INTO prize_distributions
                 (id, tournament_id, winner_address, amount, currency, issuer, status, distribution_type, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&prize.id)
            .bind(&prize.tournament_id)
            .bind(&prize.winner_address)
            .bind(prize.amount)
            .bind(&prize.currency)
            .bind(&prize.issuer)
            .bind(&prize.status)
            .bind(&prize.distribution_type)
            .bind(&prize.created_at)
            .execute(&mut **tx)
            .await?;
        }

        Ok(Some(prizes))
    }

    /// Ends `game` with `outcome` and resolves its tournament in one
    /// transaction. `game` carries the final position and clocks.
    /// Returns `None` if the game had already finished.
    pub(crate) async fn finish_game(
        &self,
        game: &Game,
        outcome: GameOutcome,
        now: DateTime<Utc>,
    ) -> Result<Option<Settlement>> {
        let tournament = self.load_tournament(&game.tournament_id).await?;
        let mut tx = self.pool.begin().await?;

        if !Self::close_game_tx(&mut tx, game, outcome, now).await? {
            tx.rollback().await?;
            return Ok(None);
        }

        let players = [game.player_white.clone(), game.player_black.clone()];
        let (resolution, results) = match outcome {
            GameOutcome::Decisive { winner, .. } => {
                let (winner, loser) = match winner {
                    Side::White => (&game.player_white, &game.player_black),
                    Side::Black => (&game.player_black, &game.player_white),
                };
                (
                    TournamentResolution::Won {
                        winner: winner.clone(),
                        forfeit_reason: None,
                    },
                    vec![
                        (winner.clone(), MatchOutcome::Win),
                        (loser.clone(), MatchOutcome::Loss),
                    ],
                )
            }
            GameOutcome::Drawn { .. } => (
                TournamentResolution::Tied,
                players
                    .iter()
                    .map(|p| (p.clone(), MatchOutcome::Draw))
                    .collect(),
            ),
            GameOutcome::Voided { reason } => (
                TournamentResolution::Cancelled {
                    reason: voided_reason(reason).to_string(),
                },
                Vec::new(),
            ),
        };

        let prizes = Self::close_tournament_tx(
            &mut tx,
            &tournament,
            &resolution,
            &players,
            outcome.reason().as_str(),
            now,
        )
        .await?
        .unwrap_or_default();

        tx.commit().await?;

        let winner = match &resolution {
            TournamentResolution::Won { winner, .. } => Some(winner.clone()),
            _ => None,
        };
        audit::log_game_result(&game.id, outcome.reason().as_str(), winner.as_deref());

        let settlement = Settlement {
            tournament_id: tournament.id.clone(),
            game_id: Some(game.id.clone()),
            winner,
            prizes,
            results,
        };
        self.after_settlement(&settlement, now).await;
        Ok(Some(settlement))
    }

    /// Post-commit effects of a resolution. Failures here are logged only.
    pub(crate) async fn after_settlement(&self, settlement: &Settlement, now: DateTime<Utc>) {
        for (address, outcome) in &settlement.results {
            match profiles::record_multiplayer_result(&self.pool, address, *outcome, now).await {
                Ok(profile) => self.feed.publish_row(
                    FeedTable::PlayerProfiles,
                    ChangeEvent::Update,
                    &profile.wallet_address,
                    None,
                    &profile,
                ),
                Err(e) => tracing::warn!("Failed to update stats for {}: {:?}", address, e),
            }
        }

        for prize in &settlement.prizes {
            audit::log_prize(
                &prize.tournament_id,
                &prize.winner_address,
                prize.amount,
                &prize.currency,
            );
        }

        if let Some(game_id) = &settlement.game_id {
            self.publish_game(game_id, ChangeEvent::Update).await;
        }
        self.publish_tournament(&settlement.tournament_id, ChangeEvent::Update)
            .await;

        self.payouts.notify(&settlement.prizes);
    }
}

fn voided_reason(reason: ResultReason) -> &'static str {
    match reason {
        ResultReason::FirstMoveTimeout => "White did not move in time",
        ResultReason::Abandoned => "Game abandoned",
        _ => "Game cancelled",
    }
}
