use super::{
    clock::{self, ClockSnapshot, ClockStatus},
    constants::{INITIAL_CLOCK_MS, MAX_MOVE_LEN, STARTING_FEN},
    error::GameError,
    fen::{self, Side},
};
use crate::{
    db::{
        models::{Game, GameStatus, ResultReason},
        to_db_time,
    },
    error::{AppError, Result},
    tournament::context::{GameOutcome, TournamentContext},
    ws::ChangeEvent,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, Transaction};
use std::sync::Arc;

/// Terminal condition detected by the moving client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientOutcome {
    Checkmate,
    Stalemate,
    Draw,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MoveRequest {
    #[serde(rename = "move")]
    pub mv: String,
    pub fen: String,
    #[serde(default)]
    pub outcome: Option<ClientOutcome>,
}

/// A game row plus derived live state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub game: Game,
    pub move_list: Vec<String>,
    pub side_to_move: &'static str,
    pub clock: ClockSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResponse {
    /// False when the mover's time had already run out.
    pub accepted: bool,
    #[serde(flatten)]
    pub view: GameView,
}

pub struct GameService {
    ctx: Arc<TournamentContext>,
}

impl GameService {
    pub(crate) fn new(ctx: Arc<TournamentContext>) -> Self {
        Self { ctx }
    }

    /// Inserts the opening game of a filled two-player tournament.
    pub(crate) async fn create_in_tx(
        tx: &mut Transaction<'_, Sqlite>,
        tournament_id: &str,
        white: &str,
        black: &str,
        now: DateTime<Utc>,
    ) -> Result<Game> {
        let game = Game::new(
            tournament_id.to_string(),
            white.to_string(),
            black.to_string(),
            STARTING_FEN,
            INITIAL_CLOCK_MS,
            now,
        );

        sqlx::query(
            "INSERT INTO tournament_games (
                id, tournament_id, player_white, player_black, board_fen, moves,
                white_time_ms, black_time_ms, turn_started_at, first_move_made,
                status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&game.id)
        .bind(&game.tournament_id)
        .bind(&game.player_white)
        .bind(&game.player_black)
        .bind(&game.board_fen)
        .bind(&game.moves)
        .bind(game.white_time_ms)
        .bind(game.black_time_ms)
        .bind(&game.turn_started_at)
        .bind(game.first_move_made)
        .bind(game.status)
        .bind(&game.created_at)
        .bind(&game.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(game)
    }

    async fn load(&self, game_id: &str) -> Result<Game> {
        self.ctx
            .find_game(game_id)
            .await?
            .ok_or_else(|| GameError::GameNotFound.into())
    }

    fn view(game: Game, now: DateTime<Utc>) -> GameView {
        let clock = clock::snapshot(&game, now);
        GameView {
            move_list: game.move_list(),
            side_to_move: clock.side_to_move.as_str(),
            clock,
            game,
        }
    }

    pub async fn get(&self, game_id: &str, now: DateTime<Utc>) -> Result<GameView> {
        let game = self.load(game_id).await?;
        Ok(Self::view(game, now))
    }

    pub async fn submit_move(
        &self,
        game_id: &str,
        caller: &str,
        request: &MoveRequest,
        now: DateTime<Utc>,
    ) -> Result<MoveResponse> {
        let game = self.load(game_id).await?;

        if !game.is_player(caller) {
            return Err(GameError::NotAParticipant.into());
        }
        if game.status != GameStatus::InProgress {
            return Err(GameError::GameNotInProgress.into());
        }

        let mover = clock::side_to_move(&game);
        let mover_address = match mover {
            Side::White => &game.player_white,
            Side::Black => &game.player_black,
        };
        if mover_address.as_str() != caller {
            return Err(GameError::NotYourTurn.into());
        }

        let mv = request.mv.trim();
        if mv.is_empty() || mv.len() > MAX_MOVE_LEN || mv.contains(char::is_whitespace) {
            return Err(GameError::InvalidMove {
                reason: "move must be a short non-empty token".to_string(),
            }
            .into());
        }
        let position = fen::parse(&request.fen)?;
        if position.side_to_move != mover.opposite() {
            return Err(GameError::TurnDidNotPass.into());
        }

        // A move that arrives after the flag fell resolves the game instead.
        match clock::status(&game, now) {
            ClockStatus::Running => {}
            expired => {
                let view = self.resolve_expired(game, expired, now).await?;
                return Ok(MoveResponse {
                    accepted: false,
                    view,
                });
            }
        }

        let previous_fen = game.board_fen.clone();
        let mut next = game;
        if next.first_move_made {
            let elapsed = clock::snapshot(&next, now);
            match mover {
                Side::White => next.white_time_ms = elapsed.white_ms,
                Side::Black => next.black_time_ms = elapsed.black_ms,
            }
        }
        let mut moves = next.move_list();
        moves.push(mv.to_string());
        next.moves = serde_json::to_string(&moves).map_err(anyhow::Error::from)?;
        next.board_fen = request.fen.trim().to_string();
        next.turn_started_at = to_db_time(now);
        next.first_move_made = true;

        if let Some(outcome) = request.outcome {
            let outcome = match outcome {
                ClientOutcome::Checkmate => GameOutcome::Decisive {
                    winner: mover,
                    reason: ResultReason::Checkmate,
                },
                ClientOutcome::Stalemate => material_outcome(&position.material, ResultReason::Stalemate),
                ClientOutcome::Draw => material_outcome(&position.material, ResultReason::Draw),
            };

            if self.ctx.finish_game(&next, outcome, now).await?.is_none() {
                return Err(GameError::GameNotInProgress.into());
            }
            let view = self.get(game_id, now).await?;
            return Ok(MoveResponse {
                accepted: true,
                view,
            });
        }

        let rows = sqlx::query(
            "UPDATE tournament_games
             SET board_fen = ?, moves = ?, white_time_ms = ?, black_time_ms = ?,
                 turn_started_at = ?, first_move_made = 1, updated_at = ?
             WHERE id = ? AND status = 'in_progress' AND board_fen = ?",
        )
        .bind(&next.board_fen)
        .bind(&next.moves)
        .bind(next.white_time_ms)
        .bind(next.black_time_ms)
        .bind(&next.turn_started_at)
        .bind(to_db_time(now))
        .bind(&next.id)
        .bind(&previous_fen)
        .execute(&self.ctx.pool)
        .await?
        .rows_affected();

        if rows == 0 {
            return Err(AppError::Conflict(
                "Game changed while the move was submitted, please refresh".to_string(),
            ));
        }

        tracing::debug!("Game {}: {} played {}", next.id, mover.as_str(), mv);
        self.ctx.publish_game(&next.id, ChangeEvent::Update).await;

        let view = self.get(game_id, now).await?;
        Ok(MoveResponse {
            accepted: true,
            view,
        })
    }

    /// Resolves the game if the side to move has run out of time. Safe to
    /// call repeatedly; only the first caller changes anything.
    pub async fn check_timeout(&self, game_id: &str, now: DateTime<Utc>) -> Result<GameView> {
        let game = self.load(game_id).await?;
        if game.status != GameStatus::InProgress {
            return Ok(Self::view(game, now));
        }

        match clock::status(&game, now) {
            ClockStatus::Running => Ok(Self::view(game, now)),
            expired => self.resolve_expired(game, expired, now).await,
        }
    }

    pub async fn resign(&self, game_id: &str, caller: &str, now: DateTime<Utc>) -> Result<GameView> {
        let game = self.load(game_id).await?;

        let loser = if game.player_white == caller {
            Side::White
        } else if game.player_black == caller {
            Side::Black
        } else {
            return Err(GameError::NotAParticipant.into());
        };
        if game.status != GameStatus::InProgress {
            return Err(GameError::GameNotInProgress.into());
        }

        let mut last = game;
        let clocks = clock::snapshot(&last, now);
        last.white_time_ms = clocks.white_ms;
        last.black_time_ms = clocks.black_ms;

        let outcome = GameOutcome::Decisive {
            winner: loser.opposite(),
            reason: ResultReason::Resignation,
        };
        if self.ctx.finish_game(&last, outcome, now).await?.is_none() {
            return Err(GameError::GameNotInProgress.into());
        }

        self.get(game_id, now).await
    }

    /// Applies the timeout check to every running game. Returns how many
    /// were resolved.
    pub async fn sweep_clocks(&self, now: DateTime<Utc>) -> Result<usize> {
        let ids: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM tournament_games WHERE status = 'in_progress'")
                .fetch_all(&self.ctx.pool)
                .await?;

        let mut resolved = 0;
        for (id,) in ids {
            match self.check_timeout(&id, now).await {
                Ok(view) if view.game.status.is_terminal() => resolved += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!("Clock sweep failed for game {}: {:?}", id, e),
            }
        }

        if resolved > 0 {
            tracing::info!("Clock sweep resolved {} game(s)", resolved);
        }
        Ok(resolved)
    }

    async fn resolve_expired(
        &self,
        mut game: Game,
        status: ClockStatus,
        now: DateTime<Utc>,
    ) -> Result<GameView> {
        let outcome = match status {
            ClockStatus::Running => return Ok(Self::view(game, now)),
            ClockStatus::FirstMoveExpired => GameOutcome::Voided {
                reason: ResultReason::FirstMoveTimeout,
            },
            ClockStatus::Flagged(side) => {
                match side {
                    Side::White => game.white_time_ms = 0,
                    Side::Black => game.black_time_ms = 0,
                }
                GameOutcome::Decisive {
                    winner: side.opposite(),
                    reason: ResultReason::Timeout,
                }
            }
        };

        let game_id = game.id.clone();
        self.ctx.finish_game(&game, outcome, now).await?;
        self.get(&game_id, now).await
    }
}

/// Stalemates and agreed draws go to whoever has more material on the board.
fn material_outcome(
    material: &super::material::MaterialCount,
    reason: ResultReason,
) -> GameOutcome {
    match material.leader() {
        Some(winner) => GameOutcome::Decisive { winner, reason },
        None => GameOutcome::Drawn { reason },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::material::MaterialCount;

    #[test]
    fn material_decides_stalemates() {
        let ahead = MaterialCount { white: 10, black: 8 };
        assert_eq!(
            material_outcome(&ahead, ResultReason::Stalemate),
            GameOutcome::Decisive {
                winner: Side::White,
                reason: ResultReason::Stalemate
            }
        );

        let level = MaterialCount { white: 3, black: 3 };
        assert_eq!(
            material_outcome(&level, ResultReason::Draw),
            GameOutcome::Drawn {
                reason: ResultReason::Draw
            }
        );
    }

    #[test]
    fn move_request_reads_client_field_names() {
        let req: MoveRequest = serde_json::from_str(
            r#"{"move":"e4","fen":"rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"}"#,
        )
        .unwrap();
        assert_eq!(req.mv, "e4");
        assert!(req.outcome.is_none());
    }
}
