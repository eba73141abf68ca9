use crate::{
    audit,
    db::{
        models::{ResultReason, TournamentStatus},
        profiles::MatchOutcome,
    },
    error::{AppError, Result},
    game::fen::Side,
    tournament::context::{GameOutcome, Settlement, TournamentContext, TournamentResolution},
    ws::ChangeEvent,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

const DEFAULT_FORFEIT_REASON: &str = "Player forfeited";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForfeitResponse {
    pub success: bool,
    /// Set once only one player is left in the bracket.
    pub winner: Option<String>,
    pub loser: String,
    pub prize_pool: i64,
    pub currency: String,
}

pub(crate) struct LifecycleService {
    ctx: Arc<TournamentContext>,
}

impl LifecycleService {
    pub(crate) fn new(ctx: Arc<TournamentContext>) -> Self {
        Self { ctx }
    }

    /// Withdraws `caller` from an in-progress tournament. When a single
    /// opponent remains they win the pool and the running game is closed.
    pub(crate) async fn forfeit(
        &self,
        tournament_id: &str,
        caller: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ForfeitResponse> {
        let tournament = self.ctx.load_tournament(tournament_id).await?;
        if tournament.status != TournamentStatus::InProgress {
            return Err(AppError::BadRequest(
                "Tournament is not in progress".to_string(),
            ));
        }

        let players = self.ctx.load_players(tournament_id).await?;
        let Some(me) = players.iter().find(|p| p.player_address == caller) else {
            return Err(AppError::Forbidden(
                "You are not a participant in this tournament".to_string(),
            ));
        };
        if me.forfeited {
            return Err(AppError::Conflict("Already forfeited".to_string()));
        }

        let remaining: Vec<&str> = players
            .iter()
            .filter(|p| !p.forfeited && p.player_address != caller)
            .map(|p| p.player_address.as_str())
            .collect();
        let game = self.ctx.latest_game(tournament_id).await?;

        let mut tx = self.ctx.pool.begin().await?;

        let marked = sqlx::query(
            "UPDATE tournament_players SET forfeited = 1 WHERE id = ? AND forfeited = 0",
        )
        .bind(&me.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if marked == 0 {
            tx.rollback().await?;
            return Err(AppError::Conflict("Already forfeited".to_string()));
        }

        let mut settlement = None;
        if let [winner] = remaining.as_slice() {
            let mut game_id = None;
            let open_game = game
                .as_ref()
                .filter(|g| !g.status.is_terminal() && g.is_player(caller));
            if let Some(game) = open_game {
                let winner_side = if game.player_white == *winner {
                    Side::White
                } else {
                    Side::Black
                };
                let outcome = GameOutcome::Decisive {
                    winner: winner_side,
                    reason: ResultReason::Forfeit,
                };
                if TournamentContext::close_game_tx(&mut tx, game, outcome, now).await? {
                    game_id = Some(game.id.clone());
                }
            }

            let resolution = TournamentResolution::Won {
                winner: winner.to_string(),
                forfeit_reason: Some(
                    reason
                        .clone()
                        .filter(|r| !r.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_FORFEIT_REASON.to_string()),
                ),
            };
            let prizes = TournamentContext::close_tournament_tx(
                &mut tx,
                &tournament,
                &resolution,
                &[],
                "forfeit",
                now,
            )
            .await?;

            let Some(prizes) = prizes else {
                tx.rollback().await?;
                return Err(AppError::Conflict(
                    "Tournament finished while the forfeit was submitted".to_string(),
                ));
            };

            settlement = Some(Settlement {
                tournament_id: tournament.id.clone(),
                game_id,
                winner: Some(winner.to_string()),
                prizes,
                results: vec![
                    (winner.to_string(), MatchOutcome::Win),
                    (caller.to_string(), MatchOutcome::Loss),
                ],
            });
        }

        tx.commit().await?;

        audit::log_tournament_event(
            tournament_id,
            "forfeit",
            &format!("{} ({})", caller, reason.as_deref().unwrap_or(DEFAULT_FORFEIT_REASON)),
        );

        let winner = match &settlement {
            Some(settlement) => {
                if let Some(game_id) = &settlement.game_id {
                    audit::log_game_result(
                        game_id,
                        ResultReason::Forfeit.as_str(),
                        settlement.winner.as_deref(),
                    );
                }
                self.ctx.after_settlement(settlement, now).await;
                settlement.winner.clone()
            }
            None => {
                self.ctx
                    .publish_tournament(tournament_id, ChangeEvent::Update)
                    .await;
                None
            }
        };

        let mut me = me.clone();
        me.forfeited = true;
        self.ctx.publish_player(&me, ChangeEvent::Update);

        Ok(ForfeitResponse {
            success: true,
            winner,
            loser: caller.to_string(),
            prize_pool: tournament.prize_pool,
            currency: tournament.currency,
        })
    }
}

