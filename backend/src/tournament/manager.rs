//! Tournament Manager
//!
//! Single entry point for the tournament side of the backend:
//! - Matchmaking (join, leave, cleanup)
//! - Lookups for clients reconnecting to a game
//! - Forfeits
//! - Expiry of unfilled tournaments and abandoned games

use super::{
    context::TournamentContext,
    expiry::{ExpiryReport, ExpiryService},
    lifecycle::{ForfeitResponse, LifecycleService},
    matchmaking::{
        CleanupResponse, JoinOutcome, JoinRequest, LeaveResponse, MatchmakingService,
        PlayerCheck, TournamentCheck, TournamentDetails,
    },
    prizes::PayoutNotifier,
};
use crate::{db::DbPool, error::Result, game::GameService, ws::ChangeFeed};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct TournamentManager {
    matchmaking: MatchmakingService,
    lifecycle: LifecycleService,
    expiry: ExpiryService,
    games: Arc<GameService>,
}

impl TournamentManager {
    pub fn new(pool: DbPool, feed: ChangeFeed, payouts: PayoutNotifier) -> Self {
        let ctx = Arc::new(TournamentContext::new(pool, feed, payouts));
        Self {
            matchmaking: MatchmakingService::new(ctx.clone()),
            lifecycle: LifecycleService::new(ctx.clone()),
            expiry: ExpiryService::new(ctx.clone()),
            games: Arc::new(GameService::new(ctx)),
        }
    }

    /// Game operations share this manager's pool and feed.
    pub fn games(&self) -> Arc<GameService> {
        self.games.clone()
    }

    pub async fn join(&self, request: JoinRequest, now: DateTime<Utc>) -> Result<JoinOutcome> {
        self.matchmaking.join(request, now).await
    }

    pub async fn leave(
        &self,
        address: &str,
        tournament_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LeaveResponse> {
        self.matchmaking.leave(address, tournament_id, now).await
    }

    pub async fn cleanup_player(&self, address: &str, now: DateTime<Utc>) -> Result<CleanupResponse> {
        self.matchmaking.cleanup_player(address, now).await
    }

    pub async fn check_tournament(&self, tournament_id: &str) -> Result<TournamentCheck> {
        self.matchmaking.check_tournament(tournament_id).await
    }

    pub async fn details(&self, tournament_id: &str) -> Result<TournamentDetails> {
        self.matchmaking.details(tournament_id).await
    }

    pub async fn check_player(&self, address: &str, now: DateTime<Utc>) -> Result<PlayerCheck> {
        self.matchmaking.check_player(address, now).await
    }

    pub async fn forfeit(
        &self,
        tournament_id: &str,
        caller: &str,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ForfeitResponse> {
        self.lifecycle.forfeit(tournament_id, caller, reason, now).await
    }

    pub async fn expire_waiting(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.expiry.expire_waiting(now).await
    }

    pub async fn abandon_stale_games(&self, now: DateTime<Utc>) -> Result<usize> {
        self.expiry.abandon_stale_games(now).await
    }

    /// Runs both expiry passes. Called by the background task and `/expire`.
    pub async fn run_expiry_sweep(&self, now: DateTime<Utc>) -> Result<ExpiryReport> {
        self.expiry.sweep(now).await
    }
}
