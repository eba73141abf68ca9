//! Player profile and settings persistence.
//!
//! Profiles are created lazily: the first sign-in or the first read of an
//! address inserts the default rows.

use super::{
    models::{PlayerProfile, PlayerSettings},
    to_db_time, DbPool,
};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Lowest rating a player can fall to.
pub const MIN_ELO: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOutcome {
    Win,
    Loss,
    Draw,
}

impl MatchOutcome {
    fn elo_delta(&self) -> i64 {
        match self {
            MatchOutcome::Win => 1,
            MatchOutcome::Loss => -1,
            MatchOutcome::Draw => 0,
        }
    }
}

/// Partial update of the UI preferences; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub confirm_moves: Option<bool>,
    pub highlight_legal_moves: Option<bool>,
    pub auto_queen_promotion: Option<bool>,
}

pub async fn get_or_create_profile(
    pool: &DbPool,
    address: &str,
    now: DateTime<Utc>,
) -> Result<PlayerProfile> {
    let now = to_db_time(now);

    sqlx::query(
        "INSERT OR IGNORE INTO player_profiles (wallet_address, created_at, updated_at)
         VALUES (?, ?, ?)",
    )
    .bind(address)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT OR IGNORE INTO player_settings (wallet_address, created_at, updated_at)
         VALUES (?, ?, ?)",
    )
    .bind(address)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    let profile = sqlx::query_as::<_, PlayerProfile>(
        "SELECT * FROM player_profiles WHERE wallet_address = ?",
    )
    .bind(address)
    .fetch_one(pool)
    .await?;

    Ok(profile)
}

/// Apply the result of a game against the practice bot.
pub async fn record_bot_result(
    pool: &DbPool,
    address: &str,
    outcome: MatchOutcome,
    now: DateTime<Utc>,
) -> Result<PlayerProfile> {
    get_or_create_profile(pool, address, now).await?;

    let (wins, losses, draws) = counters(outcome);
    sqlx::query(
        "UPDATE player_profiles
         SET bot_elo = MAX(?, bot_elo + ?),
             bot_wins = bot_wins + ?,
             bot_losses = bot_losses + ?,
             bot_draws = bot_draws + ?,
             total_games = total_games + 1,
             updated_at = ?
         WHERE wallet_address = ?",
    )
    .bind(MIN_ELO)
    .bind(outcome.elo_delta())
    .bind(wins)
    .bind(losses)
    .bind(draws)
    .bind(to_db_time(now))
    .bind(address)
    .execute(pool)
    .await?;

    load_profile(pool, address).await
}

/// Apply the result of a tournament game.
pub async fn record_multiplayer_result(
    pool: &DbPool,
    address: &str,
    outcome: MatchOutcome,
    now: DateTime<Utc>,
) -> Result<PlayerProfile> {
    get_or_create_profile(pool, address, now).await?;

    let (wins, losses, draws) = counters(outcome);
    sqlx::query(
        "UPDATE player_profiles
         SET multiplayer_elo = MAX(?, multiplayer_elo + ?),
             multiplayer_wins = multiplayer_wins + ?,
             multiplayer_losses = multiplayer_losses + ?,
             multiplayer_draws = multiplayer_draws + ?,
             total_games = total_games + 1,
             updated_at = ?
         WHERE wallet_address = ?",
    )
    .bind(MIN_ELO)
    .bind(outcome.elo_delta())
    .bind(wins)
    .bind(losses)
    .bind(draws)
    .bind(to_db_time(now))
    .bind(address)
    .execute(pool)
    .await?;

    load_profile(pool, address).await
}

pub async fn get_settings(
    pool: &DbPool,
    address: &str,
    now: DateTime<Utc>,
) -> Result<PlayerSettings> {
    get_or_create_profile(pool, address, now).await?;

    let settings = sqlx::query_as::<_, PlayerSettings>(
        "SELECT * FROM player_settings WHERE wallet_address = ?",
    )
    .bind(address)
    .fetch_one(pool)
    .await?;

    Ok(settings)
}

pub async fn update_settings(
    pool: &DbPool,
    address: &str,
    update: &SettingsUpdate,
    now: DateTime<Utc>,
) -> Result<PlayerSettings> {
    get_or_create_profile(pool, address, now).await?;

    sqlx::query(
        "UPDATE player_settings
         SET confirm_moves = COALESCE(?, confirm_moves),
             highlight_legal_moves = COALESCE(?, highlight_legal_moves),
             auto_queen_promotion = COALESCE(?, auto_queen_promotion),
             updated_at = ?
         WHERE wallet_address = ?",
    )
    .bind(update.confirm_moves)
    .bind(update.highlight_legal_moves)
    .bind(update.auto_queen_promotion)
    .bind(to_db_time(now))
    .bind(address)
    .execute(pool)
    .await?;

    get_settings(pool, address, now).await
}

async fn load_profile(pool: &DbPool, address: &str) -> Result<PlayerProfile> {
    let profile = sqlx::query_as::<_, PlayerProfile>(
        "SELECT * FROM player_profiles WHERE wallet_address = ?",
    )
    .bind(address)
    .fetch_one(pool)
    .await?;
    Ok(profile)
}

fn counters(outcome: MatchOutcome) -> (i64, i64, i64) {
    match outcome {
        MatchOutcome::Win => (1, 0, 0),
        MatchOutcome::Loss => (0, 1, 0),
        MatchOutcome::Draw => (0, 0, 1),
    }
}
