use crate::{
    auth::{JwtManager, WalletUser},
    db::{
        models::{PlayerProfile, PlayerSettings},
        profiles::{self, MatchOutcome, SettingsUpdate},
        DbPool,
    },
    error::Result,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Bot strength is drawn from the player's bot rating plus or minus this.
const BOT_RANK_SPREAD: i64 = 10;
const MIN_BOT_RANK: i64 = 1;
const MAX_BOT_RANK: i64 = 1000;

pub struct ProfileAppState {
    pub pool: DbPool,
    pub jwt_manager: Arc<JwtManager>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub profile: PlayerProfile,
    pub settings: PlayerSettings,
}

#[derive(Debug, Deserialize)]
pub struct BotResultRequest {
    pub result: MatchOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotRankResponse {
    pub bot_elo: i64,
    pub bot_rank: i64,
}

pub fn router() -> Router<Arc<ProfileAppState>> {
    Router::new()
        .route("/me/settings", get(get_my_settings).put(update_my_settings))
        .route("/me/bot-result", post(record_bot_result))
        .route("/:address", get(get_profile))
        .route("/:address/bot-rank", get(get_bot_rank))
}

async fn get_profile(
    State(state): State<Arc<ProfileAppState>>,
    Path(address): Path<String>,
) -> Result<Json<ProfileResponse>> {
    let now = Utc::now();
    let profile = profiles::get_or_create_profile(&state.pool, &address, now).await?;
    let settings = profiles::get_settings(&state.pool, &address, now).await?;
    Ok(Json(ProfileResponse { profile, settings }))
}

async fn record_bot_result(
    State(state): State<Arc<ProfileAppState>>,
    headers: HeaderMap,
    Json(req): Json<BotResultRequest>,
) -> Result<Json<PlayerProfile>> {
    let wallet = WalletUser::from_headers(&state.jwt_manager, &headers)?;
    let profile =
        profiles::record_bot_result(&state.pool, &wallet.address, req.result, Utc::now()).await?;
    Ok(Json(profile))
}

async fn get_bot_rank(
    State(state): State<Arc<ProfileAppState>>,
    Path(address): Path<String>,
) -> Result<Json<BotRankResponse>> {
    let profile = profiles::get_or_create_profile(&state.pool, &address, Utc::now()).await?;
    let offset = rand::thread_rng().gen_range(-BOT_RANK_SPREAD..=BOT_RANK_SPREAD);

    Ok(Json(BotRankResponse {
        bot_elo: profile.bot_elo,
        bot_rank: bot_rank(profile.bot_elo, offset),
    }))
}

async fn get_my_settings(
    State(state): State<Arc<ProfileAppState>>,
    headers: HeaderMap,
) -> Result<Json<PlayerSettings>> {
    let wallet = WalletUser::from_headers(&state.jwt_manager, &headers)?;
    let settings = profiles::get_settings(&state.pool, &wallet.address, Utc::now()).await?;
    Ok(Json(settings))
}

async fn update_my_settings(
    State(state): State<Arc<ProfileAppState>>,
    headers: HeaderMap,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<PlayerSettings>> {
    let wallet = WalletUser::from_headers(&state.jwt_manager, &headers)?;
    let settings =
        profiles::update_settings(&state.pool, &wallet.address, &update, Utc::now()).await?;
    Ok(Json(settings))
}

fn bot_rank(bot_elo: i64, offset: i64) -> i64 {
    (bot_elo + offset).clamp(MIN_BOT_RANK, MAX_BOT_RANK)
}
