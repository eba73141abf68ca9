use crate::{
    auth::{JwtManager, WalletUser},
    error::Result,
    game::{GameService, GameView, MoveRequest, MoveResponse},
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;

pub struct GameAppState {
    pub jwt_manager: Arc<JwtManager>,
    pub games: Arc<GameService>,
}

pub fn router() -> Router<Arc<GameAppState>> {
    Router::new()
        .route("/:id", get(get_game))
        .route("/:id/move", post(submit_move))
        .route("/:id/timeout", post(check_timeout))
        .route("/:id/resign", post(resign))
}

async fn get_game(
    State(state): State<Arc<GameAppState>>,
    Path(id): Path<String>,
) -> Result<Json<GameView>> {
    Ok(Json(state.games.get(&id, Utc::now()).await?))
}

async fn submit_move(
    State(state): State<Arc<GameAppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<MoveRequest>,
) -> Result<Json<MoveResponse>> {
    let wallet = WalletUser::from_headers(&state.jwt_manager, &headers)?;
    let response = state
        .games
        .submit_move(&id, &wallet.address, &req, Utc::now())
        .await?;
    Ok(Json(response))
}

/// Either player's client polls this while waiting; any caller may trigger
/// the resolution.
async fn check_timeout(
    State(state): State<Arc<GameAppState>>,
    Path(id): Path<String>,
) -> Result<Json<GameView>> {
    Ok(Json(state.games.check_timeout(&id, Utc::now()).await?))
}

async fn resign(
    State(state): State<Arc<GameAppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<GameView>> {
    let wallet = WalletUser::from_headers(&state.jwt_manager, &headers)?;
    Ok(Json(state.games.resign(&id, &wallet.address, Utc::now()).await?))
}
