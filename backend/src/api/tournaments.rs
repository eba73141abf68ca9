use crate::{
    audit,
    auth::{JwtManager, WalletUser},
    config::Config,
    error::{AppError, Result},
    tournament::{
        expiry::ExpiryReport,
        lifecycle::ForfeitResponse,
        manager::TournamentManager,
        matchmaking::{
            CleanupResponse, JoinOutcome, JoinRequest, LeaveResponse, PlayerCheck,
            TournamentCheck, TournamentDetails,
        },
    },
    xaman::{payload::xah_to_drops, EntryPayment, XamanClient},
};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

// ==================== Request Types ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTournamentRequest {
    pub player_address: Option<String>,
    pub tournament_size: Option<i64>,
    /// Decimal amount of `currency`, as shown to the player.
    pub entry_fee: Option<f64>,
    pub currency: Option<String>,
    pub issuer: Option<String>,
    pub payment_uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveTournamentRequest {
    pub player_address: Option<String>,
    pub tournament_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRequest {
    pub player_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForfeitRequest {
    pub player_address: Option<String>,
    pub tournament_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckTournamentQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckPlayerQuery {
    pub address: Option<String>,
}

// ==================== AppState ====================

pub struct TournamentAppState {
    pub jwt_manager: Arc<JwtManager>,
    pub tournaments: Arc<TournamentManager>,
    pub xaman: XamanClient,
    pub config: Config,
}

// ==================== Router ====================

pub fn router() -> Router<Arc<TournamentAppState>> {
    Router::new()
        .route("/join", post(join_tournament))
        .route("/leave", post(leave_tournament))
        .route("/cleanup", post(cleanup_player))
        .route("/forfeit", post(forfeit_tournament))
        .route("/expire", post(expire_tournaments).get(expire_tournaments_cron))
        .route("/check-tournament", get(check_tournament))
        .route("/check-player", get(check_player))
        .route("/:id", get(get_tournament_details))
}

// ==================== Handlers ====================

async fn join_tournament(
    State(state): State<Arc<TournamentAppState>>,
    headers: HeaderMap,
    Json(req): Json<JoinTournamentRequest>,
) -> Result<Response> {
    let (Some(player_address), Some(tournament_size), Some(entry_fee), Some(currency)) = (
        non_empty(req.player_address),
        req.tournament_size,
        req.entry_fee,
        non_empty(req.currency),
    ) else {
        return Err(AppError::Validation("Missing required fields".to_string()));
    };

    let wallet = WalletUser::from_headers(&state.jwt_manager, &headers)?;
    wallet.ensure_is(&player_address)?;

    let entry_fee = xah_to_drops(entry_fee)
        .map_err(|_| AppError::Validation("Entry fee must be positive".to_string()))?;

    let issuer = non_empty(req.issuer);
    let payment_uuid = non_empty(req.payment_uuid);
    if let Some(payment_uuid) = &payment_uuid {
        let network = state.config.xahau.network;
        let destination = state.config.xahau.hook_address(network).ok_or_else(|| {
            AppError::Upstream(format!("no Hook address configured for {}", network))
        })?;

        let payment = state.xaman.get_payload(payment_uuid).await?;
        let expected = EntryPayment {
            payer: &player_address,
            destination,
            amount: entry_fee,
            currency: &currency,
            issuer: issuer.as_deref(),
        };
        if let Err(mismatch) = payment.check_entry_payment(&expected) {
            audit::log_security_event(
                &player_address,
                "payment_mismatch",
                &format!("payload {}: {}", payment_uuid, mismatch),
            );
            return Err(AppError::Forbidden(format!(
                "Entry payment rejected: {}",
                mismatch
            )));
        }
    }

    let request = JoinRequest {
        player_address,
        tournament_size,
        entry_fee,
        currency,
        issuer,
        payment_uuid,
    };

    match state.tournaments.join(request, Utc::now()).await? {
        JoinOutcome::Joined(response) => Ok(Json(response).into_response()),
        JoinOutcome::AlreadyActive {
            tournament_id,
            status,
        } => Ok((
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "error": "Already in an active tournament",
                "tournamentId": tournament_id,
                "status": status,
            })),
        )
            .into_response()),
    }
}

async fn leave_tournament(
    State(state): State<Arc<TournamentAppState>>,
    headers: HeaderMap,
    Json(req): Json<LeaveTournamentRequest>,
) -> Result<Json<LeaveResponse>> {
    let (Some(player_address), Some(tournament_id)) =
        (non_empty(req.player_address), non_empty(req.tournament_id))
    else {
        return Err(AppError::Validation("Missing required fields".to_string()));
    };

    let wallet = WalletUser::from_headers(&state.jwt_manager, &headers)?;
    wallet.ensure_is(&player_address)?;

    let response = state
        .tournaments
        .leave(&player_address, &tournament_id, Utc::now())
        .await?;
    Ok(Json(response))
}

async fn cleanup_player(
    State(state): State<Arc<TournamentAppState>>,
    headers: HeaderMap,
    Json(req): Json<CleanupRequest>,
) -> Result<Json<CleanupResponse>> {
    let player_address = non_empty(req.player_address)
        .ok_or_else(|| AppError::Validation("Missing player address".to_string()))?;

    let wallet = WalletUser::from_headers(&state.jwt_manager, &headers)?;
    wallet.ensure_is(&player_address)?;

    let response = state
        .tournaments
        .cleanup_player(&player_address, Utc::now())
        .await?;
    Ok(Json(response))
}

async fn forfeit_tournament(
    State(state): State<Arc<TournamentAppState>>,
    headers: HeaderMap,
    Json(req): Json<ForfeitRequest>,
) -> Result<Json<ForfeitResponse>> {
    let (Some(player_address), Some(tournament_id)) =
        (non_empty(req.player_address), non_empty(req.tournament_id))
    else {
        return Err(AppError::Validation("Missing required fields".to_string()));
    };

    let wallet = WalletUser::from_headers(&state.jwt_manager, &headers)?;
    wallet.ensure_is(&player_address)?;

    let response = state
        .tournaments
        .forfeit(&tournament_id, &player_address, req.reason, Utc::now())
        .await?;
    Ok(Json(response))
}

/// Opportunistic sweep triggered by clients visiting the waiting room.
async fn expire_tournaments(
    State(state): State<Arc<TournamentAppState>>,
) -> Result<Json<ExpiryReport>> {
    let report = state.tournaments.run_expiry_sweep(Utc::now()).await?;
    Ok(Json(report))
}

/// Scheduled sweep. Requires the cron secret when one is configured.
async fn expire_tournaments_cron(
    State(state): State<Arc<TournamentAppState>>,
    headers: HeaderMap,
) -> Result<Json<ExpiryReport>> {
    if let Some(secret) = &state.config.cron_secret {
        let presented = headers
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));
        if presented != Some(secret.as_str()) {
            return Err(AppError::Unauthorized);
        }
    }

    let report = state.tournaments.run_expiry_sweep(Utc::now()).await?;
    Ok(Json(report))
}

async fn check_tournament(
    State(state): State<Arc<TournamentAppState>>,
    Query(query): Query<CheckTournamentQuery>,
) -> Result<Json<TournamentCheck>> {
    let id = non_empty(query.id)
        .ok_or_else(|| AppError::Validation("Missing tournament id".to_string()))?;
    Ok(Json(state.tournaments.check_tournament(&id).await?))
}

async fn check_player(
    State(state): State<Arc<TournamentAppState>>,
    Query(query): Query<CheckPlayerQuery>,
) -> Result<Json<PlayerCheck>> {
    let address = non_empty(query.address)
        .ok_or_else(|| AppError::Validation("Missing player address".to_string()))?;
    Ok(Json(state.tournaments.check_player(&address, Utc::now()).await?))
}

async fn get_tournament_details(
    State(state): State<Arc<TournamentAppState>>,
    Path(id): Path<String>,
) -> Result<Json<TournamentDetails>> {
    Ok(Json(state.tournaments.details(&id).await?))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
