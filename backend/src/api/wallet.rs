//! Wallet endpoints: proxy the Xaman payload API and turn a signed SignIn
//! payload into a session token.

use crate::{
    audit,
    auth::JwtManager,
    config::Config,
    db::{profiles, DbPool},
    error::{AppError, Result},
    xaman::{
        payload::{payment_payload, signin_payload, NATIVE_CURRENCY},
        PayloadLinks, PayloadResolution, PaymentRequest, XahauNetwork, XamanClient,
    },
};
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Xaman payload ids are UUIDs; anything this short is certainly not one.
const MIN_UUID_LEN: usize = 10;

pub struct WalletAppState {
    pub pool: DbPool,
    pub jwt_manager: Arc<JwtManager>,
    pub xaman: XamanClient,
    pub config: Config,
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub issuer: Option<String>,
    pub memo: Option<String>,
    pub network: Option<XahauNetwork>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSigninRequest {
    pub return_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetPayloadRequest {
    pub uuid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PayloadSummary {
    pub account: Option<String>,
    pub signed: bool,
    pub resolution: PayloadResolution,
}

#[derive(Debug, Serialize)]
pub struct VerifySigninResponse {
    pub signed: bool,
    pub resolved: bool,
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

pub fn router() -> Router<Arc<WalletAppState>> {
    Router::new()
        .route("/payment", post(create_payment))
        .route("/signin", post(create_signin))
        .route("/payload", post(get_payload))
        .route("/verify-signin/:uuid", get(verify_signin))
        .route("/webhook", post(webhook))
}

async fn create_payment(
    State(state): State<Arc<WalletAppState>>,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<Json<PayloadLinks>> {
    let amount = req
        .amount
        .filter(|a| a.is_finite() && *a > 0.0)
        .ok_or_else(|| AppError::Validation("Invalid amount".to_string()))?;
    let network = req.network.unwrap_or(state.config.xahau.network);

    let destination = state.config.xahau.hook_address(network).ok_or_else(|| {
        AppError::Upstream(format!("no Hook address configured for {}", network))
    })?;

    let request = PaymentRequest {
        amount,
        currency: req
            .currency
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| NATIVE_CURRENCY.to_string()),
        issuer: req.issuer.filter(|i| !i.trim().is_empty()),
        memo: req.memo,
        network,
    };

    let body = payment_payload(&request, destination, &state.config.public_base_url)?;
    let links = state.xaman.create_payload(&body).await?.into_links()?;

    audit::log_payload_created("payment", &links.uuid);
    tracing::info!(
        "Payment payload {} for {} {} on {}",
        links.uuid,
        request.amount,
        request.currency,
        network
    );

    Ok(Json(links))
}

async fn create_signin(
    State(state): State<Arc<WalletAppState>>,
    body: Option<Json<CreateSigninRequest>>,
) -> Result<Json<PayloadLinks>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let payload = signin_payload(
        req.return_url.as_deref(),
        state.config.xahau.network,
        Utc::now().timestamp_millis(),
    );
    let links = state.xaman.create_payload(&payload).await?.into_links()?;

    audit::log_payload_created("signin", &links.uuid);
    Ok(Json(links))
}

async fn get_payload(
    State(state): State<Arc<WalletAppState>>,
    Json(req): Json<GetPayloadRequest>,
) -> Result<Json<PayloadSummary>> {
    let uuid = req
        .uuid
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Missing uuid".to_string()))?;

    let details = state.xaman.get_payload(uuid.trim()).await?;

    Ok(Json(PayloadSummary {
        account: details.signer_account(),
        signed: details.meta.signed,
        resolution: details.resolution(),
    }))
}

async fn verify_signin(
    State(state): State<Arc<WalletAppState>>,
    Path(uuid): Path<String>,
) -> Result<impl IntoResponse> {
    if uuid.len() < MIN_UUID_LEN {
        return Err(AppError::Validation("Invalid payload uuid".to_string()));
    }

    let details = state.xaman.get_payload(&uuid).await?;
    let account = details.signer_account();
    let resolution = details.resolution();

    // Sessions are only minted for a wallet address, never a user token.
    let token = match resolution.account() {
        Some(address) => {
            profiles::get_or_create_profile(&state.pool, address, Utc::now()).await?;
            let token = state.jwt_manager.create_token(address)?;
            audit::log_auth_event(address, "signin", true);
            Some(token)
        }
        None => {
            if resolution.is_signed() {
                tracing::warn!("Sign-in payload {} was signed without a wallet address", uuid);
            }
            if details.meta.resolved {
                audit::log_auth_event(account.as_deref().unwrap_or("unknown"), "signin", false);
            }
            None
        }
    };

    let body = VerifySigninResponse {
        signed: details.meta.signed,
        resolved: details.meta.resolved,
        account,
        token,
    };

    Ok(([(header::CACHE_CONTROL, "no-store")], Json(body)))
}

/// Xaman posts resolution callbacks here. State is read on demand through
/// `verify-signin`, so the callback only needs acknowledging.
async fn webhook(body: Option<Json<Value>>) -> Json<Value> {
    if let Some(Json(event)) = body {
        let uuid = event
            .pointer("/meta/payload_uuidv4")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        tracing::debug!("Xaman webhook for payload {}", uuid);
    }
    Json(json!({ "ok": true }))
}
