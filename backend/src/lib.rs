//! Chess Wager Server Library
//!
//! This module exposes the server components for integration testing.

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod game;
pub mod tournament;
pub mod ws;
pub mod xaman;

use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Shared services behind every router.
#[derive(Clone)]
pub struct Services {
    pub pool: db::DbPool,
    pub jwt_manager: Arc<auth::JwtManager>,
    pub feed: ws::ChangeFeed,
    pub tournaments: Arc<tournament::TournamentManager>,
    pub xaman: xaman::XamanClient,
}

impl Services {
    pub fn new(pool: db::DbPool, config: &config::Config) -> Self {
        let jwt_manager = Arc::new(auth::JwtManager::new(config.jwt_secret.clone()));
        let feed = ws::ChangeFeed::new();
        let payouts = tournament::PayoutNotifier::new(config.prize_distribution_url.clone());
        let tournaments = Arc::new(tournament::TournamentManager::new(
            pool.clone(),
            feed.clone(),
            payouts,
        ));

        Self {
            pool,
            jwt_manager,
            feed,
            tournaments,
            xaman: xaman::XamanClient::new(&config.xaman),
        }
    }
}

fn cors_layer(config: &config::Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// Creates the application router with all endpoints
pub fn create_app(services: &Services, config: &config::Config) -> Router {
    let tournament_state = Arc::new(api::TournamentAppState {
        jwt_manager: services.jwt_manager.clone(),
        tournaments: services.tournaments.clone(),
        xaman: services.xaman.clone(),
        config: config.clone(),
    });

    let game_state = Arc::new(api::GameAppState {
        jwt_manager: services.jwt_manager.clone(),
        games: services.tournaments.games(),
    });

    let wallet_state = Arc::new(api::WalletAppState {
        pool: services.pool.clone(),
        jwt_manager: services.jwt_manager.clone(),
        xaman: services.xaman.clone(),
        config: config.clone(),
    });

    let profile_state = Arc::new(api::ProfileAppState {
        pool: services.pool.clone(),
        jwt_manager: services.jwt_manager.clone(),
    });

    let realtime_state = Arc::new(ws::RealtimeState {
        jwt_manager: services.jwt_manager.clone(),
        feed: services.feed.clone(),
    });

    Router::new()
        .route("/", get(|| async { "Chess Wager Server" }))
        .route("/health", get(|| async { "OK" }))
        .nest(
            "/api/tournaments",
            api::tournaments_router().with_state(tournament_state),
        )
        .nest("/api/games", api::games_router().with_state(game_state))
        .nest("/api/wallet", api::wallet_router().with_state(wallet_state))
        .nest(
            "/api/profiles",
            api::profile_router().with_state(profile_state),
        )
        .route("/ws", get(ws::ws_handler).with_state(realtime_state))
        .layer(cors_layer(config))
}

/// Test helper to create an in-memory database and run migrations
pub async fn create_test_db() -> db::DbPool {
    let pool = db::create_memory_pool()
        .await
        .expect("Failed to create in-memory database");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Test helper to create a fully configured test app
pub async fn create_test_app() -> (Router, Services) {
    create_test_app_with(config::Config::for_tests()).await
}

/// Like [`create_test_app`], with a caller-supplied configuration (for
/// example one pointing the wallet client at a local fake).
pub async fn create_test_app_with(config: config::Config) -> (Router, Services) {
    let pool = create_test_db().await;
    let services = Services::new(pool, &config);
    let app = create_app(&services, &config);
    (app, services)
}
