use chess_wager_server::{
    config, create_app, db, game::constants::CLOCK_SWEEP_INTERVAL_SECS,
    tournament::expiry::EXPIRY_SWEEP_INTERVAL_SECS, Services,
};
use chrono::Utc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=info")),
        )
        .init();

    // Load config
    let config = config::Config::from_env()?;
    let network = config.xahau.network;
    tracing::info!(
        "Starting chess wager server on {} ({} network via {})",
        config.server_addr(),
        network,
        config.xahau.rpc_url(network)
    );
    if config.xahau.hook_address(network).is_none() {
        tracing::warn!("No Hook address for {}; payments and paid joins will fail", network);
    }
    if config.cron_secret.is_none() {
        tracing::warn!("CRON_SECRET is not set; GET /api/tournaments/expire is open");
    }

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database connected");

    // Run migrations
    db::run_migrations(&pool).await?;

    let services = Services::new(pool, &config);
    let app = create_app(&services, &config);

    // Spawn background task expiring unfilled tournaments and abandoned games
    let tournaments_expiry = services.tournaments.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(EXPIRY_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(e) = tournaments_expiry.run_expiry_sweep(Utc::now()).await {
                tracing::error!("Error running expiry sweep: {:?}", e);
            }
        }
    });

    // Spawn background task resolving flagged clocks (players may have left)
    let games = services.tournaments.games();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(CLOCK_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(e) = games.sweep_clocks(Utc::now()).await {
                tracing::error!("Error sweeping game clocks: {:?}", e);
            }
        }
    });

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.server_addr()).await?;
    tracing::info!("Server listening on {}", config.server_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
