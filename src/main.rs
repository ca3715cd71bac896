use chrono::Utc;
use meyden_api::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    mailer::mailer_from_config,
    oauth::{GoogleOAuthClient, OAuthProviderState},
    repository::{PostgresRepository, RepositoryState},
    storage::{S3StorageClient, StorageState},
    throttle::{Throttle, ThrottleState, spawn_pruner},
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired sessions, OAuth states and throttle windows are swept.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Deletes expired sessions and abandoned OAuth states in the background.
fn spawn_housekeeping(repo: RepositoryState, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let now = Utc::now();
            match repo.purge_expired_sessions(now).await {
                Ok(purged) if purged > 0 => tracing::info!(purged, "expired sessions removed"),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "session purge failed"),
            }
            if let Err(e) = repo.purge_expired_oauth_states(now).await {
                tracing::error!(error = %e, "oauth state purge failed");
            }
        }
    });
}

/// main
///
/// Loads configuration, sets up logging, connects the database and object storage, then
/// serves the API until the process is stopped.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise debug for this crate and request logs from tower_http.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "meyden_api=debug,tower_http=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // One JSON object per line for the log shipper.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Database Initialization (Postgres) and schema migrations
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("FATAL: Database migrations failed.");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 5. Storage Initialization (S3/MinIO)
    let s3_client = S3StorageClient::new(
        &config.s3_endpoint,
        &config.s3_region,
        &config.s3_key,
        &config.s3_secret,
        &config.s3_bucket,
    )
    .await;

    // LOCAL-ONLY: create the MinIO bucket for the Docker setup.
    if config.env == Env::Local {
        use meyden_api::storage::StorageService;
        s3_client.ensure_bucket_exists().await;
    }

    let storage = Arc::new(s3_client) as StorageState;

    // 6. Mail, OAuth and throttling
    let mailer = mailer_from_config(&config);
    let google = Arc::new(GoogleOAuthClient::new(&config.google)) as OAuthProviderState;
    let throttle = Arc::new(Throttle::new(&config)) as ThrottleState;

    spawn_pruner(throttle.clone(), HOUSEKEEPING_INTERVAL);
    spawn_housekeeping(repo.clone(), HOUSEKEEPING_INTERVAL);

    // 7. Unified State Assembly
    let port = config.port;
    let app_state = AppState {
        repo,
        storage,
        mailer,
        google,
        throttle,
        config,
    };

    // 8. Router and Server Startup
    let app = create_router(app_state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .expect("FATAL: Failed to bind the HTTP port.");

    tracing::info!("Listening on {addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{port}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server error.");
}
