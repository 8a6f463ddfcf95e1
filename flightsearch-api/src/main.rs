use std::sync::Arc;
use std::net::SocketAddr;
use flightsearch_api::{app, AppState};
use flightsearch_core::{SearchSession, SessionDeps};
use flightsearch_store::{
    app_config::Config, DbClient, PostgresAirportIndex, PostgresFavoritesStore, RedisClient,
    RedisInputPreferences,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flightsearch_api=debug,flightsearch_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting flight search API on port {}", config.server.port);

    // Postgres: airports and saved routes
    let db = DbClient::new(&config.database)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    // Redis: last typed search text
    let redis = RedisClient::new(&config.redis.url)
        .await
        .expect("Failed to connect to Redis");

    let deps = SessionDeps {
        airports: Arc::new(PostgresAirportIndex::new(db.pool.clone())),
        favorites: Arc::new(PostgresFavoritesStore::new(db.pool.clone())),
        preferences: Arc::new(RedisInputPreferences::new(redis, config.redis.input_key.clone())),
    };
    let session = SearchSession::start(deps, config.session.clone()).await;

    let app = app(AppState::new(session));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
