use axum::Router;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use dotenvy::dotenv;
use log::info;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use learnserver::config::AppConfig;
use learnserver::progression;
use learnserver::shared::state::AppState;
use learnserver::shared::utils::create_conn;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .write_style(env_logger::WriteStyle::Always)
        .init();

    let config = AppConfig::from_env();
    let pool = create_conn()?;
    {
        let mut conn = pool.get()?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("failed to run migrations: {}", e))?;
    }

    let app_state = Arc::new(AppState {
        config: config.clone(),
        conn: pool,
    });

    let app = Router::new()
        .merge(progression::configure())
        // TraceLayer events surface in the env_logger output through
        // tracing's `log` bridge; no separate subscriber runs.
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    info!(
        "Starting HTTP server on {}:{}",
        config.server.host, config.server.port
    );
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
