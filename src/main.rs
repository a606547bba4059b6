mod analytics;
mod app;
mod articles;
mod auth;
mod category;
mod config;
mod crud;
mod error;
mod events;
mod shell;
mod state;
mod storage;
mod store;
mod uploads;
mod users;
mod visuals;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{auth::services::bootstrap_admin, config::AppConfig, state::AppState};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "eventdesk=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&db)
        .await
        .context("run migrations")?;

    let bootstrap = config.bootstrap_admin.clone();
    let app_state = AppState::init(config, db).await?;
    if let Some(admin) = bootstrap {
        bootstrap_admin(app_state.users.as_ref(), &admin).await?;
    }

    app::serve(app::build_app(app_state)).await
}
