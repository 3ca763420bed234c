use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::Router;
use tokio_rusqlite::Connection;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};

mod aggregators;
mod error;
mod handlers;
mod migrations;
mod report;
mod rule_engine;
mod rules;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Connection>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_max_level(Level::INFO)
        .init();

    info!("Starting contentgroups server...");

    let db = Connection::open("contentgroups.db").await?;
    migrations::initialize_database(&db).await?;

    let state = AppState { db: Arc::new(db) };

    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/api/sites/:idsite/rules",
            get(handlers::rules::list_rules).post(handlers::rules::create_rule),
        )
        .route(
            "/api/sites/:idsite/rules/:idrule",
            put(handlers::rules::update_rule).delete(handlers::rules::delete_rule),
        )
        .route(
            "/api/sites/:idsite/rules/test-url",
            get(handlers::rules::test_url),
        )
        .route(
            "/api/sites/:idsite/content-groups",
            get(handlers::report::get_content_groups),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}
