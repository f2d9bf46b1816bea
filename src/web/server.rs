use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use super::{api, AppState};

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api::health_check))
        .route("/api/session", get(api::get_session))
        // Data endpoints
        .route("/api/prices", get(api::get_prices))
        .route("/api/moving-averages", get(api::get_moving_averages))
        // Prediction endpoints
        .route("/api/backtest", get(api::get_backtest))
        .route("/api/forecast", get(api::get_forecast))
        .route("/api/online-update", post(api::post_online_update))
        .route("/api/dashboard", get(api::get_dashboard))
        .layer(cors)
        .with_state(state)
}

pub async fn start_dashboard_server(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Dashboard server starting on http://localhost:{}", port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
