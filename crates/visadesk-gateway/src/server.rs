//! HTTP server implementation using Axum.

use axum::{
    Router,
    routing::{get, patch, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use visadesk_core::config::{GatewayConfig, VisaDeskConfig};
use visadesk_scheduler::ReminderLog;

use crate::service::DeadlineService;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<VisaDeskConfig>,
    /// Deadline CRUD plus the reminder scheduler behind it.
    pub service: DeadlineService,
    /// Fired-reminder history, shared with the notifier.
    pub reminder_log: ReminderLog,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: VisaDeskConfig, service: DeadlineService, reminder_log: ReminderLog) -> Self {
        Self {
            config: Arc::new(config),
            service,
            reminder_log,
            start_time: std::time::Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    use crate::routes;

    Router::new()
        .route("/health", get(routes::health_check))
        // Clients
        .route("/api/v1/clients", get(routes::list_clients).post(routes::create_client))
        .route("/api/v1/clients/{id}", get(routes::get_client))
        // Deadlines
        .route(
            "/api/v1/deadlines",
            get(routes::list_deadlines).post(routes::create_deadline),
        )
        .route(
            "/api/v1/deadlines/{id}",
            get(routes::get_deadline)
                .put(routes::update_deadline)
                .delete(routes::delete_deadline),
        )
        .route("/api/v1/deadlines/{id}/archive", patch(routes::archive_deadline))
        .route("/api/v1/deadlines/{id}/restore", patch(routes::restore_deadline))
        // Reminders
        .route("/api/v1/reminders", get(routes::list_reminders))
        .route("/api/v1/reminders/history", get(routes::reminder_history))
        .route("/api/v1/reminders/{id}/fire", post(routes::fire_reminder))
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));

            // Example: VISADESK_CORS_ORIGINS=https://crm.example.com,https://admin.example.com
            if let Ok(origins_str) = std::env::var("VISADESK_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Start the HTTP server. Pending reminders are dropped on shutdown.
pub async fn start(gateway: &GatewayConfig, state: AppState) -> anyhow::Result<()> {
    let scheduler = state.service.scheduler().clone();
    let app = build_router(state);

    let addr = format!("{}:{}", gateway.host, gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Gateway server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("❌ Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("👋 Shutdown signal received");
}
