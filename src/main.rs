use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::signal::ctrl_c;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use shop_vin::{
    app_state::AppState,
    auth::TokenVerifier,
    capture::{BarcodeDetector, Detector, OcrDetector, ScanSessions},
    config::AppConfig,
    db::{self, PgVehicleStore},
    routes,
    services::{nhtsa::NhtsaClient, ocr::WorkersAiClient},
};

/// Upper bound for a single Workers AI recognition request.
const OCR_REQUEST_TIMEOUT_SECS: u64 = 15;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing shop-vin server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!(base_url = %config.nhtsa_base_url, "Initializing NHTSA VIN decoder client");
    let decoder = NhtsaClient::new(&config.nhtsa_base_url, config.decoder_timeout())
        .expect("Failed to initialize VIN decoder client");

    let ocr: Option<Arc<dyn Detector>> = match config.workers_ai_credentials() {
        Some((account_id, api_token)) => {
            tracing::info!("Initializing Cloudflare Workers AI client for OCR scanning");
            let client = WorkersAiClient::new(
                account_id,
                api_token,
                std::time::Duration::from_secs(OCR_REQUEST_TIMEOUT_SECS),
            )
            .expect("Failed to initialize Workers AI client");
            Some(Arc::new(OcrDetector::new(Arc::new(client))))
        }
        None => {
            tracing::warn!("Workers AI credentials not set, scans run barcode-only");
            None
        }
    };

    let scans = ScanSessions::new(
        config.scan_settings(),
        config.scan_session_ttl(),
        Arc::new(BarcodeDetector),
        ocr,
    );

    // Create shared application state
    let state = AppState::new(
        Arc::new(PgVehicleStore::new(db_pool)),
        Arc::new(decoder),
        scans,
        TokenVerifier::new(&config.jwt_secret),
    );

    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .merge(
            Router::new()
                .route("/metrics", get(routes::metrics::prometheus_metrics))
                .with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    tracing::info!("Starting shop-vin on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        tracing::info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
