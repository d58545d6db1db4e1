use std::sync::Arc;
use titanic_predictor::{
    api::{build_router, AppState},
    config::Config,
    extraction::ExtractionAdapter,
    ml::{ArtifactStore, ModelHandle, ModelState, PredictionService},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize tracing
    let json_logs = config.observability.json_logs;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!(
                "titanic_predictor={},tower_http={}",
                config.observability.log_level, config.observability.log_level
            )
            .into()
        }))
        .with(json_logs.then(|| fmt::layer().json()))
        .with((!json_logs).then(|| fmt::layer()))
        .init();

    tracing::info!(
        service = %config.observability.service_name,
        "Starting Titanic Survival Predictor v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = titanic_predictor::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        } else {
            tracing::info!("✅ Prometheus metrics initialized");
        }
    } else {
        tracing::info!("⚠️  Prometheus metrics disabled in configuration");
    }

    // Load the published artifact set; keep serving health if it is missing
    let store = ArtifactStore::new(&config.model.artifact_dir);
    tracing::info!("📦 Artifact directory: {}", store.root().display());
    let predictor = Arc::new(PredictionService::new(ModelHandle::new(store)));
    if let ModelState::Unavailable { reason } = predictor.warm_up() {
        tracing::warn!("⚠️  Model not loaded: {}", reason);
        tracing::warn!("   Prediction endpoints will answer 503 until a model is published and the service restarted");
    }

    // Initialize extraction
    let extractor = Arc::new(ExtractionAdapter::from_config(&config.llm)?);
    tracing::info!("✅ Extraction adapter initialized");

    let app = build_router(AppState::new(predictor, extractor));

    // Start HTTP server
    let http_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let http_listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("🚀 HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Prediction: http://{}/predict", http_addr);
    tracing::info!("   Chat: http://{}/predict-nl", http_addr);
    tracing::info!("   Metrics: http://{}/metrics", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, app).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = http_handle => {
            tracing::warn!("HTTP server stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    tracing::info!("Shutting down gracefully...");
    Ok(())
}
