use axum::Json;
use axum::http::StatusCode;
use axum::routing::{get, post};

use pubsub_ingest::config::AppConfig;
use pubsub_ingest::context::{global_cache, init_from_env};
use pubsub_ingest::envelope::CloudEventMessage;
use pubsub_ingest::function::handle_event;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: invalid configuration: {e}");
        std::process::exit(1);
    });

    // Initialize tracing, seeded from config unless RUST_LOG overrides
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(config.server.log_level.as_str())
            }),
        )
        .with_target(false)
        .init();

    // Build the application context once per process, before taking traffic
    if let Err(e) = global_cache().acquire(init_from_env).await {
        eprintln!("Error: failed to build application context: {}", e.description());
        std::process::exit(1);
    }

    eprintln!("📨 pubsub-ingest v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Environment: {}", config.basic.environment);
    eprintln!("   Service: {}", config.basic.gcp_service_name);
    eprintln!("   Push endpoint: http://0.0.0.0:{}/\n", config.server.port);

    let app = axum::Router::new()
        .route("/", post(receive_push))
        .route("/healthz", get(|| async { StatusCode::OK }));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port)).await?;
    tracing::info!(port = config.server.port, "Push endpoint started");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Receive one pub/sub push delivery and invoke the function.
///
/// Accepts both the bare envelope and the push wrapper `{"message": {...}}`.
/// A failed invocation returns 500 so the transport applies its own
/// redelivery policy.
async fn receive_push(Json(body): Json<serde_json::Value>) -> StatusCode {
    let raw = match body {
        serde_json::Value::Object(ref map) if map.contains_key("message") => {
            map["message"].clone()
        }
        other => other,
    };

    let envelope: CloudEventMessage = match serde_json::from_value(raw) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Rejected malformed push body: {e}");
            return StatusCode::BAD_REQUEST;
        }
    };

    match handle_event(envelope).await {
        Ok(()) => StatusCode::NO_CONTENT,
        // Already logged at the entry-point boundary
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
