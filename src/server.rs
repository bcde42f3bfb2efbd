//! HTTP surface: liveness probe and the prediction endpoint.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api::{ErrorBody, PredictResponse};
use crate::config::{Limits, ServerConfig};
use crate::engine::EngineAdapter;
use crate::payload;

/// Application state shared across handlers.
pub struct AppState {
    pub engine: EngineAdapter,
    pub limits: Limits,
}

/// Build the router. Separate from `run_server` so tests can drive it
/// without binding a socket.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // The transport cap sits above the validation limit so an over-limit
    // payload reaches the handler and gets the JSON 400 from validation
    // instead of a bare framework 413. Base64 inflates the payload by 4/3
    // plus JSON framing, hence the factor of two.
    let body_cap = state.limits.max_payload_bytes.saturating_mul(2);

    Router::new()
        .route("/ping", get(ping_handler))
        .route("/invocations", post(invocations_handler))
        .layer(DefaultBodyLimit::max(body_cap))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Run the HTTP server.
pub async fn run_server(
    config: ServerConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Initializing OCR engine...");
    let engine = EngineAdapter::from_config(config.engine.clone());
    engine.warm_up();

    let state = Arc::new(AppState {
        engine,
        limits: config.limits,
    });
    let app = app(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {e}"))?;

    info!("Server listening on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /ping        - Liveness probe");
    info!("  POST /invocations - OCR inference");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Liveness probe; deliberately independent of engine state.
async fn ping_handler() -> StatusCode {
    StatusCode::OK
}

/// Prediction endpoint.
async fn invocations_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    let start = Instant::now();

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let image = match payload::prepare_image(content_type, &body, &state.limits) {
        Ok(image) => image,
        Err(e) => {
            info!(request_id = %request_id, error = %e, "Rejected invocation");
            return e.into_response();
        }
    };

    info!(
        request_id = %request_id,
        width = image.width(),
        height = image.height(),
        "Running inference"
    );

    let infer_start = Instant::now();
    let detections = match state.engine.invoke(&image) {
        Ok(detections) => detections,
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Inference failed");
            return e.into_response();
        }
    };

    info!(
        request_id = %request_id,
        detections = detections.len(),
        infer_ms = infer_start.elapsed().as_secs_f64() * 1000.0,
        total_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Invocation complete"
    );

    (
        StatusCode::OK,
        Json(PredictResponse::new(
            detections,
            state.engine.accelerated(),
        )),
    )
        .into_response()
}

/// Last-resort conversion of a handler panic into a well-formed error body.
fn handle_panic(_err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "internal server error".to_string(),
        }),
    )
        .into_response()
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        }
    }
}
