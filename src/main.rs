mod config;
mod detect;
mod http;
mod llm;
mod metrics;
mod models;
mod pipeline;
mod query;
mod shopping;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{
        DefaultBodyLimit, State,
        rejection::{BytesRejection, JsonRejection},
    },
    http::{HeaderMap, Request, StatusCode, header::HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use config::AppConfig;
use eyre::WrapErr;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use models::{ApiError, ITEM_SCHEMA_VERSION, IdentifyRequest};
use pipeline::{Pipeline, PipelineError, PipelineErrorKind};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, error, info, info_span};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(target: "itemlens.api", "server crashed: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    if let Ok(path) = dotenv {
        info!(target: "itemlens.api", path = %path.display(), "loaded .env");
    }

    let config = AppConfig::from_env();
    let pipeline = Pipeline::from_config(&config);
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .wrap_err("failed to install prometheus recorder")?;

    let state = AppState {
        pipeline,
        prometheus_handle,
        metrics_key: config.metrics_key.clone(),
    };
    let app = build_router(state, config.limits.request_max_bytes);

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(target: "itemlens.api", "listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

#[derive(Clone)]
struct AppState {
    pipeline: Pipeline,
    prometheus_handle: PrometheusHandle,
    metrics_key: Option<String>,
}

fn build_router(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/detect-raw", post(detect_raw))
        .route("/identify", post(identify))
        .with_state(state)
        .layer(middleware::from_fn(request_id))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Item identification API is running",
    }))
}

/// Health and readiness check.
///
/// - Method: `GET`
/// - Path: `/health`
///
/// Reports which upstream services have credentials configured.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "itemlens-api",
        "vision_configured": state.pipeline.vision_configured(),
        "search_configured": state.pipeline.search_configured(),
    }))
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = &state.metrics_key {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    (
        [("Content-Type", "text/plain; version=0.0.4")],
        state.prometheus_handle.render(),
    )
        .into_response()
}

/// Identify the item in one raw image.
///
/// - Method: `POST`
/// - Path: `/detect-raw`
/// - Body: the encoded image bytes (any format the decoder understands)
/// - Response: `ItemRecord`
async fn detect_raw(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/detect-raw");
    let body = body.map_err(|rejection| AppError::Rejected {
        status: rejection.status(),
        error: PipelineError::invalid_input("request", rejection.body_text()),
    })?;
    if body.is_empty() {
        return Err(PipelineError::invalid_input("detect-raw", "No data received").into());
    }
    let record = state.pipeline.identify(vec![body.to_vec()]).await?;
    Ok(([("X-Item-Schema", ITEM_SCHEMA_VERSION)], Json(record)).into_response())
}

/// Identify the item shown across one or more images and attach a market price.
///
/// - Method: `POST`
/// - Path: `/identify`
/// - Body: `{"images": ["<base64>", ...]}` (data URLs accepted)
/// - Response: `EnrichedResult`; `price_info` is `null` when no price was found
async fn identify(
    State(state): State<AppState>,
    payload: Result<Json<IdentifyRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    crate::metrics::inc_requests("/identify");
    let Json(payload) = payload.map_err(|rejection| AppError::Rejected {
        status: rejection.status(),
        error: PipelineError::invalid_input("request", rejection.body_text()),
    })?;
    let images = decode_images(&payload.images)?;
    let result = state.pipeline.run(images).await?;
    Ok(([("X-Item-Schema", ITEM_SCHEMA_VERSION)], Json(result)).into_response())
}

fn decode_images(encoded: &[String]) -> Result<Vec<Vec<u8>>, PipelineError> {
    encoded
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let data = match value.split_once("base64,") {
                Some((prefix, data)) if prefix.starts_with("data:") => data,
                _ => value.as_str(),
            };
            BASE64.decode(data.trim()).map_err(|err| {
                PipelineError::invalid_input("request", format!("image {index} is not valid base64: {err}"))
            })
        })
        .collect()
}

async fn request_id(request: Request<Body>, next: Next) -> Response {
    let id = Uuid::new_v4();
    let span = info_span!(
        target: "itemlens.api",
        "request",
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

#[derive(Debug)]
enum AppError {
    Pipeline(PipelineError),
    /// The framework refused the request body; its status is kept.
    Rejected {
        status: StatusCode,
        error: PipelineError,
    },
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, err) = match self {
            AppError::Pipeline(err) => {
                let status = match err.kind() {
                    PipelineErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                    PipelineErrorKind::Configuration => StatusCode::SERVICE_UNAVAILABLE,
                    PipelineErrorKind::Upstream => StatusCode::BAD_GATEWAY,
                    PipelineErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err)
            }
            AppError::Rejected { status, error } => (status, error),
        };
        if status.is_server_error() {
            error!(target: "itemlens.api", stage = err.stage(), error = %err, "request_failed");
        }
        let payload = ApiError {
            error: err.detail().to_string(),
            stage: Some(err.stage().to_string()),
        };
        (status, Json(payload)).into_response()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));
    let _ = fmt().with_env_filter(filter).try_init();
}
