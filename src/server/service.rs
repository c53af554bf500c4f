//! Admission control HTTP API.

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, info, instrument, warn};

use crate::ratelimit::{
    ActiveLimiter, Algorithm, Clock, ConfigError, Decision, LimiterFactory, LimiterParams,
    Metadata, SystemClock,
};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// The limiter requests are currently evaluated against
    pub limiter: Arc<ActiveLimiter>,
    /// Builds replacement limiters on `/api/init`
    pub factory: Arc<LimiterFactory>,
    /// Sampled once per hit
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(limiter: Arc<ActiveLimiter>, factory: Arc<LimiterFactory>) -> Self {
        Self::with_clock(limiter, factory, Arc::new(SystemClock))
    }

    pub fn with_clock(
        limiter: Arc<ActiveLimiter>,
        factory: Arc<LimiterFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            limiter,
            factory,
            clock,
        }
    }
}

/// Body of `POST /api/init`.
#[derive(Debug, Clone, Deserialize)]
pub struct InitRequest {
    /// Taken as a string so an unknown tag is reported like any other
    /// validation failure.
    #[serde(default)]
    pub algorithm: Option<String>,

    #[serde(flatten)]
    pub params: LimiterParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitResponse {
    pub allowed: bool,
    pub message: String,
    pub algorithm: Option<Algorithm>,
}

/// Body of every `GET /api/hit` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HitResponse {
    pub accepted: bool,
    pub message: String,
    /// Epoch millis
    pub timestamp: i64,
    /// Seconds
    pub retry_after: u64,
    pub remaining_hits: u64,
    pub metadata: Option<Metadata>,
}

impl HitResponse {
    fn not_initialized(timestamp: i64) -> Self {
        Self {
            accepted: false,
            message: "Rate limiter not initialized".to_string(),
            timestamp,
            retry_after: 0,
            remaining_hits: 0,
            metadata: None,
        }
    }
}

impl From<Decision> for HitResponse {
    fn from(decision: Decision) -> Self {
        Self {
            accepted: decision.allowed,
            message: decision.message,
            timestamp: decision.timestamp_millis,
            retry_after: decision.retry_after_secs,
            remaining_hits: decision.remaining,
            metadata: Some(decision.metadata),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub initialized: bool,
    pub algorithm: Option<Algorithm>,
}

/// Build the API router.
///
/// Hit handling needs the peer address, so the router must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let router = Router::new()
        .route("/api/init", post(init_limiter))
        .route("/api/hit", get(hit))
        .route("/api/reset", post(reset_limiter))
        .route("/health", get(health))
        .with_state(state);

    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return router;
    }

    router.layer(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]),
    )
}

/// Validate the requested configuration and install a new limiter.
#[instrument(skip_all)]
async fn init_limiter(
    State(state): State<AppState>,
    Json(request): Json<InitRequest>,
) -> (StatusCode, Json<InitResponse>) {
    let built = request
        .algorithm
        .as_deref()
        .ok_or(ConfigError::MissingField { field: "algorithm" })
        .and_then(|name| state.factory.build_named(name, &request.params));

    match built {
        Ok(limiter) => {
            let algorithm = limiter.algorithm();
            state.limiter.install(limiter);
            info!(algorithm = %algorithm, "Rate limiter initialized");
            (
                StatusCode::OK,
                Json(InitResponse {
                    allowed: true,
                    message: "Rate limiter initialized".to_string(),
                    algorithm: Some(algorithm),
                }),
            )
        }
        Err(e) => {
            warn!(error = %e, "Rejected limiter configuration");
            (
                StatusCode::BAD_REQUEST,
                Json(InitResponse {
                    allowed: false,
                    message: e.to_string(),
                    algorithm: None,
                }),
            )
        }
    }
}

/// Evaluate one hit for the calling peer.
async fn hit(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let now = state.clock.now_millis();

    let Some(limiter) = state.limiter.current() else {
        warn!(peer = %peer, "Hit received before a limiter was initialized");
        return (
            StatusCode::BAD_REQUEST,
            Json(HitResponse::not_initialized(now)),
        )
            .into_response();
    };

    let client = peer.ip().to_string();
    let decision = limiter.evaluate(&client, now);

    debug!(
        client = %client,
        allowed = decision.allowed,
        remaining = decision.remaining,
        "Hit evaluated"
    );

    if decision.allowed {
        return (StatusCode::OK, Json(HitResponse::from(decision))).into_response();
    }

    let retry_after = HeaderValue::from(decision.retry_after_secs);
    let mut response =
        (StatusCode::TOO_MANY_REQUESTS, Json(HitResponse::from(decision))).into_response();
    response.headers_mut().insert(header::RETRY_AFTER, retry_after);
    response
}

/// Forget every client of the installed limiter.
async fn reset_limiter(State(state): State<AppState>) -> StatusCode {
    match state.limiter.current() {
        Some(limiter) => {
            limiter.reset();
            info!(algorithm = %limiter.algorithm(), "Rate limiter state reset");
            StatusCode::OK
        }
        None => StatusCode::BAD_REQUEST,
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let current = state.limiter.current();
    Json(HealthResponse {
        status: "ok",
        initialized: current.is_some(),
        algorithm: current.map(|limiter| limiter.algorithm()),
    })
}
