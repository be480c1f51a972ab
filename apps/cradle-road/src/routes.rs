use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, QueryRejection},
        DefaultBodyLimit, Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use cradle_proto::{
    Envelope, ExchangeKind, StoreResponse, VersionInfo, DEFAULT_ROOM, LAST_UPDATE_HEADER,
    MAX_EXCHANGE_BODY_BYTES,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::error::{no_store, ApiError};
use crate::state::AppState;
use crate::store::validate_room;

/// Builds the exchange API, nested under `api_prefix` unless it is empty or `/`.
pub fn router(state: AppState, api_prefix: &str) -> Router {
    let api = Router::new()
        .route(
            "/exchange",
            get(read_exchange)
                .post(replace_exchange)
                .fallback(method_not_allowed),
        )
        .route("/version", get(version).fallback(method_not_allowed))
        .route("/health", get(health).fallback(method_not_allowed))
        .layer(DefaultBodyLimit::max(MAX_EXCHANGE_BODY_BYTES))
        .with_state(state);

    let prefix = api_prefix.trim().trim_end_matches('/');
    let app = if prefix.is_empty() {
        api
    } else if prefix.starts_with('/') {
        Router::new().nest(prefix, api)
    } else {
        Router::new().nest(&format!("/{prefix}"), api)
    };

    app.fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Default, Deserialize)]
pub struct ExchangeQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    room: Option<String>,
}

impl ExchangeQuery {
    fn room(&self) -> Result<&str, ApiError> {
        let room = self
            .room
            .as_deref()
            .map(str::trim)
            .filter(|room| !room.is_empty())
            .unwrap_or(DEFAULT_ROOM);
        Ok(validate_room(room)?)
    }
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: &'static str,
    rooms: usize,
    uptime_secs: u64,
}

/// GET /exchange?type={offer|answer} - current envelope for that half, or `{}`
async fn read_exchange(
    State(state): State<AppState>,
    query: Result<Query<ExchangeQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|_| ApiError::invalid_read_type())?;
    let kind = query
        .kind
        .as_deref()
        .unwrap_or_default()
        .parse::<ExchangeKind>()
        .map_err(|_| ApiError::invalid_read_type())?;

    let body = match state.store().read(query.room()?, kind) {
        Some(envelope) => serde_json::to_value(&envelope)
            .map_err(|err| ApiError::InvalidJson(Some(err.to_string())))?,
        None => Value::Object(Map::new()),
    };
    Ok(no_store(StatusCode::OK, &body))
}

/// POST /exchange - replace the slot with an offer, an answer, or a clear marker
async fn replace_exchange(
    State(state): State<AppState>,
    query: Result<Query<ExchangeQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::InvalidRoom(rejection.body_text()))?;
    let room = query.room()?;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            warn!(room = %room, "rejecting oversized exchange body");
            ApiError::PayloadTooLarge
        } else {
            ApiError::InvalidJson(Some(rejection.body_text()))
        }
    })?;

    // An empty body reads as `{}` and is rejected for its missing type.
    let value: Value = if body.is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&body).map_err(|_| ApiError::InvalidJson(None))?
    };
    let envelope = Envelope::from_value(value)?;

    let status = state.store().replace(room, envelope).map_err(|err| {
        warn!(room = %room, error = %err, "exchange write refused");
        ApiError::from(err)
    })?;
    debug!(room = %room, %status, "exchange replaced");

    Ok(no_store(StatusCode::OK, &StoreResponse { status }))
}

/// GET /version - compare the caller's `X-Last-Update` with this build
async fn version(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let client_last_update = headers
        .get(LAST_UPDATE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("0");
    let is_updated = client_last_update != state.build_id();

    no_store(
        StatusCode::OK,
        &VersionInfo {
            app_name: state.app_name().to_string(),
            is_updated,
            last_update: state.build_id().to_string(),
        },
    )
}

async fn health(State(state): State<AppState>) -> Response {
    no_store(
        StatusCode::OK,
        &HealthStatus {
            status: "ok",
            rooms: state.store().room_count(),
            uptime_secs: state.uptime_secs(),
        },
    )
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
