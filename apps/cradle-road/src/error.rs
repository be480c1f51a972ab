use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use cradle_proto::{
    EnvelopeError, ErrorBody, ERR_INVALID_JSON, ERR_INVALID_ROOM, ERR_INVALID_TYPE,
    ERR_METHOD_NOT_ALLOWED, ERR_NOT_FOUND, ERR_PAYLOAD_TOO_LARGE, ERR_ROOM_LIMIT,
};
use serde::Serialize;
use thiserror::Error;

use crate::store::RoomError;

const READ_TYPE_DETAIL: &str = "type must be `offer` or `answer`.";
const WRITE_TYPE_DETAIL: &str = "Only `offer`, `answer`, or null are supported.";

/// Rejections surfaced by the exchange API as `{error, detail}` bodies.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid exchange type: {0}")]
    InvalidType(&'static str),
    #[error("invalid json body")]
    InvalidJson(Option<String>),
    #[error("payload exceeds the exchange body limit")]
    PayloadTooLarge,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("not found")]
    NotFound,
    #[error("invalid room: {0}")]
    InvalidRoom(String),
    #[error("room limit reached")]
    RoomLimit(RoomError),
}

impl ApiError {
    pub fn invalid_read_type() -> Self {
        ApiError::InvalidType(READ_TYPE_DETAIL)
    }

    pub fn invalid_write_type() -> Self {
        ApiError::InvalidType(WRITE_TYPE_DETAIL)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidType(_) | ApiError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidRoom(_) => StatusCode::BAD_REQUEST,
            ApiError::RoomLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn body(&self) -> ErrorBody {
        let (error, detail) = match self {
            ApiError::InvalidType(detail) => (ERR_INVALID_TYPE, Some((*detail).to_string())),
            ApiError::InvalidJson(detail) => (ERR_INVALID_JSON, detail.clone()),
            ApiError::PayloadTooLarge => (ERR_PAYLOAD_TOO_LARGE, None),
            ApiError::MethodNotAllowed => (ERR_METHOD_NOT_ALLOWED, None),
            ApiError::NotFound => (ERR_NOT_FOUND, None),
            ApiError::InvalidRoom(detail) => (ERR_INVALID_ROOM, Some(detail.clone())),
            ApiError::RoomLimit(err) => (ERR_ROOM_LIMIT, Some(err.to_string())),
        };
        ErrorBody {
            error: error.to_string(),
            detail,
        }
    }
}

impl From<EnvelopeError> for ApiError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::InvalidType => ApiError::invalid_write_type(),
            EnvelopeError::Malformed(reason) => ApiError::InvalidJson(Some(reason.to_string())),
        }
    }
}

impl From<RoomError> for ApiError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::NameTooLong => ApiError::InvalidRoom(err.to_string()),
            RoomError::Full(_) => ApiError::RoomLimit(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        no_store(self.status(), &self.body())
    }
}

/// JSON response that intermediaries must not cache; the exchange is live state.
pub fn no_store<T: Serialize>(status: StatusCode, body: &T) -> Response {
    (
        status,
        [(header::CACHE_CONTROL, "no-store")],
        Json(body),
    )
        .into_response()
}
