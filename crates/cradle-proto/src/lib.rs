//! Wire types shared by the exchange server and the rendezvous client.
//! Kept dependency-light so both sides agree on a single JSON shape.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod envelope;

pub use envelope::{Answer, Envelope, EnvelopeError, Offer, SdpForm};

/// Header carrying the caller's last-known build id on `GET /version`.
pub const LAST_UPDATE_HEADER: &str = "x-last-update";

/// Room addressed by requests that do not name one.
pub const DEFAULT_ROOM: &str = "default";

/// Largest accepted `POST /exchange` body.
pub const MAX_EXCHANGE_BODY_BYTES: usize = 1024 * 1024;

pub const ERR_INVALID_TYPE: &str = "invalid_type";
pub const ERR_INVALID_JSON: &str = "invalid_json";
pub const ERR_PAYLOAD_TOO_LARGE: &str = "payload_too_large";
pub const ERR_METHOD_NOT_ALLOWED: &str = "method_not_allowed";
pub const ERR_NOT_FOUND: &str = "not_found";
pub const ERR_INVALID_ROOM: &str = "invalid_room";
pub const ERR_ROOM_LIMIT: &str = "room_limit_reached";

/// Which half of the exchange slot a read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Offer,
    Answer,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Offer => "offer",
            ExchangeKind::Answer => "answer",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeKind {
    type Err = EnvelopeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "offer" => Ok(ExchangeKind::Offer),
            "answer" => Ok(ExchangeKind::Answer),
            _ => Err(EnvelopeError::InvalidType),
        }
    }
}

/// Acknowledgement returned by a successful replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreStatus {
    OfferStored,
    AnswerStored,
    ExchangeCleared,
}

impl fmt::Display for StoreStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StoreStatus::OfferStored => "offer-stored",
            StoreStatus::AnswerStored => "answer-stored",
            StoreStatus::ExchangeCleared => "exchange-cleared",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResponse {
    pub status: StoreStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub app_name: String,
    pub is_updated: bool,
    pub last_update: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_status_uses_kebab_case() {
        let body = serde_json::to_value(StoreResponse {
            status: StoreStatus::ExchangeCleared,
        })
        .expect("serialize");
        assert_eq!(body, serde_json::json!({"status": "exchange-cleared"}));

        let parsed: StoreResponse =
            serde_json::from_str(r#"{"status":"offer-stored"}"#).expect("parse");
        assert_eq!(parsed.status, StoreStatus::OfferStored);
    }

    #[test]
    fn exchange_kind_parses_only_known_halves() {
        assert_eq!("offer".parse::<ExchangeKind>().ok(), Some(ExchangeKind::Offer));
        assert_eq!("answer".parse::<ExchangeKind>().ok(), Some(ExchangeKind::Answer));
        assert!("Offer".parse::<ExchangeKind>().is_err());
        assert!("".parse::<ExchangeKind>().is_err());
    }

    #[test]
    fn error_body_omits_missing_detail() {
        let body = serde_json::to_string(&ErrorBody {
            error: ERR_PAYLOAD_TOO_LARGE.into(),
            detail: None,
        })
        .expect("serialize");
        assert_eq!(body, r#"{"error":"payload_too_large"}"#);
    }
}
