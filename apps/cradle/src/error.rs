use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("exchange request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("exchange rejected the request ({status}): {error}")]
    Rejected { status: u16, error: String },
    #[error("unexpected exchange payload: {0}")]
    Decode(String),
    #[error("peer connection error: {0}")]
    Peer(String),
    #[error("candidate gathering did not complete within {0:?}")]
    GatheringTimeout(Duration),
    #[error("peer connection has no local description")]
    MissingLocalDescription,
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<webrtc::Error> for LinkError {
    fn from(err: webrtc::Error) -> Self {
        LinkError::Peer(err.to_string())
    }
}

impl From<url::ParseError> for LinkError {
    fn from(err: url::ParseError) -> Self {
        LinkError::Config(err.to_string())
    }
}
