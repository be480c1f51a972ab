//! HTTP client for the exchange server.
//!
//! [`ExchangeApi`] is the seam the publishing and polling loops are written
//! against; [`ExchangeClient`] is the reqwest implementation.

use std::time::Duration;

use async_trait::async_trait;
use cradle_proto::{
    Envelope, ErrorBody, ExchangeKind, StoreResponse, StoreStatus, VersionInfo,
    LAST_UPDATE_HEADER,
};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use crate::config::LinkConfig;
use crate::error::LinkError;

#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Replace the slot with `envelope`; returns the server's acknowledgement.
    async fn store(&self, envelope: &Envelope) -> Result<StoreStatus, LinkError>;

    /// Read one half of the slot. An empty slot is `None`.
    async fn load(&self, kind: ExchangeKind) -> Result<Option<Envelope>, LinkError>;

    async fn version(&self, last_update: &str) -> Result<VersionInfo, LinkError>;
}

#[derive(Debug, Clone)]
pub struct ExchangeClient {
    http: Client,
    base: Url,
    room: Option<String>,
}

impl ExchangeClient {
    pub fn new(
        base_url: &str,
        room: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, LinkError> {
        let mut base = Url::parse(base_url.trim())?;
        if base.cannot_be_a_base() {
            return Err(LinkError::Config(format!("{base_url} cannot be a base url")));
        }
        // `Url::join` replaces the last segment unless the path ends in a slash.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { http, base, room })
    }

    pub fn from_config(config: &LinkConfig) -> Result<Self, LinkError> {
        Self::new(
            &config.road_url,
            config.room().map(str::to_string),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, LinkError> {
        Ok(self.base.join(path)?)
    }

    fn with_room(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.room {
            Some(room) => request.query(&[("room", room.as_str())]),
            None => request,
        }
    }
}

#[async_trait]
impl ExchangeApi for ExchangeClient {
    async fn store(&self, envelope: &Envelope) -> Result<StoreStatus, LinkError> {
        let url = self.endpoint("exchange")?;
        tracing::trace!(
            target = "cradle::signaling",
            kind = ?envelope.kind(),
            await = "exchange.store",
            state = "start"
        );
        let attempt = self.with_room(self.http.post(url)).json(envelope).send().await;
        tracing::trace!(
            target = "cradle::signaling",
            await = "exchange.store",
            state = "end",
            result = ?attempt.as_ref().map(Response::status)
        );
        let response = accept(attempt?).await?;
        let body: StoreResponse = response.json().await?;
        Ok(body.status)
    }

    async fn load(&self, kind: ExchangeKind) -> Result<Option<Envelope>, LinkError> {
        let url = self.endpoint("exchange")?;
        tracing::trace!(
            target = "cradle::signaling",
            %kind,
            await = "exchange.load",
            state = "start"
        );
        let attempt = self
            .with_room(self.http.get(url).query(&[("type", kind.as_str())]))
            .send()
            .await;
        tracing::trace!(
            target = "cradle::signaling",
            %kind,
            await = "exchange.load",
            state = "end",
            result = ?attempt.as_ref().map(Response::status)
        );
        let response = accept(attempt?).await?;
        let body: Value = response.json().await?;
        if body.as_object().is_some_and(|fields| fields.is_empty()) {
            return Ok(None);
        }
        Envelope::from_value(body)
            .map(Some)
            .map_err(|err| LinkError::Decode(err.to_string()))
    }

    async fn version(&self, last_update: &str) -> Result<VersionInfo, LinkError> {
        let url = self.endpoint("version")?;
        let response = self
            .http
            .get(url)
            .header(LAST_UPDATE_HEADER, last_update)
            .send()
            .await?;
        let response = accept(response).await?;
        Ok(response.json().await?)
    }
}

// Turn a non-2xx reply into `Rejected`, keeping the server's error code when it sent one.
async fn accept(response: Response) -> Result<Response, LinkError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_string(),
    };
    Err(LinkError::Rejected {
        status: status.as_u16(),
        error,
    })
}
