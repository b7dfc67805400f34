//! External metadata provider clients
//!
//! Each client wraps one HTTP API behind a trait (`DiscogsApi`,
//! `MusicBrainzApi`, `LastfmApi`) so that retrievers can be exercised
//! against in-memory fakes. Clients return provider-native records; paging
//! and normalization live in the retrievers.

pub mod discogs;
pub mod lastfm;
pub mod musicbrainz;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use discogs::{DiscogsApi, DiscogsClient};
pub use lastfm::{LastfmApi, LastfmClient};
pub use musicbrainz::{MusicBrainzApi, MusicBrainzClient};

/// Provider client errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Direct (un-keyed) token bucket shared by one client
pub(crate) type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub(crate) fn limiter(per_second: u32) -> Limiter {
    RateLimiter::direct(Quota::per_second(
        NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN),
    ))
}

/// Wait for a rate limiter permit, observing cancellation
pub(crate) async fn acquire(limiter: &Limiter, cancel: &CancellationToken) -> ProviderResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        _ = limiter.until_ready() => Ok(()),
    }
}

/// HTTP client shared by provider clients
///
/// Requests carry the mbx user agent and fail after an explicit timeout
/// instead of hanging.
pub fn build_http_client() -> ProviderResult<Client> {
    Client::builder()
        .user_agent(mbx_common::user_agent())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(ProviderError::from)
}

/// Send a request and return the body of a successful response
pub(crate) async fn fetch_text(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> ProviderResult<String> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        response = request.send() => response?,
    };

    let status = response.status();
    let url = response.url().to_string();

    if status == StatusCode::NOT_FOUND {
        return Err(ProviderError::NotFound(url));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        return Err(ProviderError::RateLimited);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        body = response.text() => body.map_err(ProviderError::from),
    }
}

/// Send a request and decode the JSON body
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> ProviderResult<T> {
    let body = fetch_text(request, cancel).await?;
    serde_json::from_str(&body).map_err(|e| ProviderError::Parse(e.to_string()))
}

/// Send a request and return the raw body bytes
pub(crate) async fn fetch_bytes(
    request: RequestBuilder,
    cancel: &CancellationToken,
) -> ProviderResult<Vec<u8>> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
        response = request.send() => response?,
    };

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body: String::new(),
        });
    }

    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        bytes = response.bytes() => Ok(bytes?.to_vec()),
    }
}
