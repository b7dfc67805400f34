//! Discogs API client
//!
//! API Documentation: https://www.discogs.com/developers

use super::{acquire, build_http_client, fetch_json, limiter, Limiter, ProviderResult};
use crate::models::EntityKind;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DISCOGS_BASE_URL: &str = "https://api.discogs.com";

/// Authenticated Discogs allowance is 60 requests per minute
const REQUESTS_PER_SECOND: u32 = 1;

/// Pagination block returned with every list response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiscogsPagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
}

/// Database search response
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiscogsSearchPage {
    #[serde(default)]
    pub pagination: DiscogsPagination,
    #[serde(default)]
    pub results: Vec<DiscogsSearchResult>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscogsSearchResult {
    pub id: u64,
    pub title: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// Artist or label release listing
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DiscogsReleasesPage {
    #[serde(default)]
    pub pagination: DiscogsPagination,
    #[serde(default)]
    pub releases: Vec<DiscogsReleaseSummary>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscogsReleaseSummary {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub thumb: Option<String>,
    /// "Main", "Appearance", "TrackAppearance", ... (absent on label listings)
    #[serde(default)]
    pub role: Option<String>,
    /// "master" or "release"
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub main_release: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscogsArtistRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscogsTrack {
    #[serde(default)]
    pub position: String,
    #[serde(rename = "type_", default)]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub artists: Vec<DiscogsArtistRef>,
}

/// Full release with track list
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscogsReleaseDetail {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub artists: Vec<DiscogsArtistRef>,
    #[serde(default)]
    pub tracklist: Vec<DiscogsTrack>,
}

/// Discogs endpoints used by the retriever
#[async_trait]
pub trait DiscogsApi: Send + Sync {
    async fn search(
        &self,
        query: &str,
        kind: EntityKind,
        page: u32,
        per_page: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<DiscogsSearchPage>;

    async fn entity_releases(
        &self,
        kind: EntityKind,
        id: u64,
        page: u32,
        per_page: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<DiscogsReleasesPage>;

    async fn release(&self, id: u64, cancel: &CancellationToken)
        -> ProviderResult<DiscogsReleaseDetail>;
}

/// Discogs HTTP client
pub struct DiscogsClient {
    client: Client,
    base_url: String,
    token: String,
    rate_limiter: Limiter,
}

impl DiscogsClient {
    pub fn new(token: impl Into<String>) -> ProviderResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            base_url: DISCOGS_BASE_URL.to_string(),
            token: token.into(),
            rate_limiter: limiter(REQUESTS_PER_SECOND),
        })
    }

    /// Point the client at another host (mirrors, local proxies)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> ProviderResult<T> {
        acquire(&self.rate_limiter, cancel).await?;

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Querying Discogs API");

        let request = self
            .client
            .get(&url)
            .header("Authorization", format!("Discogs token={}", self.token))
            .query(params);
        fetch_json(request, cancel).await
    }
}

#[async_trait]
impl DiscogsApi for DiscogsClient {
    async fn search(
        &self,
        query: &str,
        kind: EntityKind,
        page: u32,
        per_page: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<DiscogsSearchPage> {
        let params = [
            ("q", query.to_string()),
            ("type", kind.as_str().to_string()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        self.get("/database/search", &params, cancel).await
    }

    async fn entity_releases(
        &self,
        kind: EntityKind,
        id: u64,
        page: u32,
        per_page: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<DiscogsReleasesPage> {
        let params = [
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
            ("sort", "year".to_string()),
            ("sort_order", "desc".to_string()),
        ];
        let path = format!("/{}s/{}/releases", kind.as_str(), id);
        self.get(&path, &params, cancel).await
    }

    async fn release(
        &self,
        id: u64,
        cancel: &CancellationToken,
    ) -> ProviderResult<DiscogsReleaseDetail> {
        self.get(&format!("/releases/{}", id), &[], cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_artist_releases_page() {
        let body = r#"{
            "pagination": {"page": 1, "pages": 2, "per_page": 100, "items": 140},
            "releases": [
                {"id": 10, "title": "First", "artist": "Artist (2)", "year": 1999,
                 "thumb": "https://i.discogs.com/a.jpg", "role": "Main", "type": "master",
                 "main_release": 1001},
                {"id": 11, "title": "Guest Spot", "artist": "Various", "role": "Appearance",
                 "type": "release"}
            ]
        }"#;

        let page: DiscogsReleasesPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.pagination.pages, 2);
        assert_eq!(page.releases.len(), 2);
        assert_eq!(page.releases[0].main_release, Some(1001));
        assert_eq!(page.releases[1].year, None);
        assert_eq!(page.releases[1].role.as_deref(), Some("Appearance"));
    }

    #[test]
    fn test_parse_release_detail_tracklist() {
        let body = r#"{
            "id": 1001, "title": "First",
            "artists": [{"name": "Artist (2)"}],
            "tracklist": [
                {"position": "", "type_": "heading", "title": "Side A"},
                {"position": "A1", "type_": "track", "title": "Opener", "duration": "3:45"},
                {"position": "A2", "type_": "track", "title": "Duet", "duration": "",
                 "artists": [{"name": "Artist (2)"}, {"name": "Guest"}]}
            ]
        }"#;

        let detail: DiscogsReleaseDetail = serde_json::from_str(body).unwrap();
        assert_eq!(detail.tracklist.len(), 3);
        assert_eq!(detail.tracklist[0].kind, "heading");
        assert_eq!(detail.tracklist[2].artists.len(), 2);
    }

    #[test]
    fn test_client_construction() {
        let client = DiscogsClient::new("token").unwrap().with_base_url("http://localhost:9");
        assert_eq!(client.base_url, "http://localhost:9");
    }
}
