//! MusicBrainz and Cover Art Archive client
//!
//! API Documentation: https://musicbrainz.org/doc/MusicBrainz_API
//!
//! MusicBrainz allows one request per second per client; the Cover Art
//! Archive is served separately and is not throttled here.

use super::{
    acquire, build_http_client, fetch_json, limiter, Limiter, ProviderError, ProviderResult,
};
use crate::models::EntityKind;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const MUSICBRAINZ_BASE_URL: &str = "https://musicbrainz.org/ws/2";
const COVER_ART_BASE_URL: &str = "https://coverartarchive.org";
const REQUESTS_PER_SECOND: u32 = 1;

/// Search hit (artist or label)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MbEntity {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MbSearchPage {
    #[serde(default)]
    pub count: u32,
    #[serde(default, alias = "artists", alias = "labels")]
    pub entities: Vec<MbEntity>,
}

/// MusicBrainz artist credit
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MbArtistCredit {
    pub name: String,
    #[serde(default)]
    pub joinphrase: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MbReleaseGroup {
    pub id: String,
    pub title: String,
    #[serde(rename = "first-release-date", default)]
    pub first_release_date: String,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<MbArtistCredit>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MbReleaseGroupPage {
    #[serde(rename = "release-group-count", default)]
    pub count: u32,
    #[serde(rename = "release-groups", default)]
    pub release_groups: Vec<MbReleaseGroup>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MbCoverArtInfo {
    #[serde(default)]
    pub front: bool,
    #[serde(default)]
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MbRecording {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub length: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MbTrack {
    #[serde(default)]
    pub position: u32,
    pub title: String,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<MbArtistCredit>,
    #[serde(default)]
    pub recording: Option<MbRecording>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MbMedium {
    #[serde(default)]
    pub position: u32,
    #[serde(rename = "track-count", default)]
    pub track_count: u32,
    #[serde(default)]
    pub tracks: Vec<MbTrack>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MbRelease {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<MbArtistCredit>,
    #[serde(rename = "cover-art-archive", default)]
    pub cover_art_archive: MbCoverArtInfo,
    #[serde(default)]
    pub media: Vec<MbMedium>,
}

impl MbRelease {
    pub fn track_count(&self) -> u32 {
        self.media.iter().map(|m| m.track_count).sum()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MbReleasePage {
    #[serde(rename = "release-count", default)]
    pub count: u32,
    #[serde(default)]
    pub releases: Vec<MbRelease>,
}

/// Browse filter for release listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbReleaseFilter<'a> {
    /// Releases the artist appears on
    TrackArtist(&'a str),
    Label(&'a str),
    ReleaseGroup(&'a str),
}

/// Cover Art Archive lookup target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverArtTarget {
    Release,
    ReleaseGroup,
}

#[derive(Debug, Clone, Deserialize)]
struct CoverArtListing {
    #[serde(default)]
    images: Vec<CoverArtImage>,
}

#[derive(Debug, Clone, Deserialize)]
struct CoverArtImage {
    #[serde(default)]
    front: bool,
    #[serde(default)]
    thumbnails: CoverArtThumbnails,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CoverArtThumbnails {
    #[serde(default)]
    small: Option<String>,
}

/// MusicBrainz endpoints used by the retriever
#[async_trait]
pub trait MusicBrainzApi: Send + Sync {
    async fn search(
        &self,
        kind: EntityKind,
        query: &str,
        limit: u32,
        offset: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<MbSearchPage>;

    /// Browse an artist's release groups
    ///
    /// Without `all_statuses` only the website-default statuses are listed.
    async fn release_groups(
        &self,
        artist_id: &str,
        limit: u32,
        offset: u32,
        all_statuses: bool,
        cancel: &CancellationToken,
    ) -> ProviderResult<MbReleaseGroupPage>;

    async fn releases(
        &self,
        filter: MbReleaseFilter<'_>,
        limit: u32,
        offset: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<MbReleasePage>;

    /// Release with recordings and artist credits
    async fn release(&self, id: &str, cancel: &CancellationToken) -> ProviderResult<MbRelease>;

    /// Small front cover thumbnail, `None` when the archive has no front image
    async fn cover_art(
        &self,
        target: CoverArtTarget,
        id: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<Option<String>>;
}

/// MusicBrainz HTTP client
pub struct MusicBrainzClient {
    client: Client,
    base_url: String,
    cover_art_url: String,
    rate_limiter: Limiter,
}

impl MusicBrainzClient {
    pub fn new() -> ProviderResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            base_url: MUSICBRAINZ_BASE_URL.to_string(),
            cover_art_url: COVER_ART_BASE_URL.to_string(),
            rate_limiter: limiter(REQUESTS_PER_SECOND),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        cancel: &CancellationToken,
    ) -> ProviderResult<T> {
        acquire(&self.rate_limiter, cancel).await?;

        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Querying MusicBrainz API");

        let request = self
            .client
            .get(&url)
            .query(params)
            .query(&[("fmt", "json")]);
        fetch_json(request, cancel).await
    }
}

#[async_trait]
impl MusicBrainzApi for MusicBrainzClient {
    async fn search(
        &self,
        kind: EntityKind,
        query: &str,
        limit: u32,
        offset: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<MbSearchPage> {
        let params = [
            ("query", query.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        self.get(kind.as_str(), &params, cancel).await
    }

    async fn release_groups(
        &self,
        artist_id: &str,
        limit: u32,
        offset: u32,
        all_statuses: bool,
        cancel: &CancellationToken,
    ) -> ProviderResult<MbReleaseGroupPage> {
        let mut params = vec![
            ("artist", artist_id.to_string()),
            ("inc", "artist-credits".to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        if !all_statuses {
            params.push(("release-group-status", "website-default".to_string()));
        }
        self.get("release-group", &params, cancel).await
    }

    async fn releases(
        &self,
        filter: MbReleaseFilter<'_>,
        limit: u32,
        offset: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<MbReleasePage> {
        let (key, value, inc) = match filter {
            MbReleaseFilter::TrackArtist(id) => ("track_artist", id, "artist-credits"),
            MbReleaseFilter::Label(id) => ("label", id, "artist-credits"),
            MbReleaseFilter::ReleaseGroup(id) => ("release-group", id, "media"),
        };
        let params = [
            (key, value.to_string()),
            ("inc", inc.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        self.get("release", &params, cancel).await
    }

    async fn release(&self, id: &str, cancel: &CancellationToken) -> ProviderResult<MbRelease> {
        let params = [("inc", "recordings artist-credits".to_string())];
        self.get(&format!("release/{}", id), &params, cancel).await
    }

    async fn cover_art(
        &self,
        target: CoverArtTarget,
        id: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<Option<String>> {
        let kind = match target {
            CoverArtTarget::Release => "release",
            CoverArtTarget::ReleaseGroup => "release-group",
        };
        let url = format!("{}/{}/{}", self.cover_art_url, kind, id);

        match fetch_json::<CoverArtListing>(self.client.get(&url), cancel).await {
            Ok(listing) => Ok(front_thumbnail(listing)),
            Err(ProviderError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn front_thumbnail(listing: CoverArtListing) -> Option<String> {
    listing
        .images
        .into_iter()
        .find(|image| image.front)
        .and_then(|image| image.thumbnails.small)
}

/// Join artist credits the way track artists are displayed ("A; B")
pub fn join_credits(credits: &[MbArtistCredit]) -> String {
    credits
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
