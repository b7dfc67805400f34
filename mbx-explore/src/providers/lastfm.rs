//! Last.fm client
//!
//! Top tracks and album listings come from the JSON web service. Similar
//! albums are not exposed by the API and are scraped from the album's
//! `+similar` page.

use super::{
    acquire, build_http_client, fetch_json, fetch_text, limiter, Limiter, ProviderError,
    ProviderResult,
};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const LASTFM_API_URL: &str = "https://ws.audioscrobbler.com/2.0/";
const REQUESTS_PER_SECOND: u32 = 5;

/// Last.fm error code for unknown artist/album
const ERROR_NOT_FOUND: u32 = 6;

/// Opening tag of a chart row; a row runs until the next one
static ITEM_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<li[^>]*class="[^"]*similar-albums-item-wrap[^"]*"[^>]*>"#)
        .expect("valid regex")
});
static NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<h3[^>]*class="[^"]*similar-albums-item-name[^"]*"[^>]*>(.*?)</h3>"#)
        .expect("valid regex")
});
static ARTIST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<p[^>]*class="[^"]*similar-albums-item-artist[^"]*"[^>]*>(.*?)</p>"#)
        .expect("valid regex")
});
static IMG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<img[^>]*\ssrc="([^"]+)""#).expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LfArtistRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LfImage {
    #[serde(rename = "#text", default)]
    pub url: String,
    #[serde(default)]
    pub size: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LfTrack {
    pub name: String,
    /// Seconds; absent, null or a string depending on the method
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub duration: Option<u64>,
    #[serde(default)]
    pub artist: Option<LfArtistRef>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LfTrackList {
    #[serde(default, deserialize_with = "one_or_many")]
    pub track: Vec<LfTrack>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LfAlbum {
    pub name: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub image: Vec<LfImage>,
    #[serde(default)]
    pub tracks: LfTrackList,
}

impl LfAlbum {
    pub fn image_url(&self, size: &str) -> Option<&str> {
        self.image
            .iter()
            .find(|i| i.size == size && !i.url.is_empty())
            .map(|i| i.url.as_str())
    }
}

/// Album scraped from a `+similar` page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LfSimilarAlbum {
    pub title: String,
    pub artist: String,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    #[serde(default)]
    toptracks: Option<LfTrackList>,
    #[serde(default)]
    error: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumInfoResponse {
    #[serde(default)]
    album: Option<LfAlbum>,
    #[serde(default)]
    error: Option<u32>,
    #[serde(default)]
    message: Option<String>,
}

/// Last.fm endpoints used by the retriever
#[async_trait]
pub trait LastfmApi: Send + Sync {
    async fn top_tracks(
        &self,
        artist: &str,
        limit: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<Vec<LfTrack>>;

    async fn album_info(
        &self,
        artist: &str,
        album: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<LfAlbum>;

    async fn similar_albums(
        &self,
        album_url: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<Vec<LfSimilarAlbum>>;
}

/// Last.fm HTTP client
pub struct LastfmClient {
    client: Client,
    api_url: String,
    api_key: String,
    rate_limiter: Limiter,
}

impl LastfmClient {
    pub fn new(api_key: impl Into<String>) -> ProviderResult<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_url: LASTFM_API_URL.to_string(),
            api_key: api_key.into(),
            rate_limiter: limiter(REQUESTS_PER_SECOND),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> ProviderResult<T> {
        acquire(&self.rate_limiter, cancel).await?;
        debug!(method = method, "Querying Last.fm API");

        let request = self
            .client
            .get(&self.api_url)
            .query(&[
                ("method", method),
                ("api_key", self.api_key.as_str()),
                ("format", "json"),
            ])
            .query(params);
        fetch_json(request, cancel).await
    }
}

#[async_trait]
impl LastfmApi for LastfmClient {
    async fn top_tracks(
        &self,
        artist: &str,
        limit: u32,
        cancel: &CancellationToken,
    ) -> ProviderResult<Vec<LfTrack>> {
        let limit = limit.to_string();
        let response: TopTracksResponse = self
            .call(
                "artist.gettoptracks",
                &[("artist", artist), ("limit", &limit), ("autocorrect", "1")],
                cancel,
            )
            .await?;

        check_error(response.error, response.message, artist)?;
        Ok(response.toptracks.map(|t| t.track).unwrap_or_default())
    }

    async fn album_info(
        &self,
        artist: &str,
        album: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<LfAlbum> {
        let response: AlbumInfoResponse = self
            .call(
                "album.getinfo",
                &[("artist", artist), ("album", album), ("autocorrect", "1")],
                cancel,
            )
            .await?;

        let what = format!("{} - {}", artist, album);
        check_error(response.error, response.message, &what)?;
        response.album.ok_or(ProviderError::NotFound(what))
    }

    async fn similar_albums(
        &self,
        album_url: &str,
        cancel: &CancellationToken,
    ) -> ProviderResult<Vec<LfSimilarAlbum>> {
        acquire(&self.rate_limiter, cancel).await?;

        let url = format!("{}/+similar", album_url.trim_end_matches('/'));
        debug!(url = %url, "Fetching Last.fm similar albums page");

        let html = fetch_text(self.client.get(&url), cancel).await?;
        Ok(parse_similar_albums(&html))
    }
}

fn check_error(code: Option<u32>, message: Option<String>, what: &str) -> ProviderResult<()> {
    match code {
        None => Ok(()),
        Some(ERROR_NOT_FOUND) => Err(ProviderError::NotFound(what.to_string())),
        Some(code) => Err(ProviderError::Api {
            status: code as u16,
            body: message.unwrap_or_default(),
        }),
    }
}

/// Extract similar albums from a Last.fm `+similar` page
///
/// Rows are `<li class="similar-albums-item-wrap">` elements of one list.
/// Rows may contain nested lists, so each row is cut at the next row's
/// opening tag (the last one at the closing `</ol>`) rather than at `</li>`.
pub fn parse_similar_albums(html: &str) -> Vec<LfSimilarAlbum> {
    let starts: Vec<(usize, usize)> = ITEM_START_RE
        .find_iter(html)
        .map(|m| (m.start(), m.end()))
        .collect();

    starts
        .iter()
        .enumerate()
        .filter_map(|(i, &(_, body_start))| {
            let body = match starts.get(i + 1) {
                Some(&(next, _)) => &html[body_start..next],
                None => {
                    let rest = &html[body_start..];
                    rest.find("</ol>").map_or(rest, |end| &rest[..end])
                }
            };
            let title = inner_text(NAME_RE.captures(body)?.get(1)?.as_str());
            let artist = ARTIST_RE
                .captures(body)
                .and_then(|c| c.get(1))
                .map(|m| inner_text(m.as_str()))
                .unwrap_or_default();
            let image = IMG_RE
                .captures(body)
                .and_then(|c| c.get(1))
                .map(|m| decode_entities(m.as_str()));

            if title.is_empty() {
                return None;
            }
            Some(LfSimilarAlbum {
                title,
                artist,
                image,
            })
        })
        .collect()
}

fn inner_text(fragment: &str) -> String {
    let text = TAG_RE.replace_all(fragment, "");
    decode_entities(text.split_whitespace().collect::<Vec<_>>().join(" ").as_str())
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Last.fm returns a bare object instead of a one-element array
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<LfTrack>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(LfTrack),
        Many(Vec<LfTrack>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(track)) => vec![track],
        Some(OneOrMany::Many(tracks)) => tracks,
        None => Vec::new(),
    })
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<Seconds>::deserialize(deserializer)? {
        Some(Seconds::Number(n)) => Some(n),
        Some(Seconds::Text(s)) => s.trim().parse().ok(),
        None => None,
    }
    .filter(|n| *n > 0))
}
