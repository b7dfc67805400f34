//! Last.fm retriever: popular tracks, album tracks and similar albums

use super::{ensure_source, AlbumRetriever, PopularTracksRetriever, Retriever, SimilarAlbumRetriever};
use crate::error::{ExploreError, ExploreResult};
use crate::models::{Release, RetrieverData, Source, Track};
use crate::progress::ProgressReporter;
use crate::providers::lastfm::LastfmApi;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct LastfmRetriever {
    api: Arc<dyn LastfmApi>,
    popular_limit: u32,
}

impl LastfmRetriever {
    pub fn new(api: Arc<dyn LastfmApi>, popular_limit: u32) -> Self {
        Self {
            api,
            popular_limit: popular_limit.max(1),
        }
    }
}

impl Retriever for LastfmRetriever {
    fn source(&self) -> Source {
        Source::Lastfm
    }

    fn album_tracks(self: Arc<Self>) -> Option<Arc<dyn AlbumRetriever>> {
        Some(self)
    }

    fn popular_tracks(self: Arc<Self>) -> Option<Arc<dyn PopularTracksRetriever>> {
        Some(self)
    }

    fn similar_albums(self: Arc<Self>) -> Option<Arc<dyn SimilarAlbumRetriever>> {
        Some(self)
    }
}

#[async_trait]
impl PopularTracksRetriever for LastfmRetriever {
    async fn popular_tracks(
        &self,
        artist: &str,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Track>> {
        let artist = artist.trim();
        if artist.is_empty() {
            return Err(ExploreError::InvalidInput("Artist name is empty".to_string()));
        }

        let ranked = self.api.top_tracks(artist, self.popular_limit, cancel).await?;
        let total = ranked.len();
        info!(artist = %artist, count = total, "Fetched Last.fm top tracks");

        Ok(ranked
            .into_iter()
            .enumerate()
            .map(|(rank, t)| {
                let track_artist = t
                    .artist
                    .map(|a| a.name)
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| artist.to_string());
                Track {
                    retriever_data: RetrieverData::lastfm(track_artist.clone(), t.name.clone()),
                    title: t.name,
                    artist: track_artist,
                    track_position: Some(format!("{}/{}", rank + 1, total)),
                    disc_position: None,
                    length_ms: t.duration.map(|s| s * 1000),
                }
            })
            .collect())
    }
}

#[async_trait]
impl AlbumRetriever for LastfmRetriever {
    async fn list_tracks(
        &self,
        data: &RetrieverData,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Track>> {
        ensure_source(Source::Lastfm, data)?;
        let (artist, title) = match data {
            RetrieverData::Lastfm(d) => (d.artist.clone(), d.title.clone()),
            _ => (None, None),
        };
        let (Some(artist), Some(title)) = (artist, title) else {
            return Err(ExploreError::InvalidState(
                "Last.fm payload needs artist and title".to_string(),
            ));
        };

        let album = self.api.album_info(&artist, &title, cancel).await?;
        let album_artist = if album.artist.trim().is_empty() {
            artist
        } else {
            album.artist
        };
        let total = album.tracks.track.len();

        Ok(album
            .tracks
            .track
            .into_iter()
            .enumerate()
            .map(|(i, t)| {
                let track_artist = t
                    .artist
                    .map(|a| a.name)
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| album_artist.clone());
                Track {
                    retriever_data: RetrieverData::lastfm(track_artist.clone(), t.name.clone()),
                    title: t.name,
                    artist: track_artist,
                    track_position: Some(format!("{}/{}", i + 1, total)),
                    disc_position: None,
                    length_ms: t.duration.map(|s| s * 1000),
                }
            })
            .collect())
    }
}

#[async_trait]
impl SimilarAlbumRetriever for LastfmRetriever {
    async fn similar_albums(
        &self,
        artist: &str,
        album: &str,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Release>> {
        progress.status(&format!("Looking up {} - {} on Last.fm", artist, album));
        let info = self.api.album_info(artist, album, cancel).await?;
        if info.url.trim().is_empty() {
            return Err(ExploreError::NotFound(format!(
                "Last.fm has no page for {} - {}",
                artist, album
            )));
        }

        progress.status("Fetching similar albums");
        let similar = self.api.similar_albums(&info.url, cancel).await?;
        info!(artist = %artist, album = %album, count = similar.len(), "Scraped similar albums");

        Ok(similar
            .into_iter()
            .map(|s| Release {
                retriever_data: RetrieverData::lastfm(s.artist.clone(), s.title.clone()),
                title: s.title,
                artist: s.artist,
                date: String::new(),
                thumb: s.image,
                appearance_only: false,
            })
            .collect())
    }
}
