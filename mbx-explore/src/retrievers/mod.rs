//! Retriever adapters
//!
//! Each adapter normalizes one provider into the canonical model and
//! declares which capabilities it offers. Callers ask the
//! [`RetrieverRegistry`] for a capability, never for a concrete adapter.

pub mod discogs;
pub mod lastfm;
pub mod musicbrainz;
pub mod registry;

pub use discogs::DiscogsRetriever;
pub use lastfm::LastfmRetriever;
pub use musicbrainz::MusicBrainzRetriever;
pub use registry::RetrieverRegistry;

use crate::error::{ExploreError, ExploreResult};
use crate::models::{EntityRetrieverData, Release, RetrieverData, Source, Track};
use crate::progress::ProgressReporter;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Maximum in-flight secondary requests (cover art, per-release lookups)
pub const MAX_FANOUT: usize = 15;

/// Common adapter surface: identity plus capability accessors
///
/// Accessors default to `None`; an adapter overrides the ones it implements.
pub trait Retriever: Send + Sync {
    fn source(&self) -> Source;

    fn discography(self: Arc<Self>) -> Option<Arc<dyn DiscographyRetriever>> {
        None
    }

    fn album_tracks(self: Arc<Self>) -> Option<Arc<dyn AlbumRetriever>> {
        None
    }

    fn popular_tracks(self: Arc<Self>) -> Option<Arc<dyn PopularTracksRetriever>> {
        None
    }

    fn similar_albums(self: Arc<Self>) -> Option<Arc<dyn SimilarAlbumRetriever>> {
        None
    }
}

/// Artist or label discography lookup
#[async_trait]
pub trait DiscographyRetriever: Send + Sync {
    /// Resolve a query (see [`crate::query`]) to a provider entity
    async fn resolve_entity(
        &self,
        query: &str,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<EntityRetrieverData>;

    async fn list_releases(
        &self,
        entity: &EntityRetrieverData,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Release>>;
}

/// Track listing for a release produced by the same source
#[async_trait]
pub trait AlbumRetriever: Send + Sync {
    async fn list_tracks(
        &self,
        data: &RetrieverData,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Track>>;
}

#[async_trait]
pub trait PopularTracksRetriever: Send + Sync {
    async fn popular_tracks(
        &self,
        artist: &str,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Track>>;
}

#[async_trait]
pub trait SimilarAlbumRetriever: Send + Sync {
    async fn similar_albums(
        &self,
        artist: &str,
        album: &str,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Release>>;
}

/// Fail unless `data` was produced by `expected`
pub(crate) fn ensure_source(expected: Source, data: &RetrieverData) -> ExploreResult<()> {
    let found = data.source();
    if found == expected {
        Ok(())
    } else {
        Err(ExploreError::TypeMismatch { expected, found })
    }
}

/// Bail out between pagination steps
pub(crate) async fn checkpoint(cancel: &CancellationToken) -> ExploreResult<()> {
    tokio::task::yield_now().await;
    if cancel.is_cancelled() {
        return Err(ExploreError::Cancelled);
    }
    Ok(())
}

/// Parse Discogs-style "m:ss" or "h:mm:ss" durations
pub(crate) fn parse_duration_ms(text: &str) -> Option<u64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let mut seconds: u64 = 0;
    for part in text.split(':') {
        seconds = seconds.checked_mul(60)?.checked_add(part.trim().parse().ok()?)?;
    }
    (seconds > 0).then_some(seconds * 1000)
}
