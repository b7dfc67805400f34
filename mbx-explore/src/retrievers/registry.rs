//! Source → adapter resolution with capability checks

use super::{
    AlbumRetriever, DiscogsRetriever, DiscographyRetriever, LastfmRetriever,
    MusicBrainzRetriever, PopularTracksRetriever, Retriever, SimilarAlbumRetriever,
};
use crate::error::{ExploreError, ExploreResult};
use crate::models::{Capability, Source};
use crate::providers::{DiscogsClient, LastfmClient, MusicBrainzClient};
use crate::settings::Settings;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Live adapters keyed by source
///
/// Built once at startup and shared by every command.
#[derive(Default, Clone)]
pub struct RetrieverRegistry {
    retrievers: HashMap<Source, Arc<dyn Retriever>>,
}

impl RetrieverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every source the settings can authenticate
    ///
    /// MusicBrainz needs no credentials. Discogs and Last.fm are skipped
    /// without a token/key; asking for them later is a configuration error.
    pub fn from_settings(settings: &Settings) -> ExploreResult<Self> {
        let mut registry = Self::new();

        registry.register(Arc::new(MusicBrainzRetriever::new(Arc::new(
            MusicBrainzClient::new()?,
        ))));

        if let Some(token) = settings.discogs_token() {
            registry.register(Arc::new(DiscogsRetriever::new(Arc::new(
                DiscogsClient::new(token)?,
            ))));
        } else {
            debug!("Discogs token not configured, Discogs retriever disabled");
        }

        if let Some(key) = settings.lastfm_api_key() {
            registry.register(Arc::new(LastfmRetriever::new(
                Arc::new(LastfmClient::new(key)?),
                settings.popular_tracks_limit,
            )));
        } else {
            debug!("Last.fm API key not configured, Last.fm retriever disabled");
        }

        info!(sources = registry.retrievers.len(), "Retriever registry ready");
        Ok(registry)
    }

    /// Add or replace the adapter for its source
    pub fn register(&mut self, retriever: Arc<dyn Retriever>) {
        self.retrievers.insert(retriever.source(), retriever);
    }

    pub fn get(&self, source: Source) -> ExploreResult<Arc<dyn Retriever>> {
        self.retrievers.get(&source).cloned().ok_or_else(|| {
            ExploreError::Config(format!(
                "{} retriever is not configured (missing token or API key)",
                source
            ))
        })
    }

    pub fn discography(&self, source: Source) -> ExploreResult<Arc<dyn DiscographyRetriever>> {
        self.get(source)?
            .discography()
            .ok_or_else(|| unsupported(source, Capability::Discography))
    }

    pub fn album_tracks(&self, source: Source) -> ExploreResult<Arc<dyn AlbumRetriever>> {
        self.get(source)?
            .album_tracks()
            .ok_or_else(|| unsupported(source, Capability::AlbumTracks))
    }

    pub fn popular_tracks(&self, source: Source) -> ExploreResult<Arc<dyn PopularTracksRetriever>> {
        self.get(source)?
            .popular_tracks()
            .ok_or_else(|| unsupported(source, Capability::PopularTracks))
    }

    pub fn similar_albums(&self, source: Source) -> ExploreResult<Arc<dyn SimilarAlbumRetriever>> {
        self.get(source)?
            .similar_albums()
            .ok_or_else(|| unsupported(source, Capability::SimilarAlbums))
    }
}

fn unsupported(source: Source, capability: Capability) -> ExploreError {
    ExploreError::CapabilityNotSupported {
        retriever: source,
        capability,
    }
}
