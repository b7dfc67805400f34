//! User-facing operations
//!
//! [`Explorer`] is built once at startup and owns every long-lived
//! collaborator: the host library, settings, retriever registry, cache
//! registry, materializer and state processor. Each command is an async
//! method taking a progress reporter and a cancellation token.

mod albums;
mod cache;
mod discography;
mod popular;
mod similar;

pub use cache::CacheVisibility;
pub use popular::{POPULAR_TRACKS_ALBUM, SORT_LAST_YEAR};

use crate::cache_registry::CacheRegistry;
use crate::downloader::{AudioFetcher, CommandPlayer, MediaPlayer, YtDlp};
use crate::error::ExploreResult;
use crate::library::HostLibrary;
use crate::materializer::{ArtworkFetcher, BatchSummary, HttpArtworkFetcher, Materializer};
use crate::placeholder::PlaceholderTemplate;
use crate::processor::{ProcessOutcome, ProcessorOptions, StateProcessor};
use crate::progress::ProgressReporter;
use crate::retrievers::RetrieverRegistry;
use crate::settings::{ExplorerPaths, Settings};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command names registered with the host
pub const COMMAND_NAMES: &[&str] = &[
    "mbx.discography.discogs",
    "mbx.discography.musicbrainz",
    "mbx.popular_tracks",
    "mbx.similar_albums",
    "mbx.load_selected_albums",
    "mbx.delete_artist_cache",
    "mbx.toggle_cached_albums",
];

/// Result of a lookup command
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome {
    /// An existing group was reopened
    Cached { group: String },
    /// New placeholders were materialized
    Created {
        group: String,
        entity: String,
        summary: BatchSummary,
    },
}

impl LookupOutcome {
    pub fn group(&self) -> &str {
        match self {
            LookupOutcome::Cached { group } | LookupOutcome::Created { group, .. } => group,
        }
    }
}

/// Collaborators an [`Explorer`] is assembled from
pub struct ExplorerParts {
    pub host: Arc<dyn HostLibrary>,
    pub settings: Settings,
    pub paths: ExplorerPaths,
    pub registry: RetrieverRegistry,
    pub artwork: Arc<dyn ArtworkFetcher>,
    pub fetcher: Arc<dyn AudioFetcher>,
    pub player: Arc<dyn MediaPlayer>,
}

pub struct Explorer {
    host: Arc<dyn HostLibrary>,
    settings: Settings,
    paths: ExplorerPaths,
    registry: RetrieverRegistry,
    cache: Mutex<CacheRegistry>,
    materializer: Arc<Materializer>,
    processor: StateProcessor,
}

impl Explorer {
    pub fn new(parts: ExplorerParts) -> Self {
        let ExplorerParts {
            host,
            settings,
            paths,
            registry,
            artwork,
            fetcher,
            player,
        } = parts;

        let materializer = Arc::new(Materializer::new(
            Arc::clone(&host),
            PlaceholderTemplate::new(&paths.template_file),
            artwork,
        ));
        let processor = StateProcessor::new(
            Arc::clone(&host),
            registry.clone(),
            Arc::clone(&materializer),
            fetcher,
            player,
            &paths.cache_dir,
            ProcessorOptions::from(&settings),
        );

        Self {
            cache: Mutex::new(CacheRegistry::new(&paths.registry_file)),
            host,
            settings,
            paths,
            registry,
            materializer,
            processor,
        }
    }

    /// Production wiring: HTTP providers, yt-dlp and the configured player
    pub fn from_settings(
        host: Arc<dyn HostLibrary>,
        settings: Settings,
        paths: ExplorerPaths,
    ) -> ExploreResult<Self> {
        paths.ensure()?;
        let registry = RetrieverRegistry::from_settings(&settings)?;
        let parts = ExplorerParts {
            artwork: Arc::new(HttpArtworkFetcher::new()?),
            fetcher: Arc::new(YtDlp::new(&settings.ytdlp_command)),
            player: Arc::new(CommandPlayer::new(settings.media_player_command.clone())),
            host,
            settings,
            paths,
            registry,
        };
        Ok(Self::new(parts))
    }

    pub fn host(&self) -> &Arc<dyn HostLibrary> {
        &self.host
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn paths(&self) -> &ExplorerPaths {
        &self.paths
    }

    pub fn processor(&self) -> &StateProcessor {
        &self.processor
    }

    fn cache(&self) -> MutexGuard<'_, CacheRegistry> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Persist the cache registry; failures are logged
    pub fn save(&self) {
        if let Err(e) = self.cache().save() {
            warn!(error = %e, "Could not save cache registry");
        }
    }

    /// Host hook: the current item changed
    pub async fn on_now_playing_changed(
        &self,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<ProcessOutcome> {
        self.processor.process_now_playing(progress, cancel).await
    }

    /// Register every command with the host
    pub fn register_commands(&self) {
        for name in COMMAND_NAMES {
            self.host.register_command(name);
        }
        info!(count = COMMAND_NAMES.len(), "Registered commands");
    }
}
