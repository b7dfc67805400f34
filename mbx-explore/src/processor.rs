//! Playback-triggered placeholder resolution
//!
//! When a placeholder becomes the current item its comment descriptor
//! decides what happens:
//!
//! | State           | Action                                            |
//! |-----------------|---------------------------------------------------|
//! | `UnloadedAlbum` | fetch the track list, write track placeholders    |
//! | `UnloadedTrack` | download audio over the placeholder (or stream)   |
//! | `LinkTrack`     | play the linked library file instead              |
//! | `Loaded`        | nothing                                           |
//!
//! Playback is paused before any action so the host never plays
//! placeholder bytes.

use crate::downloader::{AudioFetcher, MediaPlayer};
use crate::error::{ExploreError, ExploreResult};
use crate::library::{HostLibrary, Tag};
use crate::materializer::{Artwork, BatchSummary, ExistingPolicy, Materializer, PlaceholderSpec};
use crate::models::{CommentData, State, Track};
use crate::placeholder::{
    parse_track_and_disc, safe_file_name, Numbering, PlaceholderSnapshot, PLACEHOLDER_EXTENSION,
};
use crate::progress::ProgressReporter;
use crate::retrievers::RetrieverRegistry;
use crate::settings::Settings;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Suffix of the placeholder backup kept during a download
pub const BACKUP_SUFFIX: &str = ".bak";

/// Behavior flags taken from [`Settings`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorOptions {
    pub queue_tracks_after_album_load: bool,
    pub use_media_player: bool,
}

impl From<&Settings> for ProcessorOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            queue_tracks_after_album_load: settings.queue_tracks_after_album_load,
            use_media_player: settings.use_media_player,
        }
    }
}

/// Result of processing one item
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Nothing playing, or not an mbx placeholder
    NotManaged,
    AlreadyLoaded,
    AlbumExpanded {
        tracks: usize,
        summary: BatchSummary,
        advanced: bool,
    },
    TrackLoaded {
        path: PathBuf,
        advanced: bool,
    },
    Streaming {
        url: String,
    },
    Linked {
        path: PathBuf,
    },
}

pub struct StateProcessor {
    host: Arc<dyn HostLibrary>,
    registry: RetrieverRegistry,
    materializer: Arc<Materializer>,
    fetcher: Arc<dyn AudioFetcher>,
    player: Arc<dyn MediaPlayer>,
    cache_dir: PathBuf,
    options: ProcessorOptions,
}

impl StateProcessor {
    pub fn new(
        host: Arc<dyn HostLibrary>,
        registry: RetrieverRegistry,
        materializer: Arc<Materializer>,
        fetcher: Arc<dyn AudioFetcher>,
        player: Arc<dyn MediaPlayer>,
        cache_dir: impl Into<PathBuf>,
        options: ProcessorOptions,
    ) -> Self {
        Self {
            host,
            registry,
            materializer,
            fetcher,
            player,
            cache_dir: cache_dir.into(),
            options,
        }
    }

    pub fn options(&self) -> ProcessorOptions {
        self.options
    }

    /// Resolve the item about to play
    pub async fn process_now_playing(
        &self,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<ProcessOutcome> {
        let Some(snapshot) =
            PlaceholderSnapshot::from_now_playing(self.host.as_ref(), &self.cache_dir).await?
        else {
            return Ok(ProcessOutcome::NotManaged);
        };
        let Some(comment) = snapshot.comment.clone() else {
            return Ok(ProcessOutcome::NotManaged);
        };

        debug!(path = %snapshot.path.display(), state = ?comment.state, "Processing now playing");
        match comment.state {
            State::Loaded => Ok(ProcessOutcome::AlreadyLoaded),
            State::UnloadedAlbum => {
                self.host.pause_playback();
                self.expand_album(
                    &snapshot,
                    &comment,
                    self.options.queue_tracks_after_album_load,
                    progress,
                    cancel,
                )
                .await
            }
            State::UnloadedTrack => {
                self.host.pause_playback();
                self.resolve_track(&snapshot, &comment, cancel).await
            }
            State::LinkTrack => {
                self.host.pause_playback();
                self.follow_link(&comment)
            }
        }
    }

    /// Expand an album placeholder that is not necessarily playing
    ///
    /// Other placeholders are left alone and reported as not managed.
    pub async fn expand_album_at(
        &self,
        path: &Path,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<ProcessOutcome> {
        let Some(snapshot) =
            PlaceholderSnapshot::from_path(self.host.as_ref(), path, &self.cache_dir).await?
        else {
            return Ok(ProcessOutcome::NotManaged);
        };
        match snapshot.comment.clone() {
            Some(comment) if comment.state == State::UnloadedAlbum => {
                self.expand_album(&snapshot, &comment, false, progress, cancel)
                    .await
            }
            _ => Ok(ProcessOutcome::NotManaged),
        }
    }

    /// Replace an album placeholder by placeholders for its tracks
    pub async fn expand_album(
        &self,
        snapshot: &PlaceholderSnapshot,
        comment: &CommentData,
        queue_tracks: bool,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<ProcessOutcome> {
        let album_artist = PlaceholderSnapshot::require(&snapshot.album_artist, "album artist")?;
        let album = PlaceholderSnapshot::require(&snapshot.album, "album")?;
        let folder = snapshot.folder()?;

        let retriever = self
            .registry
            .album_tracks(comment.retriever_data.source())?;
        progress.status(&format!("Loading {} - {}", album_artist, album));
        let tracks = retriever.list_tracks(&comment.retriever_data, cancel).await?;

        if tracks.is_empty() {
            info!(album = %album, "Album has no tracks");
            self.host.refresh_panels();
            return Ok(ProcessOutcome::AlbumExpanded {
                tracks: 0,
                summary: BatchSummary::default(),
                advanced: false,
            });
        }

        let artwork = snapshot
            .artwork
            .clone()
            .map(|bytes| Artwork::Bytes(Arc::new(bytes)))
            .unwrap_or_default();

        let specs: Vec<PlaceholderSpec> = tracks
            .iter()
            .enumerate()
            .map(|(index, track)| {
                let numbering = parse_track_and_disc(
                    track.track_position.as_deref(),
                    track.disc_position.as_deref(),
                );
                let path = folder.join(track_file_name(&numbering, index, track));
                PlaceholderSpec::new(path, comment.for_track(track.retriever_data.clone()))
                    .tag(Tag::TrackTitle, track.title.as_str())
                    .tag(Tag::Artist, track.artist.as_str())
                    .tag(Tag::AlbumArtist, album_artist)
                    .tag(Tag::Album, album)
                    .tag(Tag::Year, snapshot.year.clone().unwrap_or_default())
                    .tag(Tag::TrackNo, numbering.track.unwrap_or_default())
                    .tag(Tag::TrackCount, numbering.track_count.unwrap_or_default())
                    .tag(Tag::DiscNo, numbering.disc.unwrap_or_default())
                    .tag(Tag::DiscCount, numbering.disc_count.unwrap_or_default())
                    .artwork(artwork.clone())
                    .on_existing(ExistingPolicy::Reregister)
            })
            .collect();
        let paths: Vec<PathBuf> = specs.iter().map(|s| s.path.clone()).collect();

        let summary = self
            .materializer
            .materialize_batch(specs, progress, cancel)
            .await?;
        self.host.refresh_panels();

        let advanced = queue_tracks && self.queue_and_advance(&snapshot.path, &paths);
        info!(
            album = %album,
            tracks = tracks.len(),
            written = summary.written,
            advanced = advanced,
            "Album expanded"
        );
        Ok(ProcessOutcome::AlbumExpanded {
            tracks: tracks.len(),
            summary,
            advanced,
        })
    }

    /// Queue the album's tracks after the placeholder and skip past it
    fn queue_and_advance(&self, placeholder: &Path, tracks: &[PathBuf]) -> bool {
        if self.host.now_playing().as_deref() != Some(placeholder) {
            debug!("Album placeholder no longer current, not queueing");
            return false;
        }
        // Each queued file goes right after the current item
        for path in tracks.iter().rev() {
            if let Err(e) = self.host.queue_next(path) {
                warn!(path = %path.display(), error = %e, "Could not queue track");
            }
        }
        let current = self.host.now_playing_index();
        let advanced = self.host.play_next().and_then(|_| match current {
            Some(index) => self.host.remove_at(index),
            None => Ok(()),
        });
        match advanced {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Could not advance past album placeholder");
                false
            }
        }
    }

    /// Download real audio for a track placeholder
    ///
    /// The placeholder is moved aside while downloading and put back
    /// untouched if the download fails, finds nothing or is cancelled.
    pub async fn resolve_track(
        &self,
        snapshot: &PlaceholderSnapshot,
        comment: &CommentData,
        cancel: &CancellationToken,
    ) -> ExploreResult<ProcessOutcome> {
        let artist = PlaceholderSnapshot::require(&snapshot.artist, "artist")?;
        let title = PlaceholderSnapshot::require(&snapshot.title, "title")?;
        let query = format!("{} - {}", artist, title);

        if self.options.use_media_player {
            let url = self
                .fetcher
                .stream_url(&query, cancel)
                .await?
                .ok_or_else(|| ExploreError::DownloadFailed(format!("No stream found for {}", query)))?;
            self.player.play(&url)?;
            return Ok(ProcessOutcome::Streaming { url });
        }

        let folder = snapshot.folder()?;
        let stem = snapshot
            .path
            .file_stem()
            .ok_or_else(|| ExploreError::InvalidState("Placeholder has no file name".to_string()))?;
        let out_no_ext = folder.join(stem);

        let backup = PlaceholderBackup::create(&snapshot.path).await?;
        let downloaded = match self.fetcher.download(&query, &out_no_ext, cancel).await {
            Ok(Some(path)) if path.exists() => path,
            Ok(_) => {
                backup.restore().await?;
                return Err(ExploreError::DownloadFailed(format!("No audio found for {}", query)));
            }
            Err(e) => {
                backup.restore().await?;
                return Err(e);
            }
        };
        backup.discard().await?;

        let still_current = self.host.now_playing().as_deref() == Some(snapshot.path.as_path());

        self.host.add_file(&downloaded)?;
        let mut loaded = comment.clone();
        loaded.state = State::Loaded;
        for (tag, value) in snapshot_tags(snapshot) {
            self.host.set_tag(&downloaded, tag, &value)?;
        }
        self.host.set_tag(&downloaded, Tag::Comment, &loaded.encode()?)?;
        self.host.commit_tags(&downloaded)?;
        if let Some(artwork) = &snapshot.artwork {
            if let Err(e) = self.host.set_artwork(&downloaded, artwork) {
                warn!(path = %downloaded.display(), error = %e, "Could not reapply artwork");
            }
        }

        let advanced = still_current
            && match self.host.advance_to(&downloaded) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Could not requeue downloaded track");
                    false
                }
            };

        info!(query = %query, path = %downloaded.display(), advanced = advanced, "Track loaded");
        Ok(ProcessOutcome::TrackLoaded {
            path: downloaded,
            advanced,
        })
    }

    /// Play the library file a link placeholder points to
    pub fn follow_link(&self, comment: &CommentData) -> ExploreResult<ProcessOutcome> {
        let path = comment
            .library_path()
            .ok_or_else(|| ExploreError::InvalidState("Link has no library path".to_string()))?;
        if !path.exists() {
            return Err(ExploreError::BrokenLink(path));
        }
        self.host.advance_to(&path)?;
        info!(path = %path.display(), "Playing linked track");
        Ok(ProcessOutcome::Linked { path })
    }
}

/// Placeholder moved aside for the duration of a download
///
/// Restored on drop unless discarded, so an abandoned download future
/// still puts the placeholder back.
struct PlaceholderBackup {
    path: PathBuf,
    backup: PathBuf,
    active: bool,
}

impl PlaceholderBackup {
    async fn create(path: &Path) -> std::io::Result<Self> {
        let mut name = path.as_os_str().to_os_string();
        name.push(BACKUP_SUFFIX);
        let backup = PathBuf::from(name);

        // A backup without its placeholder is left over from an interrupted run
        if tokio::fs::try_exists(&backup).await? && !tokio::fs::try_exists(path).await? {
            tokio::fs::rename(&backup, path).await?;
        }

        let active = tokio::fs::try_exists(path).await?;
        if active {
            tokio::fs::rename(path, &backup).await?;
            debug!(backup = %backup.display(), "Placeholder backed up");
        }
        Ok(Self {
            path: path.to_path_buf(),
            backup,
            active,
        })
    }

    async fn restore(mut self) -> std::io::Result<()> {
        if !self.active {
            return Ok(());
        }
        if tokio::fs::try_exists(&self.path).await? {
            tokio::fs::remove_file(&self.path).await?;
        }
        tokio::fs::rename(&self.backup, &self.path).await?;
        self.active = false;
        debug!(path = %self.path.display(), "Placeholder restored");
        Ok(())
    }

    async fn discard(mut self) -> std::io::Result<()> {
        if self.active {
            tokio::fs::remove_file(&self.backup).await?;
            self.active = false;
        }
        Ok(())
    }

    /// Blocking restore for `Drop`, where nothing can be awaited
    fn put_back_blocking(&mut self) -> std::io::Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        std::fs::rename(&self.backup, &self.path)?;
        debug!(path = %self.path.display(), "Placeholder restored on drop");
        Ok(())
    }
}

impl Drop for PlaceholderBackup {
    fn drop(&mut self) {
        if let Err(e) = self.put_back_blocking() {
            warn!(path = %self.path.display(), error = %e, "Could not restore placeholder");
        }
    }
}

/// `"{track} - {artist} - {title}.opus"`, disc-prefixed on multi-disc releases
fn track_file_name(numbering: &Numbering, index: usize, track: &Track) -> String {
    let number = numbering
        .track
        .clone()
        .unwrap_or_else(|| (index + 1).to_string());
    let number = match number.parse::<u32>() {
        Ok(n) => format!("{:02}", n),
        Err(_) => number,
    };
    let prefix = match (&numbering.disc, &numbering.disc_count) {
        (Some(disc), Some(count)) if count != "1" => format!("{}-{}", disc, number),
        _ => number,
    };
    safe_file_name(&format!(
        "{} - {} - {}.{}",
        prefix, track.artist, track.title, PLACEHOLDER_EXTENSION
    ))
}

/// Display tags to carry over to downloaded audio
fn snapshot_tags(snapshot: &PlaceholderSnapshot) -> Vec<(Tag, String)> {
    let numbering = &snapshot.numbering;
    [
        (Tag::TrackTitle, &snapshot.title),
        (Tag::Artist, &snapshot.artist),
        (Tag::AlbumArtist, &snapshot.album_artist),
        (Tag::Album, &snapshot.album),
        (Tag::Year, &snapshot.year),
        (Tag::TrackNo, &numbering.track),
        (Tag::TrackCount, &numbering.track_count),
        (Tag::DiscNo, &numbering.disc),
        (Tag::DiscCount, &numbering.disc_count),
    ]
    .into_iter()
    .filter_map(|(tag, value)| value.clone().map(|v| (tag, v)))
    .collect()
}
