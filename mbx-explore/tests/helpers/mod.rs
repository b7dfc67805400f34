//! Shared fixtures for integration tests
//!
//! In-memory Discogs, MusicBrainz and Last.fm APIs, a scripted audio
//! fetcher, a recording player and progress reporters. Nothing here touches
//! the network.

#![allow(dead_code)]

use async_trait::async_trait;
use mbx_explore::downloader::{with_audio_extension, AudioFetcher, MediaPlayer};
use mbx_explore::error::{ExploreError, ExploreResult};
use mbx_explore::materializer::ArtworkFetcher;
use mbx_explore::models::EntityKind;
use mbx_explore::progress::ProgressReporter;
use mbx_explore::providers::discogs::{
    DiscogsApi, DiscogsArtistRef, DiscogsPagination, DiscogsReleaseDetail, DiscogsReleaseSummary,
    DiscogsReleasesPage, DiscogsSearchPage, DiscogsSearchResult, DiscogsTrack,
};
use mbx_explore::providers::lastfm::{LastfmApi, LfAlbum, LfSimilarAlbum, LfTrack};
use mbx_explore::providers::musicbrainz::{
    CoverArtTarget, MbArtistCredit, MbCoverArtInfo, MbEntity, MbRelease, MbReleaseFilter,
    MbReleaseGroup, MbReleaseGroupPage, MbReleasePage, MbSearchPage, MusicBrainzApi,
};
use mbx_explore::providers::{ProviderError, ProviderResult};
use mbx_explore::retrievers::{DiscogsRetriever, LastfmRetriever, RetrieverRegistry};
use mbx_explore::{Explorer, ExplorerParts, ExplorerPaths, MemoryLibrary, Settings};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Discogs
// ============================================================================

/// Discogs API answering from fixed data
#[derive(Default)]
pub struct FakeDiscogs {
    pub search_results: Vec<DiscogsSearchResult>,
    /// Release listing pages, in order
    pub release_pages: Vec<Vec<DiscogsReleaseSummary>>,
    pub releases: HashMap<u64, DiscogsReleaseDetail>,
    /// (page, per_page) of every search call
    pub search_calls: Mutex<Vec<(u32, u32)>>,
    pub listing_calls: AtomicUsize,
}

#[async_trait]
impl DiscogsApi for FakeDiscogs {
    async fn search(
        &self,
        _query: &str,
        _kind: EntityKind,
        page: u32,
        per_page: u32,
        _cancel: &CancellationToken,
    ) -> ProviderResult<DiscogsSearchPage> {
        self.search_calls.lock().unwrap().push((page, per_page));
        let per_page = per_page.max(1) as usize;
        let pages = self.search_results.len().div_ceil(per_page).max(1);
        let start = (page.max(1) as usize - 1) * per_page;
        let results = self
            .search_results
            .iter()
            .skip(start)
            .take(per_page)
            .cloned()
            .collect();
        Ok(DiscogsSearchPage {
            pagination: DiscogsPagination {
                page,
                pages: pages as u32,
            },
            results,
        })
    }

    async fn entity_releases(
        &self,
        _kind: EntityKind,
        _id: u64,
        page: u32,
        _per_page: u32,
        _cancel: &CancellationToken,
    ) -> ProviderResult<DiscogsReleasesPage> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        let releases = self
            .release_pages
            .get(page.max(1) as usize - 1)
            .cloned()
            .unwrap_or_default();
        Ok(DiscogsReleasesPage {
            pagination: DiscogsPagination {
                page,
                pages: self.release_pages.len() as u32,
            },
            releases,
        })
    }

    async fn release(
        &self,
        id: u64,
        _cancel: &CancellationToken,
    ) -> ProviderResult<DiscogsReleaseDetail> {
        self.releases
            .get(&id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("release {}", id)))
    }
}

pub fn search_result(id: u64, title: &str) -> DiscogsSearchResult {
    DiscogsSearchResult {
        id,
        title: title.to_string(),
        kind: "artist".to_string(),
    }
}

/// A "Main" master release by `artist`
pub fn main_master(id: u64, title: &str, artist: &str, year: u32) -> DiscogsReleaseSummary {
    DiscogsReleaseSummary {
        id,
        title: title.to_string(),
        artist: artist.to_string(),
        year: Some(year),
        thumb: None,
        role: Some("Main".to_string()),
        kind: Some("master".to_string()),
        main_release: Some(id + 10_000),
    }
}

pub fn release_detail(id: u64, artist: &str, titles: &[&str]) -> DiscogsReleaseDetail {
    DiscogsReleaseDetail {
        id,
        title: format!("Release {}", id),
        artists: vec![DiscogsArtistRef {
            name: artist.to_string(),
        }],
        tracklist: titles
            .iter()
            .enumerate()
            .map(|(i, title)| DiscogsTrack {
                position: (i + 1).to_string(),
                kind: "track".to_string(),
                title: title.to_string(),
                duration: "3:30".to_string(),
                artists: Vec::new(),
            })
            .collect(),
    }
}

// ============================================================================
// MusicBrainz
// ============================================================================

/// MusicBrainz API answering from fixed data
#[derive(Default)]
pub struct FakeMusicBrainz {
    pub search_results: Vec<MbEntity>,
    pub release_groups: Vec<MbReleaseGroup>,
    /// Releases the artist appears on
    pub appearances: Vec<MbRelease>,
    pub label_releases: Vec<MbRelease>,
    /// Release group id to its releases
    pub group_releases: HashMap<String, Vec<MbRelease>>,
    pub releases: HashMap<String, MbRelease>,
    /// (limit, offset) of every search call
    pub search_calls: Mutex<Vec<(u32, u32)>>,
    /// (offset, all_statuses) of every release group page
    pub group_calls: Mutex<Vec<(u32, bool)>>,
    pub cover_calls: Mutex<Vec<(CoverArtTarget, String)>>,
    pub covers_in_flight: InFlight,
}

fn page_of<T: Clone>(items: &[T], limit: u32, offset: u32) -> Vec<T> {
    items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl MusicBrainzApi for FakeMusicBrainz {
    async fn search(
        &self,
        _kind: EntityKind,
        _query: &str,
        limit: u32,
        offset: u32,
        _cancel: &CancellationToken,
    ) -> ProviderResult<MbSearchPage> {
        self.search_calls.lock().unwrap().push((limit, offset));
        Ok(MbSearchPage {
            count: self.search_results.len() as u32,
            entities: page_of(&self.search_results, limit, offset),
        })
    }

    async fn release_groups(
        &self,
        _artist_id: &str,
        limit: u32,
        offset: u32,
        all_statuses: bool,
        _cancel: &CancellationToken,
    ) -> ProviderResult<MbReleaseGroupPage> {
        self.group_calls.lock().unwrap().push((offset, all_statuses));
        Ok(MbReleaseGroupPage {
            count: self.release_groups.len() as u32,
            release_groups: page_of(&self.release_groups, limit, offset),
        })
    }

    async fn releases(
        &self,
        filter: MbReleaseFilter<'_>,
        limit: u32,
        offset: u32,
        _cancel: &CancellationToken,
    ) -> ProviderResult<MbReleasePage> {
        let all = match filter {
            MbReleaseFilter::TrackArtist(_) => self.appearances.clone(),
            MbReleaseFilter::Label(_) => self.label_releases.clone(),
            MbReleaseFilter::ReleaseGroup(id) => {
                self.group_releases.get(id).cloned().unwrap_or_default()
            }
        };
        Ok(MbReleasePage {
            count: all.len() as u32,
            releases: page_of(&all, limit, offset),
        })
    }

    async fn release(&self, id: &str, _cancel: &CancellationToken) -> ProviderResult<MbRelease> {
        self.releases
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("release {}", id)))
    }

    async fn cover_art(
        &self,
        target: CoverArtTarget,
        id: &str,
        _cancel: &CancellationToken,
    ) -> ProviderResult<Option<String>> {
        self.cover_calls.lock().unwrap().push((target, id.to_string()));
        self.covers_in_flight.occupy().await;
        Ok(Some(format!("https://caa.example/{}.jpg", id)))
    }
}

pub fn mb_entity(id: &str, name: &str) -> MbEntity {
    MbEntity {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub fn mb_credit(name: &str) -> Vec<MbArtistCredit> {
    vec![MbArtistCredit {
        name: name.to_string(),
        joinphrase: String::new(),
    }]
}

pub fn mb_group(id: &str, title: &str, artist: &str) -> MbReleaseGroup {
    MbReleaseGroup {
        id: id.to_string(),
        title: title.to_string(),
        first_release_date: "2001-05-01".to_string(),
        artist_credit: mb_credit(artist),
    }
}

pub fn mb_release(id: &str, title: &str, artist: &str, front_cover: bool) -> MbRelease {
    MbRelease {
        id: id.to_string(),
        title: title.to_string(),
        date: Some("2001".to_string()),
        status: Some("Official".to_string()),
        artist_credit: mb_credit(artist),
        cover_art_archive: MbCoverArtInfo {
            front: front_cover,
            count: u32::from(front_cover),
        },
        media: Vec::new(),
    }
}

// ============================================================================
// Last.fm
// ============================================================================

#[derive(Default)]
pub struct FakeLastfm {
    pub top_tracks: Vec<LfTrack>,
    pub albums: Vec<LfAlbum>,
    pub similar: Vec<LfSimilarAlbum>,
}

#[async_trait]
impl LastfmApi for FakeLastfm {
    async fn top_tracks(
        &self,
        _artist: &str,
        limit: u32,
        _cancel: &CancellationToken,
    ) -> ProviderResult<Vec<LfTrack>> {
        Ok(self.top_tracks.iter().take(limit as usize).cloned().collect())
    }

    async fn album_info(
        &self,
        artist: &str,
        album: &str,
        _cancel: &CancellationToken,
    ) -> ProviderResult<LfAlbum> {
        self.albums
            .iter()
            .find(|a| a.artist.eq_ignore_ascii_case(artist) && a.name.eq_ignore_ascii_case(album))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("{} - {}", artist, album)))
    }

    async fn similar_albums(
        &self,
        _album_url: &str,
        _cancel: &CancellationToken,
    ) -> ProviderResult<Vec<LfSimilarAlbum>> {
        Ok(self.similar.clone())
    }
}

pub fn lf_track(name: &str, seconds: u64) -> LfTrack {
    LfTrack {
        name: name.to_string(),
        duration: Some(seconds),
        artist: None,
    }
}

// ============================================================================
// Audio, player, artwork
// ============================================================================

/// What the scripted fetcher does on download
#[derive(Debug, Clone)]
pub enum FetchBehavior {
    /// Write these bytes to the target
    Write(Vec<u8>),
    /// Report that nothing was found
    Nothing,
    /// Fail like a crashed yt-dlp
    Fail,
}

pub struct FakeFetcher {
    pub behavior: FetchBehavior,
    pub stream: Option<String>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(behavior: FetchBehavior) -> Self {
        Self {
            behavior,
            stream: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn streaming(url: &str) -> Self {
        Self {
            behavior: FetchBehavior::Fail,
            stream: Some(url.to_string()),
            queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AudioFetcher for FakeFetcher {
    async fn download(
        &self,
        query: &str,
        out_no_ext: &Path,
        _cancel: &CancellationToken,
    ) -> ExploreResult<Option<PathBuf>> {
        self.queries.lock().unwrap().push(query.to_string());
        match &self.behavior {
            FetchBehavior::Write(bytes) => {
                let target = with_audio_extension(out_no_ext);
                std::fs::write(&target, bytes)?;
                Ok(Some(target))
            }
            FetchBehavior::Nothing => Ok(None),
            FetchBehavior::Fail => Err(ExploreError::DownloadFailed("yt-dlp exited with 1".to_string())),
        }
    }

    async fn stream_url(
        &self,
        query: &str,
        _cancel: &CancellationToken,
    ) -> ExploreResult<Option<String>> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.stream.clone())
    }
}

#[derive(Default)]
pub struct RecordingPlayer {
    pub played: Mutex<Vec<String>>,
}

impl MediaPlayer for RecordingPlayer {
    fn play(&self, url: &str) -> ExploreResult<()> {
        self.played.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Serves the same image for every URL
pub struct StaticArtwork(pub Vec<u8>);

#[async_trait]
impl ArtworkFetcher for StaticArtwork {
    async fn fetch(&self, _url: &str, _cancel: &CancellationToken) -> ProviderResult<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Counts how many fetches run at the same time
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
    pub total: AtomicUsize,
}

impl InFlight {
    /// Hold a slot for a short while, yielding so other calls can start
    pub async fn occupy(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

/// Artwork fetcher that records its concurrency
#[derive(Default)]
pub struct SlowArtwork {
    pub in_flight: InFlight,
}

#[async_trait]
impl ArtworkFetcher for SlowArtwork {
    async fn fetch(&self, _url: &str, _cancel: &CancellationToken) -> ProviderResult<Vec<u8>> {
        self.in_flight.occupy().await;
        Ok(b"jpeg".to_vec())
    }
}

// ============================================================================
// Progress
// ============================================================================

#[derive(Default)]
pub struct RecordingProgress {
    pub percents: Mutex<Vec<f64>>,
    pub statuses: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn percents(&self) -> Vec<f64> {
        self.percents.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingProgress {
    fn status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn progress(&self, percent: f64) {
        self.percents.lock().unwrap().push(percent);
    }
}

/// Cancels a token once `after` completions have been reported
pub struct CancelAfter {
    pub token: CancellationToken,
    pub after: usize,
    pub seen: AtomicUsize,
}

impl CancelAfter {
    pub fn new(token: CancellationToken, after: usize) -> Self {
        Self {
            token,
            after,
            seen: AtomicUsize::new(0),
        }
    }
}

impl ProgressReporter for CancelAfter {
    fn progress(&self, _percent: f64) {
        if self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.token.cancel();
        }
    }
}

// ============================================================================
// Explorer fixture
// ============================================================================

pub struct Fixture {
    pub dir: TempDir,
    pub library: Arc<MemoryLibrary>,
    pub explorer: Explorer,
    pub fetcher: Arc<FakeFetcher>,
    pub player: Arc<RecordingPlayer>,
}

/// Explorer over a temp root with fake Discogs and Last.fm providers
pub fn fixture(
    discogs: Arc<FakeDiscogs>,
    lastfm: Arc<FakeLastfm>,
    fetcher: FakeFetcher,
    settings: Settings,
) -> Fixture {
    let dir = TempDir::new().unwrap();
    let paths = ExplorerPaths::new(dir.path());
    paths.ensure().unwrap();

    let mut registry = RetrieverRegistry::new();
    registry.register(Arc::new(DiscogsRetriever::new(discogs)));
    registry.register(Arc::new(LastfmRetriever::new(
        lastfm,
        settings.popular_tracks_limit,
    )));

    let library = Arc::new(MemoryLibrary::new());
    let fetcher = Arc::new(fetcher);
    let player = Arc::new(RecordingPlayer::default());
    let explorer = Explorer::new(ExplorerParts {
        host: library.clone(),
        settings,
        paths,
        registry,
        artwork: Arc::new(StaticArtwork(b"cover".to_vec())),
        fetcher: fetcher.clone(),
        player: player.clone(),
    });

    Fixture {
        dir,
        library,
        explorer,
        fetcher,
        player,
    }
}

/// A real (non-placeholder) audio file registered outside the cache
pub fn add_library_file(
    library: &MemoryLibrary,
    dir: &Path,
    name: &str,
    tags: &[(mbx_explore::library::Tag, &str)],
) -> PathBuf {
    use mbx_explore::HostLibrary;

    let music = dir.join("music");
    std::fs::create_dir_all(&music).unwrap();
    let path = music.join(name);
    std::fs::write(&path, b"real audio").unwrap();
    library.add_file(&path).unwrap();
    for (tag, value) in tags {
        library.set_tag(&path, *tag, value).unwrap();
    }
    library.commit_tags(&path).unwrap();
    path
}
