//! Placeholder materialization
//!
//! Turns [`PlaceholderSpec`]s into registered library items. Batches run at
//! most [`MAX_FANOUT`] items at once, report monotonic progress and stop
//! scheduling new items as soon as the cancellation token fires.
//!
//! An item is either fully registered or not registered at all: the file is
//! written under a temporary name, and cancellation is checked one last time
//! before the host is told about it.

use crate::error::{ExploreError, ExploreResult};
use crate::library::{HostLibrary, Tag};
use crate::models::CommentData;
use crate::placeholder::{read_cover, PlaceholderTemplate, COVER_FILE};
use crate::progress::{ProgressCounter, ProgressReporter};
use crate::providers::{build_http_client, fetch_bytes, ProviderError, ProviderResult};
use crate::retrievers::MAX_FANOUT;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Artwork to attach to a placeholder
#[derive(Debug, Clone, Default)]
pub enum Artwork {
    #[default]
    None,
    /// Already downloaded, shared between items of one album
    Bytes(Arc<Vec<u8>>),
    /// Fetched on demand; failures leave the item without artwork
    Url(String),
}

/// What to do when the target path already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingPolicy {
    /// Leave the file alone
    #[default]
    Skip,
    /// Add it to the library again and reapply its folder cover
    Reregister,
}

/// One placeholder to write
#[derive(Debug, Clone)]
pub struct PlaceholderSpec {
    pub path: PathBuf,
    pub tags: Vec<(Tag, String)>,
    pub comment: CommentData,
    pub artwork: Artwork,
    /// Also store the artwork as the folder's cover file
    pub save_cover: bool,
    pub on_existing: ExistingPolicy,
}

impl PlaceholderSpec {
    pub fn new(path: impl Into<PathBuf>, comment: CommentData) -> Self {
        Self {
            path: path.into(),
            tags: Vec::new(),
            comment,
            artwork: Artwork::None,
            save_cover: false,
            on_existing: ExistingPolicy::Skip,
        }
    }

    /// Add a tag; blank values are dropped
    pub fn tag(mut self, tag: Tag, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.trim().is_empty() {
            self.tags.push((tag, value));
        }
        self
    }

    pub fn artwork(mut self, artwork: Artwork) -> Self {
        self.artwork = artwork;
        self
    }

    pub fn save_cover(mut self, save: bool) -> Self {
        self.save_cover = save;
        self
    }

    pub fn on_existing(mut self, policy: ExistingPolicy) -> Self {
        self.on_existing = policy;
        self
    }
}

/// Outcome of a single item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Written,
    /// A file already existed and was left as is
    Skipped,
    /// A file already existed and was registered again
    Reregistered,
}

/// Counts for a completed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Downloads artwork for placeholders
#[async_trait]
pub trait ArtworkFetcher: Send + Sync {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> ProviderResult<Vec<u8>>;
}

pub struct HttpArtworkFetcher {
    client: Client,
}

impl HttpArtworkFetcher {
    pub fn new() -> ProviderResult<Self> {
        Ok(Self {
            client: build_http_client()?,
        })
    }
}

#[async_trait]
impl ArtworkFetcher for HttpArtworkFetcher {
    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> ProviderResult<Vec<u8>> {
        debug!(url = %url, "Fetching artwork");
        fetch_bytes(self.client.get(url), cancel).await
    }
}

/// Writes placeholders and registers them with the host
pub struct Materializer {
    host: Arc<dyn HostLibrary>,
    template: PlaceholderTemplate,
    artwork: Arc<dyn ArtworkFetcher>,
}

impl Materializer {
    pub fn new(
        host: Arc<dyn HostLibrary>,
        template: PlaceholderTemplate,
        artwork: Arc<dyn ArtworkFetcher>,
    ) -> Self {
        Self {
            host,
            template,
            artwork,
        }
    }

    pub fn template(&self) -> &PlaceholderTemplate {
        &self.template
    }

    /// Write and register one placeholder
    pub async fn materialize_one(
        &self,
        spec: PlaceholderSpec,
        cancel: &CancellationToken,
    ) -> ExploreResult<ItemOutcome> {
        if cancel.is_cancelled() {
            return Err(ExploreError::Cancelled);
        }

        if tokio::fs::try_exists(&spec.path).await? {
            return match spec.on_existing {
                ExistingPolicy::Skip => {
                    debug!(path = %spec.path.display(), "Placeholder target exists, skipping");
                    Ok(ItemOutcome::Skipped)
                }
                ExistingPolicy::Reregister => {
                    self.reregister(&spec.path).await?;
                    Ok(ItemOutcome::Reregistered)
                }
            };
        }

        let image = self.resolve_artwork(&spec.artwork, cancel).await?;

        self.template.write_to(&spec.path).await?;

        let cover = match (&image, spec.save_cover) {
            (Some(bytes), true) => save_cover_file(&spec.path, bytes).await,
            _ => None,
        };

        if cancel.is_cancelled() {
            if let Err(e) = tokio::fs::remove_file(&spec.path).await {
                warn!(path = %spec.path.display(), error = %e, "Could not remove cancelled placeholder");
            }
            if let Some(cover) = cover {
                if let Err(e) = tokio::fs::remove_file(&cover).await {
                    warn!(path = %cover.display(), error = %e, "Could not remove cancelled cover");
                }
            }
            remove_if_empty(spec.path.parent()).await;
            return Err(ExploreError::Cancelled);
        }

        // No await below: registration completes once started
        self.register(&spec)?;
        if let Some(bytes) = &image {
            if let Err(e) = self.host.set_artwork(&spec.path, bytes) {
                warn!(path = %spec.path.display(), error = %e, "Could not attach artwork");
            }
        }

        Ok(ItemOutcome::Written)
    }

    /// Materialize every spec with bounded concurrency
    ///
    /// Per-item failures are logged and counted. Returns
    /// [`ExploreError::Cancelled`] if the token fired before the batch
    /// finished; items registered up to then stay in the library.
    pub async fn materialize_batch(
        &self,
        specs: Vec<PlaceholderSpec>,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<BatchSummary> {
        let total = specs.len();
        let mut summary = BatchSummary {
            total,
            ..BatchSummary::default()
        };

        if total == 0 {
            progress.progress(100.0);
            return Ok(summary);
        }
        if cancel.is_cancelled() {
            return Err(ExploreError::Cancelled);
        }

        self.template.ensure().await?;
        let counter = ProgressCounter::new(total);

        let results: Vec<Option<(PathBuf, ExploreResult<ItemOutcome>)>> = stream::iter(specs)
            .map(|spec| {
                let counter = &counter;
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let path = spec.path.clone();
                    let result = self.materialize_one(spec, cancel).await;
                    if !matches!(result, Err(ExploreError::Cancelled)) {
                        counter.complete_one(progress);
                    }
                    Some((path, result))
                }
            })
            .buffer_unordered(MAX_FANOUT)
            .collect()
            .await;

        for (path, result) in results.into_iter().flatten() {
            match result {
                Ok(ItemOutcome::Written) | Ok(ItemOutcome::Reregistered) => summary.written += 1,
                Ok(ItemOutcome::Skipped) => summary.skipped += 1,
                Err(ExploreError::Cancelled) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Placeholder failed");
                    summary.failed += 1;
                }
            }
        }

        if cancel.is_cancelled() {
            info!(
                completed = counter.completed(),
                total = total,
                "Materialization cancelled"
            );
            return Err(ExploreError::Cancelled);
        }

        info!(
            total = summary.total,
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed,
            "Materialization completed"
        );
        Ok(summary)
    }

    async fn resolve_artwork(
        &self,
        artwork: &Artwork,
        cancel: &CancellationToken,
    ) -> ExploreResult<Option<Arc<Vec<u8>>>> {
        match artwork {
            Artwork::None => Ok(None),
            Artwork::Bytes(bytes) => Ok(Some(Arc::clone(bytes))),
            Artwork::Url(url) => match self.artwork.fetch(url, cancel).await {
                Ok(bytes) if !bytes.is_empty() => Ok(Some(Arc::new(bytes))),
                Ok(_) => Ok(None),
                Err(ProviderError::Cancelled) => Err(ExploreError::Cancelled),
                Err(e) => {
                    warn!(url = %url, error = %e, "Artwork download failed, continuing without");
                    Ok(None)
                }
            },
        }
    }

    fn register(&self, spec: &PlaceholderSpec) -> ExploreResult<()> {
        let path = spec.path.as_path();
        self.host.add_file(path)?;
        for (tag, value) in &spec.tags {
            self.host.set_tag(path, *tag, value)?;
        }
        self.host.set_tag(path, Tag::Comment, &spec.comment.encode()?)?;
        self.host.commit_tags(path)?;
        Ok(())
    }

    async fn reregister(&self, path: &Path) -> ExploreResult<()> {
        self.host.add_file(path)?;
        if let Some(cover) = read_cover(path).await {
            if let Err(e) = self.host.set_artwork(path, &cover) {
                warn!(path = %path.display(), error = %e, "Could not reapply artwork");
            }
        }
        debug!(path = %path.display(), "Re-registered existing file");
        Ok(())
    }
}

/// Drop a folder left empty by a cancelled item
async fn remove_if_empty(folder: Option<&Path>) {
    let Some(folder) = folder else {
        return;
    };
    // Fails harmlessly when other items share the folder
    if let Err(e) = tokio::fs::remove_dir(folder).await {
        debug!(path = %folder.display(), error = %e, "Folder kept after cancel");
    }
}

/// Store the folder cover unless one is already there
///
/// Returns the cover path when this call created it.
async fn save_cover_file(placeholder: &Path, bytes: &[u8]) -> Option<PathBuf> {
    let cover = placeholder.parent()?.join(COVER_FILE);
    match tokio::fs::try_exists(&cover).await {
        Ok(true) => None,
        Ok(false) => match tokio::fs::write(&cover, bytes).await {
            Ok(()) => Some(cover),
            Err(e) => {
                warn!(path = %cover.display(), error = %e, "Could not write cover file");
                None
            }
        },
        Err(e) => {
            warn!(path = %cover.display(), error = %e, "Could not check cover file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MemoryLibrary;
    use crate::models::{OperationKind, RetrieverData, State};
    use tempfile::TempDir;

    struct FailingArtwork;

    #[async_trait]
    impl ArtworkFetcher for FailingArtwork {
        async fn fetch(&self, _url: &str, _cancel: &CancellationToken) -> ProviderResult<Vec<u8>> {
            Err(ProviderError::Network("offline".to_string()))
        }
    }

    /// Serves artwork, then cancels the operation it was fetched for
    struct CancellingArtwork;

    #[async_trait]
    impl ArtworkFetcher for CancellingArtwork {
        async fn fetch(&self, _url: &str, cancel: &CancellationToken) -> ProviderResult<Vec<u8>> {
            cancel.cancel();
            Ok(b"img".to_vec())
        }
    }

    fn setup(dir: &TempDir) -> (Arc<MemoryLibrary>, Materializer) {
        let host = Arc::new(MemoryLibrary::new());
        let materializer = Materializer::new(
            host.clone(),
            PlaceholderTemplate::new(dir.path().join("cache").join("dummy.opus")),
            Arc::new(FailingArtwork),
        );
        (host, materializer)
    }

    fn spec(dir: &TempDir, name: &str) -> PlaceholderSpec {
        let comment = CommentData::new(
            OperationKind::MoreAlbums,
            State::UnloadedAlbum,
            "MoreAlbums_a_Main",
            RetrieverData::discogs(1),
        );
        PlaceholderSpec::new(dir.path().join("cache").join(name).join("p.opus"), comment)
            .tag(Tag::Album, name)
            .tag(Tag::Year, "")
    }

    #[tokio::test]
    async fn test_failed_artwork_does_not_fail_item() {
        let dir = TempDir::new().unwrap();
        let (host, materializer) = setup(&dir);
        let item = spec(&dir, "One").artwork(Artwork::Url("http://x/a.jpg".to_string()));
        let path = item.path.clone();

        let outcome = materializer
            .materialize_one(item, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, ItemOutcome::Written);
        assert!(host.contains(&path));
        assert_eq!(host.get_tag(&path, Tag::Album).as_deref(), Some("One"));
        assert_eq!(host.get_tag(&path, Tag::Year), None);
        assert!(host.artwork(&path).is_none());
        let comment = host.get_tag(&path, Tag::Comment).unwrap();
        assert!(CommentData::decode(&comment).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_existing_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        let (host, materializer) = setup(&dir);
        let item = spec(&dir, "Real");
        std::fs::create_dir_all(item.path.parent().unwrap()).unwrap();
        std::fs::write(&item.path, b"real audio").unwrap();
        let path = item.path.clone();

        let outcome = materializer
            .materialize_one(item, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, ItemOutcome::Skipped);
        assert_eq!(std::fs::read(&path).unwrap(), b"real audio");
        assert!(!host.contains(&path));
    }

    #[tokio::test]
    async fn test_existing_file_reregistered_with_cover() {
        let dir = TempDir::new().unwrap();
        let (host, materializer) = setup(&dir);
        let item = spec(&dir, "Again").on_existing(ExistingPolicy::Reregister);
        let folder = item.path.parent().unwrap().to_path_buf();
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(&item.path, b"downloaded").unwrap();
        std::fs::write(folder.join(COVER_FILE), b"jpeg").unwrap();
        let path = item.path.clone();

        let outcome = materializer
            .materialize_one(item, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome, ItemOutcome::Reregistered);
        assert!(host.contains(&path));
        assert_eq!(host.artwork(&path).as_deref(), Some(&b"jpeg"[..]));
    }

    #[tokio::test]
    async fn test_cover_saved_from_bytes() {
        let dir = TempDir::new().unwrap();
        let (host, materializer) = setup(&dir);
        let item = spec(&dir, "Covered")
            .artwork(Artwork::Bytes(Arc::new(b"img".to_vec())))
            .save_cover(true);
        let path = item.path.clone();

        materializer
            .materialize_one(item, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(path.parent().unwrap().join(COVER_FILE)).unwrap(), b"img");
        assert_eq!(host.artwork(&path).as_deref(), Some(&b"img"[..]));
    }

    #[tokio::test]
    async fn test_cancelled_item_leaves_no_cover_or_folder() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(MemoryLibrary::new());
        let materializer = Materializer::new(
            host.clone(),
            PlaceholderTemplate::new(dir.path().join("cache").join("dummy.opus")),
            Arc::new(CancellingArtwork),
        );
        let item = spec(&dir, "Late")
            .artwork(Artwork::Url("http://x/a.jpg".to_string()))
            .save_cover(true);
        let path = item.path.clone();
        let folder = path.parent().unwrap().to_path_buf();

        let result = materializer
            .materialize_one(item, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(ExploreError::Cancelled)));
        assert!(!path.exists());
        assert!(!folder.join(COVER_FILE).exists());
        assert!(!folder.exists());
        assert!(!host.contains(&path));
    }

    #[tokio::test]
    async fn test_empty_batch_reports_completion_once() {
        let dir = TempDir::new().unwrap();
        let (_host, materializer) = setup(&dir);

        let summary = materializer
            .materialize_batch(Vec::new(), &crate::progress::NoProgress, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(summary, BatchSummary::default());
    }
}
