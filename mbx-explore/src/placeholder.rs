//! Placeholder files
//!
//! A placeholder is a tiny valid Ogg/Opus file copied from an embedded
//! template. Its tags hold display metadata and its comment holds the
//! [`CommentData`] descriptor.

use crate::error::{ExploreError, ExploreResult};
use crate::library::{HostLibrary, Tag};
use crate::models::CommentData;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Embedded silent Ogg/Opus payload
pub const PLACEHOLDER_TEMPLATE: &[u8] = include_bytes!("../assets/placeholder.opus");

/// Placeholder and download extension
pub const PLACEHOLDER_EXTENSION: &str = "opus";

/// File name of an album's placeholder inside its folder
pub const ALBUM_PLACEHOLDER_FILE: &str = "__Load Album__.opus";

/// Title shown for an album placeholder
pub const LOAD_ALBUM_TITLE: &str = "[Load Album]";

/// Album artwork stored next to placeholders
pub const COVER_FILE: &str = "cover.jpg";

const MUSIC_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "opus"];

/// On-disk copy of the placeholder payload
#[derive(Debug, Clone)]
pub struct PlaceholderTemplate {
    path: PathBuf,
}

impl PlaceholderTemplate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the embedded payload if the template file is missing
    pub async fn ensure(&self) -> ExploreResult<()> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        debug!(path = %self.path.display(), "Writing placeholder template");
        tokio::fs::write(&self.path, PLACEHOLDER_TEMPLATE).await?;
        Ok(())
    }

    /// Copy the template to `dest`
    ///
    /// The copy goes to a temporary sibling first and is renamed into place,
    /// so `dest` is either absent or complete.
    pub async fn write_to(&self, dest: &Path) -> ExploreResult<()> {
        self.ensure().await?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = partial_path(dest);
        tokio::fs::copy(&self.path, &temp).await?;
        if let Err(e) = tokio::fs::rename(&temp, dest).await {
            if let Err(cleanup) = tokio::fs::remove_file(&temp).await {
                warn!(path = %temp.display(), error = %cleanup, "Could not remove partial placeholder");
            }
            return Err(e.into());
        }
        Ok(())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

// ============================================================================
// Path helpers
// ============================================================================

/// Make a string usable as a single path component
pub fn safe_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_end_matches('.').trim();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn is_music_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MUSIC_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// Case-insensitive check that `path` lies under `dir`
pub fn is_in_directory(path: &Path, dir: &Path) -> bool {
    let normalize = |p: &Path| p.to_string_lossy().replace('\\', "/").to_lowercase();
    let dir = format!("{}/", normalize(dir).trim_end_matches('/'));
    normalize(path).starts_with(&dir)
}

/// Track and disc numbering parsed from "n/total" positions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Numbering {
    pub track: Option<String>,
    pub track_count: Option<String>,
    pub disc: Option<String>,
    pub disc_count: Option<String>,
}

/// Split "n/total" positions; "d-n" track positions carry the disc
pub fn parse_track_and_disc(track: Option<&str>, disc: Option<&str>) -> Numbering {
    fn split(value: Option<&str>) -> (Option<String>, Option<String>) {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return (None, None);
        };
        match value.split_once('/') {
            Some((n, total)) => (non_empty(n), non_empty(total)),
            None => (non_empty(value), None),
        }
    }

    fn non_empty(s: &str) -> Option<String> {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    }

    let (mut track, track_count) = split(track);
    let (mut disc, disc_count) = split(disc);

    if let Some((d, n)) = track.as_deref().and_then(|t| t.split_once('-')) {
        let (d, n) = (non_empty(d), non_empty(n));
        if disc.is_none() {
            disc = d;
        }
        track = n;
    }

    Numbering {
        track,
        track_count,
        disc,
        disc_count,
    }
}

// ============================================================================
// Placeholder snapshot
// ============================================================================

/// Placeholder tags read back from the host
#[derive(Debug, Clone, Default)]
pub struct PlaceholderSnapshot {
    pub path: PathBuf,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album_artist: Option<String>,
    pub album: Option<String>,
    pub year: Option<String>,
    pub numbering: Numbering,
    /// `None` when the comment is not mbx-managed
    pub comment: Option<CommentData>,
    /// Contents of the folder's cover file
    pub artwork: Option<Vec<u8>>,
}

impl PlaceholderSnapshot {
    /// Snapshot of the item about to play
    pub async fn from_now_playing(
        host: &dyn HostLibrary,
        cache_dir: &Path,
    ) -> ExploreResult<Option<Self>> {
        match host.now_playing() {
            Some(path) => Self::from_path(host, &path, cache_dir).await,
            None => Ok(None),
        }
    }

    /// Snapshot of a library file
    ///
    /// Files outside the cache folder are never placeholders and yield
    /// `Ok(None)`.
    pub async fn from_path(
        host: &dyn HostLibrary,
        path: &Path,
        cache_dir: &Path,
    ) -> ExploreResult<Option<Self>> {
        if !is_in_directory(path, cache_dir) {
            return Ok(None);
        }

        let comment = match host.get_tag(path, Tag::Comment) {
            Some(text) => CommentData::decode(&text)?,
            None => None,
        };

        let tag = |t: Tag| host.get_tag(path, t).filter(|v| !v.trim().is_empty());
        let numbering = Numbering {
            track: tag(Tag::TrackNo),
            track_count: tag(Tag::TrackCount),
            disc: tag(Tag::DiscNo),
            disc_count: tag(Tag::DiscCount),
        };

        Ok(Some(Self {
            path: path.to_path_buf(),
            title: tag(Tag::TrackTitle),
            artist: tag(Tag::Artist),
            album_artist: tag(Tag::AlbumArtist),
            album: tag(Tag::Album),
            year: tag(Tag::Year),
            numbering,
            comment,
            artwork: read_cover(path).await,
        }))
    }

    /// Folder holding the placeholder
    pub fn folder(&self) -> ExploreResult<&Path> {
        self.path.parent().ok_or_else(|| {
            ExploreError::InvalidState(format!("{} has no parent folder", self.path.display()))
        })
    }

    pub fn require<'a>(value: &'a Option<String>, what: &str) -> ExploreResult<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| ExploreError::InvalidState(format!("Placeholder has no {}", what)))
    }
}

/// Read the cover file next to `path`, if any
pub async fn read_cover(path: &Path) -> Option<Vec<u8>> {
    let cover = path.parent()?.join(COVER_FILE);
    match tokio::fs::read(&cover).await {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %cover.display(), error = %e, "Could not read cover file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_template_is_ogg() {
        assert_eq!(&PLACEHOLDER_TEMPLATE[..4], b"OggS");
    }

    #[tokio::test]
    async fn test_write_to_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        let template = PlaceholderTemplate::new(dir.path().join("cache").join("dummy.opus"));
        let dest = dir.path().join("cache").join("Artist").join("Album").join(ALBUM_PLACEHOLDER_FILE);

        template.write_to(&dest).await.unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), PLACEHOLDER_TEMPLATE);
        assert!(template.path().exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_failed_rename_cleans_up_partial_file() {
        let dir = TempDir::new().unwrap();
        let template = PlaceholderTemplate::new(dir.path().join("cache").join("dummy.opus"));
        let dest = dir.path().join("cache").join("Artist").join("taken.opus");
        std::fs::create_dir_all(&dest).unwrap();

        assert!(template.write_to(&dest).await.is_err());
        assert!(dest.is_dir());
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("AC/DC: Live?"), "AC_DC_ Live_");
        assert_eq!(safe_file_name("Trailing dots..."), "Trailing dots");
        assert_eq!(safe_file_name("  padded  "), "padded");
        assert_eq!(safe_file_name("..."), "_");
        assert_eq!(safe_file_name("Sigur Rós"), "Sigur Rós");
    }

    #[test]
    fn test_is_music_file() {
        assert!(is_music_file(Path::new("/x/a.FLAC")));
        assert!(is_music_file(Path::new("b.opus")));
        assert!(!is_music_file(Path::new("cover.jpg")));
        assert!(!is_music_file(Path::new("noext")));
    }

    #[test]
    fn test_is_in_directory() {
        let cache = Path::new("/data/mbx/cache");
        assert!(is_in_directory(Path::new("/data/mbx/cache/A/B.opus"), cache));
        assert!(is_in_directory(Path::new("/DATA/MBX/Cache/A/B.opus"), cache));
        assert!(!is_in_directory(Path::new("/data/mbx/cache-hidden/A/B.opus"), cache));
        assert!(!is_in_directory(Path::new("/music/B.opus"), cache));
    }

    #[test]
    fn test_parse_track_and_disc() {
        let n = parse_track_and_disc(Some("3/12"), Some("1/2"));
        assert_eq!(n.track.as_deref(), Some("3"));
        assert_eq!(n.track_count.as_deref(), Some("12"));
        assert_eq!(n.disc.as_deref(), Some("1"));
        assert_eq!(n.disc_count.as_deref(), Some("2"));

        let n = parse_track_and_disc(Some("2-5/20"), None);
        assert_eq!(n.disc.as_deref(), Some("2"));
        assert_eq!(n.track.as_deref(), Some("5"));
        assert_eq!(n.track_count.as_deref(), Some("20"));

        let n = parse_track_and_disc(Some("A1"), None);
        assert_eq!(n.track.as_deref(), Some("A1"));
        assert_eq!(n.disc, None);

        assert_eq!(parse_track_and_disc(None, Some(" ")), Numbering::default());
    }
}
