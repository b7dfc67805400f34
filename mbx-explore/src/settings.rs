//! Runtime settings and storage layout
//!
//! Settings live in `mbe.conf` (JSON) under the root folder and are saved
//! whenever they change. Credentials fall back to environment variables.

use crate::error::ExploreResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DISCOGS_TOKEN_ENV: &str = "MBX_DISCOGS_TOKEN";
pub const LASTFM_API_KEY_ENV: &str = "MBX_LASTFM_API_KEY";

pub const SETTINGS_FILE: &str = "mbe.conf";
pub const REGISTRY_FILE: &str = "cache-registry.json";
pub const LIBRARY_FILE: &str = "library.json";
pub const CACHE_DIR: &str = "cache";
pub const HIDDEN_CACHE_DIR: &str = "cache-hidden";
pub const TEMPLATE_FILE: &str = "dummy.opus";

/// Behavioral flags, tokens and keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Open a filter view on the new group after a lookup
    pub open_in_filter_view: bool,
    /// Queue expanded tracks and advance when an album loads from playback
    pub queue_tracks_after_album_load: bool,
    /// Chain a popular tracks lookup after each artist discography
    pub get_popular_tracks: bool,
    /// Stream through an external player instead of downloading
    pub use_media_player: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discogs_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastfm_api_key: Option<String>,
    /// `{url}` is replaced by the stream URL
    pub media_player_command: String,
    pub ytdlp_command: String,
    pub popular_tracks_limit: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            open_in_filter_view: false,
            queue_tracks_after_album_load: false,
            get_popular_tracks: false,
            use_media_player: false,
            discogs_token: None,
            lastfm_api_key: None,
            media_player_command: "mpv {url} --no-video".to_string(),
            ytdlp_command: "yt-dlp".to_string(),
            popular_tracks_limit: 50,
        }
    }
}

impl Settings {
    /// Load settings, defaults when the file is absent
    pub fn load(path: &Path) -> ExploreResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> ExploreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    pub fn discogs_token(&self) -> Option<String> {
        credential(self.discogs_token.as_deref(), DISCOGS_TOKEN_ENV)
    }

    pub fn lastfm_api_key(&self) -> Option<String> {
        credential(self.lastfm_api_key.as_deref(), LASTFM_API_KEY_ENV)
    }
}

/// Settings value first, then environment; blanks are ignored
fn credential(configured: Option<&str>, env_name: &str) -> Option<String> {
    configured
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            std::env::var(env_name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
}

/// File layout under the root folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerPaths {
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    pub hidden_cache_dir: PathBuf,
    pub registry_file: PathBuf,
    pub settings_file: PathBuf,
    pub template_file: PathBuf,
    pub library_file: PathBuf,
}

impl ExplorerPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let cache_dir = root.join(CACHE_DIR);
        Self {
            hidden_cache_dir: root.join(HIDDEN_CACHE_DIR),
            registry_file: root.join(REGISTRY_FILE),
            settings_file: root.join(SETTINGS_FILE),
            template_file: cache_dir.join(TEMPLATE_FILE),
            library_file: root.join(LIBRARY_FILE),
            cache_dir,
            root,
        }
    }

    /// Create the root folder, and the cache folder unless it is hidden
    pub fn ensure(&self) -> ExploreResult<()> {
        std::fs::create_dir_all(&self.root)?;
        if !self.hidden_cache_dir.exists() {
            std::fs::create_dir_all(&self.cache_dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("mbe.conf")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.popular_tracks_limit, 50);
        assert_eq!(settings.media_player_command, "mpv {url} --no-video");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("mbe.conf");

        let settings = Settings {
            open_in_filter_view: true,
            discogs_token: Some("tok".to_string()),
            popular_tracks_limit: 10,
            ..Settings::default()
        };
        settings.save(&path).unwrap();

        assert_eq!(Settings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mbe.conf");
        std::fs::write(&path, r#"{"use_media_player": true}"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert!(settings.use_media_player);
        assert_eq!(settings.ytdlp_command, "yt-dlp");
    }

    #[test]
    #[serial]
    fn test_credentials_prefer_settings_then_env() {
        std::env::set_var(DISCOGS_TOKEN_ENV, "from-env");
        std::env::set_var(LASTFM_API_KEY_ENV, "   ");

        let mut settings = Settings::default();
        assert_eq!(settings.discogs_token().as_deref(), Some("from-env"));
        assert_eq!(settings.lastfm_api_key(), None);

        settings.discogs_token = Some("from-file".to_string());
        assert_eq!(settings.discogs_token().as_deref(), Some("from-file"));

        settings.discogs_token = Some(" ".to_string());
        assert_eq!(settings.discogs_token().as_deref(), Some("from-env"));

        std::env::remove_var(DISCOGS_TOKEN_ENV);
        std::env::remove_var(LASTFM_API_KEY_ENV);
    }

    #[test]
    fn test_paths_layout() {
        let paths = ExplorerPaths::new("/data/mbx");
        assert_eq!(paths.cache_dir, PathBuf::from("/data/mbx/cache"));
        assert_eq!(paths.hidden_cache_dir, PathBuf::from("/data/mbx/cache-hidden"));
        assert_eq!(paths.template_file, PathBuf::from("/data/mbx/cache/dummy.opus"));
        assert_eq!(paths.settings_file, PathBuf::from("/data/mbx/mbe.conf"));
    }
}
