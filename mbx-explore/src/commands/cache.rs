//! Cache folder maintenance

use super::Explorer;
use crate::error::{ExploreError, ExploreResult};
use crate::library::Tag;
use crate::placeholder::{is_music_file, safe_file_name, COVER_FILE};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Cache state after a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheVisibility {
    /// Moved out of the library's view
    Hidden,
    /// Moved back and re-registered
    Shown,
    /// Neither folder existed
    Empty,
}

impl Explorer {
    /// Delete the cache folder of the first selected album artist
    ///
    /// Only the first of several `;` separated artists counts.
    pub fn delete_artist_cache(&self) -> ExploreResult<PathBuf> {
        let artist = self
            .host
            .selected_files()
            .first()
            .and_then(|path| self.host.get_tag(path, Tag::AlbumArtist))
            .and_then(|value| value.split(';').next().map(|a| a.trim().to_string()))
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ExploreError::InvalidInput("No artist selected".to_string()))?;

        let folder = self.paths.cache_dir.join(safe_file_name(&artist));
        if !folder.is_dir() {
            self.host.refresh_panels();
            return Err(ExploreError::NotFound(format!(
                "No cache found for artist: {}",
                artist
            )));
        }

        std::fs::remove_dir_all(&folder)?;
        self.host.refresh_panels();
        info!(artist = %artist, path = %folder.display(), "Deleted artist cache");
        Ok(folder)
    }

    /// Hide the cache folder, or show it again if hidden
    pub fn toggle_cached_albums(&self) -> ExploreResult<CacheVisibility> {
        let cache = &self.paths.cache_dir;
        let hidden = &self.paths.hidden_cache_dir;

        let visibility = if cache.is_dir() {
            if hidden.exists() {
                std::fs::remove_dir_all(hidden)?;
            }
            std::fs::rename(cache, hidden)?;
            info!("Cached albums hidden");
            CacheVisibility::Hidden
        } else if hidden.is_dir() {
            std::fs::rename(hidden, cache)?;
            let added = self.register_cache_folder(cache);
            info!(files = added, "Cached albums shown");
            CacheVisibility::Shown
        } else {
            debug!("No cache folder to toggle");
            CacheVisibility::Empty
        };

        self.host.refresh_panels();
        Ok(visibility)
    }

    /// Add every music file under `root` back to the library
    fn register_cache_folder(&self, root: &Path) -> usize {
        let template = self.materializer.template().path();
        let mut added = 0;

        for dir in WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
        {
            let cover = std::fs::read(dir.path().join(COVER_FILE)).ok();
            let Ok(entries) = std::fs::read_dir(dir.path()) else {
                continue;
            };

            for file in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
                if !file.is_file() || !is_music_file(&file) || file == template {
                    continue;
                }
                if let Err(e) = self.host.add_file(&file) {
                    warn!(path = %file.display(), error = %e, "Could not re-register cached file");
                    continue;
                }
                if let Some(image) = &cover {
                    if let Err(e) = self.host.set_artwork(&file, image) {
                        warn!(path = %file.display(), error = %e, "Could not reapply artwork");
                    }
                }
                added += 1;
            }
        }
        added
    }
}
