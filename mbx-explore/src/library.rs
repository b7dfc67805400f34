//! Host library collaborator
//!
//! The core never owns library state. Every read goes to the host through
//! [`HostLibrary`] and nothing is cached across calls.
//!
//! [`MemoryLibrary`] is a self-contained host used by the CLI and tests. It
//! keeps tags in memory and can persist them to a JSON file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::debug;

/// Host library errors
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("File is not in the library: {}", .0.display())]
    UnknownFile(PathBuf),

    #[error("File does not exist: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Now playing index {0} out of range")]
    InvalidIndex(usize),

    #[error("Library store error: {0}")]
    Store(String),
}

pub type LibraryResult<T> = Result<T, LibraryError>;

/// Tag fields the core reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tag {
    TrackTitle,
    Artist,
    AlbumArtist,
    Album,
    Year,
    TrackNo,
    TrackCount,
    DiscNo,
    DiscCount,
    Comment,
}

/// Filter predicate operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    Is,
    Contains,
}

/// One conjunct of a library filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub tag: Tag,
    pub comparison: Comparison,
    pub value: String,
}

impl FilterCondition {
    pub fn is(tag: Tag, value: impl Into<String>) -> Self {
        Self {
            tag,
            comparison: Comparison::Is,
            value: value.into(),
        }
    }

    pub fn contains(tag: Tag, value: impl Into<String>) -> Self {
        Self {
            tag,
            comparison: Comparison::Contains,
            value: value.into(),
        }
    }

    /// Case-insensitive match against a tag value
    pub fn matches(&self, actual: &str) -> bool {
        let actual = actual.to_lowercase();
        let expected = self.value.to_lowercase();
        match self.comparison {
            Comparison::Is => actual == expected,
            Comparison::Contains => actual.contains(&expected),
        }
    }
}

/// Host playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayState {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
}

/// Operations the core needs from the host music library
///
/// All calls are synchronous side effects against the host's system of
/// record. Implementations must tolerate concurrent calls.
pub trait HostLibrary: Send + Sync {
    /// Files matching every condition
    fn query_files(&self, conditions: &[FilterCondition]) -> Vec<PathBuf>;

    fn get_tag(&self, path: &Path, tag: Tag) -> Option<String>;

    /// Stage a tag value; persisted by [`HostLibrary::commit_tags`]
    fn set_tag(&self, path: &Path, tag: Tag, value: &str) -> LibraryResult<()>;

    fn commit_tags(&self, path: &Path) -> LibraryResult<()>;

    fn add_file(&self, path: &Path) -> LibraryResult<()>;

    fn set_artwork(&self, path: &Path, image: &[u8]) -> LibraryResult<()>;

    fn refresh_panels(&self);

    fn now_playing(&self) -> Option<PathBuf>;

    fn now_playing_index(&self) -> Option<usize>;

    /// Insert a file directly after the current item
    fn queue_next(&self, path: &Path) -> LibraryResult<()>;

    fn play_next(&self) -> LibraryResult<()>;

    fn remove_at(&self, index: usize) -> LibraryResult<()>;

    fn play_state(&self) -> PlayState;

    /// Toggle between playing and paused
    fn play_pause(&self);

    fn selected_files(&self) -> Vec<PathBuf>;

    /// Show the library filtered by the given conditions
    fn open_filter_view(&self, conditions: &[FilterCondition]);

    fn register_command(&self, name: &str);

    /// Pause if the host is playing or about to play
    fn pause_playback(&self) {
        if matches!(self.play_state(), PlayState::Playing | PlayState::Loading) {
            self.play_pause();
        }
    }

    /// Replace the current item with `path` and start it
    fn advance_to(&self, path: &Path) -> LibraryResult<()> {
        self.queue_next(path)?;
        let current = self.now_playing_index();
        self.play_next()?;
        if let Some(index) = current {
            self.remove_at(index)?;
        }
        Ok(())
    }
}

// ============================================================================
// In-memory host
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LibraryItem {
    tags: BTreeMap<Tag, String>,
    #[serde(skip)]
    staged: BTreeMap<Tag, String>,
    #[serde(default)]
    has_artwork: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LibraryState {
    items: BTreeMap<PathBuf, LibraryItem>,
    /// Items whose files vanished; tags come back if the file does
    #[serde(default)]
    detached: BTreeMap<PathBuf, LibraryItem>,
    #[serde(default)]
    now_playing: Vec<PathBuf>,
    #[serde(default)]
    current: Option<usize>,
    #[serde(default)]
    play_state: PlayState,
    #[serde(default)]
    selected: Vec<PathBuf>,
    #[serde(skip)]
    artwork: BTreeMap<PathBuf, Vec<u8>>,
    #[serde(skip)]
    open_views: Vec<Vec<FilterCondition>>,
    #[serde(skip)]
    commands: Vec<String>,
    #[serde(skip)]
    refresh_count: usize,
}

/// Library host backed by memory, optionally persisted as JSON
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    state: Mutex<LibraryState>,
    store: Option<PathBuf>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON store; a missing file starts empty
    pub fn open(store: impl Into<PathBuf>) -> LibraryResult<Self> {
        let store = store.into();
        let state = if store.exists() {
            let content =
                std::fs::read_to_string(&store).map_err(|e| LibraryError::Store(e.to_string()))?;
            if content.trim().is_empty() {
                LibraryState::default()
            } else {
                serde_json::from_str(&content).map_err(|e| LibraryError::Store(e.to_string()))?
            }
        } else {
            LibraryState::default()
        };

        Ok(Self {
            state: Mutex::new(state),
            store: Some(store),
        })
    }

    /// Persist to the JSON store, if any
    pub fn save(&self) -> LibraryResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let content = serde_json::to_string_pretty(&*self.lock())
            .map_err(|e| LibraryError::Store(e.to_string()))?;
        if let Some(parent) = store.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LibraryError::Store(e.to_string()))?;
        }
        std::fs::write(store, content).map_err(|e| LibraryError::Store(e.to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, LibraryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the now playing list and select `current`
    pub fn set_now_playing(&self, list: Vec<PathBuf>, current: Option<usize>) {
        let mut state = self.lock();
        state.current = current.filter(|i| *i < list.len());
        state.now_playing = list;
        state.play_state = if state.current.is_some() {
            PlayState::Playing
        } else {
            PlayState::Stopped
        };
    }

    pub fn now_playing_list(&self) -> Vec<PathBuf> {
        self.lock().now_playing.clone()
    }

    pub fn set_selected(&self, files: Vec<PathBuf>) {
        self.lock().selected = files;
    }

    /// Remove an item from the library (not from disk)
    pub fn remove_file(&self, path: &Path) {
        self.lock().items.remove(path);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().items.contains_key(path)
    }

    pub fn files(&self) -> Vec<PathBuf> {
        self.lock().items.keys().cloned().collect()
    }

    pub fn artwork(&self, path: &Path) -> Option<Vec<u8>> {
        self.lock().artwork.get(path).cloned()
    }

    pub fn open_views(&self) -> Vec<Vec<FilterCondition>> {
        self.lock().open_views.clone()
    }

    pub fn registered_commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    pub fn refresh_count(&self) -> usize {
        self.lock().refresh_count
    }
}

impl HostLibrary for MemoryLibrary {
    fn query_files(&self, conditions: &[FilterCondition]) -> Vec<PathBuf> {
        self.lock()
            .items
            .iter()
            .filter(|(_, item)| {
                conditions.iter().all(|c| {
                    item.tags
                        .get(&c.tag)
                        .map(|value| c.matches(value))
                        .unwrap_or(false)
                })
            })
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn get_tag(&self, path: &Path, tag: Tag) -> Option<String> {
        self.lock()
            .items
            .get(path)
            .and_then(|item| item.tags.get(&tag))
            .cloned()
    }

    fn set_tag(&self, path: &Path, tag: Tag, value: &str) -> LibraryResult<()> {
        let mut state = self.lock();
        let item = state
            .items
            .get_mut(path)
            .ok_or_else(|| LibraryError::UnknownFile(path.to_path_buf()))?;
        item.staged.insert(tag, value.to_string());
        Ok(())
    }

    fn commit_tags(&self, path: &Path) -> LibraryResult<()> {
        let mut state = self.lock();
        let item = state
            .items
            .get_mut(path)
            .ok_or_else(|| LibraryError::UnknownFile(path.to_path_buf()))?;
        let staged = std::mem::take(&mut item.staged);
        item.tags.extend(staged);
        Ok(())
    }

    fn add_file(&self, path: &Path) -> LibraryResult<()> {
        if !path.exists() {
            return Err(LibraryError::MissingFile(path.to_path_buf()));
        }
        debug!(path = %path.display(), "Adding file to library");
        let mut state = self.lock();
        if !state.items.contains_key(path) {
            let item = state.detached.remove(path).unwrap_or_default();
            state.items.insert(path.to_path_buf(), item);
        }
        Ok(())
    }

    fn set_artwork(&self, path: &Path, image: &[u8]) -> LibraryResult<()> {
        let mut state = self.lock();
        let item = state
            .items
            .get_mut(path)
            .ok_or_else(|| LibraryError::UnknownFile(path.to_path_buf()))?;
        item.has_artwork = true;
        state.artwork.insert(path.to_path_buf(), image.to_vec());
        Ok(())
    }

    /// Rescan: items whose files are gone drop out of the library
    fn refresh_panels(&self) {
        let mut state = self.lock();
        let gone: Vec<PathBuf> = state
            .items
            .keys()
            .filter(|path| !path.exists())
            .cloned()
            .collect();
        for path in gone {
            if let Some(item) = state.items.remove(&path) {
                state.detached.insert(path, item);
            }
        }
        state.refresh_count += 1;
    }

    fn now_playing(&self) -> Option<PathBuf> {
        let state = self.lock();
        state.current.and_then(|i| state.now_playing.get(i).cloned())
    }

    fn now_playing_index(&self) -> Option<usize> {
        self.lock().current
    }

    fn queue_next(&self, path: &Path) -> LibraryResult<()> {
        let mut state = self.lock();
        let at = state.current.map(|i| i + 1).unwrap_or(state.now_playing.len());
        state.now_playing.insert(at, path.to_path_buf());
        Ok(())
    }

    fn play_next(&self) -> LibraryResult<()> {
        let mut state = self.lock();
        let next = state.current.map(|i| i + 1).unwrap_or(0);
        if next >= state.now_playing.len() {
            return Err(LibraryError::InvalidIndex(next));
        }
        state.current = Some(next);
        state.play_state = PlayState::Playing;
        Ok(())
    }

    fn remove_at(&self, index: usize) -> LibraryResult<()> {
        let mut state = self.lock();
        if index >= state.now_playing.len() {
            return Err(LibraryError::InvalidIndex(index));
        }
        state.now_playing.remove(index);
        state.current = match state.current {
            Some(current) if current > index => Some(current - 1),
            Some(current) if current == index => None,
            other => other,
        };
        Ok(())
    }

    fn play_state(&self) -> PlayState {
        self.lock().play_state
    }

    fn play_pause(&self) {
        let mut state = self.lock();
        state.play_state = match state.play_state {
            PlayState::Playing | PlayState::Loading => PlayState::Paused,
            PlayState::Paused => PlayState::Playing,
            PlayState::Stopped => PlayState::Stopped,
        };
    }

    fn selected_files(&self) -> Vec<PathBuf> {
        self.lock().selected.clone()
    }

    fn open_filter_view(&self, conditions: &[FilterCondition]) {
        self.lock().open_views.push(conditions.to_vec());
    }

    fn register_command(&self, name: &str) {
        self.lock().commands.push(name.to_string());
    }
}
