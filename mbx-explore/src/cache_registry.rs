//! Query → group index with lazy self-healing eviction
//!
//! Keys are `{source};{operation};{query}` with the query trimmed and
//! lower-cased. A group is valid only while some library item carries it in
//! its comment; stale entries are dropped the next time they are looked up.
//!
//! The index is loaded on first access and written back only on
//! [`CacheRegistry::save`].

use crate::error::ExploreResult;
use crate::library::{FilterCondition, HostLibrary, Tag};
use crate::models::{OperationKind, Source, Subgroup, COMMENT_SENTINEL};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct CacheRegistry {
    path: PathBuf,
    entries: Option<HashMap<String, String>>,
    dirty: bool,
}

impl CacheRegistry {
    /// Registry persisted at `path`; nothing is read yet
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: None,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.entries.is_some()
    }

    /// Number of entries, loading the store if needed
    pub fn len(&mut self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    fn entries(&mut self) -> &mut HashMap<String, String> {
        let path = &self.path;
        self.entries.get_or_insert_with(|| load_entries(path))
    }

    /// Group recorded for the query, if it still has live items
    ///
    /// A recorded group with no remaining items is evicted and reported as
    /// a miss.
    pub fn lookup(
        &mut self,
        query: &str,
        source: Source,
        operation: OperationKind,
        host: &dyn HostLibrary,
    ) -> Option<String> {
        let key = cache_key(query, source, operation);
        let group = self.entries().get(&key).cloned()?;

        if group_has_items(host, &group) {
            debug!(key = %key, group = %group, "Cache hit");
            return Some(group);
        }

        info!(key = %key, group = %group, "Evicting stale cache entry");
        self.entries().remove(&key);
        self.dirty = true;
        None
    }

    /// Map the query to `group`; recording the same mapping twice is a no-op
    pub fn record(&mut self, query: &str, source: Source, operation: OperationKind, group: &str) {
        if query.trim().is_empty() || group.is_empty() {
            return;
        }
        let key = cache_key(query, source, operation);
        let previous = self.entries().insert(key, group.to_string());
        if previous.as_deref() != Some(group) {
            self.dirty = true;
        }
    }

    /// Drop the entry for a query, returning its group
    pub fn remove(
        &mut self,
        query: &str,
        source: Source,
        operation: OperationKind,
    ) -> Option<String> {
        let key = cache_key(query, source, operation);
        let removed = self.entries().remove(&key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Flush to disk if the index was loaded and changed
    pub fn save(&mut self) -> ExploreResult<()> {
        let Some(entries) = &self.entries else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp = self.path.with_extension("json.tmp");
        std::fs::write(&temp, serde_json::to_string_pretty(entries)?)?;
        std::fs::rename(&temp, &self.path)?;

        debug!(path = %self.path.display(), entries = entries.len(), "Cache registry saved");
        self.dirty = false;
        Ok(())
    }
}

fn load_entries(path: &Path) -> HashMap<String, String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache registry unreadable, starting empty");
            return HashMap::new();
        }
    };
    if content.trim().is_empty() {
        return HashMap::new();
    }
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Cache registry corrupt, starting empty");
        HashMap::new()
    })
}

pub fn cache_key(query: &str, source: Source, operation: OperationKind) -> String {
    format!(
        "{};{};{}",
        source.index(),
        operation.index(),
        query.trim().to_lowercase()
    )
}

/// Group identifier for an entity
///
/// Popular tracks share the artist's discography group so both show up in
/// the same filter view.
pub fn group_for(operation: OperationKind, entity: &str, subgroup: Subgroup) -> String {
    let operation = match operation {
        OperationKind::PopularTracks => OperationKind::MoreAlbums,
        other => other,
    };
    format!(
        "{}_{}_{}",
        operation.as_str(),
        entity.trim().to_lowercase(),
        subgroup.as_str()
    )
}

/// Filter selecting every placeholder of a group (and its subgroups)
///
/// The group is matched as it appears inside the JSON descriptor.
pub fn group_conditions(group: &str) -> Vec<FilterCondition> {
    let encoded = serde_json::to_string(group).unwrap_or_else(|_| format!("\"{}\"", group));
    let escaped = encoded
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(group);
    vec![
        FilterCondition::contains(Tag::Comment, COMMENT_SENTINEL),
        FilterCondition::contains(Tag::Comment, escaped),
    ]
}

pub fn group_has_items(host: &dyn HostLibrary, group: &str) -> bool {
    !host.query_files(&group_conditions(group)).is_empty()
}

/// Show the group in a filter view
pub fn open_group(host: &dyn HostLibrary, group: &str) {
    host.open_filter_view(&group_conditions(group));
}
