//! Canonical data model
//!
//! Retrievers normalize provider records into [`Release`] and [`Track`].
//! Placeholders carry a [`CommentData`] descriptor in their comment tag,
//! which is the only place placeholder state is persisted.

use crate::error::{ExploreError, ExploreResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix marking a comment as an mbx-managed state descriptor
pub const COMMENT_SENTINEL: &str = "<<MBE>>";

/// Current descriptor format version
pub const COMMENT_VERSION: u32 = 1;

/// Auxiliary data key holding a linked library file
pub const LIBRARY_PATH_KEY: &str = "LibraryPath";

// ============================================================================
// Enumerations
// ============================================================================

/// Metadata provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Discogs,
    MusicBrainz,
    Lastfm,
}

impl Source {
    /// Stable numeric id used in cache registry keys
    pub fn index(self) -> u8 {
        match self {
            Source::Discogs => 0,
            Source::MusicBrainz => 1,
            Source::Lastfm => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Discogs => "discogs",
            Source::MusicBrainz => "musicbrainz",
            Source::Lastfm => "lastfm",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discogs" => Ok(Source::Discogs),
            "musicbrainz" | "mb" => Ok(Source::MusicBrainz),
            "lastfm" | "last.fm" => Ok(Source::Lastfm),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

/// Retriever capability, one per adapter interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Discography,
    AlbumTracks,
    PopularTracks,
    SimilarAlbums,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Discography => "discography lookup",
            Capability::AlbumTracks => "album track lookup",
            Capability::PopularTracks => "popular track lookup",
            Capability::SimilarAlbums => "similar album lookup",
        })
    }
}

/// Placeholder lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    UnloadedAlbum,
    UnloadedTrack,
    Loaded,
    LinkTrack,
}

/// Request kind that produced a group of placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    MoreAlbums,
    PopularTracks,
    SimilarAlbums,
}

impl OperationKind {
    pub fn index(self) -> u8 {
        match self {
            OperationKind::MoreAlbums => 0,
            OperationKind::PopularTracks => 1,
            OperationKind::SimilarAlbums => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::MoreAlbums => "MoreAlbums",
            OperationKind::PopularTracks => "PopularTracks",
            OperationKind::SimilarAlbums => "SimilarAlbums",
        }
    }
}

/// Partition of a discography group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subgroup {
    None,
    Main,
    Appearance,
}

impl Subgroup {
    pub fn as_str(self) -> &'static str {
        match self {
            Subgroup::None => "",
            Subgroup::Main => "Main",
            Subgroup::Appearance => "Appearance",
        }
    }
}

/// Discography entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Artist,
    Label,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Label => "label",
        }
    }
}

// ============================================================================
// Retriever payloads
// ============================================================================

/// Source-tagged payload letting a later operation reach the right adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "Source")]
pub enum RetrieverData {
    Discogs(DiscogsData),
    MusicBrainz(MusicBrainzData),
    Lastfm(LastfmData),
}

impl RetrieverData {
    pub fn source(&self) -> Source {
        match self {
            RetrieverData::Discogs(_) => Source::Discogs,
            RetrieverData::MusicBrainz(_) => Source::MusicBrainz,
            RetrieverData::Lastfm(_) => Source::Lastfm,
        }
    }

    pub fn discogs(id: u64) -> Self {
        RetrieverData::Discogs(DiscogsData { id: Some(id) })
    }

    pub fn musicbrainz(id: impl Into<String>, is_group: bool) -> Self {
        RetrieverData::MusicBrainz(MusicBrainzData {
            id: Some(id.into()),
            is_group,
        })
    }

    pub fn lastfm(artist: impl Into<String>, title: impl Into<String>) -> Self {
        RetrieverData::Lastfm(LastfmData {
            artist: Some(artist.into()),
            title: Some(title.into()),
        })
    }
}

/// Discogs release (or master main release) id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscogsData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

/// MusicBrainz release, release group or recording id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicBrainzData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub is_group: bool,
}

/// Last.fm lookups are keyed by names, not ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastfmData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

// ============================================================================
// Canonical records
// ============================================================================

/// Resolved discography entity (artist or label)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRetrieverData {
    pub source: Source,
    pub kind: EntityKind,
    /// Provider id of the entity
    pub id: String,
    /// Canonical display name, disambiguation suffix stripped
    pub name: String,
    /// Stable cache key, encodes the retrieve level
    pub cache_id: String,
    pub retrieve_level: u8,
}

/// Discography item before its track list has been fetched
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub title: String,
    pub artist: String,
    /// Provider-native granularity (year or full date)
    pub date: String,
    pub thumb: Option<String>,
    pub appearance_only: bool,
    pub retriever_data: RetrieverData,
}

/// Song within a release
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub title: String,
    /// May be a "; " joined list of artists
    pub artist: String,
    /// "n" or "n/total"
    pub track_position: Option<String>,
    /// "d" or "d/total"
    pub disc_position: Option<String>,
    pub length_ms: Option<u64>,
    pub retriever_data: RetrieverData,
}

// ============================================================================
// Comment descriptor
// ============================================================================

/// State descriptor persisted in a placeholder's comment tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentData {
    #[serde(rename = "v")]
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub state: State,
    pub group: String,
    pub retriever_data: RetrieverData,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, String>,
}

impl CommentData {
    pub fn new(
        kind: OperationKind,
        state: State,
        group: impl Into<String>,
        retriever_data: RetrieverData,
    ) -> Self {
        Self {
            version: COMMENT_VERSION,
            kind,
            state,
            group: group.into(),
            retriever_data,
            additional: BTreeMap::new(),
        }
    }

    /// Descriptor for a track expanded from this album placeholder
    ///
    /// The track keeps the album's kind and group.
    pub fn for_track(&self, retriever_data: RetrieverData) -> Self {
        Self::new(self.kind, State::UnloadedTrack, self.group.clone(), retriever_data)
    }

    /// Descriptor redirecting to an existing library file
    pub fn link(
        kind: OperationKind,
        group: impl Into<String>,
        retriever_data: RetrieverData,
        library_path: &Path,
    ) -> Self {
        let mut data = Self::new(kind, State::LinkTrack, group, retriever_data);
        data.additional.insert(
            LIBRARY_PATH_KEY.to_string(),
            library_path.to_string_lossy().into_owned(),
        );
        data
    }

    pub fn library_path(&self) -> Option<PathBuf> {
        self.additional
            .get(LIBRARY_PATH_KEY)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }

    /// Serialize into comment tag text
    pub fn encode(&self) -> ExploreResult<String> {
        Ok(format!("{}{}", COMMENT_SENTINEL, serde_json::to_string(self)?))
    }

    /// Parse comment tag text
    ///
    /// Returns `Ok(None)` for comments not managed by mbx. A managed comment
    /// that fails to decode is an error rather than a silent skip.
    pub fn decode(comment: &str) -> ExploreResult<Option<Self>> {
        let Some(payload) = comment.trim_start().strip_prefix(COMMENT_SENTINEL) else {
            return Ok(None);
        };

        let value: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| ExploreError::InvalidState(format!("Malformed state descriptor: {}", e)))?;

        let version = value.get("v").and_then(|v| v.as_u64()).unwrap_or(0);
        if version != u64::from(COMMENT_VERSION) {
            return Err(ExploreError::InvalidState(format!(
                "Unsupported state descriptor version {}",
                version
            )));
        }

        let data: CommentData = serde_json::from_value(value)
            .map_err(|e| ExploreError::InvalidState(format!("Malformed state descriptor: {}", e)))?;

        if data.state == State::LinkTrack && data.library_path().is_none() {
            return Err(ExploreError::InvalidState(
                "Link descriptor has no library path".to_string(),
            ));
        }

        Ok(Some(data))
    }

    /// Whether a comment carries the mbx sentinel
    pub fn is_managed(comment: &str) -> bool {
        comment.trim_start().starts_with(COMMENT_SENTINEL)
    }
}
