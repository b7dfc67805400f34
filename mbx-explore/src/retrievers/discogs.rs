//! Discogs retriever: artist/label discographies and release track lists

use super::{
    checkpoint, ensure_source, parse_duration_ms, AlbumRetriever, DiscographyRetriever, Retriever,
};
use crate::error::{ExploreError, ExploreResult};
use crate::models::{EntityKind, EntityRetrieverData, Release, RetrieverData, Source, Track};
use crate::progress::ProgressReporter;
use crate::providers::discogs::{DiscogsApi, DiscogsArtistRef, DiscogsReleaseSummary};
use crate::query::{entity_cache_id, normalize_name, parse_query};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Stop paging once this many releases have been listed
pub const DISCOGS_RELEASE_LIMIT: usize = 150;

/// Results scanned for an exact name match
pub const DISCOGS_EXACT_SEARCH_LIMIT: u32 = 20;

const RELEASES_PER_PAGE: u32 = 100;

pub struct DiscogsRetriever {
    api: Arc<dyn DiscogsApi>,
}

impl DiscogsRetriever {
    pub fn new(api: Arc<dyn DiscogsApi>) -> Self {
        Self { api }
    }

    fn to_release(
        &self,
        summary: DiscogsReleaseSummary,
        entity: &EntityRetrieverData,
    ) -> Option<Release> {
        // Label listings carry no role
        let is_main = summary
            .role
            .as_deref()
            .map(|r| r.eq_ignore_ascii_case("main"))
            .unwrap_or(true);
        let is_master = summary
            .kind
            .as_deref()
            .map(|k| k.eq_ignore_ascii_case("master"))
            .unwrap_or(false);

        if entity.kind == EntityKind::Artist {
            let keep = match entity.retrieve_level {
                0 => is_main && is_master,
                1 => is_main,
                _ => true,
            };
            if !keep {
                return None;
            }
        }

        let artist = if summary.artist.trim().is_empty() {
            entity.name.clone()
        } else {
            normalize_name(&summary.artist)
        };

        Some(Release {
            title: summary.title,
            artist,
            date: summary.year.map(|y| y.to_string()).unwrap_or_default(),
            thumb: summary.thumb.filter(|t| !t.trim().is_empty()),
            appearance_only: !is_main,
            retriever_data: RetrieverData::discogs(summary.main_release.unwrap_or(summary.id)),
        })
    }
}

fn join_artists(artists: &[DiscogsArtistRef]) -> String {
    artists
        .iter()
        .map(|a| normalize_name(&a.name))
        .collect::<Vec<_>>()
        .join("; ")
}

impl Retriever for DiscogsRetriever {
    fn source(&self) -> Source {
        Source::Discogs
    }

    fn discography(self: Arc<Self>) -> Option<Arc<dyn DiscographyRetriever>> {
        Some(self)
    }

    fn album_tracks(self: Arc<Self>) -> Option<Arc<dyn AlbumRetriever>> {
        Some(self)
    }
}

#[async_trait]
impl DiscographyRetriever for DiscogsRetriever {
    async fn resolve_entity(
        &self,
        query: &str,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<EntityRetrieverData> {
        let parsed = parse_query(query)?;
        progress.status(&format!("Searching Discogs for {}", parsed.text));

        let hit = if parsed.exact {
            let wanted = parsed.text.to_lowercase();
            let mut page = 1;
            let mut scanned = 0usize;
            loop {
                let results = self
                    .api
                    .search(&parsed.text, parsed.kind, page, DISCOGS_EXACT_SEARCH_LIMIT, cancel)
                    .await?;
                scanned += results.results.len();

                let found = results
                    .results
                    .into_iter()
                    .find(|r| r.title.to_lowercase() == wanted);
                if found.is_some()
                    || scanned >= DISCOGS_EXACT_SEARCH_LIMIT as usize
                    || page >= results.pagination.pages
                {
                    break found;
                }
                page += 1;
                checkpoint(cancel).await?;
            }
        } else {
            self.api
                .search(&parsed.text, parsed.kind, 1, 1, cancel)
                .await?
                .results
                .into_iter()
                .next()
        };

        let hit = hit.ok_or_else(|| {
            ExploreError::NotFound(format!(
                "No Discogs {} matching '{}'",
                parsed.kind.as_str(),
                parsed.text
            ))
        })?;

        let id = hit.id.to_string();
        info!(id = %id, name = %hit.title, level = parsed.level, "Resolved Discogs entity");

        Ok(EntityRetrieverData {
            source: Source::Discogs,
            kind: parsed.kind,
            cache_id: entity_cache_id(Source::Discogs, parsed.kind, &id, parsed.level),
            name: normalize_name(&hit.title),
            id,
            retrieve_level: parsed.level,
        })
    }

    async fn list_releases(
        &self,
        entity: &EntityRetrieverData,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Release>> {
        if entity.source != Source::Discogs {
            return Err(ExploreError::TypeMismatch {
                expected: Source::Discogs,
                found: entity.source,
            });
        }
        let id: u64 = entity.id.parse().map_err(|_| {
            ExploreError::InvalidState(format!("Invalid Discogs id '{}'", entity.id))
        })?;

        let mut releases = Vec::new();
        let mut listed = 0usize;
        let mut page = 1;
        loop {
            checkpoint(cancel).await?;
            progress.status(&format!("Fetching {} releases (page {})", entity.name, page));

            let response = self
                .api
                .entity_releases(entity.kind, id, page, RELEASES_PER_PAGE, cancel)
                .await?;
            let count = response.releases.len();
            listed += count;
            releases.extend(
                response
                    .releases
                    .into_iter()
                    .filter_map(|r| self.to_release(r, entity)),
            );

            debug!(page = page, pages = response.pagination.pages, count = count, "Discogs releases page");
            if count == 0 || page >= response.pagination.pages || listed >= DISCOGS_RELEASE_LIMIT {
                break;
            }
            page += 1;
        }

        info!(entity = %entity.name, listed = listed, kept = releases.len(), "Listed Discogs releases");
        Ok(releases)
    }
}

#[async_trait]
impl AlbumRetriever for DiscogsRetriever {
    async fn list_tracks(
        &self,
        data: &RetrieverData,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Track>> {
        ensure_source(Source::Discogs, data)?;
        let id = match data {
            RetrieverData::Discogs(d) => d.id,
            _ => None,
        }
        .ok_or_else(|| ExploreError::InvalidState("Discogs payload has no release id".to_string()))?;

        let detail = self.api.release(id, cancel).await?;
        let release_artist = join_artists(&detail.artists);

        let entries: Vec<_> = detail
            .tracklist
            .into_iter()
            .filter(|t| t.kind.is_empty() || t.kind.eq_ignore_ascii_case("track"))
            .collect();
        let total = entries.len();

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(i, t)| {
                let position = if t.position.trim().is_empty() {
                    (i + 1).to_string()
                } else {
                    t.position.trim().to_string()
                };
                Track {
                    artist: if t.artists.is_empty() {
                        release_artist.clone()
                    } else {
                        join_artists(&t.artists)
                    },
                    title: t.title,
                    track_position: Some(format!("{}/{}", position, total)),
                    disc_position: None,
                    length_ms: parse_duration_ms(&t.duration),
                    retriever_data: RetrieverData::discogs(id),
                }
            })
            .collect())
    }
}
