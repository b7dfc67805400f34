//! MusicBrainz retriever
//!
//! Artists list release groups (plus appearances at the highest level),
//! labels list releases. Thumbnails come from the Cover Art Archive with a
//! bounded fanout.

use super::{
    checkpoint, ensure_source, AlbumRetriever, DiscographyRetriever, Retriever, MAX_FANOUT,
};
use crate::error::{ExploreError, ExploreResult};
use crate::models::{EntityKind, EntityRetrieverData, Release, RetrieverData, Source, Track};
use crate::progress::ProgressReporter;
use crate::providers::musicbrainz::{
    join_credits, CoverArtTarget, MbRelease, MbReleaseFilter, MusicBrainzApi,
};
use crate::providers::{ProviderError, ProviderResult};
use crate::query::{entity_cache_id, normalize_name, parse_query};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stop paging once this many items have been listed
pub const MUSICBRAINZ_RELEASE_LIMIT: usize = 500;

/// Results scanned for an exact name match
pub const MUSICBRAINZ_EXACT_SEARCH_LIMIT: u32 = 20;

const PAGE_SIZE: u32 = 100;

pub struct MusicBrainzRetriever {
    api: Arc<dyn MusicBrainzApi>,
}

/// Release waiting for its thumbnail
struct Pending {
    release: Release,
    cover: Option<(CoverArtTarget, String)>,
}

impl MusicBrainzRetriever {
    pub fn new(api: Arc<dyn MusicBrainzApi>) -> Self {
        Self { api }
    }

    async fn artist_releases(
        &self,
        entity: &EntityRetrieverData,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Pending>> {
        let api = &self.api;
        let id = entity.id.as_str();
        let all_statuses = entity.retrieve_level >= 1;

        let groups = collect_pages(cancel, |offset| async move {
            api.release_groups(id, PAGE_SIZE, offset, all_statuses, cancel)
                .await
                .map(|page| page.release_groups)
        })
        .await?;

        let mut pending: Vec<Pending> = groups
            .into_iter()
            .map(|group| Pending {
                release: Release {
                    artist: credited_or(&join_credits(&group.artist_credit), &entity.name),
                    title: group.title,
                    date: group.first_release_date,
                    thumb: None,
                    appearance_only: false,
                    retriever_data: RetrieverData::musicbrainz(group.id.clone(), true),
                },
                cover: Some((CoverArtTarget::ReleaseGroup, group.id)),
            })
            .collect();

        if entity.retrieve_level >= 2 {
            let appearances = collect_pages(cancel, |offset| async move {
                api.releases(MbReleaseFilter::TrackArtist(id), PAGE_SIZE, offset, cancel)
                    .await
                    .map(|page| page.releases)
            })
            .await?;

            let own_name = entity.name.to_lowercase();
            pending.extend(
                appearances
                    .into_iter()
                    .filter(|r| {
                        !r.artist_credit
                            .iter()
                            .any(|c| normalize_name(&c.name).to_lowercase() == own_name)
                    })
                    .map(|r| release_pending(r, &entity.name, true)),
            );
        }

        Ok(pending)
    }

    async fn label_releases(
        &self,
        entity: &EntityRetrieverData,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Pending>> {
        let api = &self.api;
        let id = entity.id.as_str();

        let releases = collect_pages(cancel, |offset| async move {
            api.releases(MbReleaseFilter::Label(id), PAGE_SIZE, offset, cancel)
                .await
                .map(|page| page.releases)
        })
        .await?;

        Ok(dedupe_label_releases(releases)
            .into_iter()
            .map(|r| release_pending(r, &entity.name, false))
            .collect())
    }

    /// Fill thumbnails, at most [`MAX_FANOUT`] requests in flight
    async fn attach_cover_art(
        &self,
        pending: Vec<Pending>,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Release>> {
        progress.status(&format!("Fetching cover art for {} releases", pending.len()));

        let results: Vec<ExploreResult<Release>> = stream::iter(pending)
            .map(|item| async move {
                let mut release = item.release;
                if let Some((target, id)) = item.cover {
                    match self.api.cover_art(target, &id, cancel).await {
                        Ok(thumb) => release.thumb = thumb,
                        Err(ProviderError::Cancelled) => return Err(ExploreError::Cancelled),
                        Err(e) => warn!(id = %id, error = %e, "Cover art lookup failed"),
                    }
                }
                Ok(release)
            })
            .buffered(MAX_FANOUT)
            .collect()
            .await;

        results.into_iter().collect()
    }
}

fn release_pending(release: MbRelease, fallback_artist: &str, appearance_only: bool) -> Pending {
    let cover = release
        .cover_art_archive
        .front
        .then(|| (CoverArtTarget::Release, release.id.clone()));
    Pending {
        release: Release {
            artist: credited_or(&join_credits(&release.artist_credit), fallback_artist),
            title: release.title,
            date: release.date.unwrap_or_default(),
            thumb: None,
            appearance_only,
            retriever_data: RetrieverData::musicbrainz(release.id, false),
        },
        cover,
    }
}

fn credited_or(credit: &str, fallback: &str) -> String {
    if credit.trim().is_empty() {
        fallback.to_string()
    } else {
        normalize_name(credit)
    }
}

/// Fetch fixed-size pages in order until a short page or the listing cap
async fn collect_pages<T, F, Fut>(cancel: &CancellationToken, mut fetch: F) -> ExploreResult<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ProviderResult<Vec<T>>>,
{
    let mut items = Vec::new();
    let mut offset = 0u32;
    loop {
        checkpoint(cancel).await?;
        let page = fetch(offset).await?;
        let count = page.len();
        items.extend(page);

        debug!(offset = offset, count = count, "MusicBrainz page");
        if count < PAGE_SIZE as usize || items.len() >= MUSICBRAINZ_RELEASE_LIMIT {
            break;
        }
        offset += PAGE_SIZE;
    }
    Ok(items)
}

/// Empty dates sort after real ones
fn date_key(date: Option<&str>) -> (bool, &str) {
    let date = date.unwrap_or("").trim();
    (date.is_empty(), date)
}

/// Keep one release per (title, artist): front cover, then most art, then earliest
fn dedupe_label_releases(releases: Vec<MbRelease>) -> Vec<MbRelease> {
    fn rank(a: &MbRelease, b: &MbRelease) -> Ordering {
        b.cover_art_archive
            .front
            .cmp(&a.cover_art_archive.front)
            .then(b.cover_art_archive.count.cmp(&a.cover_art_archive.count))
            .then(date_key(a.date.as_deref()).cmp(&date_key(b.date.as_deref())))
    }

    let mut order = Vec::new();
    let mut best: HashMap<(String, String), MbRelease> = HashMap::new();
    for release in releases {
        let key = (
            release.title.to_lowercase(),
            join_credits(&release.artist_credit).to_lowercase(),
        );
        match best.get(&key) {
            Some(existing) if rank(&release, existing) != Ordering::Less => {}
            Some(_) => {
                best.insert(key, release);
            }
            None => {
                order.push(key.clone());
                best.insert(key, release);
            }
        }
    }
    order.into_iter().filter_map(|k| best.remove(&k)).collect()
}

/// Official first, then most tracks, then earliest
fn best_release(releases: Vec<MbRelease>) -> Option<MbRelease> {
    let official = |r: &MbRelease| {
        r.status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("official"))
            .unwrap_or(false)
    };
    releases.into_iter().min_by(|a, b| {
        official(b)
            .cmp(&official(a))
            .then(b.track_count().cmp(&a.track_count()))
            .then(date_key(a.date.as_deref()).cmp(&date_key(b.date.as_deref())))
    })
}

impl Retriever for MusicBrainzRetriever {
    fn source(&self) -> Source {
        Source::MusicBrainz
    }

    fn discography(self: Arc<Self>) -> Option<Arc<dyn DiscographyRetriever>> {
        Some(self)
    }

    fn album_tracks(self: Arc<Self>) -> Option<Arc<dyn AlbumRetriever>> {
        Some(self)
    }
}

#[async_trait]
impl DiscographyRetriever for MusicBrainzRetriever {
    async fn resolve_entity(
        &self,
        query: &str,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<EntityRetrieverData> {
        let parsed = parse_query(query)?;
        progress.status(&format!("Searching MusicBrainz for {}", parsed.text));

        let hit = if parsed.exact {
            let wanted = parsed.text.to_lowercase();
            let mut offset = 0;
            loop {
                let page = self
                    .api
                    .search(parsed.kind, &parsed.text, MUSICBRAINZ_EXACT_SEARCH_LIMIT, offset, cancel)
                    .await?;
                let count = page.entities.len() as u32;
                offset += count;

                let found = page
                    .entities
                    .into_iter()
                    .find(|e| e.name.to_lowercase() == wanted);
                if found.is_some()
                    || count < MUSICBRAINZ_EXACT_SEARCH_LIMIT
                    || offset >= MUSICBRAINZ_EXACT_SEARCH_LIMIT
                {
                    break found;
                }
                checkpoint(cancel).await?;
            }
        } else {
            self.api
                .search(parsed.kind, &parsed.text, 1, 0, cancel)
                .await?
                .entities
                .into_iter()
                .next()
        };

        let hit = hit.ok_or_else(|| {
            ExploreError::NotFound(format!(
                "No MusicBrainz {} matching '{}'",
                parsed.kind.as_str(),
                parsed.text
            ))
        })?;

        info!(id = %hit.id, name = %hit.name, level = parsed.level, "Resolved MusicBrainz entity");

        Ok(EntityRetrieverData {
            source: Source::MusicBrainz,
            kind: parsed.kind,
            cache_id: entity_cache_id(Source::MusicBrainz, parsed.kind, &hit.id, parsed.level),
            name: normalize_name(&hit.name),
            id: hit.id,
            retrieve_level: parsed.level,
        })
    }

    async fn list_releases(
        &self,
        entity: &EntityRetrieverData,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Release>> {
        if entity.source != Source::MusicBrainz {
            return Err(ExploreError::TypeMismatch {
                expected: Source::MusicBrainz,
                found: entity.source,
            });
        }

        progress.status(&format!("Fetching releases for {}", entity.name));
        let pending = match entity.kind {
            EntityKind::Artist => self.artist_releases(entity, cancel).await?,
            EntityKind::Label => self.label_releases(entity, cancel).await?,
        };

        let releases = self.attach_cover_art(pending, progress, cancel).await?;
        info!(entity = %entity.name, count = releases.len(), "Listed MusicBrainz releases");
        Ok(releases)
    }
}

#[async_trait]
impl AlbumRetriever for MusicBrainzRetriever {
    async fn list_tracks(
        &self,
        data: &RetrieverData,
        cancel: &CancellationToken,
    ) -> ExploreResult<Vec<Track>> {
        ensure_source(Source::MusicBrainz, data)?;
        let (id, is_group) = match data {
            RetrieverData::MusicBrainz(d) => (d.id.clone(), d.is_group),
            _ => (None, false),
        };
        let id = id.ok_or_else(|| {
            ExploreError::InvalidState("MusicBrainz payload has no id".to_string())
        })?;

        let release_id = if is_group {
            let candidates = self
                .api
                .releases(MbReleaseFilter::ReleaseGroup(&id), PAGE_SIZE, 0, cancel)
                .await?
                .releases;
            best_release(candidates)
                .ok_or_else(|| ExploreError::NotFound(format!("Release group {} has no releases", id)))?
                .id
        } else {
            id
        };

        let release = self.api.release(&release_id, cancel).await?;
        let release_artist = join_credits(&release.artist_credit);
        let disc_total = release.media.len();

        let mut tracks = Vec::new();
        for (disc_index, medium) in release.media.into_iter().enumerate() {
            let disc = if medium.position > 0 {
                medium.position as usize
            } else {
                disc_index + 1
            };
            let track_total = medium.tracks.len().max(medium.track_count as usize);

            for (track_index, track) in medium.tracks.into_iter().enumerate() {
                let position = if track.position > 0 {
                    track.position as usize
                } else {
                    track_index + 1
                };
                let credits = join_credits(&track.artist_credit);
                let recording_length = track.recording.as_ref().and_then(|r| r.length);
                let track_id = track
                    .recording
                    .map(|r| r.id)
                    .unwrap_or_else(|| release_id.clone());

                tracks.push(Track {
                    artist: credited_or(&credits, &normalize_name(&release_artist)),
                    title: track.title,
                    track_position: Some(format!("{}/{}", position, track_total)),
                    disc_position: Some(format!("{}/{}", disc, disc_total)),
                    length_ms: track.length.or(recording_length),
                    retriever_data: RetrieverData::musicbrainz(track_id, false),
                });
            }
        }

        Ok(tracks)
    }
}
