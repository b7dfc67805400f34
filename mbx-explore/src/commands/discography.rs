//! Artist/label discography lookup

use super::{Explorer, LookupOutcome};
use crate::cache_registry::{group_for, open_group};
use crate::error::{ExploreError, ExploreResult};
use crate::library::{FilterCondition, Tag};
use crate::materializer::{Artwork, PlaceholderSpec};
use crate::models::{
    CommentData, EntityKind, EntityRetrieverData, OperationKind, Release, Source, State, Subgroup,
};
use crate::placeholder::{safe_file_name, ALBUM_PLACEHOLDER_FILE, LOAD_ALBUM_TITLE};
use crate::progress::ProgressReporter;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl Explorer {
    /// Materialize album placeholders for an artist or label
    ///
    /// Reopens the existing group when the query (or the entity it resolves
    /// to) was looked up before and its placeholders are still in the
    /// library.
    pub async fn discography(
        &self,
        query: &str,
        source: Source,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<LookupOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ExploreError::InvalidInput(
                "No artist name in query or selection".to_string(),
            ));
        }

        if self.paths.hidden_cache_dir.exists() && !self.paths.cache_dir.exists() {
            info!("Showing hidden cache before lookup");
            self.toggle_cached_albums()?;
        }

        if let Some(group) = self.cached_group(&[query], source) {
            return Ok(self.reopen(group));
        }

        let retriever = self.registry.discography(source)?;
        let entity = retriever.resolve_entity(query, progress, cancel).await?;

        if let Some(group) = self.cached_group(&[&entity.name, &entity.cache_id], source) {
            self.cache()
                .record(query, source, OperationKind::MoreAlbums, &group);
            return Ok(self.reopen(group));
        }

        let releases = retriever.list_releases(&entity, progress, cancel).await?;
        if releases.is_empty() {
            return Err(ExploreError::NotFound(format!("No releases found for {}", query)));
        }
        progress.status(&format!("Found {} releases", releases.len()));

        let fresh = self.skip_existing(releases);
        debug!(entity = %entity.name, new = fresh.len(), "Releases not in library");

        let specs = self.album_specs(&entity, fresh);
        let summary = self
            .materializer
            .materialize_batch(specs, progress, cancel)
            .await?;

        let group = group_for(OperationKind::MoreAlbums, &entity.name, Subgroup::None);
        {
            let mut cache = self.cache();
            for key in [query, entity.name.as_str(), entity.cache_id.as_str()] {
                cache.record(key, source, OperationKind::MoreAlbums, &group);
            }
        }
        self.save();

        self.host.refresh_panels();
        if self.settings.open_in_filter_view {
            open_group(self.host.as_ref(), &group);
        }

        if self.settings.get_popular_tracks && entity.kind == EntityKind::Artist {
            if let Err(e) = self.popular_tracks(&entity.name, progress, cancel).await {
                warn!(artist = %entity.name, error = %e, "Popular tracks lookup failed");
            }
        }

        info!(
            entity = %entity.name,
            written = summary.written,
            skipped = summary.skipped,
            "Discography loaded"
        );
        Ok(LookupOutcome::Created {
            group,
            entity: entity.name,
            summary,
        })
    }

    /// First live group recorded under any of the keys
    fn cached_group(&self, keys: &[&str], source: Source) -> Option<String> {
        let mut cache = self.cache();
        keys.iter().find_map(|key| {
            cache.lookup(key, source, OperationKind::MoreAlbums, self.host.as_ref())
        })
    }

    fn reopen(&self, group: String) -> LookupOutcome {
        info!(group = %group, "Reopening cached group");
        open_group(self.host.as_ref(), &group);
        LookupOutcome::Cached { group }
    }

    /// Drop releases the library already holds as real albums
    fn skip_existing(&self, releases: Vec<Release>) -> Vec<Release> {
        releases
            .into_iter()
            .filter(|release| {
                let held = [Tag::AlbumArtist, Tag::Artist].iter().any(|artist_tag| {
                    !self
                        .host
                        .query_files(&[
                            FilterCondition::contains(*artist_tag, release.artist.as_str()),
                            FilterCondition::is(Tag::Album, release.title.as_str()),
                        ])
                        .is_empty()
                });
                if held {
                    debug!(title = %release.title, "Skipping album already in library");
                }
                !held
            })
            .collect()
    }

    fn album_specs(&self, entity: &EntityRetrieverData, releases: Vec<Release>) -> Vec<PlaceholderSpec> {
        let entity_dir = self.paths.cache_dir.join(safe_file_name(&entity.name));
        let mut seen = HashSet::new();

        releases
            .into_iter()
            .filter_map(|release| {
                let path = entity_dir
                    .join(safe_file_name(&release.title))
                    .join(ALBUM_PLACEHOLDER_FILE);
                if !seen.insert(path.clone()) {
                    return None;
                }

                let subgroup = if release.appearance_only {
                    Subgroup::Appearance
                } else {
                    Subgroup::Main
                };
                let by_other = !release.artist.trim().is_empty() && release.artist != entity.name;
                let title = if by_other {
                    format!("{} / By {}", LOAD_ALBUM_TITLE, release.artist)
                } else {
                    LOAD_ALBUM_TITLE.to_string()
                };
                let album_artist = if by_other {
                    format!("{}; {}", entity.name, release.artist)
                } else {
                    entity.name.clone()
                };
                let comment = CommentData::new(
                    OperationKind::MoreAlbums,
                    State::UnloadedAlbum,
                    group_for(OperationKind::MoreAlbums, &entity.name, subgroup),
                    release.retriever_data,
                );

                Some(
                    PlaceholderSpec::new(path, comment)
                        .tag(Tag::TrackTitle, title)
                        .tag(Tag::Artist, entity.name.as_str())
                        .tag(Tag::AlbumArtist, album_artist)
                        .tag(Tag::Album, release.title)
                        .tag(Tag::Year, release.date)
                        .artwork(release.thumb.map(Artwork::Url).unwrap_or_default())
                        .save_cover(true),
                )
            })
            .collect()
    }
}
