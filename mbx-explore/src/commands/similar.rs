use super::popular::SORT_LAST_YEAR;
use super::{Explorer, LookupOutcome};
use crate::cache_registry::{group_for, open_group};
use crate::error::{ExploreError, ExploreResult};
use crate::library::Tag;
use crate::materializer::{Artwork, PlaceholderSpec};
use crate::models::{CommentData, OperationKind, Source, State, Subgroup};
use crate::placeholder::{safe_file_name, ALBUM_PLACEHOLDER_FILE, LOAD_ALBUM_TITLE};
use crate::progress::ProgressReporter;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

impl Explorer {
    /// Materialize album placeholders for albums similar to `album`
    pub async fn similar_albums(
        &self,
        artist: &str,
        album: &str,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<LookupOutcome> {
        let (artist, album) = (artist.trim(), album.trim());
        if artist.is_empty() || album.is_empty() {
            return Err(ExploreError::InvalidInput(
                "Similar albums needs an artist and an album".to_string(),
            ));
        }

        let key = format!("{} - {}", artist, album);
        let cached = self.cache().lookup(
            &key,
            Source::Lastfm,
            OperationKind::SimilarAlbums,
            self.host.as_ref(),
        );
        if let Some(group) = cached {
            info!(group = %group, "Reopening cached group");
            open_group(self.host.as_ref(), &group);
            return Ok(LookupOutcome::Cached { group });
        }

        let retriever = self.registry.similar_albums(Source::Lastfm)?;
        progress.status(&format!("Finding albums similar to {}", key));
        let releases = retriever.similar_albums(artist, album, progress, cancel).await?;
        if releases.is_empty() {
            return Err(ExploreError::NotFound(format!(
                "No similar albums found for {}",
                key
            )));
        }

        let group = group_for(OperationKind::SimilarAlbums, &key, Subgroup::None);
        let folder = self
            .paths
            .cache_dir
            .join(safe_file_name(artist))
            .join(safe_file_name(&format!("__SimilarTo {}", key)));

        let mut seen = HashSet::new();
        let specs: Vec<PlaceholderSpec> = releases
            .into_iter()
            .filter_map(|release| {
                let path = folder
                    .join(safe_file_name(&release.artist))
                    .join(safe_file_name(&release.title))
                    .join(ALBUM_PLACEHOLDER_FILE);
                if !seen.insert(path.clone()) {
                    return None;
                }
                let comment = CommentData::new(
                    OperationKind::SimilarAlbums,
                    State::UnloadedAlbum,
                    group.as_str(),
                    release.retriever_data,
                );
                Some(
                    PlaceholderSpec::new(path, comment)
                        .tag(Tag::TrackTitle, LOAD_ALBUM_TITLE)
                        .tag(Tag::Artist, release.artist.as_str())
                        .tag(Tag::AlbumArtist, release.artist)
                        .tag(Tag::Album, release.title)
                        .tag(Tag::Year, SORT_LAST_YEAR)
                        .artwork(release.thumb.map(Artwork::Url).unwrap_or_default())
                        .save_cover(true),
                )
            })
            .collect();

        let summary = self
            .materializer
            .materialize_batch(specs, progress, cancel)
            .await?;

        self.cache()
            .record(&key, Source::Lastfm, OperationKind::SimilarAlbums, &group);
        self.save();

        self.host.refresh_panels();
        open_group(self.host.as_ref(), &group);

        info!(key = %key, written = summary.written, "Similar albums loaded");
        Ok(LookupOutcome::Created {
            group,
            entity: key,
            summary,
        })
    }
}
