use super::{Explorer, LookupOutcome};
use crate::cache_registry::{group_for, open_group};
use crate::error::{ExploreError, ExploreResult};
use crate::library::{FilterCondition, Tag};
use crate::materializer::PlaceholderSpec;
use crate::models::{CommentData, OperationKind, Source, State, Subgroup, Track};
use crate::placeholder::{is_in_directory, safe_file_name, PLACEHOLDER_EXTENSION};
use crate::progress::ProgressReporter;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Album tag of popular track placeholders
pub const POPULAR_TRACKS_ALBUM: &str = "Popular Tracks";

/// Year tag that sorts generated groups after real albums
pub const SORT_LAST_YEAR: &str = "9999";

impl Explorer {
    /// Materialize an artist's most played tracks
    ///
    /// Tracks already in the library become links to the real file.
    pub async fn popular_tracks(
        &self,
        artist: &str,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<LookupOutcome> {
        let artist = artist.trim();
        if artist.is_empty() {
            return Err(ExploreError::InvalidInput(
                "No artist name in query or selection".to_string(),
            ));
        }

        let retriever = self.registry.popular_tracks(Source::Lastfm)?;
        progress.status(&format!("Fetching popular tracks for {}", artist));
        let tracks = retriever.popular_tracks(artist, cancel).await?;
        if tracks.is_empty() {
            return Err(ExploreError::NotFound(format!(
                "No popular tracks found for {}",
                artist
            )));
        }

        let group = group_for(OperationKind::PopularTracks, artist, Subgroup::None);
        let folder = self
            .paths
            .cache_dir
            .join(safe_file_name(artist))
            .join(POPULAR_TRACKS_ALBUM);
        let total = tracks.len();

        let specs: Vec<PlaceholderSpec> = tracks
            .into_iter()
            .enumerate()
            .map(|(index, track)| {
                let rank = index + 1;
                let path = folder.join(format!(
                    "{:02} - {}.{}",
                    rank,
                    safe_file_name(&track.title),
                    PLACEHOLDER_EXTENSION
                ));
                let comment = self.popular_comment(&group, &track);

                PlaceholderSpec::new(path, comment)
                    .tag(Tag::TrackTitle, track.title.as_str())
                    .tag(Tag::Artist, track.artist.as_str())
                    .tag(Tag::AlbumArtist, artist)
                    .tag(Tag::Album, POPULAR_TRACKS_ALBUM)
                    .tag(Tag::Year, SORT_LAST_YEAR)
                    .tag(Tag::TrackNo, rank.to_string())
                    .tag(Tag::TrackCount, total.to_string())
            })
            .collect();

        let summary = self
            .materializer
            .materialize_batch(specs, progress, cancel)
            .await?;

        self.host.refresh_panels();
        if self.settings.open_in_filter_view {
            open_group(self.host.as_ref(), &group);
        }

        info!(artist = %artist, written = summary.written, "Popular tracks loaded");
        Ok(LookupOutcome::Created {
            group,
            entity: artist.to_string(),
            summary,
        })
    }

    fn popular_comment(&self, group: &str, track: &Track) -> CommentData {
        match self.library_copy(track) {
            Some(existing) => {
                debug!(title = %track.title, path = %existing.display(), "Linking to library file");
                CommentData::link(
                    OperationKind::PopularTracks,
                    group,
                    track.retriever_data.clone(),
                    &existing,
                )
            }
            None => CommentData::new(
                OperationKind::PopularTracks,
                State::UnloadedTrack,
                group,
                track.retriever_data.clone(),
            ),
        }
    }

    /// A real library file for the track, outside the placeholder cache
    fn library_copy(&self, track: &Track) -> Option<PathBuf> {
        self.host
            .query_files(&[
                FilterCondition::contains(Tag::Artist, track.artist.as_str()),
                FilterCondition::is(Tag::TrackTitle, track.title.as_str()),
            ])
            .into_iter()
            .find(|path| {
                !is_in_directory(path, &self.paths.cache_dir)
                    && !is_in_directory(path, &self.paths.hidden_cache_dir)
            })
    }
}
