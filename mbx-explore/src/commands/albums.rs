use super::Explorer;
use crate::error::{ExploreError, ExploreResult};
use crate::processor::ProcessOutcome;
use crate::progress::ProgressReporter;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl Explorer {
    /// Expand every selected album placeholder without playing it
    ///
    /// Returns the number of albums expanded. Selected files that are not
    /// unloaded album placeholders are ignored.
    pub async fn load_selected_albums(
        &self,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> ExploreResult<usize> {
        let selected = self.host.selected_files();
        if selected.is_empty() {
            return Err(ExploreError::InvalidInput("No files selected".to_string()));
        }

        let mut seen = HashSet::new();
        let mut expanded = 0;
        for path in selected {
            if !seen.insert(path.clone()) {
                continue;
            }
            match self.processor.expand_album_at(&path, progress, cancel).await {
                Ok(ProcessOutcome::AlbumExpanded { .. }) => expanded += 1,
                Ok(_) => {}
                Err(ExploreError::Cancelled) => return Err(ExploreError::Cancelled),
                Err(e) => warn!(path = %path.display(), error = %e, "Could not load album"),
            }
        }

        if expanded == 0 {
            return Err(ExploreError::InvalidInput(
                "No unloaded albums selected".to_string(),
            ));
        }
        info!(albums = expanded, "Loaded selected albums");
        Ok(expanded)
    }
}
