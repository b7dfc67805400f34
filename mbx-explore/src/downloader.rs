//! External audio fetching through yt-dlp
//!
//! The fetcher searches by free text and either downloads the best match as
//! Opus or returns a direct stream URL without downloading.

use crate::error::{ExploreError, ExploreResult};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Extension of downloaded audio
pub const AUDIO_EXTENSION: &str = "opus";

const MAX_FILESIZE: &str = "200M";

/// Resolves a search query to playable audio
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Download the best match to `out_no_ext` plus the audio extension
    ///
    /// `Ok(None)` means the search found nothing to download.
    async fn download(
        &self,
        query: &str,
        out_no_ext: &Path,
        cancel: &CancellationToken,
    ) -> ExploreResult<Option<PathBuf>>;

    /// Direct stream URL of the best match
    async fn stream_url(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> ExploreResult<Option<String>>;
}

/// yt-dlp command line wrapper
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
    base_args: Vec<String>,
}

impl YtDlp {
    /// `command` may carry extra arguments, e.g. `"yt-dlp --no-playlist"`
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_else(|| "yt-dlp".to_string());
        Self {
            program,
            base_args: parts.collect(),
        }
    }

    fn command(&self, query: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .arg(format!("ytsearch:{}", query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, mut command: Command, cancel: &CancellationToken) -> ExploreResult<Output> {
        let child = command.spawn().map_err(|e| {
            ExploreError::DownloadFailed(format!("Failed to start {}: {}", self.program, e))
        })?;

        // Dropping the child on cancellation kills the process
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(ExploreError::Cancelled),
            output = child.wait_with_output() => output?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let reason = stderr.lines().last().unwrap_or("").trim().to_string();
            return Err(ExploreError::DownloadFailed(format!(
                "{} exited with {}: {}",
                self.program, output.status, reason
            )));
        }
        Ok(output)
    }
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl AudioFetcher for YtDlp {
    async fn download(
        &self,
        query: &str,
        out_no_ext: &Path,
        cancel: &CancellationToken,
    ) -> ExploreResult<Option<PathBuf>> {
        let target = with_audio_extension(out_no_ext);
        let mut template = out_no_ext.as_os_str().to_os_string();
        template.push(".%(ext)s");

        let mut command = self.command(query);
        command
            .arg("--max-filesize")
            .arg(MAX_FILESIZE)
            .arg("-x")
            .arg("--audio-format")
            .arg(AUDIO_EXTENSION)
            .arg("-o")
            .arg(&template);

        info!(query = %query, target = %target.display(), "Downloading audio");
        self.run(command, cancel).await?;

        if tokio::fs::try_exists(&target).await? {
            Ok(Some(target))
        } else {
            warn!(query = %query, "yt-dlp finished without producing audio");
            Ok(None)
        }
    }

    async fn stream_url(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> ExploreResult<Option<String>> {
        let mut command = self.command(query);
        command.arg("-f").arg("bestaudio").arg("--get-url");

        debug!(query = %query, "Resolving stream URL");
        let output = self.run(command, cancel).await?;
        Ok(first_line(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// `path` with the audio extension appended (never replacing a dotted suffix)
pub fn with_audio_extension(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(".");
    name.push(AUDIO_EXTENSION);
    PathBuf::from(name)
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Plays a stream URL outside the host
pub trait MediaPlayer: Send + Sync {
    fn play(&self, url: &str) -> ExploreResult<()>;
}

/// Player started from a command template
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    template: String,
}

impl CommandPlayer {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl MediaPlayer for CommandPlayer {
    fn play(&self, url: &str) -> ExploreResult<()> {
        launch_media_player(&self.template, url)
    }
}

/// Start the configured media player on a stream URL
///
/// `{url}` in the command template is replaced by the URL. The player runs
/// detached.
pub fn launch_media_player(command_template: &str, url: &str) -> ExploreResult<()> {
    let mut parts = command_template
        .split_whitespace()
        .map(|part| part.replace("{url}", url));
    let program = parts
        .next()
        .ok_or_else(|| ExploreError::Config("Media player command is empty".to_string()))?;
    let mut args: Vec<String> = parts.collect();
    if !command_template.contains("{url}") {
        args.push(url.to_string());
    }

    Command::new(&program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| ExploreError::Config(format!("Failed to start {}: {}", program, e)))?;

    info!(player = %program, "Streaming through media player");
    Ok(())
}
