//! mbx-explore - discography discovery from the command line
//!
//! Runs the explorer commands against a JSON-persisted library store under
//! the root folder. Ctrl-C cancels the running command; whatever was
//! registered up to then is kept.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mbx_common::config::{resolve_root_folder, TomlConfig, ROOT_FOLDER_ENV};
use mbx_common::logging::init_logging;
use mbx_explore::cache_registry::group_conditions;
use mbx_explore::library::Tag;
use mbx_explore::models::Source;
use mbx_explore::processor::ProcessOutcome;
use mbx_explore::progress::TracingProgress;
use mbx_explore::{Explorer, ExplorerPaths, HostLibrary, LookupOutcome, MemoryLibrary, Settings};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments for mbx-explore
#[derive(Parser, Debug)]
#[command(name = "mbx-explore")]
#[command(about = "Browse artist discographies as playable placeholders")]
#[command(version)]
struct Args {
    /// Storage root (cache folders, registry, settings, library store)
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Materialize album placeholders for an artist or label
    ///
    /// Prefix with `>` or `>>` for deeper retrieval, `l:` for labels, and
    /// wrap in quotes for an exact name match.
    Discography {
        query: String,
        #[arg(short, long, value_enum, default_value = "discogs")]
        source: ProviderArg,
    },
    /// Materialize an artist's most played tracks
    Popular { artist: String },
    /// Materialize albums similar to an album
    Similar { artist: String, album: String },
    /// Play a library file, resolving it if it is a placeholder
    Play { path: PathBuf },
    /// Expand album placeholders without playing them
    LoadAlbums {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Delete the cache folder of a file's album artist
    DeleteArtistCache { path: PathBuf },
    /// Hide or show the cache folder
    ToggleCache,
    /// List library files
    List {
        /// Only files of this placeholder group
        #[arg(short, long)]
        group: Option<String>,
    },
    /// Show settings, or change one with KEY=VALUE
    Settings {
        #[arg(long, value_name = "KEY=VALUE")]
        set: Option<String>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ProviderArg {
    Discogs,
    Musicbrainz,
}

impl From<ProviderArg> for Source {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Discogs => Source::Discogs,
            ProviderArg::Musicbrainz => Source::MusicBrainz,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = TomlConfig::load_default();
    init_logging(&config.logging).context("Failed to initialize logging")?;

    let root_folder = resolve_root_folder(
        args.root_folder.as_deref(),
        ROOT_FOLDER_ENV,
        config.root_folder.as_deref(),
    );
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = mbx_explore::GIT_HASH,
        root = %root_folder.display(),
        "Starting mbx-explore"
    );

    let paths = ExplorerPaths::new(root_folder);
    let mut settings = Settings::load(&paths.settings_file).context("Failed to load settings")?;

    if let Command::Settings { set } = &args.command {
        if let Some(assignment) = set {
            apply_setting(&mut settings, assignment)?;
            settings.save(&paths.settings_file)?;
        }
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    let library = Arc::new(
        MemoryLibrary::open(&paths.library_file).context("Failed to open library store")?,
    );
    let host: Arc<dyn HostLibrary> = library.clone();
    let explorer = Explorer::from_settings(host, settings, paths)
        .context("Failed to initialize explorer")?;
    explorer.register_commands();

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let result = run(&explorer, &library, args.command, &cancel).await;

    explorer.save();
    if let Err(e) = library.save() {
        warn!(error = %e, "Could not save library store");
    }
    result
}

async fn run(
    explorer: &Explorer,
    library: &MemoryLibrary,
    command: Command,
    cancel: &CancellationToken,
) -> Result<()> {
    let progress = TracingProgress;

    match command {
        Command::Discography { query, source } => {
            let outcome = explorer
                .discography(&query, source.into(), &progress, cancel)
                .await?;
            print_lookup(&outcome);
        }
        Command::Popular { artist } => {
            let outcome = explorer.popular_tracks(&artist, &progress, cancel).await?;
            print_lookup(&outcome);
        }
        Command::Similar { artist, album } => {
            let outcome = explorer
                .similar_albums(&artist, &album, &progress, cancel)
                .await?;
            print_lookup(&outcome);
        }
        Command::Play { path } => {
            library.set_now_playing(vec![path], Some(0));
            let outcome = explorer.on_now_playing_changed(&progress, cancel).await?;
            print_play(&outcome);
            if let Some(current) = library.now_playing() {
                println!("Now playing: {}", current.display());
            }
        }
        Command::LoadAlbums { paths } => {
            library.set_selected(paths);
            let count = explorer.load_selected_albums(&progress, cancel).await?;
            println!("Loaded {} album(s)", count);
        }
        Command::DeleteArtistCache { path } => {
            library.set_selected(vec![path]);
            let folder = explorer.delete_artist_cache()?;
            println!("Deleted {}", folder.display());
        }
        Command::ToggleCache => {
            let visibility = explorer.toggle_cached_albums()?;
            println!("Cache: {:?}", visibility);
        }
        Command::List { group } => {
            let files = match group {
                Some(group) => library.query_files(&group_conditions(&group)),
                None => library.files(),
            };
            for file in files {
                let title = library.get_tag(&file, Tag::TrackTitle).unwrap_or_default();
                let album = library.get_tag(&file, Tag::Album).unwrap_or_default();
                println!("{}\t{}\t{}", file.display(), album, title);
            }
        }
        Command::Settings { .. } => {}
    }
    Ok(())
}

/// Assign one settings field from `KEY=VALUE`
///
/// The value is read as JSON when it parses (`true`, `25`), otherwise as a
/// string.
fn apply_setting(settings: &mut Settings, assignment: &str) -> Result<()> {
    let (key, raw) = assignment
        .split_once('=')
        .context("Expected KEY=VALUE")?;
    let key = key.trim();

    let mut value = serde_json::to_value(&*settings)?;
    let object = value
        .as_object_mut()
        .context("Settings are not an object")?;
    let parsed = serde_json::from_str(raw.trim())
        .unwrap_or_else(|_| serde_json::Value::String(raw.trim().to_string()));
    object.insert(key.to_string(), parsed);

    *settings = serde_json::from_value(value)
        .with_context(|| format!("Invalid value for setting '{}'", key))?;
    if serde_json::to_value(&*settings)?.get(key).is_none() {
        anyhow::bail!("Unknown setting '{}'", key);
    }
    info!(key = %key, "Setting updated");
    Ok(())
}

fn print_lookup(outcome: &LookupOutcome) {
    match outcome {
        LookupOutcome::Cached { group } => println!("Reopened cached group {}", group),
        LookupOutcome::Created {
            group,
            entity,
            summary,
        } => println!(
            "{}: {} written, {} skipped, {} failed (group {})",
            entity, summary.written, summary.skipped, summary.failed, group
        ),
    }
}

fn print_play(outcome: &ProcessOutcome) {
    match outcome {
        ProcessOutcome::NotManaged => println!("Not a placeholder"),
        ProcessOutcome::AlreadyLoaded => println!("Already loaded"),
        ProcessOutcome::AlbumExpanded { tracks, .. } => println!("Expanded album: {} tracks", tracks),
        ProcessOutcome::TrackLoaded { path, .. } => println!("Downloaded {}", path.display()),
        ProcessOutcome::Streaming { url } => println!("Streaming {}", url),
        ProcessOutcome::Linked { path } => println!("Linked to {}", path.display()),
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl+C, cancelling");
        cancel.cancel();
    }
}
