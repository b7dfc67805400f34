//! mbx-explore library interface
//!
//! Discography discovery for a music library: album, track and popular
//! track placeholders are materialized from Discogs, MusicBrainz and Last.fm
//! and resolved into real audio when they are played.

pub mod cache_registry;
pub mod commands;
pub mod downloader;
pub mod error;
pub mod library;
pub mod materializer;
pub mod models;
pub mod placeholder;
pub mod processor;
pub mod progress;
pub mod providers;
pub mod query;
pub mod retrievers;
pub mod settings;

pub use crate::commands::{Explorer, ExplorerParts, LookupOutcome};
pub use crate::error::{ExploreError, ExploreResult};
pub use crate::library::{HostLibrary, MemoryLibrary};
pub use crate::settings::{ExplorerPaths, Settings};

/// Build identification captured by build.rs
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const BUILD_PROFILE: &str = env!("BUILD_PROFILE");
