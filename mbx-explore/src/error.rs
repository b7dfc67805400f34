//! Error types for mbx-explore
//!
//! One enum carries the whole taxonomy so that commands can decide at the
//! boundary which failures are user-facing and which are absorbed.

use crate::library::LibraryError;
use crate::models::{Capability, Source};
use crate::providers::ProviderError;
use std::path::PathBuf;
use thiserror::Error;

/// Explore operation errors
#[derive(Debug, Error)]
pub enum ExploreError {
    /// Query produced no provider result, or no exact match
    #[error("Not found: {0}")]
    NotFound(String),

    /// Source does not implement the requested capability
    #[error("{retriever} does not support {capability}")]
    CapabilityNotSupported {
        retriever: Source,
        capability: Capability,
    },

    /// Retriever payload routed to the wrong adapter
    #[error("Retriever data mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Source, found: Source },

    /// Transient provider failure (HTTP error, timeout, bad payload)
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Operation cancelled through its token
    #[error("Operation cancelled")]
    Cancelled,

    /// Audio fetcher reported failure
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Linked library file no longer exists
    #[error("Linked track no longer exists: {}", .0.display())]
    BrokenLink(PathBuf),

    /// Placeholder metadata is missing or inconsistent
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Host library rejected an operation
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    /// Missing credentials or unusable settings
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Common(#[from] mbx_common::Error),
}

impl From<ProviderError> for ExploreError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Cancelled => ExploreError::Cancelled,
            ProviderError::NotFound(what) => ExploreError::NotFound(what),
            other => ExploreError::Provider(other),
        }
    }
}

/// Convenience result type
pub type ExploreResult<T> = Result<T, ExploreError>;
