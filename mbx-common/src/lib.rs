//! # MBX Common Library
//!
//! Shared code for the mbx workspace:
//! - Error and result types
//! - Bootstrap configuration and root folder resolution
//! - Logging initialisation
//! - HTTP identification (user agent)

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};

/// User agent sent with every provider request
pub fn user_agent() -> String {
    format!(
        "MusicBeeExplore/{} ( https://github.com/mbx-explore/mbx )",
        env!("CARGO_PKG_VERSION")
    )
}
