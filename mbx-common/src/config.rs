//! Bootstrap configuration and root folder resolution
//!
//! Configuration is split in two tiers:
//! 1. **TOML bootstrap** (`~/.config/mbx/config.toml`): root folder and logging.
//!    Read once at startup.
//! 2. **Runtime settings** (JSON, under the root folder): tokens, keys and
//!    behavioral flags. Owned by `mbx-explore`, saved whenever they change.
//!
//! # Root Folder Priority
//!
//! 1. Command-line argument
//! 2. Environment variable (`MBX_ROOT_FOLDER`)
//! 3. TOML config file (`root_folder`)
//! 4. OS-dependent default

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "MBX_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TomlConfig {
    /// Storage root (cache folders, registry, settings)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Load from an explicit path. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No TOML config, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Load from the platform config location, falling back to defaults
    pub fn load_default() -> Self {
        match default_config_path() {
            Some(path) => Self::load(&path).unwrap_or_else(|e| {
                warn!("Ignoring unreadable config file: {}", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }
}

/// Write TOML config atomically (temp file + rename)
///
/// On unix the file is restricted to the owner (0600) since it may be
/// extended with credentials.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Resolve the storage root folder
///
/// `toml_root` is the `root_folder` value of an already-loaded [`TomlConfig`].
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_root: Option<&Path>,
) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = toml_root {
        return path.to_path_buf();
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Platform config file location (`<config dir>/mbx/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mbx").join("config.toml"))
}

/// OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "macos") {
        // ~/Library/Application Support/mbx
        dirs::data_dir()
            .map(|d| d.join("mbx"))
            .unwrap_or_else(|| PathBuf::from("./mbx_data"))
    } else {
        // ~/.local/share/mbx, %LOCALAPPDATA%\mbx
        dirs::data_local_dir()
            .map(|d| d.join("mbx"))
            .unwrap_or_else(|| PathBuf::from("./mbx_data"))
    }
}
