//! Daemon configuration file.
//!
//! # Storage layout
//!
//! ```text
//! ~/.swarmkeeper/
//!   config.yaml         (mode 0600 — daemon binary path, intervals)
//!   environments.yaml   (directory snapshot, when no other source is set)
//! ```
//!
//! # API pattern
//!
//! Every function that touches the filesystem has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for the swarmkeeper daemon.
///
/// Interval fields are expressed in seconds so the YAML stays hand-editable;
/// the daemon converts them to `Duration` at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the overlay-network daemon control binary.
    #[serde(default = "default_p2p_path")]
    pub p2p_path: PathBuf,

    /// Directory snapshot file. `None` falls back to
    /// `~/.swarmkeeper/environments.yaml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_path: Option<PathBuf>,

    /// Root of locally hosted containers (hostname files are read from
    /// `<lxc_root>/<name>/rootfs/etc/hostname`).
    #[serde(default = "default_lxc_root")]
    pub lxc_root: PathBuf,

    /// Reconciliation period while the overlay daemon is operational.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,

    /// Reconciliation period while the overlay daemon is down.
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Health monitor poll period while the daemon is not running.
    #[serde(default = "default_health_idle_secs")]
    pub health_idle_secs: u64,

    /// Health monitor poll period while the daemon is running.
    #[serde(default = "default_health_running_secs")]
    pub health_running_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            p2p_path: default_p2p_path(),
            directory_path: None,
            lxc_root: default_lxc_root(),
            tick_secs: default_tick_secs(),
            backoff_secs: default_backoff_secs(),
            health_idle_secs: default_health_idle_secs(),
            health_running_secs: default_health_running_secs(),
        }
    }
}

fn default_p2p_path() -> PathBuf {
    PathBuf::from("/usr/bin/p2p")
}

fn default_lxc_root() -> PathBuf {
    PathBuf::from("/var/lib/lxc")
}

fn default_tick_secs() -> u64 {
    15
}

fn default_backoff_secs() -> u64 {
    30
}

fn default_health_idle_secs() -> u64 {
    5
}

fn default_health_running_secs() -> u64 {
    30
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.swarmkeeper/` — pure, no I/O.
pub fn swarmkeeper_root_at(home: &Path) -> PathBuf {
    home.join(".swarmkeeper")
}

/// `<home>/.swarmkeeper/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    swarmkeeper_root_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

impl Config {
    /// Load `<home>/.swarmkeeper/config.yaml`, or defaults when the file is
    /// absent (first run needs no setup).
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let path = config_path_at(home);
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
    }

    /// `load_at` convenience wrapper.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&home()?)
    }

    /// Atomically save to `<home>/.swarmkeeper/config.yaml`.
    ///
    /// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
    pub fn save_at(&self, home: &Path) -> Result<(), ConfigError> {
        let root = swarmkeeper_root_at(home);
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
            set_dir_permissions(&root)?;
        }
        let path = config_path_at(home);
        let tmp_path = path.with_file_name("config.yaml.tmp");

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(&tmp_path, yaml)?;
        set_file_permissions(&tmp_path)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    /// `save_at` convenience wrapper.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_at(&home()?)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
