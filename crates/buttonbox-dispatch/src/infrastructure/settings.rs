//! Connection settings: TOML persistence and live endpoint publication.
//!
//! [`SettingsStore`] owns the persisted [`AppConfig`] and a `watch` channel
//! carrying the current send target.  Edits validate first, then persist,
//! then publish, so subscribers never observe a target that failed
//! validation or was lost on disk.
//!
//! [`EndpointResolver`] is the read side handed to the dispatcher and the
//! connection monitor.  It is cheap to clone and `current()` never blocks;
//! it simply snapshots the most recently published value.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use buttonbox_core::domain::endpoint::{Endpoint, EndpointError};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error type for configuration loading and persistence.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform configuration directory could be determined.
    #[error("could not determine a configuration directory for this platform")]
    NoPlatformConfigDir,

    /// Reading or writing the configuration file failed.
    #[error("config file I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration file exists but is not valid TOML.
    #[error("config file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serializing the configuration back to TOML failed.
    #[error("config serialization failed: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Error type for settings edits.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The submitted host/port pair is not a valid endpoint.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    /// The edit validated but could not be persisted.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ── Configuration schema ──────────────────────────────────────────────────────

/// Top-level application configuration, persisted as TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// The saved send target, absent until the user pairs with a machine.
    #[serde(default)]
    pub target: TargetConfig,

    /// Connection monitor cadence.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// LAN peer discovery parameters.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Default log filter, overridable via `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            monitor: MonitorConfig::default(),
            discovery: DiscoveryConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// The persisted send target. Both fields must be present and valid for a
/// target to be published; a half-filled pair is treated as unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Connection monitor cadence, all in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Probe interval while the link is up.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Probe interval while probing or down.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// How long to wait for a pong before counting the probe as failed.
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval_ms(),
            probe_interval_ms: default_probe_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
        }
    }
}

/// LAN peer discovery parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Well-known UDP port receivers listen on for discovery probes.
    #[serde(default = "default_discovery_port")]
    pub port: u16,

    /// How long one sweep collects announce replies, in milliseconds.
    #[serde(default = "default_discovery_window_ms")]
    pub window_ms: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            window_ms: default_discovery_window_ms(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_ping_interval_ms() -> u64 {
    10_000
}

fn default_probe_interval_ms() -> u64 {
    2_000
}

fn default_pong_timeout_ms() -> u64 {
    2_000
}

fn default_discovery_port() -> u16 {
    5056
}

fn default_discovery_window_ms() -> u64 {
    1_500
}

impl AppConfig {
    /// The endpoint this config designates, if the saved target is complete
    /// and valid.  An invalid saved pair is reported and treated as unset
    /// rather than failing startup.
    pub fn saved_endpoint(&self) -> Option<Endpoint> {
        let host = self.target.host.as_deref()?;
        let port = self.target.port?;
        match Endpoint::new(host, port) {
            Ok(ep) => Some(ep),
            Err(err) => {
                warn!(error = %err, "ignoring invalid saved target");
                None
            }
        }
    }
}

// ── File locations ────────────────────────────────────────────────────────────

/// Platform-appropriate configuration directory.
///
/// - Windows: `%APPDATA%\ButtonBox`
/// - macOS:   `~/Library/Application Support/ButtonBox`
/// - Linux:   `$XDG_CONFIG_HOME/buttonbox` or `~/.config/buttonbox`
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    #[cfg(target_os = "windows")]
    {
        env::var_os("APPDATA")
            .map(|base| PathBuf::from(base).join("ButtonBox"))
            .ok_or(ConfigError::NoPlatformConfigDir)
    }

    #[cfg(target_os = "macos")]
    {
        env::var_os("HOME")
            .map(|home| {
                PathBuf::from(home)
                    .join("Library")
                    .join("Application Support")
                    .join("ButtonBox")
            })
            .ok_or(ConfigError::NoPlatformConfigDir)
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg).join("buttonbox"));
        }
        env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".config").join("buttonbox"))
            .ok_or(ConfigError::NoPlatformConfigDir)
    }
}

/// Full path of the configuration file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads configuration from the default platform location.  A missing file
/// yields defaults; a malformed file is an error so a typo never silently
/// resets the saved target.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads configuration from an explicit path.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(AppConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: err,
            })
        }
    };
    let config = toml::from_str(&contents)?;
    info!(path = %path.display(), "loaded configuration");
    Ok(config)
}

/// Saves configuration to an explicit path, creating parent directories.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| ConfigError::Io {
            path: parent.to_path_buf(),
            source: err,
        })?;
    }
    let contents = toml::to_string_pretty(config)?;
    fs::write(path, contents).map_err(|err| ConfigError::Io {
        path: path.to_path_buf(),
        source: err,
    })?;
    debug!(path = %path.display(), "saved configuration");
    Ok(())
}

// ── Settings store ────────────────────────────────────────────────────────────

/// Owns the mutable configuration and publishes the current send target.
///
/// All edits go through this store so that validation, persistence and
/// publication stay in one place.  The store itself is not shared across
/// tasks; readers hold [`EndpointResolver`] clones instead.
pub struct SettingsStore {
    config: AppConfig,
    path: PathBuf,
    target_tx: watch::Sender<Option<Endpoint>>,
}

impl SettingsStore {
    /// Creates a store around an already-loaded config, publishing the saved
    /// target (if any) as the initial value.
    pub fn new(config: AppConfig, path: PathBuf) -> Self {
        let (target_tx, _) = watch::channel(config.saved_endpoint());
        Self {
            config,
            path,
            target_tx,
        }
    }

    /// A new resolver observing this store's target.
    pub fn resolver(&self) -> EndpointResolver {
        EndpointResolver::new(self.target_tx.subscribe())
    }

    /// The current configuration snapshot.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Validates, persists and publishes a new send target.
    ///
    /// On any error the previously published target stays in effect.
    pub fn set_target(&mut self, host: impl Into<String>, port: u16) -> Result<(), SettingsError> {
        let endpoint = Endpoint::new(host, port)?;
        self.config.target.host = Some(endpoint.host().to_string());
        self.config.target.port = Some(endpoint.port());
        save_config_to(&self.config, &self.path)?;
        info!(target = %endpoint, "send target updated");
        self.target_tx.send_replace(Some(endpoint));
        Ok(())
    }

    /// Clears the persisted target and publishes `None`.
    pub fn clear_target(&mut self) -> Result<(), SettingsError> {
        self.config.target = TargetConfig::default();
        save_config_to(&self.config, &self.path)?;
        info!("send target cleared");
        self.target_tx.send_replace(None);
        Ok(())
    }
}

// ── Endpoint resolver ─────────────────────────────────────────────────────────

/// Read-side handle on the current send target.
///
/// Cloneable; every clone observes the same publications. `current()` is a
/// non-blocking snapshot read, suitable for the per-send resolution the
/// dispatcher performs.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    rx: watch::Receiver<Option<Endpoint>>,
}

impl EndpointResolver {
    /// Wraps an existing watch receiver.  Production code gets resolvers
    /// from [`SettingsStore::resolver`]; tests may drive the channel
    /// directly.
    pub fn new(rx: watch::Receiver<Option<Endpoint>>) -> Self {
        Self { rx }
    }

    /// The most recently published target, or `None` if no valid target has
    /// ever been configured.
    pub fn current(&self) -> Option<Endpoint> {
        self.rx.borrow().clone()
    }

    /// Waits until the published target changes.  Returns `false` once the
    /// owning store is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
