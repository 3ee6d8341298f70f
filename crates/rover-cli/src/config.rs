//! Configuration Vault – reads/writes `~/.rover/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rover_runtime::SchedulerConfig;
use rover_types::RoverError;
use serde::{Deserialize, Serialize};

/// Longest shutdown wait the CLI will configure, whatever the file or
/// environment asks for.
pub const MAX_SHUTDOWN_TIMEOUT_SECS: u64 = 3_600;

/// Persisted rover configuration stored in `~/.rover/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Upper bound on the shutdown wait before the body is released anyway.
    /// Capped at [`MAX_SHUTDOWN_TIMEOUT_SECS`].
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Sleep between reactive iterations. Absent means no pacing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactive_pacing_ms: Option<u64>,

    /// A loop without a fresh iteration for this long is reported as stalled.
    #[serde(default = "default_stall_threshold_ms")]
    pub stall_threshold_ms: u64,

    /// The demo brain stops when the simulated range sensor reads closer
    /// than this.
    #[serde(default = "default_obstacle_cm")]
    pub obstacle_cm: f32,
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}
fn default_stall_threshold_ms() -> u64 {
    1_000
}
fn default_obstacle_cm() -> f32 {
    20.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            reactive_pacing_ms: None,
            stall_threshold_ms: default_stall_threshold_ms(),
            obstacle_cm: default_obstacle_cm(),
        }
    }
}

impl Config {
    /// Scheduler settings derived from this config.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            shutdown_timeout: Duration::from_secs(self.effective_shutdown_timeout_secs()),
            reactive_pacing: self.reactive_pacing_ms.map(Duration::from_millis),
            stall_threshold: Duration::from_millis(self.stall_threshold_ms),
        }
    }

    /// `shutdown_timeout_secs` capped at [`MAX_SHUTDOWN_TIMEOUT_SECS`].
    pub fn effective_shutdown_timeout_secs(&self) -> u64 {
        self.shutdown_timeout_secs.min(MAX_SHUTDOWN_TIMEOUT_SECS)
    }
}

/// Return the path to `~/.rover/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rover").join("config.toml")
}

/// Load the config from `path`. `None` if the file is missing.
///
/// Environment overrides are not applied here; see [`apply_env_overrides`].
pub fn load_from(path: &Path) -> Result<Option<Config>, RoverError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        RoverError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| RoverError::Config(format!("failed to parse config: {e}")))?;
    Ok(Some(cfg))
}

/// Apply `ROVER_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVER_SHUTDOWN_TIMEOUT_SECS` | `shutdown_timeout_secs` |
/// | `ROVER_REACTIVE_PACING_MS` | `reactive_pacing_ms` (`0` disables pacing) |
/// | `ROVER_STALL_THRESHOLD_MS` | `stall_threshold_ms` |
/// | `ROVER_OBSTACLE_CM` | `obstacle_cm` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(secs) = env_parse::<u64>("ROVER_SHUTDOWN_TIMEOUT_SECS") {
        cfg.shutdown_timeout_secs = secs;
    }
    if let Some(ms) = env_parse::<u64>("ROVER_REACTIVE_PACING_MS") {
        cfg.reactive_pacing_ms = (ms > 0).then_some(ms);
    }
    if let Some(ms) = env_parse::<u64>("ROVER_STALL_THRESHOLD_MS") {
        cfg.stall_threshold_ms = ms;
    }
    if let Some(cm) = env_parse::<f32>("ROVER_OBSTACLE_CM")
        && cm.is_finite()
    {
        cfg.obstacle_cm = cm;
    }
}

fn env_parse<T: std::str::FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok()?.trim().parse().ok()
}

/// Save the config to disk, creating `~/.rover/` if necessary.
pub fn save(cfg: &Config) -> Result<(), RoverError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), RoverError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RoverError::Config(format!("failed to create config directory: {e}")))?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                RoverError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RoverError::Config(format!("failed to serialize config: {e}")))?;
    let write_err =
        |e: std::io::Error| RoverError::Config(format!("failed to write config at {}: {e}", path.display()));
    // Owner-only file (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
