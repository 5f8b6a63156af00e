//! Configuration file – reads/writes `~/.depthlink/config.toml`.

use depthlink_perception::{MAX_GRID_SIZE, ObstacleConfig};
use depthlink_runtime::SurveyConfig;
use depthlink_types::{DEFAULT_PORT, Endpoint};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::sim::clamp_frame_rate;

/// Persisted configuration stored in `~/.depthlink/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Host receiving telemetry.  Editable at runtime with `/host`.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Frame rate of the simulated tracker.
    #[serde(default = "default_frame_rate")]
    pub frame_rate_hz: f32,

    #[serde(default)]
    pub obstacle: ObstacleConfig,

    #[serde(default)]
    pub survey: SurveyConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_frame_rate() -> f32 {
    30.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frame_rate_hz: default_frame_rate(),
            obstacle: ObstacleConfig::default(),
            survey: SurveyConfig::default(),
        }
    }
}

impl Config {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.host.clone(), self.port)
    }

    /// Defaults plus `DEPTHLINK_*` overrides; used when no usable file exists.
    pub fn fallback() -> Self {
        let mut cfg = Self::default();
        apply_env_overrides(&mut cfg);
        cfg
    }

    /// Pull out-of-range numbers back into what the pipeline can run with.
    pub fn sanitize(&mut self) {
        let rate = clamp_frame_rate(self.frame_rate_hz);
        if rate != self.frame_rate_hz {
            warn!(configured = self.frame_rate_hz, using = rate, "frame rate out of range");
            self.frame_rate_hz = rate;
        }
        if self.obstacle.grid_size > MAX_GRID_SIZE {
            warn!(configured = self.obstacle.grid_size, using = MAX_GRID_SIZE, "probe grid too large");
            self.obstacle.grid_size = MAX_GRID_SIZE;
        }
    }
}

/// Return the path to `~/.depthlink/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".depthlink").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.sanitize();
    Ok(Some(cfg))
}

/// Apply `DEPTHLINK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `DEPTHLINK_HOST` | `host` |
/// | `DEPTHLINK_PORT` | `port` |
/// | `DEPTHLINK_FRAME_RATE` | `frame_rate_hz` |
///
/// Unparseable or non-positive numeric values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("DEPTHLINK_HOST")
        && !v.trim().is_empty()
    {
        cfg.host = v.trim().to_string();
    }
    if let Ok(v) = std::env::var("DEPTHLINK_PORT")
        && let Ok(port) = v.parse::<u16>()
        && port != 0
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("DEPTHLINK_FRAME_RATE")
        && let Ok(rate) = v.parse::<f32>()
        && rate > 0.0
    {
        cfg.frame_rate_hz = clamp_frame_rate(rate);
    }
}

/// Save the config to disk, creating `~/.depthlink/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}
