use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Tool configuration, read from `config.toml`.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub log: LogSettings,
    #[serde(default)]
    pub replay: ReplaySettings,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct LogSettings {
    /// Default `tracing` filter, used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { filter: default_filter() }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(deny_unknown_fields)]
pub struct ReplaySettings {
    /// Print each event as it is applied.
    #[serde(default = "no")]
    pub echo_events: bool,
    /// Pretty-print JSON output.
    #[serde(default = "yes")]
    pub pretty_json: bool,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            echo_events: no(),
            pretty_json: yes(),
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

fn yes() -> bool {
    true
}

fn no() -> bool {
    false
}

pub fn config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stratum").join("config.toml"))
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Loads `path`, or the default config file, falling back to defaults
    /// when neither exists or parses.
    pub fn load_or_default(path: Option<&Path>) -> Config {
        let path = path.map(PathBuf::from).or_else(config_file);
        match path {
            Some(path) if path.exists() => Config::load(&path).unwrap_or_else(|err| {
                warn!(%err, path = %path.display(), "failed to load config; using defaults");
                Config::default()
            }),
            _ => Config::default(),
        }
    }
}
