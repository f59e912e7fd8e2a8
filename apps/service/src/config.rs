use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to read config {}: {source}", path.display())]
    ReadFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to write config {}: {source}", path.display())]
    WriteFailed { path: path::PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("No config directory available, set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub monitoring: Monitoring,
    pub storage: Storage,
    pub telegram: Telegram,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Monitoring {
    /// Pause between two polling cycles
    pub period_seconds: u64,
    /// Limit for a single status query
    pub query_timeout_seconds: u64,
    /// Pause before each retry of a failed query
    pub retry_delay_seconds: u64,
    /// Query attempts per check, including the first one
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Storage {
    pub path: path::PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Telegram {
    pub api_url: String,
    pub poll_timeout_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for Monitoring {
    fn default() -> Self {
        Self { period_seconds: 42, query_timeout_seconds: 15, retry_delay_seconds: 5, max_attempts: 3 }
    }
}

impl Monitoring {
    /// A zero period would spin the polling loop and a zero timeout fails every check
    fn reset_zero_durations(&mut self) {
        let defaults = Self::default();

        if self.period_seconds == 0 {
            warn!("Ignoring monitoring.period_seconds = 0, using {}", defaults.period_seconds);
            self.period_seconds = defaults.period_seconds;
        }

        if self.query_timeout_seconds == 0 {
            warn!("Ignoring monitoring.query_timeout_seconds = 0, using {}", defaults.query_timeout_seconds);
            self.query_timeout_seconds = defaults.query_timeout_seconds;
        }
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self { path: "subscriptions.json".into() }
    }
}

impl Default for Telegram {
    fn default() -> Self {
        Self { api_url: "https://api.telegram.org".into(), poll_timeout_seconds: 30, token: None }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/srvwatch/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("srvwatch/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Monitoring")?;
        write_1(f, "Period (s)", &self.monitoring.period_seconds)?;
        write_1(f, "Query Timeout (s)", &self.monitoring.query_timeout_seconds)?;
        write_1(f, "Retry Delay (s)", &self.monitoring.retry_delay_seconds)?;
        write_1(f, "Max Attempts", &self.monitoring.max_attempts)?;
        write_title_1(f, "Storage")?;
        write_1(f, "Path", &self.storage.path.display())?;
        write_title_1(f, "Telegram")?;
        write_1(f, "API URL", &self.telegram.api_url)?;
        write_1(f, "Poll Timeout (s)", &self.telegram.poll_timeout_seconds)?;
        write_1(f, "Token", &if self.telegram.token.is_some() { "<set>" } else { "<missing>" })?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/srvwatch/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    ///
    /// ```ignore
    /// let cfg = config::Config::from_config(None::<&path::Path>)?;
    /// println!("{}", cfg);
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| Error::ReadFailed { path: config_path.clone(), source })?;
            let mut config: Self = toml::from_str(raw_string.as_str())?;
            config.monitoring.reset_zero_durations();
            Ok(config)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })?;
        }

        fs::write(path, config_str).map_err(|source| Error::WriteFailed { path: path.to_path_buf(), source })
    }

    /// Apply `BOT_TOKEN`, `BOT_PERIOD` and `SRVWATCH_STORAGE` from the environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| env::var(name).ok());
    }

    /// Apply overrides from `lookup`; unparsable numbers are ignored with a warning
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.is_empty()) {
            self.telegram.token = Some(token);
        }

        if let Some(period) = lookup("BOT_PERIOD") {
            match period.parse::<u64>() {
                Ok(seconds) if seconds > 0 => self.monitoring.period_seconds = seconds,
                _ => warn!("Ignoring invalid BOT_PERIOD value: {period}"),
            }
        }

        if let Some(path) = lookup("SRVWATCH_STORAGE").filter(|p| !p.is_empty()) {
            self.storage.path = path.into();
        }
    }
}
