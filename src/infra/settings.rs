use crate::domain::StyleProfile;
use crate::infra::{MAX_TERMINAL_HEIGHT, MAX_TERMINAL_WIDTH};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "termpress.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub bind: String,
    pub content_dir: PathBuf,
    pub bio_path: Option<PathBuf>,
    pub theme: StyleProfile,
    pub log_level: String,
    pub tick_interval_ms: u64,
    pub load_increment: f64,
    pub clock_interval_ms: u64,
    pub render_timeout_ms: u64,
    pub max_sessions: usize,
    pub shutdown_grace_secs: u64,
    pub default_width: u16,
    pub default_height: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:23234".into(),
            content_dir: PathBuf::from("articles"),
            bio_path: None,
            theme: StyleProfile::Dark,
            log_level: "info".into(),
            tick_interval_ms: 1000,
            load_increment: 0.34,
            clock_interval_ms: 1000,
            render_timeout_ms: 5000,
            max_sessions: 64,
            shutdown_grace_secs: 30,
            default_width: 80,
            default_height: 24,
        }
    }
}

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn clock_interval(&self) -> Duration {
        Duration::from_millis(self.clock_interval_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, SettingsError> {
        self.bind
            .parse::<SocketAddr>()
            .map_err(|_| SettingsError::InvalidValue {
                key: "bind",
                value: self.bind.clone(),
            })
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.bind_addr()?;
        if !(self.load_increment > 0.0 && self.load_increment <= 1.0) {
            return Err(SettingsError::InvalidValue {
                key: "load_increment",
                value: self.load_increment.to_string(),
            });
        }
        for (key, value) in [
            ("tick_interval_ms", self.tick_interval_ms),
            ("clock_interval_ms", self.clock_interval_ms),
            ("render_timeout_ms", self.render_timeout_ms),
        ] {
            if value == 0 {
                return Err(SettingsError::InvalidValue {
                    key,
                    value: value.to_string(),
                });
            }
        }
        if self.max_sessions == 0 {
            return Err(SettingsError::InvalidValue {
                key: "max_sessions",
                value: "0".into(),
            });
        }
        if self.default_width == 0
            || self.default_height == 0
            || self.default_width > MAX_TERMINAL_WIDTH
            || self.default_height > MAX_TERMINAL_HEIGHT
        {
            return Err(SettingsError::InvalidValue {
                key: "default_width/default_height",
                value: format!("{}x{}", self.default_width, self.default_height),
            });
        }
        Ok(())
    }
}

/// Defaults, then the config file (explicit path or a discovered one), then `TERMPRESS_*`.
pub fn load_settings(config_path: Option<&Path>) -> Result<Settings, SettingsError> {
    let mut settings = match config_path {
        Some(path) => read_settings_file(path)?,
        None => match discover_config_file() {
            Some(path) => read_settings_file(&path)?,
            None => Settings::default(),
        },
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    Ok(settings)
}

fn discover_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    let user = dirs::config_dir()?.join("termpress").join(DEFAULT_CONFIG_FILE);
    user.is_file().then_some(user)
}

pub fn read_settings_file(path: &Path) -> Result<Settings, SettingsError> {
    let raw = fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str::<Settings>(&raw).map_err(|source| SettingsError::Parse {
        path: path.display().to_string(),
        source,
    })
}

pub fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), SettingsError> {
    if let Some(value) = lookup("TERMPRESS_BIND") {
        settings.bind = value;
    }
    if let Some(value) = lookup("TERMPRESS_CONTENT_DIR") {
        settings.content_dir = PathBuf::from(value);
    }
    if let Some(value) = lookup("TERMPRESS_BIO") {
        settings.bio_path = Some(PathBuf::from(value));
    }
    if let Some(value) = lookup("TERMPRESS_THEME") {
        settings.theme = value
            .parse::<StyleProfile>()
            .map_err(|_| SettingsError::InvalidValue {
                key: "TERMPRESS_THEME",
                value,
            })?;
    }
    if let Some(value) = lookup("TERMPRESS_MAX_SESSIONS") {
        settings.max_sessions =
            value
                .trim()
                .parse::<usize>()
                .map_err(|_| SettingsError::InvalidValue {
                    key: "TERMPRESS_MAX_SESSIONS",
                    value,
                })?;
    }
    if let Some(value) = lookup("TERMPRESS_LOG") {
        settings.log_level = value;
    }
    Ok(())
}
