//! Relay configuration.
//!
//! Loaded once at startup from `config.toml`:
//!
//! 1. `--config <path>` if given
//! 2. `$MODQUEUE_RELAY_CONFIG_DIR/config.toml`
//! 3. `<config dir>/modqueue-relay/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::Deserialize;

use crate::relay::Schedule;

const EXAMPLE: &str = "\
[reddit]
client-id = \"...\"
client-secret = \"...\"
subreddit = \"yoursubreddit\"

[discord]
webhook = \"https://discord.com/api/webhooks/<id>/<token>\"";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error(
        "no config file found at {}\nCreate one with at minimum:\n\n{}",
        .0.display(),
        EXAMPLE
    )]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config at {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },
}

/// Relay configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub reddit: RedditConfig,
    pub discord: DiscordConfig,
    #[serde(default)]
    pub poll: PollConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RedditConfig {
    pub client_id: String,
    pub client_secret: String,
    pub subreddit: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscordConfig {
    pub webhook: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PollConfig {
    pub interval_secs: u64,
    pub failure_backoff_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            failure_backoff_secs: 120,
        }
    }
}

impl PollConfig {
    pub fn schedule(&self) -> Schedule {
        Schedule {
            interval: Duration::from_secs(self.interval_secs),
            failure_backoff: Duration::from_secs(self.failure_backoff_secs),
        }
    }
}

fn default_user_agent() -> String {
    format!("modqueue-relay/{}", env!("CARGO_PKG_VERSION"))
}

fn default_redirect_uri() -> String {
    "http://localhost:8080".to_string()
}

fn default_auth_base() -> String {
    "https://www.reddit.com".to_string()
}

fn default_api_base() -> String {
    "https://oauth.reddit.com".to_string()
}

impl Config {
    /// Loads and validates the config at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&contents, path)
    }

    /// Parses and validates config text; `path` is only used in errors.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate().map_err(|message| ConfigError::Invalid {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        let required = [
            ("reddit.client-id", &self.reddit.client_id),
            ("reddit.client-secret", &self.reddit.client_secret),
            ("reddit.subreddit", &self.reddit.subreddit),
            ("discord.webhook", &self.discord.webhook),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{key} is empty"));
            }
        }
        if !(self.discord.webhook.starts_with("https://")
            || self.discord.webhook.starts_with("http://"))
        {
            return Err("discord.webhook must be an http(s) URL".to_string());
        }
        if self.poll.interval_secs == 0 {
            return Err("poll.interval-secs must be positive".to_string());
        }
        Ok(())
    }

    /// Resolves the config file path.
    pub fn path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(dir) = env::var_os("MODQUEUE_RELAY_CONFIG_DIR")
            && !dir.is_empty()
        {
            return Ok(PathBuf::from(dir).join("config.toml"));
        }
        dirs::config_dir()
            .map(|d| d.join("modqueue-relay").join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }
}
