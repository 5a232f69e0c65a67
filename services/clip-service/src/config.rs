//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The Twitch client secret comes from the TWITCH_CLIENT_SECRET env var or
//! `client_secret_file`, never from the TOML itself.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clip_acquire::{AcquireSettings, PollPolicy};
use serde::Deserialize;
use twitch_auth::{ClientCredentials, Secret};

use crate::error::{Error, Result};

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub twitch: TwitchConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub clips: ClipsConfig,
}

/// Registered Twitch application and endpoints
#[derive(Debug, Deserialize)]
pub struct TwitchConfig {
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file holding the client secret (alternative to TWITCH_CLIENT_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Per upstream HTTP request
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
    #[serde(default = "default_clips_path")]
    pub clips_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
            clips_path: default_clips_path(),
        }
    }
}

/// Cooldown and poll budgets
#[derive(Debug, Deserialize)]
pub struct ClipsConfig {
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_delay")]
    pub poll_delay_ms: u64,
    #[serde(default = "default_extended_attempts")]
    pub extended_poll_attempts: u32,
    #[serde(default = "default_extended_delay")]
    pub extended_poll_delay_ms: u64,
}

impl Default for ClipsConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            poll_attempts: default_poll_attempts(),
            poll_delay_ms: default_poll_delay(),
            extended_poll_attempts: default_extended_attempts(),
            extended_poll_delay_ms: default_extended_delay(),
        }
    }
}

impl ClipsConfig {
    pub fn settings(&self) -> AcquireSettings {
        AcquireSettings {
            cooldown: Duration::from_secs(self.cooldown_secs),
            foreground: PollPolicy {
                attempts: self.poll_attempts,
                delay: Duration::from_millis(self.poll_delay_ms),
            },
            extended: PollPolicy {
                attempts: self.extended_poll_attempts,
                delay: Duration::from_millis(self.extended_poll_delay_ms),
            },
        }
    }
}

fn default_api_base() -> String {
    helix::DEFAULT_API_BASE.to_string()
}

fn default_token_endpoint() -> String {
    twitch_auth::TOKEN_ENDPOINT.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_clips_path() -> PathBuf {
    PathBuf::from("clips.jsonl")
}

fn default_cooldown() -> u64 {
    30
}

fn default_poll_attempts() -> u32 {
    12
}

fn default_poll_delay() -> u64 {
    2_500
}

fn default_extended_attempts() -> u32 {
    10
}

fn default_extended_delay() -> u64 {
    15_000
}

fn require_http_url(field: &str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. TWITCH_CLIENT_SECRET env var
    /// 2. client_secret_file path from config
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if config.twitch.client_id.trim().is_empty() {
            return Err(Error::Config("client_id must not be empty".into()));
        }
        require_http_url("api_base", &config.twitch.api_base)?;
        require_http_url("token_endpoint", &config.twitch.token_endpoint)?;

        if config.server.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be greater than 0".into()));
        }
        if config.server.max_connections == 0 {
            return Err(Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if config.clips.poll_attempts == 0 {
            return Err(Error::Config("poll_attempts must be greater than 0".into()));
        }

        if let Ok(secret) = std::env::var("TWITCH_CLIENT_SECRET") {
            config.twitch.client_secret = Some(Secret::new(secret));
        } else if let Some(ref secret_file) = config.twitch.client_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                Error::Config(format!(
                    "failed to read client_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            let secret = secret.trim().to_owned();
            if !secret.is_empty() {
                config.twitch.client_secret = Some(Secret::new(secret));
            }
        }

        if config.twitch.client_secret.is_none() {
            return Err(Error::Config(
                "client secret missing: set TWITCH_CLIENT_SECRET or client_secret_file".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("clip-service.toml")
    }

    /// Application credentials used for Helix calls and token refresh.
    pub fn client_credentials(&self) -> Result<ClientCredentials> {
        let client_secret = self
            .twitch
            .client_secret
            .clone()
            .ok_or_else(|| Error::Config("client secret not resolved".into()))?;
        Ok(ClientCredentials {
            client_id: self.twitch.client_id.clone(),
            client_secret,
        })
    }
}
