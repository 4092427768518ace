use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::tracker::types::ProjectId;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  pub auth: AuthConfig,
  /// Project used when a command omits one
  pub default_project: Option<ProjectId>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the tracker REST API, e.g. https://tracker.example.com/api
  pub url: String,
}

/// OpenID Connect client registration used to sign in.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
  /// Issuer URL, e.g. https://id.example.com/realms/tracker
  pub authority: String,
  pub client_id: String,
  pub redirect_uri: String,
  pub post_logout_redirect_uri: Option<String>,
}

/// One year
pub const MAX_STALE_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Seconds before a cached result is refetched
  #[serde(default = "default_stale_secs")]
  pub stale_secs: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      stale_secs: default_stale_secs(),
    }
  }
}

/// Retry policy for idempotent reads. Writes are never retried.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_base_delay_ms")]
  pub base_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      base_delay_ms: default_base_delay_ms(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_stale_secs() -> i64 {
  300
}

fn default_max_attempts() -> u32 {
  3
}

fn default_base_delay_ms() -> u64 {
  250
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./kanbo.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/kanbo/config.yaml
  ///
  /// `KANBO_API_URL` overrides `api.url` from the file.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/kanbo/config.yaml\n\
                 See config.example.yaml for the format."
        ))
      }
    };

    if let Ok(url) = std::env::var("KANBO_API_URL") {
      config.api.url = url;
    }
    config.validate()?;

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("kanbo.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("kanbo").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  fn validate(&self) -> Result<()> {
    url::Url::parse(&self.api.url)
      .map_err(|e| eyre!("Invalid api.url '{}': {}", self.api.url, e))?;
    url::Url::parse(&self.auth.authority)
      .map_err(|e| eyre!("Invalid auth.authority '{}': {}", self.auth.authority, e))?;
    if self.retry.max_attempts == 0 {
      return Err(eyre!("retry.max_attempts must be at least 1"));
    }
    if !(0..=MAX_STALE_SECS).contains(&self.cache.stale_secs) {
      return Err(eyre!(
        "cache.stale_secs must be between 0 and {}, got {}",
        MAX_STALE_SECS,
        self.cache.stale_secs
      ));
    }
    Ok(())
  }

  /// Directory for the session file and logs.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("kanbo"))
  }

  /// Access token from the environment, bypassing the stored session.
  pub fn env_token() -> Option<String> {
    std::env::var("KANBO_TOKEN").ok().filter(|t| !t.is_empty())
  }
}
