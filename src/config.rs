use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Deployment target. Selects the default API base URL and mock mode.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
  Development,
  Staging,
  #[default]
  Production,
}

impl Environment {
  pub fn default_base_url(self) -> &'static str {
    match self {
      Environment::Development => "http://localhost:3000",
      Environment::Staging => "https://staging-api.condoconnectai.com",
      Environment::Production => "https://api.condoconnectai.com",
    }
  }

  /// Only local development answers from canned data by default.
  pub fn default_mock_mode(self) -> bool {
    self == Environment::Development
  }
}

/// Configuration file as written on disk. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
  pub environment: Environment,
  pub api: ApiSection,
  pub sync: SyncConfig,
  pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
  /// Overrides the environment's base URL
  pub base_url: Option<String>,
  /// Overrides the environment's mock mode
  pub mock_mode: Option<bool>,
  pub cache_ttl_secs: u64,
  /// Bound on cached responses; unbounded when unset
  pub cache_max_entries: Option<usize>,
  pub request_timeout_secs: u64,
}

impl Default for ApiSection {
  fn default() -> Self {
    Self {
      base_url: None,
      mock_mode: None,
      cache_ttl_secs: 300,
      cache_max_entries: None,
      request_timeout_secs: 30,
    }
  }
}

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
  pub environment: Environment,
  pub api: ApiConfig,
  pub sync: SyncConfig,
  pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
  pub base_url: String,
  pub mock_mode: bool,
  pub cache_ttl_secs: u64,
  pub cache_max_entries: Option<usize>,
  pub request_timeout_secs: u64,
}

impl ApiConfig {
  pub fn cache_ttl(&self) -> Duration {
    Duration::from_secs(self.cache_ttl_secs)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Run the periodic sync loop
  pub enabled: bool,
  pub interval_secs: u64,
  /// Tables synchronized on every cycle, in order
  pub tables: Vec<String>,
  /// Prefix of the per-table endpoints (`<prefix>/<table>`)
  pub path_prefix: String,
  /// Local store location; defaults to the user data directory
  pub database: Option<PathBuf>,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      interval_secs: 300,
      tables: ["residents", "payments", "maintenance", "communications"]
        .iter()
        .map(|t| t.to_string())
        .collect(),
      path_prefix: "/api".to_string(),
      database: None,
    }
  }
}

impl SyncConfig {
  pub fn interval(&self) -> Duration {
    Duration::from_secs(self.interval_secs)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
  pub enabled: bool,
  pub endpoint: String,
  /// Consecutive closures tolerated before giving up
  pub max_reconnect_attempts: u32,
  /// Reconnect n waits n times this long
  pub backoff_base_ms: u64,
}

impl Default for RealtimeConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      endpoint: "wss://realtime.condoconnectai.com".to_string(),
      max_reconnect_attempts: 5,
      backoff_base_ms: 1000,
    }
  }
}

impl RealtimeConfig {
  pub fn backoff_base(&self) -> Duration {
    Duration::from_millis(self.backoff_base_ms)
  }
}

impl Default for Config {
  fn default() -> Self {
    ConfigFile::default().resolve(None)
  }
}

impl ConfigFile {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./condoconnect.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/condoconnect/config.yaml
  ///
  /// Defaults apply when no file is found.
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => {
        debug!("no configuration file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("condoconnect.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("condoconnect").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml_str(contents: &str) -> Result<Self> {
    // An empty document is a valid, all-defaults configuration
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Apply environment presets. Values set explicitly in the file win over
  /// the preset; `environment` replaces the file's environment when given.
  pub fn resolve(self, environment: Option<Environment>) -> Config {
    let environment = environment.unwrap_or(self.environment);
    let api = self.api;

    Config {
      environment,
      api: ApiConfig {
        base_url: api
          .base_url
          .unwrap_or_else(|| environment.default_base_url().to_string()),
        mock_mode: api
          .mock_mode
          .unwrap_or_else(|| environment.default_mock_mode()),
        cache_ttl_secs: api.cache_ttl_secs,
        cache_max_entries: api.cache_max_entries,
        request_timeout_secs: api.request_timeout_secs,
      },
      sync: self.sync,
      realtime: self.realtime,
    }
  }
}

impl Config {
  /// Get the session token from environment variables.
  ///
  /// Checks CONDOCONNECT_TOKEN first, then CONDOCONNECT_SESSION_TOKEN as fallback.
  pub fn session_token() -> Option<String> {
    std::env::var("CONDOCONNECT_TOKEN")
      .or_else(|_| std::env::var("CONDOCONNECT_SESSION_TOKEN"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}
