use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::db::OfflineStore;

/// Environment variable overriding the configured origin
const ORIGIN_ENV: &str = "FUELSW_ORIGIN";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin of the web application; same-origin responses are cacheable
  pub origin: String,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  pub notification: NotificationConfig,
  pub budgets: BudgetsConfig,
  /// Per-request network timeout
  pub request_timeout_secs: u64,
  /// Write logs to daily files in this directory instead of stderr
  pub log_dir: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:5000".to_string(),
      cache: CacheConfig::default(),
      sync: SyncConfig::default(),
      notification: NotificationConfig::default(),
      budgets: BudgetsConfig::default(),
      request_timeout_secs: 30,
      log_dir: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Current bucket name. Bump the version to drop everything cached before.
  pub name: String,
  /// Resources stored on install
  pub precache: Vec<String>,
  /// Cache database file (default: $XDG_DATA_HOME/fuelsw/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      name: "fuel-tracker-v1.0.0".to_string(),
      precache: [
        "/",
        "/static/css/style.css",
        "/static/js/app.js",
        "/static/icons/icon-192x192.png",
        "/static/icons/icon-512x512.png",
        "/manifest.json",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      path: None,
    }
  }
}

impl CacheConfig {
  pub fn db_path(&self) -> Result<PathBuf> {
    if let Some(ref path) = self.path {
      return Ok(path.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("fuelsw").join("cache.db"))
  }
}

/// What happens to buffered records after a sync request.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SyncPolicy {
  /// Records are never marked; every sync resends everything
  #[default]
  BestEffort,
  /// Records in a batch answered with 2xx are marked sent and skipped later
  MarkSentOnSuccess,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Only sync events with this tag are handled
  pub tag: String,
  /// Path (relative to origin) or absolute URL receiving the batch
  pub endpoint: String,
  pub policy: SyncPolicy,
  pub database: DatabaseConfig,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: "background-sync".to_string(),
      endpoint: "/api/sync-offline-data".to_string(),
      policy: SyncPolicy::default(),
      database: DatabaseConfig::default(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
  pub name: String,
  pub version: u32,
  pub collection: String,
  /// Database file (default: $XDG_DATA_HOME/fuelsw/<name>.sqlite)
  pub path: Option<PathBuf>,
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self {
      name: "FuelTrackerDB".to_string(),
      version: 1,
      collection: "offlineData".to_string(),
      path: None,
    }
  }
}

impl DatabaseConfig {
  pub fn db_path(&self) -> Result<PathBuf> {
    match self.path {
      Some(ref path) => Ok(path.clone()),
      None => OfflineStore::default_path(&self.name),
    }
  }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ActionConfig {
  pub action: String,
  pub title: String,
  pub icon: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  pub title: String,
  /// Body used when a push carries no payload
  pub fallback_body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub tag: String,
  /// Window opened by the open action
  pub open_url: String,
  pub open_action: ActionConfig,
  pub dismiss_action: ActionConfig,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "Шатахуун хянагч".to_string(),
      fallback_body: "Шатахууны хэрэглээг хянах апп".to_string(),
      icon: "/static/icons/icon-192x192.png".to_string(),
      badge: "/static/icons/badge-72x72.png".to_string(),
      vibrate: vec![100, 50, 100],
      tag: "fuel-tracker".to_string(),
      open_url: "/".to_string(),
      open_action: ActionConfig {
        action: "open".to_string(),
        title: "Нээх".to_string(),
        icon: "/static/icons/checkmark.png".to_string(),
      },
      dismiss_action: ActionConfig {
        action: "dismiss".to_string(),
        title: "Хаах".to_string(),
        icon: "/static/icons/xmark.png".to_string(),
      },
    }
  }
}

/// Time each kind of event may take before it is abandoned.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BudgetsConfig {
  pub install_secs: u64,
  pub activate_secs: u64,
  pub fetch_secs: u64,
  pub sync_secs: u64,
  pub push_secs: u64,
  pub click_secs: u64,
}

impl Default for BudgetsConfig {
  fn default() -> Self {
    Self {
      install_secs: 120,
      activate_secs: 30,
      fetch_secs: 60,
      sync_secs: 60,
      push_secs: 10,
      click_secs: 10,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./fuelsw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/fuelsw/config.yaml
  ///
  /// Without any file the built-in defaults apply. `FUELSW_ORIGIN` overrides
  /// the origin either way.
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
      None => Self::default(),
    };

    if let Ok(origin) = std::env::var(ORIGIN_ENV) {
      config.origin = origin;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("fuelsw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("fuelsw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    self.origin_url()?;
    if self.cache.name.trim().is_empty() {
      return Err(eyre!("cache.name must not be empty"));
    }
    crate::db::schema::validate_collection(&self.sync.database.collection)?;
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  pub fn sync_endpoint(&self) -> Result<Url> {
    self
      .origin_url()?
      .join(&self.sync.endpoint)
      .map_err(|e| eyre!("Invalid sync endpoint '{}': {}", self.sync.endpoint, e))
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_secs(self.request_timeout_secs)
  }
}
