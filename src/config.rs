use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub push: PushConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the story API, including the version segment.
  #[serde(default = "default_base_url")]
  pub base_url: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
    }
  }
}

fn default_base_url() -> String {
  "https://story-api.dicoding.dev/v1".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
  /// Public application server key (VAPID) used when creating a platform
  /// push subscription. Published by the API provider, safe to embed.
  #[serde(default = "default_application_server_key")]
  pub application_server_key: String,
}

impl Default for PushConfig {
  fn default() -> Self {
    Self {
      application_server_key: default_application_server_key(),
    }
  }
}

fn default_application_server_key() -> String {
  "BCCs2eonMI-6H2ctvFaWg-UYdDv387Vno_bzUzALpB442r2lCnsHmtrx8biyPi_E-1fSGABK_Qs_GlvPoJJqxbk"
    .to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Paths (relative to the API origin) seeded into the cache on install.
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      precache: default_precache(),
    }
  }
}

fn default_precache() -> Vec<String> {
  vec!["/".to_string()]
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storyfeed.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storyfeed/config.yaml
  ///
  /// Every field has a working default, so a missing config file is not an
  /// error.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("storyfeed.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storyfeed").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Data directory for the store, cache and session files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("storyfeed"))
  }
}
