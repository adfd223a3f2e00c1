use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub site: SiteConfig,
  pub cache: CacheConfig,
  pub notifications: NotificationConfig,
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
  /// Origin of the blog, e.g. "https://blog.example.com"
  pub url: String,
  /// Path of the JSON posts feed
  pub posts_feed: String,
}

impl Default for SiteConfig {
  fn default() -> Self {
    Self {
      url: "http://127.0.0.1:8000".to_string(),
      posts_feed: "/api/posts/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Cache generation name; bump it whenever the precached assets change
  pub generation: String,
  /// Paths fetched and stored at install time
  pub precache: Vec<String>,
  /// Page served to HTML requests when cache and network both fail
  pub offline_page: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      generation: "myblog-v1.0".to_string(),
      precache: vec![
        "/".to_string(),
        "/static/css/style.css".to_string(),
        "/static/js/index.js".to_string(),
        "/static/images/favicon.ico".to_string(),
        "/offline/".to_string(),
      ],
      offline_page: "/offline/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  /// Title used when a push message has none
  pub title: String,
  /// Body used when a push message has none
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Vibration pattern in milliseconds
  pub vibrate: Vec<u32>,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      title: "myblog".to_string(),
      body: "A new post has been published on the blog!".to_string(),
      icon: "/static/images/favicon.ico".to_string(),
      badge: "/static/images/favicon.ico".to_string(),
      vibrate: vec![200, 100, 200],
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Database file (defaults to $XDG_DATA_HOME/myblog/myblog.db)
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./myblog.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/myblog/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  /// MYBLOG_SITE_URL overrides `site.url`.
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

    if let Ok(url) = std::env::var("MYBLOG_SITE_URL") {
      config.site.url = url;
    }

    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("myblog.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("myblog").join("config.yaml");
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

  fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Check invariants the worker relies on.
  pub fn validate(&self) -> Result<()> {
    self.site_url()?;

    if self.cache.generation.trim().is_empty() {
      return Err(eyre!("cache.generation must not be empty"));
    }
    if !self.cache.offline_page.starts_with('/') {
      return Err(eyre!(
        "cache.offline_page must be an absolute path, got {}",
        self.cache.offline_page
      ));
    }
    if let Some(bad) = self.cache.precache.iter().find(|p| !p.starts_with('/')) {
      return Err(eyre!("cache.precache entries must start with '/', got {}", bad));
    }

    Ok(())
  }

  /// Parsed site origin.
  pub fn site_url(&self) -> Result<Url> {
    Url::parse(&self.site.url).map_err(|e| eyre!("Invalid site.url {}: {}", self.site.url, e))
  }
}
