//! Window clients controlled by the worker.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::Mutex;
use url::Url;

/// An open window (tab) of the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
  pub id: String,
  pub url: String,
  pub focused: bool,
  /// Whether the worker controls this window's requests
  pub controlled: bool,
}

/// Host-side access to open windows.
#[async_trait]
pub trait Clients: Send + Sync {
  /// All open window clients.
  async fn match_all_windows(&self) -> Result<Vec<WindowClient>>;

  /// Bring a window to the front.
  async fn focus(&self, id: &str) -> Result<()>;

  /// Open a new window at `url`, returning its id.
  async fn open_window(&self, url: &Url) -> Result<String>;

  /// Take control of every open window. Returns how many were claimed.
  async fn claim(&self) -> Result<usize>;
}

/// In-process window list.
#[derive(Debug, Default)]
pub struct WindowRegistry {
  windows: Mutex<Vec<WindowClient>>,
  next_id: Mutex<u64>,
}

impl WindowRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Registry with one uncontrolled window per url.
  pub fn with_windows<I, U>(urls: I) -> Self
  where
    I: IntoIterator<Item = U>,
    U: Into<String>,
  {
    let registry = Self::new();
    if let (Ok(mut windows), Ok(mut next_id)) = (registry.windows.lock(), registry.next_id.lock())
    {
      for url in urls {
        *next_id += 1;
        windows.push(WindowClient {
          id: format!("window-{}", next_id),
          url: url.into(),
          focused: false,
          controlled: false,
        });
      }
    }
    registry
  }

  /// Snapshot of the current windows.
  pub fn windows(&self) -> Vec<WindowClient> {
    self
      .windows
      .lock()
      .map(|w| w.clone())
      .unwrap_or_default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<WindowClient>>> {
    self
      .windows
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

#[async_trait]
impl Clients for WindowRegistry {
  async fn match_all_windows(&self) -> Result<Vec<WindowClient>> {
    Ok(self.lock()?.clone())
  }

  async fn focus(&self, id: &str) -> Result<()> {
    let mut windows = self.lock()?;
    if !windows.iter().any(|w| w.id == id) {
      return Err(eyre!("No window with id {}", id));
    }
    for window in windows.iter_mut() {
      window.focused = window.id == id;
    }
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<String> {
    let id = {
      let mut next_id = self
        .next_id
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;
      *next_id += 1;
      format!("window-{}", next_id)
    };

    let mut windows = self.lock()?;
    for window in windows.iter_mut() {
      window.focused = false;
    }
    windows.push(WindowClient {
      id: id.clone(),
      url: url.to_string(),
      focused: true,
      controlled: true,
    });
    Ok(id)
  }

  async fn claim(&self) -> Result<usize> {
    let mut windows = self.lock()?;
    let mut claimed = 0;
    for window in windows.iter_mut().filter(|w| !w.controlled) {
      window.controlled = true;
      claimed += 1;
    }
    Ok(claimed)
  }
}
