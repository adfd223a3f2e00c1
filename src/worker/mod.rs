//! Offline worker: request interception, cache lifecycle and notifications.
//!
//! Every handler returns a [`WaitUntil`] future. The host must drive it to
//! completion before it considers the event handled; dropping it early
//! abandons the network and cache work the event started.

mod clients;
mod fetch;
mod notifications;
mod registration;

pub use clients::{Clients, WindowRegistry};
pub use fetch::FetchOutcome;
pub use notifications::{
  Notification, NotificationSink, NotificationTray, PushPayload, TerminalSink,
};
pub use registration::{Registration, UpdateOutcome};

use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{CacheLayer, CacheName, CacheStorage};
use crate::config::{Config, NotificationConfig};
use crate::site::client::Network;
use crate::site::types::{Request, RequestKey};

/// Sync tag the host registers when connectivity comes back.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Future that keeps an event alive until its async work completes.
pub type WaitUntil<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Worker settings, fixed for the lifetime of a worker instance.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  /// Name of the cache generation this worker owns
  pub generation: String,
  /// Site origin that relative paths resolve against
  pub origin: Url,
  /// Paths precached at install time
  pub precache: Vec<String>,
  /// Path of the offline fallback document
  pub offline_page: String,
  pub notifications: NotificationConfig,
}

impl WorkerConfig {
  pub fn from_config(config: &Config) -> Result<Self> {
    Ok(Self {
      generation: config.cache.generation.clone(),
      origin: config.site_url()?,
      precache: config.cache.precache.clone(),
      offline_page: config.cache.offline_page.clone(),
      notifications: config.notifications.clone(),
    })
  }

  /// Same settings bound to another generation name.
  pub fn with_generation(&self, generation: impl Into<String>) -> Self {
    Self {
      generation: generation.into(),
      ..self.clone()
    }
  }

  /// Scope that owns this site's registration and cache generations.
  pub fn scope(&self) -> &str {
    self.origin.as_str()
  }

  /// Resolve a site path to an absolute URL.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path {}: {}", path, e))
  }

  fn precache_requests(&self) -> Result<Vec<Request>> {
    self
      .precache
      .iter()
      .map(|path| self.resolve(path).map(Request::get))
      .collect()
  }

  fn offline_key(&self) -> Result<RequestKey> {
    self.resolve(&self.offline_page).map(RequestKey::get)
  }
}

/// Lifecycle state of a worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install failed or the worker was replaced
  Redundant,
}

impl WorkerState {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    }
  }
}

/// Events delivered to the worker by its host.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  /// Push message with its raw payload, if any
  Push(Option<Bytes>),
  NotificationClick(Notification),
  /// Background sync request with its tag
  Sync(String),
  /// Connectivity changed: `true` when back online
  Connectivity(bool),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
  /// Number of manifest entries stored
  pub precached: usize,
  /// Activate right away instead of waiting for old clients to close
  pub skip_waiting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivateOutcome {
  /// Generations removed from the store
  pub deleted: Vec<String>,
  /// Windows taken under control
  pub claimed: usize,
}

/// What a notification click did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// An existing window showing the target was focused
  Focused(String),
  /// A new window was opened at the target
  Opened(String),
}

/// Result of a dispatched event.
#[derive(Debug)]
pub enum EventOutcome {
  Installed(InstallOutcome),
  Activated(ActivateOutcome),
  Responded(FetchOutcome),
  /// The request was not intercepted; the host sends it itself
  NotIntercepted(Request),
  Notified(Option<Notification>),
  Clicked(ClickOutcome),
  Done,
}

/// The offline worker for one cache generation.
pub struct OfflineWorker<S: CacheStorage + ?Sized> {
  config: Arc<WorkerConfig>,
  cache: CacheLayer<S>,
  network: Arc<dyn Network>,
  clients: Arc<dyn Clients>,
  notifications: Arc<dyn NotificationSink>,
  state: Mutex<WorkerState>,
}

impl<S: CacheStorage + ?Sized> OfflineWorker<S> {
  pub fn new(
    config: Arc<WorkerConfig>,
    storage: Arc<S>,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    notifications: Arc<dyn NotificationSink>,
  ) -> Self {
    let cache = CacheLayer::new(
      storage,
      CacheName::new(config.scope(), config.generation.clone()),
    );
    Self {
      config,
      cache,
      network,
      clients,
      notifications,
      state: Mutex::new(WorkerState::Parsed),
    }
  }

  pub fn generation(&self) -> &str {
    self.cache.generation()
  }

  /// Whether this worker's generation is still in the store.
  pub fn has_cache(&self) -> bool {
    self.cache.exists()
  }

  /// Remove the cached response for a site path. Returns whether one existed.
  pub fn evict(&self, path: &str) -> Result<bool> {
    let key = RequestKey::get(self.config.resolve(path)?);
    self.cache.evict(&key)
  }

  pub fn state(&self) -> WorkerState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(WorkerState::Redundant)
  }

  fn set_state(&self, state: WorkerState) {
    if let Ok(mut current) = self.state.lock() {
      *current = state;
    }
  }

  /// Precache the manifest into this worker's generation.
  ///
  /// On failure nothing is stored, the worker becomes redundant and the
  /// error is returned so the previous generation stays in charge.
  pub async fn install(&self) -> Result<InstallOutcome> {
    self.set_state(WorkerState::Installing);
    info!(generation = %self.generation(), "worker installing");

    let result = match self.config.precache_requests() {
      Ok(requests) => self.cache.precache(self.network.as_ref(), &requests).await,
      Err(e) => Err(e),
    };

    match result {
      Ok(precached) => {
        self.set_state(WorkerState::Installed);
        Ok(InstallOutcome {
          precached,
          skip_waiting: true,
        })
      }
      Err(e) => {
        self.set_state(WorkerState::Redundant);
        error!(generation = %self.generation(), error = %e, "cache installation failed");
        Err(e.wrap_err(format!(
          "Failed to install cache generation {}",
          self.generation()
        )))
      }
    }
  }

  /// Delete every other generation, then claim all open windows.
  pub async fn activate(&self) -> Result<ActivateOutcome> {
    self.set_state(WorkerState::Activating);
    info!(generation = %self.generation(), "worker activating");

    let deleted = self.cache.prune_except_current()?;
    let claimed = self.clients.claim().await?;

    self.set_state(WorkerState::Activated);
    info!(generation = %self.generation(), deleted = deleted.len(), claimed, "worker activated");

    Ok(ActivateOutcome { deleted, claimed })
  }

  /// Display a notification for a push message.
  ///
  /// Messages without a payload are ignored. A payload that is not valid
  /// JSON is logged and dropped.
  pub fn handle_push(&self, payload: Option<Bytes>) -> WaitUntil<'_, Option<Notification>> {
    Box::pin(async move {
      let Some(data) = payload else {
        return Ok(None);
      };

      let payload: PushPayload = match serde_json::from_slice(&data) {
        Ok(payload) => payload,
        Err(e) => {
          warn!(error = %e, "ignoring malformed push payload");
          return Ok(None);
        }
      };

      let notification = Notification::from_payload(payload, &self.config.notifications);
      self.notifications.show(&notification)?;
      Ok(Some(notification))
    })
  }

  /// Close the notification, then focus a window already showing its
  /// target or open a new one.
  pub fn handle_notification_click(
    &self,
    notification: Notification,
  ) -> WaitUntil<'_, ClickOutcome> {
    Box::pin(async move {
      self.notifications.close(&notification)?;

      let target = self.config.resolve(&notification.data.url)?;
      let windows = self.clients.match_all_windows().await?;

      let existing = windows
        .iter()
        .find(|w| Url::parse(&w.url).map(|u| u == target).unwrap_or(false));

      if let Some(window) = existing {
        self.clients.focus(&window.id).await?;
        info!(window = %window.id, url = %target, "focused existing window");
        return Ok(ClickOutcome::Focused(window.id.clone()));
      }

      let id = self.clients.open_window(&target).await?;
      info!(window = %id, url = %target, "opened window");
      Ok(ClickOutcome::Opened(id))
    })
  }

  /// Route any worker event to its handler.
  pub fn dispatch(&self, event: WorkerEvent) -> WaitUntil<'_, EventOutcome> {
    Box::pin(async move {
      match event {
        WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
        WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
        WorkerEvent::Fetch(request) => match self.handle_fetch(request.clone()) {
          Some(response) => response.await.map(EventOutcome::Responded),
          None => Ok(EventOutcome::NotIntercepted(request)),
        },
        WorkerEvent::Push(payload) => self.handle_push(payload).await.map(EventOutcome::Notified),
        WorkerEvent::NotificationClick(notification) => self
          .handle_notification_click(notification)
          .await
          .map(EventOutcome::Clicked),
        WorkerEvent::Sync(tag) => {
          if tag == BACKGROUND_SYNC_TAG {
            info!("background sync started");
          } else {
            debug!(%tag, "ignoring sync event");
          }
          Ok(EventOutcome::Done)
        }
        WorkerEvent::Connectivity(online) => {
          if online {
            info!("application is online");
          } else {
            warn!("application is offline");
          }
          Ok(EventOutcome::Done)
        }
      }
    })
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! Fakes shared by the worker tests.

  use super::*;
  use crate::cache::MemoryStorage;
  use crate::site::types::Response;
  use async_trait::async_trait;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};

  /// Network serving a fixed set of paths, or failing every request.
  #[derive(Default)]
  pub struct FakeNetwork {
    pub pages: Mutex<HashMap<String, Response>>,
    pub offline: std::sync::atomic::AtomicBool,
    pub calls: AtomicUsize,
  }

  impl FakeNetwork {
    pub fn serving(paths: &[&str]) -> Self {
      let network = Self::default();
      for path in paths {
        network.serve(
          path,
          Response::basic(&format!("http://blog.local{}", path), 200, format!("content of {}", path)),
        );
      }
      network
    }

    pub fn serve(&self, path: &str, response: Response) {
      self
        .pages
        .lock()
        .unwrap()
        .insert(path.to_string(), response);
    }

    pub fn go_offline(&self) {
      self.offline.store(true, Ordering::SeqCst);
    }

    pub fn go_online(&self) {
      self.offline.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("connection refused"));
      }
      let pages = self.pages.lock().unwrap();
      Ok(
        pages
          .get(request.url.path())
          .cloned()
          .unwrap_or_else(|| Response::basic(request.url.as_str(), 404, "not found")),
      )
    }
  }

  /// Scope of the site every fake serves.
  pub const SCOPE: &str = "http://blog.local/";

  /// Create an empty generation in the fake site's scope.
  pub fn open_generation(storage: &MemoryStorage, generation: &str) {
    storage
      .put_all(&CacheName::new(SCOPE, generation), &[])
      .unwrap();
  }

  pub fn worker_config(generation: &str, precache: &[&str]) -> Arc<WorkerConfig> {
    Arc::new(WorkerConfig {
      generation: generation.to_string(),
      origin: Url::parse(SCOPE).unwrap(),
      precache: precache.iter().map(|p| p.to_string()).collect(),
      offline_page: "/offline/".to_string(),
      notifications: NotificationConfig::default(),
    })
  }

  /// Worker for another site origin, precaching its home and offline pages.
  pub fn site_worker(
    origin: &str,
    generation: &str,
    network: Arc<FakeNetwork>,
    storage: Arc<MemoryStorage>,
  ) -> OfflineWorker<MemoryStorage> {
    let config = WorkerConfig {
      origin: Url::parse(origin).unwrap(),
      ..(*worker_config(generation, &["/", "/offline/"])).clone()
    };
    OfflineWorker::new(
      Arc::new(config),
      storage,
      network,
      Arc::new(WindowRegistry::new()),
      Arc::new(NotificationTray::new()),
    )
  }

  pub struct Harness {
    pub worker: OfflineWorker<MemoryStorage>,
    pub storage: Arc<MemoryStorage>,
    pub network: Arc<FakeNetwork>,
    pub windows: Arc<WindowRegistry>,
    pub tray: Arc<NotificationTray>,
  }

  pub fn harness(generation: &str, precache: &[&str], network: FakeNetwork) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    harness_with_storage(generation, precache, network, storage)
  }

  pub fn harness_with_storage(
    generation: &str,
    precache: &[&str],
    network: FakeNetwork,
    storage: Arc<MemoryStorage>,
  ) -> Harness {
    let network = Arc::new(network);
    let windows = Arc::new(WindowRegistry::new());
    let tray = Arc::new(NotificationTray::new());
    let worker = OfflineWorker::new(
      worker_config(generation, precache),
      storage.clone(),
      network.clone(),
      windows.clone(),
      tray.clone(),
    );
    Harness {
      worker,
      storage,
      network,
      windows,
      tray,
    }
  }
}
