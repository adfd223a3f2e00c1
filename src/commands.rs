//! Wiring shared by every subcommand, and the non-interactive commands.

use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheStorage, MemoryStorage, ResponseSource, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::likes::{LikeButton, LocalStorage, MemoryLocalStorage, SqliteLocalStorage};
use crate::search;
use crate::site::{BlogClient, Network, SiteClient};
use crate::worker::{
  ClickOutcome, Clients, EventOutcome, NotificationSink, OfflineWorker, Registration,
  TerminalSink, UpdateOutcome, WindowRegistry, WorkerConfig, WorkerEvent,
};

/// Worker over whichever cache store the run uses.
pub type Worker = OfflineWorker<dyn CacheStorage>;

/// Stores and clients opened once per run.
pub struct Services {
  pub config: Config,
  pub storage: Arc<dyn CacheStorage>,
  pub local: Arc<dyn LocalStorage>,
  pub registration: Registration,
  pub network: Arc<dyn Network>,
}

impl Services {
  /// Open the stores. `ephemeral` keeps everything in memory.
  pub fn open(config: Config, ephemeral: bool) -> Result<Self> {
    let origin = config.site_url()?;
    let network: Arc<dyn Network> = Arc::new(SiteClient::new(origin.clone())?);

    let (storage, local, registration) = if ephemeral {
      let storage: Arc<dyn CacheStorage> = Arc::new(MemoryStorage::new());
      let local: Arc<dyn LocalStorage> = Arc::new(MemoryLocalStorage::new());
      (storage, local, Registration::new(Database::in_memory()?, &origin))
    } else {
      let path = config.storage.path.as_deref();
      let storage: Arc<dyn CacheStorage> = Arc::new(SqliteStorage::new(Database::open(path)?));
      let local: Arc<dyn LocalStorage> = Arc::new(SqliteLocalStorage::new(Database::open(path)?));
      (storage, local, Registration::new(Database::open(path)?, &origin))
    };

    Ok(Self {
      config,
      storage,
      local,
      registration,
      network,
    })
  }

  fn worker(
    &self,
    config: Arc<WorkerConfig>,
    clients: Arc<dyn Clients>,
    notifications: Arc<dyn NotificationSink>,
  ) -> Arc<Worker> {
    Arc::new(OfflineWorker::new(
      config,
      Arc::clone(&self.storage),
      Arc::clone(&self.network),
      clients,
      notifications,
    ))
  }

  /// Register the configured worker and return the one in charge.
  ///
  /// When the configured generation fails to install, the previously active
  /// generation keeps serving. `None` means no generation was ever
  /// installed, so requests go straight to the network.
  pub async fn start(
    &self,
    clients: Arc<dyn Clients>,
    notifications: Arc<dyn NotificationSink>,
    force: bool,
  ) -> Result<Option<Arc<Worker>>> {
    let config = Arc::new(WorkerConfig::from_config(&self.config)?);
    let worker = self.worker(Arc::clone(&config), Arc::clone(&clients), Arc::clone(&notifications));

    match self.registration.update(&*worker, force).await {
      Ok(UpdateOutcome::Current) => {
        info!(generation = %worker.generation(), "cache generation is current");
        Ok(Some(worker))
      }
      Ok(UpdateOutcome::Updated { install, activate }) => {
        info!(
          generation = %worker.generation(),
          state = worker.state().as_str(),
          precached = install.precached,
          skip_waiting = install.skip_waiting,
          deleted = activate.deleted.len(),
          "cache generation updated"
        );
        Ok(Some(worker))
      }
      Err(e) => {
        warn!(error = %e, "worker update failed");
        self.previous_worker(&config, clients, notifications)
      }
    }
  }

  fn previous_worker(
    &self,
    config: &WorkerConfig,
    clients: Arc<dyn Clients>,
    notifications: Arc<dyn NotificationSink>,
  ) -> Result<Option<Arc<Worker>>> {
    Ok(self.registration.active_generation()?.map(|generation| {
      info!(%generation, "serving previous cache generation");
      self.worker(
        Arc::new(config.with_generation(generation)),
        clients,
        notifications,
      )
    }))
  }

  pub fn blog_client(&self, worker: Option<Arc<Worker>>) -> Result<BlogClient<dyn CacheStorage>> {
    Ok(BlogClient::new(
      Arc::clone(&self.network),
      worker,
      self.config.site_url()?,
      self.config.site.posts_feed.clone(),
    ))
  }

  async fn headless_client(&self) -> Result<BlogClient<dyn CacheStorage>> {
    let worker = self
      .start(Arc::new(WindowRegistry::new()), Arc::new(TerminalSink), false)
      .await?;
    self.blog_client(worker)
  }
}

/// `myblog install`: install and activate the configured generation.
pub async fn install(services: &Services) -> Result<()> {
  let config = Arc::new(WorkerConfig::from_config(&services.config)?);
  let worker = services.worker(
    config,
    Arc::new(WindowRegistry::new()),
    Arc::new(TerminalSink),
  );

  match services.registration.update(&*worker, true).await? {
    UpdateOutcome::Updated { install, activate } => {
      println!(
        "Installed {} ({} resources cached)",
        worker.generation(),
        install.precached
      );
      for old in &activate.deleted {
        println!("Deleted old cache {}", old);
      }
    }
    UpdateOutcome::Current => println!("{} is already active", worker.generation()),
  }

  if let Some(state) = services.registration.state()? {
    println!("Worker state: {}", state);
  }

  Ok(())
}

/// `myblog evict`: drop one path from the active generation.
pub async fn evict(services: &Services, path: &str) -> Result<()> {
  let worker = services
    .start(Arc::new(WindowRegistry::new()), Arc::new(TerminalSink), false)
    .await?
    .ok_or_else(|| eyre!("No cache generation installed; run `myblog install` first"))?;

  if worker.evict(path)? {
    println!("Evicted {} from {}", path, worker.generation());
  } else {
    println!("{} is not cached in {}", path, worker.generation());
  }

  Ok(())
}

/// `myblog fetch`: route one GET through the worker.
pub async fn fetch(services: &Services, path: &str, html: bool) -> Result<()> {
  let client = services.headless_client().await?;

  let outcome = if html {
    client.get_page(path).await?
  } else {
    client.fetch(crate::site::types::Request::get(client.resolve(path)?)).await?
  };

  match outcome.response {
    Some(response) => {
      println!(
        "{} {} [{}]",
        response.status,
        response.status_text,
        outcome.source.label()
      );
      println!();
      println!("{}", response.text());
    }
    None => println!("No response [{}]", outcome.source.label()),
  }

  Ok(())
}

/// `myblog push`: deliver a push message, optionally clicking it.
pub async fn push(services: &Services, payload: &str, click: bool, windows: &[String]) -> Result<()> {
  let registry = Arc::new(WindowRegistry::with_windows(windows.iter().cloned()));
  let worker = services
    .start(registry.clone(), Arc::new(TerminalSink), false)
    .await?
    .ok_or_else(|| eyre!("No cache generation installed; run `myblog install` first"))?;

  let payload = Bytes::copy_from_slice(payload.as_bytes());
  let notification = match worker.dispatch(WorkerEvent::Push(Some(payload))).await? {
    EventOutcome::Notified(Some(notification)) => notification,
    _ => {
      println!("Push message ignored");
      return Ok(());
    }
  };

  if click {
    match worker
      .dispatch(WorkerEvent::NotificationClick(notification))
      .await?
    {
      EventOutcome::Clicked(ClickOutcome::Focused(id)) => println!("Focused {}", id),
      EventOutcome::Clicked(ClickOutcome::Opened(id)) => println!("Opened {}", id),
      other => return Err(eyre!("Unexpected click outcome: {:?}", other)),
    }
    for window in registry.windows() {
      let marker = if window.focused { "*" } else { " " };
      println!("{} {} {}", marker, window.id, window.url);
    }
  }

  Ok(())
}

/// `myblog like`: toggle the like flag of a post.
pub fn like(services: &Services, post_id: &str) -> Result<()> {
  let mut button = LikeButton::init(Some(post_id), services.local.as_ref())?;
  button.click(services.local.as_ref())?;
  println!(
    "{} post {} {}",
    button.icon(),
    post_id,
    if button.is_liked() { "liked" } else { "unliked" }
  );
  Ok(())
}

/// `myblog search`: print the posts that match a query.
pub async fn search(services: &Services, query: &str) -> Result<()> {
  let client = services.headless_client().await?;
  let (cards, source) = client.get_posts().await?;

  let mut visible = vec![true; cards.len()];
  search::apply_filter(&cards, &mut visible, query);

  let matches = search::visible_indices(&visible);
  for idx in &matches {
    let card = &cards[*idx];
    let liked = LikeButton::init(Some(&card.id), services.local.as_ref())?;
    println!(
      "{} {:>6}  {}",
      liked.icon(),
      card.id,
      card.title.as_deref().unwrap_or("(untitled)")
    );
  }

  if source != ResponseSource::Network {
    println!("({} of {} posts, from {})", matches.len(), cards.len(), source.label());
  }

  Ok(())
}
