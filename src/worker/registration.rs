//! Persistent record of which cache generation is active.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use super::{ActivateOutcome, EventOutcome, InstallOutcome, OfflineWorker, WorkerEvent, WorkerState};
use crate::cache::CacheStorage;
use crate::db::Database;

/// Result of bringing a registration up to date with a worker.
#[derive(Debug)]
pub enum UpdateOutcome {
  /// The worker's generation is already active and present in the store
  Current,
  /// Installed and activated
  Updated {
    install: InstallOutcome,
    activate: ActivateOutcome,
  },
}

/// Registration of the offline worker for one site scope.
///
/// Only a generation whose install succeeded is ever recorded as active.
pub struct Registration {
  conn: Mutex<Connection>,
  scope: String,
}

impl Registration {
  pub fn new(db: Database, scope: &Url) -> Self {
    Self {
      conn: Mutex::new(db.into_connection()),
      scope: scope.to_string(),
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// The generation currently serving requests, if any.
  pub fn active_generation(&self) -> Result<Option<String>> {
    let conn = self.lock()?;
    let active: Option<Option<String>> = conn
      .query_row(
        "SELECT active_generation FROM registration WHERE scope = ?",
        params![self.scope],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read registration: {}", e))?;

    Ok(active.flatten())
  }

  /// Lifecycle state of the newest worker.
  pub fn state(&self) -> Result<Option<String>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT state FROM registration WHERE scope = ?",
        params![self.scope],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read registration: {}", e))
  }

  fn record(&self, active: Option<&str>, state: WorkerState) -> Result<()> {
    self
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO registration (scope, active_generation, state, updated_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![self.scope, active, state.as_str()],
      )
      .map_err(|e| eyre!("Failed to update registration: {}", e))?;
    Ok(())
  }

  /// Install `worker` and, once installed, activate it immediately.
  ///
  /// A failed install leaves the previously active generation in place.
  /// Unless `force` is set, a worker whose generation is already active is
  /// left alone, as long as its cache is still in the store.
  pub async fn update<S: CacheStorage + ?Sized>(
    &self,
    worker: &OfflineWorker<S>,
    force: bool,
  ) -> Result<UpdateOutcome> {
    let previous = self.active_generation()?;
    if !force && previous.as_deref() == Some(worker.generation()) {
      if worker.has_cache() {
        return Ok(UpdateOutcome::Current);
      }
      warn!(generation = %worker.generation(), "active cache generation is gone, reinstalling");
    }

    let install = match worker.dispatch(WorkerEvent::Install).await {
      Ok(EventOutcome::Installed(install)) => install,
      result => {
        if let Err(record_err) = self.record(previous.as_deref(), WorkerState::Redundant) {
          warn!(error = %record_err, "failed to record redundant worker");
        }
        if let Some(previous) = &previous {
          info!(generation = %previous, "keeping previous cache generation");
        }
        return Err(match result {
          Err(e) => e,
          Ok(other) => eyre!("Unexpected install outcome: {:?}", other),
        });
      }
    };
    self.record(previous.as_deref(), WorkerState::Installed)?;

    let activate = match worker.dispatch(WorkerEvent::Activate).await? {
      EventOutcome::Activated(activate) => activate,
      other => return Err(eyre!("Unexpected activate outcome: {:?}", other)),
    };
    self.record(Some(worker.generation()), WorkerState::Activated)?;

    Ok(UpdateOutcome::Updated { install, activate })
  }
}

#[cfg(test)]
mod tests {
  use super::super::testing::*;
  use super::*;
  use crate::cache::{CacheName, MemoryStorage, ResponseSource};
  use crate::site::types::Request;
  use std::sync::Arc;

  fn registration() -> Registration {
    registration_for(SCOPE)
  }

  fn registration_for(scope: &str) -> Registration {
    Registration::new(Database::in_memory().unwrap(), &Url::parse(scope).unwrap())
  }

  #[tokio::test]
  async fn test_update_activates_new_generation() {
    let reg = registration();
    assert_eq!(reg.active_generation().unwrap(), None);

    let h = harness("myblog-v1.0", &["/"], FakeNetwork::serving(&["/"]));
    let outcome = reg.update(&h.worker, false).await.unwrap();

    assert!(matches!(outcome, UpdateOutcome::Updated { .. }));
    assert_eq!(
      reg.active_generation().unwrap().as_deref(),
      Some("myblog-v1.0")
    );
    assert_eq!(reg.state().unwrap().as_deref(), Some("activated"));
  }

  #[tokio::test]
  async fn test_update_is_noop_for_active_generation() {
    let reg = registration();
    let h = harness("myblog-v1.0", &["/"], FakeNetwork::serving(&["/"]));
    reg.update(&h.worker, false).await.unwrap();
    let calls = h.network.calls();

    let outcome = reg.update(&h.worker, false).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Current));
    assert_eq!(h.network.calls(), calls);
  }

  #[tokio::test]
  async fn test_failed_update_keeps_previous_generation() {
    let reg = registration();
    let storage = Arc::new(MemoryStorage::new());

    let v1 = harness_with_storage("v1", &["/"], FakeNetwork::serving(&["/"]), storage.clone());
    reg.update(&v1.worker, false).await.unwrap();

    let v2 = harness_with_storage(
      "v2",
      &["/", "/offline/"],
      FakeNetwork::serving(&["/"]),
      storage.clone(),
    );
    assert!(reg.update(&v2.worker, false).await.is_err());

    assert_eq!(reg.active_generation().unwrap().as_deref(), Some("v1"));
    assert_eq!(reg.state().unwrap().as_deref(), Some("redundant"));
    assert_eq!(storage.generations(SCOPE).unwrap(), vec!["v1"]);
  }

  #[tokio::test]
  async fn test_update_reinstalls_missing_generation() {
    let reg = registration();
    let h = harness("v1", &["/"], FakeNetwork::serving(&["/"]));
    reg.update(&h.worker, false).await.unwrap();

    h.storage
      .delete_generation(&CacheName::new(SCOPE, "v1"))
      .unwrap();

    let outcome = reg.update(&h.worker, false).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Updated { .. }));
    assert!(h.worker.has_cache());
  }

  #[tokio::test]
  async fn test_sites_sharing_a_store_keep_their_caches() {
    let storage = Arc::new(MemoryStorage::new());
    let network = Arc::new(FakeNetwork::serving(&["/", "/offline/"]));
    let site_a = registration_for("http://a.local/");
    let site_b = registration_for("http://b.local/");

    let a = site_worker("http://a.local/", "a-v1", network.clone(), storage.clone());
    site_a.update(&a, false).await.unwrap();

    let b = site_worker("http://b.local/", "b-v1", network.clone(), storage.clone());
    site_b.update(&b, false).await.unwrap();
    assert_eq!(storage.generations("http://a.local/").unwrap(), vec!["a-v1"]);

    let a = site_worker("http://a.local/", "a-v1", network.clone(), storage.clone());
    let outcome = site_a.update(&a, false).await.unwrap();
    assert!(matches!(outcome, UpdateOutcome::Current));

    network.go_offline();
    let home = Request::get(Url::parse("http://a.local/").unwrap())
      .with_header("Accept", "text/html");
    let served = a.handle_fetch(home).unwrap().await.unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
  }
}
