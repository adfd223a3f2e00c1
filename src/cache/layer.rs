//! Cache layer bound to a single cache generation.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::storage::CacheStorage;
use super::{CacheName, CachedResponse};
use crate::site::client::Network;
use crate::site::types::{Request, RequestKey, Response};

/// Cache layer over one generation of the store.
///
/// Lookups and writes never fail the caller: store errors are logged and
/// treated as a miss or a skipped write. Only precaching reports errors,
/// because an incomplete precache must not become the active generation.
pub struct CacheLayer<S: CacheStorage + ?Sized> {
  storage: Arc<S>,
  name: CacheName,
}

impl<S: CacheStorage + ?Sized> CacheLayer<S> {
  /// Create a cache layer for `name` on the given storage backend.
  pub fn new(storage: Arc<S>, name: CacheName) -> Self {
    Self { storage, name }
  }

  pub fn generation(&self) -> &str {
    &self.name.generation
  }

  /// Whether this generation is present in the store.
  pub fn exists(&self) -> bool {
    match self.storage.generations(&self.name.scope) {
      Ok(names) => names.iter().any(|n| *n == self.name.generation),
      Err(e) => {
        warn!(cache = %self.name, error = %e, "failed to list caches");
        false
      }
    }
  }

  /// Look up a request in this generation.
  pub fn lookup(&self, key: &RequestKey) -> Option<CachedResponse> {
    match self.storage.match_request(&self.name, key) {
      Ok(hit) => hit,
      Err(e) => {
        warn!(cache = %self.name, %key, error = %e, "cache lookup failed, treating as miss");
        None
      }
    }
  }

  /// Store a response; failures are logged and swallowed.
  pub fn store(&self, key: &RequestKey, response: &Response) {
    match self.storage.put(&self.name, key, response) {
      Ok(()) => debug!(cache = %self.name, %key, "cached response"),
      Err(e) => warn!(cache = %self.name, %key, error = %e, "failed to cache response"),
    }
  }

  /// Drop one entry so the next request goes to the network.
  pub fn evict(&self, key: &RequestKey) -> Result<bool> {
    let removed = self.storage.delete(&self.name, key)?;
    debug!(cache = %self.name, %key, removed, "evicted entry");
    Ok(removed)
  }

  /// Fetch every request and store all of them, or store nothing.
  ///
  /// Fails if any request errors or answers with a non-2xx status. The
  /// generation only comes into existence together with its entries.
  pub async fn precache<N: Network + ?Sized>(
    &self,
    network: &N,
    requests: &[Request],
  ) -> Result<usize> {
    let responses = try_join_all(requests.iter().map(|request| async move {
      let response = network.fetch(request).await?;
      if !response.is_ok() {
        return Err(eyre!(
          "Precache request for {} returned status {}",
          request.url,
          response.status
        ));
      }
      Ok::<_, color_eyre::Report>((request.key(), response))
    }))
    .await?;

    self.storage.put_all(&self.name, &responses)?;
    info!(cache = %self.name, count = responses.len(), "all resources cached");

    Ok(responses.len())
  }

  /// Delete every other generation of this scope. Returns the deleted names.
  pub fn prune_except_current(&self) -> Result<Vec<String>> {
    let mut deleted = Vec::new();
    for generation in self.storage.generations(&self.name.scope)? {
      if generation != self.name.generation {
        let old = CacheName::new(self.name.scope.clone(), generation);
        info!(cache = %old, "deleting old cache");
        if self.storage.delete_generation(&old)? {
          deleted.push(old.generation);
        }
      }
    }
    Ok(deleted)
  }
}

impl<S: CacheStorage + ?Sized> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      name: self.name.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{MemoryStorage, SqliteStorage};
  use crate::db::Database;
  use async_trait::async_trait;
  use url::Url;

  const SCOPE: &str = "http://blog.local/";

  struct StaticSite {
    missing: &'static str,
  }

  #[async_trait]
  impl Network for StaticSite {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      if request.url.path() == self.missing {
        Ok(Response::basic(request.url.as_str(), 404, "not found"))
      } else {
        Ok(Response::basic(request.url.as_str(), 200, request.url.path().to_string()))
      }
    }
  }

  fn requests(paths: &[&str]) -> Vec<Request> {
    let base = Url::parse(SCOPE).unwrap();
    paths
      .iter()
      .map(|p| Request::get(base.join(p).unwrap()))
      .collect()
  }

  fn layer<S: CacheStorage + ?Sized>(storage: Arc<S>, generation: &str) -> CacheLayer<S> {
    CacheLayer::new(storage, CacheName::new(SCOPE, generation))
  }

  #[tokio::test]
  async fn test_precache_stores_all() {
    let layer = layer(Arc::new(MemoryStorage::new()), "v1");
    let reqs = requests(&["/", "/offline/"]);

    let count = layer
      .precache(&StaticSite { missing: "" }, &reqs)
      .await
      .unwrap();
    assert_eq!(count, 2);
    assert!(layer.exists());
    assert!(layer.lookup(&reqs[0].key()).is_some());
    assert!(layer.lookup(&reqs[1].key()).is_some());
  }

  #[tokio::test]
  async fn test_precache_is_all_or_nothing() {
    let storage = Arc::new(SqliteStorage::new(Database::in_memory().unwrap()));
    let layer = layer(storage.clone(), "v1");
    let reqs = requests(&["/", "/static/js/index.js"]);

    let result = layer
      .precache(&StaticSite { missing: "/static/js/index.js" }, &reqs)
      .await;
    assert!(result.is_err());
    assert!(layer.lookup(&reqs[0].key()).is_none());
    assert!(!layer.exists());
    assert!(storage.generations(SCOPE).unwrap().is_empty());
  }

  #[test]
  fn test_prune_keeps_current() {
    let storage = Arc::new(MemoryStorage::new());
    for generation in ["v0", "other", "v1"] {
      storage
        .put_all(&CacheName::new(SCOPE, generation), &[])
        .unwrap();
    }

    let layer = layer(storage.clone(), "v1");
    let mut deleted = layer.prune_except_current().unwrap();
    deleted.sort();

    assert_eq!(deleted, vec!["other", "v0"]);
    assert_eq!(storage.generations(SCOPE).unwrap(), vec!["v1"]);
  }

  #[test]
  fn test_prune_leaves_other_scopes_alone() {
    let storage = Arc::new(SqliteStorage::new(Database::in_memory().unwrap()));
    let neighbour = CacheName::new("http://other.local/", "a-v1");
    storage.put_all(&neighbour, &[]).unwrap();
    storage.put_all(&CacheName::new(SCOPE, "v0"), &[]).unwrap();

    let layer = layer(storage.clone(), "v1");
    assert_eq!(layer.prune_except_current().unwrap(), vec!["v0"]);
    assert_eq!(storage.generations("http://other.local/").unwrap(), vec!["a-v1"]);
  }

  #[test]
  fn test_evict_removes_one_entry() {
    let layer = layer(Arc::new(MemoryStorage::new()), "v1");
    let reqs = requests(&["/", "/about/"]);
    for req in &reqs {
      layer.store(&req.key(), &Response::basic(req.url.as_str(), 200, "page"));
    }

    assert!(layer.evict(&reqs[0].key()).unwrap());
    assert!(!layer.evict(&reqs[0].key()).unwrap());
    assert!(layer.lookup(&reqs[0].key()).is_none());
    assert!(layer.lookup(&reqs[1].key()).is_some());
  }
}
