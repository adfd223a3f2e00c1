//! Request interception: cache first, then network, then offline page.

use reqwest::Method;
use tracing::{debug, info};

use super::{OfflineWorker, WaitUntil};
use crate::cache::{CacheStorage, ResponseSource};
use crate::site::types::{Request, Response};

/// The answer to an intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
  /// `None` when neither cache nor network could answer
  pub response: Option<Response>,
  pub source: ResponseSource,
}

impl FetchOutcome {
  fn new(response: Option<Response>, source: ResponseSource) -> Self {
    Self { response, source }
  }
}

impl<S: CacheStorage + ?Sized> OfflineWorker<S> {
  /// Intercept a request.
  ///
  /// Returns `None` for anything but GET: those requests are not
  /// intercepted and go to the network unmodified. For GET the returned
  /// future always resolves to a response decision; cache failures never
  /// leave a request unanswered.
  pub fn handle_fetch(&self, request: Request) -> Option<WaitUntil<'_, FetchOutcome>> {
    if request.method != Method::GET {
      debug!(method = %request.method, url = %request.url, "not intercepting");
      return None;
    }

    Some(Box::pin(async move { Ok(self.respond(request).await) }))
  }

  async fn respond(&self, request: Request) -> FetchOutcome {
    let key = request.key();

    if let Some(cached) = self.cache.lookup(&key) {
      debug!(%key, cached_at = %cached.cached_at, "cache hit");
      return FetchOutcome::new(Some(cached.response), ResponseSource::Cache);
    }

    debug!(%key, "cache miss");
    match self.network.fetch(&request).await {
      Ok(response) => {
        if response.is_cacheable() {
          // One copy goes to the store, the original to the caller
          let to_cache = response.clone();
          self.cache.store(&key, &to_cache);
        }
        FetchOutcome::new(Some(response), ResponseSource::Network)
      }
      Err(e) => {
        info!(%key, error = %e, "fetch failed");
        if request.accepts_html() {
          self.offline_fallback()
        } else {
          FetchOutcome::new(None, ResponseSource::Unavailable)
        }
      }
    }
  }

  fn offline_fallback(&self) -> FetchOutcome {
    let cached = self
      .config
      .offline_key()
      .ok()
      .and_then(|key| self.cache.lookup(&key));

    match cached {
      Some(cached) => FetchOutcome::new(Some(cached.response), ResponseSource::OfflineFallback),
      None => FetchOutcome::new(None, ResponseSource::Unavailable),
    }
  }
}
