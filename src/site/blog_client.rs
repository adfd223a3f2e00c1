//! Blog client that routes every request through the offline worker.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use url::Url;

use super::client::Network;
use super::types::{PostCard, Request};
use crate::cache::{CacheStorage, ResponseSource};
use crate::worker::{EventOutcome, FetchOutcome, OfflineWorker, WorkerEvent, BACKGROUND_SYNC_TAG};

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";
const ACCEPT_JSON: &str = "application/json";

/// The posts feed is either a bare array or wrapped in `{"posts": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PostsFeed {
  Bare(Vec<PostCard>),
  Wrapped { posts: Vec<PostCard> },
}

impl PostsFeed {
  fn into_cards(self) -> Vec<PostCard> {
    match self {
      PostsFeed::Bare(cards) => cards,
      PostsFeed::Wrapped { posts } => posts,
    }
  }
}

/// Blog client playing the page's role: it issues requests and lets the
/// worker decide how each one is answered.
///
/// Without an active worker every request goes straight to the network.
/// Connectivity changes seen through responses are reported to the worker.
pub struct BlogClient<S: CacheStorage + ?Sized> {
  network: Arc<dyn Network>,
  worker: Option<Arc<OfflineWorker<S>>>,
  origin: Url,
  posts_feed: String,
  /// Shared between clones
  online: Arc<AtomicBool>,
}

impl<S: CacheStorage + ?Sized> BlogClient<S> {
  pub fn new(
    network: Arc<dyn Network>,
    worker: Option<Arc<OfflineWorker<S>>>,
    origin: Url,
    posts_feed: impl Into<String>,
  ) -> Self {
    Self {
      network,
      worker,
      origin,
      posts_feed: posts_feed.into(),
      online: Arc::new(AtomicBool::new(true)),
    }
  }

  pub fn origin(&self) -> &Url {
    &self.origin
  }

  /// Generation of the worker in charge, if any.
  pub fn generation(&self) -> Option<&str> {
    self.worker.as_ref().map(|w| w.generation())
  }

  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path {}: {}", path, e))
  }

  /// Whether the last request that reached the network got through.
  pub fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }

  /// Send a request through the worker, or directly when not intercepted.
  pub async fn fetch(&self, request: Request) -> Result<FetchOutcome> {
    let request = match &self.worker {
      Some(worker) => match worker.dispatch(WorkerEvent::Fetch(request)).await? {
        EventOutcome::Responded(outcome) => {
          match outcome.source {
            ResponseSource::Network => self.set_online(worker, true).await,
            ResponseSource::OfflineFallback | ResponseSource::Unavailable => {
              self.set_online(worker, false).await
            }
            ResponseSource::Cache => {}
          }
          return Ok(outcome);
        }
        EventOutcome::NotIntercepted(request) => request,
        other => return Err(eyre!("Unexpected worker outcome for fetch: {:?}", other)),
      },
      None => request,
    };

    let response = self.network.fetch(&request).await;
    if let Some(worker) = &self.worker {
      self.set_online(worker, response.is_ok()).await;
    }

    Ok(FetchOutcome {
      response: Some(response?),
      source: ResponseSource::Network,
    })
  }

  /// Record connectivity and tell the worker when it changes.
  ///
  /// Coming back online also requests a background sync.
  async fn set_online(&self, worker: &OfflineWorker<S>, online: bool) {
    if self.online.swap(online, Ordering::SeqCst) == online {
      return;
    }

    let mut events = vec![WorkerEvent::Connectivity(online)];
    if online {
      events.push(WorkerEvent::Sync(BACKGROUND_SYNC_TAG.to_string()));
    }

    for event in events {
      if let Err(e) = worker.dispatch(event).await {
        warn!(error = %e, "worker failed to handle connectivity event");
      }
    }
  }

  /// Load a page as a browser navigation would.
  pub async fn get_page(&self, path: &str) -> Result<FetchOutcome> {
    let request = Request::get(self.resolve(path)?).with_header("Accept", ACCEPT_HTML);
    self.fetch(request).await
  }

  /// Load the post cards from the posts feed.
  pub async fn get_posts(&self) -> Result<(Vec<PostCard>, ResponseSource)> {
    let request =
      Request::get(self.resolve(&self.posts_feed)?).with_header("Accept", ACCEPT_JSON);
    let outcome = self.fetch(request).await?;

    let response = outcome
      .response
      .ok_or_else(|| eyre!("Posts feed is not available offline"))?;

    if !response.is_ok() {
      return Err(eyre!(
        "Posts feed returned {} {}",
        response.status,
        response.status_text
      ));
    }

    let feed: PostsFeed = serde_json::from_slice(&response.body)
      .map_err(|e| eyre!("Failed to parse posts feed: {}", e))?;

    Ok((feed.into_cards(), outcome.source))
  }
}

impl<S: CacheStorage + ?Sized> Clone for BlogClient<S> {
  fn clone(&self) -> Self {
    Self {
      network: Arc::clone(&self.network),
      worker: self.worker.clone(),
      origin: self.origin.clone(),
      posts_feed: self.posts_feed.clone(),
      online: Arc::clone(&self.online),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::site::types::Response;
  use crate::worker::testing::*;
  use reqwest::Method;

  const FEED: &str = r#"[
    {"id": "1", "title": "Intro to X", "text": "Getting started"},
    {"id": "2", "title": "Y Basics", "excerpt": "Everything about Y"}
  ]"#;

  fn client(network: FakeNetwork) -> (BlogClient<MemoryStorage>, Arc<FakeNetwork>) {
    let h = harness("v1", &[], network);
    let network = h.network.clone();
    let origin = Url::parse("http://blog.local/").unwrap();
    let client = BlogClient::new(
      network.clone(),
      Some(Arc::new(h.worker)),
      origin,
      "/api/posts/",
    );
    (client, network)
  }

  #[tokio::test]
  async fn test_posts_are_served_from_cache_when_offline() {
    let network = FakeNetwork::default();
    network.serve(
      "/api/posts/",
      Response::basic("http://blog.local/api/posts/", 200, FEED),
    );
    let (client, network) = client(network);

    let (cards, source) = client.get_posts().await.unwrap();
    assert_eq!(cards.len(), 2);
    assert_eq!(source, ResponseSource::Network);

    network.go_offline();
    let (cards, source) = client.get_posts().await.unwrap();
    assert_eq!(cards[1].text.as_deref(), Some("Everything about Y"));
    assert_eq!(source, ResponseSource::Cache);
  }

  #[tokio::test]
  async fn test_wrapped_feed() {
    let network = FakeNetwork::default();
    network.serve(
      "/api/posts/",
      Response::basic(
        "http://blog.local/api/posts/",
        200,
        r#"{"posts": [{"id": "5", "title": "Only"}]}"#,
      ),
    );
    let (client, _) = client(network);

    let (cards, _) = client.get_posts().await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].text, None);
  }

  #[tokio::test]
  async fn test_posts_unavailable_offline_without_cache() {
    let network = FakeNetwork::default();
    network.go_offline();
    let (client, _) = client(network);

    assert!(client.get_posts().await.is_err());
  }

  #[tokio::test]
  async fn test_non_get_goes_to_network() {
    let network = FakeNetwork::default();
    network.serve(
      "/post/1/like/",
      Response::basic("http://blog.local/post/1/like/", 200, r#"{"liked": true}"#),
    );
    let (client, network) = client(network);

    let url = client.resolve("/post/1/like/").unwrap();
    let outcome = client.fetch(Request::new(Method::POST, url)).await.unwrap();
    assert_eq!(outcome.source, ResponseSource::Network);
    assert_eq!(network.calls(), 1);
  }

  #[tokio::test]
  async fn test_tracks_connectivity_across_clones() {
    let (client, network) = client(FakeNetwork::serving(&["/about/"]));
    let other = client.clone();
    assert!(client.is_online());

    network.go_offline();
    let outcome = client.get_page("/contact/").await.unwrap();
    assert_eq!(outcome.source, ResponseSource::Unavailable);
    assert!(!other.is_online());

    // Cache hits say nothing about the network
    network.go_online();
    client.get_page("/about/").await.unwrap();
    network.go_offline();
    client.get_page("/about/").await.unwrap();
    assert!(client.is_online());
  }

  #[tokio::test]
  async fn test_without_worker_requests_go_direct() {
    let network = Arc::new(FakeNetwork::serving(&["/about/"]));
    let client: BlogClient<MemoryStorage> = BlogClient::new(
      network.clone(),
      None,
      Url::parse("http://blog.local/").unwrap(),
      "/api/posts/",
    );

    assert_eq!(client.generation(), None);
    let first = client.get_page("/about/").await.unwrap();
    let second = client.get_page("/about/").await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(second.source, ResponseSource::Network);
    assert_eq!(network.calls(), 2);
  }
}
