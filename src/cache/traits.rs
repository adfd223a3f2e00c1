//! Core types for the response cache.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::site::types::Response;

/// A cache generation inside one site scope.
///
/// Generations of different scopes never see each other, so two sites can
/// share one store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheName {
  pub scope: String,
  pub generation: String,
}

impl CacheName {
  pub fn new(scope: impl Into<String>, generation: impl Into<String>) -> Self {
    Self {
      scope: scope.into(),
      generation: generation.into(),
    }
  }
}

impl fmt::Display for CacheName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} ({})", self.generation, self.scope)
  }
}

/// A response read back from the cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  /// The stored response
  pub response: Response,
  /// When the response was stored
  pub cached_at: DateTime<Utc>,
}

/// Indicates where a fetch result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Served from the current cache generation, no network call made
  Cache,
  /// Fetched from the network (stored if it was cacheable)
  Network,
  /// Network failed, served the offline document
  OfflineFallback,
  /// Network failed and there was nothing to serve
  Unavailable,
}

impl ResponseSource {
  pub fn label(&self) -> &'static str {
    match self {
      ResponseSource::Cache => "cache",
      ResponseSource::Network => "network",
      ResponseSource::OfflineFallback => "offline",
      ResponseSource::Unavailable => "unavailable",
    }
  }
}
