//! Cache storage trait with SQLite and in-memory implementations.

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{CacheName, CachedResponse};
use crate::db::{parse_datetime, Database};
use crate::site::types::{Headers, RequestKey, Response, ResponseType};

/// Trait for cache storage backends.
///
/// The store holds named generations per scope; each generation maps
/// request identities to responses. Every call is atomic on its own.
pub trait CacheStorage: Send + Sync {
  /// Names of the generations that exist in `scope`.
  fn generations(&self, scope: &str) -> Result<Vec<String>>;

  /// Delete a generation and every entry in it. Returns whether it existed.
  fn delete_generation(&self, name: &CacheName) -> Result<bool>;

  /// Exact-identity lookup within one generation.
  fn match_request(&self, name: &CacheName, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Store a response, replacing any previous one for the same identity.
  fn put(&self, name: &CacheName, key: &RequestKey, response: &Response) -> Result<()>;

  /// Create the generation and store several responses in it; either all
  /// are stored or none, and a failed call leaves no generation behind.
  fn put_all(&self, name: &CacheName, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Remove one entry. Returns whether it existed.
  fn delete(&self, name: &CacheName, key: &RequestKey) -> Result<bool>;
}

/// SHA256 of the request identity, for stable fixed-length row keys.
pub fn request_hash(key: &RequestKey) -> String {
  let mut hasher = Sha256::new();
  hasher.update(key.to_string().as_bytes());
  hex::encode(hasher.finalize())
}

/// In-process storage, used for tests and `--ephemeral` runs.
#[derive(Default)]
pub struct MemoryStorage {
  generations: Mutex<BTreeMap<CacheName, HashMap<RequestKey, CachedResponse>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(
    &self,
  ) -> Result<std::sync::MutexGuard<'_, BTreeMap<CacheName, HashMap<RequestKey, CachedResponse>>>>
  {
    self
      .generations
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheStorage for MemoryStorage {
  fn generations(&self, scope: &str) -> Result<Vec<String>> {
    Ok(
      self
        .lock()?
        .keys()
        .filter(|name| name.scope == scope)
        .map(|name| name.generation.clone())
        .collect(),
    )
  }

  fn delete_generation(&self, name: &CacheName) -> Result<bool> {
    Ok(self.lock()?.remove(name).is_some())
  }

  fn match_request(&self, name: &CacheName, key: &RequestKey) -> Result<Option<CachedResponse>> {
    Ok(
      self
        .lock()?
        .get(name)
        .and_then(|entries| entries.get(key))
        .cloned(),
    )
  }

  fn put(&self, name: &CacheName, key: &RequestKey, response: &Response) -> Result<()> {
    self.lock()?.entry(name.clone()).or_default().insert(
      key.clone(),
      CachedResponse {
        response: response.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn put_all(&self, name: &CacheName, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut generations = self.lock()?;
    let store = generations.entry(name.clone()).or_default();
    let now = Utc::now();
    for (key, response) in entries {
      store.insert(
        key.clone(),
        CachedResponse {
          response: response.clone(),
          cached_at: now,
        },
      );
    }
    Ok(())
  }

  fn delete(&self, name: &CacheName, key: &RequestKey) -> Result<bool> {
    Ok(
      self
        .lock()?
        .get_mut(name)
        .map(|entries| entries.remove(key).is_some())
        .unwrap_or(false),
    )
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  pub fn new(db: Database) -> Self {
    Self {
      conn: Mutex::new(db.into_connection()),
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn open_generation(conn: &Connection, name: &CacheName) -> Result<()> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_generations (scope, name) VALUES (?, ?)",
      params![name.scope, name.generation],
    )
    .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;
  Ok(())
}

fn insert_entry(
  conn: &Connection,
  name: &CacheName,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (scope, generation, request_hash, request_key, url, status, status_text,
          response_type, redirected, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        name.scope,
        name.generation,
        request_hash(key),
        key.to_string(),
        response.url,
        response.status,
        response.status_text,
        response.response_type.as_str(),
        response.redirected,
        headers,
        response.body.as_ref(),
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn generations(&self, scope: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_generations WHERE scope = ? ORDER BY created_at, name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map(params![scope], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache names: {}", e))?;

    Ok(names)
  }

  fn delete_generation(&self, name: &CacheName) -> Result<bool> {
    let conn = self.lock()?;
    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM cache_entries WHERE scope = ? AND generation = ?",
      params![name.scope, name.generation],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", name, e))?;

    let removed = tx
      .execute(
        "DELETE FROM cache_generations WHERE scope = ? AND name = ?",
        params![name.scope, name.generation],
      )
      .map_err(|e| eyre!("Failed to delete cache {}: {}", name, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  fn match_request(&self, name: &CacheName, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;

    let row = conn
      .query_row(
        "SELECT url, status, status_text, response_type, redirected, headers, body, cached_at
         FROM cache_entries
         WHERE scope = ? AND generation = ? AND request_hash = ?",
        params![name.scope, name.generation, request_hash(key)],
        |row| {
          Ok((
            row.get::<_, String>(0)?,
            row.get::<_, u16>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, bool>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, Vec<u8>>(6)?,
            row.get::<_, String>(7)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up {}: {}", key, e))?;

    let Some((url, status, status_text, response_type, redirected, headers, body, cached_at)) = row
    else {
      return Ok(None);
    };

    let headers: Headers = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

    Ok(Some(CachedResponse {
      response: Response {
        url,
        status,
        status_text,
        response_type: ResponseType::parse(&response_type)?,
        redirected,
        headers,
        body: body.into(),
      },
      cached_at: parse_datetime(&cached_at)?,
    }))
  }

  fn put(&self, name: &CacheName, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    open_generation(&tx, name)?;
    insert_entry(&tx, name, key, response)?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn put_all(&self, name: &CacheName, entries: &[(RequestKey, Response)]) -> Result<()> {
    let conn = self.lock()?;
    let tx = conn
      .unchecked_transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    open_generation(&tx, name)?;
    for (key, response) in entries {
      insert_entry(&tx, name, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn delete(&self, name: &CacheName, key: &RequestKey) -> Result<bool> {
    let removed = self
      .lock()?
      .execute(
        "DELETE FROM cache_entries WHERE scope = ? AND generation = ? AND request_hash = ?",
        params![name.scope, name.generation, request_hash(key)],
      )
      .map_err(|e| eyre!("Failed to delete {}: {}", key, e))?;

    Ok(removed > 0)
  }
}
