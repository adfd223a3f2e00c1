//! Client-only "like" flags kept in local key/value storage.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::db::Database;

/// Synchronous string key/value storage, in the manner of `localStorage`.
pub trait LocalStorage: Send + Sync {
  fn get_item(&self, key: &str) -> Result<Option<String>>;

  fn set_item(&self, key: &str, value: &str) -> Result<()>;

  fn remove_item(&self, key: &str) -> Result<()>;
}

/// In-process storage, used for tests and `--ephemeral` runs.
#[derive(Debug, Default)]
pub struct MemoryLocalStorage {
  items: Mutex<HashMap<String, String>>,
}

impl MemoryLocalStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
    self.items.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl LocalStorage for MemoryLocalStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    Ok(self.lock()?.get(key).cloned())
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    self.lock()?.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    self.lock()?.remove(key);
    Ok(())
  }
}

/// SQLite-backed local storage.
pub struct SqliteLocalStorage {
  conn: Mutex<Connection>,
}

impl SqliteLocalStorage {
  pub fn new(db: Database) -> Self {
    Self {
      conn: Mutex::new(db.into_connection()),
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl LocalStorage for SqliteLocalStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    self
      .lock()?
      .query_row(
        "SELECT value FROM local_storage WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn set_item(&self, key: &str, value: &str) -> Result<()> {
    self
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO local_storage (key, value) VALUES (?, ?)",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<()> {
    self
      .lock()?
      .execute("DELETE FROM local_storage WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove {}: {}", key, e))?;
    Ok(())
  }
}

/// Storage key of the like flag for a post.
pub fn like_key(post_id: &str) -> String {
  format!("liked_{}", post_id)
}

/// Like button state for one post card.
///
/// The flag is present in storage iff the post is liked. A button without
/// a post id only toggles its visual state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LikeButton {
  post_id: Option<String>,
  liked: bool,
}

impl LikeButton {
  /// Read the initial state from storage.
  pub fn init(post_id: Option<&str>, storage: &dyn LocalStorage) -> Result<Self> {
    let liked = match post_id {
      Some(id) => storage.get_item(&like_key(id))?.is_some(),
      None => false,
    };

    Ok(Self {
      post_id: post_id.map(String::from),
      liked,
    })
  }

  pub fn is_liked(&self) -> bool {
    self.liked
  }

  /// Flip the state and mirror it to storage. Returns the new state.
  pub fn click(&mut self, storage: &dyn LocalStorage) -> Result<bool> {
    self.liked = !self.liked;

    if let Some(id) = &self.post_id {
      let key = like_key(id);
      if self.liked {
        storage.set_item(&key, "true")?;
      } else {
        storage.remove_item(&key)?;
      }
    }

    Ok(self.liked)
  }

  /// Heart glyph for the current state.
  pub fn icon(&self) -> &'static str {
    if self.liked {
      "♥"
    } else {
      "♡"
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_init_reads_flag() {
    let storage = MemoryLocalStorage::new();
    storage.set_item("liked_3", "true").unwrap();

    assert!(LikeButton::init(Some("3"), &storage).unwrap().is_liked());
    assert!(!LikeButton::init(Some("4"), &storage).unwrap().is_liked());
  }

  #[test]
  fn test_click_mirrors_state() {
    let storage = MemoryLocalStorage::new();
    let mut button = LikeButton::init(Some("7"), &storage).unwrap();

    assert!(button.click(&storage).unwrap());
    assert_eq!(storage.get_item("liked_7").unwrap().as_deref(), Some("true"));

    assert!(!button.click(&storage).unwrap());
    assert_eq!(storage.get_item("liked_7").unwrap(), None);
  }

  #[test]
  fn test_double_toggle_restores_state() {
    let storage = SqliteLocalStorage::new(Database::in_memory().unwrap());
    storage.set_item("liked_1", "true").unwrap();

    let mut button = LikeButton::init(Some("1"), &storage).unwrap();
    let original = button.is_liked();
    button.click(&storage).unwrap();
    button.click(&storage).unwrap();

    assert_eq!(button.is_liked(), original);
    assert_eq!(
      storage.get_item("liked_1").unwrap().is_some(),
      button.is_liked()
    );
  }

  #[test]
  fn test_button_without_post_id_touches_nothing() {
    let storage = MemoryLocalStorage::new();
    let mut button = LikeButton::init(None, &storage).unwrap();

    assert!(button.click(&storage).unwrap());
    assert!(storage.lock().unwrap().is_empty());
  }

  #[test]
  fn test_sqlite_storage_roundtrip() {
    let storage = SqliteLocalStorage::new(Database::in_memory().unwrap());
    assert_eq!(storage.get_item("liked_9").unwrap(), None);

    storage.set_item("liked_9", "true").unwrap();
    assert_eq!(storage.get_item("liked_9").unwrap().as_deref(), Some("true"));

    storage.remove_item("liked_9").unwrap();
    assert_eq!(storage.get_item("liked_9").unwrap(), None);
  }
}
