//! Durable story store.
//!
//! Keyed by story id, survives restarts, available without network access.
//! Writes serialize through the connection mutex and a transaction, so a
//! batch is visible either entirely or not at all.

use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::api::types::Story;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("story has no id; refusing to store it")]
  MissingIdentity,
  #[error("store lock poisoned")]
  LockPoisoned,
  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),
  #[error("failed to serialize story: {0}")]
  Serialization(#[from] serde_json::Error),
  #[error("failed to prepare store directory: {0}")]
  Io(#[from] std::io::Error),
}

/// Schema for the story store.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS stories (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    saved_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

pub struct StoryStore {
  conn: Mutex<Connection>,
}

impl StoryStore {
  /// Open or create the store at the given path.
  pub fn open_at(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    Self::from_connection(Connection::open(path)?)
  }

  /// In-memory store, used by tests.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    conn.execute_batch(STORE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
    self.conn.lock().map_err(|_| StoreError::LockPoisoned)
  }

  /// Upsert a batch of stories in one transaction.
  ///
  /// Readers see either the full pre-call or full post-call set; a failure
  /// partway through rolls the whole batch back. An empty batch is a
  /// successful no-op.
  #[allow(dead_code)]
  pub fn upsert_many(&self, stories: &[Story]) -> Result<(), StoreError> {
    if stories.is_empty() {
      return Ok(());
    }
    if stories.iter().any(|s| s.id.is_empty()) {
      return Err(StoreError::MissingIdentity);
    }

    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    for story in stories {
      let data = serde_json::to_vec(story)?;
      tx.execute(
        "INSERT OR REPLACE INTO stories (id, data, saved_at) VALUES (?, ?, datetime('now'))",
        params![story.id, data],
      )?;
    }
    tx.commit()?;

    Ok(())
  }

  /// Upsert a single story. A story without an id is rejected.
  pub fn upsert_one(&self, story: &Story) -> Result<(), StoreError> {
    if story.id.is_empty() {
      return Err(StoreError::MissingIdentity);
    }

    let conn = self.lock()?;
    let data = serde_json::to_vec(story)?;
    conn.execute(
      "INSERT OR REPLACE INTO stories (id, data, saved_at) VALUES (?, ?, datetime('now'))",
      params![story.id, data],
    )?;

    Ok(())
  }

  /// All stored stories. Order is unspecified.
  pub fn get_all(&self) -> Result<Vec<Story>, StoreError> {
    let conn = self.lock()?;

    let mut stmt = conn.prepare("SELECT data FROM stories")?;
    let stories = stmt
      .query_map([], |row| row.get::<_, Vec<u8>>(0))?
      .filter_map(|r| r.ok())
      .filter_map(|data| serde_json::from_slice(&data).ok())
      .collect();

    Ok(stories)
  }

  /// Delete the story with the given id. Absent ids are a no-op.
  pub fn delete_one(&self, id: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM stories WHERE id = ?", params![id])?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  fn story(id: &str) -> Story {
    Story {
      id: id.to_string(),
      author_name: "Ana".to_string(),
      description: format!("story {id}"),
      photo_url: format!("https://cdn.example.test/{id}.jpg"),
      created_at: Utc::now(),
      lat: Some(-6.2),
      lon: Some(106.8),
    }
  }

  #[test]
  fn test_upsert_one_then_get_all() {
    let store = StoryStore::open_in_memory().unwrap();
    let original = story("s1");

    store.upsert_one(&original).unwrap();

    let all = store.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0], original);
  }

  #[test]
  fn test_upsert_same_id_overwrites_never_duplicates() {
    let store = StoryStore::open_in_memory().unwrap();
    store.upsert_one(&story("s1")).unwrap();

    let mut updated = story("s1");
    updated.description = "edited".to_string();
    store.upsert_one(&updated).unwrap();

    let all = store.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].description, "edited");
  }

  #[test]
  fn test_upsert_one_without_id_fails() {
    let store = StoryStore::open_in_memory().unwrap();
    let mut nameless = story("");
    nameless.description = "no identity".to_string();

    assert!(matches!(
      store.upsert_one(&nameless),
      Err(StoreError::MissingIdentity)
    ));
    assert!(store.get_all().unwrap().is_empty());
  }

  #[test]
  fn test_upsert_many_empty_is_noop() {
    let store = StoryStore::open_in_memory().unwrap();
    store.upsert_one(&story("s1")).unwrap();

    store.upsert_many(&[]).unwrap();

    assert_eq!(store.get_all().unwrap().len(), 1);
  }

  #[test]
  fn test_upsert_many_is_all_or_nothing() {
    let store = StoryStore::open_in_memory().unwrap();

    let batch = vec![story("s1"), story(""), story("s3")];
    assert!(store.upsert_many(&batch).is_err());

    // The invalid entry aborted the whole batch.
    assert!(store.get_all().unwrap().is_empty());
  }

  #[test]
  fn test_upsert_many_mixes_inserts_and_overwrites() {
    let store = StoryStore::open_in_memory().unwrap();
    store.upsert_one(&story("s1")).unwrap();

    let mut updated = story("s1");
    updated.description = "edited".to_string();
    store.upsert_many(&[updated.clone(), story("s2")]).unwrap();

    let mut all = store.get_all().unwrap();
    all.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].description, "edited");
    assert_eq!(all[1].id, "s2");
  }

  #[test]
  fn test_delete_missing_id_is_noop() {
    let store = StoryStore::open_in_memory().unwrap();
    store.upsert_one(&story("s1")).unwrap();

    store.delete_one("does-not-exist").unwrap();

    assert_eq!(store.get_all().unwrap().len(), 1);
  }

  #[test]
  fn test_delete_removes_only_target() {
    let store = StoryStore::open_in_memory().unwrap();
    store.upsert_many(&[story("s1"), story("s2")]).unwrap();

    store.delete_one("s1").unwrap();

    let all = store.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "s2");
  }
}
