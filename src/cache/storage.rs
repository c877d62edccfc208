//! Bucketed storage of HTTP request/response pairs.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::sync::Mutex;

/// Identity of an intercepted request: method + URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &str) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url: url.to_string(),
    }
  }

  /// SHA256 hash for stable, fixed-length keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }

  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// A stored response snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub stored_at: DateTime<Utc>,
}

impl StoredResponse {
  pub fn new(status: u16, content_type: Option<String>, body: Vec<u8>) -> Self {
    Self {
      status,
      content_type,
      body,
      stored_at: Utc::now(),
    }
  }

  /// Whether the response is in the success range and eligible for caching.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }
}

/// Named-bucket request/response storage, the platform capability behind
/// the cache layer.
///
/// One bucket per cache generation; entries are keyed by request identity
/// and overwritten on put.
pub trait CacheBuckets: Send + Sync + 'static {
  /// Create the bucket if it does not exist yet.
  fn open(&self, bucket: &str) -> Result<()>;

  /// Look up the stored response for a request, if any.
  fn lookup(&self, bucket: &str, request: &RequestKey) -> Result<Option<StoredResponse>>;

  /// Store a response, overwriting any prior entry for the same request.
  fn put(&self, bucket: &str, request: &RequestKey, response: &StoredResponse) -> Result<()>;

  /// Delete a bucket and all of its entries.
  fn delete_bucket(&self, bucket: &str) -> Result<()>;

  /// Names of all existing buckets.
  fn bucket_names(&self) -> Result<Vec<String>>;
}

/// SQLite-backed bucket storage.
pub struct SqliteBuckets {
  conn: Mutex<Connection>,
}

/// Schema for response cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored response snapshots, keyed by request identity within a bucket
CREATE TABLE IF NOT EXISTS cached_responses (
    bucket TEXT NOT NULL,
    request_hash TEXT NOT NULL,
    request_desc TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, request_hash)
);

CREATE INDEX IF NOT EXISTS idx_cached_responses_bucket ON cached_responses(bucket);
"#;

impl SqliteBuckets {
  /// Open or create the bucket storage at the given path.
  pub fn open_at(path: &std::path::Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::from_connection(conn)
  }

  /// In-memory storage, used by tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl CacheBuckets for SqliteBuckets {
  fn open(&self, bucket: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR IGNORE INTO cache_buckets (name) VALUES (?)",
        params![bucket],
      )
      .map_err(|e| eyre!("Failed to open cache bucket {}: {}", bucket, e))?;
    Ok(())
  }

  fn lookup(&self, bucket: &str, request: &RequestKey) -> Result<Option<StoredResponse>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare(
        "SELECT status, content_type, body, stored_at FROM cached_responses
         WHERE bucket = ? AND request_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare cache lookup: {}", e))?;

    let row: Option<(u16, Option<String>, Vec<u8>, String)> = stmt
      .query_row(params![bucket, request.cache_hash()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((status, content_type, body, stored_at_str)) => Ok(Some(StoredResponse {
        status,
        content_type,
        body,
        stored_at: parse_datetime(&stored_at_str)?,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, bucket: &str, request: &RequestKey, response: &StoredResponse) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cached_responses
           (bucket, request_hash, request_desc, status, content_type, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          bucket,
          request.cache_hash(),
          request.description(),
          response.status,
          response.content_type,
          response.body,
        ],
      )
      .map_err(|e| eyre!("Failed to store response for {}: {}", request.description(), e))?;

    Ok(())
  }

  fn delete_bucket(&self, bucket: &str) -> Result<()> {
    let conn = self.lock()?;

    conn
      .execute(
        "DELETE FROM cached_responses WHERE bucket = ?",
        params![bucket],
      )
      .map_err(|e| eyre!("Failed to delete entries of bucket {}: {}", bucket, e))?;
    conn
      .execute("DELETE FROM cache_buckets WHERE name = ?", params![bucket])
      .map_err(|e| eyre!("Failed to delete cache bucket {}: {}", bucket, e))?;

    Ok(())
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM cache_buckets ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare bucket listing: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache buckets: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
