//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use reqwest::Method;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::key::request_key;
use crate::error::{Error, Result};
use crate::http::{Request, Response};

/// A response found in a cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// The stored response, exactly as it was put
  pub response: Response,
  /// Name of the cache that held the entry
  pub cache_name: String,
  /// When the entry was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Open the named cache, creating it if it does not exist.
  fn open(&self, name: &str) -> Result<()>;

  /// Whether the named cache exists.
  fn has(&self, name: &str) -> Result<bool>;

  /// Names of all caches, oldest first.
  fn names(&self) -> Result<Vec<String>>;

  /// Delete a cache and all its entries. Returns false if it did not exist.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Store a batch of request/response pairs in the named cache.
  ///
  /// Either every pair is stored or none is.
  fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// Look up a request in one cache.
  fn match_in(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Look up a request across all caches, oldest cache first.
  fn match_any(&self, request: &Request) -> Result<Option<CachedResponse>>;

  /// Request URLs stored in the named cache, in insertion order.
  fn keys(&self, name: &str) -> Result<Vec<String>>;
}

/// Response metadata stored next to the body blob.
#[derive(Serialize, Deserialize)]
struct StoredHead {
  status: u16,
  status_text: String,
  headers: Vec<(String, String)>,
  url: String,
}

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent).map_err(|e| {
          Error::InvalidState(format!(
            "failed to create cache directory {}: {}",
            parent.display(),
            e
          ))
        })?;
      }
    }

    Self::from_connection(Connection::open(path)?)
  }

  /// In-memory store; contents vanish when dropped.
  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  /// Default database location under the user's data directory.
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|d| d.join("swcache").join("caches.db"))
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::LockPoisoned(e.to_string()))
  }

  fn find(&self, name: Option<&str>, request: &Request) -> Result<Option<CachedResponse>> {
    // Cache matching only ever succeeds for GET
    if request.method != Method::GET {
      return Ok(None);
    }

    let conn = self.conn()?;
    let key = request_key(request);

    let row: Option<(String, String, Vec<u8>, String)> = conn
      .query_row(
        "SELECT c.name, e.response_head, e.body, e.cached_at
         FROM cache_entries e
         INNER JOIN caches c ON c.id = e.cache_id
         WHERE e.request_key = ?1 AND (?2 IS NULL OR c.name = ?2)
         ORDER BY c.id
         LIMIT 1",
        params![key, name],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    let Some((cache_name, head, body, cached_at)) = row else {
      return Ok(None);
    };

    let head: StoredHead = serde_json::from_str(&head)?;
    Ok(Some(CachedResponse {
      response: Response {
        status: head.status,
        status_text: head.status_text,
        headers: head.headers,
        url: head.url,
        body: body.into(),
      },
      cache_name,
      cached_at: parse_datetime(&cached_at)?,
    }))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named caches; id order is creation order
CREATE TABLE IF NOT EXISTS caches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses, one per (cache, request)
CREATE TABLE IF NOT EXISTS cache_entries (
    cache_id INTEGER NOT NULL,
    request_key TEXT NOT NULL,
    request_method TEXT NOT NULL,
    request_url TEXT NOT NULL,
    response_head TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (cache_id, request_key),
    FOREIGN KEY (cache_id) REFERENCES caches(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_key ON cache_entries(request_key);
"#;

impl CacheStorage for SqliteStorage {
  fn open(&self, name: &str) -> Result<()> {
    let conn = self.conn()?;
    conn.execute(
      "INSERT OR IGNORE INTO caches (name) VALUES (?)",
      params![name],
    )?;
    Ok(())
  }

  fn has(&self, name: &str) -> Result<bool> {
    let conn = self.conn()?;
    let found: Option<i64> = conn
      .query_row(
        "SELECT id FROM caches WHERE name = ?",
        params![name],
        |row| row.get(0),
      )
      .optional()?;
    Ok(found.is_some())
  }

  fn names(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare("SELECT name FROM caches ORDER BY id")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
  }

  fn delete(&self, name: &str) -> Result<bool> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;
    tx.execute(
      "DELETE FROM cache_entries WHERE cache_id IN (SELECT id FROM caches WHERE name = ?)",
      params![name],
    )?;
    let removed = tx.execute("DELETE FROM caches WHERE name = ?", params![name])?;
    tx.commit()?;
    Ok(removed > 0)
  }

  fn put_all(&self, name: &str, entries: &[(Request, Response)]) -> Result<()> {
    // Validate the whole batch before touching the database
    for (request, _) in entries {
      if !request.is_http() {
        return Err(Error::UnsupportedScheme(request.url.to_string()));
      }
      if request.method != Method::GET {
        return Err(Error::InvalidState(format!(
          "cannot cache {} request for {}",
          request.method, request.url
        )));
      }
    }

    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    tx.execute(
      "INSERT OR IGNORE INTO caches (name) VALUES (?)",
      params![name],
    )?;
    let cache_id: i64 = tx.query_row(
      "SELECT id FROM caches WHERE name = ?",
      params![name],
      |row| row.get(0),
    )?;

    for (request, response) in entries {
      let head = serde_json::to_string(&StoredHead {
        status: response.status,
        status_text: response.status_text.clone(),
        headers: response.headers.clone(),
        url: response.url.clone(),
      })?;

      tx.execute(
        "INSERT OR REPLACE INTO cache_entries
           (cache_id, request_key, request_method, request_url, response_head, body, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          cache_id,
          request_key(request),
          request.method.as_str(),
          request.match_url(),
          head,
          &response.body[..],
        ],
      )?;
    }

    // Dropping `tx` on any error above rolls the whole batch back
    tx.commit()?;
    Ok(())
  }

  fn match_in(&self, name: &str, request: &Request) -> Result<Option<CachedResponse>> {
    self.find(Some(name), request)
  }

  fn match_any(&self, request: &Request) -> Result<Option<CachedResponse>> {
    self.find(None, request)
  }

  fn keys(&self, name: &str) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn.prepare(
      "SELECT e.request_url FROM cache_entries e
       INNER JOIN caches c ON c.id = e.cache_id
       WHERE c.name = ?
       ORDER BY e.rowid",
    )?;
    let keys = stmt
      .query_map(params![name], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(keys)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::InvalidState(format!("failed to parse datetime '{}': {}", s, e)))
}
