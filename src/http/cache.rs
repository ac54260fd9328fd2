use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache entry is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// One file per entry, named by the SHA-256 of the request.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    /// Milliseconds since the Unix epoch at store time.
    timestamp: u64,
    url: String,
    data: serde_json::Value,
}

/// Filesystem response cache. Entries older than the TTL are misses;
/// unreadable entries are misses too, logged at WARN.
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Duration,
}

/// Cache key: SHA-256 over the URL plus, for POST, the canonicalized body.
/// Parsing and re-serializing the body sorts object keys, so equivalent
/// bodies hash identically.
pub fn cache_key(url: &str, body: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    if let Some(body) = body {
        let canonical = serde_json::from_str::<serde_json::Value>(body)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| body.to_string());
        hasher.update(canonical.as_bytes());
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

impl ResponseCache {
    pub fn open<P: AsRef<Path>>(dir: P, ttl: Duration) -> Result<Self> {
        fs::create_dir_all(dir.as_ref())?;
        Ok(ResponseCache {
            dir: dir.as_ref().to_path_buf(),
            ttl,
        })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let path = self.entry_path(key);
        if !path.exists() {
            return None;
        }
        let entry: CacheEntry = match fs::read_to_string(&path)
            .map_err(CacheError::from)
            .and_then(|text| Ok(serde_json::from_str(&text)?))
        {
            Ok(entry) => entry,
            Err(err) => {
                warn!("discarding unreadable cache entry {}: {}", path.display(), err);
                return None;
            }
        };

        let age_ms = now_millis().saturating_sub(entry.timestamp);
        if Duration::from_millis(age_ms) > self.ttl {
            return None;
        }
        Some(entry.data)
    }

    pub fn put(&self, key: &str, url: &str, data: &serde_json::Value) -> Result<()> {
        let entry = CacheEntry {
            timestamp: now_millis(),
            url: url.to_string(),
            data: data.clone(),
        };
        fs::write(self.entry_path(key), serde_json::to_string(&entry)?)?;
        Ok(())
    }

    /// Entry count and total byte size.
    pub fn stats(&self) -> Result<(usize, u64)> {
        let mut count = 0usize;
        let mut bytes = 0u64;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                count += 1;
                bytes += entry.metadata()?.len();
            }
        }
        Ok((count, bytes))
    }

    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0usize;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("json") {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn key_depends_on_url_and_body() {
        let a = cache_key("https://api.test/works", None);
        let b = cache_key("https://api.test/works?page=2", None);
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);

        let with_body = cache_key("https://api.test/batch", Some(r#"{"ids":["x"]}"#));
        assert_ne!(a, with_body);
    }

    #[test]
    fn equivalent_post_bodies_share_a_key() {
        let a = cache_key("https://api.test/batch", Some(r#"{"b":1,"a":2}"#));
        let b = cache_key("https://api.test/batch", Some(r#"{"a":2,"b":1}"#));
        assert_eq!(a, b);
    }

    #[test]
    fn round_trip_and_ttl_expiry() {
        let dir = tempdir().unwrap();
        let cache = ResponseCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        let key = cache_key("https://api.test/works/W1", None);
        let data = serde_json::json!({"id": "W1"});

        assert!(cache.get(&key).is_none());
        cache.put(&key, "https://api.test/works/W1", &data).unwrap();
        assert_eq!(cache.get(&key), Some(data.clone()));

        // zero TTL treats every entry as stale
        let stale = ResponseCache::open(dir.path(), Duration::ZERO).unwrap();
        assert!(stale.get(&key).is_none());
    }

    #[test]
    fn corrupt_entries_are_misses() {
        let dir = tempdir().unwrap();
        let cache = ResponseCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        let key = cache_key("https://api.test/corrupt", None);
        fs::write(dir.path().join(format!("{}.json", key)), "not json").unwrap();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn stats_and_clear() {
        let dir = tempdir().unwrap();
        let cache = ResponseCache::open(dir.path(), Duration::from_secs(60)).unwrap();
        for i in 0..3 {
            let key = cache_key(&format!("https://api.test/{}", i), None);
            cache.put(&key, "u", &serde_json::json!(i)).unwrap();
        }
        let (count, bytes) = cache.stats().unwrap();
        assert_eq!(count, 3);
        assert!(bytes > 0);
        assert_eq!(cache.clear().unwrap(), 3);
        assert_eq!(cache.stats().unwrap().0, 0);
    }
}
