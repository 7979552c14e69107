//! Processed-vacancy cache: advisory TTL set of vacancy IDs already
//! considered this week, to short-circuit re-evaluation across runs.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

struct Entry {
    expires_at: DateTime<Utc>,
}

pub struct ProcessedVacancyCache {
    inner: RwLock<HashMap<String, Entry>>,
    persist_path: PathBuf,
    ttl: chrono::Duration,
}

impl ProcessedVacancyCache {
    pub fn new(state_dir: &std::path::Path, ttl_days: i64) -> Self {
        let persist_path = state_dir.join("processed_vacancy_cache.json");
        let mut map = HashMap::new();
        if let Ok(data) = std::fs::read_to_string(&persist_path) {
            if let Ok(rows) = serde_json::from_str::<HashMap<String, DateTime<Utc>>>(&data) {
                let now = Utc::now();
                for (id, expires_at) in rows {
                    if expires_at > now {
                        map.insert(id, Entry { expires_at });
                    }
                }
            }
        }
        Self {
            inner: RwLock::new(map),
            persist_path,
            ttl: chrono::Duration::days(ttl_days),
        }
    }

    async fn persist(&self) {
        let map = self.inner.read().await;
        let rows: HashMap<String, DateTime<Utc>> = map
            .iter()
            .map(|(k, v)| (k.clone(), v.expires_at))
            .collect();
        if let Ok(json) = serde_json::to_string_pretty(&rows) {
            let path = self.persist_path.clone();
            let _ = tokio::task::spawn_blocking(move || {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                let _ = std::fs::write(&path, json);
            })
            .await;
        }
    }

    /// Returns the subset of `ids` not currently present (or expired).
    pub async fn filter_new<'a>(&self, ids: &'a [String]) -> Vec<&'a str> {
        let now = Utc::now();
        let map = self.inner.read().await;
        ids.iter()
            .filter(|id| !map.get(id.as_str()).is_some_and(|e| e.expires_at > now))
            .map(|s| s.as_str())
            .collect()
    }

    /// Mark each ID as seen with a fresh TTL.
    pub async fn add_many(&self, ids: &[String]) {
        let expires_at = Utc::now() + self.ttl;
        let mut map = self.inner.write().await;
        for id in ids {
            map.insert(id.clone(), Entry { expires_at });
        }
        drop(map);
        self.persist().await;
    }

    /// Sweep expired entries. Called periodically by the maintenance loop.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|_, e| e.expires_at > now);
        let removed = before - map.len();
        drop(map);
        if removed > 0 {
            self.persist().await;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn filter_new_excludes_seen_ids() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ProcessedVacancyCache::new(dir.path(), 7);
        cache.add_many(&["v1".to_string()]).await;
        let ids = vec!["v1".to_string(), "v2".to_string()];
        let new = cache.filter_new(&ids).await;
        assert_eq!(new, vec!["v2"]);
    }

    #[tokio::test]
    async fn expired_entries_are_treated_as_new() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ProcessedVacancyCache::new(dir.path(), -1);
        cache.add_many(&["v1".to_string()]).await;
        let ids = vec!["v1".to_string()];
        let new = cache.filter_new(&ids).await;
        assert_eq!(new, vec!["v1"]);
    }

    #[tokio::test]
    async fn sweep_removes_expired_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ProcessedVacancyCache::new(dir.path(), -1);
        cache.add_many(&["v1".to_string()]).await;
        let removed = cache.sweep_expired().await;
        assert_eq!(removed, 1);
    }
}
