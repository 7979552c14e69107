//! Persistent per-user scheduler settings.

use std::collections::HashMap;
use std::path::PathBuf;

use sa_domain::model::SchedulerSettings;
use tokio::sync::RwLock;

pub struct SettingsStore {
    inner: RwLock<HashMap<String, SchedulerSettings>>,
    persist_path: PathBuf,
}

impl SettingsStore {
    pub fn new(state_dir: &std::path::Path) -> Self {
        let persist_path = state_dir.join("scheduler_settings.json");
        let mut map = HashMap::new();
        if let Ok(data) = std::fs::read_to_string(&persist_path) {
            if let Ok(rows) = serde_json::from_str::<Vec<SchedulerSettings>>(&data) {
                for row in rows {
                    map.insert(row.user_id.clone(), row);
                }
            }
        }
        tracing::info!(count = map.len(), "loaded scheduler settings from disk");
        Self {
            inner: RwLock::new(map),
            persist_path,
        }
    }

    async fn persist(&self) {
        let map = self.inner.read().await;
        let rows: Vec<&SchedulerSettings> = map.values().collect();
        if let Ok(json) = serde_json::to_string_pretty(&rows) {
            let path = self.persist_path.clone();
            let _ = tokio::task::spawn_blocking(move || {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(&path, json) {
                    tracing::warn!(error = %e, "failed to persist scheduler settings");
                }
            })
            .await;
        }
    }

    pub async fn get(&self, user_id: &str) -> Option<SchedulerSettings> {
        self.inner.read().await.get(user_id).cloned()
    }

    pub async fn get_or_default(&self, user_id: &str) -> SchedulerSettings {
        self.get(user_id)
            .await
            .unwrap_or_else(|| SchedulerSettings::new(user_id))
    }

    pub async fn list_enabled(&self) -> Vec<SchedulerSettings> {
        self.inner
            .read()
            .await
            .values()
            .filter(|s| s.enabled)
            .cloned()
            .collect()
    }

    /// Insert or replace a user's settings wholesale, persisting afterwards.
    pub async fn upsert(&self, settings: SchedulerSettings) -> SchedulerSettings {
        let mut map = self.inner.write().await;
        map.insert(settings.user_id.clone(), settings.clone());
        drop(map);
        self.persist().await;
        settings
    }

    /// Apply a mutation to an existing row (or a freshly-defaulted one),
    /// bumping `updated_at`, then persist. Returns the updated row.
    pub async fn update(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut SchedulerSettings),
    ) -> SchedulerSettings {
        let mut map = self.inner.write().await;
        let entry = map
            .entry(user_id.to_string())
            .or_insert_with(|| SchedulerSettings::new(user_id));
        f(entry);
        entry.updated_at = chrono::Utc::now();
        let out = entry.clone();
        drop(map);
        self.persist().await;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        let s = SchedulerSettings::new("u1");
        store.upsert(s.clone()).await;
        let loaded = store.get("u1").await.unwrap();
        assert_eq!(loaded.user_id, "u1");
        assert_eq!(loaded.schedule_hour, 9);
    }

    #[tokio::test]
    async fn reload_from_disk_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SettingsStore::new(dir.path());
            store.upsert(SchedulerSettings::new("u1")).await;
        }
        let store2 = SettingsStore::new(dir.path());
        assert!(store2.get("u1").await.is_some());
    }

    #[tokio::test]
    async fn list_enabled_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        let mut a = SchedulerSettings::new("a");
        a.enabled = true;
        a.search_criteria = Some(Default::default());
        store.upsert(a).await;
        store.upsert(SchedulerSettings::new("b")).await;
        let enabled = store.list_enabled().await;
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].user_id, "a");
    }

    #[tokio::test]
    async fn update_creates_default_row_if_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path());
        let out = store.update("new-user", |s| s.schedule_hour = 14).await;
        assert_eq!(out.schedule_hour, 14);
    }
}
