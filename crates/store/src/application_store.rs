//! Authoritative `(vacancy_id, resume_id)` application ledger.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use sa_domain::model::ApplicationHistory;
use tokio::sync::RwLock;
use uuid::Uuid;

pub struct ApplicationStore {
    inner: RwLock<HashMap<Uuid, ApplicationHistory>>,
    persist_path: PathBuf,
}

fn key(vacancy_id: &str, resume_id: &str) -> String {
    format!("{vacancy_id}::{resume_id}")
}

impl ApplicationStore {
    pub fn new(state_dir: &std::path::Path) -> Self {
        let persist_path = state_dir.join("application_history.json");
        let mut map = HashMap::new();
        if let Ok(data) = std::fs::read_to_string(&persist_path) {
            if let Ok(rows) = serde_json::from_str::<Vec<ApplicationHistory>>(&data) {
                for row in rows {
                    map.insert(row.id, row);
                }
            }
        }
        tracing::info!(count = map.len(), "loaded application history from disk");
        Self {
            inner: RwLock::new(map),
            persist_path,
        }
    }

    async fn persist(&self) {
        let map = self.inner.read().await;
        let rows: Vec<&ApplicationHistory> = map.values().collect();
        if let Ok(json) = serde_json::to_string_pretty(&rows) {
            let path = self.persist_path.clone();
            let _ = tokio::task::spawn_blocking(move || {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(&path, json) {
                    tracing::warn!(error = %e, "failed to persist application history");
                }
            })
            .await;
        }
    }

    pub async fn has_applied(&self, vacancy_id: &str, resume_id: &str) -> bool {
        let target = key(vacancy_id, resume_id);
        self.inner
            .read()
            .await
            .values()
            .any(|r| key(&r.vacancy_id, &r.resume_id) == target)
    }

    /// All vacancy IDs this user has a durable record of applying to, for a
    /// given resume. Used to seed the pipeline's baseline de-dup set
    /// alongside the board's own `/negotiations` list.
    pub async fn applied_vacancy_ids(&self, user_id: &str, resume_id: &str) -> HashSet<String> {
        self.inner
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id && r.resume_id == resume_id)
            .map(|r| r.vacancy_id.clone())
            .collect()
    }

    pub async fn record(
        &self,
        user_id: &str,
        vacancy_id: &str,
        resume_id: &str,
        vacancy_title: Option<String>,
        employer_name: Option<String>,
    ) -> ApplicationHistory {
        let row = ApplicationHistory {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            vacancy_id: vacancy_id.to_string(),
            resume_id: resume_id.to_string(),
            vacancy_title,
            employer_name,
            applied_at: Utc::now(),
        };
        let mut map = self.inner.write().await;
        map.insert(row.id, row.clone());
        drop(map);
        self.persist().await;
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_then_has_applied_is_true() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApplicationStore::new(dir.path());
        assert!(!store.has_applied("v1", "r1").await);
        store.record("u1", "v1", "r1", None, None).await;
        assert!(store.has_applied("v1", "r1").await);
    }

    #[tokio::test]
    async fn different_resume_is_not_a_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApplicationStore::new(dir.path());
        store.record("u1", "v1", "r1", None, None).await;
        assert!(!store.has_applied("v1", "r2").await);
    }

    #[tokio::test]
    async fn applied_vacancy_ids_scoped_to_user_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let store = ApplicationStore::new(dir.path());
        store.record("u1", "v1", "r1", None, None).await;
        store.record("u1", "v2", "r2", None, None).await;
        store.record("u2", "v3", "r1", None, None).await;
        let ids = store.applied_vacancy_ids("u1", "r1").await;
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("v1"));
    }
}
