//! Append-only scheduler run history, with a live broadcast of progress
//! events for SSE consumers and a startup reconciler for stale `running` rows.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use sa_domain::model::{RunStatus, SchedulerRunHistory};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

pub const MAX_PAGE_LIMIT: usize = 200;

#[derive(Clone, Debug, serde::Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Start {
        run_id: Uuid,
        total_candidates: usize,
    },
    Progress {
        run_id: Uuid,
        current: usize,
        total: usize,
        success_count: u32,
        skipped_count: u32,
        error_count: u32,
        message: String,
    },
    Complete {
        run_id: Uuid,
        success_count: u32,
        skipped_count: u32,
        error_count: u32,
    },
    Cancelled {
        run_id: Uuid,
        success_count: u32,
        skipped_count: u32,
        error_count: u32,
    },
    Error {
        run_id: Uuid,
        message: String,
    },
}

pub struct RunStore {
    inner: RwLock<HashMap<Uuid, SchedulerRunHistory>>,
    persist_path: PathBuf,
    event_tx: broadcast::Sender<ProgressEvent>,
}

impl RunStore {
    pub fn new(state_dir: &std::path::Path) -> Self {
        let persist_path = state_dir.join("scheduler_run_history.json");
        let mut map = HashMap::new();
        if let Ok(data) = std::fs::read_to_string(&persist_path) {
            if let Ok(rows) = serde_json::from_str::<Vec<SchedulerRunHistory>>(&data) {
                for row in rows {
                    map.insert(row.id, row);
                }
            }
        }
        tracing::info!(count = map.len(), "loaded run history from disk");
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: RwLock::new(map),
            persist_path,
            event_tx,
        }
    }

    async fn persist(&self) {
        let map = self.inner.read().await;
        let mut rows: Vec<&SchedulerRunHistory> = map.values().collect();
        rows.sort_by_key(|r| r.started_at);
        if let Ok(json) = serde_json::to_string_pretty(&rows) {
            let path = self.persist_path.clone();
            let _ = tokio::task::spawn_blocking(move || {
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                if let Err(e) = std::fs::write(&path, json) {
                    tracing::warn!(error = %e, "failed to persist run history");
                }
            })
            .await;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.event_tx.subscribe()
    }

    pub async fn start_run(&self, user_id: &str) -> SchedulerRunHistory {
        let run = SchedulerRunHistory::start(user_id);
        let mut map = self.inner.write().await;
        map.insert(run.id, run.clone());
        drop(map);
        self.persist().await;
        run
    }

    pub async fn get(&self, run_id: &Uuid) -> Option<SchedulerRunHistory> {
        self.inner.read().await.get(run_id).cloned()
    }

    /// Write all three counters in one transaction (one lock scope).
    pub async fn update_progress(&self, run_id: &Uuid, sent: u32, skipped: u32, failed: u32) {
        let mut map = self.inner.write().await;
        if let Some(row) = map.get_mut(run_id) {
            row.applications_sent = sent;
            row.applications_skipped = skipped;
            row.applications_failed = failed;
        }
        drop(map);
        self.persist().await;
    }

    pub async fn finish_run(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        error_message: Option<String>,
    ) -> Option<SchedulerRunHistory> {
        let mut map = self.inner.write().await;
        let row = map.get_mut(run_id)?;
        row.status = status;
        row.finished_at = Some(Utc::now());
        row.error_message = error_message;
        let out = row.clone();
        drop(map);
        self.persist().await;
        Some(out)
    }

    pub fn emit(&self, event: ProgressEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Most recent row for a user started on/after `since`.
    pub async fn latest_since(
        &self,
        user_id: &str,
        since: chrono::DateTime<Utc>,
    ) -> Option<SchedulerRunHistory> {
        self.inner
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id && r.started_at >= since)
            .max_by_key(|r| r.started_at)
            .cloned()
    }

    /// History page, newest first.
    pub async fn list(&self, user_id: &str, limit: usize) -> Vec<SchedulerRunHistory> {
        let limit = limit.min(MAX_PAGE_LIMIT);
        let mut rows: Vec<SchedulerRunHistory> = self
            .inner
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        rows.truncate(limit);
        rows
    }

    /// Startup reconciliation: any row still `running` belongs to a process
    /// that no longer exists. Rewrite to `interrupted`. Returns the count.
    pub async fn reconcile_stale_running(&self) -> usize {
        let mut map = self.inner.write().await;
        let mut count = 0;
        for row in map.values_mut() {
            if row.status == RunStatus::Running {
                row.status = RunStatus::Interrupted;
                row.finished_at = Some(Utc::now());
                count += 1;
            }
        }
        drop(map);
        if count > 0 {
            self.persist().await;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_and_finish_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        let run = store.start_run("u1").await;
        store.update_progress(&run.id, 2, 1, 0).await;
        let finished = store
            .finish_run(&run.id, RunStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(finished.applications_sent, 2);
        assert_eq!(finished.status, RunStatus::Completed);
        assert!(finished.finished_at.is_some());
    }

    #[tokio::test]
    async fn reconcile_marks_running_rows_interrupted() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        store.start_run("u1").await;
        store.start_run("u1").await;
        let n = store.reconcile_stale_running().await;
        assert_eq!(n, 2);
        let history = store.list("u1", 10).await;
        assert!(history.iter().all(|r| r.status == RunStatus::Interrupted));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        for _ in 0..5 {
            store.start_run("u1").await;
        }
        let rows = store.list("u1", 3).await;
        assert_eq!(rows.len(), 3);
        assert!(rows[0].started_at >= rows[1].started_at);
    }

    #[tokio::test]
    async fn latest_since_filters_by_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path());
        store.start_run("u1").await;
        let future_cutoff = Utc::now() + chrono::Duration::seconds(10);
        assert!(store.latest_since("u1", future_cutoff).await.is_none());
        let past_cutoff = Utc::now() - chrono::Duration::seconds(10);
        assert!(store.latest_since("u1", past_cutoff).await.is_some());
    }
}
