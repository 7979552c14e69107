//! Scheduling Core: owns per-user cron triggers, mutual exclusion,
//! missed-run recovery, and cooperative cancellation. An explicit service
//! value owned by the process root, not module-global state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sa_domain::config::SchedulerConfig;
use sa_domain::model::SchedulerSettings;
use sa_domain::{Error, Result};
use sa_pipeline::PipelineDeps;
use sa_store::{RunStore, SettingsStore};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::cron::{next_fire_after, parse_tz, todays_instant};

struct UserState {
    running: AtomicBool,
    cancel_requested: AtomicBool,
}

impl UserState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SchedulerStatus {
    pub up: bool,
    pub total_triggers: usize,
    pub earliest_next_run_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct UserSettingsView {
    pub settings: SchedulerSettings,
    pub next_run_at: Option<DateTime<Utc>>,
    pub is_running: bool,
}

pub struct SchedulerCore {
    config: SchedulerConfig,
    settings: Arc<SettingsStore>,
    runs: Arc<RunStore>,
    pipeline_deps: PipelineDeps,
    states: RwLock<HashMap<String, Arc<UserState>>>,
    triggers: RwLock<HashMap<String, DateTime<Utc>>>,
    up: AtomicBool,
}

impl SchedulerCore {
    pub fn new(
        config: SchedulerConfig,
        settings: Arc<SettingsStore>,
        runs: Arc<RunStore>,
        pipeline_deps: PipelineDeps,
    ) -> Self {
        Self {
            config,
            settings,
            runs,
            pipeline_deps,
            states: RwLock::new(HashMap::new()),
            triggers: RwLock::new(HashMap::new()),
            up: AtomicBool::new(false),
        }
    }

    async fn state_for(&self, user_id: &str) -> Arc<UserState> {
        if let Some(s) = self.states.read().await.get(user_id) {
            return Arc::clone(s);
        }
        let mut map = self.states.write().await;
        Arc::clone(
            map.entry(user_id.to_string())
                .or_insert_with(|| Arc::new(UserState::new())),
        )
    }

    /// Reconcile stale `running` rows, install a trigger per enabled user,
    /// and fire any catch-up runs whose miss window is still fresh.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let reconciled = self.runs.reconcile_stale_running().await;
        if reconciled > 0 {
            tracing::info!(count = reconciled, "reconciled stale running rows on startup");
        }

        let enabled = self.settings.list_enabled().await;
        let now = Utc::now();
        for settings in enabled {
            self.install_trigger(&settings, now).await;
            if self.should_catch_up(&settings, now).await {
                tracing::info!(user_id = %settings.user_id, "launching missed-run catch-up");
                let _ = self.spawn_run(settings.user_id.clone(), None).await;
            }
        }
        self.up.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Mark the scheduler down. In-flight pipelines are not waited on; they
    /// observe cancellation at their own next checkpoint if one is requested.
    pub async fn stop(&self) {
        self.up.store(false, Ordering::SeqCst);
    }

    async fn install_trigger(&self, settings: &SchedulerSettings, after: DateTime<Utc>) {
        let tz = parse_tz(&settings.timezone);
        let next = next_fire_after(settings.schedule_hour, settings.schedule_minute, &settings.schedule_days, tz, after);
        let mut triggers = self.triggers.write().await;
        match next {
            Some(at) => {
                triggers.insert(settings.user_id.clone(), at);
            }
            None => {
                triggers.remove(&settings.user_id);
            }
        }
    }

    async fn should_catch_up(&self, settings: &SchedulerSettings, now: DateTime<Utc>) -> bool {
        let tz = parse_tz(&settings.timezone);
        let local_now = now.with_timezone(&tz);
        let today_weekday = sa_domain::model::Weekday::from_chrono(local_now.date_naive().weekday());
        if !settings.schedule_days.contains(&today_weekday) {
            return false;
        }
        let Some(scheduled_instant) = todays_instant(settings.schedule_hour, settings.schedule_minute, tz, now) else {
            return false;
        };
        if now < scheduled_instant {
            return false;
        }
        let midnight_local = local_now.date_naive().and_hms_opt(0, 0, 0).unwrap();
        let midnight_utc = match tz.from_local_datetime(&midnight_local) {
            chrono::LocalResult::Single(dt) => dt.with_timezone(&Utc),
            chrono::LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            chrono::LocalResult::None => return false,
        };
        if self.runs.latest_since(&settings.user_id, midnight_utc).await.is_some() {
            return false;
        }
        let window = chrono::Duration::hours(self.config.missed_run_window_hours);
        now - scheduled_instant <= window
    }

    /// Called periodically (e.g. every `tick_interval_secs`) by the process
    /// root. Fires any user whose installed trigger has elapsed.
    pub async fn tick(self: &Arc<Self>) {
        if !self.up.load(Ordering::SeqCst) {
            return;
        }
        let now = Utc::now();
        let due: Vec<String> = {
            let triggers = self.triggers.read().await;
            triggers
                .iter()
                .filter(|(_, at)| **at <= now)
                .map(|(user_id, _)| user_id.clone())
                .collect()
        };
        for user_id in due {
            if let Some(settings) = self.settings.get(&user_id).await {
                if settings.enabled {
                    let _ = self.spawn_run(user_id.clone(), None).await;
                }
                self.install_trigger(&settings, now).await;
            }
        }
    }

    /// Upsert settings, replacing any existing trigger for this user.
    pub async fn update_user_settings(&self, settings: SchedulerSettings) -> Result<SchedulerSettings> {
        settings.validate().map_err(Error::Validation)?;
        let saved = self.settings.upsert(settings).await;
        if saved.enabled {
            self.install_trigger(&saved, Utc::now()).await;
        } else {
            self.triggers.write().await.remove(&saved.user_id);
        }
        Ok(saved)
    }

    pub async fn trigger_manual_run(self: &Arc<Self>, user_id: &str, max_override: Option<u32>) -> Result<Uuid> {
        self.spawn_run(user_id.to_string(), max_override).await
    }

    /// Set the user's cancel flag. Returns whether a job was actually running.
    pub async fn cancel_running_job(&self, user_id: &str) -> bool {
        let state = self.state_for(user_id).await;
        let was_running = state.running.load(Ordering::SeqCst);
        if was_running {
            state.cancel_requested.store(true, Ordering::SeqCst);
        }
        was_running
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        let triggers = self.triggers.read().await;
        SchedulerStatus {
            up: self.up.load(Ordering::SeqCst),
            total_triggers: triggers.len(),
            earliest_next_run_at: triggers.values().min().copied(),
        }
    }

    pub async fn get_user_settings(&self, user_id: &str) -> UserSettingsView {
        let settings = self.settings.get_or_default(user_id).await;
        let next_run_at = self.triggers.read().await.get(user_id).copied();
        let is_running = self.state_for(user_id).await.running.load(Ordering::SeqCst);
        UserSettingsView {
            settings,
            next_run_at,
            is_running,
        }
    }

    pub async fn get_run_history(&self, user_id: &str, limit: usize) -> Vec<sa_domain::model::SchedulerRunHistory> {
        self.runs.list(user_id, limit).await
    }

    /// Guard with the per-user running flag, start a run row, run the
    /// pipeline, and clear both flags in a finally-equivalent block
    /// regardless of outcome.
    async fn spawn_run(self: &Arc<Self>, user_id: String, max_override: Option<u32>) -> Result<Uuid> {
        let state = self.state_for(&user_id).await;
        if state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Validation(format!(
                "a pipeline is already running for user {user_id}"
            )));
        }
        state.cancel_requested.store(false, Ordering::SeqCst);

        let mut settings = self.settings.get_or_default(&user_id).await;
        if let Some(max) = max_override {
            settings.max_applications_per_run = max;
        }
        let run_row = self.runs.start_run(&user_id).await;
        let run_id = run_row.id;

        let this = Arc::clone(self);
        let settings_for_task = settings.clone();
        tokio::spawn(async move {
            let state = this.state_for(&settings_for_task.user_id).await;
            let cancel_state = Arc::clone(&state);
            let outcome = sa_pipeline::run(&this.pipeline_deps, run_id, &settings_for_task, move || {
                cancel_state.cancel_requested.load(Ordering::SeqCst)
            })
            .await;

            this.runs
                .finish_run(&run_id, outcome.status, outcome.error_message.clone())
                .await;
            this.settings
                .update(&settings_for_task.user_id, |s| {
                    s.last_run_at = Some(Utc::now());
                    s.last_run_status = Some(outcome.status);
                    s.last_run_applications = outcome.sent;
                    s.total_applications += outcome.sent as u64;
                })
                .await;

            state.running.store(false, Ordering::SeqCst);
            state.cancel_requested.store(false, Ordering::SeqCst);
        });

        Ok(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::Weekday;

    fn settings_with_tz(tz: &str, hour: u32, minute: u32) -> SchedulerSettings {
        let mut s = SchedulerSettings::new("u1");
        s.enabled = true;
        s.timezone = tz.to_string();
        s.schedule_hour = hour;
        s.schedule_minute = minute;
        s.schedule_days = vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri];
        s
    }

    fn core_for_test(dir: &std::path::Path) -> SchedulerCore {
        let config = SchedulerConfig::default();
        let settings = Arc::new(SettingsStore::new(dir));
        let runs = Arc::new(RunStore::new(dir));
        // Never exercised in these tests (no run_user calls), but required
        // to construct the core.
        let pipeline_deps_dir = dir.to_path_buf();
        let deps = test_pipeline_deps(&pipeline_deps_dir, runs.clone());
        SchedulerCore::new(config, settings, runs, deps)
    }

    fn test_pipeline_deps(dir: &std::path::Path, runs: Arc<RunStore>) -> PipelineDeps {
        // A SchedulerCore can be constructed without a live board/LLM; these
        // fields are only ever touched when a pipeline run is actually
        // spawned, which these unit tests (cron-installation only) avoid.
        use sa_store::{ApplicationStore, ProcessedVacancyCache};
        struct Unused;
        #[async_trait::async_trait]
        impl sa_llm::ApplicationLlm for Unused {
            async fn generate_cover_letter(
                &self,
                _vacancy: &sa_domain::model::Vacancy,
                _profile: &sa_domain::model::ApplicantProfile,
            ) -> sa_domain::Result<String> {
                unreachable!("not exercised by these tests")
            }
            async fn answer_screening_questions(
                &self,
                _questions: &[sa_domain::model::ScreeningQuestion],
                _vacancy: &sa_domain::model::Vacancy,
                _profile: &sa_domain::model::ApplicantProfile,
            ) -> sa_domain::Result<Vec<sa_domain::model::ScreeningAnswer>> {
                unreachable!("not exercised by these tests")
            }
            fn provider_id(&self) -> &str {
                "unused"
            }
        }
        let board_config = sa_domain::config::BoardConfig::default();
        let credentials = sa_board_client::BoardCredentials {
            client_id: "x".into(),
            client_secret: "x".into(),
            redirect_uri: "x".into(),
        };
        let token_store = Arc::new(sa_store::TokenStore::new(dir));
        let board = Arc::new(sa_board_client::BoardClient::new(board_config, credentials, token_store).unwrap());
        PipelineDeps {
            board,
            llm: Arc::new(Unused),
            applications: Arc::new(ApplicationStore::new(dir)),
            cache: Arc::new(ProcessedVacancyCache::new(dir, 7)),
            runs,
            board_domain: "hh.ru".to_string(),
        }
    }

    #[tokio::test]
    async fn install_trigger_computes_next_fire() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_for_test(dir.path());
        let settings = settings_with_tz("UTC", 9, 0);
        core.install_trigger(&settings, Utc::now()).await;
        let triggers = core.triggers.read().await;
        assert!(triggers.contains_key("u1"));
    }

    #[tokio::test]
    async fn status_reports_trigger_count() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_for_test(dir.path());
        let settings = settings_with_tz("UTC", 9, 0);
        core.install_trigger(&settings, Utc::now()).await;
        let status = core.get_status().await;
        assert_eq!(status.total_triggers, 1);
    }

    #[tokio::test]
    async fn cancel_before_running_is_a_no_op_reporting_false() {
        let dir = tempfile::tempdir().unwrap();
        let core = core_for_test(dir.path());
        assert!(!core.cancel_running_job("u1").await);
    }
}
