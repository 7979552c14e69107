use std::sync::Arc;

use sa_board_client::BoardClient;
use sa_domain::config::Config;
use sa_llm::ApplicationLlm;
use sa_scheduler::SchedulerCore;
use sa_store::{ApplicationStore, ProcessedVacancyCache, RunStore, SettingsStore};

/// Shared application state passed to all inbound HTTP handlers.
///
/// The core engine (scheduler + pipeline deps) is constructed once in
/// `main.rs` and handed in here; handlers never touch a store directly when
/// a `SchedulerCore` method already exists for the operation.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: Arc<SchedulerCore>,
    pub settings: Arc<SettingsStore>,
    pub runs: Arc<RunStore>,
    pub applications: Arc<ApplicationStore>,
    pub cache: Arc<ProcessedVacancyCache>,
    pub board: Arc<BoardClient>,
    pub llm: Arc<dyn ApplicationLlm>,
    /// SHA-256 hash of the API bearer token, cached once at startup.
    /// `None` means auth is disabled (dev mode).
    pub api_token_hash: Option<Vec<u8>>,
}
