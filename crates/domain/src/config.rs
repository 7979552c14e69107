//! Root configuration, deserialized from TOML with per-field defaults so a
//! near-empty config file is always valid.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn d_host() -> String {
    "0.0.0.0".to_string()
}

fn d_port() -> u16 {
    8080
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

fn d_cors_origins() -> Vec<String> {
    vec!["http://localhost:*".to_string()]
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Shared-secret bearer token protecting the admin/control endpoints.
    /// Stored hashed once loaded; see `sa_gateway::auth`.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            cors: CorsConfig::default(),
            admin_token: None,
        }
    }
}

fn d_sched_hour() -> u32 {
    9
}
fn d_sched_minute() -> u32 {
    0
}
fn d_sched_days() -> String {
    "mon,tue,wed,thu,fri".to_string()
}
fn d_sched_tz() -> String {
    "Europe/Moscow".to_string()
}
fn d_sched_max_apps() -> u32 {
    10
}
fn d_sched_tick_secs() -> u64 {
    30
}
fn d_sched_missed_window_hours() -> i64 {
    4
}

/// Process-wide defaults applied when a user has no settings row yet, and
/// the scheduler's own tick cadence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "d_sched_hour")]
    pub default_hour: u32,
    #[serde(default = "d_sched_minute")]
    pub default_minute: u32,
    #[serde(default = "d_sched_days")]
    pub default_days: String,
    #[serde(default = "d_sched_tz")]
    pub default_timezone: String,
    #[serde(default = "d_sched_max_apps")]
    pub max_applications: u32,
    #[serde(default = "d_sched_tick_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "d_sched_missed_window_hours")]
    pub missed_run_window_hours: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_start: true,
            default_hour: d_sched_hour(),
            default_minute: d_sched_minute(),
            default_days: d_sched_days(),
            default_timezone: d_sched_tz(),
            max_applications: d_sched_max_apps(),
            tick_interval_secs: d_sched_tick_secs(),
            missed_run_window_hours: d_sched_missed_window_hours(),
        }
    }
}

fn d_board_base_url() -> String {
    "https://api.hh.ru".to_string()
}
fn d_board_token_url() -> String {
    "https://hh.ru/oauth/token".to_string()
}
fn d_board_timeout_ms() -> u64 {
    30_000
}
fn d_board_min_pacing_ms() -> u64 {
    100
}
fn d_board_max_retries() -> u32 {
    3
}
fn d_board_user_agent() -> String {
    "Mozilla/5.0 (compatible; application-engine)".to_string()
}

/// External board client configuration: credentials are read from
/// environment variables (see `HH_CLIENT_ID`, `HH_CLIENT_SECRET`,
/// `HH_REDIRECT_URI`), everything else is tunable pacing/retry policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BoardConfig {
    #[serde(default = "d_board_base_url")]
    pub base_url: String,
    #[serde(default = "d_board_token_url")]
    pub token_url: String,
    #[serde(default = "d_board_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "d_board_min_pacing_ms")]
    pub min_pacing_ms: u64,
    #[serde(default = "d_board_max_retries")]
    pub max_retries: u32,
    #[serde(default = "d_board_user_agent")]
    pub user_agent: String,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            base_url: d_board_base_url(),
            token_url: d_board_token_url(),
            request_timeout_ms: d_board_timeout_ms(),
            min_pacing_ms: d_board_min_pacing_ms(),
            max_retries: d_board_max_retries(),
            user_agent: d_board_user_agent(),
        }
    }
}

fn d_llm_provider() -> String {
    "mock".to_string()
}
fn d_llm_timeout_ms() -> u64 {
    120_000
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "d_llm_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: d_llm_provider(),
            base_url: None,
            model: None,
            timeout_ms: d_llm_timeout_ms(),
        }
    }
}

fn d_cache_ttl_days() -> i64 {
    7
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "d_cache_ttl_days")]
    pub processed_vacancy_ttl_days: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            processed_vacancy_ttl_days: d_cache_ttl_days(),
        }
    }
}

fn d_state_path() -> PathBuf {
    PathBuf::from("./state")
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_state_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: d_state_path(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub board: BoardConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Warning => "WARN",
            ConfigSeverity::Error => "ERROR",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}

impl Config {
    pub fn load_or_default(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match toml::from_str::<Config>(&raw) {
                Ok(mut cfg) => {
                    cfg.apply_env_overrides();
                    cfg
                }
                Err(e) => {
                    tracing::warn!(error = %e, path, "failed to parse config, using defaults");
                    let mut cfg = Config::default();
                    cfg.apply_env_overrides();
                    cfg
                }
            },
            Err(_) => {
                tracing::info!(path, "no config file found, using defaults");
                let mut cfg = Config::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SCHEDULER_ENABLED") {
            self.scheduler.enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("SCHEDULER_AUTO_START") {
            self.scheduler.auto_start = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("SCHEDULER_DEFAULT_HOUR") {
            if let Ok(n) = v.parse() {
                self.scheduler.default_hour = n;
            }
        }
        if let Ok(v) = std::env::var("SCHEDULER_DEFAULT_MINUTE") {
            if let Ok(n) = v.parse() {
                self.scheduler.default_minute = n;
            }
        }
        if let Ok(v) = std::env::var("SCHEDULER_DEFAULT_DAYS") {
            self.scheduler.default_days = v;
        }
        if let Ok(v) = std::env::var("SCHEDULER_DEFAULT_TIMEZONE") {
            self.scheduler.default_timezone = v;
        }
        if let Ok(v) = std::env::var("SCHEDULER_MAX_APPLICATIONS") {
            if let Ok(n) = v.parse() {
                self.scheduler.max_applications = n;
            }
        }
        if let Ok(v) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = v;
        }
    }

    /// Startup validation. Does not panic; callers decide what to do with
    /// `Error`-severity issues (the `doctor` CLI treats any as fatal).
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.scheduler.default_hour > 23 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "scheduler.default_hour must be 0-23".to_string(),
            });
        }
        if self.scheduler.default_minute > 59 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "scheduler.default_minute must be 0-59".to_string(),
            });
        }
        if self.scheduler.default_timezone.parse::<chrono_tz::Tz>().is_err() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: format!(
                    "scheduler.default_timezone {:?} is not a recognized IANA zone, falling back to UTC",
                    self.scheduler.default_timezone
                ),
            });
        }
        if std::env::var("HH_CLIENT_ID").is_err() || std::env::var("HH_CLIENT_SECRET").is_err() {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "HH_CLIENT_ID / HH_CLIENT_SECRET not set; OAuth flows will fail"
                    .to_string(),
            });
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_shape() {
        let cfg = Config::default();
        assert_eq!(cfg.scheduler.default_hour, 9);
        assert_eq!(cfg.scheduler.default_days, "mon,tue,wed,thu,fri");
        assert_eq!(cfg.scheduler.max_applications, 10);
        assert_eq!(cfg.cache.processed_vacancy_ttl_days, 7);
    }

    #[test]
    fn empty_toml_deserializes_to_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.board.max_retries, 3);
    }

    #[test]
    fn validate_flags_bad_hour() {
        let mut cfg = Config::default();
        cfg.scheduler.default_hour = 99;
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("default_hour")));
    }

    #[test]
    fn validate_flags_unknown_timezone() {
        let mut cfg = Config::default();
        cfg.scheduler.default_timezone = "Not/AZone".to_string();
        let issues = cfg.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Warning && i.message.contains("timezone")));
    }

    #[test]
    fn partial_toml_overrides_only_given_fields() {
        let toml_str = r#"
            [scheduler]
            default_hour = 14
        "#;
        let cfg: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.scheduler.default_hour, 14);
        assert_eq!(cfg.scheduler.default_minute, 0);
        assert_eq!(cfg.scheduler.max_applications, 10);
    }
}
