//! Data model: scheduler settings, run history, application history, tokens,
//! and the transient vacancy/resume records fetched from the external board.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn default_schedule_hour() -> u32 {
    9
}

fn default_schedule_minute() -> u32 {
    0
}

fn default_schedule_days() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
    ]
}

fn default_timezone() -> String {
    "Europe/Moscow".to_string()
}

fn default_max_applications() -> u32 {
    10
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl Weekday {
    /// Map from `chrono::Weekday` (used to compare against "now" in a timezone).
    pub fn from_chrono(d: chrono::Weekday) -> Self {
        match d {
            chrono::Weekday::Mon => Weekday::Mon,
            chrono::Weekday::Tue => Weekday::Tue,
            chrono::Weekday::Wed => Weekday::Wed,
            chrono::Weekday::Thu => Weekday::Thu,
            chrono::Weekday::Fri => Weekday::Fri,
            chrono::Weekday::Sat => Weekday::Sat,
            chrono::Weekday::Sun => Weekday::Sun,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExperienceLevel {
    NoExperience,
    Between1And3,
    Between3And6,
    MoreThan6,
}

/// Embedded structured search criteria — what the user wants applied to.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SearchCriteria {
    pub position: String,
    pub resume_id: String,
    #[serde(default)]
    pub skills: Option<String>,
    #[serde(default)]
    pub experience: Option<String>,
    #[serde(default)]
    pub exclude_companies: Vec<String>,
    #[serde(default)]
    pub salary_min: Option<i64>,
    #[serde(default)]
    pub remote_only: bool,
    #[serde(default)]
    pub experience_level: Option<ExperienceLevel>,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub excluded_keywords: Vec<String>,
    #[serde(default)]
    pub employment_types: Vec<String>,
    #[serde(default)]
    pub preferred_schedule: Vec<String>,
    #[serde(default = "default_true")]
    pub use_cover_letter: bool,
}

fn default_true() -> bool {
    true
}

/// Per-user persisted scheduler configuration. One row per user (`user_id`
/// defaults to the single-tenant constant, see [`DEFAULT_USER_ID`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub user_id: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_schedule_hour")]
    pub schedule_hour: u32,
    #[serde(default = "default_schedule_minute")]
    pub schedule_minute: u32,
    #[serde(default = "default_schedule_days")]
    pub schedule_days: Vec<Weekday>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_max_applications")]
    pub max_applications_per_run: u32,
    #[serde(default)]
    pub resume_id: Option<String>,
    #[serde(default)]
    pub search_criteria: Option<SearchCriteria>,
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_run_status: Option<RunStatus>,
    #[serde(default)]
    pub last_run_applications: u32,
    #[serde(default)]
    pub total_applications: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SchedulerSettings {
    pub const DEFAULT_USER_ID: &'static str = "default";

    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            enabled: false,
            schedule_hour: default_schedule_hour(),
            schedule_minute: default_schedule_minute(),
            schedule_days: default_schedule_days(),
            timezone: default_timezone(),
            max_applications_per_run: default_max_applications(),
            resume_id: None,
            search_criteria: None,
            last_run_at: None,
            last_run_status: None,
            last_run_applications: 0,
            total_applications: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Enabling a schedule without a usable search is an invalid combination;
    /// make it unrepresentable rather than a runtime check at the edges.
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled {
            match &self.search_criteria {
                Some(c) if !c.position.trim().is_empty() => Ok(()),
                _ => Err("enabled schedule requires search_criteria.position".to_string()),
            }
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Interrupted,
}

/// One row per pipeline run, append-only, updated incrementally while running.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerRunHistory {
    pub id: Uuid,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default)]
    pub applications_sent: u32,
    #[serde(default)]
    pub applications_skipped: u32,
    #[serde(default)]
    pub applications_failed: u32,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl SchedulerRunHistory {
    pub fn start(user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            applications_sent: 0,
            applications_skipped: 0,
            applications_failed: 0,
            error_message: None,
            details: None,
        }
    }
}

/// Authoritative "already applied" record, independent of the board's own
/// bookkeeping (which may be paginated, rate-limited, or simply wrong).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApplicationHistory {
    pub id: Uuid,
    pub user_id: String,
    pub vacancy_id: String,
    pub resume_id: String,
    pub vacancy_title: Option<String>,
    pub employer_name: Option<String>,
    pub applied_at: DateTime<Utc>,
}

/// OAuth token record for the external board. The most recent row wins.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub obtained_at: DateTime<Utc>,
}

/// Safety buffer subtracted from `expires_in` before a token is considered
/// usable for a new request. Refresh is attempted proactively inside this
/// window rather than waiting for the board to reject the request outright.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

impl Token {
    /// Mirrors the bare model check: no buffer, true expiry.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.obtained_at + chrono::Duration::seconds(self.expires_in)
    }

    /// The call-site check used before dispatching a request: true once we
    /// are within `buffer_secs` of the hard expiry, so a refresh has time to
    /// complete before the token is actually rejected.
    pub fn needs_refresh(&self, buffer_secs: i64) -> bool {
        Utc::now()
            > self.obtained_at + chrono::Duration::seconds(self.expires_in - buffer_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Transient records fetched from the external board
// ─────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Employer {
    #[serde(default)]
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct KeySkill {
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Snippet {
    #[serde(default)]
    pub requirement: Option<String>,
    #[serde(default)]
    pub responsibility: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct IdName {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Salary {
    #[serde(default)]
    pub from: Option<i64>,
    #[serde(default)]
    pub to: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct VacancyTest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct BrandedTemplate {
    #[serde(default)]
    pub external_form_url: Option<String>,
}

/// A job posting as returned by the external board's search and detail
/// endpoints. Fields not needed by the pipeline are dropped on the way in;
/// this is a total, statically-checkable view, not a raw JSON passthrough.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Vacancy {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub employer: Employer,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub relations: Vec<String>,
    #[serde(default)]
    pub response_letter_required: bool,
    #[serde(default)]
    pub test: Option<VacancyTest>,
    #[serde(default)]
    pub branded_template: Option<BrandedTemplate>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub key_skills: Vec<KeySkill>,
    #[serde(default)]
    pub snippet: Option<Snippet>,
    #[serde(default)]
    pub schedule: Option<IdName>,
    #[serde(default)]
    pub employment: Option<IdName>,
    #[serde(default)]
    pub salary: Option<Salary>,
}

impl Vacancy {
    /// Haystack used by filter substring matching: name + description,
    /// lower-cased. Deliberately excludes `snippet` (HH's truncated
    /// requirement/responsibility teaser) — that text is for prompting the
    /// LLM, not for required-skill/excluded-keyword matching.
    pub fn search_text(&self) -> String {
        let mut text = self.name.to_lowercase();
        if let Some(d) = &self.description {
            text.push(' ');
            text.push_str(&d.to_lowercase());
        }
        text
    }

    pub fn key_skill_names_lower(&self) -> HashSet<String> {
        self.key_skills
            .iter()
            .map(|k| k.name.to_lowercase())
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ScreeningQuestion {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub required_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScreeningAnswer {
    pub question_id: String,
    pub answer: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ResumeExperienceEntry {
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ResumeSkill {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ResumeContact {
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Resume {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub experience: Vec<ResumeExperienceEntry>,
    #[serde(default)]
    pub skill_set: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Flattened view of a resume, built for the LLM collaborator and for
/// fallback form fields when the resume itself is sparse.
#[derive(Clone, Debug, Default)]
pub struct ApplicantProfile {
    pub name: String,
    pub email: String,
    pub skills_csv: String,
    pub experience_text: String,
}
