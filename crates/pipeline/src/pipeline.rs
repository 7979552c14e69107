//! Orchestrates one run: discovery → filter → build artifacts → submit →
//! record. Emits a lazy sequence of progress events through the run store.

use std::collections::HashSet;
use std::sync::OnceLock;
use std::time::Duration;

use rand::Rng;
use regex::Regex;
use sa_board_client::BoardClient;
use sa_domain::model::{RunStatus, SchedulerSettings, ScreeningQuestion, Vacancy};
use sa_domain::Error;
use sa_llm::ApplicationLlm;
use sa_store::{ApplicationStore, ProcessedVacancyCache, ProgressEvent, RunStore};
use std::sync::Arc;
use uuid::Uuid;

use crate::discovery::parse_position_queries;
use crate::filter::should_apply;
use crate::profile::build_profile;

const MAX_DISCOVERY_PAGES_PER_QUERY: u32 = 3;
const DISCOVERY_MULTIPLIER: u32 = 3;
const MIN_COVER_LETTER_LEN: usize = 50;
const CIRCUIT_BREAKER_THRESHOLD: u32 = 3;
const UNANSWERABLE_PHRASES: &[&str] = &[
    "пройдите тест по ссылке",
    "перейдите по ссылке",
    "complete the test at",
    "follow the link",
];

/// Shared collaborators a pipeline run needs. Cheap to clone (all `Arc`s);
/// constructed once at process startup and handed to every run.
#[derive(Clone)]
pub struct PipelineDeps {
    pub board: Arc<BoardClient>,
    pub llm: Arc<dyn ApplicationLlm>,
    pub applications: Arc<ApplicationStore>,
    pub cache: Arc<ProcessedVacancyCache>,
    pub runs: Arc<RunStore>,
    pub board_domain: String,
}

pub struct RunOutcome {
    pub status: RunStatus,
    pub sent: u32,
    pub skipped: u32,
    pub failed: u32,
    pub error_message: Option<String>,
}

/// Per-run adaptive pacing state (§4.2 step 4). Deliberately not a field of
/// `PipelineDeps` — two concurrent users' runs must not share this state.
struct AdaptiveDelay {
    seconds: f64,
}

impl AdaptiveDelay {
    fn new() -> Self {
        Self { seconds: 3.0 }
    }

    fn on_success(&mut self) -> Duration {
        self.seconds = (self.seconds * 0.8).max(2.0);
        jittered(self.seconds, 0.0, 2.0)
    }

    fn on_rate_limit_error(&mut self) -> Duration {
        self.seconds = (self.seconds * 1.5).min(30.0);
        jittered(self.seconds, 10.0, 30.0)
    }

    fn on_other_error(&mut self) -> Duration {
        self.seconds = (self.seconds * 1.5).min(30.0);
        jittered(self.seconds * 0.5, 5.0, 15.0)
    }
}

fn jittered(base: f64, jitter_lo: f64, jitter_hi: f64) -> Duration {
    let jitter = rand::thread_rng().gen_range(jitter_lo..=jitter_hi);
    Duration::from_secs_f64(base + jitter)
}

enum SingleOutcome {
    Success,
    Skipped(String),
    Error(String),
}

/// Run the full pipeline for one user. `cancel_requested` is polled at every
/// checkpoint; the scheduler is responsible for creating the run row
/// (`RunStore::start_run`) before calling this and finalizing it
/// (`RunStore::finish_run`) with the returned outcome.
pub async fn run(
    deps: &PipelineDeps,
    run_id: Uuid,
    settings: &SchedulerSettings,
    cancel_requested: impl Fn() -> bool,
) -> RunOutcome {
    let user_id = settings.user_id.clone();
    let resume_id = settings.resume_id.clone().unwrap_or_default();
    let criteria = match &settings.search_criteria {
        Some(c) => c.clone(),
        None => {
            deps.runs.emit(ProgressEvent::Error {
                run_id,
                message: "no search criteria configured".to_string(),
            });
            return RunOutcome {
                status: RunStatus::Failed,
                sent: 0,
                skipped: 0,
                failed: 0,
                error_message: Some("no search criteria configured".to_string()),
            };
        }
    };
    let max_applications = settings.max_applications_per_run;

    deps.runs.emit(ProgressEvent::Start {
        run_id,
        total_candidates: 0,
    });

    // Step 1: baseline already-applied set (board + durable history).
    let mut baseline = deps.board.applied_vacancy_ids().await;
    baseline.extend(deps.applications.applied_vacancy_ids(&user_id, &resume_id).await);

    // Step 2: discovery.
    let candidates = discover_candidates(deps, &criteria, max_applications).await;
    let total = candidates.len();

    let mut success_count = 0u32;
    let mut skipped_count = 0u32;
    let mut error_count = 0u32;
    let mut consecutive_errors = 0u32;
    let mut delay = AdaptiveDelay::new();

    for (idx, vacancy) in candidates.iter().enumerate() {
        if cancel_requested() {
            deps.runs.emit(ProgressEvent::Cancelled {
                run_id,
                success_count,
                skipped_count,
                error_count,
            });
            return RunOutcome {
                status: RunStatus::Completed,
                sent: success_count,
                skipped: skipped_count,
                failed: error_count,
                error_message: None,
            };
        }

        if success_count >= max_applications {
            break;
        }

        if consecutive_errors >= CIRCUIT_BREAKER_THRESHOLD {
            let message = "Too many consecutive errors, stopping".to_string();
            deps.runs.emit(ProgressEvent::Error {
                run_id,
                message: message.clone(),
            });
            return RunOutcome {
                status: RunStatus::Failed,
                sent: success_count,
                skipped: skipped_count,
                failed: error_count,
                error_message: Some(message),
            };
        }

        let (outcome, is_rate_limited) = if baseline.contains(&vacancy.id) {
            (SingleOutcome::Skipped("Already applied (HH.ru)".to_string()), false)
        } else {
            let filter_result = should_apply(vacancy, &criteria);
            if !filter_result.accept {
                deps.cache.add_many(std::slice::from_ref(&vacancy.id)).await;
                (
                    SingleOutcome::Skipped(filter_result.reason.unwrap_or_default()),
                    false,
                )
            } else {
                let result = apply_single(deps, &user_id, &resume_id, vacancy, criteria.use_cover_letter).await;
                deps.cache.add_many(std::slice::from_ref(&vacancy.id)).await;
                let rate_limited = matches!(&result, SingleOutcome::Error(msg) if msg.contains("429") || msg.contains("403"));
                (result, rate_limited)
            }
        };

        let message = match &outcome {
            SingleOutcome::Success => {
                success_count += 1;
                consecutive_errors = 0;
                format!("Applied to {}", vacancy.name)
            }
            SingleOutcome::Skipped(reason) => {
                skipped_count += 1;
                consecutive_errors = 0;
                reason.clone()
            }
            SingleOutcome::Error(reason) => {
                error_count += 1;
                consecutive_errors += 1;
                reason.clone()
            }
        };

        deps.runs
            .update_progress(&run_id, success_count, skipped_count, error_count)
            .await;
        deps.runs.emit(ProgressEvent::Progress {
            run_id,
            current: idx + 1,
            total,
            success_count,
            skipped_count,
            error_count,
            message,
        });

        let sleep_for = match &outcome {
            SingleOutcome::Success => delay.on_success(),
            SingleOutcome::Error(_) if is_rate_limited => delay.on_rate_limit_error(),
            SingleOutcome::Error(_) => delay.on_other_error(),
            SingleOutcome::Skipped(_) => Duration::from_millis(0),
        };
        if !sleep_for.is_zero() {
            tokio::time::sleep(sleep_for).await;
        }
    }

    deps.runs.emit(ProgressEvent::Complete {
        run_id,
        success_count,
        skipped_count,
        error_count,
    });
    RunOutcome {
        status: RunStatus::Completed,
        sent: success_count,
        skipped: skipped_count,
        failed: error_count,
        error_message: None,
    }
}

async fn discover_candidates(
    deps: &PipelineDeps,
    criteria: &sa_domain::model::SearchCriteria,
    max_applications: u32,
) -> Vec<Vacancy> {
    let queries = parse_position_queries(&criteria.position);
    let cap = (max_applications as usize) * DISCOVERY_MULTIPLIER as usize;

    let experience = criteria.experience_level.map(experience_level_id);
    let schedule = if criteria.remote_only {
        Some("remote".to_string())
    } else if criteria.preferred_schedule.len() == 1 {
        Some(criteria.preferred_schedule[0].clone())
    } else {
        None
    };
    let employment = if criteria.employment_types.len() == 1 {
        Some(criteria.employment_types[0].clone())
    } else {
        None
    };

    let mut candidates = Vec::new();
    let mut seen = HashSet::new();

    'queries: for query in &queries {
        for page in 0..MAX_DISCOVERY_PAGES_PER_QUERY {
            let result = deps
                .board
                .search_vacancies(
                    query,
                    page,
                    experience,
                    schedule.as_deref(),
                    employment.as_deref(),
                    criteria.salary_min,
                    criteria.salary_min.is_some(),
                )
                .await;
            let vacancies = match result {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(query, page, error = %e, "discovery search page failed");
                    break;
                }
            };
            if vacancies.is_empty() {
                break;
            }
            let ids: Vec<String> = vacancies.iter().map(|v| v.id.clone()).collect();
            let fresh_ids: HashSet<&str> = deps.cache.filter_new(&ids).await.into_iter().collect();
            for vacancy in vacancies {
                if !fresh_ids.contains(vacancy.id.as_str()) {
                    continue;
                }
                if seen.insert(vacancy.id.clone()) {
                    candidates.push(vacancy);
                }
            }
            if candidates.len() >= cap {
                break 'queries;
            }
        }
        if candidates.len() >= cap {
            break;
        }
    }

    candidates
}

fn experience_level_id(level: sa_domain::model::ExperienceLevel) -> &'static str {
    use sa_domain::model::ExperienceLevel::*;
    match level {
        NoExperience => "noExperience",
        Between1And3 => "between1And3",
        Between3And6 => "between3And6",
        MoreThan6 => "moreThan6",
    }
}

async fn apply_single(
    deps: &PipelineDeps,
    user_id: &str,
    resume_id: &str,
    candidate: &Vacancy,
    use_cover_letter: bool,
) -> SingleOutcome {
    if resume_id.trim().is_empty() {
        return SingleOutcome::Error("resume_id is required".to_string());
    }

    if deps.applications.has_applied(&candidate.id, resume_id).await {
        return SingleOutcome::Skipped("Already applied to this vacancy".to_string());
    }

    let vacancy = match deps.board.vacancy_detail(&candidate.id).await {
        Ok(v) => v,
        Err(e) => return SingleOutcome::Error(e.to_string()),
    };

    if vacancy.archived {
        return SingleOutcome::Skipped("Vacancy is archived".to_string());
    }
    if vacancy
        .relations
        .iter()
        .any(|r| r == "got_response" || r == "response")
    {
        return SingleOutcome::Skipped("Already responded".to_string());
    }
    if vacancy.response_letter_required && !use_cover_letter {
        return SingleOutcome::Skipped("Requires a cover letter".to_string());
    }
    if requires_external_test(&vacancy, &deps.board_domain) {
        return SingleOutcome::Skipped("Requires an external test".to_string());
    }

    let resume = match deps.board.resume_detail(resume_id).await {
        Ok(r) => r,
        Err(e) => return SingleOutcome::Error(e.to_string()),
    };
    let profile = build_profile(&resume, "", "");

    let cover_letter = if use_cover_letter {
        match deps.llm.generate_cover_letter(&vacancy, &profile).await {
            Ok(letter) => {
                if letter.trim().chars().count() < MIN_COVER_LETTER_LEN {
                    return SingleOutcome::Error("Generated cover letter is too short".to_string());
                }
                Some(letter)
            }
            Err(e) => return SingleOutcome::Error(e.to_string()),
        }
    } else {
        None
    };

    let questions = deps.board.vacancy_questions(&candidate.id).await.unwrap_or_default();
    let answerable: Vec<ScreeningQuestion> = questions
        .into_iter()
        .filter(|q| !is_unanswerable(q, &deps.board_domain))
        .collect();
    let answers = if answerable.is_empty() {
        Vec::new()
    } else {
        match deps
            .llm
            .answer_screening_questions(&answerable, &vacancy, &profile)
            .await
        {
            Ok(a) => a,
            Err(e) => return SingleOutcome::Error(e.to_string()),
        }
    };

    match deps
        .board
        .apply(&candidate.id, resume_id, cover_letter.as_deref(), &answers)
        .await
    {
        Ok(()) => {
            deps.applications
                .record(
                    user_id,
                    &candidate.id,
                    resume_id,
                    Some(vacancy.name.clone()),
                    Some(vacancy.employer.name.clone()),
                )
                .await;
            SingleOutcome::Success
        }
        Err(e) => classify_apply_error(&e),
    }
}

fn classify_apply_error(error: &Error) -> SingleOutcome {
    match error {
        Error::ExternalApi { status: 400, .. } => {
            SingleOutcome::Skipped("Duplicate application".to_string())
        }
        Error::ExternalApi { status: 403, message } if message.to_lowercase().contains("test") => {
            SingleOutcome::Skipped("Requires an external test".to_string())
        }
        Error::ExternalApi { status: 403, .. } => {
            SingleOutcome::Skipped("Application denied".to_string())
        }
        Error::ExternalApi { status: 404, .. } => {
            SingleOutcome::Skipped("Vacancy not found".to_string())
        }
        Error::ExternalApi { status: 409, .. } => {
            SingleOutcome::Skipped("Already applied (duplicate)".to_string())
        }
        other => SingleOutcome::Error(other.to_string()),
    }
}

fn requires_external_test(vacancy: &Vacancy, board_domain: &str) -> bool {
    if let Some(test) = &vacancy.test {
        if test.required {
            return true;
        }
        if let Some(url) = &test.url {
            if !url.contains(board_domain) {
                return true;
            }
        }
    }
    if let Some(template) = &vacancy.branded_template {
        if template.external_form_url.is_some() {
            return true;
        }
    }
    false
}

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("static url regex"))
}

fn is_unanswerable(question: &ScreeningQuestion, board_domain: &str) -> bool {
    if question.required_url.as_deref().is_some_and(|s| !s.is_empty()) {
        return true;
    }
    if question.url.as_deref().is_some_and(|s| !s.is_empty()) {
        return true;
    }
    let lower = question.text.to_lowercase();
    if UNANSWERABLE_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }
    if let Some(m) = url_regex().find(&question.text) {
        if !m.as_str().contains(board_domain) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unanswerable_phrase_is_detected() {
        let q = ScreeningQuestion {
            id: "q1".into(),
            text: "Пожалуйста, перейдите по ссылке и пройдите тест".into(),
            ..Default::default()
        };
        assert!(is_unanswerable(&q, "hh.ru"));
    }

    #[test]
    fn plain_question_is_answerable() {
        let q = ScreeningQuestion {
            id: "q1".into(),
            text: "Do you have 3 years of Rust experience?".into(),
            ..Default::default()
        };
        assert!(!is_unanswerable(&q, "hh.ru"));
    }

    #[test]
    fn off_domain_link_is_unanswerable() {
        let q = ScreeningQuestion {
            id: "q1".into(),
            text: "See https://forms.example.com/test for details".into(),
            ..Default::default()
        };
        assert!(is_unanswerable(&q, "hh.ru"));
    }

    #[test]
    fn on_domain_link_is_answerable() {
        let q = ScreeningQuestion {
            id: "q1".into(),
            text: "See https://hh.ru/vacancy/1 for details".into(),
            ..Default::default()
        };
        assert!(!is_unanswerable(&q, "hh.ru"));
    }

    #[test]
    fn external_test_url_requires_external_test() {
        let vacancy = Vacancy {
            test: Some(sa_domain::model::VacancyTest {
                url: Some("https://external-tests.example.com/x".into()),
                required: false,
            }),
            ..Default::default()
        };
        assert!(requires_external_test(&vacancy, "hh.ru"));
    }

    #[test]
    fn onsite_test_url_does_not_require_external_test() {
        let vacancy = Vacancy {
            test: Some(sa_domain::model::VacancyTest {
                url: Some("https://hh.ru/test/1".into()),
                required: false,
            }),
            ..Default::default()
        };
        assert!(!requires_external_test(&vacancy, "hh.ru"));
    }

    #[test]
    fn classify_400_is_duplicate_skip() {
        let err = Error::ExternalApi {
            status: 400,
            message: "dup".to_string(),
        };
        assert!(matches!(classify_apply_error(&err), SingleOutcome::Skipped(_)));
    }

    #[test]
    fn adaptive_delay_grows_on_error_and_shrinks_on_success() {
        let mut delay = AdaptiveDelay::new();
        let before = delay.seconds;
        let _ = delay.on_other_error();
        assert!(delay.seconds > before);
        let after_error = delay.seconds;
        let _ = delay.on_success();
        assert!(delay.seconds < after_error);
    }

    #[test]
    fn adaptive_delay_is_bounded() {
        let mut delay = AdaptiveDelay::new();
        for _ in 0..50 {
            let _ = delay.on_other_error();
        }
        assert!(delay.seconds <= 30.0);
        for _ in 0..50 {
            let _ = delay.on_success();
        }
        assert!(delay.seconds >= 2.0);
    }
}
