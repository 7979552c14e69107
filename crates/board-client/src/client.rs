//! External board HTTP client: pacing, retries, token lifecycle, and the
//! handful of endpoints the application pipeline needs.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::Method;
use sa_domain::config::BoardConfig;
use sa_domain::model::{Resume, ScreeningAnswer, ScreeningQuestion, Token, Vacancy};
use sa_domain::{Error, Result};
use sa_store::TokenStore;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use crate::retry::{self, RetryReason, MAX_RETRIES};

const NEGOTIATIONS_MAX_PAGES: usize = 20;
const DISCOVERY_PAGE_SIZE: u32 = 100;

pub struct BoardCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

impl BoardCredentials {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            client_id: std::env::var("HH_CLIENT_ID")
                .map_err(|_| Error::Config("HH_CLIENT_ID not set".to_string()))?,
            client_secret: std::env::var("HH_CLIENT_SECRET")
                .map_err(|_| Error::Config("HH_CLIENT_SECRET not set".to_string()))?,
            redirect_uri: std::env::var("HH_REDIRECT_URI")
                .map_err(|_| Error::Config("HH_REDIRECT_URI not set".to_string()))?,
        })
    }
}

pub struct BoardClient {
    http: reqwest::Client,
    config: BoardConfig,
    credentials: BoardCredentials,
    token_store: Arc<TokenStore>,
    cached_token: RwLock<Option<Token>>,
    last_request_at: Mutex<Option<Instant>>,
}

fn looks_like_ddos_guard(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("ddos-guard") || lower.contains("checking your browser")
}

impl BoardClient {
    pub fn new(config: BoardConfig, credentials: BoardCredentials, token_store: Arc<TokenStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(5)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        let cached_token = token_store.load()?;
        Ok(Self {
            http,
            config,
            credentials,
            token_store,
            cached_token: RwLock::new(cached_token),
            last_request_at: Mutex::new(None),
        })
    }

    // ── Token lifecycle ─────────────────────────────────────────────────

    /// Exchange an OAuth authorization code for a token, retrying on
    /// DDoS-guard responses.
    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", &self.credentials.client_id),
            ("client_secret", &self.credentials.client_secret),
            ("redirect_uri", &self.credentials.redirect_uri),
        ];
        self.oauth_token_request(&params).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Token> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.credentials.client_id),
            ("client_secret", &self.credentials.client_secret),
        ];
        self.oauth_token_request(&params).await
    }

    async fn oauth_token_request(&self, params: &[(&str, &str)]) -> Result<Token> {
        let mut attempt = 0u32;
        loop {
            let resp = self
                .http
                .post(&self.config.token_url)
                .form(params)
                .send()
                .await
                .map_err(|e| Error::Network(e.to_string()))?;
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            if looks_like_ddos_guard(&body) {
                if attempt >= MAX_RETRIES {
                    return Err(Error::RateLimited { retry_after_secs: 0 });
                }
                attempt += 1;
                tokio::time::sleep(retry::oauth_retry_delay(attempt)).await;
                continue;
            }
            if !status.is_success() {
                return Err(Error::ExternalApi {
                    status: status.as_u16(),
                    message: body,
                });
            }
            #[derive(serde::Deserialize)]
            struct TokenResponse {
                access_token: String,
                refresh_token: String,
                expires_in: i64,
            }
            let parsed: TokenResponse = serde_json::from_str(&body)?;
            let token = Token {
                access_token: parsed.access_token,
                refresh_token: parsed.refresh_token,
                expires_in: parsed.expires_in,
                obtained_at: Utc::now(),
            };
            self.token_store.save(&token)?;
            *self.cached_token.write().await = Some(token.clone());
            return Ok(token);
        }
    }

    /// Returns a usable access token, refreshing proactively inside the
    /// safety buffer. Fails with `Error::Auth` if no durable token exists
    /// or the durable token is itself fully expired.
    async fn ensure_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.needs_refresh(sa_domain::model::TOKEN_REFRESH_BUFFER_SECS) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let latest = self.token_store.load()?;
        let Some(latest) = latest else {
            return Err(Error::Auth("no token on record".to_string()));
        };
        if latest.is_expired() {
            return Err(Error::Auth("durable token is expired".to_string()));
        }
        if !latest.needs_refresh(sa_domain::model::TOKEN_REFRESH_BUFFER_SECS) {
            *self.cached_token.write().await = Some(latest.clone());
            return Ok(latest.access_token);
        }
        let refreshed = self.refresh(&latest.refresh_token).await?;
        Ok(refreshed.access_token)
    }

    // ── Pacing + dispatch ───────────────────────────────────────────────

    async fn pace(&self) {
        tokio::time::sleep(retry::pre_request_jitter()).await;
        let mut guard = self.last_request_at.lock().await;
        if let Some(last) = *guard {
            let min_gap = Duration::from_millis(self.config.min_pacing_ms);
            let elapsed = last.elapsed();
            if elapsed < min_gap {
                tokio::time::sleep(min_gap - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }

    /// Core per-request algorithm: pacing, token attachment, retry/backoff
    /// classification. `body` is form-encoded when present (the board's
    /// apply endpoint), otherwise this is a GET with `query`.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        form_body: Option<&[(&str, String)]>,
    ) -> Result<Value> {
        let token = self.ensure_token().await?;
        let mut attempt = 0u32;
        loop {
            self.pace().await;
            let url = format!("{}{}", self.config.base_url, path);
            let mut req = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&token)
                .header("Referer", &self.config.base_url);
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(form) = form_body {
                req = req.form(form);
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(Error::Network(e.to_string()));
                    }
                    let delay = retry::backoff_delay(RetryReason::Network, attempt, None);
                    tracing::warn!(path, attempt, delay_ms = delay.as_millis() as u64, "network error, retrying");
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = resp.status();
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = resp.text().await.unwrap_or_default();

            if looks_like_ddos_guard(&body) {
                if attempt >= MAX_RETRIES {
                    return Err(Error::ExternalApi {
                        status: 429,
                        message: "blocked by DDoS protection".to_string(),
                    });
                }
                let delay = retry::backoff_delay(RetryReason::DdosGuard, attempt, None);
                tracing::warn!(path, attempt, "ddos-guard response, retrying");
                attempt += 1;
                tokio::time::sleep(delay).await;
                continue;
            }

            if status.as_u16() == 429 {
                let delay = retry::backoff_delay(RetryReason::TooManyRequests, attempt, retry_after);
                tracing::warn!(path, attempt, delay_secs = delay.as_secs(), "rate limited, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if matches!(status.as_u16(), 502 | 503 | 504) {
                if attempt >= MAX_RETRIES {
                    return Err(Error::ExternalApi {
                        status: status.as_u16(),
                        message: body,
                    });
                }
                let delay = retry::backoff_delay(RetryReason::GatewayError, attempt, None);
                attempt += 1;
                tokio::time::sleep(delay).await;
                continue;
            }

            if status.as_u16() >= 500 {
                if attempt >= MAX_RETRIES {
                    return Err(Error::ExternalApi {
                        status: status.as_u16(),
                        message: body,
                    });
                }
                let delay = retry::backoff_delay(RetryReason::ServerError, attempt, None);
                attempt += 1;
                tokio::time::sleep(delay).await;
                continue;
            }

            if status.as_u16() >= 400 {
                return Err(Error::ExternalApi {
                    status: status.as_u16(),
                    message: body,
                });
            }

            if body.trim().is_empty() {
                return Ok(Value::Object(Default::default()));
            }
            return serde_json::from_str(&body).or_else(|_| Ok(Value::Object(Default::default())));
        }
    }

    // ── Endpoints ────────────────────────────────────────────────────────

    pub async fn search_vacancies(
        &self,
        text: &str,
        page: u32,
        experience: Option<&str>,
        schedule: Option<&str>,
        employment: Option<&str>,
        salary: Option<i64>,
        only_with_salary: bool,
    ) -> Result<Vec<Vacancy>> {
        let mut query: Vec<(&str, String)> = vec![
            ("text", text.to_string()),
            ("page", page.to_string()),
            ("per_page", DISCOVERY_PAGE_SIZE.to_string()),
        ];
        if let Some(e) = experience {
            query.push(("experience", e.to_string()));
        }
        if let Some(s) = schedule {
            query.push(("schedule", s.to_string()));
        }
        if let Some(e) = employment {
            query.push(("employment", e.to_string()));
        }
        if let Some(s) = salary {
            query.push(("salary", s.to_string()));
        }
        if only_with_salary {
            query.push(("only_with_salary", "true".to_string()));
        }
        let value = self.request(Method::GET, "/vacancies", &query, None).await?;
        let items = value
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        Ok(items
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect())
    }

    pub async fn vacancy_detail(&self, id: &str) -> Result<Vacancy> {
        let value = self
            .request(Method::GET, &format!("/vacancies/{id}"), &[], None)
            .await?;
        serde_json::from_value(value).map_err(Error::from)
    }

    pub async fn vacancy_questions(&self, id: &str) -> Result<Vec<ScreeningQuestion>> {
        match self
            .request(Method::GET, &format!("/vacancies/{id}/questions"), &[], None)
            .await
        {
            Ok(value) => Ok(value
                .get("items")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect()),
            // Non-fatal: a failed question fetch is treated as "no questions".
            Err(e) => {
                tracing::warn!(id, error = %e, "failed to fetch screening questions, treating as none");
                Ok(Vec::new())
            }
        }
    }

    pub async fn resume_detail(&self, id: &str) -> Result<Resume> {
        let value = self
            .request(Method::GET, &format!("/resumes/{id}"), &[], None)
            .await?;
        serde_json::from_value(value).map_err(Error::from)
    }

    /// Paginated set of vacancy IDs this user has already applied to.
    /// Fails open: on any error, returns an empty set rather than blocking
    /// the pipeline on the board's own bookkeeping.
    pub async fn applied_vacancy_ids(&self) -> HashSet<String> {
        let mut ids = HashSet::new();
        for page in 0..NEGOTIATIONS_MAX_PAGES as u32 {
            let query = [
                ("page", page.to_string()),
                ("per_page", DISCOVERY_PAGE_SIZE.to_string()),
            ];
            let value = match self.request(Method::GET, "/negotiations", &query, None).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to fetch negotiations, failing open");
                    return ids;
                }
            };
            let items = value
                .get("items")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            if items.is_empty() {
                break;
            }
            for item in &items {
                if let Some(id) = item
                    .get("vacancy")
                    .and_then(|v| v.get("id"))
                    .and_then(|v| v.as_str())
                {
                    ids.insert(id.to_string());
                }
            }
            let pages = value.get("pages").and_then(|v| v.as_u64()).unwrap_or(1);
            if page as u64 >= pages.saturating_sub(1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        ids
    }

    /// Submit an application. `answers` become `answer_<question_id>` form
    /// fields, matching the board's documented (if unconfirmed — see
    /// DESIGN.md open question) submission shape.
    pub async fn apply(
        &self,
        vacancy_id: &str,
        resume_id: &str,
        message: Option<&str>,
        answers: &[ScreeningAnswer],
    ) -> Result<()> {
        let mut form: Vec<(&str, String)> = vec![
            ("vacancy_id", vacancy_id.to_string()),
            ("resume_id", resume_id.to_string()),
        ];
        if let Some(m) = message {
            form.push(("message", m.to_string()));
        }
        let answer_keys: Vec<String> = answers
            .iter()
            .map(|a| format!("answer_{}", a.question_id))
            .collect();
        for (key, answer) in answer_keys.iter().zip(answers.iter()) {
            form.push((key.as_str(), answer.answer.clone()));
        }
        self.request(Method::POST, "/negotiations", &[], Some(&form))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddos_guard_detection_is_case_insensitive() {
        assert!(looks_like_ddos_guard("Please wait... DDoS-Guard is checking"));
        assert!(looks_like_ddos_guard("Checking Your Browser before access"));
        assert!(!looks_like_ddos_guard(r#"{"items": []}"#));
    }

    fn client(token_store: Arc<TokenStore>) -> BoardClient {
        BoardClient::new(
            BoardConfig::default(),
            BoardCredentials {
                client_id: "id".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "https://example.test/callback".to_string(),
            },
            token_store,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn ensure_token_rejects_expired_durable_token_without_refreshing() {
        let dir = tempfile::tempdir().unwrap();
        let token_store = Arc::new(TokenStore::new(dir.path()));
        token_store
            .save(&Token {
                access_token: "stale".to_string(),
                refresh_token: "refresh".to_string(),
                expires_in: 60,
                obtained_at: Utc::now() - chrono::Duration::seconds(3600),
            })
            .unwrap();

        let err = client(token_store).ensure_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[tokio::test]
    async fn ensure_token_fails_when_no_token_on_record() {
        let dir = tempfile::tempdir().unwrap();
        let token_store = Arc::new(TokenStore::new(dir.path()));

        let err = client(token_store).ensure_token().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }
}
