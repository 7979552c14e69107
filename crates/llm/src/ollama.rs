//! OpenAI-compatible chat-completions backend (works against Ollama, vLLM,
//! LM Studio, or any endpoint that follows the same wire format).

use async_trait::async_trait;
use sa_domain::model::{ApplicantProfile, ScreeningAnswer, ScreeningQuestion, Vacancy};
use sa_domain::{Error, Result};
use serde_json::json;

use crate::traits::ApplicationLlm;

pub struct OllamaLlm {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaLlm {
    pub fn new(base_url: String, model: String, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            base_url,
            model,
            client,
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "stream": false,
        });
        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider {
                provider: "ollama".to_string(),
                message: e.to_string(),
            })?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ExternalApi {
                status,
                message: text,
            });
        }
        let value: serde_json::Value = resp.json().await.map_err(|e| Error::Provider {
            provider: "ollama".to_string(),
            message: e.to_string(),
        })?;
        value
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Provider {
                provider: "ollama".to_string(),
                message: "response missing message.content".to_string(),
            })
    }
}

#[async_trait]
impl ApplicationLlm for OllamaLlm {
    async fn generate_cover_letter(
        &self,
        vacancy: &Vacancy,
        profile: &ApplicantProfile,
    ) -> Result<String> {
        let system = "You write concise, honest, specific cover letters for job applications. \
                      No placeholders, no generic filler.";
        let user = format!(
            "Vacancy: {}\nEmployer: {}\nDescription: {}\n\nApplicant: {}\nSkills: {}\nExperience:\n{}\n\n\
             Write a cover letter (3-5 short paragraphs) tailored to this vacancy.",
            vacancy.name,
            vacancy.employer.name,
            vacancy.description.clone().unwrap_or_default(),
            profile.name,
            profile.skills_csv,
            profile.experience_text,
        );
        self.complete(system, &user).await
    }

    async fn answer_screening_questions(
        &self,
        questions: &[ScreeningQuestion],
        vacancy: &Vacancy,
        profile: &ApplicantProfile,
    ) -> Result<Vec<ScreeningAnswer>> {
        let mut answers = Vec::with_capacity(questions.len());
        for q in questions {
            let system = "Answer job-application screening questions briefly and truthfully \
                          based only on the given profile.";
            let user = format!(
                "Vacancy: {}\nQuestion: {}\nApplicant skills: {}\nApplicant experience:\n{}",
                vacancy.name, q.text, profile.skills_csv, profile.experience_text,
            );
            let answer = self.complete(system, &user).await?;
            answers.push(ScreeningAnswer {
                question_id: q.id.clone(),
                answer,
            });
        }
        Ok(answers)
    }

    fn provider_id(&self) -> &str {
        "ollama"
    }
}
