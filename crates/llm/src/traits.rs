use async_trait::async_trait;
use sa_domain::model::{ApplicantProfile, ScreeningAnswer, ScreeningQuestion, Vacancy};
use sa_domain::Result;

/// The capability the pipeline needs from an LLM backend: write a cover
/// letter, answer screening questions. Hides whether the concrete backend
/// blocks on a socket or a subprocess behind one suspension-point contract.
#[async_trait]
pub trait ApplicationLlm: Send + Sync {
    async fn generate_cover_letter(
        &self,
        vacancy: &Vacancy,
        profile: &ApplicantProfile,
    ) -> Result<String>;

    async fn answer_screening_questions(
        &self,
        questions: &[ScreeningQuestion],
        vacancy: &Vacancy,
        profile: &ApplicantProfile,
    ) -> Result<Vec<ScreeningAnswer>>;

    fn provider_id(&self) -> &str;
}
