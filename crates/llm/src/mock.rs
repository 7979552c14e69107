//! Deterministic stub backend used by tests and by `doctor` when no real
//! provider is configured.

use async_trait::async_trait;
use sa_domain::model::{ApplicantProfile, ScreeningAnswer, ScreeningQuestion, Vacancy};
use sa_domain::Result;

use crate::traits::ApplicationLlm;

pub struct MockLlm;

#[async_trait]
impl ApplicationLlm for MockLlm {
    async fn generate_cover_letter(
        &self,
        vacancy: &Vacancy,
        profile: &ApplicantProfile,
    ) -> Result<String> {
        Ok(format!(
            "Dear Hiring Team at {},\n\nI'm writing to apply for the {} position. My background \
             in {} aligns closely with what you're looking for, and I'd welcome the chance to \
             discuss how I can contribute.\n\nBest regards,\n{}",
            vacancy.employer.name, vacancy.name, profile.skills_csv, profile.name
        ))
    }

    async fn answer_screening_questions(
        &self,
        questions: &[ScreeningQuestion],
        _vacancy: &Vacancy,
        profile: &ApplicantProfile,
    ) -> Result<Vec<ScreeningAnswer>> {
        Ok(questions
            .iter()
            .map(|q| ScreeningAnswer {
                question_id: q.id.clone(),
                answer: format!("Based on my experience ({}), yes.", profile.skills_csv),
            })
            .collect())
    }

    fn provider_id(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::ScreeningQuestion;

    #[tokio::test]
    async fn cover_letter_is_non_trivial() {
        let llm = MockLlm;
        let vacancy = Vacancy {
            id: "1".into(),
            name: "Backend Engineer".into(),
            ..Default::default()
        };
        let profile = ApplicantProfile {
            name: "Jane".into(),
            skills_csv: "Rust, async".into(),
            ..Default::default()
        };
        let letter = llm.generate_cover_letter(&vacancy, &profile).await.unwrap();
        assert!(letter.len() >= 50);
    }

    #[tokio::test]
    async fn answers_one_per_question() {
        let llm = MockLlm;
        let qs = vec![
            ScreeningQuestion {
                id: "q1".into(),
                text: "Do you have 3 years of experience?".into(),
                ..Default::default()
            },
            ScreeningQuestion {
                id: "q2".into(),
                text: "Are you willing to relocate?".into(),
                ..Default::default()
            },
        ];
        let vacancy = Vacancy::default();
        let profile = ApplicantProfile::default();
        let answers = llm.answer_screening_questions(&qs, &vacancy, &profile).await.unwrap();
        assert_eq!(answers.len(), 2);
        assert_eq!(answers[0].question_id, "q1");
    }
}
