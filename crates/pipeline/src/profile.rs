//! Flatten a board resume record into the plain-text profile the LLM
//! collaborator is given.

use sa_domain::model::{ApplicantProfile, Resume};

/// Build a profile from resume detail, falling back to the caller-supplied
/// request fields when the resume itself yields blanks (e.g. a bare resume
/// with no contact info on file).
pub fn build_profile(resume: &Resume, fallback_name: &str, fallback_email: &str) -> ApplicantProfile {
    let name = format!(
        "{} {}",
        resume.first_name.clone().unwrap_or_default(),
        resume.last_name.clone().unwrap_or_default()
    )
    .trim()
    .to_string();
    let name = if name.is_empty() {
        fallback_name.to_string()
    } else {
        name
    };

    let email = resume
        .email
        .clone()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| fallback_email.to_string());

    let skills_csv = resume.skill_set.join(", ");

    let experience_text = resume
        .experience
        .iter()
        .map(|e| {
            let position = e.position.clone().unwrap_or_else(|| "Unknown role".to_string());
            let company = e.company.clone().unwrap_or_else(|| "Unknown company".to_string());
            match &e.description {
                Some(d) if !d.trim().is_empty() => format!("{position} at {company}: {d}"),
                _ => format!("{position} at {company}"),
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    ApplicantProfile {
        name,
        email,
        skills_csv,
        experience_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::ResumeExperienceEntry;

    #[test]
    fn flattens_full_resume() {
        let resume = Resume {
            id: "r1".into(),
            first_name: Some("Jane".into()),
            last_name: Some("Doe".into()),
            email: Some("jane@example.com".into()),
            skill_set: vec!["Rust".into(), "async".into()],
            experience: vec![ResumeExperienceEntry {
                position: Some("Backend Engineer".into()),
                company: Some("Acme".into()),
                description: Some("Built APIs".into()),
            }],
        };
        let profile = build_profile(&resume, "fallback", "fallback@x.com");
        assert_eq!(profile.name, "Jane Doe");
        assert_eq!(profile.email, "jane@example.com");
        assert_eq!(profile.skills_csv, "Rust, async");
        assert_eq!(profile.experience_text, "Backend Engineer at Acme: Built APIs");
    }

    #[test]
    fn falls_back_to_request_fields_on_blank_resume() {
        let resume = Resume {
            id: "r1".into(),
            ..Default::default()
        };
        let profile = build_profile(&resume, "Request Name", "request@x.com");
        assert_eq!(profile.name, "Request Name");
        assert_eq!(profile.email, "request@x.com");
        assert_eq!(profile.skills_csv, "");
        assert_eq!(profile.experience_text, "");
    }
}
