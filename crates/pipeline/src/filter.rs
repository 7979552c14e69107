//! Pure filter engine: local criteria applied after the board's own
//! server-side search filters have already narrowed the candidate set.

use sa_domain::model::{SearchCriteria, Vacancy};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterResult {
    pub accept: bool,
    pub reason: Option<String>,
}

impl FilterResult {
    fn accept() -> Self {
        Self {
            accept: true,
            reason: None,
        }
    }

    fn reject(reason: impl Into<String>) -> Self {
        Self {
            accept: false,
            reason: Some(reason.into()),
        }
    }
}

/// `should_apply` — same input always yields the same output, no I/O.
pub fn should_apply(vacancy: &Vacancy, criteria: &SearchCriteria) -> FilterResult {
    if vacancy.archived {
        return FilterResult::reject("Vacancy is archived");
    }

    let employer_lower = vacancy.employer.name.to_lowercase();
    for excluded in &criteria.exclude_companies {
        if !excluded.trim().is_empty() && employer_lower.contains(&excluded.to_lowercase()) {
            return FilterResult::reject(format!("Excluded company: {excluded}"));
        }
    }

    if !criteria.required_skills.is_empty() {
        let key_skills = vacancy.key_skill_names_lower();
        let haystack = vacancy.search_text();
        let missing: Vec<&String> = criteria
            .required_skills
            .iter()
            .filter(|skill| {
                let skill_lower = skill.to_lowercase();
                !key_skills.contains(&skill_lower) && !haystack.contains(&skill_lower)
            })
            .collect();
        if !missing.is_empty() {
            let names = missing
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return FilterResult::reject(format!("Missing required skills: {names}"));
        }
    }

    if !criteria.excluded_keywords.is_empty() {
        let haystack = vacancy.search_text();
        let matches: Vec<&String> = criteria
            .excluded_keywords
            .iter()
            .filter(|kw| !kw.trim().is_empty() && haystack.contains(&kw.to_lowercase()))
            .collect();
        if !matches.is_empty() {
            let names = matches
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            return FilterResult::reject(format!("Excluded keywords present: {names}"));
        }
    }

    FilterResult::accept()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::model::{Employer, KeySkill};

    fn vacancy() -> Vacancy {
        Vacancy {
            id: "1".into(),
            name: "Backend Engineer".into(),
            employer: Employer {
                name: "Acme Corp".into(),
            },
            description: Some("We use Rust and PostgreSQL daily".into()),
            key_skills: vec![KeySkill {
                name: "Rust".into(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn archived_is_rejected() {
        let mut v = vacancy();
        v.archived = true;
        let result = should_apply(&v, &SearchCriteria::default());
        assert!(!result.accept);
    }

    #[test]
    fn excluded_company_is_case_insensitive() {
        let v = vacancy();
        let criteria = SearchCriteria {
            exclude_companies: vec!["acme".into()],
            ..Default::default()
        };
        let result = should_apply(&v, &criteria);
        assert!(!result.accept);
    }

    #[test]
    fn missing_required_skill_is_rejected() {
        let v = vacancy();
        let criteria = SearchCriteria {
            required_skills: vec!["Kubernetes".into()],
            ..Default::default()
        };
        let result = should_apply(&v, &criteria);
        assert!(!result.accept);
        assert!(result.reason.unwrap().contains("Kubernetes"));
    }

    #[test]
    fn required_skill_matched_in_description_passes() {
        let v = vacancy();
        let criteria = SearchCriteria {
            required_skills: vec!["PostgreSQL".into()],
            ..Default::default()
        };
        let result = should_apply(&v, &criteria);
        assert!(result.accept);
    }

    #[test]
    fn excluded_keyword_in_name_is_rejected() {
        let v = vacancy();
        let criteria = SearchCriteria {
            excluded_keywords: vec!["backend".into()],
            ..Default::default()
        };
        let result = should_apply(&v, &criteria);
        assert!(!result.accept);
    }

    #[test]
    fn clean_vacancy_is_accepted() {
        let v = vacancy();
        let result = should_apply(&v, &SearchCriteria::default());
        assert!(result.accept);
        assert!(result.reason.is_none());
    }

    #[test]
    fn is_pure() {
        let v = vacancy();
        let criteria = SearchCriteria::default();
        assert_eq!(should_apply(&v, &criteria), should_apply(&v, &criteria));
    }
}
