//! Multi-query fanout: turn a single human-written `position` string into
//! the list of search queries discovery actually issues.

const ROLE_WORDS: &[&str] = &[
    "разработчик",
    "developer",
    "инженер",
    "engineer",
    "программист",
];

/// Parse `position` into the ordered list of queries to search for. The main
/// (parenthetical-stripped, hyphen-normalized) query always comes first;
/// each comma-separated parenthetical keyword follows, combined with the
/// detected role word when one is present in the main query.
pub fn parse_position_queries(position: &str) -> Vec<String> {
    let keywords = extract_parenthetical_keywords(position);
    let main_query = normalize_main_query(position);

    let mut queries = Vec::with_capacity(1 + keywords.len());
    if !main_query.is_empty() {
        queries.push(main_query.clone());
    }

    if !keywords.is_empty() {
        match detect_role_word(&main_query) {
            Some(role) => {
                for kw in &keywords {
                    queries.push(format!("{kw} {role}"));
                }
            }
            None => {
                for kw in &keywords {
                    queries.push(kw.clone());
                }
            }
        }
    }

    if queries.is_empty() {
        queries.push(position.trim().to_string());
    }
    queries
}

fn extract_parenthetical_keywords(position: &str) -> Vec<String> {
    let Some(open) = position.find('(') else {
        return Vec::new();
    };
    let Some(close) = position[open..].find(')') else {
        return Vec::new();
    };
    let inside = &position[open + 1..open + close];
    inside
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn normalize_main_query(position: &str) -> String {
    let without_parens = strip_parenthetical(position);
    let normalized = without_parens.replace(['-', '\u{2010}', '\u{2013}', '\u{2014}'], " ");
    collapse_whitespace(&normalized)
}

fn strip_parenthetical(position: &str) -> String {
    let Some(open) = position.find('(') else {
        return position.to_string();
    };
    let Some(close_rel) = position[open..].find(')') else {
        return position.to_string();
    };
    let close = open + close_rel;
    let mut out = String::with_capacity(position.len());
    out.push_str(&position[..open]);
    out.push_str(&position[close + 1..]);
    out
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn detect_role_word(main_query: &str) -> Option<&'static str> {
    let lower = main_query.to_lowercase();
    ROLE_WORDS.iter().find(|w| lower.contains(*w)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parenthetical_keywords_combine_with_role_word() {
        let queries = parse_position_queries("Python-разработчик (Django, FastAPI)");
        assert_eq!(
            queries,
            vec![
                "Python разработчик".to_string(),
                "Django разработчик".to_string(),
                "FastAPI разработчик".to_string(),
            ]
        );
    }

    #[test]
    fn plain_position_yields_single_query() {
        let queries = parse_position_queries("Backend developer");
        assert_eq!(queries, vec!["Backend developer".to_string()]);
    }

    #[test]
    fn keywords_without_role_word_stand_alone() {
        let queries = parse_position_queries("Data team (SQL, Airflow)");
        assert_eq!(
            queries,
            vec![
                "Data team".to_string(),
                "SQL".to_string(),
                "Airflow".to_string(),
            ]
        );
    }

    #[test]
    fn en_dash_and_em_dash_are_normalized() {
        let queries = parse_position_queries("Senior–Backend—Engineer");
        assert_eq!(queries, vec!["Senior Backend Engineer".to_string()]);
    }
}
