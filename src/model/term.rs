use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A filter string the stream subscription should track while enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterTerm {
    pub term: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl FilterTerm {
    pub fn enabled(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            enabled: true,
        }
    }

    pub fn disabled(term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            enabled: false,
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Collapses store rows into the set of distinct enabled terms. Blank terms are ignored.
pub fn enabled_term_set<'a, I>(terms: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a FilterTerm>,
{
    terms
        .into_iter()
        .filter(|term| term.enabled)
        .map(|term| term.term.trim())
        .filter(|term| !term.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_distinct_enabled_terms_only() {
        let rows = vec![
            FilterTerm::enabled("rust"),
            FilterTerm::enabled(" rust "),
            FilterTerm::disabled("golang"),
            FilterTerm::enabled("   "),
            FilterTerm::enabled("tokio"),
        ];

        let set = enabled_term_set(&rows);
        assert_eq!(
            set.into_iter().collect::<Vec<_>>(),
            vec!["rust".to_string(), "tokio".to_string()]
        );
    }

    #[test]
    fn enabled_defaults_to_true_when_missing() {
        let term: FilterTerm = serde_json::from_str(r#"{"term":"feels"}"#).unwrap();
        assert!(term.enabled);
    }
}
