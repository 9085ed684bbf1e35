//! Keyword-based question classification.

use regex::{Regex, RegexBuilder};

use crate::error::QueryError;

/// Question categories, in routing priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Semantic,
    Evolution,
    Impact,
    Pattern,
    Collaboration,
    General,
}

impl Intent {
    /// Keyword-routed intents, highest priority first. `General` is the
    /// fallback and has no keywords.
    pub const ROUTED: [Intent; 5] = [
        Intent::Semantic,
        Intent::Evolution,
        Intent::Impact,
        Intent::Pattern,
        Intent::Collaboration,
    ];

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Intent::Semantic => &["similar", "like", "related", "same as", "comparable"],
            Intent::Evolution => &[
                "evolve",
                "change over time",
                "history",
                "progression",
                "timeline",
                "drift",
                "transform",
            ],
            Intent::Impact => &["impact", "affect", "consequence", "result", "cause"],
            Intent::Pattern => &["pattern", "trend", "common", "frequent", "typical"],
            Intent::Collaboration => &["who", "author", "contributor", "team", "collaborate"],
            Intent::General => &[],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Semantic => "semantic",
            Intent::Evolution => "evolution",
            Intent::Impact => "impact",
            Intent::Pattern => "pattern",
            Intent::Collaboration => "collaboration",
            Intent::General => "general",
        }
    }
}

/// Decides whether a question belongs to a route.
pub trait RoutePredicate: Send + Sync {
    fn matches(&self, question: &str) -> bool;
}

impl<F> RoutePredicate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, question: &str) -> bool {
        self(question)
    }
}

/// Case-insensitive substring match against any of a set of keywords.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    regex: Regex,
}

impl KeywordMatcher {
    pub fn new(keywords: &[&str]) -> Result<Self, QueryError> {
        if keywords.is_empty() {
            return Err(QueryError::InvalidPattern("no keywords".to_string()));
        }
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let regex = RegexBuilder::new(&alternation)
            .case_insensitive(true)
            .build()
            .map_err(|e| QueryError::InvalidPattern(e.to_string()))?;
        Ok(Self { regex })
    }

    pub fn for_intent(intent: Intent) -> Result<Self, QueryError> {
        Self::new(intent.keywords())
    }
}

impl RoutePredicate for KeywordMatcher {
    fn matches(&self, question: &str) -> bool {
        self.regex.is_match(question)
    }
}

/// Classify with the built-in keyword sets; first match in priority order wins.
pub fn classify(question: &str) -> Intent {
    let lower = question.to_lowercase();
    Intent::ROUTED
        .into_iter()
        .find(|intent| intent.keywords().iter().any(|k| lower.contains(k)))
        .unwrap_or(Intent::General)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_similar_question_is_semantic() {
        assert_eq!(classify("Find commits similar to auth fixes"), Intent::Semantic);
    }

    #[test]
    fn test_priority_order() {
        // "related" (semantic) beats "history" (evolution).
        assert_eq!(classify("history of related modules"), Intent::Semantic);
        // "history" (evolution) beats "who" (collaboration).
        assert_eq!(classify("who shaped the history of parser.rs"), Intent::Evolution);
        assert_eq!(classify("What is the impact of commit abc"), Intent::Impact);
        assert_eq!(classify("Most COMMON commit kinds"), Intent::Pattern);
        assert_eq!(classify("Which team members touch the api"), Intent::Collaboration);
    }

    #[test]
    fn test_no_keyword_is_general() {
        assert_eq!(classify("Tell me about the repository"), Intent::General);
    }

    #[test]
    fn test_substring_semantics() {
        // Plain substring matching: "likely" contains "like".
        assert_eq!(classify("is this likely to break"), Intent::Semantic);
        assert_eq!(classify("how did drifting start"), Intent::Evolution);
    }

    #[test]
    fn test_keyword_matcher_agrees_with_classify() {
        let questions = [
            "Find commits similar to auth fixes",
            "How did the CLI evolve?",
            "What was the CONSEQUENCE of the refactor",
            "typical release cadence",
            "Who wrote this?",
            "Tell me about the repository",
            "Same As before",
        ];
        let matchers: Vec<(Intent, KeywordMatcher)> = Intent::ROUTED
            .into_iter()
            .map(|i| (i, KeywordMatcher::for_intent(i).unwrap()))
            .collect();
        for q in questions {
            let via_matchers = matchers
                .iter()
                .find(|(_, m)| m.matches(q))
                .map(|(i, _)| *i)
                .unwrap_or(Intent::General);
            assert_eq!(via_matchers, classify(q), "disagreement on {:?}", q);
        }
    }

    #[test]
    fn test_keyword_matcher_escapes_metacharacters() {
        let m = KeywordMatcher::new(&["c++", "(beta)"]).unwrap();
        assert!(m.matches("port to C++ first"));
        assert!(m.matches("the (BETA) build"));
        assert!(!m.matches("c build"));
        assert!(KeywordMatcher::new(&[]).is_err());
    }

    #[test]
    fn test_closure_predicate() {
        let p = |q: &str| q.starts_with('#');
        assert!(p.matches("#42"));
        assert!(!RoutePredicate::matches(&p, "42"));
    }
}
