//! Query complexity classification and worker budgeting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direct fact-finding openers.
const SIMPLE_PREFIXES: &[&str] = &[
    "what is",
    "what's",
    "who is",
    "who was",
    "when did",
    "when was",
    "where is",
    "define",
    "how many",
    "how much",
];

const ANALYTICAL_VERBS: &[&str] = &[
    "analyze",
    "analyse",
    "compare",
    "evaluate",
    "assess",
    "investigate",
    "examine",
    "contrast",
    "critique",
    "synthesize",
];

const DOMAIN_KEYWORDS: &[&str] = &[
    "market",
    "industry",
    "economic",
    "political",
    "social",
    "regulatory",
];

const MAX_MODERATE_CHARS: usize = 120;
const MAX_MODERATE_TOKENS: usize = 15;

/// How much parallel effort a query warrants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityTier {
    /// Workers before clamping to a caller maximum.
    pub fn base_budget(&self) -> usize {
        match self {
            ComplexityTier::Simple => 1,
            ComplexityTier::Moderate => 3,
            ComplexityTier::Complex => 6,
        }
    }

    /// Worker budget clamped to `max_workers` (itself clamped to 1..=10).
    pub fn worker_budget(&self, max_workers: usize) -> usize {
        self.base_budget().min(max_workers.clamp(1, 10))
    }

    /// Human-readable execution strategy for plans and reports.
    pub fn strategy(&self) -> &'static str {
        match self {
            ComplexityTier::Simple => {
                "Single focused worker answering a direct fact-finding question"
            }
            ComplexityTier::Moderate => {
                "A few parallel workers covering distinct facets, merged into one summary"
            }
            ComplexityTier::Complex => {
                "Broad decomposition across specialist workers with bounded queries each, \
                 cross-checked during synthesis"
            }
        }
    }
}

impl fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComplexityTier::Simple => "simple",
            ComplexityTier::Moderate => "moderate",
            ComplexityTier::Complex => "complex",
        };
        f.write_str(name)
    }
}

/// Maps a free-text query to a tier. Deterministic and side-effect free.
#[derive(Debug, Default, Clone, Copy)]
pub struct ComplexityClassifier;

impl ComplexityClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, query: &str) -> ComplexityTier {
        let lower = query.trim().to_lowercase();

        if SIMPLE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            return ComplexityTier::Simple;
        }

        if self.is_complex(&lower) {
            return ComplexityTier::Complex;
        }

        ComplexityTier::Moderate
    }

    /// Classify and budget in one call.
    pub fn classify_with_budget(&self, query: &str, max_workers: usize) -> (ComplexityTier, usize) {
        let tier = self.classify(query);
        (tier, tier.worker_budget(max_workers))
    }

    fn is_complex(&self, lower: &str) -> bool {
        let tokens: Vec<&str> = lower.split_whitespace().collect();

        let has_analytical_verb = ANALYTICAL_VERBS.iter().any(|v| lower.contains(v));
        let domain_hits = DOMAIN_KEYWORDS
            .iter()
            .filter(|k| lower.contains(*k))
            .count();
        let compare_and = lower.contains("compare") && tokens.contains(&"and");

        has_analytical_verb
            || domain_hits >= 2
            || lower.chars().count() > MAX_MODERATE_CHARS
            || compare_and
            || tokens.len() > MAX_MODERATE_TOKENS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_fact_query() {
        let classifier = ComplexityClassifier::new();
        let (tier, budget) = classifier.classify_with_budget("What is the capital of France?", 6);
        assert_eq!(tier, ComplexityTier::Simple);
        assert_eq!(budget, 1);
    }

    #[test]
    fn test_compare_query_is_complex() {
        let classifier = ComplexityClassifier::new();
        let tier = classifier.classify(
            "Compare the economic and political landscape of Germany and France across the past decade",
        );
        assert_eq!(tier, ComplexityTier::Complex);
    }

    #[test]
    fn test_two_domain_keywords_is_complex() {
        let classifier = ComplexityClassifier::new();
        assert_eq!(
            classifier.classify("Battery recycling market and regulatory outlook"),
            ComplexityTier::Complex
        );
    }

    #[test]
    fn test_long_query_is_complex() {
        let classifier = ComplexityClassifier::new();
        let query = "tell me about ".repeat(10);
        assert_eq!(classifier.classify(&query), ComplexityTier::Complex);
    }

    #[test]
    fn test_default_is_moderate() {
        let classifier = ComplexityClassifier::new();
        assert_eq!(
            classifier.classify("Rust async runtimes overview"),
            ComplexityTier::Moderate
        );
    }

    #[test]
    fn test_budget_clamped_to_max() {
        assert_eq!(ComplexityTier::Complex.worker_budget(4), 4);
        assert_eq!(ComplexityTier::Complex.worker_budget(50), 6);
        assert_eq!(ComplexityTier::Moderate.worker_budget(0), 1);
        assert_eq!(ComplexityTier::Simple.worker_budget(10), 1);
    }
}
