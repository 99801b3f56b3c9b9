//! Query planning: subject and keyword extraction plus broad-to-narrow
//! query generation.
//!
//! Every generated list starts with the bare subject and each later query
//! appends a more specific qualifier, so the last query always extends the
//! first. Role-specific qualifier ladders come from a static table; roles not
//! in the table get a generic four-step ladder built from the objective's
//! keywords.

use super::session::Task;

const FALLBACK_SUBJECT: &str = "research topic";
const MAX_KEYWORDS: usize = 5;
const MAX_SUBJECT_WORDS: usize = 4;
const MIN_QUERIES: usize = 2;
const MAX_QUERIES: usize = 8;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "in", "on", "for", "to", "with", "about", "from", "by",
    "at", "as", "is", "are", "was", "were", "be", "been", "this", "that", "these", "those",
    "what", "which", "who", "whom", "how", "why", "when", "where", "into", "over", "under",
    "between", "their", "its", "it", "they", "them", "our", "your", "any", "all", "each",
    "other", "such", "than", "then", "also", "including", "include", "across", "within",
    "without", "more", "most", "some", "etc", "based", "during", "after", "before", "while",
    "both", "either", "not", "but", "can", "could", "should", "would", "will", "may", "might",
    "must", "has", "have", "had", "do", "does", "did", "using", "current", "key", "main",
];

/// Imperatives that open objectives but never name the subject.
const INSTRUCTION_WORDS: &[&str] = &[
    "research", "analyze", "analyse", "investigate", "find", "identify", "examine", "explore",
    "determine", "describe", "explain", "summarize", "summarise", "review", "assess", "evaluate",
    "compare", "study", "gather", "collect", "provide", "look", "outline", "list", "map",
];

/// Facet words that describe an angle on a subject rather than the subject.
const ASPECT_WORDS: &[&str] = &[
    "market", "size", "landscape", "history", "timeline", "trends", "trend", "analysis",
    "overview", "impact", "impacts", "effects", "outlook", "state", "competitive", "competitors",
    "performance", "role", "future", "recent", "latest", "developments", "background",
];

/// Qualifiers appended to the subject, broad first.
struct RoleTemplate {
    role: &'static str,
    qualifiers: &'static [&'static str],
}

const ROLE_TEMPLATES: &[RoleTemplate] = &[
    RoleTemplate {
        role: "market_researcher",
        qualifiers: &[
            "market",
            "market size industry analysis",
            "market share leading companies",
            "market growth forecast",
            "customer demand drivers",
            "pricing trends",
            "latest market analysis",
        ],
    },
    RoleTemplate {
        role: "historical_researcher",
        qualifiers: &[
            "history",
            "history timeline formation origins",
            "key events milestones",
            "founders early development",
            "major turning points",
            "historical significance",
            "recent historical analysis",
        ],
    },
    RoleTemplate {
        role: "technical_analyst",
        qualifiers: &[
            "technology",
            "technical architecture how it works",
            "specifications performance benchmarks",
            "implementation challenges",
            "technical limitations",
            "standards research papers",
            "latest technical developments",
        ],
    },
    RoleTemplate {
        role: "competitive_analyst",
        qualifiers: &[
            "competitors",
            "competitive landscape comparison",
            "market positioning strengths weaknesses",
            "competitor strategy",
            "alternatives differentiation",
            "partnerships acquisitions",
            "latest competitive analysis",
        ],
    },
    RoleTemplate {
        role: "financial_analyst",
        qualifiers: &[
            "financials",
            "revenue earnings financial performance",
            "funding valuation investors",
            "profitability margins",
            "financial risks",
            "analyst outlook",
            "latest financial results",
        ],
    },
    RoleTemplate {
        role: "policy_analyst",
        qualifiers: &[
            "policy",
            "regulation legal framework",
            "government policy impact",
            "compliance requirements",
            "policy debate stakeholders",
            "international regulatory comparison",
            "latest regulatory developments",
        ],
    },
    RoleTemplate {
        role: "academic_researcher",
        qualifiers: &[
            "research",
            "academic studies peer reviewed",
            "scientific evidence findings",
            "systematic literature review",
            "research methodology",
            "open research questions",
            "latest research publications",
        ],
    },
    RoleTemplate {
        role: "news_researcher",
        qualifiers: &[
            "news",
            "recent news coverage",
            "official announcements",
            "press reports",
            "expert commentary",
            "public reaction",
            "latest news this week",
        ],
    },
];

/// Heuristic query planner. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueryPlanner;

impl QueryPlanner {
    pub fn new() -> Self {
        Self
    }

    /// The main subject of an objective: its longest run of content words.
    ///
    /// Falls back to "research topic" when the objective has none.
    pub fn main_subject(&self, objective: &str) -> String {
        let mut best: Vec<&str> = Vec::new();
        let mut current: Vec<&str> = Vec::new();

        for raw in objective.split_whitespace() {
            let word = trim_token(raw);
            let lower = word.to_lowercase();
            let breaks_run = word.is_empty()
                || is_stopword(&lower)
                || INSTRUCTION_WORDS.contains(&lower.as_str())
                || ASPECT_WORDS.contains(&lower.as_str());

            if !breaks_run {
                current.push(word);
            }
            // A token ending a clause also ends the run
            if breaks_run || raw.ends_with([',', ';', ':', '.', '?', '!']) {
                keep_longest(&mut best, &mut current);
            }
        }
        keep_longest(&mut best, &mut current);

        if best.is_empty() {
            // Only facet words: keep the first content-bearing token, if any
            return objective
                .split_whitespace()
                .map(trim_token)
                .find(|w| {
                    let lower = w.to_lowercase();
                    !w.is_empty()
                        && !is_stopword(&lower)
                        && !INSTRUCTION_WORDS.contains(&lower.as_str())
                })
                .map(str::to_string)
                .unwrap_or_else(|| FALLBACK_SUBJECT.to_string());
        }

        best.truncate(MAX_SUBJECT_WORDS);
        best.join(" ")
    }

    /// Up to five distinct lowercase keywords longer than three characters.
    pub fn keywords(&self, objective: &str) -> Vec<String> {
        let mut keywords: Vec<String> = Vec::new();
        for raw in objective.split_whitespace() {
            let word = trim_token(raw).to_lowercase();
            if word.chars().count() <= 3
                || is_stopword(&word)
                || INSTRUCTION_WORDS.contains(&word.as_str())
                || keywords.contains(&word)
            {
                continue;
            }
            keywords.push(word);
            if keywords.len() == MAX_KEYWORDS {
                break;
            }
        }
        keywords
    }

    /// Ordered queries for a task, broad first.
    ///
    /// Yields between 2 and `task.estimated_queries + 1` queries (never more than 8).
    pub fn generate_queries(&self, task: &Task) -> Vec<String> {
        let subject = self.main_subject(&task.objective);
        let keywords = self.keywords(&task.objective);
        let limit = (task.estimated_queries + 1).clamp(MIN_QUERIES, MAX_QUERIES);

        let role = task.role.trim().to_lowercase();
        let mut queries = match ROLE_TEMPLATES.iter().find(|t| t.role == role) {
            Some(template) => role_ladder(&subject, template.qualifiers),
            None => generic_ladder(&subject, &keywords),
        };

        let mut seen = Vec::with_capacity(queries.len());
        queries.retain(|q| {
            let key = q.to_lowercase();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
        queries.truncate(limit);
        queries
    }
}

/// Qualifiers opening with the subject's last word are skipped so a bare
/// facet subject never yields "market market".
fn role_ladder(subject: &str, qualifiers: &[&str]) -> Vec<String> {
    let last_word = subject
        .split_whitespace()
        .last()
        .unwrap_or_default()
        .to_lowercase();
    std::iter::once(subject.to_string())
        .chain(
            qualifiers
                .iter()
                .filter(|q| {
                    q.split_whitespace()
                        .next()
                        .is_none_or(|first| first.to_lowercase() != last_word)
                })
                .map(|q| format!("{subject} {q}")),
        )
        .collect()
}

/// subject -> subject + context word -> + domain phrase -> + recency qualifier.
fn generic_ladder(subject: &str, keywords: &[String]) -> Vec<String> {
    let subject_lower = subject.to_lowercase();
    let mut extra = keywords
        .iter()
        .filter(|k| !subject_lower.contains(k.as_str()));

    let context = extra.next().cloned().unwrap_or_else(|| "overview".to_string());
    let domain: Vec<&str> = extra.take(2).map(String::as_str).collect();
    let domain = if domain.is_empty() {
        "key facts".to_string()
    } else {
        domain.join(" ")
    };

    vec![
        subject.to_string(),
        format!("{subject} {context}"),
        format!("{subject} {context} {domain}"),
        format!("{subject} {context} latest developments analysis"),
    ]
}

fn keep_longest<'a>(best: &mut Vec<&'a str>, current: &mut Vec<&'a str>) {
    if current.len() > best.len() {
        *best = std::mem::take(current);
    } else {
        current.clear();
    }
}

fn trim_token(raw: &str) -> &str {
    raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
}

fn is_stopword(lower: &str) -> bool {
    STOPWORDS.contains(&lower)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::session::TaskSpec;

    fn task(role: &str, objective: &str, estimated: usize) -> Task {
        Task::from_spec(TaskSpec::new(role, objective).with_estimated_queries(estimated))
    }

    #[test]
    fn test_main_subject_longest_content_run() {
        let planner = QueryPlanner::new();
        assert_eq!(
            planner.main_subject(
                "Analyze the competitive landscape of electric vehicle charging networks in Europe"
            ),
            "electric vehicle charging networks"
        );
        assert_eq!(
            planner.main_subject("Research the history of the Hanseatic League"),
            "Hanseatic League"
        );
    }

    #[test]
    fn test_main_subject_fallback() {
        let planner = QueryPlanner::new();
        assert_eq!(planner.main_subject(""), "research topic");
        assert_eq!(planner.main_subject("   the of and  "), "research topic");
    }

    #[test]
    fn test_keywords_filtered_and_bounded() {
        let planner = QueryPlanner::new();
        let keywords = planner.keywords(
            "Investigate the adoption of heat pumps, heat pumps subsidies, installer shortages, \
             grid impacts and consumer sentiment in Scandinavia",
        );
        assert_eq!(
            keywords,
            vec!["adoption", "heat", "pumps", "subsidies", "installer"]
        );
        assert!(keywords.iter().all(|k| k.len() > 3));
    }

    #[test]
    fn test_role_template_broad_to_narrow() {
        let planner = QueryPlanner::new();
        let queries = planner.generate_queries(&task(
            "market_researcher",
            "Research the market for vertical farming",
            4,
        ));
        assert_eq!(queries.len(), 5);
        assert_eq!(queries[0], "vertical farming");
        assert_eq!(queries[1], "vertical farming market");
        assert_eq!(queries[2], "vertical farming market size industry analysis");
        assert!(queries.iter().skip(1).all(|q| q.starts_with(&queries[0])));
    }

    #[test]
    fn test_facet_only_objective_never_repeats_subject() {
        let planner = QueryPlanner::new();
        let queries = planner.generate_queries(&task("market_researcher", "market trends", 8));
        assert_eq!(queries[0], "market");
        assert!(queries.len() >= 2);
        assert!(queries.iter().all(|q| !q.contains("market market")));
        assert_eq!(queries[1], "market customer demand drivers");
    }

    #[test]
    fn test_historical_role_bias() {
        let planner = QueryPlanner::new();
        let queries =
            planner.generate_queries(&task("historical_researcher", "the Hanseatic League", 2));
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[2], "Hanseatic League history timeline formation origins");
    }

    #[test]
    fn test_unknown_role_uses_generic_ladder() {
        let planner = QueryPlanner::new();
        let queries = planner.generate_queries(&task(
            "generalist",
            "Explore perovskite solar cell durability and manufacturing costs",
            8,
        ));
        assert_eq!(queries.len(), 4);
        assert_eq!(queries[0], "perovskite solar cell durability");
        assert_eq!(queries[1], "perovskite solar cell durability manufacturing");
        assert!(queries[3].ends_with("latest developments analysis"));
    }

    #[test]
    fn test_empty_objective_still_plans() {
        let planner = QueryPlanner::new();
        let queries = planner.generate_queries(&task("generalist", "", 2));
        assert!(queries.len() >= 2);
        assert_eq!(queries[0], "research topic");
        assert_eq!(queries[1], "research topic overview");
    }
}
