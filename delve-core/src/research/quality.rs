//! Search result quality scoring.
//!
//! Scores a raw hit against its query from domain authority, clickbait and
//! marketing language, content length, title relevance and recency. The
//! keyword and domain tables are owned by the scorer so tests can swap them.

use super::search::RawSearchResult;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const BASE_SCORE: f64 = 0.5;
const SEO_FARM_PENALTY: f64 = 0.4;
const MARKETING_PENALTY: f64 = 0.2;
const LENGTH_STEP_BONUS: f64 = 0.1;
const LENGTH_THRESHOLDS: [usize; 2] = [1000, 2000];
const MAX_RELEVANCE_BONUS: f64 = 0.2;
const FRESH_BONUS: f64 = 0.15;
const FRESH_DAYS: i64 = 30;
const RECENT_BONUS: f64 = 0.10;
const RECENT_DAYS: i64 = 365;

/// Ordered; the first matching rule wins.
const DEFAULT_AUTHORITY: &[(&str, f64)] = &[
    (".gov", 0.3),
    (".edu", 0.3),
    (".ac.uk", 0.25),
    ("who.int", 0.3),
    ("nature.com", 0.3),
    ("science.org", 0.3),
    ("arxiv.org", 0.25),
    ("reuters.com", 0.25),
    ("apnews.com", 0.25),
    ("economist.com", 0.2),
    ("ft.com", 0.2),
    ("bloomberg.com", 0.2),
    ("wsj.com", 0.2),
    ("nytimes.com", 0.2),
    ("bbc.co.uk", 0.2),
    ("bbc.com", 0.2),
    ("wikipedia.org", 0.15),
];

const DEFAULT_SEO_MARKERS: &[&str] = &[
    "top 10",
    "top ten",
    "you won't believe",
    "shocking",
    "one weird trick",
    "click here",
    "doctors hate",
    "what happened next",
    "must see",
];

const DEFAULT_MARKETING_PHRASES: &[&str] = &[
    "revolutionary",
    "game-changing",
    "game changing",
    "best solution",
    "industry-leading",
    "cutting-edge solution",
    "unlock the power",
    "sign up today",
    "limited time offer",
];

/// A trusted domain or suffix and the bonus it earns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthorityRule {
    /// `.suffix` matches any host ending with it; otherwise the exact domain
    /// or any of its subdomains.
    pub pattern: String,
    pub bonus: f64,
}

impl AuthorityRule {
    fn matches(&self, host: &str) -> bool {
        if self.pattern.starts_with('.') {
            host.ends_with(&self.pattern)
        } else {
            host == self.pattern || host.ends_with(&format!(".{}", self.pattern))
        }
    }
}

/// Keyword and domain tables driving the scorer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityTables {
    pub authority: Vec<AuthorityRule>,
    pub seo_markers: Vec<String>,
    pub marketing_phrases: Vec<String>,
}

impl Default for QualityTables {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY
                .iter()
                .map(|(pattern, bonus)| AuthorityRule {
                    pattern: pattern.to_string(),
                    bonus: *bonus,
                })
                .collect(),
            seo_markers: DEFAULT_SEO_MARKERS.iter().map(|s| s.to_string()).collect(),
            marketing_phrases: DEFAULT_MARKETING_PHRASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// A raw hit that survived filtering, with its score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    pub quality_score: f64,
}

/// Pure scoring over injected tables.
#[derive(Debug, Clone)]
pub struct QualityScorer {
    tables: QualityTables,
    min_score: f64,
    min_content_chars: usize,
    reference_time: Option<DateTime<Utc>>,
}

impl QualityScorer {
    pub fn new(tables: QualityTables, min_score: f64, min_content_chars: usize) -> Self {
        Self {
            tables,
            min_score,
            min_content_chars,
            reference_time: None,
        }
    }

    /// Pin "now" for recency scoring.
    pub fn with_reference_time(mut self, now: DateTime<Utc>) -> Self {
        self.reference_time = Some(now);
        self
    }

    pub fn tables(&self) -> &QualityTables {
        &self.tables
    }

    /// Results without title or url, or with too little content, never get ranked.
    pub fn is_eligible(&self, result: &RawSearchResult) -> bool {
        !result.title.trim().is_empty()
            && !result.url.trim().is_empty()
            && result.content.chars().count() >= self.min_content_chars
    }

    /// Score a result against a query. Always within `[0, 1]`.
    pub fn score(&self, result: &RawSearchResult, query: &str) -> f64 {
        let title = result.title.to_lowercase();
        let content = result.content.to_lowercase();

        let mut score = BASE_SCORE;
        score += self.authority_bonus(&result.url);

        let contains_any =
            |list: &[String]| list.iter().any(|m| title.contains(m) || content.contains(m));
        if contains_any(&self.tables.seo_markers) {
            score -= SEO_FARM_PENALTY;
        }
        if contains_any(&self.tables.marketing_phrases) {
            score -= MARKETING_PENALTY;
        }

        let length = result.content.chars().count();
        score += LENGTH_THRESHOLDS
            .iter()
            .filter(|t| length > **t)
            .count() as f64
            * LENGTH_STEP_BONUS;

        score += relevance_bonus(&title, query);
        score += self.recency_bonus(result.published_date.as_deref());

        score.clamp(0.0, 1.0)
    }

    /// Drop ineligible and low-scoring results, then sort by score descending.
    pub fn filter_and_rank(&self, results: Vec<RawSearchResult>, query: &str) -> Vec<ScoredResult> {
        let mut ranked: Vec<ScoredResult> = results
            .into_iter()
            .filter(|r| self.is_eligible(r))
            .filter_map(|r| {
                let quality_score = self.score(&r, query);
                (quality_score > self.min_score).then(|| ScoredResult {
                    title: r.title,
                    url: r.url,
                    content: r.content,
                    published_date: r.published_date,
                    quality_score,
                })
            })
            .collect();

        ranked.sort_by(|a, b| b.quality_score.total_cmp(&a.quality_score));
        ranked
    }

    fn authority_bonus(&self, raw_url: &str) -> f64 {
        let Some(host) = host_of(raw_url) else {
            return 0.0;
        };
        self.tables
            .authority
            .iter()
            .find(|rule| rule.matches(&host))
            .map(|rule| rule.bonus)
            .unwrap_or(0.0)
    }

    fn recency_bonus(&self, published: Option<&str>) -> f64 {
        let Some(published) = published.and_then(parse_published) else {
            return 0.0;
        };
        let now = self.reference_time.unwrap_or_else(Utc::now);
        let age_days = (now - published).num_days();
        if age_days < 0 {
            // Future-dated: the date is wrong, not fresh
            return 0.0;
        }
        if age_days <= FRESH_DAYS {
            FRESH_BONUS
        } else if age_days <= RECENT_DAYS {
            RECENT_BONUS
        } else {
            0.0
        }
    }
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(QualityTables::default(), 0.3, 100)
    }
}

/// Lowercased host of a URL, if it parses.
///
/// Scheme-less sources such as `www.example.com/x` are read as `https://`.
pub fn host_of(raw_url: &str) -> Option<String> {
    let raw_url = raw_url.trim();
    let parsed = if raw_url.contains("://") {
        url::Url::parse(raw_url)
    } else {
        url::Url::parse(&format!("https://{raw_url}"))
    };
    parsed
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

fn relevance_bonus(title_lower: &str, query: &str) -> f64 {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 3)
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let hits = words.iter().filter(|w| title_lower.contains(w.as_str())).count();
    MAX_RELEVANCE_BONUS * hits as f64 / words.len() as f64
}

fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
