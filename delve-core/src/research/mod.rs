//! Research engine: lead/worker orchestration over an external search service.
//!
//! Pipeline for one session:
//! 1. **Plan** - classify the query's complexity and pick a worker budget
//! 2. **Delegate** - each task gets a worker that expands it into broad-to-narrow queries
//! 3. **Search** - queries run concurrently with retry, backoff and quality filtering
//! 4. **Synthesize** - caller-triggered merge of every task's findings into one report
//!
//! Query and task failures are absorbed and reported; only structural errors
//! (unknown session, illegal transition) reach the caller.

pub mod complexity;
pub mod coordinator;
pub mod planner;
pub mod quality;
pub mod retry;
pub mod search;
pub mod session;
pub mod synthesis;
pub mod worker;

pub use complexity::{ComplexityClassifier, ComplexityTier};
pub use coordinator::{LeadCoordinator, PlanSummary, SessionListing};
pub use planner::QueryPlanner;
pub use quality::{AuthorityRule, QualityScorer, QualityTables, ScoredResult};
pub use retry::{BackoffSchedule, Retried, with_retry};
pub use search::{
    RawSearchResult, ScriptedSearchProvider, SearchDepth, SearchExecutor, SearchOutcome,
    SearchProvider, SearchRequestConfig,
};
pub use session::{
    ResearchPlan, Session, SessionStatus, SessionSummary, Task, TaskResult, TaskSpec, TaskStatus,
};
pub use synthesis::{ResearchReport, Synthesizer};
pub use worker::{Worker, WorkerState};

/// Cut `text` to at most `max_chars` characters, marking the cut with "...".
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars < 3 {
        // No room for the marker
        return text.chars().take(max_chars).collect();
    }
    let mut out: String = text.chars().take(max_chars - 3).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 8), "abcde...");
        // Multi-byte characters are counted, not bytes
        assert_eq!(truncate_chars("ééééé", 4), "é...");
        assert_eq!(truncate_chars("abcdefgh", 3), "...");
        assert_eq!(truncate_chars("abcdefgh", 2), "ab");
        assert_eq!(truncate_chars("abcdefgh", 0), "");
    }
}
