//! Search collaborator seam and the per-query executor.
//!
//! The executor runs one query against a [`SearchProvider`] with a per-attempt
//! timeout and bounded retries, then pipes raw hits through the
//! [`QualityScorer`]. It never returns an error: an exhausted query yields a
//! [`SearchOutcome`] with `error` set and no results.

use super::quality::{QualityScorer, ScoredResult};
use super::retry::{BackoffSchedule, with_retry};
use crate::config::DelveConfig;
use crate::error::SearchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One hit as returned by the search collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawSearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchDepth {
    Basic,
    Advanced,
}

/// Per-call configuration passed to the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequestConfig {
    pub max_results: usize,
    pub search_depth: SearchDepth,
    pub timeout_ms: u64,
}

/// The external web-search collaborator.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        query: &str,
        config: &SearchRequestConfig,
    ) -> Result<Vec<RawSearchResult>, SearchError>;
}

/// Bookkeeping for one executed query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchMetadata {
    pub attempts: u32,
    /// Hits the collaborator returned on the successful attempt.
    pub returned_count: usize,
    /// Hits that survived quality filtering, before truncation.
    pub filtered_count: usize,
}

/// Result of one query. Consumed immediately by the worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub query: String,
    pub results: Vec<ScoredResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: SearchMetadata,
}

impl SearchOutcome {
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}

/// Executor settings derived from [`DelveConfig`].
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_retries: u32,
    pub schedule: BackoffSchedule,
    pub timeout: Duration,
    pub basic_max_results: usize,
    pub advanced_max_results: usize,
    pub results_per_query: usize,
}

impl From<&DelveConfig> for ExecutorSettings {
    fn from(config: &DelveConfig) -> Self {
        Self {
            max_retries: config.retry.max_retries,
            schedule: config.retry.schedule(),
            timeout: config.research.search_timeout(),
            basic_max_results: config.research.basic_max_results,
            advanced_max_results: config.research.advanced_max_results,
            results_per_query: config.research.results_per_query,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&DelveConfig::default())
    }
}

/// Runs single queries with retry, timeout and quality filtering.
pub struct SearchExecutor {
    provider: Arc<dyn SearchProvider>,
    scorer: QualityScorer,
    settings: ExecutorSettings,
}

impl SearchExecutor {
    pub fn new(
        provider: Arc<dyn SearchProvider>,
        scorer: QualityScorer,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            provider,
            scorer,
            settings,
        }
    }

    /// Depth and result count for a query at `position` in a batch of `batch_len`.
    pub fn request_config(&self, position: usize, batch_len: usize) -> SearchRequestConfig {
        let search_depth = if position == 0 || batch_len <= 2 {
            SearchDepth::Basic
        } else {
            SearchDepth::Advanced
        };
        let max_results = match search_depth {
            SearchDepth::Basic => self.settings.basic_max_results,
            SearchDepth::Advanced => self.settings.advanced_max_results,
        };
        SearchRequestConfig {
            max_results,
            search_depth,
            timeout_ms: self.settings.timeout.as_millis() as u64,
        }
    }

    /// Execute one query. Never fails; see [`SearchOutcome::error`].
    pub async fn execute(&self, query: &str, position: usize, batch_len: usize) -> SearchOutcome {
        let request = self.request_config(position, batch_len);
        let timeout = self.settings.timeout;

        let retried = with_retry(&self.settings.schedule, self.settings.max_retries, |attempt| {
            let request = &request;
            async move {
                tracing::debug!(query, attempt, depth = ?request.search_depth, "Search attempt");
                match tokio::time::timeout(timeout, self.provider.search(query, request)).await {
                    Ok(result) => result,
                    Err(_) => Err(SearchError::Timeout {
                        timeout_ms: request.timeout_ms,
                    }),
                }
            }
        })
        .await;

        match retried.result {
            Ok(raw) => {
                let returned_count = raw.len();
                let mut results = self.scorer.filter_and_rank(raw, query);
                let filtered_count = results.len();
                results.truncate(self.settings.results_per_query);
                tracing::debug!(
                    query,
                    returned = returned_count,
                    kept = results.len(),
                    "Search succeeded"
                );
                SearchOutcome {
                    query: query.to_string(),
                    results,
                    error: None,
                    metadata: SearchMetadata {
                        attempts: retried.attempts,
                        returned_count,
                        filtered_count,
                    },
                }
            }
            Err(e) => {
                let exhausted = SearchError::RetriesExhausted {
                    attempts: retried.attempts,
                    last_error: e.to_string(),
                };
                tracing::warn!(query, error = %exhausted, "Search query failed");
                SearchOutcome {
                    query: query.to_string(),
                    results: Vec::new(),
                    error: Some(exhausted.to_string()),
                    metadata: SearchMetadata {
                        attempts: retried.attempts,
                        ..Default::default()
                    },
                }
            }
        }
    }
}

/// Deterministic in-memory provider for tests and demos.
///
/// Answers from canned per-query results (falling back to a default set),
/// can fail specific queries a fixed number of times or forever, and records
/// every call it receives.
#[derive(Default)]
pub struct ScriptedSearchProvider {
    responses: HashMap<String, Vec<RawSearchResult>>,
    default_results: Vec<RawSearchResult>,
    always_fail: HashSet<String>,
    unreachable: bool,
    delay: Option<Duration>,
    remaining_failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<(String, SearchRequestConfig)>>,
}

impl ScriptedSearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Results returned for any query without a specific response.
    pub fn with_default_results(mut self, results: Vec<RawSearchResult>) -> Self {
        self.default_results = results;
        self
    }

    pub fn with_response(mut self, query: impl Into<String>, results: Vec<RawSearchResult>) -> Self {
        self.responses.insert(query.into(), results);
        self
    }

    /// Fail the first `times` calls for `query`, then answer normally.
    pub fn failing_times(self, query: impl Into<String>, times: u32) -> Self {
        self.remaining_failures
            .lock()
            .unwrap()
            .insert(query.into(), times);
        self
    }

    /// Fail every call for `query`.
    pub fn failing_query(mut self, query: impl Into<String>) -> Self {
        self.always_fail.insert(query.into());
        self
    }

    /// Fail every call for every query.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, query: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(q, _)| q == query)
            .count()
    }

    pub fn recorded_calls(&self) -> Vec<(String, SearchRequestConfig)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for ScriptedSearchProvider {
    async fn search(
        &self,
        query: &str,
        config: &SearchRequestConfig,
    ) -> Result<Vec<RawSearchResult>, SearchError> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), config.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable || self.always_fail.contains(query) {
            return Err(SearchError::Request {
                message: "connection refused".to_string(),
            });
        }

        {
            let mut remaining = self.remaining_failures.lock().unwrap();
            if let Some(left) = remaining.get_mut(query) {
                if *left > 0 {
                    *left -= 1;
                    return Err(SearchError::Request {
                        message: "transient upstream error".to_string(),
                    });
                }
            }
        }

        let results = self
            .responses
            .get(query)
            .unwrap_or(&self.default_results)
            .iter()
            .take(config.max_results)
            .cloned()
            .collect();
        Ok(results)
    }
}
