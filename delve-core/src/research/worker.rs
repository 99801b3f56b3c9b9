//! Worker: executes one task by fanning its queries out concurrently.
//!
//! States: `Ready -> Working -> {Complete, Failed}`. A single query failing
//! never fails the task; it is recorded as an annotated finding. The task
//! fails only when aggregation itself cannot produce anything, e.g. every
//! query exhausted its retries.

use super::planner::QueryPlanner;
use super::search::{SearchExecutor, SearchOutcome};
use super::session::{QUERY_FAILED_MARKER, Session, Task, TaskOutcome};
use super::truncate_chars;
use crate::error::TaskError;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Ready,
    Working,
    Complete,
    Failed,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Complete | WorkerState::Failed)
    }
}

/// Write access to exactly one task's result entry in a shared session.
///
/// The session lock is taken only for the write itself, never across a
/// search call.
#[derive(Clone)]
pub struct TaskSlot {
    session: Arc<Mutex<Session>>,
    task_id: Uuid,
}

impl TaskSlot {
    pub fn new(session: Arc<Mutex<Session>>, task_id: Uuid) -> Self {
        Self { session, task_id }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Record the terminal outcome. Returns false if the entry was already
    /// frozen (terminal task or finished session).
    pub async fn report(&self, outcome: TaskOutcome) -> bool {
        let mut session = self.session.lock().await;
        match session.finish_task(&self.task_id, outcome) {
            Ok(written) => {
                if !written {
                    tracing::debug!(
                        session_id = %session.id,
                        task_id = %self.task_id,
                        "Task result already frozen, dropping late outcome"
                    );
                }
                written
            }
            Err(e) => {
                tracing::warn!(task_id = %self.task_id, error = %e, "Failed to record task outcome");
                false
            }
        }
    }
}

/// Executes a single task.
pub struct Worker {
    task: Task,
    state: WorkerState,
    planner: QueryPlanner,
    executor: Arc<SearchExecutor>,
    slot: TaskSlot,
    finding_max_chars: usize,
}

impl Worker {
    pub fn new(
        task: Task,
        executor: Arc<SearchExecutor>,
        slot: TaskSlot,
        finding_max_chars: usize,
    ) -> Self {
        Self {
            task,
            state: WorkerState::Ready,
            planner: QueryPlanner::new(),
            executor,
            slot,
            finding_max_chars,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Run the task to a terminal state and report it into the session.
    pub async fn run(mut self) -> WorkerState {
        let queries = self.planner.generate_queries(&self.task);
        self.state = WorkerState::Working;
        tracing::info!(
            task_id = %self.task.id,
            role = %self.task.role,
            queries = queries.len(),
            "Worker started"
        );

        let total = queries.len();
        let outcomes = join_all(
            queries
                .iter()
                .enumerate()
                .map(|(position, query)| self.executor.execute(query, position, total)),
        )
        .await;

        let outcome = match aggregate(self.task.id, &queries, &outcomes, self.finding_max_chars) {
            Ok((findings, sources)) => {
                tracing::info!(
                    task_id = %self.task.id,
                    findings = findings.len(),
                    sources = sources.len(),
                    "Worker complete"
                );
                self.state = WorkerState::Complete;
                TaskOutcome::Complete { findings, sources }
            }
            Err(e) => {
                tracing::warn!(task_id = %self.task.id, error = %e, "Worker failed");
                self.state = WorkerState::Failed;
                TaskOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        self.slot.report(outcome).await;
        self.state
    }
}

/// Merge settled query outcomes into findings and deduplicated sources.
///
/// Makes no assumption about completion order beyond having every outcome.
pub fn aggregate(
    task_id: Uuid,
    queries: &[String],
    outcomes: &[SearchOutcome],
    finding_max_chars: usize,
) -> Result<(Vec<String>, Vec<String>), TaskError> {
    if outcomes.is_empty() {
        return Err(TaskError::AggregationFailed {
            task_id,
            queries: queries.to_vec(),
            message: "no queries were executed".to_string(),
        });
    }

    if outcomes.iter().all(SearchOutcome::is_failure) {
        let last_error = outcomes
            .iter()
            .rev()
            .find_map(|o| o.error.clone())
            .unwrap_or_default();
        return Err(TaskError::AggregationFailed {
            task_id,
            queries: queries.to_vec(),
            message: format!("every query failed; last error: {last_error}"),
        });
    }

    let mut findings = Vec::new();
    let mut sources: Vec<String> = Vec::new();

    for outcome in outcomes {
        if let Some(ref error) = outcome.error {
            findings.push(format!("{QUERY_FAILED_MARKER} {}: {error}", outcome.query));
            continue;
        }
        for result in &outcome.results {
            let excerpt = truncate_chars(result.content.trim(), finding_max_chars);
            findings.push(format!("[{}] {excerpt}", outcome.query));
            if !sources.contains(&result.url) {
                sources.push(result.url.clone());
            }
        }
    }

    Ok((findings, sources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::research::quality::{QualityScorer, ScoredResult};
    use crate::research::search::{
        ExecutorSettings, RawSearchResult, ScriptedSearchProvider, SearchMetadata,
    };
    use crate::research::session::{TaskResult, TaskSpec, TaskStatus};

    fn ok_outcome(query: &str, urls: &[&str]) -> SearchOutcome {
        SearchOutcome {
            query: query.to_string(),
            results: urls
                .iter()
                .map(|u| ScoredResult {
                    title: "T".into(),
                    url: u.to_string(),
                    content: "c".repeat(500),
                    published_date: None,
                    quality_score: 0.7,
                })
                .collect(),
            error: None,
            metadata: SearchMetadata::default(),
        }
    }

    fn failed_outcome(query: &str) -> SearchOutcome {
        SearchOutcome {
            query: query.to_string(),
            results: vec![],
            error: Some("Search failed after 3 attempts: boom".into()),
            metadata: SearchMetadata::default(),
        }
    }

    #[test]
    fn test_aggregate_dedupes_sources_and_truncates() {
        let outcomes = vec![
            ok_outcome("q1", &["https://a.example/1", "https://b.example/2"]),
            ok_outcome("q2", &["https://a.example/1"]),
        ];
        let (findings, sources) =
            aggregate(Uuid::nil(), &["q1".into(), "q2".into()], &outcomes, 350).unwrap();
        assert_eq!(findings.len(), 3);
        assert_eq!(sources, vec!["https://a.example/1", "https://b.example/2"]);
        // "[q1] " prefix plus an excerpt of at most 350 chars
        assert!(findings.iter().all(|f| f.chars().count() <= 355));
    }

    #[test]
    fn test_aggregate_annotates_partial_failure() {
        let outcomes = vec![ok_outcome("q1", &["https://a.example/1"]), failed_outcome("q2")];
        let (findings, _) =
            aggregate(Uuid::nil(), &["q1".into(), "q2".into()], &outcomes, 350).unwrap();
        assert_eq!(findings.len(), 2);
        assert!(findings[1].starts_with(QUERY_FAILED_MARKER));
        assert!(findings[1].contains("q2"));
    }

    #[test]
    fn test_aggregate_fails_when_every_query_fails() {
        let queries = vec!["q1".to_string(), "q2".to_string()];
        let outcomes = vec![failed_outcome("q1"), failed_outcome("q2")];
        let err = aggregate(Uuid::nil(), &queries, &outcomes, 350).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("q1 | q2"));
        assert!(text.contains("every query failed"));
    }

    fn worker_for(provider: Arc<ScriptedSearchProvider>) -> (Worker, Arc<Mutex<Session>>, Uuid) {
        let spec = TaskSpec::new("market_researcher", "Research the market for vertical farming")
            .with_estimated_queries(3);
        let task = Task::from_spec(spec.clone());
        let task_id = task.id;
        let mut session = Session::new("vertical farming", None);
        session.add_task(spec, TaskResult::working(&task));
        let session = Arc::new(Mutex::new(session));

        let executor = Arc::new(SearchExecutor::new(
            provider,
            QualityScorer::default(),
            ExecutorSettings::default(),
        ));
        let worker = Worker::new(task, executor, TaskSlot::new(session.clone(), task_id), 350);
        (worker, session, task_id)
    }

    #[tokio::test]
    async fn test_worker_completes_and_writes_result() {
        let provider = Arc::new(ScriptedSearchProvider::new().with_default_results(vec![
            RawSearchResult {
                title: "Vertical farming market report".into(),
                url: "https://www.reuters.com/farming".into(),
                content: "Indoor agriculture investment grew steadily. ".repeat(8),
                published_date: None,
            },
        ]));
        let (worker, session, task_id) = worker_for(provider.clone());
        assert_eq!(worker.state(), WorkerState::Ready);

        let state = worker.run().await;
        assert_eq!(state, WorkerState::Complete);
        // estimated 3 -> 4 queries, all concurrent
        assert_eq!(provider.call_count(), 4);

        let session = session.lock().await;
        let result = session.task_result(&task_id).unwrap();
        assert_eq!(result.status, TaskStatus::Complete);
        assert_eq!(result.findings.len(), 4);
        assert_eq!(result.sources, vec!["https://www.reuters.com/farming"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_fails_when_search_unreachable() {
        let provider = Arc::new(ScriptedSearchProvider::new().unreachable());
        let (worker, session, task_id) = worker_for(provider);

        let state = worker.run().await;
        assert_eq!(state, WorkerState::Failed);

        let session = session.lock().await;
        let result = session.task_result(&task_id).unwrap();
        assert_eq!(result.status, TaskStatus::Failed);
        let error = result.error.as_deref().unwrap();
        assert!(error.contains("vertical farming market"));
        assert!(result.findings.is_empty());
    }
}
