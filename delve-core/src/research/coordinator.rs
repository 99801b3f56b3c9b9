//! Lead coordinator: owns session lifecycles and the session registry.
//!
//! Flow: `create_plan` classifies the query and opens a session in
//! `Planning`; each `delegate` spawns a [`Worker`] on the tokio runtime; a
//! caller watches `all_terminal` / `min_findings` (or awaits
//! `wait_for_workers`) and then calls `synthesize`. Synthesis is never
//! triggered automatically.
//!
//! Locking: the registry mutex is always taken before a session mutex.
//! Workers only ever take their own session's mutex, and only to write their
//! own task entry.

use super::complexity::{ComplexityClassifier, ComplexityTier};
use super::quality::{QualityScorer, QualityTables};
use super::search::{ExecutorSettings, SearchExecutor, SearchProvider};
use super::session::{
    ResearchPlan, Session, SessionStatus, SessionSummary, Task, TaskOutcome, TaskResult, TaskSpec,
    TaskStatus,
};
use super::synthesis::{ResearchReport, Synthesizer};
use super::worker::{TaskSlot, Worker, WorkerState};
use crate::config::DelveConfig;
use crate::error::{Result, SessionError, TaskError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Returned by [`LeadCoordinator::create_plan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    pub session_id: Uuid,
    pub description: String,
    pub complexity: ComplexityTier,
    pub worker_budget: usize,
}

/// Active sessions and recently finished ones, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionListing {
    pub active: Vec<SessionSummary>,
    pub recent_completed: Vec<SessionSummary>,
}

struct ActiveSession {
    session: Arc<Mutex<Session>>,
    workers: Vec<(Uuid, JoinHandle<WorkerState>)>,
}

struct SessionRegistry {
    active: HashMap<Uuid, ActiveSession>,
    /// Oldest at the front.
    completed: VecDeque<Session>,
    cap: usize,
}

impl SessionRegistry {
    fn new(cap: usize) -> Self {
        Self {
            active: HashMap::new(),
            completed: VecDeque::new(),
            cap,
        }
    }

    fn archive(&mut self, session: Session) {
        self.completed.push_back(session);
        while self.completed.len() > self.cap {
            if let Some(evicted) = self.completed.pop_front() {
                tracing::debug!(session_id = %evicted.id, "Evicted session from history");
            }
        }
    }

    fn completed(&self, session_id: &Uuid) -> Option<&Session> {
        self.completed.iter().find(|s| s.id == *session_id)
    }

    /// Error for an id that is not active: terminal if archived, otherwise unknown.
    fn not_active(&self, session_id: Uuid) -> SessionError {
        match self.completed(&session_id) {
            Some(session) => SessionError::AlreadyTerminal {
                session_id,
                status: session.status.to_string(),
            },
            None => SessionError::NotFound { session_id },
        }
    }
}

/// Plans research, delegates tasks to workers and synthesizes reports.
pub struct LeadCoordinator {
    executor: Arc<SearchExecutor>,
    classifier: ComplexityClassifier,
    synthesizer: Synthesizer,
    config: DelveConfig,
    registry: Arc<Mutex<SessionRegistry>>,
}

impl LeadCoordinator {
    pub fn new(provider: Arc<dyn SearchProvider>, config: DelveConfig) -> Self {
        Self::with_quality_tables(provider, config, QualityTables::default())
    }

    /// Use custom authority, SEO and marketing tables for scoring.
    pub fn with_quality_tables(
        provider: Arc<dyn SearchProvider>,
        config: DelveConfig,
        tables: QualityTables,
    ) -> Self {
        let scorer = QualityScorer::new(
            tables,
            config.research.min_quality_score,
            config.research.min_content_chars,
        );
        let executor = SearchExecutor::new(provider, scorer, ExecutorSettings::from(&config));
        let registry = SessionRegistry::new(config.research.completed_history_cap);
        Self {
            executor: Arc::new(executor),
            classifier: ComplexityClassifier::new(),
            synthesizer: Synthesizer::new(),
            config,
            registry: Arc::new(Mutex::new(registry)),
        }
    }

    pub fn config(&self) -> &DelveConfig {
        &self.config
    }

    /// Classify `query` and open a new session in `Planning`.
    ///
    /// `max_workers` defaults to the configured limit and is clamped to 1-10.
    pub async fn create_plan(&self, query: &str, max_workers: Option<usize>) -> PlanSummary {
        let max_workers = max_workers.unwrap_or(self.config.research.max_workers);
        let (complexity, worker_budget) = self.classifier.classify_with_budget(query, max_workers);
        let strategy = complexity.strategy().to_string();
        let description = format!(
            "{complexity} query: delegate up to {worker_budget} worker(s). {strategy}"
        );

        let plan = ResearchPlan {
            complexity,
            worker_budget,
            strategy,
            tasks: Vec::new(),
        };
        let session = Session::new(query, Some(plan));
        let session_id = session.id;

        let mut registry = self.registry.lock().await;
        registry.active.insert(
            session_id,
            ActiveSession {
                session: Arc::new(Mutex::new(session)),
                workers: Vec::new(),
            },
        );

        tracing::info!(
            session_id = %session_id,
            complexity = %complexity,
            worker_budget,
            "Research session planned"
        );

        PlanSummary {
            session_id,
            description,
            complexity,
            worker_budget,
        }
    }

    /// Create a task from `spec` and start a worker for it.
    ///
    /// An unknown session id is an error and mutates nothing. The first
    /// delegation moves the session to `Researching`. Exceeding the plan's
    /// worker budget only logs a warning.
    pub async fn delegate(&self, session_id: Uuid, spec: TaskSpec) -> Result<Uuid> {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.active.get_mut(&session_id) else {
            return Err(registry.not_active(session_id).into());
        };

        let task = {
            let mut session = entry.session.lock().await;
            match session.status {
                SessionStatus::Planning => session.transition(SessionStatus::Researching)?,
                SessionStatus::Researching => {}
                other => {
                    return Err(SessionError::InvalidTransition {
                        from: other.to_string(),
                        to: SessionStatus::Researching.to_string(),
                    }
                    .into());
                }
            }

            if let Some(budget) = session.plan.as_ref().map(|p| p.worker_budget)
                && session.task_results.len() >= budget
            {
                tracing::warn!(
                    session_id = %session_id,
                    budget,
                    delegated = session.task_results.len() + 1,
                    "Delegation exceeds the planned worker budget"
                );
            }

            let task = Task::from_spec(spec.clone());
            session.add_task(spec, TaskResult::working(&task));
            task
        };

        let task_id = task.id;
        tracing::info!(
            session_id = %session_id,
            task_id = %task_id,
            role = %task.role,
            "Task delegated"
        );

        let worker = Worker::new(
            task,
            self.executor.clone(),
            TaskSlot::new(entry.session.clone(), task_id),
            self.config.research.finding_max_chars,
        );
        entry.workers.push((task_id, tokio::spawn(worker.run())));

        Ok(task_id)
    }

    /// True iff every delegated task has a terminal status.
    pub async fn all_terminal(&self, session_id: Uuid) -> Result<bool> {
        self.inspect(session_id, Session::all_terminal).await
    }

    /// True iff completed tasks retrieved at least `threshold` findings.
    pub async fn min_findings(&self, session_id: Uuid, threshold: usize) -> Result<bool> {
        self.inspect(session_id, |s| s.findings_count() >= threshold)
            .await
    }

    /// Await every worker spawned so far for the session.
    ///
    /// A worker that panicked or was cancelled gets its task marked failed.
    pub async fn wait_for_workers(&self, session_id: Uuid) -> Result<()> {
        let (session, workers) = {
            let mut registry = self.registry.lock().await;
            if let Some(entry) = registry.active.get_mut(&session_id) {
                (entry.session.clone(), std::mem::take(&mut entry.workers))
            } else if registry.completed(&session_id).is_some() {
                return Ok(());
            } else {
                return Err(SessionError::NotFound { session_id }.into());
            }
        };

        for (task_id, handle) in workers {
            let Err(join_error) = handle.await else {
                continue;
            };
            let crash = TaskError::WorkerCrashed {
                task_id,
                message: join_error.to_string(),
            };
            tracing::warn!(session_id = %session_id, task_id = %task_id, error = %crash, "Worker crashed");
            let mut session = session.lock().await;
            session.finish_task(
                &task_id,
                TaskOutcome::Failed {
                    error: crash.to_string(),
                },
            )?;
        }
        Ok(())
    }

    /// Merge all task results into the final report and complete the session.
    ///
    /// Tasks still running contribute nothing; anything they write later is
    /// ignored. The finished session moves to the bounded history.
    pub async fn synthesize(&self, session_id: Uuid) -> Result<ResearchReport> {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.active.get(&session_id) else {
            return Err(registry.not_active(session_id).into());
        };
        let shared = entry.session.clone();

        let (report, finished) = {
            let mut session = shared.lock().await;
            session.transition(SessionStatus::Synthesizing)?;

            let mut findings = Vec::new();
            let mut sources = Vec::new();
            for result in session
                .task_results
                .iter()
                .filter(|r| r.status == TaskStatus::Complete)
            {
                findings.extend(result.findings.iter().cloned());
                sources.extend(result.sources.iter().cloned());
            }

            let report = self.synthesizer.build_report(&session, &findings, &sources);
            session.complete(report.content.clone())?;
            (report, session.clone())
        };

        registry.active.remove(&session_id);
        registry.archive(finished);

        tracing::info!(
            session_id = %session_id,
            successful = report.successful_tasks,
            failed = report.failed_tasks,
            sources = report.sources_count,
            "Research session synthesized"
        );
        Ok(report)
    }

    /// Fail a session outright. Its workers are aborted and no report is kept.
    pub async fn fail_session(&self, session_id: Uuid, reason: &str) -> Result<()> {
        let mut registry = self.registry.lock().await;
        let Some(entry) = registry.active.get(&session_id) else {
            return Err(registry.not_active(session_id).into());
        };

        let failed = {
            let mut session = entry.session.lock().await;
            session.fail(reason)?;
            session.clone()
        };

        if let Some(entry) = registry.active.remove(&session_id) {
            for (_, handle) in entry.workers {
                handle.abort();
            }
        }
        registry.archive(failed);

        tracing::warn!(session_id = %session_id, reason, "Research session failed");
        Ok(())
    }

    /// Summaries of active and recently finished sessions, newest first.
    pub async fn list_sessions(&self) -> SessionListing {
        let registry = self.registry.lock().await;

        let mut active = Vec::with_capacity(registry.active.len());
        for entry in registry.active.values() {
            active.push(entry.session.lock().await.summary());
        }
        active.sort_by(|a, b| b.started_at.cmp(&a.started_at));

        let recent_completed = registry
            .completed
            .iter()
            .rev()
            .map(Session::summary)
            .collect();

        SessionListing {
            active,
            recent_completed,
        }
    }

    /// Snapshot of a session, active or in history.
    pub async fn get_results(&self, session_id: Uuid) -> Result<Session> {
        self.inspect(session_id, Session::clone).await
    }

    async fn inspect<R>(&self, session_id: Uuid, f: impl FnOnce(&Session) -> R) -> Result<R> {
        let registry = self.registry.lock().await;
        if let Some(entry) = registry.active.get(&session_id) {
            let session = entry.session.lock().await;
            return Ok(f(&*session));
        }
        registry
            .completed(&session_id)
            .map(f)
            .ok_or_else(|| SessionError::NotFound { session_id }.into())
    }
}
