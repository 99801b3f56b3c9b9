//! Research session state machine.
//!
//! A [`Session`] is one end-to-end research request. Its status only moves
//! forward (`Planning -> Researching -> Synthesizing -> Complete`) or to
//! `Failed` from any non-terminal status. Each delegated task has one
//! [`TaskResult`] entry, written to a terminal state exactly once.

use super::complexity::ComplexityTier;
use crate::error::SessionError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Findings recorded for a query that exhausted its retries start with this.
pub const QUERY_FAILED_MARKER: &str = "[query failed]";

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Planning,
    Researching,
    Synthesizing,
    Complete,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Complete | SessionStatus::Failed)
    }

    /// Whether `self -> next` is a legal forward step.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match (self, next) {
            (Planning, Researching) | (Researching, Synthesizing) | (Synthesizing, Complete) => {
                true
            }
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Planning => "planning",
            SessionStatus::Researching => "researching",
            SessionStatus::Synthesizing => "synthesizing",
            SessionStatus::Complete => "complete",
            SessionStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Status of one delegated task as seen by the session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Working,
    Complete,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

/// What the lead asks a worker to research.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSpec {
    /// Category tag, e.g. "market_researcher".
    pub role: String,
    pub objective: String,
    pub output_format: String,
    /// What the worker should NOT cover. Reported, never enforced.
    pub task_boundaries: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_sources: Option<Vec<String>>,
    /// Bounds how many queries the planner generates (clamped to 2-8).
    pub estimated_queries: usize,
}

impl TaskSpec {
    pub fn new(role: impl Into<String>, objective: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            objective: objective.into(),
            output_format: "bullet findings with sources".to_string(),
            task_boundaries: String::new(),
            preferred_sources: None,
            estimated_queries: 3,
        }
    }

    pub fn with_boundaries(mut self, boundaries: impl Into<String>) -> Self {
        self.task_boundaries = boundaries.into();
        self
    }

    pub fn with_estimated_queries(mut self, estimated: usize) -> Self {
        self.estimated_queries = estimated;
        self
    }
}

pub const MIN_ESTIMATED_QUERIES: usize = 2;
pub const MAX_ESTIMATED_QUERIES: usize = 8;

/// A delegated unit of work, owned by the worker executing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub role: String,
    pub objective: String,
    pub output_format: String,
    pub task_boundaries: String,
    pub preferred_sources: Option<Vec<String>>,
    pub estimated_queries: usize,
}

impl Task {
    pub fn from_spec(spec: TaskSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: spec.role,
            objective: spec.objective,
            output_format: spec.output_format,
            task_boundaries: spec.task_boundaries,
            preferred_sources: spec.preferred_sources,
            estimated_queries: spec
                .estimated_queries
                .clamp(MIN_ESTIMATED_QUERIES, MAX_ESTIMATED_QUERIES),
        }
    }
}

/// The session's view of a task's progress and outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    pub task_id: Uuid,
    pub role: String,
    pub findings: Vec<String>,
    /// Deduplicated source URLs in discovery order.
    pub sources: Vec<String>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskResult {
    pub fn working(task: &Task) -> Self {
        Self {
            task_id: task.id,
            role: task.role.clone(),
            findings: Vec::new(),
            sources: Vec::new(),
            status: TaskStatus::Working,
            error: None,
        }
    }

    /// "incomplete" for a task still running, otherwise its status.
    pub fn status_label(&self) -> &'static str {
        match self.status {
            TaskStatus::Working => "incomplete",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
        }
    }

    /// Findings backed by retrieved content (failure annotations excluded).
    pub fn retrieved_findings(&self) -> impl Iterator<Item = &String> {
        self.findings
            .iter()
            .filter(|f| !f.starts_with(QUERY_FAILED_MARKER))
    }
}

/// Terminal outcome a worker reports for its task.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Complete {
        findings: Vec<String>,
        sources: Vec<String>,
    },
    Failed {
        error: String,
    },
}

/// The plan produced when a session is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub complexity: ComplexityTier,
    pub worker_budget: usize,
    pub strategy: String,
    /// Specs in delegation order.
    pub tasks: Vec<TaskSpec>,
}

/// One research request and its accumulated state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub query: String,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ResearchPlan>,
    pub task_results: Vec<TaskResult>,
    /// Set if and only if `status == Complete`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_report: Option<String>,
    /// Reason for a session-level failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Session {
    pub fn new(query: impl Into<String>, plan: Option<ResearchPlan>) -> Self {
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            status: SessionStatus::Planning,
            started_at: Utc::now(),
            ended_at: None,
            plan,
            task_results: Vec::new(),
            final_report: None,
            error: None,
        }
    }

    /// Move to `next`, rejecting skips, reversals and exits from terminal states.
    pub fn transition(&mut self, next: SessionStatus) -> Result<(), SessionError> {
        if !self.status.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        tracing::debug!(session_id = %self.id, from = %self.status, to = %next, "Session transition");
        self.status = next;
        Ok(())
    }

    /// Mark the session complete with its report.
    pub fn complete(&mut self, report: String) -> Result<(), SessionError> {
        self.transition(SessionStatus::Complete)?;
        self.final_report = Some(report);
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the session failed. No report is ever attached.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SessionError> {
        self.transition(SessionStatus::Failed)?;
        self.error = Some(reason.into());
        self.final_report = None;
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Register a freshly delegated task.
    pub fn add_task(&mut self, spec: TaskSpec, result: TaskResult) {
        if let Some(plan) = self.plan.as_mut() {
            plan.tasks.push(spec);
        }
        self.task_results.push(result);
    }

    pub fn task_result(&self, task_id: &Uuid) -> Option<&TaskResult> {
        self.task_results.iter().find(|r| r.task_id == *task_id)
    }

    /// Write a task's terminal outcome.
    ///
    /// Returns `Ok(false)` without touching anything if the entry is already
    /// terminal or the session itself has finished; findings are frozen then.
    pub fn finish_task(&mut self, task_id: &Uuid, outcome: TaskOutcome) -> Result<bool, SessionError> {
        let session_done = self.status.is_terminal();
        let entry = self
            .task_results
            .iter_mut()
            .find(|r| r.task_id == *task_id)
            .ok_or(SessionError::TaskNotFound { task_id: *task_id })?;

        if session_done || entry.status.is_terminal() {
            return Ok(false);
        }

        match outcome {
            TaskOutcome::Complete { findings, sources } => {
                entry.findings.extend(findings);
                for source in sources {
                    if !entry.sources.contains(&source) {
                        entry.sources.push(source);
                    }
                }
                entry.status = TaskStatus::Complete;
            }
            TaskOutcome::Failed { error } => {
                entry.error = Some(error);
                entry.status = TaskStatus::Failed;
            }
        }
        Ok(true)
    }

    /// True iff every task result has reached a terminal status.
    pub fn all_terminal(&self) -> bool {
        self.task_results.iter().all(|r| r.status.is_terminal())
    }

    /// Retrieved findings across completed tasks.
    pub fn findings_count(&self) -> usize {
        self.task_results
            .iter()
            .filter(|r| r.status == TaskStatus::Complete)
            .map(|r| r.retrieved_findings().count())
            .sum()
    }

    pub fn count_with_status(&self, status: TaskStatus) -> usize {
        self.task_results.iter().filter(|r| r.status == status).count()
    }

    /// Fraction of tasks that reached a terminal status (0.0-1.0).
    pub fn progress(&self) -> f64 {
        match self.status {
            SessionStatus::Complete => 1.0,
            SessionStatus::Planning => 0.0,
            _ => {
                let total = self.task_results.len().max(1);
                let done = self
                    .task_results
                    .iter()
                    .filter(|r| r.status.is_terminal())
                    .count();
                done as f64 / total as f64
            }
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id,
            query: self.query.clone(),
            status: self.status,
            task_count: self.task_results.len(),
            progress: self.progress(),
            started_at: self.started_at,
            ended_at: self.ended_at,
        }
    }
}

/// Summary of a session for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub query: String,
    pub status: SessionStatus,
    pub task_count: usize,
    pub progress: f64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_task() -> (Session, Uuid) {
        let mut session = Session::new("Solid-state batteries", None);
        let task = Task::from_spec(TaskSpec::new("technical_analyst", "solid-state batteries"));
        let id = task.id;
        session.add_task(
            TaskSpec::new("technical_analyst", "solid-state batteries"),
            TaskResult::working(&task),
        );
        (session, id)
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = Session::new("What is prompt caching?", None);
        assert_eq!(session.status, SessionStatus::Planning);
        assert!(session.is_active());

        session.transition(SessionStatus::Researching).unwrap();
        session.transition(SessionStatus::Synthesizing).unwrap();
        session.complete("report".into()).unwrap();

        assert!(!session.is_active());
        assert_eq!(session.final_report.as_deref(), Some("report"));
        assert!(session.ended_at.is_some());
        assert!((session.progress() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_transitions_never_skip_or_reverse() {
        let mut session = Session::new("Q", None);
        assert!(session.transition(SessionStatus::Synthesizing).is_err());
        assert!(session.complete("early".into()).is_err());
        assert!(session.final_report.is_none());

        session.transition(SessionStatus::Researching).unwrap();
        assert!(session.transition(SessionStatus::Planning).is_err());
        assert_eq!(session.status, SessionStatus::Researching);
    }

    #[test]
    fn test_fail_from_any_non_terminal() {
        for start in [
            SessionStatus::Planning,
            SessionStatus::Researching,
            SessionStatus::Synthesizing,
        ] {
            assert!(start.can_transition_to(SessionStatus::Failed));
        }
        let mut session = Session::new("Q", None);
        session.fail("coordinator lost state").unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.error.as_deref(), Some("coordinator lost state"));
        assert!(session.final_report.is_none());

        // Terminal is absorbing
        assert!(session.transition(SessionStatus::Researching).is_err());
        assert!(session.fail("again").is_err());
    }

    #[test]
    fn test_finish_task_once() {
        let (mut session, id) = session_with_task();
        assert!(!session.all_terminal());

        let written = session
            .finish_task(
                &id,
                TaskOutcome::Complete {
                    findings: vec!["a".into()],
                    sources: vec!["https://a.example".into(), "https://a.example".into()],
                },
            )
            .unwrap();
        assert!(written);
        assert!(session.all_terminal());
        assert_eq!(session.task_result(&id).unwrap().sources.len(), 1);

        let rewritten = session
            .finish_task(&id, TaskOutcome::Failed { error: "late".into() })
            .unwrap();
        assert!(!rewritten);
        assert_eq!(session.task_result(&id).unwrap().status, TaskStatus::Complete);
    }

    #[test]
    fn test_finish_unknown_task() {
        let (mut session, _) = session_with_task();
        let err = session
            .finish_task(&Uuid::new_v4(), TaskOutcome::Failed { error: "x".into() })
            .unwrap_err();
        assert!(matches!(err, SessionError::TaskNotFound { .. }));
    }

    #[test]
    fn test_findings_count_skips_failure_annotations() {
        let (mut session, id) = session_with_task();
        session
            .finish_task(
                &id,
                TaskOutcome::Complete {
                    findings: vec![
                        "real excerpt".into(),
                        format!("{QUERY_FAILED_MARKER} foo: timed out"),
                    ],
                    sources: vec![],
                },
            )
            .unwrap();
        assert_eq!(session.findings_count(), 1);
    }

    #[test]
    fn test_estimated_queries_clamped() {
        let task = Task::from_spec(TaskSpec::new("r", "o").with_estimated_queries(40));
        assert_eq!(task.estimated_queries, MAX_ESTIMATED_QUERIES);
        let task = Task::from_spec(TaskSpec::new("r", "o").with_estimated_queries(0));
        assert_eq!(task.estimated_queries, MIN_ESTIMATED_QUERIES);
    }
}
