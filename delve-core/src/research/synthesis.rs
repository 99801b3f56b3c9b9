//! Research synthesis: merges every task's findings into the final report.
//!
//! Output is deterministic for a given session and inputs. The quality
//! assessment always states how many tasks succeeded and failed so partial
//! failure is never hidden.

use super::quality::host_of;
use super::session::{QUERY_FAILED_MARKER, Session, TaskStatus};
use super::truncate_chars;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const SUMMARY_FINDINGS: usize = 5;
const SUMMARY_FINDING_CHARS: usize = 200;

/// The synthesized report plus the counts it was built from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchReport {
    /// Markdown report text.
    pub content: String,
    pub findings_count: usize,
    /// Deduplicated source count.
    pub sources_count: usize,
    pub distinct_domains: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
}

/// Builds structured markdown reports from session data.
#[derive(Debug, Default, Clone, Copy)]
pub struct Synthesizer;

impl Synthesizer {
    pub fn new() -> Self {
        Self
    }

    /// Build the final report for `session` from its flattened findings and sources.
    pub fn build_report(
        &self,
        session: &Session,
        findings: &[String],
        sources: &[String],
    ) -> ResearchReport {
        let sources = dedupe(sources);
        let domains: BTreeSet<String> = sources.iter().filter_map(|s| host_of(s)).collect();
        let successful = session.count_with_status(TaskStatus::Complete);
        let failed = session.count_with_status(TaskStatus::Failed);
        let incomplete = session.count_with_status(TaskStatus::Working);
        let query_failures = findings
            .iter()
            .filter(|f| f.starts_with(QUERY_FAILED_MARKER))
            .count();

        let mut out = format!("# Research Report: {}\n\n", session.query);

        out.push_str("## Executive Summary\n\n");
        let highlights: Vec<&String> = findings
            .iter()
            .filter(|f| !f.starts_with(QUERY_FAILED_MARKER))
            .take(SUMMARY_FINDINGS)
            .collect();
        if highlights.is_empty() {
            out.push_str("No findings were retrieved for this query.\n");
        } else {
            for finding in highlights {
                out.push_str(&format!(
                    "- {}\n",
                    truncate_chars(finding, SUMMARY_FINDING_CHARS)
                ));
            }
        }

        out.push_str("\n## Methodology\n\n");
        self.write_methodology(&mut out, session);

        out.push_str("\n## Findings\n\n");
        if findings.is_empty() {
            out.push_str("_None._\n");
        }
        for (i, finding) in findings.iter().enumerate() {
            out.push_str(&format!("{}. {finding}\n", i + 1));
        }

        out.push_str("\n## Sources\n\n");
        if sources.is_empty() {
            out.push_str("_None._\n");
        }
        for (i, source) in sources.iter().enumerate() {
            out.push_str(&format!("[{}] {source}\n", i + 1));
        }

        out.push_str("\n## Quality Assessment\n\n");
        out.push_str(&format!("- Tasks: {successful} successful, {failed} failed\n"));
        if incomplete > 0 {
            out.push_str(&format!(
                "- Incomplete tasks at synthesis: {incomplete} (no findings included)\n"
            ));
        }
        if query_failures > 0 {
            out.push_str(&format!("- Failed queries: {query_failures}\n"));
        }
        out.push_str(&format!("- Unique sources: {}\n", sources.len()));
        out.push_str(&format!("- Distinct source domains: {}\n", domains.len()));

        ResearchReport {
            content: out,
            findings_count: findings.len(),
            sources_count: sources.len(),
            distinct_domains: domains.len(),
            successful_tasks: successful,
            failed_tasks: failed,
        }
    }

    fn write_methodology(&self, out: &mut String, session: &Session) {
        let workers = session.task_results.len();
        match &session.plan {
            Some(plan) => {
                out.push_str(&format!("- Complexity: {}\n", plan.complexity));
                out.push_str(&format!(
                    "- Workers: {workers} (budget {})\n",
                    plan.worker_budget
                ));
                out.push_str(&format!("- Strategy: {}\n", plan.strategy));
                for (spec, result) in plan.tasks.iter().zip(&session.task_results) {
                    out.push_str(&format!(
                        "- {} ({}): {}",
                        spec.role,
                        result.status_label(),
                        spec.objective
                    ));
                    let boundaries = spec.task_boundaries.trim();
                    if !boundaries.is_empty() {
                        out.push_str(&format!(" [out of scope: {boundaries}]"));
                    }
                    out.push('\n');
                }
            }
            None => out.push_str(&format!("- Workers: {workers}\n")),
        }
    }
}

/// Exact-string dedupe preserving first-seen order.
fn dedupe(sources: &[String]) -> Vec<&String> {
    let mut seen = BTreeSet::new();
    sources.iter().filter(|s| seen.insert(s.as_str())).collect()
}
