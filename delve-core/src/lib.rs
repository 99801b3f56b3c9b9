//! # Delve Core
//!
//! Multi-worker research orchestration. A lead coordinator classifies a
//! query, delegates bounded tasks to concurrent workers that search an
//! external provider, scores and filters what comes back, and synthesizes a
//! single report that states exactly how many tasks succeeded and failed.

pub mod config;
pub mod error;
pub mod logging;
pub mod research;

// Re-export commonly used types at the crate root.
pub use config::{
    ConfigOverrides, DelveConfig, LoggingConfig, LoggingOverrides, ResearchConfig,
    ResearchOverrides, RetryConfig, RetryOverrides, load_config,
};
pub use error::{ConfigError, DelveError, Result, SearchError, SessionError, TaskError};
pub use logging::init_logging;
pub use research::{
    LeadCoordinator, PlanSummary, ResearchReport, ScriptedSearchProvider, SearchProvider,
    Session, SessionListing, SessionStatus, TaskSpec, TaskStatus,
};
