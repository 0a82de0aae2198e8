//! Execution engine.
//!
//! Each pending sub-PRD is handed to a [`SpecialistWorker`]. In sequential
//! mode units run strictly one after another; in parallel mode at most
//! `max_concurrent` worker calls are outstanding at any instant. Results are
//! always returned in sub-PRD order.
//!
//! ## Example
//!
//! ```no_run
//! use prdforge::execution::{ExecutionEngine, ExecutionSettings, ProcessWorker};
//! use prdforge::session::SessionManager;
//! use std::sync::Arc;
//!
//! # async fn example(sessions: Arc<SessionManager>, session_id: &str) -> anyhow::Result<()> {
//! let worker = Arc::new(ProcessWorker::new("./scripts/specialist.sh"));
//! let engine = ExecutionEngine::new(sessions, worker, ExecutionSettings::default())?;
//! let results = engine.execute_session(session_id).await?;
//! for r in &results {
//!     println!("{} -> {}", r.sub_prd_id, r.success);
//! }
//! # Ok(())
//! # }
//! ```

mod executor;
mod types;
mod worker;

pub use executor::{
    ConflictPolicy, DEFAULT_MAX_CONCURRENT, DEFAULT_UNIT_TIMEOUT_SECS, ExecutionEngine,
    ExecutionSettings,
};
pub use types::{ExecutionError, ExecutionResult};
pub use worker::{ProcessWorker, SpecialistWorker, WorkerOutcome, parse_worker_output};
