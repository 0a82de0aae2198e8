//! Orchestration sessions.
//!
//! A session is created per submitted PRD. Creation decomposes the PRD
//! synchronously and leaves the session in `executing`; the execution, merge
//! and verification engines then drive it to `completed` or `failed`.

mod manager;
mod state;

pub use manager::{OrchestrationSession, SessionManager, SessionProgress, SessionStatusView};
pub use state::SessionStatus;
