pub mod config;
pub mod decomposition;
pub mod errors;
pub mod events;
pub mod execution;
pub mod merge;
pub mod orchestrator;
pub mod prd;
pub mod session;
pub mod specialists;
pub mod telemetry;
pub mod ui;
pub mod util;
pub mod verification;
