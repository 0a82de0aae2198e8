//! CLI command implementations.
//!
//! | Module   | Commands handled          |
//! |----------|---------------------------|
//! | `prd`    | `Decompose`, `Analyze`    |
//! | `run`    | `Run`                     |
//! | `config` | `Config`                  |

pub mod config;
pub mod prd;
pub mod run;

pub use config::cmd_config;
pub use prd::{cmd_analyze, cmd_decompose};
pub use run::cmd_run;

use anyhow::{Context, Result};
use prdforge::config::OrchestratorConfig;
use prdforge::decomposition::SplitBy;
use prdforge::prd::Prd;
use std::path::Path;

use super::SplitArgs;

/// Load and validate a PRD file.
pub fn load_prd(path: &Path) -> Result<Prd> {
    let prd = Prd::load(path).with_context(|| format!("Failed to load PRD {}", path.display()))?;
    prd.validate()
        .with_context(|| format!("Invalid PRD {}", path.display()))?;
    Ok(prd)
}

/// Layered config plus the decomposition flags shared by every command.
pub fn load_config(project_dir: &Path, split: &SplitArgs) -> Result<OrchestratorConfig> {
    let mut config =
        OrchestratorConfig::load(project_dir).context("Failed to load configuration")?;
    if let Some(split_by) = &split.split_by {
        config = config.with_split_by(split_by.parse::<SplitBy>()?);
    }
    if let Some(cap) = split.max_stories {
        config = config.with_max_stories_per_agent(cap);
    }
    Ok(config)
}
