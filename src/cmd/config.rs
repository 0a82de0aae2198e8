//! Configuration view and validation commands: `prdforge config`.

use anyhow::{Context, Result};
use prdforge::config::OrchestratorConfig;
use std::path::Path;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    let project_path = OrchestratorConfig::project_config_path(project_dir);
    let user_path = OrchestratorConfig::user_config_path();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("prdforge configuration");
            println!("======================");
            println!();
            for (label, path) in [("user", user_path.as_deref()), ("project", Some(project_path.as_path()))] {
                match path {
                    Some(p) if p.exists() => println!("{:<8} {}", label, p.display()),
                    Some(p) => println!("{:<8} {} (not found)", label, p.display()),
                    None => println!("{:<8} (no config directory)", label),
                }
            }
            println!();
            println!("Effective values (files, then PRDFORGE_* env):");
            println!();
            let config =
                OrchestratorConfig::load(project_dir).context("Failed to load configuration")?;
            let text =
                toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            println!("{}", text);
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();
            let config =
                OrchestratorConfig::load(project_dir).context("Failed to load configuration")?;
            config.validate().context("Configuration is invalid")?;
            if config.worker.command.is_none() {
                println!("Note: no worker command configured; `prdforge run` needs --worker-cmd.");
            }
            if config.verification.command.is_none() {
                println!("Note: no test command configured; `prdforge run` needs --test-cmd.");
            }
            println!("Configuration is valid.");
            println!();
        }
        Some(ConfigCommands::Init) => {
            if project_path.exists() {
                println!("prdforge.toml already exists at {}", project_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }
            if let Some(dir) = project_path.parent() {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("Failed to create {}", dir.display()))?;
            }

            let text = toml::to_string_pretty(&OrchestratorConfig::default())
                .context("Failed to serialize configuration")?;
            std::fs::write(&project_path, text)
                .with_context(|| format!("Failed to write {}", project_path.display()))?;

            println!("Created prdforge.toml at {}", project_path.display());
            println!();
            println!("You can now customize:");
            println!("  - parallel_execution, max_concurrent, unit_timeout_secs");
            println!("  - [decomposition] split_by, max_stories_per_agent");
            println!("  - [worker] command, [verification] command and file_args");
            println!("  - [[specialists]] id, domain, patterns");
            println!();
        }
    }

    Ok(())
}
