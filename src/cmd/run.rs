//! Full pipeline: `prdforge run`.

use anyhow::{Context, Result};
use prdforge::config::OrchestratorConfig;
use prdforge::decomposition::analyze_conflicts;
use prdforge::events::OrchestratorEvent;
use prdforge::execution::ConflictPolicy;
use prdforge::merge::MergeMode;
use prdforge::orchestrator::Orchestrator;
use prdforge::ui::{RunUi, UiMode};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::super::{RunArgs, SplitArgs};
use super::{load_config, load_prd};

/// Apply `run` flags on top of the layered configuration.
fn apply_run_flags(mut config: OrchestratorConfig, args: &RunArgs) -> Result<OrchestratorConfig> {
    if args.sequential {
        config = config.with_parallel_execution(false);
    }
    if let Some(n) = args.max_concurrent {
        config = config.with_max_concurrent(n);
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_unit_timeout(Duration::from_secs(secs));
    }
    if let Some(cmd) = &args.worker_cmd {
        config = config.with_worker_command(cmd.clone());
    }
    if let Some(cmd) = &args.test_cmd {
        config = config.with_test_command(cmd.clone());
    }
    if let Some(mode) = &args.merge_mode {
        config = config.with_merge_mode(mode.parse::<MergeMode>()?);
    }
    if let Some(policy) = &args.conflict_policy {
        config = config.with_conflict_policy(policy.parse::<ConflictPolicy>()?);
    }
    Ok(config)
}

pub async fn cmd_run(
    project_dir: &Path,
    prd_path: &Path,
    split: &SplitArgs,
    args: &RunArgs,
    verbose: bool,
) -> Result<()> {
    let prd = load_prd(prd_path)?;
    let config = apply_run_flags(load_config(project_dir, split)?, args)?;

    let ui = Arc::new(RunUi::new(UiMode::parse(&args.ui), verbose));
    let listener_ui = ui.clone();
    let config = config.with_event_listener(Arc::new(move |event: &OrchestratorEvent| {
        listener_ui.handle_event(event);
    }));

    let orchestrator =
        Arc::new(Orchestrator::from_config(config).context("Failed to start orchestrator")?);

    let plan = orchestrator.decompose_prd(&prd, &orchestrator.config().decompose_options()?);
    ui.print_plan(&plan, &analyze_conflicts(&plan));

    // Ctrl-C cancels cooperatively; running units finish.
    let watcher = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                for session in orchestrator.get_all_sessions() {
                    if !session.status.is_terminal() {
                        orchestrator.cancel_session(&session.id);
                    }
                }
            }
        })
    };

    let report = orchestrator.run(prd).await;
    watcher.abort();
    let report = report.context("Orchestration failed")?;

    ui.finish(&report);

    if !report.succeeded() {
        anyhow::bail!(
            "Session {} ended {}{}",
            report.session_id,
            report.status,
            report
                .error
                .as_deref()
                .map(|e| format!(": {}", e))
                .unwrap_or_default()
        );
    }
    Ok(())
}
