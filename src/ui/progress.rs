//! Terminal progress for `prdforge run`.
//!
//! Three output modes:
//! - `full`: progress bars per sub-PRD with colours
//! - `minimal`: one line per finished unit
//! - `json`: every [`OrchestratorEvent`] as a JSON line on stdout

use crate::decomposition::{ConflictAnalysis, SubPrd};
use crate::events::OrchestratorEvent;
use crate::orchestrator::RunReport;
use crate::ui::icons::{CHECK, CROSS, MERGE, RUNNING, SPARKLE, SPLIT, STOP, TEST, WARN};
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

/// Output mode for the run UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    #[default]
    Full,
    Minimal,
    Json,
}

impl std::str::FromStr for UiMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "json" => Self::Json,
            "minimal" => Self::Minimal,
            _ => Self::Full,
        })
    }
}

impl UiMode {
    /// Parse a UI mode; unknown values fall back to `full`.
    pub fn parse(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

fn style_or_default(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Renders orchestrator events.
///
/// Safe to call from the synchronous event listener: every method takes
/// `&self` and locks only briefly.
pub struct RunUi {
    mode: UiMode,
    multi: MultiProgress,
    header_bar: ProgressBar,
    unit_bars: Mutex<HashMap<String, ProgressBar>>,
    verbose: bool,
    term: Term,
}

impl RunUi {
    pub fn new(mode: UiMode, verbose: bool) -> Self {
        let multi = if mode == UiMode::Full {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };

        let header_bar = multi.add(ProgressBar::new(0));
        header_bar.set_style(
            style_or_default("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .progress_chars("█▓▒░"),
        );
        header_bar.set_prefix("Units");
        header_bar.set_message("Decomposing...");

        Self {
            mode,
            multi,
            header_bar,
            unit_bars: Mutex::new(HashMap::new()),
            verbose,
            term: Term::stdout(),
        }
    }

    pub fn mode(&self) -> UiMode {
        self.mode
    }

    pub fn handle_event(&self, event: &OrchestratorEvent) {
        match self.mode {
            UiMode::Json => self.handle_json(event),
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }

    fn handle_json(&self, event: &OrchestratorEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(&self.term, "{}", json);
        }
    }

    fn handle_minimal(&self, event: &OrchestratorEvent) {
        let line = match event {
            OrchestratorEvent::DecompositionComplete {
                strategy, sub_prds, ..
            } => format!("Decomposed by {} into {} sub-PRDs", strategy, sub_prds),
            OrchestratorEvent::SubprdCompleted {
                sub_prd_id,
                duration_ms,
                ..
            } => format!(
                "✓ {} ({})",
                sub_prd_id,
                format_duration(Duration::from_millis(*duration_ms))
            ),
            OrchestratorEvent::SubprdFailed {
                sub_prd_id, error, ..
            } => format!("✗ {} ({})", sub_prd_id, error),
            OrchestratorEvent::MergeComplete {
                success, conflicts, ..
            } => format!(
                "Merge: {}",
                if *success {
                    "ok".to_string()
                } else {
                    format!("refused ({} conflicts)", conflicts)
                }
            ),
            OrchestratorEvent::VerificationComplete {
                passed,
                tests_run,
                tests_passed,
                ..
            } => format!(
                "Verify: {} {}/{}",
                if *passed { "✓" } else { "✗" },
                tests_passed,
                tests_run
            ),
            OrchestratorEvent::SessionCancelled {
                cancelled_units, ..
            } => format!("Cancelled ({} units skipped)", cancelled_units),
            _ => return,
        };
        let _ = writeln!(&self.term, "{}", line);
    }

    fn handle_full(&self, event: &OrchestratorEvent) {
        match event {
            OrchestratorEvent::SessionStarted {
                session_id,
                prd_id,
                stories,
            } => {
                self.multi
                    .println(format!(
                        "{} PRD {} ({} stories) session {}",
                        SPARKLE,
                        style(prd_id).yellow().bold(),
                        stories,
                        style(session_id).dim()
                    ))
                    .ok();
            }
            OrchestratorEvent::DecompositionComplete {
                strategy,
                sub_prds,
                can_parallelize,
                ..
            } => {
                self.header_bar.set_length(*sub_prds as u64);
                self.header_bar.set_message("Executing...");
                let note = if *can_parallelize {
                    style("independent").green()
                } else {
                    style("shared files").yellow()
                };
                self.multi
                    .println(format!(
                        "{} Split by {} into {} sub-PRDs ({})",
                        SPLIT,
                        style(strategy).cyan(),
                        style(sub_prds).green().bold(),
                        note
                    ))
                    .ok();
            }
            OrchestratorEvent::SubprdStarted {
                sub_prd_id,
                specialist_id,
                ..
            } => self.on_unit_started(sub_prd_id, specialist_id),
            OrchestratorEvent::SubprdCompleted {
                sub_prd_id,
                duration_ms,
                files_changed,
                ..
            } => {
                let msg = format!(
                    "{} {} files ({})",
                    CHECK,
                    files_changed,
                    format_duration(Duration::from_millis(*duration_ms))
                );
                self.on_unit_finished(sub_prd_id, true, msg);
            }
            OrchestratorEvent::SubprdFailed {
                sub_prd_id, error, ..
            } => {
                self.on_unit_finished(sub_prd_id, false, format!("{} {}", CROSS, error));
            }
            OrchestratorEvent::MergeComplete {
                success,
                merged_files,
                conflicts,
                ..
            } => {
                let line = if *success {
                    format!(
                        "{} Merged {} files{}",
                        MERGE,
                        style(merged_files).green().bold(),
                        if *conflicts > 0 {
                            format!(" ({} conflicts resolved by order)", conflicts)
                        } else {
                            String::new()
                        }
                    )
                } else {
                    format!(
                        "{} Merge refused: {} conflicts",
                        WARN,
                        style(conflicts).red().bold()
                    )
                };
                self.multi.println(line).ok();
            }
            OrchestratorEvent::VerificationComplete {
                passed,
                tests_run,
                tests_passed,
                ..
            } => {
                let status = if *passed {
                    style("passed").green().bold()
                } else {
                    style("failed").red().bold()
                };
                self.multi
                    .println(format!(
                        "{} Verification {} ({}/{} tests)",
                        TEST, status, tests_passed, tests_run
                    ))
                    .ok();
            }
            OrchestratorEvent::SessionCancelled {
                cancelled_units, ..
            } => {
                self.multi
                    .println(format!(
                        "{} Cancelled, {} units skipped",
                        STOP, cancelled_units
                    ))
                    .ok();
            }
        }
    }

    fn on_unit_started(&self, sub_prd_id: &str, specialist_id: &str) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner} {prefix:.bold} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_prefix(format!("[{}]", sub_prd_id));
        bar.set_message(format!("{} {}", RUNNING, style(specialist_id).cyan()));
        bar.enable_steady_tick(Duration::from_millis(100));

        self.unit_bars.lock().insert(sub_prd_id.to_string(), bar);

        if self.verbose {
            self.multi
                .println(format!(
                    "  {} {} dispatched to {}",
                    style("▶").cyan(),
                    style(sub_prd_id).yellow(),
                    specialist_id
                ))
                .ok();
        }
    }

    fn on_unit_finished(&self, sub_prd_id: &str, success: bool, msg: String) {
        if let Some(bar) = self.unit_bars.lock().remove(sub_prd_id) {
            bar.finish_with_message(msg);
        } else if !success {
            self.multi.println(format!("  [{}] {}", sub_prd_id, msg)).ok();
        }
        self.header_bar.inc(1);
    }

    /// Print the decomposition plan before execution.
    pub fn print_plan(&self, sub_prds: &[SubPrd], analysis: &ConflictAnalysis) {
        if self.mode != UiMode::Full {
            return;
        }
        for sub in sub_prds {
            self.multi
                .println(format!(
                    "  {} {} stories, complexity {} -> {}",
                    style(&sub.id).yellow(),
                    sub.stories.len(),
                    sub.total_complexity(),
                    style(&sub.assigned_specialist_id).cyan()
                ))
                .ok();
        }
        for conflict in &analysis.potential_conflicts {
            self.multi
                .println(format!(
                    "  {} {} touched by {} and {}",
                    WARN,
                    style(&conflict.file).red(),
                    conflict.sub_prd_a,
                    conflict.sub_prd_b
                ))
                .ok();
        }
    }

    /// Final summary after the run.
    pub fn finish(&self, report: &RunReport) {
        self.header_bar.finish_and_clear();
        match self.mode {
            UiMode::Json => {
                if let Ok(json) = serde_json::to_string(report) {
                    let _ = writeln!(&self.term, "{}", json);
                }
            }
            UiMode::Minimal | UiMode::Full => {
                let (icon, status) = if report.succeeded() {
                    (CHECK, style(report.status.to_string()).green().bold())
                } else {
                    (CROSS, style(report.status.to_string()).red().bold())
                };
                let succeeded = report.results.iter().filter(|r| r.success).count();
                let _ = writeln!(
                    &self.term,
                    "{} Session {} {} ({}/{} units succeeded)",
                    icon,
                    report.session_id,
                    status,
                    succeeded,
                    report.results.len()
                );
                if let Some(error) = &report.error {
                    let _ = writeln!(&self.term, "   {}", style(error).dim());
                }
                if let Some(verification) = &report.verification {
                    for failure in &verification.failures {
                        let _ = writeln!(&self.term, "   - {}", failure);
                    }
                }
            }
        }
    }
}

/// Format a duration for display.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_mode_parse() {
        assert_eq!(UiMode::parse("json"), UiMode::Json);
        assert_eq!(UiMode::parse("MINIMAL"), UiMode::Minimal);
        assert_eq!(UiMode::parse("full"), UiMode::Full);
        assert_eq!(UiMode::parse("fancy"), UiMode::Full);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0ms");
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_unit_bars_are_tracked() {
        let ui = RunUi::new(UiMode::Full, false);
        ui.handle_event(&OrchestratorEvent::DecompositionComplete {
            session_id: "s".into(),
            strategy: crate::decomposition::SplitBy::Domain,
            sub_prds: 2,
            can_parallelize: true,
        });
        ui.handle_event(&OrchestratorEvent::SubprdStarted {
            session_id: "s".into(),
            sub_prd_id: "p-sub-1".into(),
            specialist_id: "ui".into(),
        });
        assert_eq!(ui.unit_bars.lock().len(), 1);

        ui.handle_event(&OrchestratorEvent::SubprdCompleted {
            session_id: "s".into(),
            sub_prd_id: "p-sub-1".into(),
            duration_ms: 12,
            files_changed: 3,
        });
        assert!(ui.unit_bars.lock().is_empty());
        assert_eq!(ui.header_bar.position(), 1);
        assert_eq!(ui.header_bar.length(), Some(2));
    }
}
