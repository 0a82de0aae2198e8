//! Offline PRD inspection: `prdforge decompose` and `prdforge analyze`.

use anyhow::Result;
use console::style;
use prdforge::decomposition::{Decomposer, SubPrd, analyze_conflicts, estimate_work};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

use super::super::SplitArgs;
use super::{load_config, load_prd};

fn decompose(project_dir: &Path, prd_path: &Path, split: &SplitArgs) -> Result<Vec<SubPrd>> {
    let prd = load_prd(prd_path)?;
    let config = load_config(project_dir, split)?;
    let options = config.decompose_options()?;
    let decomposer = Decomposer::new(Arc::new(config.registry()?));
    Ok(decomposer.decompose_prd(&prd, &options))
}

pub fn cmd_decompose(
    project_dir: &Path,
    prd_path: &Path,
    split: &SplitArgs,
    as_json: bool,
) -> Result<()> {
    let sub_prds = decompose(project_dir, prd_path, split)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&sub_prds)?);
        return Ok(());
    }

    if sub_prds.is_empty() {
        println!("PRD has no stories; nothing to decompose.");
        return Ok(());
    }

    println!();
    println!("{} sub-PRDs", style(sub_prds.len()).bold());
    println!();
    for sub in &sub_prds {
        println!(
            "{}  {}  (complexity {})",
            style(&sub.id).yellow().bold(),
            style(&sub.assigned_specialist_id).cyan(),
            sub.total_complexity()
        );
        for story in &sub.stories {
            println!("    - {} {}", style(&story.id).dim(), story.title);
        }
    }
    println!();
    Ok(())
}

pub fn cmd_analyze(
    project_dir: &Path,
    prd_path: &Path,
    split: &SplitArgs,
    as_json: bool,
) -> Result<()> {
    let sub_prds = decompose(project_dir, prd_path, split)?;
    let analysis = analyze_conflicts(&sub_prds);
    let estimate = estimate_work(&sub_prds);

    if as_json {
        let out = json!({
            "subPrds": sub_prds.len(),
            "conflicts": analysis,
            "estimate": estimate,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "{} stories, total complexity {}, {} sub-PRDs",
        estimate.total_stories,
        estimate.total_complexity,
        sub_prds.len()
    );
    println!();
    println!("Work by specialist:");
    for (agent, work) in &estimate.by_agent {
        println!(
            "  {:<12} {} stories, complexity {}",
            style(agent).cyan(),
            work.stories,
            work.complexity
        );
    }
    println!();

    if analysis.can_parallelize {
        println!("{}", style("No file conflicts; all sub-PRDs can run in parallel.").green());
    } else {
        println!(
            "{}",
            style(format!(
                "{} potential conflicts:",
                analysis.potential_conflicts.len()
            ))
            .yellow()
        );
        for conflict in &analysis.potential_conflicts {
            println!(
                "  {}  {} <-> {}",
                conflict.file, conflict.sub_prd_a, conflict.sub_prd_b
            );
        }
    }
    println!();
    Ok(())
}
