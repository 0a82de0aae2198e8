//! Integration tests for prdforge
//!
//! These drive the binary end to end against PRD files in temp directories.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const WORKER: &str = r#"cat > /dev/null; echo "{\"success\":true,\"filesChanged\":[\"$PRDFORGE_SUBPRD_ID.txt\"]}""#;

/// Helper to create a prdforge Command isolated from the user's environment
fn prdforge(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("prdforge");
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env("HOME", dir.path())
        .env_remove("RUST_LOG")
        .env_remove("PRDFORGE_PARALLEL")
        .env_remove("PRDFORGE_MAX_CONCURRENT")
        .env_remove("PRDFORGE_UNIT_TIMEOUT_SECS")
        .env_remove("PRDFORGE_WORKER_CMD")
        .env_remove("PRDFORGE_TEST_CMD");
    cmd
}

fn write_prd(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Four stories, one per built-in domain, no shared files.
fn four_domain_prd(dir: &TempDir) -> PathBuf {
    write_prd(
        dir,
        "prd.json",
        r#"{
  "id": "checkout",
  "title": "Checkout",
  "summary": "New checkout flow",
  "stories": [
    {"id": "S-1", "title": "Form", "domain": "ui", "affectedFiles": ["src/components/Checkout.tsx"]},
    {"id": "S-2", "title": "Endpoint", "domain": "api", "affectedFiles": ["src/api/checkout.rs"], "complexity": 3},
    {"id": "S-3", "title": "Tokens", "domain": "security", "affectedFiles": ["src/auth/tokens.rs"], "complexity": 2},
    {"id": "S-4", "title": "Tests", "domain": "test", "affectedFiles": ["tests/checkout_test.rs"]}
  ]
}"#,
    )
}

fn conflicting_prd(dir: &TempDir) -> PathBuf {
    write_prd(
        dir,
        "conflict.json",
        r#"{
  "id": "shared",
  "title": "Shared file",
  "stories": [
    {"id": "S-1", "title": "UI", "domain": "ui", "affectedFiles": ["src/lib.rs"]},
    {"id": "S-2", "title": "API", "domain": "api", "affectedFiles": ["src/lib.rs"]}
  ]
}"#,
    )
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help() {
        let dir = TempDir::new().unwrap();
        prdforge(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("decompose"))
            .stdout(predicate::str::contains("run"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        prdforge(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_missing_prd_file() {
        let dir = TempDir::new().unwrap();
        prdforge(&dir)
            .args(["decompose", "nope.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to load PRD"));
    }

    #[test]
    fn test_invalid_prd_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_prd(
            &dir,
            "dup.json",
            r#"{"id":"p","title":"t","stories":[{"id":"A","title":"a"},{"id":"A","title":"b"}]}"#,
        );
        prdforge(&dir)
            .arg("decompose")
            .arg(&path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Duplicate story id"));
    }
}

// =============================================================================
// Decomposition
// =============================================================================

mod decomposition {
    use super::*;

    fn decompose_json(dir: &TempDir, extra: &[&str]) -> serde_json::Value {
        let prd = four_domain_prd(dir);
        let output = prdforge(dir)
            .arg("decompose")
            .arg(&prd)
            .arg("--json")
            .args(extra)
            .output()
            .unwrap();
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).unwrap()
    }

    #[test]
    fn test_domain_split() {
        let dir = TempDir::new().unwrap();
        let subs = decompose_json(&dir, &[]);
        let subs = subs.as_array().unwrap();
        assert_eq!(subs.len(), 4);
        for sub in subs {
            assert_eq!(sub["stories"].as_array().unwrap().len(), 1);
        }
        assert_eq!(subs[0]["id"], "checkout-sub-1");
        assert_eq!(subs[0]["assignedSpecialistId"], "ui");
    }

    #[test]
    fn test_cap_of_one_keeps_four() {
        let dir = TempDir::new().unwrap();
        let subs = decompose_json(&dir, &["--max-stories", "1"]);
        assert_eq!(subs.as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_complexity_split_keeps_every_story() {
        let dir = TempDir::new().unwrap();
        let subs = decompose_json(&dir, &["--split-by", "complexity"]);
        let total: usize = subs
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["stories"].as_array().unwrap().len())
            .sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn test_unknown_strategy() {
        let dir = TempDir::new().unwrap();
        let prd = four_domain_prd(&dir);
        prdforge(&dir)
            .arg("decompose")
            .arg(&prd)
            .args(["--split-by", "random"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown split strategy"));
    }

    #[test]
    fn test_zero_cap_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let prd = four_domain_prd(&dir);
        prdforge(&dir)
            .arg("decompose")
            .arg(&prd)
            .args(["--max-stories", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("max_stories_per_agent"));
    }

    #[test]
    fn test_yaml_prd() {
        let dir = TempDir::new().unwrap();
        let prd = write_prd(
            &dir,
            "prd.yaml",
            "id: y\ntitle: YAML\nstories:\n  - id: S-1\n    title: Odd file\n    affectedFiles: [unknown/path/file.xyz]\n",
        );
        prdforge(&dir)
            .arg("decompose")
            .arg(&prd)
            .arg("--json")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"assignedSpecialistId\": \"general\""));
    }

    #[test]
    fn test_analyze_reports_conflicts() {
        let dir = TempDir::new().unwrap();
        let prd = conflicting_prd(&dir);
        let output = prdforge(&dir)
            .arg("analyze")
            .arg(&prd)
            .arg("--json")
            .output()
            .unwrap();
        assert!(output.status.success());
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["conflicts"]["canParallelize"], false);
        assert_eq!(report["conflicts"]["potentialConflicts"][0]["file"], "src/lib.rs");
        assert_eq!(report["estimate"]["totalStories"], 2);
    }

    #[test]
    fn test_analyze_human_output() {
        let dir = TempDir::new().unwrap();
        let prd = four_domain_prd(&dir);
        prdforge(&dir)
            .arg("analyze")
            .arg(&prd)
            .assert()
            .success()
            .stdout(predicate::str::contains("No file conflicts"));
    }
}

// =============================================================================
// Configuration
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        prdforge(&dir)
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("max_concurrent = 4"))
            .stdout(predicate::str::contains("not found"));
    }

    #[test]
    fn test_config_init_creates_toml() {
        let dir = TempDir::new().unwrap();
        prdforge(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created prdforge.toml"));
        assert!(dir.path().join(".prdforge/prdforge.toml").exists());

        prdforge(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_rejects_zero_concurrency() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".prdforge")).unwrap();
        fs::write(
            dir.path().join(".prdforge/prdforge.toml"),
            "max_concurrent = 0\n",
        )
        .unwrap();
        prdforge(&dir)
            .args(["config", "validate"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("max_concurrent"));
    }

    #[test]
    fn test_env_override_is_shown() {
        let dir = TempDir::new().unwrap();
        prdforge(&dir)
            .env("PRDFORGE_MAX_CONCURRENT", "9")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_concurrent = 9"));
    }

    #[test]
    fn test_project_file_drives_decomposition() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".prdforge")).unwrap();
        fs::write(
            dir.path().join(".prdforge/prdforge.toml"),
            "[[specialists]]\nid = \"frontend-team\"\ndomain = \"ui\"\npatterns = [\"**/*.tsx\"]\n",
        )
        .unwrap();
        let prd = write_prd(
            &dir,
            "prd.json",
            r#"{"id":"p","title":"t","stories":[{"id":"S-1","title":"x","affectedFiles":["src/App.tsx"]}]}"#,
        );
        prdforge(&dir)
            .arg("decompose")
            .arg(&prd)
            .arg("--json")
            .assert()
            .success()
            .stdout(predicate::str::contains("frontend-team"));
    }
}

// =============================================================================
// Full pipeline
// =============================================================================

#[cfg(unix)]
mod pipeline {
    use super::*;

    #[test]
    fn test_run_completes() {
        let dir = TempDir::new().unwrap();
        let prd = four_domain_prd(&dir);
        prdforge(&dir)
            .arg("run")
            .arg(&prd)
            .args(["--worker-cmd", WORKER, "--test-cmd", "true", "--ui", "minimal"])
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"));
    }

    #[test]
    fn test_run_json_events() {
        let dir = TempDir::new().unwrap();
        let prd = four_domain_prd(&dir);
        let output = prdforge(&dir)
            .arg("run")
            .arg(&prd)
            .args(["--worker-cmd", WORKER, "--test-cmd", "true", "--ui", "json", "--sequential"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let stdout = String::from_utf8(output.stdout).unwrap();
        let types: Vec<String> = stdout
            .lines()
            .filter_map(|l| serde_json::from_str::<serde_json::Value>(l).ok())
            .filter_map(|v| v["type"].as_str().map(str::to_string))
            .collect();
        assert_eq!(types[0], "session_started");
        assert_eq!(types[1], "decomposition_complete");
        assert_eq!(types.iter().filter(|t| *t == "subprd_completed").count(), 4);
        assert!(types.contains(&"verification_complete".to_string()));
    }

    #[test]
    fn test_run_lists_merged_files_in_env() {
        let dir = TempDir::new().unwrap();
        let prd = four_domain_prd(&dir);
        let test_cmd = r#"test $# -eq 0 && echo "$PRDFORGE_MERGED_FILES" | grep -q checkout-sub-4.txt"#;
        prdforge(&dir)
            .arg("run")
            .arg(&prd)
            .args(["--worker-cmd", WORKER, "--test-cmd", test_cmd, "--ui", "minimal"])
            .assert()
            .success();
    }

    #[test]
    fn test_run_fails_when_tests_fail() {
        let dir = TempDir::new().unwrap();
        let prd = four_domain_prd(&dir);
        prdforge(&dir)
            .arg("run")
            .arg(&prd)
            .args(["--worker-cmd", WORKER, "--test-cmd", "false", "--ui", "minimal"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("verification failed"));
    }

    #[test]
    fn test_run_refuses_conflicting_merge() {
        let dir = TempDir::new().unwrap();
        let prd = conflicting_prd(&dir);
        let worker = r#"cat > /dev/null; echo '{"success":true,"filesChanged":["src/lib.rs"]}'"#;
        prdforge(&dir)
            .arg("run")
            .arg(&prd)
            .args(["--worker-cmd", worker, "--test-cmd", "true", "--ui", "minimal"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("conflict"));
    }

    #[test]
    fn test_run_requires_worker_command() {
        let dir = TempDir::new().unwrap();
        let prd = four_domain_prd(&dir);
        prdforge(&dir)
            .arg("run")
            .arg(&prd)
            .args(["--test-cmd", "true"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No worker command configured"));
    }

    #[test]
    fn test_run_reports_worker_failure() {
        let dir = TempDir::new().unwrap();
        let prd = four_domain_prd(&dir);
        prdforge(&dir)
            .arg("run")
            .arg(&prd)
            .args(["--worker-cmd", "cat > /dev/null; exit 7", "--test-cmd", "true", "--ui", "minimal"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("code 7"));
    }
}
