//! Orchestrator configuration.
//!
//! Settings are layered, each layer overriding the previous one:
//!
//! 1. Built-in defaults
//! 2. User config: `~/.config/prdforge/config.toml`
//! 3. Project config: `<project>/.prdforge/prdforge.toml`
//! 4. Environment (`PRDFORGE_*`)
//! 5. CLI flags (applied by the caller through the `with_*` builders)
//!
//! ```toml
//! parallel_execution = true
//! max_concurrent = 4
//! unit_timeout_secs = 600
//! merge_mode = "strict"
//! conflict_policy = "serialize"
//!
//! [decomposition]
//! split_by = "domain"
//! max_stories_per_agent = 3
//!
//! [worker]
//! command = "./scripts/specialist.sh"
//!
//! [verification]
//! # merged files arrive in PRDFORGE_MERGED_FILES
//! command = "cargo test"
//! file_args = false
//!
//! [[specialists]]
//! id = "infra"
//! domain = "infra"
//! patterns = ["**/terraform/**", "**/*.tf"]
//! ```

use crate::decomposition::{DecomposeOptions, SplitBy};
use crate::errors::ConfigError;
use crate::events::EventListener;
use crate::execution::{
    ConflictPolicy, DEFAULT_MAX_CONCURRENT, DEFAULT_UNIT_TIMEOUT_SECS, ExecutionSettings,
};
use crate::merge::MergeMode;
use crate::specialists::{SpecialistConfig, SpecialistRegistry};
use crate::verification::DEFAULT_TEST_TIMEOUT_SECS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project-local config directory.
pub const PROJECT_CONFIG_DIR: &str = ".prdforge";
/// File name inside [`PROJECT_CONFIG_DIR`].
pub const PROJECT_CONFIG_FILE: &str = "prdforge.toml";

pub const ENV_PARALLEL: &str = "PRDFORGE_PARALLEL";
pub const ENV_MAX_CONCURRENT: &str = "PRDFORGE_MAX_CONCURRENT";
pub const ENV_UNIT_TIMEOUT_SECS: &str = "PRDFORGE_UNIT_TIMEOUT_SECS";
pub const ENV_WORKER_CMD: &str = "PRDFORGE_WORKER_CMD";
pub const ENV_TEST_CMD: &str = "PRDFORGE_TEST_CMD";

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_unit_timeout() -> Duration {
    Duration::from_secs(DEFAULT_UNIT_TIMEOUT_SECS)
}

fn default_test_timeout_secs() -> u64 {
    DEFAULT_TEST_TIMEOUT_SECS
}

/// `[decomposition]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompositionSettings {
    #[serde(default)]
    pub split_by: SplitBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stories_per_agent: Option<usize>,
}

/// `[worker]` section: the specialist worker command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// `[verification]` section: the test command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default = "default_test_timeout_secs")]
    pub timeout_secs: u64,
    /// Append the merged files to the command line. They are always listed
    /// in `PRDFORGE_MERGED_FILES`.
    #[serde(default)]
    pub file_args: bool,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: DEFAULT_TEST_TIMEOUT_SECS,
            file_args: false,
        }
    }
}

/// Everything an [`Orchestrator`](crate::orchestrator::Orchestrator) needs.
#[derive(Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_true")]
    pub parallel_execution: bool,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Per-unit worker timeout; `unit_timeout_secs` in files, fractions allowed.
    #[serde(
        rename = "unit_timeout_secs",
        default = "default_unit_timeout",
        with = "crate::util::duration_secs"
    )]
    pub unit_timeout: Duration,
    #[serde(default)]
    pub merge_mode: MergeMode,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default)]
    pub decomposition: DecompositionSettings,
    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub verification: VerificationSettings,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub specialists: Vec<SpecialistConfig>,
    /// Synchronous event listener; not part of the file format.
    #[serde(skip)]
    pub on_event: Option<EventListener>,
}

impl std::fmt::Debug for OrchestratorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorConfig")
            .field("parallel_execution", &self.parallel_execution)
            .field("max_concurrent", &self.max_concurrent)
            .field("unit_timeout", &self.unit_timeout)
            .field("merge_mode", &self.merge_mode)
            .field("conflict_policy", &self.conflict_policy)
            .field("decomposition", &self.decomposition)
            .field("worker", &self.worker)
            .field("verification", &self.verification)
            .field("specialists", &self.specialists)
            .field("on_event", &self.on_event.is_some())
            .finish()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            parallel_execution: true,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            unit_timeout: default_unit_timeout(),
            merge_mode: MergeMode::default(),
            conflict_policy: ConflictPolicy::default(),
            decomposition: DecompositionSettings::default(),
            worker: WorkerSettings::default(),
            verification: VerificationSettings::default(),
            specialists: Vec::new(),
            on_event: None,
        }
    }
}

impl OrchestratorConfig {
    /// Parse a TOML document.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a single TOML file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        Self::parse(&read_file(path)?, path)
    }

    /// User-level config path, if a config directory exists on this platform.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("prdforge").join("config.toml"))
    }

    /// Project-level config path.
    pub fn project_config_path(project_dir: &Path) -> PathBuf {
        project_dir.join(PROJECT_CONFIG_DIR).join(PROJECT_CONFIG_FILE)
    }

    /// Load every layer for `project_dir` using the process environment.
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        Self::load_layers(
            Self::user_config_path().as_deref(),
            &Self::project_config_path(project_dir),
            |key| std::env::var(key).ok(),
        )
    }

    /// Load defaults, then each existing file, then the environment.
    ///
    /// Files are merged table by table, so a project file only needs the
    /// keys it overrides.
    pub fn load_layers(
        user_path: Option<&Path>,
        project_path: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut merged = toml::Table::new();
        let mut last_path = project_path.to_path_buf();

        for path in user_path.into_iter().chain(std::iter::once(project_path)) {
            if !path.exists() {
                continue;
            }
            let content = read_file(path)?;
            let table: toml::Table =
                toml::from_str(&content).map_err(|source| ConfigError::ParseFailed {
                    path: path.to_path_buf(),
                    source,
                })?;
            tracing::debug!(path = %path.display(), "loaded config layer");
            merge_tables(&mut merged, table);
            last_path = path.to_path_buf();
        }

        let mut config = Self::parse(&toml::to_string(&merged).unwrap_or_default(), &last_path)?;
        config.apply_env(env)?;
        Ok(config)
    }

    /// Apply `PRDFORGE_*` overrides.
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = env(ENV_PARALLEL) {
            self.parallel_execution = parse_bool(ENV_PARALLEL, &value)?;
        }
        if let Some(value) = env(ENV_MAX_CONCURRENT) {
            self.max_concurrent = parse_number(ENV_MAX_CONCURRENT, &value)?;
        }
        if let Some(value) = env(ENV_UNIT_TIMEOUT_SECS) {
            self.unit_timeout = crate::util::duration_secs::parse(&value).ok_or_else(|| {
                ConfigError::InvalidEnvValue {
                    key: ENV_UNIT_TIMEOUT_SECS.to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = env(ENV_WORKER_CMD).filter(|v| !v.trim().is_empty()) {
            self.worker.command = Some(value);
        }
        if let Some(value) = env(ENV_TEST_CMD).filter(|v| !v.trim().is_empty()) {
            self.verification.command = Some(value);
        }
        Ok(())
    }

    /// Reject values that would make the orchestrator unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.execution_settings().validate()?;
        if self.decomposition.max_stories_per_agent == Some(0) {
            return Err(ConfigError::InvalidStoriesCap);
        }
        if self.verification.timeout_secs == 0 {
            return Err(ConfigError::InvalidTestTimeout);
        }
        SpecialistRegistry::with_custom(&self.specialists)?;
        Ok(())
    }

    pub fn unit_timeout(&self) -> Duration {
        self.unit_timeout
    }

    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            parallel: self.parallel_execution,
            max_concurrent: self.max_concurrent,
            unit_timeout: self.unit_timeout(),
            conflict_policy: self.conflict_policy,
        }
    }

    pub fn decompose_options(&self) -> Result<DecomposeOptions, ConfigError> {
        let options = DecomposeOptions::new(self.decomposition.split_by);
        match self.decomposition.max_stories_per_agent {
            Some(0) => Err(ConfigError::InvalidStoriesCap),
            Some(cap) => Ok(options.with_max_stories_per_agent(cap)),
            None => Ok(options),
        }
    }

    pub fn registry(&self) -> Result<SpecialistRegistry, ConfigError> {
        SpecialistRegistry::with_custom(&self.specialists)
    }

    pub fn with_parallel_execution(mut self, parallel: bool) -> Self {
        self.parallel_execution = parallel;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout = timeout;
        self
    }

    pub fn with_merge_mode(mut self, mode: MergeMode) -> Self {
        self.merge_mode = mode;
        self
    }

    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    pub fn with_split_by(mut self, split_by: SplitBy) -> Self {
        self.decomposition.split_by = split_by;
        self
    }

    pub fn with_max_stories_per_agent(mut self, cap: usize) -> Self {
        self.decomposition.max_stories_per_agent = Some(cap);
        self
    }

    pub fn with_worker_command(mut self, command: impl Into<String>) -> Self {
        self.worker.command = Some(command.into());
        self
    }

    pub fn with_test_command(mut self, command: impl Into<String>) -> Self {
        self.verification.command = Some(command.into());
        self
    }

    pub fn with_specialists(mut self, specialists: Vec<SpecialistConfig>) -> Self {
        self.specialists = specialists;
        self
    }

    pub fn with_event_listener(mut self, listener: EventListener) -> Self {
        self.on_event = Some(listener);
        self
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// Deep-merge `overlay` into `base`; nested tables merge, everything else replaces.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}
