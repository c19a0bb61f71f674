use std::path::PathBuf;

/// Environment variable consulted when `--pr-title` is not given.
pub const PR_TITLE_ENV: &str = "PR_TITLE";

/// Run tags stored alongside the benchmark records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetadata {
    pub os: Option<String>,
    pub python_version: Option<String>,
    pub commit_sha: Option<String>,
    /// Empty for push and merge events, which carry no PR.
    pub pr_title: String,
    pub branch_name: String,
    pub event_type: String,
    pub actor: String,
    pub pr_id: String,
}

/// Fully resolved settings for one upload.
#[derive(Debug)]
pub struct UploadConfig {
    pub benchmark_json: Option<PathBuf>,
    pub db_url: String,
    pub metadata: RunMetadata,
}

impl UploadConfig {
    /// Path of the benchmark report, which is required to run an upload.
    pub fn benchmark_json(&self) -> Result<&PathBuf, ConfigError> {
        self.benchmark_json
            .as_ref()
            .ok_or(ConfigError::MissingBenchmarkJson)
    }
}

/// Errors in the resolved configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// `--benchmark-json` was not supplied.
    MissingBenchmarkJson,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingBenchmarkJson => {
                write!(f, "no benchmark report given (use --benchmark-json)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Pick the PR title: a non-empty flag value wins, then the environment,
/// then the empty string.
pub fn resolve_pr_title(flag: Option<String>, env: Option<String>) -> String {
    flag.filter(|title| !title.is_empty())
        .or(env)
        .unwrap_or_default()
}

/// Read [`PR_TITLE_ENV`] from the process environment.
pub fn pr_title_from_env() -> Option<String> {
    std::env::var(PR_TITLE_ENV).ok()
}
