mod config;
mod db;
mod extract;
mod upload;

use clap::Parser;
use config::{RunMetadata, UploadConfig};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Read pytest-benchmark results for the simple app and store them, tagged
/// with CI run metadata, in the `simple_app_benchmarks` table.
#[derive(Parser, Debug)]
#[command(name = "simple-app-bench-upload", version, about)]
pub struct Cli {
    /// The OS type and version to insert into the database
    #[arg(long)]
    os: Option<String>,

    /// The Python version to insert into the database
    #[arg(long)]
    python_version: Option<String>,

    /// The commit SHA to insert into the database
    #[arg(long)]
    commit_sha: Option<String>,

    /// The JSON file containing the benchmark results
    #[arg(long)]
    benchmark_json: Option<PathBuf>,

    /// The URL to connect to the database (postgres:// or sqlite://)
    #[arg(long)]
    db_url: String,

    /// The PR title to insert into the database (falls back to $PR_TITLE)
    #[arg(long)]
    pr_title: Option<String>,

    /// The current branch
    #[arg(long)]
    branch_name: String,

    /// The GitHub event type (push, pull_request, ...)
    #[arg(long)]
    event_type: String,

    /// Username of the user that triggered the run
    #[arg(long)]
    actor: String,

    /// ID of the PR
    #[arg(long)]
    pr_id: String,

    /// Print the row that would be inserted, don't connect
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (extraction and transaction details)
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Resolve flags and environment into the settings for one upload.
    fn into_config(self, pr_title_env: Option<String>) -> UploadConfig {
        UploadConfig {
            benchmark_json: self.benchmark_json,
            db_url: self.db_url,
            metadata: RunMetadata {
                os: self.os,
                python_version: self.python_version,
                commit_sha: self.commit_sha,
                pr_title: config::resolve_pr_title(self.pr_title, pr_title_env),
                branch_name: self.branch_name,
                event_type: self.event_type,
                actor: self.actor,
                pr_id: self.pr_id,
            },
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    tracing::info!("simple-app-bench-upload starting");

    let dry_run = cli.dry_run;
    let config = cli.into_config(config::pr_title_from_env());
    tracing::debug!(metadata = ?config.metadata, "resolved run metadata");

    if let Err(e) = run(&config, dry_run).await {
        report_error(e.as_ref());
        std::process::exit(1);
    }
}

async fn run(config: &UploadConfig, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config.benchmark_json()?;
    let records = extract::extract_stats_from_json(path)?;
    tracing::info!(path = %path.display(), records = records.len(), "benchmark report loaded");

    if dry_run {
        let row = upload::build_row(&config.metadata, &records)?;
        println!("{}", serde_json::to_string_pretty(&row)?);
        println!("Dry run: row not inserted.");
        return Ok(());
    }

    upload::insert_benchmarking_data(&config.db_url, &config.metadata, &records).await?;
    Ok(())
}

/// Print an error and its cause chain to stderr.
fn report_error(e: &dyn std::error::Error) {
    eprintln!("error: {e}");
    let mut source = e.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 11] = [
        "simple-app-bench-upload",
        "--db-url",
        "postgres://ci@db/bench",
        "--branch-name",
        "main",
        "--event-type",
        "push",
        "--actor",
        "octocat",
        "--pr-id",
        "17",
    ];

    #[test]
    fn parses_required_flags() {
        let cli = Cli::try_parse_from(REQUIRED).unwrap();
        assert_eq!(cli.db_url, "postgres://ci@db/bench");
        assert_eq!(cli.branch_name, "main");
        assert_eq!(cli.pr_id, "17");
        assert!(cli.os.is_none());
        assert!(cli.benchmark_json.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn rejects_missing_required_flag() {
        for skip in ["--db-url", "--branch-name", "--event-type", "--actor", "--pr-id"] {
            let pos = REQUIRED.iter().position(|a| *a == skip).unwrap();
            let args: Vec<&str> = REQUIRED
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != pos && *i != pos + 1)
                .map(|(_, a)| *a)
                .collect();
            assert!(Cli::try_parse_from(args).is_err(), "accepted without {skip}");
        }
    }

    #[test]
    fn parses_optional_flags() {
        let mut args: Vec<&str> = REQUIRED.to_vec();
        args.extend([
            "--os",
            "macos-14",
            "--python-version",
            "3.11.9",
            "--commit-sha",
            "abc123",
            "--benchmark-json",
            "results.json",
            "--pr-title",
            "Faster startup",
        ]);
        let config = Cli::try_parse_from(args).unwrap().into_config(None);
        assert_eq!(config.metadata.os.as_deref(), Some("macos-14"));
        assert_eq!(config.metadata.python_version.as_deref(), Some("3.11.9"));
        assert_eq!(config.metadata.commit_sha.as_deref(), Some("abc123"));
        assert_eq!(config.metadata.pr_title, "Faster startup");
        assert_eq!(config.benchmark_json, Some(PathBuf::from("results.json")));
    }

    #[test]
    fn pr_title_from_env_when_flag_missing() {
        let config = Cli::try_parse_from(REQUIRED)
            .unwrap()
            .into_config(Some("Env title".into()));
        assert_eq!(config.metadata.pr_title, "Env title");
    }

    #[tokio::test]
    async fn run_without_benchmark_json_fails() {
        let config = Cli::try_parse_from(REQUIRED).unwrap().into_config(None);
        let err = run(&config, false).await.unwrap_err();
        assert!(err.to_string().contains("--benchmark-json"));
    }

    #[tokio::test]
    async fn dry_run_does_not_connect() {
        let dir = tempfile::TempDir::new().unwrap();
        let report = dir.path().join("benchmark.json");
        std::fs::write(&report, r#"{"benchmarks":[{"fullname":"a/b.py::c","name":"c"}]}"#)
            .unwrap();

        let mut args: Vec<&str> = REQUIRED.to_vec();
        let report_arg = report.to_string_lossy().to_string();
        args.extend(["--benchmark-json", report_arg.as_str(), "--dry-run"]);
        let cli = Cli::try_parse_from(args).unwrap();
        let dry_run = cli.dry_run;
        let config = cli.into_config(None);

        // The postgres URL is unreachable; a dry run never opens it.
        run(&config, dry_run).await.unwrap();
    }
}
