use crate::config::RunMetadata;
use chrono::NaiveDateTime;
use serde::Serialize;
use rusqlite::OpenFlags;
use sqlx::postgres::{PgConnectOptions, PgConnection, Postgres};
use sqlx::Connection as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Table receiving one row per benchmark run.
pub const TABLE: &str = "simple_app_benchmarks";

/// Insert column order. Parameters are bound positionally in this order.
pub const COLUMNS: [&str; 10] = [
    "os",
    "python_version",
    "commit_sha",
    "time",
    "pr_title",
    "branch_name",
    "event_type",
    "actor",
    "performance",
    "pr_id",
];

/// Build the single-row insert, rendering each positional parameter with
/// `placeholder(position, column)`.
fn insert_sql(placeholder: fn(usize, &str) -> String) -> String {
    let values: Vec<String> = COLUMNS
        .iter()
        .enumerate()
        .map(|(i, column)| placeholder(i + 1, column))
        .collect();
    format!(
        "INSERT INTO {TABLE} ({}) VALUES ({})",
        COLUMNS.join(", "),
        values.join(", ")
    )
}

/// Scalars other than `time` are bound as `text`, so every metadata column
/// (including `pr_id`) must be a text type; postgres will not assign a
/// `text` parameter to an integer column. `performance` arrives as text and
/// is cast so json and text columns both accept it.
fn pg_placeholder(n: usize, column: &str) -> String {
    match column {
        "performance" => format!("${n}::json"),
        _ => format!("${n}"),
    }
}

fn sqlite_placeholder(n: usize, _column: &str) -> String {
    format!("?{n}")
}

/// A fully assembled row of `simple_app_benchmarks`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRunRow {
    pub os: Option<String>,
    pub python_version: Option<String>,
    pub commit_sha: Option<String>,
    pub time: NaiveDateTime,
    pub pr_title: String,
    pub branch_name: String,
    pub event_type: String,
    pub actor: String,
    /// JSON array of extracted records.
    pub performance: String,
    pub pr_id: String,
}

impl BenchmarkRunRow {
    pub fn new(metadata: &RunMetadata, performance: String, time: NaiveDateTime) -> Self {
        Self {
            os: metadata.os.clone(),
            python_version: metadata.python_version.clone(),
            commit_sha: metadata.commit_sha.clone(),
            time,
            pr_title: metadata.pr_title.clone(),
            branch_name: metadata.branch_name.clone(),
            event_type: metadata.event_type.clone(),
            actor: metadata.actor.clone(),
            performance,
            pr_id: metadata.pr_id.clone(),
        }
    }
}

/// Format used for the `time` column in SQLite, which has no timestamp type.
fn sqlite_timestamp(time: &NaiveDateTime) -> String {
    time.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

/// Where the row goes, resolved from the `--db-url` value.
#[derive(Debug, Clone, PartialEq)]
pub enum DbTarget {
    /// `postgres://` or `postgresql://` connection string.
    Postgres(String),
    /// Local database file from a `sqlite://` or `sqlite:` URL.
    Sqlite(PathBuf),
}

impl DbTarget {
    pub fn parse(url: &str) -> Result<Self, DbError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(DbTarget::Postgres(url.to_string()));
        }

        if let Some(path) = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
        {
            if path.is_empty() {
                return Err(DbError::InvalidUrl {
                    detail: "sqlite URL has no database path".to_string(),
                });
            }
            return Ok(DbTarget::Sqlite(PathBuf::from(path)));
        }

        // Only the scheme is reported; the rest may hold credentials.
        let scheme = url.split_once(':').map(|(s, _)| s).unwrap_or("");
        Err(DbError::UnsupportedScheme {
            scheme: scheme.to_string(),
        })
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DbTarget::Postgres(_) => "postgres",
            DbTarget::Sqlite(_) => "sqlite",
        }
    }
}

/// Errors from connecting to or writing into the benchmarks database.
#[derive(Debug)]
pub enum DbError {
    InvalidUrl { detail: String },
    UnsupportedScheme { scheme: String },
    Postgres(sqlx::Error),
    Sqlite(rusqlite::Error),
    /// The sink was used after its transaction was committed.
    Finished,
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbError::InvalidUrl { detail } => write!(f, "invalid database URL: {detail}"),
            DbError::UnsupportedScheme { scheme } => write!(
                f,
                "unsupported database URL scheme '{scheme}' (expected postgres:// or sqlite://)"
            ),
            DbError::Postgres(e) => write!(f, "postgres error: {e}"),
            DbError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            DbError::Finished => write!(f, "transaction already committed"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Postgres(e) => Some(e),
            DbError::Sqlite(e) => Some(e),
            _ => None,
        }
    }
}

/// One open transaction against `simple_app_benchmarks`.
#[allow(async_fn_in_trait)]
pub trait RunSink {
    /// Execute the insert for `row`, returning the number of affected rows.
    async fn execute(&mut self, row: &BenchmarkRunRow) -> Result<u64, DbError>;

    /// Commit the transaction. The sink cannot be used afterwards.
    async fn commit(&mut self) -> Result<(), DbError>;
}

/// Insert `row` through `sink` and commit. Nothing is committed if the
/// insert fails.
pub async fn write_row<S: RunSink>(sink: &mut S, row: &BenchmarkRunRow) -> Result<(), DbError> {
    let affected = sink.execute(row).await?;
    tracing::debug!(affected, "benchmark row inserted");
    sink.commit().await?;
    tracing::debug!("transaction committed");
    Ok(())
}

pub struct PgSink<'c> {
    tx: Option<sqlx::Transaction<'c, Postgres>>,
}

impl<'c> PgSink<'c> {
    pub fn new(tx: sqlx::Transaction<'c, Postgres>) -> Self {
        Self { tx: Some(tx) }
    }
}

impl RunSink for PgSink<'_> {
    async fn execute(&mut self, row: &BenchmarkRunRow) -> Result<u64, DbError> {
        let tx = self.tx.as_mut().ok_or(DbError::Finished)?;
        let sql = insert_sql(pg_placeholder);
        let done = sqlx::query(&sql)
            .bind(row.os.as_deref())
            .bind(row.python_version.as_deref())
            .bind(row.commit_sha.as_deref())
            .bind(row.time)
            .bind(row.pr_title.as_str())
            .bind(row.branch_name.as_str())
            .bind(row.event_type.as_str())
            .bind(row.actor.as_str())
            .bind(row.performance.as_str())
            .bind(row.pr_id.as_str())
            .execute(&mut **tx)
            .await
            .map_err(DbError::Postgres)?;
        Ok(done.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let tx = self.tx.take().ok_or(DbError::Finished)?;
        tx.commit().await.map_err(DbError::Postgres)
    }
}

pub struct SqliteSink<'c> {
    tx: Option<rusqlite::Transaction<'c>>,
}

impl<'c> SqliteSink<'c> {
    pub fn new(tx: rusqlite::Transaction<'c>) -> Self {
        Self { tx: Some(tx) }
    }
}

impl RunSink for SqliteSink<'_> {
    async fn execute(&mut self, row: &BenchmarkRunRow) -> Result<u64, DbError> {
        let tx = self.tx.as_ref().ok_or(DbError::Finished)?;
        let affected = tx
            .execute(
                &insert_sql(sqlite_placeholder),
                rusqlite::params![
                    row.os.as_deref(),
                    row.python_version.as_deref(),
                    row.commit_sha.as_deref(),
                    sqlite_timestamp(&row.time),
                    row.pr_title,
                    row.branch_name,
                    row.event_type,
                    row.actor,
                    row.performance,
                    row.pr_id,
                ],
            )
            .map_err(DbError::Sqlite)?;
        Ok(affected as u64)
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let tx = self.tx.take().ok_or(DbError::Finished)?;
        tx.commit().map_err(DbError::Sqlite)
    }
}

/// Open a connection to `target`, insert `row` in a single transaction and
/// close the connection.
///
/// The connection is closed whether or not the insert succeeds; an
/// uncommitted transaction is rolled back when its sink is dropped.
pub async fn insert_row(target: &DbTarget, row: &BenchmarkRunRow) -> Result<(), DbError> {
    match target {
        DbTarget::Postgres(url) => insert_postgres(url, row).await,
        DbTarget::Sqlite(path) => insert_sqlite(path, row).await,
    }
}

async fn insert_postgres(url: &str, row: &BenchmarkRunRow) -> Result<(), DbError> {
    let options = PgConnectOptions::from_str(url).map_err(|e| DbError::InvalidUrl {
        detail: e.to_string(),
    })?;
    let mut conn = PgConnection::connect_with(&options)
        .await
        .map_err(DbError::Postgres)?;
    tracing::debug!("connected to postgres");

    let outcome = async {
        let tx = conn.begin().await.map_err(DbError::Postgres)?;
        write_row(&mut PgSink::new(tx), row).await
    }
    .await;

    let closed = conn.close().await.map_err(DbError::Postgres);
    outcome?;
    closed
}

async fn insert_sqlite(path: &Path, row: &BenchmarkRunRow) -> Result<(), DbError> {
    // No CREATE flag: a missing file is an error, not a fresh empty database.
    let mut conn = rusqlite::Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_URI,
    )
    .map_err(DbError::Sqlite)?;
    tracing::debug!(path = %path.display(), "opened sqlite database");

    let outcome = async {
        let tx = conn.transaction().map_err(DbError::Sqlite)?;
        write_row(&mut SqliteSink::new(tx), row).await
    }
    .await;

    let closed = conn.close().map_err(|(_, e)| DbError::Sqlite(e));
    outcome?;
    closed
}
