/// Run upload: bundle extracted records with run metadata into one row of
/// `simple_app_benchmarks` and write it.
use crate::config::RunMetadata;
use crate::db::{self, BenchmarkRunRow, DbError, DbTarget};
use crate::extract::ExtractedRecord;

/// Errors that can occur while uploading a run.
#[derive(Debug)]
pub enum UploadError {
    Serialize(serde_json::Error),
    Db(DbError),
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Serialize(e) => write!(f, "failed to serialize benchmark records: {e}"),
            UploadError::Db(e) => write!(f, "failed to store benchmark run: {e}"),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::Serialize(e) => Some(e),
            UploadError::Db(e) => Some(e),
        }
    }
}

impl From<DbError> for UploadError {
    fn from(e: DbError) -> Self {
        UploadError::Db(e)
    }
}

/// Assemble the row for this run, stamped with the current local time.
pub fn build_row(
    metadata: &RunMetadata,
    records: &[ExtractedRecord],
) -> Result<BenchmarkRunRow, UploadError> {
    let performance = serde_json::to_string(records).map_err(UploadError::Serialize)?;
    let now = chrono::Local::now().naive_local();
    Ok(BenchmarkRunRow::new(metadata, performance, now))
}

/// Insert one row for this run into the database at `db_url` and commit.
pub async fn insert_benchmarking_data(
    db_url: &str,
    metadata: &RunMetadata,
    records: &[ExtractedRecord],
) -> Result<(), UploadError> {
    let target = DbTarget::parse(db_url)?;
    let row = build_row(metadata, records)?;

    tracing::info!(
        target_kind = target.kind(),
        table = db::TABLE,
        records = records.len(),
        branch = %metadata.branch_name,
        event = %metadata.event_type,
        "uploading benchmark run"
    );

    db::insert_row(&target, &row).await?;

    tracing::info!("benchmark run stored");
    Ok(())
}
