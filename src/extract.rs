/// Benchmark report extraction: read a pytest-benchmark JSON file and flatten
/// its `benchmarks` array into one record per test.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Test name used when an entry carries no `name`.
pub const UNKNOWN_TEST: &str = "Unknown Test";

/// Characters trimmed from both ends of a module name to get the file name.
const FILE_NAME_STRIP: &[char] = &['.', 'p', 'y'];

/// One element of the report's `benchmarks` array. Unknown keys are ignored.
#[derive(Debug, Deserialize)]
pub struct BenchmarkEntry {
    #[serde(default)]
    pub fullname: Option<String>,
    /// Kept as raw JSON: an explicit `null` is stored as `null`, only an
    /// absent key falls back to [`UNKNOWN_TEST`].
    #[serde(default = "unknown_test")]
    pub name: Value,
    #[serde(default)]
    pub group: Value,
    #[serde(default = "empty_stats")]
    pub stats: Value,
}

fn unknown_test() -> Value {
    Value::String(UNKNOWN_TEST.to_string())
}

fn empty_stats() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Flattened per-test record stored in the `performance` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub test_name: Value,
    pub group: Value,
    /// Raw statistics object, passed through untouched.
    pub stats: Value,
    pub full_name: Option<String>,
    pub file_name: Option<String>,
}

impl From<BenchmarkEntry> for ExtractedRecord {
    fn from(entry: BenchmarkEntry) -> Self {
        let file_name = entry.fullname.as_deref().and_then(derive_file_name);
        Self {
            test_name: entry.name,
            group: entry.group,
            stats: entry.stats,
            full_name: entry.fullname,
            file_name,
        }
    }
}

/// Errors that can occur while extracting benchmark records.
#[derive(Debug)]
pub enum ExtractError {
    /// The report file could not be read.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The report (or its double-encoded payload) is not valid JSON.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The report parsed but does not have the expected layout.
    Shape { detail: String },
    /// A `benchmarks` element could not be read as an entry.
    Entry {
        index: usize,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Io { path, source } => {
                write!(f, "failed to read benchmark report {}: {}", path.display(), source)
            }
            ExtractError::Parse { path, source } => {
                write!(f, "invalid JSON in benchmark report {}: {}", path.display(), source)
            }
            ExtractError::Shape { detail } => write!(f, "unexpected benchmark report layout: {detail}"),
            ExtractError::Entry { index, source } => {
                write!(f, "invalid entry at benchmarks[{index}]: {source}")
            }
        }
    }
}

impl std::error::Error for ExtractError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractError::Io { source, .. } => Some(source),
            ExtractError::Parse { source, .. } => Some(source),
            ExtractError::Shape { .. } => None,
            ExtractError::Entry { source, .. } => Some(source),
        }
    }
}

/// Read a benchmark report from `path` and return one record per entry of its
/// `benchmarks` array, in input order.
///
/// A report whose top-level value is a JSON string is decoded a second time.
pub fn extract_stats_from_json(path: &Path) -> Result<Vec<ExtractedRecord>, ExtractError> {
    let content = std::fs::read_to_string(path).map_err(|e| ExtractError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let data = parse_report(&content).map_err(|e| ExtractError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    let records = extract_records(&data)?;
    tracing::debug!(path = %path.display(), records = records.len(), "extracted benchmark records");
    Ok(records)
}

fn parse_report(content: &str) -> serde_json::Result<Value> {
    match serde_json::from_str(content)? {
        Value::String(inner) => serde_json::from_str(&inner),
        other => Ok(other),
    }
}

/// Map an already-parsed report to records. Missing `benchmarks` yields an
/// empty list.
pub fn extract_records(data: &Value) -> Result<Vec<ExtractedRecord>, ExtractError> {
    let report = data.as_object().ok_or_else(|| ExtractError::Shape {
        detail: format!("expected an object at the top level, found {}", json_kind(data)),
    })?;

    let entries = match report.get("benchmarks") {
        None => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ExtractError::Shape {
                detail: format!("`benchmarks` must be an array, found {}", json_kind(other)),
            })
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            BenchmarkEntry::deserialize(raw)
                .map(ExtractedRecord::from)
                .map_err(|source| ExtractError::Entry { index, source })
        })
        .collect()
}

/// Derive the source file name from a qualified test id such as
/// `tests/test_foo.py::test_bar`.
///
/// Takes the last `/` segment, keeps what precedes `::`, then trims any of
/// `.`, `p`, `y` from both ends. This is a character-set trim, so
/// `test_happy.py` becomes `test_ha`.
pub fn derive_file_name(full_name: &str) -> Option<String> {
    if full_name.is_empty() {
        return None;
    }
    let last = full_name.rsplit('/').next().unwrap_or(full_name);
    let module = last.split("::").next().unwrap_or(last);
    Some(module.trim_matches(FILE_NAME_STRIP).to_string())
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
