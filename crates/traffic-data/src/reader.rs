//! Usage export discovery and loading.
//!
//! Reads per-user usage records exported from the panel API, either from a
//! single JSON document or from every `*.json` file under a directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};
use traffic_core::error::{Result, TrafficError};
use traffic_core::models::UsageRecord;

/// An API response envelope: `{ "data": [...] }`. Other keys are ignored.
#[derive(Debug, Deserialize)]
struct Envelope {
    data: Vec<UsageRecord>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Find all `.json` files recursively under `data_path`, sorted by path.
pub fn find_json_files(data_path: &Path) -> Vec<PathBuf> {
    if !data_path.exists() {
        warn!("Data path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "json")
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

/// Load usage records from a JSON file or a directory of JSON files.
///
/// Records from several files are concatenated in path order.
pub fn load_usage_records(path: &Path) -> Result<Vec<UsageRecord>> {
    if !path.exists() {
        return Err(TrafficError::DataPathNotFound(path.to_path_buf()));
    }

    if path.is_file() {
        return read_usage_file(path);
    }

    let files = find_json_files(path);
    if files.is_empty() {
        return Err(TrafficError::NoDataFiles(path.to_path_buf()));
    }

    let mut records = Vec::new();
    for file in &files {
        records.extend(read_usage_file(file)?);
    }

    debug!(
        "Loaded {} usage records from {} files",
        records.len(),
        files.len()
    );
    Ok(records)
}

/// Parse a single usage export document.
///
/// The document is either a bare array of records or an [`Envelope`]. The
/// layout is chosen from the first token, so a malformed record reports
/// serde's line and column rather than a generic shape mismatch.
pub fn parse_usage_document(content: &str) -> Result<Vec<UsageRecord>> {
    if content.trim_start().starts_with('{') {
        let envelope: Envelope = serde_json::from_str(content)?;
        return Ok(envelope.data);
    }
    Ok(serde_json::from_str(content)?)
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn read_usage_file(path: &Path) -> Result<Vec<UsageRecord>> {
    let content = std::fs::read_to_string(path).map_err(|source| TrafficError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let records = parse_usage_document(&content)?;
    debug!("{}: {} records", path.display(), records.len());
    Ok(records)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const BARE: &str = r#"[
        {"username": "alice", "date": "2024-01-02", "total": 500},
        {"username": "bob", "date": "2024-01-02", "total": 200}
    ]"#;

    const ENVELOPE: &str = r#"{"data": [
        {"username": "alice", "date": "2024-01-10T08:00:00Z", "total": 300}
    ]}"#;

    // ── parse_usage_document ──────────────────────────────────────────────────

    #[test]
    fn test_parse_bare_array() {
        let records = parse_usage_document(BARE).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], UsageRecord::new("alice", "2024-01-02", 500));
    }

    #[test]
    fn test_parse_envelope() {
        let records = parse_usage_document(ENVELOPE).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].date, "2024-01-10T08:00:00Z");
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        let err = parse_usage_document(r#"{"usages": []}"#).unwrap_err();
        assert!(matches!(err, TrafficError::JsonParse(_)));
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(parse_usage_document("[{").is_err());
        assert!(matches!(
            parse_usage_document("not json"),
            Err(TrafficError::JsonParse(_))
        ));
    }

    #[test]
    fn test_parse_bad_record_reports_position() {
        let content = r#"[
    {"username": "alice", "date": "2024-01-02", "total": 500},
    {"username": "bob", "date": "2024-01-02", "total": "lots"}
]"#;
        match parse_usage_document(content).unwrap_err() {
            TrafficError::JsonParse(e) => {
                assert_eq!(e.line(), 3);
                assert!(e.column() > 0);
                assert!(e.to_string().contains("line 3"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_bad_record_in_envelope_reports_position() {
        let content = "{\"data\": [\n  {\"username\": \"alice\", \"date\": \"2024-01-02\"}\n]}";
        match parse_usage_document(content).unwrap_err() {
            TrafficError::JsonParse(e) => {
                assert_eq!(e.line(), 2);
                assert!(e.to_string().contains("missing field `total`"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_envelope_ignores_extra_keys() {
        let content = r#"{"success": true, "data": [
            {"username": "carol", "date": "2024-02-01", "total": 1}
        ]}"#;
        let records = parse_usage_document(content).unwrap();
        assert_eq!(records, vec![UsageRecord::new("carol", "2024-02-01", 1)]);
    }

    // ── find_json_files ──────────────────────────────────────────────────────

    #[test]
    fn test_find_json_files_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("node-b")).unwrap();
        fs::write(dir.path().join("node-b").join("usage.json"), BARE).unwrap();
        fs::write(dir.path().join("a.json"), BARE).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = find_json_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.json"));
        assert!(files[1].ends_with("node-b/usage.json"));
    }

    #[test]
    fn test_find_json_files_missing_dir() {
        assert!(find_json_files(Path::new("/definitely/not/here")).is_empty());
    }

    // ── load_usage_records ───────────────────────────────────────────────────

    #[test]
    fn test_load_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("usage.json");
        fs::write(&file, BARE).unwrap();

        let records = load_usage_records(&file).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_load_directory_concatenates_in_path_order() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("1.json"), BARE).unwrap();
        fs::write(dir.path().join("2.json"), ENVELOPE).unwrap();

        let records = load_usage_records(dir.path()).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].date, "2024-01-10T08:00:00Z");
    }

    #[test]
    fn test_load_missing_path() {
        let err = load_usage_records(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, TrafficError::DataPathNotFound(_)));
    }

    #[test]
    fn test_load_empty_directory() {
        let dir = TempDir::new().unwrap();
        let err = load_usage_records(dir.path()).unwrap_err();
        assert!(matches!(err, TrafficError::NoDataFiles(_)));
    }

    #[test]
    fn test_load_directory_with_bad_file_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.json"), BARE).unwrap();
        fs::write(dir.path().join("nope.json"), "not json").unwrap();

        assert!(load_usage_records(dir.path()).is_err());
    }
}
