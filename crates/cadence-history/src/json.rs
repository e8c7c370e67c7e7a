//! Commit records from a JSON export.

use std::path::Path;

use cadence_core::{check_records, CadenceError, CommitRecord};

/// Load commit records from a JSON array of
/// `{sha, author_email, committed_date, message}` objects.
///
/// `committed_date` must be an integer number of seconds or `null`; any other
/// type fails the whole load with the position of the offending value.
/// Records keep the order of the file.
///
/// # Errors
///
/// Returns [`CadenceError::FileNotFound`] if `path` does not exist,
/// [`CadenceError::Serialization`] if the JSON does not match the record
/// shape, or [`CadenceError::InvalidInput`] for empty or duplicate shas.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use cadence_history::json::load_records_json;
///
/// let records = load_records_json(Path::new("commits.json")).unwrap();
/// println!("{} records", records.len());
/// ```
pub fn load_records_json(path: &Path) -> Result<Vec<CommitRecord>, CadenceError> {
    if !path.exists() {
        return Err(CadenceError::FileNotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    parse_records_json(&content)
}

/// Parse commit records from JSON text. See [`load_records_json`].
///
/// # Examples
///
/// ```
/// use cadence_history::json::parse_records_json;
///
/// let json = r#"[{"sha": "a", "author_email": "x@y.z", "committed_date": 1000, "message": "init"}]"#;
/// let records = parse_records_json(json).unwrap();
/// assert_eq!(records[0].committed_date, Some(1000));
///
/// let bad = r#"[{"sha": "a", "author_email": "x@y.z", "committed_date": "1000"}]"#;
/// assert!(parse_records_json(bad).is_err());
/// ```
pub fn parse_records_json(content: &str) -> Result<Vec<CommitRecord>, CadenceError> {
    let records: Vec<CommitRecord> = serde_json::from_str(content)?;
    check_records(&records)?;
    Ok(records)
}
