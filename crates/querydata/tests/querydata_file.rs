//! Integration tests for reading querydata files from disk.

use chrono::NaiveDate;
use qd_common::{Field, GridSpec, QdError};
use querydata::{GridSource, QueryData, QueryDataBuilder};

// ============================================================================
// Save / open
// ============================================================================

#[test]
fn test_save_then_open_keeps_values_and_times() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t2m.json");

    let t0 = NaiveDate::from_ymd_opt(2024, 3, 5)
        .unwrap()
        .and_hms_opt(6, 0, 0)
        .unwrap();
    let t1 = t0 + chrono::Duration::hours(1);
    let grid = GridSpec::new(2, 2, 0.5, 0.5, 24.0, 60.0);

    let written = QueryDataBuilder::new("memory", grid)
        .producer("test")
        .times(vec![t0, t1])
        .param(
            "Temperature",
            vec![
                Field::from_values(2, 2, vec![Some(1.0), None, Some(3.0), Some(4.0)]).unwrap(),
                Field::filled(2, 2, Some(0.0)),
            ],
        )
        .build()
        .unwrap();
    written.save(&path).unwrap();

    let read = QueryData::open(&path).unwrap();
    assert_eq!(read.path(), path.display().to_string());
    assert_eq!(read.producer(), "test");
    assert_eq!(read.times(), &[t0, t1]);
    assert_eq!(read.origin_time(), t0);
    assert!(read.modified().is_some());

    let field = read.values("Temperature", 0, 0).unwrap();
    assert_eq!(field.get(1, 0), None);
    assert_eq!(field.get(1, 1), Some(4.0));
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_open_missing_file() {
    let result = QueryData::open("/definitely/not/here.json");
    assert!(matches!(result, Err(QdError::FileNotFound(_))));
}

#[test]
fn test_open_malformed_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    let result = QueryData::open(&path);
    assert!(matches!(result, Err(QdError::QueryData { .. })));
}
