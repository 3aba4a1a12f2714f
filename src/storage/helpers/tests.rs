use super::*;
use chrono::{Duration, TimeZone};

#[test]
fn test_timestamp_format_is_fixed_width_and_sortable() {
    let a = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
    let b = a + Duration::milliseconds(1500);
    let fa = format_timestamp(&a);
    let fb = format_timestamp(&b);
    assert_eq!(fa, "2025-01-01T09:00:00.000000Z");
    assert_eq!(fa.len(), fb.len());
    assert!(fa < fb);
}

#[test]
fn test_timestamp_parses_back() {
    let ts = Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap() + Duration::microseconds(7);
    assert_eq!(parse_timestamp(&format_timestamp(&ts)).unwrap(), ts);
}

#[test]
fn test_parse_timestamp_rejects_garbage() {
    assert!(matches!(
        parse_timestamp("yesterday"),
        Err(StorageError::InvalidTimestamp(_))
    ));
}

#[test]
fn test_optional_date() {
    let date = NaiveDate::from_ymd_opt(2025, 2, 3).unwrap();
    assert_eq!(format_date(&date), "2025-02-03");
    assert_eq!(
        parse_optional_date(Some("2025-02-03".to_string())).unwrap(),
        Some(date)
    );
    assert_eq!(parse_optional_date(None).unwrap(), None);
    assert!(parse_optional_date(Some("03/02/2025".to_string())).is_err());
}

#[test]
fn test_parse_uuid() {
    let id = Uuid::new_v4();
    assert_eq!(parse_uuid(&id.to_string()).unwrap(), id);
    assert!(matches!(
        parse_uuid("not-a-uuid"),
        Err(StorageError::InvalidUuid(_))
    ));
}
