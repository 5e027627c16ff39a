use chrono::{TimeZone, Utc};

use super::*;

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

#[test]
fn default_spec_is_valid() {
    assert_eq!(FilterSpec::default().validate(), Ok(()));
}

#[test]
fn exact_rating_sets_both_bounds() {
    let spec = FilterSpec::exact_rating(3);
    assert_eq!(spec.min_rating, Some(3));
    assert_eq!(spec.max_rating, Some(3));
    assert_eq!(spec.validate(), Ok(()));
}

#[test]
fn rejects_rating_below_one() {
    let spec = FilterSpec {
        min_rating: Some(0),
        ..FilterSpec::default()
    };
    assert_eq!(
        spec.validate(),
        Err(FilterError::RatingOutOfRange {
            field: "min_rating",
            value: 0
        })
    );
}

#[test]
fn rejects_rating_above_five() {
    let spec = FilterSpec {
        max_rating: Some(6),
        ..FilterSpec::default()
    };
    assert!(matches!(
        spec.validate(),
        Err(FilterError::RatingOutOfRange {
            field: "max_rating",
            value: 6
        })
    ));
}

#[test]
fn rejects_inverted_rating_range() {
    let spec = FilterSpec {
        min_rating: Some(5),
        max_rating: Some(2),
        ..FilterSpec::default()
    };
    assert_eq!(
        spec.validate(),
        Err(FilterError::RatingRangeInverted { min: 5, max: 2 })
    );
}

#[test]
fn rejects_inverted_date_range() {
    let since = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let until = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let spec = FilterSpec {
        since: Some(since),
        until: Some(until),
        ..FilterSpec::default()
    };
    assert_eq!(
        spec.validate(),
        Err(FilterError::DateRangeInverted { since, until })
    );
}

#[test]
fn equal_date_bounds_are_valid() {
    let day = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let spec = FilterSpec {
        since: Some(day),
        until: Some(day),
        ..FilterSpec::default()
    };
    assert_eq!(spec.validate(), Ok(()));
    assert!(spec.has_date_bounds());
}

#[test]
fn rejects_malformed_locale_codes() {
    let spec = FilterSpec {
        language: Some("eng".to_owned()),
        ..FilterSpec::default()
    };
    assert_eq!(
        spec.validate(),
        Err(FilterError::InvalidLanguage("eng".to_owned()))
    );

    let spec = FilterSpec {
        country: Some("U1".to_owned()),
        ..FilterSpec::default()
    };
    assert_eq!(
        spec.validate(),
        Err(FilterError::InvalidCountry("U1".to_owned()))
    );
}

#[test]
fn accepts_mixed_case_locale_codes() {
    let spec = FilterSpec {
        language: Some("EN".to_owned()),
        country: Some("gb".to_owned()),
        ..FilterSpec::default()
    };
    assert_eq!(spec.validate(), Ok(()));
}

// ---------------------------------------------------------------------------
// ResponseMode
// ---------------------------------------------------------------------------

#[test]
fn spec_serializes_with_lowercase_response_mode() {
    let spec = FilterSpec {
        min_rating: Some(4),
        developer_response: ResponseMode::Absent,
        ..FilterSpec::default()
    };
    let json = serde_json::to_value(&spec).unwrap();
    assert_eq!(json["min_rating"], 4);
    assert!(json["max_rating"].is_null());
    assert_eq!(json["developer_response"], "absent");
}
