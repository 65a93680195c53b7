use std::time::Duration;

use agent_foreman::duration::parse_duration_with_days;
use agent_foreman::AppError;

#[test]
fn days_are_24_hours() {
    assert_eq!(
        parse_duration_with_days("7d").expect("parses"),
        Duration::from_secs(7 * 24 * 3600)
    );
}

#[test]
fn hours_minutes_and_seconds() {
    assert_eq!(
        parse_duration_with_days("24h").expect("parses"),
        Duration::from_secs(24 * 3600)
    );
    assert_eq!(
        parse_duration_with_days("90m").expect("parses"),
        Duration::from_secs(90 * 60)
    );
    assert_eq!(
        parse_duration_with_days("45s").expect("parses"),
        Duration::from_secs(45)
    );
}

#[test]
fn combined_units() {
    assert_eq!(
        parse_duration_with_days("1d12h30m").expect("parses"),
        Duration::from_secs(24 * 3600 + 12 * 3600 + 30 * 60)
    );
}

#[test]
fn surrounding_whitespace_is_ignored() {
    assert_eq!(
        parse_duration_with_days("  2h ").expect("parses"),
        Duration::from_secs(7200)
    );
}

#[test]
fn rejects_malformed_input() {
    for raw in ["", "d", "7x", "1.5h", "-1d", "3", "h2"] {
        let err = parse_duration_with_days(raw).expect_err(raw);
        assert!(
            matches!(err, AppError::InvalidArgument(_)),
            "{raw} should be an invalid argument, got {err}"
        );
    }
}

#[test]
fn rejects_overflow() {
    let err = parse_duration_with_days("99999999999999999999d").expect_err("overflow");
    assert!(matches!(err, AppError::InvalidArgument(_)));
}
