//! Unit tests for `AppError` display format and conversions.

use agent_foreman::AppError;

#[test]
fn not_found_display_has_category_prefix() {
    let err = AppError::NotFound("session 'alpha' not found".into());
    assert_eq!(err.to_string(), "not found: session 'alpha' not found");
}

#[test]
fn every_variant_has_a_distinct_prefix() {
    let errors = [
        AppError::NotFound("x".into()),
        AppError::AlreadyExists("x".into()),
        AppError::InvalidState("x".into()),
        AppError::ResourceBusy("x".into()),
        AppError::Unsupported("x".into()),
        AppError::ExternalFailure("x".into()),
        AppError::Unschedulable("x".into()),
        AppError::DuplicateId("x".into()),
        AppError::InvalidArgument("x".into()),
        AppError::Config("x".into()),
        AppError::Io("x".into()),
        AppError::Partial("x".into()),
    ];
    let mut rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
    rendered.sort();
    rendered.dedup();
    assert_eq!(rendered.len(), errors.len());
}

#[test]
fn is_not_found_only_matches_not_found() {
    assert!(AppError::NotFound("gone".into()).is_not_found());
    assert!(!AppError::InvalidState("gone".into()).is_not_found());
}

#[test]
fn toml_errors_become_config_errors() {
    let parse: Result<toml::Value, _> = toml::from_str("state_root = ");
    let err: AppError = parse.expect_err("invalid toml").into();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn json_errors_become_io_errors() {
    let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
    let err: AppError = parse.expect_err("invalid json").into();
    assert!(err.to_string().starts_with("io: json:"));
}
