use agent_foreman::models::validate_name;
use agent_foreman::AppError;

#[test]
fn accepts_ordinary_names() {
    for name in ["alpha", "agent-1", "build_2024.10", "A"] {
        validate_name("session", name).unwrap_or_else(|err| panic!("{name}: {err}"));
    }
}

#[test]
fn rejects_traversal_and_separators() {
    for name in ["..", ".", "../etc", "a/b", "a\\b"] {
        let err = validate_name("session", name).expect_err(name);
        assert!(matches!(err, AppError::InvalidArgument(_)), "{name}: {err}");
    }
}

#[test]
fn rejects_empty_and_odd_characters() {
    for name in ["", "has space", "semi;colon", ".hidden", "-flag"] {
        let err = validate_name("snapshot", name).expect_err(name);
        assert!(matches!(err, AppError::InvalidArgument(_)), "{name}: {err}");
    }
}

#[test]
fn error_names_the_kind() {
    let err = validate_name("snapshot", "").expect_err("empty");
    assert!(err.to_string().contains("snapshot"));
}
