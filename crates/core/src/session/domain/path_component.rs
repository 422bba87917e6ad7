use std::path::{Component, Path};

use crate::session::domain::session_error::SessionError;

/// Checks that `value` names exactly one entry inside its parent directory.
///
/// Rejects empty strings, `.` and `..`, separators of either platform and
/// NUL bytes. `what` names the field in the error message.
pub fn validate_component<'a>(what: &str, value: &'a str) -> Result<&'a str, SessionError> {
    if value.is_empty() {
        return Err(SessionError::validation(format!("{what} required")));
    }
    if value.contains(['/', '\\', '\0']) {
        return Err(SessionError::validation(format!("Invalid {what}: {value:?}")));
    }

    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(value),
        _ => Err(SessionError::validation(format!("Invalid {what}: {value:?}"))),
    }
}

/// Normalizes a user-supplied group name: surrounding whitespace is
/// dropped and inner whitespace becomes `_`.
pub fn sanitize_group_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("person_0")]
    #[case("f3_id7.jpg")]
    #[case("0123456789abcdef0123456789abcdef")]
    #[case("...hidden")]
    fn test_accepts_single_component(#[case] value: &str) {
        assert_eq!(validate_component("name", value).unwrap(), value);
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("..")]
    #[case("a/b")]
    #[case("../etc")]
    #[case("a\\b")]
    #[case("nul\0byte")]
    #[case("/abs")]
    fn test_rejects_unsafe_component(#[case] value: &str) {
        let err = validate_component("name", value).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn test_empty_message_names_field() {
        let err = validate_component("session_id", "").unwrap_err();
        assert_eq!(err.to_string(), "session_id required");
    }

    #[rstest]
    #[case("  Alice  ", "Alice")]
    #[case("red shirt guy", "red_shirt_guy")]
    #[case("tab\there", "tab_here")]
    #[case("   ", "")]
    fn test_sanitize_group_name(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_group_name(raw), expected);
    }
}
