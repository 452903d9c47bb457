//! Validation helpers for DTOs.

use validator::{ValidateUrl, ValidationError, ValidationErrors};

/// Longest username accepted, in characters.
pub const USERNAME_MAX_CHARS: usize = 32;

/// Validates a player username: non-blank, at most [`USERNAME_MAX_CHARS`] characters once
/// trimmed, and free of control characters.
///
/// # Examples
///
/// ```ignore
/// validate_username("MonsterTamer") // Ok
/// validate_username("   ")          // Err - blank
/// validate_username("bad\nname")    // Err - control character
/// ```
pub fn validate_username(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("username_blank");
        err.message = Some("Username must not be blank".into());
        return Err(err);
    }

    let length = trimmed.chars().count();
    if length > USERNAME_MAX_CHARS {
        let mut err = ValidationError::new("username_length");
        err.message = Some(
            format!("Username must be at most {USERNAME_MAX_CHARS} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("username_format");
        err.message = Some("Username must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

/// Validates an optional image URL attached to a message.
pub fn validate_image_url(url: &str) -> Result<(), ValidationError> {
    if url.validate_url() {
        Ok(())
    } else {
        let mut err = ValidationError::new("image_url");
        err.message = Some("Image URL must be an absolute URL".into());
        Err(err)
    }
}

/// Validates an optional image URL; a blank value means "no image".
pub fn validate_optional_image_url(url: Option<&str>) -> Result<(), ValidationError> {
    match url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => validate_image_url(url),
        None => Ok(()),
    }
}

/// Collect a single-field check into a [`ValidationErrors`] result.
pub fn field_errors(
    checks: impl IntoIterator<Item = (&'static str, Result<(), ValidationError>)>,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    for (field, check) in checks {
        if let Err(err) = check {
            errors.add(field, err);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username_valid() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("  Monster Tamer  ").is_ok());
        assert!(validate_username(&"x".repeat(USERNAME_MAX_CHARS)).is_ok());
    }

    #[test]
    fn test_validate_username_invalid() {
        assert!(validate_username("").is_err());
        assert!(validate_username("   ").is_err());
        assert!(validate_username(&"x".repeat(USERNAME_MAX_CHARS + 1)).is_err());
        assert!(validate_username("bad\nname").is_err());
    }

    #[test]
    fn test_validate_image_url() {
        assert!(validate_image_url("https://cdn.example.com/monster.png").is_ok());
        assert!(validate_image_url("monster.png").is_err());
    }

    #[test]
    fn test_validate_optional_image_url_skips_blank() {
        assert!(validate_optional_image_url(None).is_ok());
        assert!(validate_optional_image_url(Some("")).is_ok());
        assert!(validate_optional_image_url(Some("   ")).is_ok());
        assert!(validate_optional_image_url(Some(" https://cdn.example.com/m.png ")).is_ok());
        assert!(validate_optional_image_url(Some("monster.png")).is_err());
    }

    #[test]
    fn test_field_errors_collects_failures() {
        assert!(field_errors([("username", validate_username("ok"))]).is_ok());
        let errors = field_errors([
            ("username", validate_username("")),
            ("image_url", validate_image_url("nope")),
        ])
        .unwrap_err();
        assert_eq!(errors.field_errors().len(), 2);
    }
}
