/// Input validation shared by listings, feedback, accounts and events
///
/// Checks run on the server for every mutating call. The client library
/// runs the same checks first only to fail fast.
use crate::error::{MarketError, MarketResult};
use validator::ValidateEmail;

pub const FEEDBACK_COMMENT_MIN: usize = 5;
pub const FEEDBACK_COMMENT_MAX: usize = 1000;
pub const TITLE_MAX: usize = 100;
pub const DESCRIPTION_MAX: usize = 2000;
pub const NICKNAME_MIN: usize = 2;
pub const NICKNAME_MAX: usize = 20;

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

/// Collects field errors and converts them into a single `Validation` error
#[derive(Debug, Default)]
pub struct FieldErrors {
    errors: Vec<ValidationError>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(ValidationError {
            path: path.to_string(),
            message: message.into(),
        });
    }

    /// Record an error when `ok` is false
    pub fn check(&mut self, ok: bool, path: &str, message: impl Into<String>) {
        if !ok {
            self.push(path, message);
        }
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn into_result(self) -> MarketResult<()> {
        if self.errors.is_empty() {
            return Ok(());
        }

        let joined = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(MarketError::Validation(joined))
    }
}

/// Price must lie in the configured [min, max] range
pub fn check_price(errors: &mut FieldErrors, price: i64, min: i64, max: i64) {
    errors.check(
        (min..=max).contains(&price),
        "price",
        format!("must be between {} and {}", min, max),
    );
}

pub fn validate_price(price: i64, min: i64, max: i64) -> MarketResult<()> {
    let mut errors = FieldErrors::new();
    check_price(&mut errors, price, min, max);
    errors.into_result()
}

/// Rating must be an integer in [1, 5]; comment 5 to 1000 characters
pub fn validate_feedback(rating: i64, comment: &str) -> MarketResult<()> {
    let mut errors = FieldErrors::new();
    errors.check((1..=5).contains(&rating), "rating", "must be between 1 and 5");

    let length = comment.trim().chars().count();
    errors.check(
        (FEEDBACK_COMMENT_MIN..=FEEDBACK_COMMENT_MAX).contains(&length),
        "comment",
        format!(
            "must be between {} and {} characters",
            FEEDBACK_COMMENT_MIN, FEEDBACK_COMMENT_MAX
        ),
    );
    errors.into_result()
}

/// Letters (including Hangul), digits and underscore, 2 to 20 characters
pub fn validate_nickname(nickname: &str) -> MarketResult<()> {
    let mut errors = FieldErrors::new();
    let length = nickname.chars().count();
    errors.check(
        (NICKNAME_MIN..=NICKNAME_MAX).contains(&length),
        "nickname",
        format!("must be between {} and {} characters", NICKNAME_MIN, NICKNAME_MAX),
    );
    errors.check(
        nickname.chars().all(|c| c.is_alphanumeric() || c == '_'),
        "nickname",
        "may only contain letters, digits and underscores",
    );
    errors.into_result()
}

/// Address syntax per the `validator` crate's email rule
pub fn validate_email(email: &str) -> MarketResult<()> {
    if email.validate_email() {
        Ok(())
    } else {
        Err(MarketError::Validation("email: invalid address".to_string()))
    }
}

pub fn validate_password(password: &str) -> MarketResult<()> {
    if password.chars().count() < 8 {
        return Err(MarketError::Validation(
            "password: must be at least 8 characters".to_string(),
        ));
    }
    Ok(())
}

/// Required free-text field with a maximum length
pub fn check_text(errors: &mut FieldErrors, path: &str, value: &str, max: usize) {
    let length = value.trim().chars().count();
    errors.check(length > 0, path, "is required");
    errors.check(length <= max, path, format!("must be at most {} characters", max));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_bounds() {
        assert!(validate_price(100, 100, 500).is_ok());
        assert!(validate_price(500, 100, 500).is_ok());
        assert!(validate_price(99, 100, 500).is_err());
        assert!(validate_price(501, 100, 500).is_err());
    }

    #[test]
    fn test_feedback_bounds() {
        assert!(validate_feedback(5, "great worksheet").is_ok());
        assert!(validate_feedback(0, "great worksheet").is_err());
        assert!(validate_feedback(6, "great worksheet").is_err());
        assert!(validate_feedback(3, "meh").is_err());
        assert!(validate_feedback(3, &"a".repeat(1001)).is_err());
        // Counted in characters, not bytes
        assert!(validate_feedback(4, "아주 좋아요").is_ok());
    }

    #[test]
    fn test_nickname_charset() {
        assert!(validate_nickname("teacher_kim").is_ok());
        assert!(validate_nickname("김선생").is_ok());
        assert!(validate_nickname("a").is_err());
        assert!(validate_nickname("bad name!").is_err());
    }

    #[test]
    fn test_field_errors_join() {
        let mut errors = FieldErrors::new();
        check_text(&mut errors, "title", "   ", TITLE_MAX);
        check_price(&mut errors, 10, 100, 500);
        assert_eq!(errors.errors().len(), 2);

        match errors.into_result() {
            Err(MarketError::Validation(msg)) => {
                assert!(msg.contains("title"));
                assert!(msg.contains("price"));
            }
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_email() {
        assert!(validate_email("kim@school.kr").is_ok());
        assert!(validate_email("@school.kr").is_err());
        assert!(validate_email("kim school@example.com").is_err());
    }
}
