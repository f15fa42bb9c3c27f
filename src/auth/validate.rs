/// Validate a username: 2-50 chars, alphanumeric and underscore only.
pub fn validate_username(username: &str) -> Option<String> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Some("Username is required".to_string());
    }
    if trimmed.chars().count() < 2 {
        return Some("Username must be at least 2 characters".to_string());
    }
    if trimmed.chars().count() > 50 {
        return Some("Username must be at most 50 characters".to_string());
    }
    if !trimmed.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Some("Username may only contain letters, numbers, and underscores".to_string());
    }
    None
}

/// Validate an optional email: empty is fine, otherwise needs '@' and '.'.
pub fn validate_email(email: &str) -> Option<String> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() > 254 {
        return Some("Email must be at most 254 characters".to_string());
    }
    if !trimmed.contains('@') || !trimmed.contains('.') {
        return Some("Email must be a valid address (contain '@' and '.')".to_string());
    }
    None
}

pub const MIN_PASSWORD_LEN: usize = 6;

/// Validate a new password.
pub fn validate_password(password: &str) -> Option<String> {
    if password.is_empty() {
        return Some("Password is required".to_string());
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Some(format!("Password must be at least {MIN_PASSWORD_LEN} characters"));
    }
    None
}

/// Validate a required text field with a max length.
pub fn validate_required(value: &str, field_name: &str, max_len: usize) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Some(format!("{field_name} is required"));
    }
    if trimmed.chars().count() > max_len {
        return Some(format!("{field_name} must be at most {max_len} characters"));
    }
    None
}

/// Validate an optional text field with a max length (empty is OK).
pub fn validate_optional(value: &str, field_name: &str, max_len: usize) -> Option<String> {
    if value.trim().chars().count() > max_len {
        return Some(format!("{field_name} must be at most {max_len} characters"));
    }
    None
}

/// Validate that `value` is one of `allowed`.
pub fn validate_one_of(value: &str, field_name: &str, allowed: &[&str]) -> Option<String> {
    if allowed.contains(&value) {
        None
    } else {
        Some(format!("{field_name} must be one of: {}", allowed.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(validate_username("alice_01").is_none());
        assert!(validate_username(" ").is_some());
        assert!(validate_username("a").is_some());
        assert!(validate_username("bad name").is_some());
        assert!(validate_username(&"x".repeat(51)).is_some());
    }

    #[test]
    fn email_is_optional() {
        assert!(validate_email("").is_none());
        assert!(validate_email("a@b.co").is_none());
        assert!(validate_email("nope").is_some());
    }

    #[test]
    fn password_minimum() {
        assert!(validate_password("12345").is_some());
        assert!(validate_password("123456").is_none());
    }

    #[test]
    fn text_lengths_count_characters() {
        // 50 multibyte characters are within a 50-character limit
        let game = "游".repeat(50);
        assert!(validate_required(&game, "Game", 50).is_none());
        assert!(validate_required(&format!("{game}x"), "Game", 50).is_some());
        assert!(validate_optional("", "Description", 500).is_none());
    }

    #[test]
    fn enumerations() {
        assert!(validate_one_of("report", "Category", &["notice", "report"]).is_none());
        assert_eq!(
            validate_one_of("memo", "Category", &["notice", "report"]).unwrap(),
            "Category must be one of: notice, report"
        );
    }
}
