//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Validate email
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid email format".to_string());
    }

    Ok(())
}

/// Validate a verification code of `length` ASCII digits
pub fn validate_code(code: &str, length: usize) -> Result<(), String> {
    if code.is_empty() {
        return Err("Verification code is required".to_string());
    }

    if code.len() != length || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("Verification code must be {} digits", length));
    }

    Ok(())
}
