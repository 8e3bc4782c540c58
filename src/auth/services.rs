use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ClientError;

pub const MIN_PASSWORD_LEN: usize = 8;

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Client-side checks run before the form is sent.
pub fn check_credentials(email: &str, password: &str, registering: bool) -> Result<(), ClientError> {
    if !is_valid_email(email) {
        return Err(ClientError::Invalid("Invalid email".into()));
    }
    if password.is_empty() {
        return Err(ClientError::Invalid("Password is required".into()));
    }
    if registering && password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::Invalid("Password too short".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shape() {
        assert!(is_valid_email("user@example.com"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user example@x.io"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_email("  Foo@Bar.COM "), "foo@bar.com");
    }

    #[test]
    fn short_password_only_rejected_on_register() {
        assert!(check_credentials("a@b.io", "short", false).is_ok());
        let err = check_credentials("a@b.io", "short", true).unwrap_err();
        assert_eq!(err.to_string(), "Password too short");
        assert!(check_credentials("a@b.io", "", false).is_err());
    }
}
