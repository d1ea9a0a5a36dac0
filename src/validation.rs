//! Client-side input checks run before anything is sent to the backend.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("EMAIL_RE"));
static CONTACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10}$").expect("CONTACT_RE"));

const ACCOUNT_SYMBOLS: &str = "@$!%*?&";
const EXCHANGE_SYMBOLS: &str = "!@#$%^&*()_+=-{}[]:;\"'<>,.?/";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Email and password are required")]
    MissingCredentials,

    #[error("Email must include @ symbol")]
    EmailMissingAt,

    #[error("Enter a valid email address")]
    InvalidEmail,

    #[error("{0}")]
    WeakPassword(&'static str),

    #[error("Contact must be exactly 10 digits")]
    InvalidContact,
}

#[derive(Debug, Default, Clone, Copy)]
struct CharClasses {
    upper: bool,
    lower: bool,
    digit: bool,
    symbol: bool,
}

fn classes(password: &str, symbols: &str) -> CharClasses {
    password.chars().fold(CharClasses::default(), |mut c, ch| {
        c.upper |= ch.is_ascii_uppercase();
        c.lower |= ch.is_ascii_lowercase();
        c.digit |= ch.is_ascii_digit();
        c.symbol |= symbols.contains(ch);
        c
    })
}

/// Trimmed, lowercased email if it looks deliverable.
pub fn validate_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    if !email.contains('@') {
        return Err(ValidationError::EmailMissingAt);
    }
    if !EMAIL_RE.is_match(&email) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email)
}

/// Registration policy: 8+ characters with an uppercase letter, a digit and
/// one of `@$!%*?&`.
pub fn validate_account_password(password: &str) -> Result<(), ValidationError> {
    let c = classes(password, ACCOUNT_SYMBOLS);
    if password.chars().count() < 8 || !c.upper || !c.digit || !c.symbol {
        return Err(ValidationError::WeakPassword(
            "Password must be at least 8 characters, include uppercase, number & special character",
        ));
    }
    Ok(())
}

/// Owner password set on a physical QR code: account policy plus a lowercase letter.
pub fn validate_qr_owner_password(password: &str) -> Result<(), ValidationError> {
    const MSG: &str =
        "Password must be 8+ chars with uppercase, lowercase, number & special char";
    validate_account_password(password).map_err(|_| ValidationError::WeakPassword(MSG))?;
    if !classes(password, ACCOUNT_SYMBOLS).lower {
        return Err(ValidationError::WeakPassword(MSG));
    }
    Ok(())
}

/// Optional protection for a document exchange code.
pub fn validate_exchange_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    let c = classes(password, EXCHANGE_SYMBOLS);
    if !(8..=72).contains(&len) || !c.upper || !c.lower || !c.digit || !c.symbol {
        return Err(ValidationError::WeakPassword(
            "Password must be 8-72 chars with upper, lower, number & symbol",
        ));
    }
    Ok(())
}

pub fn validate_contact(contact: &str) -> Result<(), ValidationError> {
    if CONTACT_RE.is_match(contact.trim()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidContact)
    }
}

/// Normalized `(email, password)` for a login request. Only presence is
/// checked here; the backend judges the credentials.
pub fn validate_login(email: &str, password: &str) -> Result<(String, String), ValidationError> {
    let email = email.trim().to_lowercase();
    let password = password.trim();
    if email.is_empty() || password.is_empty() {
        return Err(ValidationError::MissingCredentials);
    }
    Ok((email, password.to_string()))
}
