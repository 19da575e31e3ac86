//! Argument validation for everything that ends up in a store path.
//!
//! All checks here run synchronously, before a request touches the store.
//!
//! Store keys (user ids, note ids, tag names as path segments):
//! - Must not be empty
//! - Must not contain `.`, `#`, `$`, `[`, `]` or `/`
//! - Must not contain ASCII control characters
//! - At most 768 bytes
//!
//! Tag names are keys with stricter rules:
//! - Alphanumeric characters, underscores (`_`), and hyphens (`-`)
//! - Must start with a letter
//! - Cannot have consecutive hyphens (`--`)
//! - Cannot end with a hyphen

use crate::error::GatewayError;
use std::fmt;

pub const MAX_KEY_BYTES: usize = 768;

const FORBIDDEN_KEY_CHARS: [char; 6] = ['.', '#', '$', '[', ']', '/'];

/// Validates a single store key segment.
///
/// # Examples
/// ```
/// use notesync::validation::validate_key;
///
/// assert!(validate_key("u1").is_ok());
/// assert!(validate_key("-Nq3xYz").is_ok());
///
/// assert!(validate_key("").is_err());
/// assert!(validate_key("a/b").is_err());
/// assert!(validate_key("a.b").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<(), KeyValidationError> {
    if key.is_empty() {
        return Err(KeyValidationError::Empty);
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(KeyValidationError::TooLong(key.len()));
    }
    for ch in key.chars() {
        if FORBIDDEN_KEY_CHARS.contains(&ch) || ch.is_ascii_control() {
            return Err(KeyValidationError::InvalidCharacter(ch));
        }
    }
    Ok(())
}

/// Validates a tag name.
///
/// # Examples
/// ```
/// use notesync::validation::validate_tag_name;
///
/// assert!(validate_tag_name("foo").is_ok());
/// assert!(validate_tag_name("foo-bar").is_ok());
/// assert!(validate_tag_name("f7_bar8").is_ok());
///
/// assert!(validate_tag_name("-foo").is_err());
/// assert!(validate_tag_name("foo-").is_err());
/// assert!(validate_tag_name("foo--bar").is_err());
/// assert!(validate_tag_name("7foo").is_err());
/// ```
pub fn validate_tag_name(name: &str) -> Result<(), TagValidationError> {
    let Some(first_char) = name.chars().next() else {
        return Err(TagValidationError::Empty);
    };
    if !first_char.is_ascii_alphabetic() {
        return Err(TagValidationError::InvalidStart(first_char));
    }
    if name.ends_with('-') {
        return Err(TagValidationError::EndsWithHyphen);
    }

    let mut prev_was_hyphen = false;
    for ch in name.chars() {
        if !is_valid_tag_char(ch) {
            return Err(TagValidationError::InvalidCharacter(ch));
        }

        if ch == '-' {
            if prev_was_hyphen {
                return Err(TagValidationError::ConsecutiveHyphens);
            }
            prev_was_hyphen = true;
        } else {
            prev_was_hyphen = false;
        }
    }

    Ok(())
}

/// Notebook names are stored as values, so only emptiness and control
/// characters are rejected.
pub fn validate_notebook_name(name: &str) -> Result<(), GatewayError> {
    if name.trim().is_empty() {
        return Err(GatewayError::InvalidArgument(
            "notebook name cannot be empty".to_string(),
        ));
    }
    if let Some(ch) = name.chars().find(|c| c.is_control()) {
        return Err(GatewayError::InvalidArgument(format!(
            "notebook name contains control character {:?}",
            ch
        )));
    }
    Ok(())
}

/// Validates `value` as a key, naming the offending argument in the error.
pub fn require_key(what: &str, value: &str) -> Result<(), GatewayError> {
    validate_key(value).map_err(|e| GatewayError::InvalidArgument(format!("{}: {}", what, e)))
}

/// Validates `value` as a tag name, wrapped as [`GatewayError::InvalidArgument`].
pub fn require_tag(value: &str) -> Result<(), GatewayError> {
    validate_tag_name(value)
        .map_err(|e| GatewayError::InvalidArgument(format!("tag '{}': {}", value, e)))
}

fn is_valid_tag_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValidationError {
    Empty,
    TooLong(usize),
    InvalidCharacter(char),
}

impl fmt::Display for KeyValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValidationError::Empty => write!(f, "key cannot be empty"),
            KeyValidationError::TooLong(len) => {
                write!(f, "key is {} bytes, limit is {}", len, MAX_KEY_BYTES)
            }
            KeyValidationError::InvalidCharacter(ch) => {
                write!(f, "key cannot contain {:?}", ch)
            }
        }
    }
}

impl std::error::Error for KeyValidationError {}

/// Error type for tag name validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagValidationError {
    /// Tag name is empty
    Empty,
    /// Tag name starts with an invalid character (must start with a letter)
    InvalidStart(char),
    /// Tag name ends with a hyphen
    EndsWithHyphen,
    /// Tag name contains two hyphens in a row
    ConsecutiveHyphens,
    /// Tag name contains a character outside `[A-Za-z0-9_-]`
    InvalidCharacter(char),
}

impl fmt::Display for TagValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValidationError::Empty => write!(f, "tag name cannot be empty"),
            TagValidationError::InvalidStart(ch) => {
                write!(f, "tag name must start with a letter, got '{}'", ch)
            }
            TagValidationError::EndsWithHyphen => write!(f, "tag name cannot end with a hyphen"),
            TagValidationError::ConsecutiveHyphens => {
                write!(f, "tag name cannot contain consecutive hyphens")
            }
            TagValidationError::InvalidCharacter(ch) => {
                write!(f, "tag name contains invalid character '{}'", ch)
            }
        }
    }
}

impl std::error::Error for TagValidationError {}
