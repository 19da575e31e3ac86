//! Store paths and the backing-store schema.
//!
//! ```text
//! /users/{uid}                         user record
//! /users/{uid}/notes/{nid}             note
//! /users/{uid}/tags/{tag}/{nid}        nid        (reverse index)
//! /users/{uid}/notebooks/{nid}         notebook   (reverse index)
//! ```

use crate::error::{GatewayError, Result};
use crate::validation::validate_key;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Slash-separated location in the store tree. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses `/a/b/c` (leading and trailing slashes optional), validating
    /// every segment as a key.
    pub fn parse(path: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            validate_key(segment).map_err(|e| {
                GatewayError::InvalidArgument(format!("path '{}': {}", path, e))
            })?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Appends a segment. Callers validate user-supplied segments first.
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        let mut segments = self.segments.clone();
        segments.pop();
        Some(Self { segments })
    }

    /// Last segment, `None` for the root.
    pub fn key(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when `self` equals `other` or lies above it.
    pub fn contains(&self, other: &StorePath) -> bool {
        other.segments.len() >= self.segments.len()
            && self.segments.iter().zip(&other.segments).all(|(a, b)| a == b)
    }

    /// True when one path contains the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for StorePath {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for StorePath {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<StorePath> for String {
    fn from(path: StorePath) -> Self {
        path.to_string()
    }
}

/// Path builders for the user-data schema. Ids are expected to be validated.
pub mod schema {
    use super::StorePath;

    pub const USERS: &str = "users";
    pub const NOTES: &str = "notes";
    pub const TAGS: &str = "tags";
    pub const NOTEBOOKS: &str = "notebooks";
    pub const STATUS: &str = "status";

    pub fn user(user_id: &str) -> StorePath {
        StorePath::root().child(USERS).child(user_id)
    }

    pub fn status(user_id: &str) -> StorePath {
        user(user_id).child(STATUS)
    }

    pub fn notes(user_id: &str) -> StorePath {
        user(user_id).child(NOTES)
    }

    pub fn note(user_id: &str, note_id: &str) -> StorePath {
        notes(user_id).child(note_id)
    }

    pub fn note_tag(user_id: &str, note_id: &str, tag: &str) -> StorePath {
        note(user_id, note_id).child(TAGS).child(tag)
    }

    pub fn tags(user_id: &str) -> StorePath {
        user(user_id).child(TAGS)
    }

    pub fn tag_entry(user_id: &str, tag: &str, note_id: &str) -> StorePath {
        tags(user_id).child(tag).child(note_id)
    }

    pub fn notebooks(user_id: &str) -> StorePath {
        user(user_id).child(NOTEBOOKS)
    }

    pub fn notebook_entry(user_id: &str, note_id: &str) -> StorePath {
        notebooks(user_id).child(note_id)
    }
}
