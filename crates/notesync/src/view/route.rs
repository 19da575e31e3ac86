use crate::model::UserId;
use crate::validation::validate_key;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Profile(UserId),
    Notes,
    NotFound(String),
}

impl Route {
    /// Parse a location such as `/`, `/user/u1` or `/notes`. Query strings
    /// and fragments are ignored, as is a trailing slash.
    pub fn parse(location: &str) -> Self {
        let path = location
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .trim_end_matches('/');
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            [] => Route::Home,
            ["notes"] => Route::Notes,
            ["user", id] if validate_key(id).is_ok() => Route::Profile(id.to_string()),
            _ => Route::NotFound(location.to_string()),
        }
    }

    pub fn requires_session(&self) -> bool {
        matches!(self, Route::Notes)
    }

    pub fn location(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Profile(id) => format!("/user/{}", id),
            Route::Notes => "/notes".to_string(),
            Route::NotFound(location) => location.clone(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_routes() {
        assert_eq!(Route::parse(""), Route::Home);
        assert_eq!(Route::parse("/"), Route::Home);
        assert_eq!(Route::parse("/notes"), Route::Notes);
        assert_eq!(Route::parse("/notes/"), Route::Notes);
        assert_eq!(Route::parse("/user/u1"), Route::Profile("u1".into()));
        assert_eq!(Route::parse("/user/u1?tab=notes#top"), Route::Profile("u1".into()));
    }

    #[test]
    fn test_parse_unknown_routes() {
        assert_eq!(Route::parse("/user"), Route::NotFound("/user".into()));
        assert_eq!(Route::parse("/user/a/b"), Route::NotFound("/user/a/b".into()));
        assert_eq!(Route::parse("/settings"), Route::NotFound("/settings".into()));
        assert_eq!(Route::parse("/user/a.b"), Route::NotFound("/user/a.b".into()));
    }

    #[test]
    fn test_location_roundtrip() {
        for location in ["/", "/notes", "/user/u1"] {
            assert_eq!(Route::parse(location).to_string(), location);
        }
        assert!(Route::Notes.requires_session());
        assert!(!Route::Profile("u1".into()).requires_session());
    }
}
