//! Navigation targets (path + query + router state).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const ORIGIN: &str = "http://app.invalid/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("navigation target must be an absolute path: {0}")]
    NotAbsolute(String),

    #[error("invalid navigation target: {0}")]
    Invalid(String),
}

/// A navigation target inside the application.
///
/// `from` mirrors router history state: the location a visitor was bounced
/// away from, kept so sign-in can send them back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    path: String,
    query: Vec<(String, String)>,
    from: Option<String>,
}

impl Location {
    /// Parse an in-app target such as `/reset-password?type=recovery&ts=1`.
    pub fn parse(target: &str) -> Result<Self, LocationError> {
        if !target.starts_with('/') || target.starts_with("//") {
            return Err(LocationError::NotAbsolute(target.to_string()));
        }

        let base = Url::parse(ORIGIN).map_err(|e| LocationError::Invalid(e.to_string()))?;
        let url = base
            .join(target)
            .map_err(|e| LocationError::Invalid(format!("{target}: {e}")))?;

        Ok(Self {
            path: normalize_path(url.path()),
            query: url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect(),
            from: None,
        })
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn from(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// First value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Path plus query string, suitable for a later `parse`.
    pub fn href(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.query.iter())
            .finish();
        format!("{}?{}", self.path, query)
    }
}

impl core::fmt::Display for Location {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.href())
    }
}

/// Strip trailing slashes so `/dashboard/` and `/dashboard` match the same route.
pub(crate) fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}
