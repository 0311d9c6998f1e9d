use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("Invalid id {value:?}: ids must be a single document path segment (no '/', NUL, '.' or '..')")]
pub struct IdError {
    value: String,
}

/// Opaque identifier of a stored transaction.
///
/// Remote ids are document names inside the user's collection, so they must be
/// a single path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Id {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap an arbitrary string without validation.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Wrap a string coming from user input, rejecting values that would
    /// escape the collection path.
    pub fn from_string_checked(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if Self::is_segment_safe(&value) {
            Ok(Self(value))
        } else {
            Err(IdError { value })
        }
    }

    /// Take the trailing segment of a full document resource name
    /// (`projects/p/databases/(default)/documents/users/u/transactions/<id>`).
    pub fn from_document_name(name: &str) -> Option<Self> {
        name.rsplit('/')
            .next()
            .filter(|segment| Self::is_segment_safe(segment))
            .map(|segment| Self(segment.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_segment_safe(value: &str) -> bool {
        if value.is_empty() || value == "." || value == ".." {
            return false;
        }
        !value.chars().any(|c| c == '/' || c == '\0')
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
