use std::fmt;
use std::time::Duration;

use crate::models::Resource;

/// Custom error type for ClickUp export operations
#[derive(Debug)]
pub enum ClickUpError {
    /// Missing or rejected access token (401/403)
    Authentication(String),
    /// HTTP 429, carries the provider's retry hint if it sent one
    RateLimited { retry_after: Option<Duration> },
    /// Connection failures, timeouts and 5xx responses
    TransientNetwork(String),
    /// Retry bound exceeded, wraps the last transient cause
    ExhaustedRetries { attempts: u32, last: Box<ClickUpError> },
    /// HTTP 404
    NotFound(String),
    /// Any other non-success response
    Api { status: u16, body: String },
    /// Response body did not have the expected shape
    Decode(String),
    /// Schema conflict or database write failure
    Persistence(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(std::io::Error),
    /// Failure while processing one parent of one resource type
    Fetch {
        resource: Resource,
        parent: Option<String>,
        source: Box<ClickUpError>,
    },
}

impl ClickUpError {
    /// Whether another attempt of the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ClickUpError::RateLimited { .. } | ClickUpError::TransientNetwork(_)
        )
    }

    /// Provider supplied delay before the next attempt, if any.
    pub fn retry_hint(&self) -> Option<Duration> {
        match self {
            ClickUpError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Unwraps `Fetch` wrappers down to the underlying failure.
    pub fn root(&self) -> &ClickUpError {
        match self {
            ClickUpError::Fetch { source, .. } => source.root(),
            other => other,
        }
    }
}

impl fmt::Display for ClickUpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClickUpError::Authentication(msg) => write!(f, "Authentication error: {}", msg),
            ClickUpError::RateLimited { retry_after: Some(delay) } => {
                write!(f, "Rate limited by ClickUp API, retry after {:?}", delay)
            }
            ClickUpError::RateLimited { retry_after: None } => {
                write!(f, "Rate limited by ClickUp API")
            }
            ClickUpError::TransientNetwork(msg) => write!(f, "Network error: {}", msg),
            ClickUpError::ExhaustedRetries { attempts, last } => {
                write!(f, "Giving up after {} attempts: {}", attempts, last)
            }
            ClickUpError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ClickUpError::Api { status, body } => {
                write!(f, "ClickUp API error: HTTP {}: {}", status, body)
            }
            ClickUpError::Decode(msg) => write!(f, "Unexpected response: {}", msg),
            ClickUpError::Persistence(msg) => write!(f, "Database error: {}", msg),
            ClickUpError::Config(msg) => write!(f, "Configuration error: {}", msg),
            ClickUpError::Io(err) => write!(f, "I/O error: {}", err),
            ClickUpError::Fetch {
                resource,
                parent: Some(parent),
                source,
            } => write!(f, "Failed to fetch {} for {}: {}", resource, parent, source),
            ClickUpError::Fetch {
                resource,
                parent: None,
                source,
            } => write!(f, "Failed to fetch {}: {}", resource, source),
        }
    }
}

impl std::error::Error for ClickUpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClickUpError::Io(err) => Some(err),
            ClickUpError::ExhaustedRetries { last, .. } => Some(last.as_ref()),
            ClickUpError::Fetch { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClickUpError {
    fn from(err: std::io::Error) -> Self {
        ClickUpError::Io(err)
    }
}

impl From<serde_json::Error> for ClickUpError {
    fn from(err: serde_json::Error) -> Self {
        ClickUpError::Decode(err.to_string())
    }
}

impl From<serde_yaml::Error> for ClickUpError {
    fn from(err: serde_yaml::Error) -> Self {
        ClickUpError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for ClickUpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClickUpError::Decode(err.to_string())
        } else if err.is_builder() {
            ClickUpError::Config(err.to_string())
        } else {
            ClickUpError::TransientNetwork(err.to_string())
        }
    }
}

impl From<sqlx::Error> for ClickUpError {
    fn from(err: sqlx::Error) -> Self {
        ClickUpError::Persistence(err.to_string())
    }
}

impl From<url::ParseError> for ClickUpError {
    fn from(err: url::ParseError) -> Self {
        ClickUpError::Config(err.to_string())
    }
}

impl From<std::num::ParseIntError> for ClickUpError {
    fn from(err: std::num::ParseIntError) -> Self {
        ClickUpError::Config(err.to_string())
    }
}

impl From<chrono::ParseError> for ClickUpError {
    fn from(err: chrono::ParseError) -> Self {
        ClickUpError::Config(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for ClickUpError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        ClickUpError::Authentication(err.to_string())
    }
}

/// Result type alias for ClickUp export operations
pub type Result<T> = std::result::Result<T, ClickUpError>;
