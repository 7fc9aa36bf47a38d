//! Error types for findash_rs
//!
//! This module defines domain-specific error types that provide clear,
//! actionable error messages to users.

use thiserror::Error;

/// Category a failed fetch is sorted into. The UI keys its messaging off
/// these, so the mapping from status codes is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    RateLimited,
    Forbidden,
    Unauthorized,
    ServerError,
    Timeout,
    Generic,
}

impl FetchErrorKind {
    pub fn from_status(status: u16) -> FetchErrorKind {
        match status {
            429 => FetchErrorKind::RateLimited,
            403 => FetchErrorKind::Forbidden,
            401 => FetchErrorKind::Unauthorized,
            408 => FetchErrorKind::Timeout,
            s if s >= 500 => FetchErrorKind::ServerError,
            _ => FetchErrorKind::Generic,
        }
    }
}

/// Failure to retrieve JSON from a widget's API.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Only HTTPS URLs are allowed (or localhost for development)")]
    InsecureScheme,

    #[error("Request timeout - API took too long to respond")]
    Timeout,

    #[error("{}", status_message(.status))]
    Status { status: u16 },

    #[error("{0}")]
    Network(String),

    #[error("Invalid JSON response: {0}")]
    Decode(String),
}

fn status_message(status: &u16) -> String {
    match FetchErrorKind::from_status(*status) {
        FetchErrorKind::RateLimited => {
            "API rate limit exceeded. Please try again later or reduce refresh interval.".to_string()
        }
        FetchErrorKind::Forbidden => {
            "API access forbidden. Please check your API key or permissions.".to_string()
        }
        FetchErrorKind::Unauthorized => "API authentication failed. Please check your API key.".to_string(),
        FetchErrorKind::ServerError => "API server error. Please try again later.".to_string(),
        FetchErrorKind::Timeout => "Request timeout - API took too long to respond".to_string(),
        FetchErrorKind::Generic => format!("API request failed: {status}"),
    }
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            FetchError::Status { status } => FetchErrorKind::from_status(*status),
            FetchError::Timeout => FetchErrorKind::Timeout,
            _ => FetchErrorKind::Generic,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
            }
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// Failures of the persisted dashboard state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Corrupt dashboard state: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Widget not found: {0}")]
    WidgetNotFound(String),
}

/// Failures loading a holdings file.
#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("Failed to read portfolio file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid portfolio JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid holding '{name}': {reason}")]
    InvalidHolding { name: String, reason: String },
}

/// Validation errors for widget configuration.
///
/// These errors are shown directly to users and should be clear and actionable.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Widget name is required")]
    NameRequired,

    #[error("API URL is required")]
    UrlRequired,

    #[error("Please select at least one field to display")]
    NoFieldsSelected,

    #[error("Field path cannot be empty")]
    EmptyFieldPath,

    #[error("Field label cannot be empty for path '{0}'")]
    EmptyFieldLabel(String),

    #[error("{0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(FetchErrorKind::from_status(429), FetchErrorKind::RateLimited);
        assert_eq!(FetchErrorKind::from_status(403), FetchErrorKind::Forbidden);
        assert_eq!(FetchErrorKind::from_status(401), FetchErrorKind::Unauthorized);
        assert_eq!(FetchErrorKind::from_status(500), FetchErrorKind::ServerError);
        assert_eq!(FetchErrorKind::from_status(503), FetchErrorKind::ServerError);
        assert_eq!(FetchErrorKind::from_status(404), FetchErrorKind::Generic);
    }

    #[test]
    fn test_status_messages() {
        let err = FetchError::Status { status: 429 };
        assert!(err.to_string().contains("rate limit"));
        assert_eq!(err.kind(), FetchErrorKind::RateLimited);

        let err = FetchError::Status { status: 401 };
        assert_eq!(err.to_string(), "API authentication failed. Please check your API key.");

        let err = FetchError::Status { status: 404 };
        assert_eq!(err.to_string(), "API request failed: 404");

        let err = FetchError::Status { status: 408 };
        assert_eq!(err.kind(), FetchErrorKind::Timeout);
        assert_eq!(err.to_string(), FetchError::Timeout.to_string());
    }
}
