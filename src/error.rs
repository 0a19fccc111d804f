use chrono::{DateTime, Local};
use thiserror::Error;

use crate::version::ParseVersionError;

/// Errors that can occur while checking for release updates.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Error making the HTTP request to the release registry.
    #[error("Failed to fetch releases: {0}")]
    Http(#[from] reqwest::Error),

    /// Error decoding the JSON release list.
    #[error("Failed to parse the release list: {0}")]
    Json(#[from] serde_json::Error),

    /// The registry returned a non-success status outside the 403 branch.
    #[error("Registry API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// HTTP 403 with an `X-RateLimit-Reset` header.
    #[error("Rate limit exceeded. Try again at {reset}.")]
    RateLimited { reset: DateTime<Local> },

    /// HTTP 403 without a usable rate-limit header.
    #[error("Access forbidden")]
    Forbidden,

    /// The configured local version string does not parse.
    #[error(transparent)]
    ParseVersion(#[from] ParseVersionError),

    /// No local version was configured.
    #[error("No local version configured")]
    MissingVersion,

    /// Invalid owner (organization) name.
    #[error("Invalid owner name: '{0}'")]
    InvalidOwner(String),

    /// Invalid repository name.
    #[error("Invalid repository name: '{0}'")]
    InvalidRepoName(String),

    /// Invalid base URL.
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Result type alias for update-checker operations.
pub type Result<T> = std::result::Result<T, UpdateError>;
