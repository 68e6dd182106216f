//! Error types for the Huddle session sync client.

use thiserror::Error;

/// Errors returned by the REST collaborator.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The session cookie is missing or expired
    #[error("Not authenticated")]
    Unauthorized,

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    /// Transport-level failure (DNS, refused connection, timeout, ...)
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The response body did not have the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The configured session cookie cannot be sent as a header
    #[error("Invalid session cookie")]
    InvalidCookie,
}

/// Local input rejected before any network call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Comment content must not be empty")]
    EmptyContent,

    #[error("A star rating must be selected")]
    MissingStars,

    #[error("Star rating must be between 1 and 10, got {0}")]
    StarsOutOfRange(u8),

    #[error("Summary must not be empty")]
    EmptySummary,

    #[error("Session name must not be empty")]
    EmptySessionName,
}

/// Client-specific errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base address cannot be turned into a push-channel target
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The same action is still waiting for its previous call to settle
    #[error("A {0} submission is already in progress")]
    SubmissionInFlight(&'static str),

    /// The session view was torn down while the call was running
    #[error("Session view is no longer mounted")]
    Unmounted,
}

impl ClientError {
    /// Whether the failure means the user has to log in again.
    ///
    /// Authentication failures are never retried.
    pub fn requires_login(&self) -> bool {
        matches!(self, ClientError::Api(ApiError::Unauthorized))
    }
}
