//! Error types for GitLab client operations.
//!
//! This module defines the error types that can occur when talking to the GitLab
//! REST API or fetching reference documentation through the gitlab_client crate.

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors that can occur during GitLab client operations.
///
/// Every variant carries enough context to identify the request that failed.
/// Callers higher up the stack attach the purpose of the call (for example
/// "failed to delete protected tag") when they wrap these errors.
///
/// ## Examples
///
/// ```rust,ignore
/// use gitlab_client::Error;
///
/// match client.get("projects/42").await {
///     Ok(Some(project)) => println!("{project}"),
///     Ok(None) => eprintln!("Project does not exist"),
///     Err(Error::Forbidden { path }) => eprintln!("No access to {path}"),
///     Err(err) => eprintln!("Other error: {err}"),
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request could not be sent or the response could not be read.
    ///
    /// This covers connection failures, TLS errors and timeouts raised by the
    /// underlying HTTP stack.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with 403 Forbidden.
    ///
    /// GitLab uses this both for missing permissions and for features that are
    /// disabled on the project or not available in the current tier.
    #[error("Access to '{path}' is forbidden")]
    Forbidden { path: String },

    /// The server answered with 404 Not Found.
    #[error("Resource '{path}' was not found")]
    NotFound { path: String },

    /// The server answered with any other non-success status.
    ///
    /// `message` holds the `message` or `error` member of the JSON error body
    /// when GitLab provided one, otherwise the raw body.
    #[error("{method} '{path}' failed with status {status}: {message}")]
    Status {
        method: String,
        path: String,
        status: u16,
        message: String,
    },

    /// The response body could not be parsed as JSON.
    #[error("Failed to deserialize GitLab response: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// The API returned a response in an unexpected shape.
    ///
    /// For example a list endpoint that did not return a JSON array.
    #[error("Invalid response from '{path}': {reason}")]
    InvalidResponse { path: String, reason: String },

    /// A URL could not be built from the configured base URL and a path.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Result type alias for GitLab client operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` when the error represents a 403 response.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Error::Forbidden { .. })
    }

    /// Returns `true` when the error represents a 404 response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
