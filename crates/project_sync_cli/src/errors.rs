use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

use project_sync_core::SyncError;
use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors reported by the `project-sync` command line tool.
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration file or a configured value is invalid.
    ///
    /// This covers a config file that cannot be read or parsed, an explicit
    /// `--config` path that does not exist, and out of range values such as
    /// a page size GitLab does not accept.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A get or set run failed.
    ///
    /// The wrapped error names the section or request that failed; the
    /// run stops at the first failure.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Reading the configuration document or writing the output failed.
    #[error("Failed to access '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A required argument was not supplied by flag, environment or config file.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Formats an error followed by each of its sources, one per line.
///
/// # Example
///
/// ```rust
/// use project_sync_cli::errors::{error_chain, Error};
///
/// let error = Error::Config("page_size must be between 1 and 100".to_string());
/// assert_eq!(
///     error_chain(&error),
///     "Configuration error: page_size must be between 1 and 100"
/// );
/// ```
pub fn error_chain(error: &dyn StdError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    message
}
