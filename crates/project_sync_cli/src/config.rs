//! Configuration for the `project-sync` command line tool.
//!
//! Settings come from three layers. Command line flags (and their
//! environment variables) take precedence over the TOML configuration file,
//! which takes precedence over built-in defaults.
//!
//! ```toml
//! [gitlab]
//! url = "https://gitlab.example.com"
//!
//! [docs]
//! base_url = "https://gitlab.com/gitlab-org/gitlab"
//! ref = "v17.4.0-ee"
//!
//! [output]
//! comment_width = 100
//!
//! [client]
//! page_size = 50
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use gitlab_client::DEFAULT_PAGE_SIZE;
use project_sync_core::{codec::DEFAULT_COMMENT_WIDTH, DocsLocation};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::Error;

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILENAME: &str = "project-sync.toml";

/// GitLab instance used when neither flag nor config file names one.
pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";

/// Largest page size GitLab accepts.
pub const MAX_PAGE_SIZE: u32 = 100;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Contents of the configuration file. Every value is optional.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gitlab: GitLabConfig,

    #[serde(default)]
    pub docs: DocsConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// URL of the GitLab instance.
    pub url: Option<String>,
}

/// Where the API reference documentation is read from.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocsConfig {
    /// Base URL of the GitLab source repository.
    pub base_url: Option<String>,

    /// Branch, tag or commit of the documentation. Pinning this to the
    /// version of the GitLab instance keeps field lists in step with it.
    #[serde(rename = "ref")]
    pub reference: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Width section descriptions are wrapped to.
    pub comment_width: Option<usize>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Items requested per page when listing resources.
    pub page_size: Option<u32>,
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file does not exist, cannot be read or
    /// is not valid TOML of the expected shape.
    pub fn load(path: &Path) -> Result<Self, Error> {
        debug!("Loading configuration from {:?}", path);

        if !path.exists() {
            return Err(Error::Config(format!(
                "Configuration file not found: {:?}",
                path
            )));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read configuration file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse configuration file: {}", e)))
    }

    /// Loads the configuration for a run.
    ///
    /// An explicitly named file must exist. When no file is named, the
    /// default file in the current directory is used if present and
    /// built-in defaults otherwise.
    pub fn load_for_run(config_path: Option<&Path>) -> Result<Self, Error> {
        match config_path {
            Some(path) => Self::load(path),
            None => {
                let path = default_config_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    debug!("No configuration file, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Path of the configuration file in the current directory.
pub fn default_config_path() -> PathBuf {
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    current_dir.join(DEFAULT_CONFIG_FILENAME)
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub url: Option<String>,
    pub token: Option<SecretString>,
    pub project: Option<String>,
}

/// Fully resolved settings of a run.
#[derive(Debug)]
pub struct Settings {
    pub url: String,
    pub token: SecretString,
    pub project: String,
    pub docs: DocsLocation,
    pub comment_width: usize,
    pub page_size: u32,
}

impl Settings {
    /// Merges command line values over the configuration file and defaults.
    ///
    /// # Errors
    ///
    /// * `Error::InvalidArguments` when no token or project is given.
    /// * `Error::Config` when the page size or comment width is out of range.
    pub fn resolve(config: &AppConfig, overrides: Overrides) -> Result<Self, Error> {
        let token = overrides.token.ok_or_else(|| {
            Error::InvalidArguments(
                "a GitLab access token is required (--token or GITLAB_TOKEN)".to_string(),
            )
        })?;
        let project = overrides
            .project
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| {
                Error::InvalidArguments(
                    "a project ID or path is required (--project or GITLAB_PROJECT)".to_string(),
                )
            })?;

        let url = overrides
            .url
            .or_else(|| config.gitlab.url.clone())
            .unwrap_or_else(|| DEFAULT_GITLAB_URL.to_string());

        let defaults = DocsLocation::default();
        let docs = DocsLocation {
            base_url: config.docs.base_url.clone().unwrap_or(defaults.base_url),
            reference: config.docs.reference.clone().unwrap_or(defaults.reference),
        };

        let page_size = config.client.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {page_size}"
            )));
        }

        let comment_width = config.output.comment_width.unwrap_or(DEFAULT_COMMENT_WIDTH);
        if comment_width == 0 {
            return Err(Error::Config(
                "comment_width must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            url,
            token,
            project,
            docs,
            comment_width,
            page_size,
        })
    }
}
