//! Command modules for the `project-sync` CLI.
//!
//! - `get_cmd`: reads the configuration of a project into a document
//! - `set_cmd`: applies a document to a project

use std::path::PathBuf;

use clap::Args;
use gitlab_client::GitLabClient;
use project_sync_core::Section;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{AppConfig, Overrides, Settings};
use crate::errors::Error;

pub mod get_cmd;
pub mod set_cmd;

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;

/// Connection options shared by every command.
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// URL of the GitLab instance [default: https://gitlab.com]
    #[arg(long, env = "GITLAB_URL", global = true)]
    pub url: Option<String>,

    /// Access token with the `api` scope
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Numeric ID or full path of the project, for example `group/app`
    #[arg(long, env = "GITLAB_PROJECT", global = true)]
    pub project: Option<String>,

    /// Configuration file [default: ./project-sync.toml when present]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl ConnectionArgs {
    /// Resolves the settings of a run from these arguments and the config file.
    pub fn settings(&self) -> Result<Settings, Error> {
        let config = AppConfig::load_for_run(self.config.as_deref())?;
        Settings::resolve(
            &config,
            Overrides {
                url: self.url.clone(),
                token: self.token.clone().map(SecretString::from),
                project: self.project.clone(),
            },
        )
    }
}

/// Parses a section name as it appears in the configuration document.
pub fn parse_section(name: &str) -> Result<Section, String> {
    Section::ALL
        .into_iter()
        .find(|section| section.key() == name)
        .ok_or_else(|| {
            let known: Vec<&str> = Section::ALL.iter().map(|s| s.key()).collect();
            format!("unknown section '{name}', expected one of: {}", known.join(", "))
        })
}

/// Creates the GitLab client for a run.
pub fn connect(settings: &Settings) -> Result<GitLabClient, Error> {
    GitLabClient::new(
        &settings.url,
        SecretString::from(settings.token.expose_secret().to_string()),
        settings.page_size,
    )
    .map_err(|e| Error::Config(format!("Invalid GitLab URL '{}': {}", settings.url, e)))
}
