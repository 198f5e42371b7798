//! The `get` command: reads the configuration of a project into a document.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use gitlab_client::{DocumentationFetcher, GitLabApi};
use project_sync_core::{DocumentCodec, Section, SyncError, SyncManager, SyncOptions};
use tracing::{info, instrument, warn};

use crate::commands::{connect, parse_section};
use crate::config::Settings;
use crate::errors::Error;

#[cfg(test)]
#[path = "get_cmd_tests.rs"]
mod tests;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// File to write the document to instead of standard output
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Section to read; may be repeated. Every section is read when omitted
    #[arg(long = "section", short, value_parser = parse_section)]
    pub sections: Vec<Section>,
}

/// Runs the `get` command.
pub async fn execute(args: &GetArgs, settings: &Settings) -> Result<(), Error> {
    let client = connect(settings)?;
    let text = fetch_document_text(&client, &client, settings, &args.sections).await?;
    write_output(&text, args.output.as_deref())
}

/// Reads the project into a rendered YAML document.
///
/// Logs a warning when the document holds variable values, since the
/// output then needs to be encrypted before it is committed anywhere.
#[instrument(skip_all, fields(project = %settings.project))]
pub async fn fetch_document_text(
    api: &dyn GitLabApi,
    docs: &dyn DocumentationFetcher,
    settings: &Settings,
    sections: &[Section],
) -> Result<String, Error> {
    let mut manager = SyncManager::new(api, docs, settings.docs.clone(), &settings.project);
    let options = SyncOptions {
        sections: sections.to_vec(),
        dry_run: false,
    };

    let fetched = manager.fetch_document(&options).await?;
    if fetched.has_sensitive_value() {
        let sections: Vec<&str> = fetched.sensitive_sections.iter().map(|s| s.key()).collect();
        warn!(
            sections = %sections.join(", "),
            "The document contains secret values; encrypt it with sops before storing it"
        );
    }

    let codec = DocumentCodec::new(settings.comment_width);
    let text = codec
        .render(&fetched.document, &fetched.descriptions)
        .map_err(SyncError::from)?;
    Ok(text)
}

/// Writes the document to `output`, or to standard output when no file is given.
pub fn write_output(text: &str, output: Option<&Path>) -> Result<(), Error> {
    match output {
        Some(path) => {
            fs::write(path, text).map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;
            info!(path = %path.display(), "Wrote configuration document");
            Ok(())
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(text.as_bytes())
                .and_then(|_| stdout.flush())
                .map_err(|source| Error::Io {
                    path: PathBuf::from("<stdout>"),
                    source,
                })
        }
    }
}
