//! The `set` command: applies a configuration document to a project.
//!
//! The document is decrypted with sops when it carries sops metadata, parsed,
//! and applied section by section. A relative avatar path is taken relative
//! to the directory of the document.

use std::path::{Path, PathBuf};

use clap::Args;
use colored::Colorize;
use gitlab_client::{DocumentationFetcher, GitLabApi};
use project_sync_core::{
    ApplyReport, ConfigurationDocument, Decryption, DocumentCodec, SecretDecryptor, Section,
    SopsDecryptor, SyncError, SyncManager, SyncOptions,
};
use tracing::{debug, instrument};

use crate::commands::{connect, parse_section};
use crate::config::Settings;
use crate::errors::Error;

#[cfg(test)]
#[path = "set_cmd_tests.rs"]
mod tests;

#[derive(Args, Debug)]
pub struct SetArgs {
    /// Configuration document to apply
    #[arg(long, short)]
    pub file: PathBuf,

    /// Plan and report the changes without sending them
    #[arg(long)]
    pub dry_run: bool,

    /// Section to apply; may be repeated. Every managed section is applied when omitted
    #[arg(long = "section", short, value_parser = parse_section)]
    pub sections: Vec<Section>,
}

/// Runs the `set` command and prints a summary of the changes.
pub async fn execute(args: &SetArgs, settings: &Settings) -> Result<(), Error> {
    let client = connect(settings)?;
    let report = apply_file(&client, &client, &SopsDecryptor::default(), settings, args).await?;

    let heading = if report.dry_run {
        "Dry run, no changes were sent:".yellow().bold()
    } else {
        "Applied:".green().bold()
    };
    println!("{heading}");
    println!("{}", format_report(&report));
    Ok(())
}

/// Reads, decrypts and applies the document named by `args`.
#[instrument(skip_all, fields(project = %settings.project, file = %args.file.display(), dry_run = args.dry_run))]
pub async fn apply_file(
    api: &dyn GitLabApi,
    docs: &dyn DocumentationFetcher,
    decryptor: &dyn SecretDecryptor,
    settings: &Settings,
    args: &SetArgs,
) -> Result<ApplyReport, Error> {
    let codec = DocumentCodec::new(settings.comment_width);
    let document = load_document(&args.file, decryptor, &codec).await?;

    let mut manager = SyncManager::new(api, docs, settings.docs.clone(), &settings.project);
    let options = SyncOptions {
        sections: args.sections.clone(),
        dry_run: args.dry_run,
    };
    Ok(manager.apply_document(&document, &options).await?)
}

/// Reads a configuration document, decrypting it first when it holds managed secrets.
pub async fn load_document(
    path: &Path,
    decryptor: &dyn SecretDecryptor,
    codec: &DocumentCodec,
) -> Result<ConfigurationDocument, Error> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let text = match decryptor.decrypt(&text).await.map_err(SyncError::from)? {
        Decryption::Decrypted(plain) => plain,
        Decryption::NoManagedSecrets => {
            debug!("Document holds no managed secrets");
            text
        }
    };

    let mut document = codec.parse(&text).map_err(SyncError::from)?;
    resolve_avatar(&mut document, path);
    Ok(document)
}

/// Makes a relative avatar path relative to the directory of the document.
pub fn resolve_avatar(document: &mut ConfigurationDocument, document_path: &Path) {
    let Some(avatar) = document.avatar.as_mut() else {
        return;
    };
    if Path::new(avatar.as_str()).is_absolute() {
        return;
    }
    if let Some(dir) = document_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        *avatar = dir.join(avatar.as_str()).to_string_lossy().into_owned();
    }
}

/// One line per applied section followed by the totals.
pub fn format_report(report: &ApplyReport) -> String {
    if report.sections.is_empty() {
        return "No sections are managed by the document".to_string();
    }

    let mut lines: Vec<String> = report
        .sections
        .iter()
        .map(|s| {
            format!(
                "{}: {} created, {} updated, {} deleted, {} unchanged",
                s.section, s.created, s.updated, s.deleted, s.unchanged
            )
        })
        .collect();
    lines.push(format!(
        "total: {} created, {} updated, {} deleted",
        report.created(),
        report.updated(),
        report.deleted()
    ));
    lines.join("\n")
}
