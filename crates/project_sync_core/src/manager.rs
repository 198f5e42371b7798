//! The get/set orchestrator.
//!
//! [`SyncManager`] sequences the schema provider, projector, reconciler and
//! sub-list differ per section and turns their decisions into GitLab API
//! calls. Sections are always processed one after another in the order of
//! [`Section::ALL`]; a failure stops the run and leaves the sections applied
//! so far in place.
//!
//! Reading lives in `fetch.rs` and writing in `apply.rs`; both extend the
//! manager defined here.

use std::collections::BTreeMap;

use gitlab_client::{DocumentationFetcher, GitLabApi};
use serde_json::Value;
use tracing::debug;

use crate::document::{ConfigurationDocument, SectionContent};
use crate::endpoints::ProjectRef;
use crate::errors::{RemoteOperationError, SyncResult};
use crate::schema::{DocsLocation, SchemaProvider};
use crate::section::Section;

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

/// Manages the configuration of one GitLab project.
///
/// A manager is meant to live for a single get or set run: schemas and the
/// project resource are cached for the lifetime of the manager only.
///
/// # Examples
///
/// ```rust,no_run
/// use gitlab_client::GitLabClient;
/// use project_sync_core::{DocsLocation, SyncManager, SyncOptions};
/// use secrecy::SecretString;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = GitLabClient::new(
///     "https://gitlab.example.com",
///     SecretString::from("glpat-example".to_string()),
///     100,
/// )?;
/// let mut manager = SyncManager::new(&client, &client, DocsLocation::default(), "group/app");
///
/// let fetched = manager.fetch_document(&SyncOptions::default()).await?;
/// println!("{} sections", fetched.document.managed_sections().len());
/// # Ok(())
/// # }
/// ```
pub struct SyncManager<'a> {
    pub(crate) api: &'a dyn GitLabApi,
    pub(crate) schemas: SchemaProvider<'a>,
    pub(crate) project: ProjectRef,
    project_cache: Option<Value>,
}

impl<'a> SyncManager<'a> {
    /// Creates a manager for `project` (numeric ID or full path).
    pub fn new(
        api: &'a dyn GitLabApi,
        docs: &'a dyn DocumentationFetcher,
        location: DocsLocation,
        project: &str,
    ) -> Self {
        Self {
            api,
            schemas: SchemaProvider::new(docs, location),
            project: ProjectRef::new(project),
            project_cache: None,
        }
    }

    /// The project this manager works on.
    pub fn project(&self) -> &ProjectRef {
        &self.project
    }

    /// The project resource as GitLab returns it, fetched once per manager.
    pub(crate) async fn project_resource(&mut self) -> SyncResult<Value> {
        if let Some(project) = &self.project_cache {
            return Ok(project.clone());
        }

        let path = self.project.path().to_string();
        debug!(path = path.as_str(), "Fetching project");
        let purpose = || format!("failed to fetch project {}", self.project.name());
        let project = self
            .api
            .get(&path)
            .await
            .map_err(|e| RemoteOperationError::new(purpose(), e))?
            .ok_or_else(|| {
                RemoteOperationError::new(
                    purpose(),
                    gitlab_client::Error::NotFound { path: path.clone() },
                )
            })?;

        self.project_cache = Some(project.clone());
        Ok(project)
    }

    /// Drops the cached project resource after it was changed.
    pub(crate) fn forget_project(&mut self) {
        self.project_cache = None;
    }
}

/// Which sections a run covers and whether mutations are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Sections to process. Empty means every section.
    pub sections: Vec<Section>,
    /// Plan and log every mutation without sending it.
    pub dry_run: bool,
}

impl SyncOptions {
    /// Whether the run covers `section`.
    pub fn includes(&self, section: Section) -> bool {
        self.sections.is_empty() || self.sections.contains(&section)
    }
}

/// One section as read from GitLab.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionSnapshot {
    pub content: SectionContent,
    /// Description of the editable fields, rendered as a comment block.
    pub description: String,
    pub has_sensitive_value: bool,
}

/// The configuration of a project as read from GitLab.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedDocument {
    pub document: ConfigurationDocument,
    /// Field descriptions per section.
    pub descriptions: BTreeMap<Section, String>,
    /// Sections holding values that should not be stored in plain text.
    pub sensitive_sections: Vec<Section>,
}

impl FetchedDocument {
    /// Returns true if any section holds a value that should be encrypted.
    pub fn has_sensitive_value(&self) -> bool {
        !self.sensitive_sections.is_empty()
    }
}

/// Result of applying one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionReport {
    pub section: Section,

    /// Number of items created
    pub created: usize,

    /// Number of items updated in place or recreated
    pub updated: usize,

    /// Number of items deleted
    pub deleted: usize,

    /// Number of items that already matched the document
    pub unchanged: usize,
}

impl SectionReport {
    /// Creates a new empty report.
    pub fn new(section: Section) -> Self {
        Self {
            section,
            created: 0,
            updated: 0,
            deleted: 0,
            unchanged: 0,
        }
    }

    /// Returns true if anything was (or, in a dry run, would be) changed.
    pub fn has_changes(&self) -> bool {
        self.created > 0 || self.updated > 0 || self.deleted > 0
    }
}

/// Result of applying a configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// Reports of the applied sections, in application order.
    pub sections: Vec<SectionReport>,
    /// Whether the run was a dry run that sent no mutation.
    pub dry_run: bool,
}

impl ApplyReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            sections: Vec::new(),
            dry_run,
        }
    }

    /// The report of one section, if it was applied.
    pub fn section(&self, section: Section) -> Option<&SectionReport> {
        self.sections.iter().find(|r| r.section == section)
    }

    pub fn created(&self) -> usize {
        self.sections.iter().map(|r| r.created).sum()
    }

    pub fn updated(&self) -> usize {
        self.sections.iter().map(|r| r.updated).sum()
    }

    pub fn deleted(&self) -> usize {
        self.sections.iter().map(|r| r.deleted).sum()
    }

    pub fn has_changes(&self) -> bool {
        self.sections.iter().any(SectionReport::has_changes)
    }
}
