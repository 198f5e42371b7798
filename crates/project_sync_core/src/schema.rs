//! Field schemas derived from GitLab's REST API reference documentation.
//!
//! GitLab documents the attributes each endpoint accepts in Markdown tables
//! below headings such as `## Create a new label`. Instead of hardcoding the
//! editable fields of every section, the schema is rebuilt from those tables
//! on every run so that newly added attributes are picked up automatically.

use std::collections::HashMap;
use std::sync::LazyLock;

use gitlab_client::DocumentationFetcher;
use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, info, instrument};

use crate::errors::{RemoteOperationError, SchemaError, SyncResult};
use crate::section::Section;
use crate::table::{extract_table, Table, TableLookup};

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;

/// Repository holding the reference documentation.
pub const DEFAULT_DOCS_BASE_URL: &str = "https://gitlab.com/gitlab-org/gitlab";

/// Git ref the reference documentation is read from.
pub const DEFAULT_DOCS_REF: &str = "master";

const EXPECTED_COLUMNS: [&str; 4] = ["attribute", "type", "required", "description"];

static DEPRECATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(^|\(|\*)\s*deprecated\b").unwrap());

/// Product tier markers such as `(PREMIUM)` or `(ULTIMATE ALL)` after an attribute name.
static TIER_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*\(?\b(free|premium|ultimate)\b[^)]*\)?\s*$").unwrap()
});

/// Editable fields of a section, in documentation order, with their descriptions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaMap {
    fields: IndexMap<String, String>,
}

impl SchemaMap {
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn description(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Field names in documentation order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Inserts or replaces a field.
    pub fn insert(&mut self, field: impl Into<String>, description: impl Into<String>) {
        self.fields.insert(field.into(), description.into());
    }

    /// Text listing every field with its description, one field per line.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|(field, description)| {
                if description.is_empty() {
                    field.clone()
                } else {
                    format!("{field}: {description}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SchemaMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut schema = SchemaMap::default();
        for (field, description) in iter {
            schema.insert(field, description);
        }
        schema
    }
}

/// Where the schema of a section is documented and how its tables are adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaSource {
    /// File below `doc/api/` in the GitLab repository.
    pub file: &'static str,
    /// Candidate headings of the create table; the first one present is used.
    pub create: &'static [&'static str],
    /// Candidate headings of the edit table; the first one present is used.
    pub edit: &'static [&'static str],
    /// Name of the identity attribute in the edit table, stored as `id`.
    pub identity_rename: Option<&'static str>,
    /// Fields that are superseded by another field and never managed.
    pub dropped: &'static [&'static str],
    /// Fields managed through separate endpoints, absent from both tables.
    pub extra: &'static [(&'static str, &'static str)],
}

impl SchemaSource {
    /// Documentation source of a section, `None` for sections without a schema.
    pub fn of(section: Section) -> Option<SchemaSource> {
        let source = match section {
            Section::Project => SchemaSource {
                file: "projects.md",
                create: &[],
                edit: &["Edit a project", "Edit project"],
                identity_rename: None,
                dropped: &["avatar"],
                extra: &[],
            },
            Section::SharedWithGroups => SchemaSource {
                file: "projects.md",
                create: &["Share a project with a group", "Share project with group"],
                edit: &[],
                identity_rename: None,
                dropped: &[],
                extra: &[],
            },
            Section::Labels => SchemaSource {
                file: "labels.md",
                create: &["Create a new label", "Create a label"],
                edit: &["Edit an existing label", "Update a label"],
                identity_rename: Some("label_id"),
                dropped: &["new_name"],
                extra: &[],
            },
            Section::ProtectedBranches => SchemaSource {
                file: "protected_branches.md",
                create: &["Protect repository branches", "Protect a repository branch"],
                edit: &["Update a protected branch"],
                identity_rename: None,
                dropped: &[
                    "push_access_level",
                    "merge_access_level",
                    "unprotect_access_level",
                ],
                extra: &[],
            },
            Section::ProtectedTags => SchemaSource {
                file: "protected_tags.md",
                create: &["Protect repository tags", "Protect a repository tag"],
                edit: &[],
                identity_rename: None,
                dropped: &["create_access_level"],
                extra: &[],
            },
            Section::Variables => SchemaSource {
                file: "project_level_variables.md",
                create: &["Create a variable"],
                edit: &["Update a variable"],
                identity_rename: None,
                dropped: &["filter"],
                extra: &[],
            },
            Section::Approvals => SchemaSource {
                file: "merge_request_approvals.md",
                create: &[],
                edit: &["Change configuration", "Change project approval configuration"],
                identity_rename: None,
                dropped: &[],
                extra: &[],
            },
            Section::ApprovalRules => SchemaSource {
                file: "merge_request_approvals.md",
                create: &["Create project-level rule", "Create a project-level rule"],
                edit: &["Update project-level rule", "Update a project-level rule"],
                identity_rename: Some("approval_rule_id"),
                dropped: &[],
                extra: &[],
            },
            Section::PushRules => SchemaSource {
                file: "project_push_rules.md",
                create: &["Add a project push rule", "Add push rule to project"],
                edit: &["Edit project push rule", "Edit a project push rule"],
                identity_rename: None,
                dropped: &[],
                extra: &[],
            },
            Section::PipelineSchedules => SchemaSource {
                file: "pipeline_schedules.md",
                create: &["Create a new pipeline schedule", "Create a pipeline schedule"],
                edit: &["Edit a pipeline schedule"],
                identity_rename: Some("pipeline_schedule_id"),
                dropped: &[],
                extra: &[(
                    "variables",
                    "Variables passed to pipelines started by this schedule. Each entry has a key, a value and a variable_type.",
                )],
            },
            Section::Avatar | Section::ForkedFromProject => return None,
        };
        Some(source)
    }
}

/// Location of the reference documentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocsLocation {
    /// Base URL of the GitLab source repository.
    pub base_url: String,
    /// Branch, tag or commit to read the documentation at.
    pub reference: String,
}

impl Default for DocsLocation {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_DOCS_BASE_URL.to_string(),
            reference: DEFAULT_DOCS_REF.to_string(),
        }
    }
}

impl DocsLocation {
    /// Raw URL of an API documentation file.
    ///
    /// # Example
    ///
    /// ```rust
    /// use project_sync_core::DocsLocation;
    ///
    /// let location = DocsLocation::default();
    /// assert_eq!(
    ///     location.url_for("labels.md"),
    ///     "https://gitlab.com/gitlab-org/gitlab/-/raw/master/doc/api/labels.md"
    /// );
    /// ```
    pub fn url_for(&self, file: &str) -> String {
        format!(
            "{}/-/raw/{}/doc/api/{}",
            self.base_url.trim_end_matches('/'),
            self.reference,
            file
        )
    }
}

/// Builds section schemas from fetched reference documentation.
///
/// Each documentation file is fetched at most once per provider. A provider
/// is meant to live for one get or set run; schemas are not kept across runs.
pub struct SchemaProvider<'a> {
    fetcher: &'a dyn DocumentationFetcher,
    location: DocsLocation,
    documents: HashMap<&'static str, String>,
}

impl<'a> SchemaProvider<'a> {
    pub fn new(fetcher: &'a dyn DocumentationFetcher, location: DocsLocation) -> Self {
        Self {
            fetcher,
            location,
            documents: HashMap::new(),
        }
    }

    /// Returns the schema of a section.
    ///
    /// # Errors
    ///
    /// * `SyncError::Schema` when the section has no documentation or the
    ///   documentation does not have the expected shape.
    /// * `SyncError::Remote` when the documentation cannot be fetched.
    #[instrument(skip(self), fields(section = %section))]
    pub async fn schema(&mut self, section: Section) -> SyncResult<SchemaMap> {
        let source = SchemaSource::of(section).ok_or(SchemaError::NoSchema { section })?;

        if !self.documents.contains_key(source.file) {
            let url = self.location.url_for(source.file);
            let text = self.fetcher.fetch(&url).await.map_err(|e| {
                RemoteOperationError::new(
                    format!("failed to fetch reference documentation from {url}"),
                    e,
                )
            })?;
            self.documents.insert(source.file, text);
        }

        let document = self
            .documents
            .get(source.file)
            .map(String::as_str)
            .unwrap_or_default();
        let schema = build_schema(section, &source, document)?;

        info!(section = %section, fields = schema.len(), "Loaded field schema");
        Ok(schema)
    }
}

/// Builds the schema of a section from its documentation text.
///
/// The create table is read first and the edit table merged on top of it, so
/// the edit table's description wins for fields present in both.
///
/// # Errors
///
/// Returns a [`SchemaError`] when none of the candidate headings exist, the
/// heading has no table, the table has unexpected columns or a row of the
/// wrong width, or a table lists a field twice.
pub fn build_schema(
    section: Section,
    source: &SchemaSource,
    document: &str,
) -> Result<SchemaMap, SchemaError> {
    let mut schema = SchemaMap::default();

    for headings in [source.create, source.edit] {
        if headings.is_empty() {
            continue;
        }
        for (field, description) in read_table(section, source, headings, document)? {
            schema.insert(field, description);
        }
    }

    for (field, description) in source.extra {
        if !schema.contains(field) {
            schema.insert(*field, *description);
        }
    }

    Ok(schema)
}

/// Reads the rows of the first table found under one of `headings`.
fn read_table(
    section: Section,
    source: &SchemaSource,
    headings: &[&str],
    document: &str,
) -> Result<IndexMap<String, String>, SchemaError> {
    let mut table_missing = None;
    let mut found = None;
    for heading in headings {
        match extract_table(document, heading) {
            TableLookup::Found(table) => {
                found = Some((*heading, table));
                break;
            }
            TableLookup::TableNotFound => {
                table_missing.get_or_insert(*heading);
            }
            TableLookup::HeadingNotFound => {}
        }
    }

    let Some((heading, table)) = found else {
        return Err(match table_missing {
            Some(heading) => SchemaError::TableNotFound {
                section,
                heading: heading.to_string(),
            },
            None => SchemaError::HeadingNotFound {
                section,
                heading: headings.join("' or '"),
            },
        });
    };

    table_fields(section, source, heading, &table)
}

/// Reads the editable fields out of an attribute table.
fn table_fields(
    section: Section,
    source: &SchemaSource,
    heading: &str,
    table: &Table,
) -> Result<IndexMap<String, String>, SchemaError> {
    let columns: Vec<String> = table.header.iter().map(|c| c.to_lowercase()).collect();
    if columns != EXPECTED_COLUMNS {
        return Err(SchemaError::UnexpectedColumns {
            section,
            heading: heading.to_string(),
            found: table.header.clone(),
        });
    }

    let mut fields = IndexMap::new();
    for (index, row) in table.rows.iter().enumerate() {
        let [attribute, _kind, _required, description] = row.as_slice() else {
            return Err(SchemaError::MalformedRow {
                section,
                heading: heading.to_string(),
                row: index,
                cells: row.len(),
            });
        };
        let Some(field) = editable_field(source, attribute, description) else {
            debug!(section = %section, attribute = attribute.as_str(), "Skipping attribute");
            continue;
        };
        if fields.insert(field.clone(), description.clone()).is_some() {
            return Err(SchemaError::DuplicateField {
                section,
                heading: heading.to_string(),
                field,
            });
        }
    }

    Ok(fields)
}

/// Maps a documented attribute to the field it is stored as, or `None` when
/// the attribute is not an editable field of the section.
fn editable_field(source: &SchemaSource, attribute: &str, description: &str) -> Option<String> {
    if is_deprecated(attribute) || is_deprecated(description) {
        return None;
    }

    let name = TIER_SUFFIX.replace(attribute.trim(), "");
    let name = name.trim();
    let name = name.strip_suffix("[]").unwrap_or(name);

    if name.is_empty() || name.contains(['[', '.', ' ']) {
        return None;
    }
    // The project the request is made against, not a field of the resource.
    if name == "id" && description.to_lowercase().contains("url-encoded path") {
        return None;
    }
    if source.dropped.contains(&name) {
        return None;
    }

    match source.identity_rename {
        Some(identity) if identity == name => Some("id".to_string()),
        _ => Some(name.to_string()),
    }
}

fn is_deprecated(text: &str) -> bool {
    DEPRECATED.is_match(text)
}
