//! Tests for schema construction from reference documentation.

use super::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const LABELS_DOC: &str = r#"
# Group and project labels API

## Create a new label

| Attribute     | Type           | Required | Description |
|---------------|----------------|----------|-------------|
| `id`          | integer/string | Yes      | The ID or [URL-encoded path of the project](rest/_index.md#namespaced-paths). |
| `name`        | string         | Yes      | The name of the label. |
| `color`       | string         | Yes      | The color of the label. |
| `description` | string         | No       | The description of the label. |
| `priority`    | integer        | No       | The priority of the label. |

## Delete a label

| Attribute  | Type           | Required | Description |
|------------|----------------|----------|-------------|
| `id`       | integer/string | Yes      | The ID or [URL-encoded path of the project](rest/_index.md#namespaced-paths). |
| `label_id` | integer or string | Yes   | The ID or title of a group's label. |

## Edit an existing label

| Attribute     | Type           | Required | Description |
|---------------|----------------|----------|-------------|
| `id`          | integer/string | Yes      | The ID or [URL-encoded path of the project](rest/_index.md#namespaced-paths). |
| `label_id`    | integer or string | Yes   | The ID or title of a group's label. |
| `new_name`    | string         | No       | The new name of the label. |
| `color`       | string         | No       | The color of the label given in 6-digit hex notation. |
| `description` | string         | No       | The new description of the label. |
| `priority`    | integer        | No       | The new priority of the label. |
| `name`        | string         | No       | (Deprecated in GitLab 17.0) Use `label_id` instead. |
"#;

fn labels_source() -> SchemaSource {
    SchemaSource::of(Section::Labels).unwrap()
}

// ============================================================================
// build_schema
// ============================================================================

#[test]
fn test_create_and_edit_tables_are_merged_with_edit_precedence() {
    let schema = build_schema(Section::Labels, &labels_source(), LABELS_DOC).unwrap();

    let fields: Vec<&str> = schema.fields().collect();
    assert_eq!(fields, vec!["name", "color", "description", "priority", "id"]);
    assert_eq!(
        schema.description("color"),
        Some("The color of the label given in 6-digit hex notation.")
    );
    assert_eq!(
        schema.description("name"),
        Some("The name of the label."),
        "deprecated edit row must not replace the create row"
    );
}

#[test]
fn test_identity_attribute_is_stored_as_id() {
    let schema = build_schema(Section::Labels, &labels_source(), LABELS_DOC).unwrap();

    assert_eq!(
        schema.description("id"),
        Some("The ID or title of a group's label.")
    );
    assert!(!schema.contains("label_id"));
}

#[test]
fn test_superseded_fields_are_dropped() {
    let schema = build_schema(Section::Labels, &labels_source(), LABELS_DOC).unwrap();

    assert!(!schema.contains("new_name"));
}

#[test]
fn test_enclosing_project_id_is_not_a_field() {
    let source = SchemaSource {
        file: "labels.md",
        create: &["Create a new label"],
        edit: &[],
        identity_rename: None,
        dropped: &[],
        extra: &[],
    };

    let schema = build_schema(Section::Labels, &source, LABELS_DOC).unwrap();

    assert!(!schema.contains("id"));
}

#[test]
fn test_duplicate_field_in_one_table_is_rejected() {
    let doc = r#"
## Create a new label

| Attribute | Type   | Required | Description |
|-----------|--------|----------|-------------|
| `name`    | string | Yes      | The name of the label. |
| `name`    | string | No       | Something else. |
"#;
    let source = SchemaSource {
        edit: &[],
        ..labels_source()
    };

    let err = build_schema(Section::Labels, &source, doc).unwrap_err();

    assert_eq!(
        err,
        SchemaError::DuplicateField {
            section: Section::Labels,
            heading: "Create a new label".to_string(),
            field: "name".to_string()
        }
    );
}

#[test]
fn test_tier_suffixes_and_nested_rows() {
    let doc = r#"
## Add a project push rule

| Attribute | Type | Required | Description |
|---|---|---|---|
| `commit_message_regex` **(PREMIUM)** | string | No | All commit messages must match this. |
| `deny_delete_tag` (ULTIMATE ALL) | boolean | No | Deny deleting a tag. |
| `file_name_regex[]` | string | No | Denied file names. |
| `settings[enabled]` | boolean | No | Nested. |
| `max_file_size` | integer | No | Deprecated. Use something else. |
"#;
    let source = SchemaSource {
        edit: &[],
        ..SchemaSource::of(Section::PushRules).unwrap()
    };

    let schema = build_schema(Section::PushRules, &source, doc).unwrap();

    let fields: Vec<&str> = schema.fields().collect();
    assert_eq!(
        fields,
        vec!["commit_message_regex", "deny_delete_tag", "file_name_regex"]
    );
}

#[test]
fn test_first_heading_candidate_present_is_used() {
    let doc = r#"
## Create a label

| Attribute | Type   | Required | Description |
|-----------|--------|----------|-------------|
| `name`    | string | Yes      | The name. |
"#;
    let source = SchemaSource {
        edit: &[],
        ..labels_source()
    };

    let schema = build_schema(Section::Labels, &source, doc).unwrap();

    assert_eq!(schema.fields().collect::<Vec<_>>(), vec!["name"]);
}

#[test]
fn test_missing_heading_is_an_error() {
    let err = build_schema(Section::Labels, &labels_source(), "# Nothing here\n").unwrap_err();

    assert!(matches!(err, SchemaError::HeadingNotFound { section: Section::Labels, .. }));
}

#[test]
fn test_heading_without_table_is_an_error() {
    let doc = "## Create a new label\n\nJust text.\n\n## Edit an existing label\n";

    let err = build_schema(Section::Labels, &labels_source(), doc).unwrap_err();

    assert_eq!(
        err,
        SchemaError::TableNotFound {
            section: Section::Labels,
            heading: "Create a new label".to_string()
        }
    );
}

#[test]
fn test_unexpected_columns_are_an_error() {
    let doc = r#"
## Create a new label

| Name | Description |
|------|-------------|
| `name` | The name. |
"#;

    let err = build_schema(Section::Labels, &labels_source(), doc).unwrap_err();

    assert!(matches!(err, SchemaError::UnexpectedColumns { found, .. } if found == vec!["Name", "Description"]));
}

#[test]
fn test_row_of_wrong_width_is_an_error() {
    let table = Table {
        header: vec![
            "Attribute".to_string(),
            "Type".to_string(),
            "Required".to_string(),
            "Description".to_string(),
        ],
        rows: vec![
            vec![
                "name".to_string(),
                "string".to_string(),
                "Yes".to_string(),
                "The name of the label.".to_string(),
            ],
            vec!["color".to_string(), "string".to_string()],
        ],
    };

    let err = table_fields(Section::Labels, &labels_source(), "Create a new label", &table)
        .unwrap_err();

    assert_eq!(
        err,
        SchemaError::MalformedRow {
            section: Section::Labels,
            heading: "Create a new label".to_string(),
            row: 1,
            cells: 2,
        }
    );
}

#[test]
fn test_extra_fields_are_added() {
    let doc = r#"
## Create a new pipeline schedule

| Attribute | Type | Required | Description |
|---|---|---|---|
| `description` | string | Yes | The description of the pipeline schedule. |
| `ref` | string | Yes | The branch or tag name that is triggered. |

## Edit a pipeline schedule

| Attribute | Type | Required | Description |
|---|---|---|---|
| `pipeline_schedule_id` | integer | Yes | The pipeline schedule ID. |
| `cron` | string | No | The cron schedule. |
"#;
    let source = SchemaSource::of(Section::PipelineSchedules).unwrap();

    let schema = build_schema(Section::PipelineSchedules, &source, doc).unwrap();

    assert_eq!(
        schema.fields().collect::<Vec<_>>(),
        vec!["description", "ref", "id", "cron", "variables"]
    );
}

#[test]
fn test_describe_lists_fields_in_order() {
    let schema: SchemaMap = [("name", "The name."), ("color", "")].into_iter().collect();

    assert_eq!(schema.describe(), "name: The name.\ncolor");
}

#[test]
fn test_sections_without_documentation() {
    assert!(SchemaSource::of(Section::Avatar).is_none());
    assert!(SchemaSource::of(Section::ForkedFromProject).is_none());
    for section in Section::ALL {
        if section.identity_rules().is_some() {
            assert!(SchemaSource::of(section).is_some(), "{section} needs a schema");
        }
    }
}

// ============================================================================
// SchemaProvider
// ============================================================================

struct FakeDocs {
    requests: AtomicUsize,
    urls: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeDocs {
    fn new() -> Self {
        Self {
            requests: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            fail: false,
        }
    }
}

#[async_trait]
impl DocumentationFetcher for FakeDocs {
    async fn fetch(&self, url: &str) -> gitlab_client::Result<String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(gitlab_client::Error::NotFound {
                path: url.to_string(),
            });
        }
        Ok(LABELS_DOC.to_string())
    }
}

#[tokio::test]
async fn test_provider_fetches_each_document_once() {
    let docs = FakeDocs::new();
    let location = DocsLocation {
        base_url: "https://gitlab.example.com/gitlab-org/gitlab/".to_string(),
        reference: "v17.0.0-ee".to_string(),
    };
    let mut provider = SchemaProvider::new(&docs, location);

    let first = provider.schema(Section::Labels).await.unwrap();
    let second = provider.schema(Section::Labels).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(docs.requests.load(Ordering::SeqCst), 1);
    assert_eq!(
        docs.urls.lock().unwrap()[0],
        "https://gitlab.example.com/gitlab-org/gitlab/-/raw/v17.0.0-ee/doc/api/labels.md"
    );
}

#[tokio::test]
async fn test_provider_rejects_sections_without_schema() {
    let docs = FakeDocs::new();
    let mut provider = SchemaProvider::new(&docs, DocsLocation::default());

    let err = provider.schema(Section::Avatar).await.unwrap_err();

    assert!(matches!(
        err,
        crate::errors::SyncError::Schema(SchemaError::NoSchema {
            section: Section::Avatar
        })
    ));
    assert_eq!(docs.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_provider_tags_fetch_failures() {
    let docs = FakeDocs {
        fail: true,
        ..FakeDocs::new()
    };
    let mut provider = SchemaProvider::new(&docs, DocsLocation::default());

    let err = provider.schema(Section::Labels).await.unwrap_err();

    let message = err.to_string();
    assert!(message.starts_with("failed to fetch reference documentation from https://"));
}
