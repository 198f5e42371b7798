use super::*;
use crate::testing::{mount_labels, received_methods, settings_for, PROJECT};
use async_trait::async_trait;
use gitlab_client::GitLabClient;
use project_sync_core::{SecretError, SectionReport};
use secrecy::SecretString;
use serde_json::json;
use std::fs;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Decrypts every document to the same plain text.
struct MockDecryptor {
    plain: Option<&'static str>,
}

#[async_trait]
impl SecretDecryptor for MockDecryptor {
    async fn decrypt(&self, _document: &str) -> Result<Decryption, SecretError> {
        match self.plain {
            Some(text) => Ok(Decryption::Decrypted(text.to_string())),
            None => Ok(Decryption::NoManagedSecrets),
        }
    }
}

/// Fails every decryption like a missing key would.
struct FailingDecryptor;

#[async_trait]
impl SecretDecryptor for FailingDecryptor {
    async fn decrypt(&self, _document: &str) -> Result<Decryption, SecretError> {
        Err(SecretError::Failed {
            program: "sops".to_string(),
            stderr: "no key could decrypt the data key".to_string(),
        })
    }
}

const PLAIN: MockDecryptor = MockDecryptor { plain: None };

fn write_document(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("settings.yaml");
    fs::write(&path, content).expect("Failed to write document");
    path
}

fn set_args(file: PathBuf, dry_run: bool) -> SetArgs {
    SetArgs {
        file,
        dry_run,
        sections: Vec::new(),
    }
}

fn client_for(server: &MockServer) -> GitLabClient {
    GitLabClient::new(
        &server.uri(),
        SecretString::from("glpat-test".to_string()),
        100,
    )
    .unwrap()
}

const LABELS_DOCUMENT: &str = "\
labels:
- name: bug
  color: '#ff0000'
- name: docs
  color: '#0000ff'
";

// ============================================================================
// Loading documents
// ============================================================================

#[tokio::test]
async fn test_load_document_uses_plain_text_without_managed_secrets() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_document(&temp_dir, "labels: []\n");

    let document = load_document(&path, &PLAIN, &DocumentCodec::default())
        .await
        .unwrap();

    assert_eq!(document.labels, Some(Vec::new()));
    assert!(document.project.is_none());
}

#[tokio::test]
async fn test_load_document_parses_decrypted_text() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_document(&temp_dir, "variables: ENC[...]\nsops:\n  version: 3.9.0\n");
    let decryptor = MockDecryptor {
        plain: Some("variables:\n- key: TOKEN\n  value: s3cr3t\n"),
    };

    let document = load_document(&path, &decryptor, &DocumentCodec::default())
        .await
        .unwrap();

    let variables = document.variables.expect("variables section");
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0].get("value"), Some(&json!("s3cr3t")));
}

#[tokio::test]
async fn test_load_document_reports_decryption_failure() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_document(&temp_dir, "sops:\n  version: 3.9.0\n");

    let err = load_document(&path, &FailingDecryptor, &DocumentCodec::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Sync(SyncError::Secret(_))));
    assert!(err.to_string().contains("no key could decrypt"));
}

#[tokio::test]
async fn test_load_document_reports_missing_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("missing.yaml");

    let err = load_document(&path, &PLAIN, &DocumentCodec::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Io { path: p, .. } if p == path));
}

#[tokio::test]
async fn test_load_document_resolves_avatar_next_to_document() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_document(&temp_dir, "avatar: logo.png\n");

    let document = load_document(&path, &PLAIN, &DocumentCodec::default())
        .await
        .unwrap();

    let expected = temp_dir.path().join("logo.png");
    assert_eq!(document.avatar.as_deref(), expected.to_str());
}

#[test]
fn test_resolve_avatar_keeps_absolute_and_bare_paths() {
    let mut document = ConfigurationDocument {
        avatar: Some("/srv/logo.png".to_string()),
        ..ConfigurationDocument::default()
    };
    resolve_avatar(&mut document, Path::new("config/settings.yaml"));
    assert_eq!(document.avatar.as_deref(), Some("/srv/logo.png"));

    document.avatar = Some("logo.png".to_string());
    resolve_avatar(&mut document, Path::new("settings.yaml"));
    assert_eq!(document.avatar.as_deref(), Some("logo.png"));
}

// ============================================================================
// Applying documents
// ============================================================================

#[tokio::test]
async fn test_dry_run_reports_changes_without_sending_them() {
    let server = MockServer::start().await;
    mount_labels(&server, json!([{"id": 1, "name": "bug", "color": "#d9534f"}])).await;
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let file = write_document(&temp_dir, LABELS_DOCUMENT);
    let client = client_for(&server);

    let report = apply_file(
        &client,
        &client,
        &PLAIN,
        &settings_for(&server),
        &set_args(file, true),
    )
    .await
    .unwrap();

    assert!(report.dry_run);
    let labels = report.section(Section::Labels).expect("labels report");
    assert_eq!((labels.created, labels.updated, labels.deleted), (1, 1, 0));
    assert!(received_methods(&server).await.iter().all(|m| m == "GET"));
}

#[tokio::test]
async fn test_apply_file_sends_label_changes() {
    let server = MockServer::start().await;
    mount_labels(
        &server,
        json!([
            {"id": 1, "name": "bug", "color": "#d9534f"},
            {"id": 2, "name": "stale", "color": "#cccccc"}
        ]),
    )
    .await;
    Mock::given(method("DELETE"))
        .and(path(format!("/api/v4/projects/{PROJECT}/labels/2")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(format!("/api/v4/projects/{PROJECT}/labels/1")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/api/v4/projects/{PROJECT}/labels")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 3})))
        .expect(1)
        .mount(&server)
        .await;
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let file = write_document(&temp_dir, LABELS_DOCUMENT);
    let client = client_for(&server);

    let report = apply_file(
        &client,
        &client,
        &PLAIN,
        &settings_for(&server),
        &set_args(file, false),
    )
    .await
    .unwrap();

    assert_eq!(
        (report.created(), report.updated(), report.deleted()),
        (1, 1, 1)
    );
    let mutations: Vec<String> = received_methods(&server)
        .await
        .into_iter()
        .filter(|m| m != "GET")
        .collect();
    assert_eq!(mutations, vec!["DELETE", "PUT", "POST"]);
}

#[tokio::test]
async fn test_section_filter_skips_other_sections() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let file = write_document(&temp_dir, LABELS_DOCUMENT);
    let client = client_for(&server);
    let args = SetArgs {
        sections: vec![Section::Variables],
        ..set_args(file, false)
    };

    let report = apply_file(&client, &client, &PLAIN, &settings_for(&server), &args)
        .await
        .unwrap();

    assert!(report.sections.is_empty());
    assert!(received_methods(&server).await.is_empty());
}

// ============================================================================
// Report formatting
// ============================================================================

#[test]
fn test_format_report_lists_sections_and_totals() {
    let mut labels = SectionReport::new(Section::Labels);
    labels.created = 2;
    labels.unchanged = 4;
    let mut tags = SectionReport::new(Section::ProtectedTags);
    tags.deleted = 1;
    let report = ApplyReport {
        sections: vec![labels, tags],
        dry_run: false,
    };

    assert_eq!(
        format_report(&report),
        "labels: 2 created, 0 updated, 0 deleted, 4 unchanged\n\
         protected_tags: 0 created, 0 updated, 1 deleted, 0 unchanged\n\
         total: 2 created, 0 updated, 1 deleted"
    );
}

#[test]
fn test_format_report_without_sections() {
    assert_eq!(
        format_report(&ApplyReport::new(true)),
        "No sections are managed by the document"
    );
}
