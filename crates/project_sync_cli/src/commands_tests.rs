use super::*;
use crate::config::DEFAULT_GITLAB_URL;
use project_sync_core::DocsLocation;

fn settings(url: &str) -> Settings {
    Settings {
        url: url.to_string(),
        token: SecretString::from("glpat-test".to_string()),
        project: "42".to_string(),
        docs: DocsLocation::default(),
        comment_width: 80,
        page_size: 100,
    }
}

#[test]
fn test_parse_section_accepts_document_keys() {
    assert_eq!(parse_section("labels"), Ok(Section::Labels));
    assert_eq!(
        parse_section("forked_from_project"),
        Ok(Section::ForkedFromProject)
    );
}

#[test]
fn test_parse_section_lists_known_sections_on_error() {
    let err = parse_section("milestones").unwrap_err();

    assert!(err.contains("unknown section 'milestones'"));
    assert!(err.contains("protected_branches"));
}

#[test]
fn test_connect_builds_client_for_instance() {
    let client = connect(&settings("https://gitlab.example.com")).unwrap();

    assert_eq!(client.api_url().as_str(), "https://gitlab.example.com/api/v4/");
}

#[test]
fn test_connect_rejects_invalid_url() {
    let result = connect(&settings("not a url"));

    assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("not a url")));
}

#[test]
fn test_connection_args_resolve_with_explicit_config() {
    let temp_dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let config = temp_dir.path().join("sync.toml");
    std::fs::write(&config, "[client]\npage_size = 25\n").expect("Failed to write config");
    let args = ConnectionArgs {
        url: None,
        token: Some("glpat-test".to_string()),
        project: Some("group/app".to_string()),
        config: Some(config),
    };

    let settings = args.settings().unwrap();

    assert_eq!(settings.page_size, 25);
    assert_eq!(settings.url, DEFAULT_GITLAB_URL);
    assert_eq!(settings.project, "group/app");
}
