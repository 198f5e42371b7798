use super::*;
use secrecy::ExposeSecret;
use std::fs;
use tempfile::TempDir;

fn overrides() -> Overrides {
    Overrides {
        url: None,
        token: Some(SecretString::from("glpat-test".to_string())),
        project: Some("group/app".to_string()),
    }
}

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("project-sync.toml");
    fs::write(&path, content).expect("Failed to write config");
    path
}

#[test]
fn test_app_config_load_reads_every_table() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_config(
        &temp_dir,
        r#"
[gitlab]
url = "https://gitlab.example.com"

[docs]
base_url = "https://mirror.example.com/gitlab"
ref = "v17.4.0-ee"

[output]
comment_width = 100

[client]
page_size = 50
"#,
    );

    let config = AppConfig::load(&path).expect("Failed to load config");

    assert_eq!(config.gitlab.url.as_deref(), Some("https://gitlab.example.com"));
    assert_eq!(
        config.docs.base_url.as_deref(),
        Some("https://mirror.example.com/gitlab")
    );
    assert_eq!(config.docs.reference.as_deref(), Some("v17.4.0-ee"));
    assert_eq!(config.output.comment_width, Some(100));
    assert_eq!(config.client.page_size, Some(50));
}

#[test]
fn test_app_config_load_accepts_partial_files() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_config(&temp_dir, "[client]\npage_size = 20\n");

    let config = AppConfig::load(&path).expect("Failed to load config");

    assert_eq!(config.client.page_size, Some(20));
    assert_eq!(config.gitlab, GitLabConfig::default());
    assert_eq!(config.docs, DocsConfig::default());
}

#[test]
fn test_app_config_load_invalid_toml() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = write_config(&temp_dir, "invalid = toml = syntax");

    let result = AppConfig::load(&path);

    if let Err(Error::Config(msg)) = result {
        assert!(msg.contains("Failed to parse configuration file"));
    } else {
        panic!("Expected Config error");
    }
}

#[test]
fn test_app_config_load_nonexistent_file() {
    let result = AppConfig::load(Path::new("nonexistent_project_sync.toml"));

    if let Err(Error::Config(msg)) = result {
        assert!(msg.contains("Configuration file not found"));
    } else {
        panic!("Expected Config error");
    }
}

#[test]
fn test_load_for_run_requires_an_explicit_file_to_exist() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let missing = temp_dir.path().join("missing.toml");

    assert!(matches!(
        AppConfig::load_for_run(Some(&missing)),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_default_config_path_is_in_current_directory() {
    let path = default_config_path();
    assert!(path.ends_with(DEFAULT_CONFIG_FILENAME));
}

// ============================================================================
// Settings resolution
// ============================================================================

#[test]
fn test_settings_use_defaults_without_config() {
    let settings = Settings::resolve(&AppConfig::default(), overrides()).unwrap();

    assert_eq!(settings.url, DEFAULT_GITLAB_URL);
    assert_eq!(settings.project, "group/app");
    assert_eq!(settings.token.expose_secret(), "glpat-test");
    assert_eq!(settings.docs, DocsLocation::default());
    assert_eq!(settings.page_size, DEFAULT_PAGE_SIZE);
    assert_eq!(settings.comment_width, DEFAULT_COMMENT_WIDTH);
}

#[test]
fn test_config_file_overrides_defaults() {
    let mut config = AppConfig::default();
    config.gitlab.url = Some("https://gitlab.example.com".to_string());
    config.docs.reference = Some("v17.4.0-ee".to_string());
    config.output.comment_width = Some(60);

    let settings = Settings::resolve(&config, overrides()).unwrap();

    assert_eq!(settings.url, "https://gitlab.example.com");
    assert_eq!(settings.docs.reference, "v17.4.0-ee");
    assert_eq!(settings.docs.base_url, DocsLocation::default().base_url);
    assert_eq!(settings.comment_width, 60);
}

#[test]
fn test_flags_override_config_file() {
    let mut config = AppConfig::default();
    config.gitlab.url = Some("https://gitlab.example.com".to_string());
    let overrides = Overrides {
        url: Some("https://gitlab.internal".to_string()),
        ..overrides()
    };

    let settings = Settings::resolve(&config, overrides).unwrap();

    assert_eq!(settings.url, "https://gitlab.internal");
}

#[test]
fn test_missing_token_is_invalid_arguments() {
    let overrides = Overrides {
        token: None,
        ..overrides()
    };

    let result = Settings::resolve(&AppConfig::default(), overrides);

    assert!(matches!(result, Err(Error::InvalidArguments(msg)) if msg.contains("GITLAB_TOKEN")));
}

#[test]
fn test_blank_project_is_invalid_arguments() {
    let overrides = Overrides {
        project: Some("  ".to_string()),
        ..overrides()
    };

    let result = Settings::resolve(&AppConfig::default(), overrides);

    assert!(matches!(result, Err(Error::InvalidArguments(msg)) if msg.contains("GITLAB_PROJECT")));
}

#[test]
fn test_page_size_out_of_range_is_rejected() {
    for page_size in [0, MAX_PAGE_SIZE + 1] {
        let mut config = AppConfig::default();
        config.client.page_size = Some(page_size);

        let result = Settings::resolve(&config, overrides());

        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("page_size")));
    }
}

#[test]
fn test_zero_comment_width_is_rejected() {
    let mut config = AppConfig::default();
    config.output.comment_width = Some(0);

    assert!(matches!(
        Settings::resolve(&config, overrides()),
        Err(Error::Config(_))
    ));
}
