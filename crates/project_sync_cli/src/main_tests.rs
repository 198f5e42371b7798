use super::*;
use project_sync_core::Section;
use std::path::PathBuf;

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args.iter().copied()).expect("arguments should parse")
}

#[test]
fn test_get_with_output_and_sections() {
    let cli = parse(&[
        "project-sync",
        "--token",
        "glpat-test",
        "--project",
        "group/app",
        "get",
        "--output",
        "settings.yaml",
        "--section",
        "labels",
        "--section",
        "variables",
    ]);

    assert_eq!(cli.connection.project.as_deref(), Some("group/app"));
    match cli.command {
        Commands::Get(args) => {
            assert_eq!(args.output, Some(PathBuf::from("settings.yaml")));
            assert_eq!(args.sections, vec![Section::Labels, Section::Variables]);
        }
        Commands::Set(_) => panic!("Expected get command"),
    }
}

#[test]
fn test_set_accepts_global_flags_after_subcommand() {
    let cli = parse(&[
        "project-sync",
        "set",
        "--file",
        "settings.yaml",
        "--dry-run",
        "--url",
        "https://gitlab.example.com",
        "--config",
        "sync.toml",
    ]);

    assert_eq!(
        cli.connection.url.as_deref(),
        Some("https://gitlab.example.com")
    );
    assert_eq!(cli.connection.config, Some(PathBuf::from("sync.toml")));
    match cli.command {
        Commands::Set(args) => {
            assert_eq!(args.file, PathBuf::from("settings.yaml"));
            assert!(args.dry_run);
            assert!(args.sections.is_empty());
        }
        Commands::Get(_) => panic!("Expected set command"),
    }
}

#[test]
fn test_set_requires_a_file() {
    assert!(Cli::try_parse_from(["project-sync", "set"]).is_err());
}

#[test]
fn test_unknown_section_is_rejected() {
    let result = Cli::try_parse_from(["project-sync", "get", "--section", "milestones"]);

    let err = result.err().expect("unknown section should fail");
    assert!(err.to_string().contains("unknown section 'milestones'"));
}

#[test]
fn test_cli_definition_is_consistent() {
    use clap::CommandFactory;
    Cli::command().debug_assert();
}
