//! Tests for the configuration document model.

use super::*;
use serde_json::json;

fn records(value: Value) -> Vec<Record> {
    serde_json::from_value(value).unwrap()
}

#[test]
fn test_absent_section_is_not_managed_and_empty_section_is() {
    let document: ConfigurationDocument =
        serde_json::from_value(json!({"labels": [], "project": {}})).unwrap();

    assert!(!document.is_managed(Section::Variables));
    assert!(document.section(Section::Variables).is_none());
    assert!(document.is_managed(Section::Labels));
    assert_eq!(
        document.section(Section::Labels),
        Some(SectionContent::List(Vec::new()))
    );
    assert_eq!(
        document.managed_sections(),
        vec![Section::Project, Section::Labels]
    );
}

#[test]
fn test_null_section_is_not_managed() {
    let document: ConfigurationDocument =
        serde_json::from_value(json!({"variables": null})).unwrap();

    assert!(!document.is_managed(Section::Variables));
}

#[test]
fn test_serialization_omits_unmanaged_and_keeps_empty_sections() {
    let document = ConfigurationDocument {
        labels: Some(Vec::new()),
        push_rules: Some(Record::new()),
        ..Default::default()
    };

    let value = serde_json::to_value(&document).unwrap();

    assert_eq!(value, json!({"labels": [], "push_rules": {}}));
}

#[test]
fn test_fork_target_accepts_id_or_path() {
    let by_id: ConfigurationDocument =
        serde_json::from_value(json!({"forked_from_project": 42})).unwrap();
    let by_path: ConfigurationDocument =
        serde_json::from_value(json!({"forked_from_project": "group/upstream"})).unwrap();

    assert_eq!(by_id.forked_from_project, Some(ForkTarget::Id(42)));
    assert_eq!(
        by_path.forked_from_project,
        Some(ForkTarget::Path("group/upstream".to_string()))
    );
    assert_eq!(ForkTarget::Id(42).to_string(), "42");
}

#[test]
fn test_set_section_round_trips_every_kind() {
    let mut document = ConfigurationDocument::default();
    let contents = [
        (Section::Project, SectionContent::Record(Record::new())),
        (Section::Avatar, SectionContent::Avatar("logo.png".to_string())),
        (Section::ForkedFromProject, SectionContent::Fork(ForkTarget::Id(1))),
        (Section::Variables, SectionContent::List(Vec::new())),
        (Section::PushRules, SectionContent::Record(Record::new())),
    ];

    for (section, content) in contents.clone() {
        document.set_section(section, content);
    }

    for (section, content) in contents {
        assert_eq!(document.section(section), Some(content));
    }
}

#[test]
fn test_set_section_ignores_content_of_wrong_kind() {
    let mut document = ConfigurationDocument::default();

    document.set_section(Section::Labels, SectionContent::Record(Record::new()));
    document.set_section(Section::Project, SectionContent::List(Vec::new()));

    assert_eq!(document, ConfigurationDocument::default());
}

#[test]
fn test_strip_comments_reaches_every_section() {
    let mut document: ConfigurationDocument = serde_json::from_value(json!({
        "project": {"name": "x", "comment:name": "the name"},
        "protected_branches": [
            {"name": "main", "allowed_to_push": [{"access_level": 40, "comment:": "Maintainers"}]}
        ],
        "approval_rules": [{"name": "a", "user_ids": [1], "comment:user_ids": "alice"}]
    }))
    .unwrap();

    document.strip_comments();

    assert_eq!(
        serde_json::to_value(&document).unwrap(),
        json!({
            "project": {"name": "x"},
            "protected_branches": [{"name": "main", "allowed_to_push": [{"access_level": 40}]}],
            "approval_rules": [{"name": "a", "user_ids": [1]}]
        })
    );
}

#[test]
fn test_normalize_numbers_reaches_every_section() {
    let mut document: ConfigurationDocument = serde_json::from_value(json!({
        "approvals": {"approvals_before_merge": 2.0},
        "labels": [{"name": "bug", "priority": 1.0}]
    }))
    .unwrap();

    document.normalize_numbers();

    assert!(document.approvals.unwrap()["approvals_before_merge"].is_u64());
    assert!(document.labels.unwrap()[0]["priority"].is_u64());
}

#[test]
fn test_variable_values_are_sensitive() {
    let variables = records(json!([{"key": "A", "value": ""}, {"key": "B", "value": "secret"}]));
    let empty = records(json!([{"key": "A", "value": ""}]));

    assert!(has_sensitive_value(Section::Variables, &variables));
    assert!(!has_sensitive_value(Section::Variables, &empty));
    assert!(!has_sensitive_value(Section::Variables, &[]));
}

#[test]
fn test_schedule_variable_values_are_sensitive() {
    let schedules = records(json!([
        {"description": "nightly", "variables": []},
        {"description": "weekly", "variables": [{"key": "TOKEN", "value": "abc"}]}
    ]));

    assert!(has_sensitive_value(Section::PipelineSchedules, &schedules));
    assert!(!has_sensitive_value(
        Section::PipelineSchedules,
        &schedules[..1]
    ));
}

#[test]
fn test_labels_never_hold_secrets() {
    let labels = records(json!([{"name": "bug", "value": "not a secret"}]));

    assert!(!has_sensitive_value(Section::Labels, &labels));
}
