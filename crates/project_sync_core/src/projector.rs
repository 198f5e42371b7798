//! Projection of raw GitLab resources onto the editable field set.
//!
//! Resources read from GitLab carry many fields that cannot be written back,
//! and some fields are read under a different name or shape than they are
//! written with. Projection turns a raw resource into the record a user edits:
//! numbers normalized, read shapes renamed to write shapes, human readable
//! labels moved to `comment:` annotations and every non-schema field dropped.

use serde_json::{Map, Value};

use crate::errors::{FieldProblem, ProjectionError};
use crate::record::{comment_key, normalize_numbers, type_name, Record, COMMENT_PREFIX};
use crate::schema::SchemaMap;
use crate::section::Section;

#[cfg(test)]
#[path = "projector_tests.rs"]
mod tests;

/// Read names of access-level lists and the write names they are stored under.
const ACCESS_LEVEL_RENAMES: [(&str, &str); 4] = [
    ("push_access_levels", "allowed_to_push"),
    ("merge_access_levels", "allowed_to_merge"),
    ("unprotect_access_levels", "allowed_to_unprotect"),
    ("create_access_levels", "allowed_to_create"),
];

/// Approval rule members: read field, written ID list, field the label comes from.
const APPROVAL_MEMBERS: [(&str, &str, &str); 3] = [
    ("users", "user_ids", "username"),
    ("groups", "group_ids", "full_path"),
    ("protected_branches", "protected_branch_ids", "name"),
];

/// Rewrites a record as GitLab returns it into the shape GitLab accepts.
///
/// Only fields whose read and write representation differ are touched;
/// everything else is left as is.
pub fn canonicalize(section: Section, record: &mut Record) {
    match section {
        Section::Project => {
            if let Some(Value::Object(mut policy)) = record.remove("container_expiration_policy") {
                policy.remove("next_run_at");
                record.insert(
                    "container_expiration_policy_attributes".to_string(),
                    Value::Object(policy),
                );
            }
        }
        Section::ProtectedBranches | Section::ProtectedTags => {
            for (read, write) in ACCESS_LEVEL_RENAMES {
                if let Some(Value::Array(entries)) = record.remove(read) {
                    let entries = entries.into_iter().map(canonical_access_level).collect();
                    record.insert(write.to_string(), Value::Array(entries));
                }
            }
        }
        Section::ApprovalRules => {
            for (read, write, label) in APPROVAL_MEMBERS {
                let Some(Value::Array(members)) = record.remove(read) else {
                    continue;
                };
                let ids: Vec<Value> = members.iter().filter_map(|m| m.get("id").cloned()).collect();
                let labels: Vec<&str> = members
                    .iter()
                    .filter_map(|m| m.get(label).and_then(Value::as_str))
                    .collect();
                if !labels.is_empty() {
                    record.insert(comment_key(write), labels.join(", ").into());
                }
                record.insert(write.to_string(), Value::Array(ids));
            }
        }
        Section::SharedWithGroups => {
            if let Some(level) = record.remove("group_access_level") {
                record.insert("group_access".to_string(), level);
            }
            if let Some(Value::String(path)) = record.remove("group_full_path") {
                record.insert(COMMENT_PREFIX.to_string(), path.into());
            }
        }
        _ => {}
    }
}

/// Reduces an access-level entry to its ID and the one discriminant it is
/// matched on, with the tier description kept as an annotation.
fn canonical_access_level(entry: Value) -> Value {
    let Value::Object(mut entry) = entry else {
        return entry;
    };

    let mut canonical = Map::new();
    if let Some(id) = entry.remove("id") {
        canonical.insert("id".to_string(), id);
    }
    let discriminant = ["user_id", "group_id", "deploy_key_id", "access_level"]
        .into_iter()
        .find_map(|field| match entry.remove(field) {
            Some(value) if !value.is_null() && value != Value::from(0) => Some((field, value)),
            _ => None,
        });
    if let Some((field, value)) = discriminant {
        canonical.insert(field.to_string(), value);
    }
    if let Some(Value::String(description)) = entry.remove("access_level_description") {
        canonical.insert(COMMENT_PREFIX.to_string(), description.into());
    }
    Value::Object(canonical)
}

/// Projects one raw resource onto a section's schema.
///
/// `index` is the resource's position when it is part of a list. With
/// `keep_identity` set, identity fields survive even when the schema does not
/// list them, and a missing or malformed identity is an error.
///
/// # Errors
///
/// Returns a [`ProjectionError`] when the resource is not a mapping, or when
/// `keep_identity` is set and the identity or natural key is missing or has
/// the wrong type.
pub fn project(
    section: Section,
    index: Option<usize>,
    value: Value,
    schema: &SchemaMap,
    keep_identity: bool,
) -> Result<Record, ProjectionError> {
    let mut record = into_record(section, index, value)?;
    canonicalize(section, &mut record);

    retain_editable(section, &mut record, schema, keep_identity);

    let rules = section.identity_rules();
    if let (Some(rules), true) = (rules, keep_identity) {
        let error = |(field, problem): (String, FieldProblem)| ProjectionError {
            section,
            index,
            field,
            problem,
        };
        if rules.identity_of(&record).map_err(error)?.is_none() {
            return Err(ProjectionError {
                section,
                index,
                field: rules.identity_fields().first().copied().unwrap_or("id").to_string(),
                problem: FieldProblem::Missing,
            });
        }
        rules.natural_key_of(&record).map_err(error)?;
    }

    Ok(record)
}

/// Removes every field the schema does not list and returns the names of the
/// removed data fields. Annotations of removed fields go with them.
pub fn retain_editable(
    section: Section,
    record: &mut Record,
    schema: &SchemaMap,
    keep_identity: bool,
) -> Vec<String> {
    let identity_fields = match (section.identity_rules(), keep_identity) {
        (Some(rules), true) => rules.identity_fields(),
        _ => Vec::new(),
    };
    let keep = |field: &str| schema.contains(field) || identity_fields.iter().any(|f| *f == field);

    let mut dropped = Vec::new();
    record.retain(|key, _| match key.strip_prefix(COMMENT_PREFIX) {
        Some("") => true,
        Some(field) => keep(field),
        None => {
            let kept = keep(key);
            if !kept {
                dropped.push(key.clone());
            }
            kept
        }
    });
    dropped
}

/// Projects every resource of a list section.
pub fn project_list(
    section: Section,
    values: Vec<Value>,
    schema: &SchemaMap,
    keep_identity: bool,
) -> Result<Vec<Record>, ProjectionError> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| project(section, Some(index), value, schema, keep_identity))
        .collect()
}

/// Normalizes and canonicalizes the existing resources of a list section
/// without dropping any field, for comparison against desired records.
pub fn canonicalize_list(section: Section, values: Vec<Value>) -> Result<Vec<Record>, ProjectionError> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let mut record = into_record(section, Some(index), value)?;
            canonicalize(section, &mut record);
            Ok(record)
        })
        .collect()
}

fn into_record(section: Section, index: Option<usize>, mut value: Value) -> Result<Record, ProjectionError> {
    normalize_numbers(&mut value);
    match value {
        Value::Object(record) => Ok(record),
        other => Err(ProjectionError {
            section,
            index,
            field: "(item)".to_string(),
            problem: FieldProblem::WrongType {
                expected: "mapping",
                found: type_name(&other),
            },
        }),
    }
}

