//! Diffing of collections embedded in a list item.
//!
//! Two flavours exist:
//!
//! * Access-level lists (`allowed_to_push`, `allowed_to_merge`, ...). GitLab has
//!   no endpoint to remove a single entry, so removals ride along with the
//!   parent update as `{id, _destroy: true}` sentinel entries.
//! * Keyed lists (pipeline schedule variables), which have their own create,
//!   update and delete endpoints and are diffed by key.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::errors::FieldProblem;
use crate::record::{data_fields, is_subset_of, optional_str, optional_u64, Record};

#[cfg(test)]
#[path = "sublist_tests.rs"]
mod tests;

/// Field marking a sentinel entry for deletion.
pub const DESTROY_FIELD: &str = "_destroy";

/// Access-level list fields of protected branches and protected tags.
pub const ACCESS_LEVEL_FIELDS: [&str; 4] = [
    "allowed_to_push",
    "allowed_to_merge",
    "allowed_to_unprotect",
    "allowed_to_create",
];

/// A malformed entry of an embedded list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubItemError {
    /// Position of the entry in its list.
    pub entry: usize,
    /// Field of the entry that is wrong.
    pub field: String,
    pub problem: FieldProblem,
}

/// The value an access-level entry is matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Discriminant {
    /// An access level tier such as 30 (Developer) or 40 (Maintainer).
    AccessLevel(u64),
    UserId(u64),
    GroupId(u64),
    /// A deploy key allowed to push to a protected branch.
    DeployKeyId(u64),
}

impl Discriminant {
    /// Discriminant of an entry written by a user, checked in the order
    /// tier, user, group, deploy key. Zero values are unset and never match.
    fn of_desired(entry: &Record, index: usize) -> Result<Option<Self>, SubItemError> {
        let tier = read_u64(entry, "access_level", index)?;
        let user = read_u64(entry, "user_id", index)?;
        let group = read_u64(entry, "group_id", index)?;
        let key = read_u64(entry, "deploy_key_id", index)?;

        Ok(match (tier, user, group, key) {
            (Some(t), _, _, _) if t != 0 => Some(Discriminant::AccessLevel(t)),
            (_, Some(u), _, _) if u != 0 => Some(Discriminant::UserId(u)),
            (_, _, Some(g), _) if g != 0 => Some(Discriminant::GroupId(g)),
            (_, _, _, Some(k)) if k != 0 => Some(Discriminant::DeployKeyId(k)),
            _ => None,
        })
    }

    /// Discriminant of an entry returned by GitLab. GitLab fills in a tier
    /// for user, group and deploy key entries too, so their IDs decide.
    fn of_existing(entry: &Record, index: usize) -> Result<Option<Self>, SubItemError> {
        let tier = read_u64(entry, "access_level", index)?;
        let user = read_u64(entry, "user_id", index)?;
        let group = read_u64(entry, "group_id", index)?;
        let key = read_u64(entry, "deploy_key_id", index)?;

        Ok(match (user, group, key, tier) {
            (Some(u), _, _, _) if u != 0 => Some(Discriminant::UserId(u)),
            (_, Some(g), _, _) if g != 0 => Some(Discriminant::GroupId(g)),
            (_, _, Some(k), _) if k != 0 => Some(Discriminant::DeployKeyId(k)),
            (_, _, _, Some(t)) if t != 0 => Some(Discriminant::AccessLevel(t)),
            _ => None,
        })
    }
}

/// Result of diffing one access-level list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SublistDiff {
    /// Desired entries, with the IDs of matched existing entries attached.
    pub resolved: Vec<Record>,
    /// `{id, _destroy: true}` sentinels for existing entries no longer wanted.
    pub deletions: Vec<Record>,
}

impl SublistDiff {
    /// `true` when applying the diff would not change anything.
    pub fn is_noop(&self) -> bool {
        self.deletions.is_empty() && self.resolved.iter().all(|entry| entry.contains_key("id"))
    }

    /// The list to send to GitLab: resolved entries followed by the sentinels.
    pub fn into_payload(self) -> Vec<Value> {
        self.resolved
            .into_iter()
            .chain(self.deletions)
            .map(Value::Object)
            .collect()
    }
}

/// Diffs the desired entries of an access-level list against the existing ones.
///
/// Desired entries carrying an existing entry's `id` keep it. Entries carrying
/// an unknown `id` lose it and, like entries without one, are matched by
/// discriminant against the existing entries nobody claimed yet. Existing
/// entries left unclaimed are appended as deletion sentinels.
///
/// # Errors
///
/// Returns a [`SubItemError`] when an entry has an `id` or discriminant field
/// that is not a non-negative integer.
pub fn diff_access_levels(existing: &[Record], desired: Vec<Record>) -> Result<SublistDiff, SubItemError> {
    let mut existing_ids = BTreeSet::new();
    let mut by_discriminant: HashMap<Discriminant, u64> = HashMap::new();

    for (index, entry) in existing.iter().enumerate() {
        let Some(id) = read_u64(entry, "id", index)? else {
            continue;
        };
        existing_ids.insert(id);
        if let Some(discriminant) = Discriminant::of_existing(entry, index)? {
            by_discriminant.entry(discriminant).or_insert(id);
        }
    }

    let mut resolved = desired;
    for entry in resolved.iter_mut() {
        entry.retain(|key, _| key != DESTROY_FIELD);
    }

    let mut claimed = BTreeSet::new();

    // Explicit IDs first, so a later discriminant match cannot steal them.
    for (index, entry) in resolved.iter_mut().enumerate() {
        if let Some(id) = read_u64(entry, "id", index)? {
            if existing_ids.contains(&id) && claimed.insert(id) {
                continue;
            }
            entry.remove("id");
        }
    }

    for (index, entry) in resolved.iter_mut().enumerate() {
        if entry.contains_key("id") {
            continue;
        }
        let Some(discriminant) = Discriminant::of_desired(entry, index)? else {
            continue;
        };
        if let Some(id) = by_discriminant.get(&discriminant) {
            if claimed.insert(*id) {
                entry.insert("id".to_string(), (*id).into());
            }
        }
    }

    let deletions = existing_ids
        .difference(&claimed)
        .map(|id| {
            let mut sentinel = Record::new();
            sentinel.insert("id".to_string(), (*id).into());
            sentinel.insert(DESTROY_FIELD.to_string(), Value::Bool(true));
            sentinel
        })
        .collect();

    Ok(SublistDiff {
        resolved,
        deletions,
    })
}

/// Prepares an access-level list for a create request: deletion sentinels
/// are dropped and the remaining entries lose their `id`.
pub fn strip_entry_ids(entries: &mut Vec<Value>) {
    entries.retain(|entry| entry.get(DESTROY_FIELD).is_none());
    for entry in entries.iter_mut().filter_map(Value::as_object_mut) {
        entry.remove("id");
    }
}

/// Result of diffing a keyed list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyedSublistDiff {
    /// Desired entries whose key does not exist yet.
    pub create: Vec<Record>,
    /// Desired entries whose key exists with different values.
    pub update: Vec<Record>,
    /// Keys of existing entries that are no longer wanted, sorted.
    pub delete: Vec<String>,
}

impl KeyedSublistDiff {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

/// Diffs a keyed list such as pipeline schedule variables.
///
/// # Errors
///
/// Returns a [`SubItemError`] when a desired entry lacks the key field or two
/// desired entries share a key.
pub fn diff_keyed(
    existing: &[Record],
    desired: &[Record],
    key_field: &str,
) -> Result<KeyedSublistDiff, SubItemError> {
    let mut current: HashMap<&str, &Record> = HashMap::new();
    for (index, entry) in existing.iter().enumerate() {
        if let Some(key) = read_str(entry, key_field, index)? {
            current.insert(key, entry);
        }
    }

    let mut diff = KeyedSublistDiff::default();
    let mut wanted = BTreeSet::new();

    for (index, entry) in desired.iter().enumerate() {
        let key = read_str(entry, key_field, index)?.ok_or_else(|| SubItemError {
            entry: index,
            field: key_field.to_string(),
            problem: FieldProblem::Missing,
        })?;
        if !wanted.insert(key) {
            return Err(SubItemError {
                entry: index,
                field: key_field.to_string(),
                problem: FieldProblem::Duplicate,
            });
        }

        let payload: Record = data_fields(entry)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        match current.get(key) {
            None => diff.create.push(payload),
            Some(existing) if !is_subset_of(&payload, existing, &[]) => diff.update.push(payload),
            Some(_) => {}
        }
    }

    let mut removed: Vec<String> = current
        .keys()
        .filter(|key| !wanted.contains(*key))
        .map(|key| key.to_string())
        .collect();
    removed.sort();
    diff.delete = removed;

    Ok(diff)
}

fn read_u64(entry: &Record, field: &str, index: usize) -> Result<Option<u64>, SubItemError> {
    optional_u64(entry, field).map_err(|problem| SubItemError {
        entry: index,
        field: field.to_string(),
        problem,
    })
}

fn read_str<'a>(entry: &'a Record, field: &str, index: usize) -> Result<Option<&'a str>, SubItemError> {
    optional_str(entry, field).map_err(|problem| SubItemError {
        entry: index,
        field: field.to_string(),
        problem,
    })
}
