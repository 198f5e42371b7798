//! Identity reconciliation of a desired list against GitLab's current list.
//!
//! [`reconcile`] is a pure function: it only decides which existing items are
//! deleted, which desired items update an existing item and which are created.
//! Applying the decisions is the orchestrator's job.
//!
//! Matching happens in two passes so that an explicit identity always wins
//! over a natural key match:
//!
//! 1. Every desired item carrying an identity that exists remotely claims it.
//!    Identities that do not exist remotely (copied from another project, or
//!    deleted since the document was written) are dropped.
//! 2. Every remaining item is looked up by its natural key. A hit claims the
//!    existing identity unless an earlier pass already claimed it.
//!
//! Everything that is not claimed is deleted, in identity order, before any
//! create or update runs.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};

use crate::errors::ReconcileError;
use crate::record::Record;
use crate::section::{Identity, IdentityRules, NaturalKey, Section, UpdateProtocol};

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;

/// Identities seen during one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySet {
    /// Identities currently present on GitLab.
    pub existing: BTreeSet<Identity>,
    /// Identities claimed by desired items after matching.
    pub wanted: BTreeSet<Identity>,
}

impl IdentitySet {
    /// `existing - wanted`, in ascending identity order.
    pub fn to_delete(&self) -> Vec<Identity> {
        self.existing.difference(&self.wanted).cloned().collect()
    }
}

/// What happens to one desired item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// No existing item matched; the item is created.
    Create,
    /// The item updates an existing item in place.
    Update {
        identity: Identity,
        existing_index: usize,
    },
    /// The existing item is deleted and the item is created in its place.
    Recreate {
        identity: Identity,
        existing_index: usize,
    },
}

/// A desired item together with the decision taken for it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedAction {
    /// Position of the item in the desired list.
    pub index: usize,
    /// The item, with its identity attached when one was resolved.
    pub record: Record,
    pub change: Change,
}

/// The outcome of reconciling one section.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationPlan {
    pub section: Section,
    pub identities: IdentitySet,
    /// Existing items to delete, sorted by identity. Applied first.
    pub deletions: Vec<Identity>,
    /// Creates and updates, in desired order. Applied after the deletions.
    pub actions: Vec<PlannedAction>,
}

impl ReconciliationPlan {
    /// Number of items that will be created.
    pub fn creates(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.change == Change::Create)
            .count()
    }

    /// Number of items matched to an existing item.
    pub fn matches(&self) -> usize {
        self.actions.len() - self.creates()
    }
}

/// Reconciles `desired` against `existing` for one section.
///
/// `existing` must contain the items as GitLab returned them (or canonicalized
/// by the projector); every one of them needs an identity.
///
/// # Errors
///
/// Returns a [`ReconcileError`] before deciding anything if any desired item
/// has a malformed identity or natural key, has neither, or collides with
/// another desired item.
pub fn reconcile(
    section: Section,
    rules: &IdentityRules,
    desired: Vec<Record>,
    existing: &[Record],
) -> Result<ReconciliationPlan, ReconcileError> {
    let mut existing_index: BTreeMap<Identity, usize> = BTreeMap::new();
    let mut by_natural_key: HashMap<NaturalKey, Identity> = HashMap::new();

    for (index, item) in existing.iter().enumerate() {
        let identity = rules
            .identity_of(item)
            .map_err(|(_, problem)| ReconcileError::MalformedExisting {
                section,
                index,
                problem,
            })?
            .ok_or(ReconcileError::MalformedExisting {
                section,
                index,
                problem: crate::errors::FieldProblem::Missing,
            })?;

        if existing_index.contains_key(&identity) {
            warn!(section = %section, identity = %identity, "GitLab returned the same item twice");
            continue;
        }
        existing_index.insert(identity.clone(), index);

        match rules.natural_key_of(item) {
            Ok(Some(key)) => {
                // Keep the lowest identity when GitLab holds duplicate keys.
                by_natural_key
                    .entry(key)
                    .and_modify(|current| {
                        if identity < *current {
                            *current = identity.clone();
                        }
                    })
                    .or_insert(identity);
            }
            Ok(None) => {}
            Err((field, problem)) => {
                warn!(section = %section, index = index, field = field.as_str(), problem = %problem, "Existing item has an unusable natural key");
            }
        }
    }

    let mut records = desired;
    let mut resolved: Vec<Option<Identity>> = vec![None; records.len()];
    let mut natural_keys: Vec<Option<NaturalKey>> = vec![None; records.len()];
    let mut claimed: BTreeMap<Identity, usize> = BTreeMap::new();
    let mut seen_keys: HashMap<NaturalKey, usize> = HashMap::new();

    // Pass 1: validate every item and honour explicit identities.
    for (index, record) in records.iter_mut().enumerate() {
        let identity = rules
            .identity_of(record)
            .map_err(|(field, problem)| ReconcileError::InvalidField {
                section,
                index,
                field,
                problem,
            })?;
        let natural_key = rules
            .natural_key_of(record)
            .map_err(|(field, problem)| ReconcileError::InvalidField {
                section,
                index,
                field,
                problem,
            })?;

        if let Some(key) = &natural_key {
            if let Some(first_index) = seen_keys.insert(key.clone(), index) {
                return Err(ReconcileError::DuplicateNaturalKey {
                    section,
                    first_index,
                    index,
                    key: key.to_string(),
                });
            }
        }

        match identity {
            Some(identity) if existing_index.contains_key(&identity) => {
                if let Some(first_index) = claimed.insert(identity.clone(), index) {
                    return Err(ReconcileError::DuplicateIdentity {
                        section,
                        first_index,
                        index,
                        identity: identity.to_string(),
                    });
                }
                resolved[index] = Some(identity);
            }
            Some(identity) => {
                if rules.has_detachable_identity() {
                    warn!(
                        section = %section,
                        index = index,
                        identity = %identity,
                        "Identity does not exist on GitLab, matching by natural key instead"
                    );
                    rules.detach_identity(record);
                }
                if natural_key.is_none() {
                    return Err(missing_natural_key(section, rules, index));
                }
            }
            None => {
                if natural_key.is_none() {
                    return Err(missing_natural_key(section, rules, index));
                }
            }
        }
        natural_keys[index] = natural_key;
    }

    // Pass 2: match the remaining items by natural key.
    for (index, record) in records.iter_mut().enumerate() {
        if resolved[index].is_some() {
            continue;
        }
        let Some(key) = &natural_keys[index] else {
            continue;
        };
        let Some(identity) = by_natural_key.get(key) else {
            debug!(section = %section, index = index, key = %key, "No existing item matches, will create");
            continue;
        };
        if let Some(owner) = claimed.get(identity) {
            debug!(
                section = %section,
                index = index,
                key = %key,
                claimed_by = *owner,
                "Matching item already claimed by an explicit identity, will create"
            );
            continue;
        }

        claimed.insert(identity.clone(), index);
        rules.attach_identity(record, identity);
        resolved[index] = Some(identity.clone());
    }

    let identities = IdentitySet {
        existing: existing_index.keys().cloned().collect(),
        wanted: claimed.keys().cloned().collect(),
    };
    let deletions = identities.to_delete();

    let actions = records
        .into_iter()
        .zip(resolved)
        .enumerate()
        .map(|(index, (record, identity))| {
            let change = match identity {
                None => Change::Create,
                Some(identity) => {
                    let existing_index = existing_index[&identity];
                    match rules.update {
                        UpdateProtocol::Patch => Change::Update {
                            identity,
                            existing_index,
                        },
                        UpdateProtocol::Recreate => Change::Recreate {
                            identity,
                            existing_index,
                        },
                    }
                }
            };
            PlannedAction {
                index,
                record,
                change,
            }
        })
        .collect();

    Ok(ReconciliationPlan {
        section,
        identities,
        deletions,
        actions,
    })
}

fn missing_natural_key(section: Section, rules: &IdentityRules, index: usize) -> ReconcileError {
    ReconcileError::MissingNaturalKey {
        section,
        index,
        field: rules.natural_key.first().copied().unwrap_or("name").to_string(),
    }
}
