//! Managed configuration sections and the identity rules of their items.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::FieldProblem;
use crate::record::{optional_str, optional_u64, scalar_text, Record};

#[cfg(test)]
#[path = "section_tests.rs"]
mod tests;

/// One independently managed configuration category.
///
/// The declaration order is the order sections are read and applied in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Project,
    Avatar,
    SharedWithGroups,
    ForkedFromProject,
    Labels,
    ProtectedBranches,
    ProtectedTags,
    Variables,
    Approvals,
    ApprovalRules,
    PushRules,
    PipelineSchedules,
}

impl Section {
    /// Every section, in application order.
    pub const ALL: [Section; 12] = [
        Section::Project,
        Section::Avatar,
        Section::SharedWithGroups,
        Section::ForkedFromProject,
        Section::Labels,
        Section::ProtectedBranches,
        Section::ProtectedTags,
        Section::Variables,
        Section::Approvals,
        Section::ApprovalRules,
        Section::PushRules,
        Section::PipelineSchedules,
    ];

    /// The key of this section in the configuration document.
    pub fn key(self) -> &'static str {
        match self {
            Section::Project => "project",
            Section::Avatar => "avatar",
            Section::SharedWithGroups => "shared_with_groups",
            Section::ForkedFromProject => "forked_from_project",
            Section::Labels => "labels",
            Section::ProtectedBranches => "protected_branches",
            Section::ProtectedTags => "protected_tags",
            Section::Variables => "variables",
            Section::Approvals => "approvals",
            Section::ApprovalRules => "approval_rules",
            Section::PushRules => "push_rules",
            Section::PipelineSchedules => "pipeline_schedules",
        }
    }

    /// Human readable name of a single item, used in progress and error messages.
    pub fn item_name(self) -> &'static str {
        match self {
            Section::Project => "project",
            Section::Avatar => "avatar",
            Section::SharedWithGroups => "shared group",
            Section::ForkedFromProject => "fork relation",
            Section::Labels => "label",
            Section::ProtectedBranches => "protected branch",
            Section::ProtectedTags => "protected tag",
            Section::Variables => "variable",
            Section::Approvals => "approval configuration",
            Section::ApprovalRules => "approval rule",
            Section::PushRules => "push rule",
            Section::PipelineSchedules => "pipeline schedule",
        }
    }

    /// Identity rules for list sections, `None` for record and scalar sections.
    pub fn identity_rules(self) -> Option<IdentityRules> {
        let rules = match self {
            Section::Labels => IdentityRules {
                identity: IdentityShape::Numeric("id"),
                natural_key: &["name"],
                update: UpdateProtocol::Patch,
                sublists: &[],
            },
            Section::ProtectedBranches => IdentityRules {
                identity: IdentityShape::Name("name"),
                natural_key: &["name"],
                update: UpdateProtocol::Patch,
                sublists: BRANCH_SUBLISTS,
            },
            Section::ProtectedTags => IdentityRules {
                identity: IdentityShape::Name("name"),
                natural_key: &["name"],
                update: UpdateProtocol::Recreate,
                sublists: &[],
            },
            Section::Variables => IdentityRules {
                identity: IdentityShape::Scoped {
                    key: "key",
                    scope: "environment_scope",
                },
                natural_key: &["key", "environment_scope"],
                update: UpdateProtocol::Patch,
                sublists: &[],
            },
            Section::ApprovalRules => IdentityRules {
                identity: IdentityShape::Numeric("id"),
                natural_key: &["name"],
                update: UpdateProtocol::Patch,
                sublists: &[],
            },
            Section::PipelineSchedules => IdentityRules {
                identity: IdentityShape::Numeric("id"),
                natural_key: &["description"],
                update: UpdateProtocol::Patch,
                sublists: SCHEDULE_SUBLISTS,
            },
            Section::SharedWithGroups => IdentityRules {
                identity: IdentityShape::Numeric("group_id"),
                natural_key: &["group_id"],
                update: UpdateProtocol::Recreate,
                sublists: &[],
            },
            _ => return None,
        };
        Some(rules)
    }

    /// Whether items of this section can hold values that should not be stored in plain text.
    pub fn may_hold_secrets(self) -> bool {
        matches!(self, Section::Variables | Section::PipelineSchedules)
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Environment scope GitLab assigns when none is given.
pub const DEFAULT_ENVIRONMENT_SCOPE: &str = "*";

/// The remote-assigned key addressing one resource instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identity {
    /// An opaque numeric ID.
    Id(u64),
    /// A name, for resources GitLab addresses by name (branches, tags).
    Name(String),
    /// A key scoped to an environment (CI/CD variables).
    Scoped { key: String, scope: String },
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Id(id) => write!(f, "id {id}"),
            Identity::Name(name) => write!(f, "'{name}'"),
            Identity::Scoped { key, scope } => write!(f, "'{key}' (scope '{scope}')"),
        }
    }
}

/// A human-meaningful key used to match items that carry no identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey(pub Vec<String>);

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'", self.0.join("' / '"))
    }
}

/// Where an item's identity lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityShape {
    /// A numeric ID field that is separate from the natural key.
    Numeric(&'static str),
    /// The name field doubles as the identity.
    Name(&'static str),
    /// A key field plus an environment scope field that defaults to `*`.
    Scoped {
        key: &'static str,
        scope: &'static str,
    },
}

/// How an identity-matched item is brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateProtocol {
    /// The API has an update verb for the item.
    Patch,
    /// The item has to be deleted and created again.
    Recreate,
}

/// How an embedded collection is diffed during an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SublistKind {
    /// Access-level entries matched by tier, user, group or deploy key,
    /// removed with `_destroy` sentinels.
    AccessLevels,
    /// Entries matched by a key field and updated through their own endpoints.
    Keyed(&'static str),
}

/// An embedded collection of a list item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SublistRule {
    pub field: &'static str,
    pub kind: SublistKind,
}

impl SublistRule {
    const fn access_levels(field: &'static str) -> Self {
        Self {
            field,
            kind: SublistKind::AccessLevels,
        }
    }
}

const BRANCH_SUBLISTS: &[SublistRule] = &[
    SublistRule::access_levels("allowed_to_push"),
    SublistRule::access_levels("allowed_to_merge"),
    SublistRule::access_levels("allowed_to_unprotect"),
];

const SCHEDULE_SUBLISTS: &[SublistRule] = &[SublistRule {
    field: "variables",
    kind: SublistKind::Keyed("key"),
}];

/// Identity and matching rules for the items of one list section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityRules {
    pub identity: IdentityShape,
    pub natural_key: &'static [&'static str],
    pub update: UpdateProtocol,
    pub sublists: &'static [SublistRule],
}

impl IdentityRules {
    /// Field names that make up the identity.
    pub fn identity_fields(&self) -> Vec<&'static str> {
        match self.identity {
            IdentityShape::Numeric(field) | IdentityShape::Name(field) => vec![field],
            IdentityShape::Scoped { key, scope } => vec![key, scope],
        }
    }

    /// Whether the identity is a separate field that can be stripped when stale.
    ///
    /// A numeric identity that is also the natural key (shared groups are
    /// keyed by `group_id`) names the item to create and is never stripped.
    pub fn has_detachable_identity(&self) -> bool {
        match self.identity {
            IdentityShape::Numeric(field) => !self.natural_key.contains(&field),
            _ => false,
        }
    }

    /// Reads the identity carried by a record, if any.
    ///
    /// On error the offending field name is returned with the problem.
    pub fn identity_of(&self, record: &Record) -> Result<Option<Identity>, (String, FieldProblem)> {
        match self.identity {
            IdentityShape::Numeric(field) => optional_u64(record, field)
                .map(|id| id.map(Identity::Id))
                .map_err(|p| (field.to_string(), p)),
            IdentityShape::Name(field) => optional_str(record, field)
                .map(|name| name.map(|n| Identity::Name(n.to_string())))
                .map_err(|p| (field.to_string(), p)),
            IdentityShape::Scoped { key, scope } => {
                let key_value = optional_str(record, key).map_err(|p| (key.to_string(), p))?;
                let scope_value = optional_str(record, scope).map_err(|p| (scope.to_string(), p))?;
                Ok(key_value.map(|k| Identity::Scoped {
                    key: k.to_string(),
                    scope: scope_value.unwrap_or(DEFAULT_ENVIRONMENT_SCOPE).to_string(),
                }))
            }
        }
    }

    /// Reads the natural key of a record. `None` when the first key field is absent.
    pub fn natural_key_of(&self, record: &Record) -> Result<Option<NaturalKey>, (String, FieldProblem)> {
        let mut parts = Vec::with_capacity(self.natural_key.len());
        for (position, field) in self.natural_key.iter().enumerate() {
            match record.get(*field) {
                None | Some(serde_json::Value::Null) => {
                    if position == 0 {
                        return Ok(None);
                    }
                    // Secondary key parts fall back to GitLab's default.
                    parts.push(DEFAULT_ENVIRONMENT_SCOPE.to_string());
                }
                Some(value) => match scalar_text(value) {
                    Some(text) => parts.push(text),
                    None => {
                        return Err((
                            field.to_string(),
                            FieldProblem::WrongType {
                                expected: "scalar",
                                found: crate::record::type_name(value),
                            },
                        ))
                    }
                },
            }
        }
        Ok(Some(NaturalKey(parts)))
    }

    /// Writes an identity into a record's identity field(s).
    pub fn attach_identity(&self, record: &mut Record, identity: &Identity) {
        match (self.identity, identity) {
            (IdentityShape::Numeric(field), Identity::Id(id)) => {
                record.insert(field.to_string(), (*id).into());
            }
            (IdentityShape::Name(field), Identity::Name(name)) => {
                record.insert(field.to_string(), name.clone().into());
            }
            (IdentityShape::Scoped { key, scope }, Identity::Scoped { key: k, scope: s }) => {
                record.insert(key.to_string(), k.clone().into());
                record.insert(scope.to_string(), s.clone().into());
            }
            _ => {}
        }
    }

    /// Removes a detachable identity field from a record.
    pub fn detach_identity(&self, record: &mut Record) {
        if !self.has_detachable_identity() {
            return;
        }
        if let IdentityShape::Numeric(field) = self.identity {
            record.remove(field);
        }
    }
}
