//! The configuration document edited by users.
//!
//! Every section is optional. A section that is absent (or `null`) is not
//! managed at all; a section that is present but empty is managed and brings
//! GitLab to the empty state, for example deleting every label.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{normalize_numbers, strip_record_comments, Record};
use crate::section::Section;

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;

/// Fields whose values are treated as secrets.
const SENSITIVE_FIELDS: [&str; 1] = ["value"];

/// The project a fork relation points to, by ID or by full path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForkTarget {
    Id(u64),
    Path(String),
}

impl fmt::Display for ForkTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForkTarget::Id(id) => write!(f, "{id}"),
            ForkTarget::Path(path) => f.write_str(path),
        }
    }
}

/// The content of one section.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionContent {
    /// A single record (project attributes, approvals, push rules).
    Record(Record),
    /// A list of items (labels, variables, ...).
    List(Vec<Record>),
    /// Path of the avatar image file.
    Avatar(String),
    /// The project this project is forked from.
    Fork(ForkTarget),
}

/// The root of a configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Record>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_with_groups: Option<Vec<Record>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_from_project: Option<ForkTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<Record>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected_branches: Option<Vec<Record>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protected_tags: Option<Vec<Record>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<Record>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approvals: Option<Record>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_rules: Option<Vec<Record>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_rules: Option<Record>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline_schedules: Option<Vec<Record>>,
}

impl ConfigurationDocument {
    /// Returns the content of a section, `None` when the section is not managed.
    pub fn section(&self, section: Section) -> Option<SectionContent> {
        match section {
            Section::Project => self.project.clone().map(SectionContent::Record),
            Section::Avatar => self.avatar.clone().map(SectionContent::Avatar),
            Section::ForkedFromProject => self.forked_from_project.clone().map(SectionContent::Fork),
            Section::Approvals => self.approvals.clone().map(SectionContent::Record),
            Section::PushRules => self.push_rules.clone().map(SectionContent::Record),
            _ => self.list(section).map(|items| SectionContent::List(items.clone())),
        }
    }

    /// Stores the content of a section. Content of the wrong kind is ignored.
    pub fn set_section(&mut self, section: Section, content: SectionContent) {
        match (section, content) {
            (Section::Project, SectionContent::Record(r)) => self.project = Some(r),
            (Section::Avatar, SectionContent::Avatar(path)) => self.avatar = Some(path),
            (Section::ForkedFromProject, SectionContent::Fork(target)) => {
                self.forked_from_project = Some(target)
            }
            (Section::Approvals, SectionContent::Record(r)) => self.approvals = Some(r),
            (Section::PushRules, SectionContent::Record(r)) => self.push_rules = Some(r),
            (section, SectionContent::List(items)) => {
                if let Some(slot) = self.list_slot(section) {
                    *slot = Some(items);
                }
            }
            _ => {}
        }
    }

    /// Whether the document manages a section.
    pub fn is_managed(&self, section: Section) -> bool {
        match section {
            Section::Project => self.project.is_some(),
            Section::Avatar => self.avatar.is_some(),
            Section::ForkedFromProject => self.forked_from_project.is_some(),
            Section::Approvals => self.approvals.is_some(),
            Section::PushRules => self.push_rules.is_some(),
            _ => self.list(section).is_some(),
        }
    }

    /// The managed sections, in application order.
    pub fn managed_sections(&self) -> Vec<Section> {
        Section::ALL
            .into_iter()
            .filter(|s| self.is_managed(*s))
            .collect()
    }

    /// Calls `f` for every record of every managed section.
    pub fn for_each_record_mut(&mut self, mut f: impl FnMut(Section, &mut Record)) {
        let singles = [
            (Section::Project, &mut self.project),
            (Section::Approvals, &mut self.approvals),
            (Section::PushRules, &mut self.push_rules),
        ];
        for (section, record) in singles {
            if let Some(record) = record {
                f(section, record);
            }
        }

        let lists = [
            (Section::SharedWithGroups, &mut self.shared_with_groups),
            (Section::Labels, &mut self.labels),
            (Section::ProtectedBranches, &mut self.protected_branches),
            (Section::ProtectedTags, &mut self.protected_tags),
            (Section::Variables, &mut self.variables),
            (Section::ApprovalRules, &mut self.approval_rules),
            (Section::PipelineSchedules, &mut self.pipeline_schedules),
        ];
        for (section, items) in lists {
            for record in items.iter_mut().flatten() {
                f(section, record);
            }
        }
    }

    /// Removes every `comment:` annotation from the document.
    pub fn strip_comments(&mut self) {
        self.for_each_record_mut(|_, record| strip_record_comments(record));
    }

    /// Converts whole floating point numbers to integers throughout the document.
    pub fn normalize_numbers(&mut self) {
        self.for_each_record_mut(|_, record| {
            record.values_mut().for_each(normalize_numbers);
        });
    }

    fn list(&self, section: Section) -> Option<&Vec<Record>> {
        match section {
            Section::SharedWithGroups => self.shared_with_groups.as_ref(),
            Section::Labels => self.labels.as_ref(),
            Section::ProtectedBranches => self.protected_branches.as_ref(),
            Section::ProtectedTags => self.protected_tags.as_ref(),
            Section::Variables => self.variables.as_ref(),
            Section::ApprovalRules => self.approval_rules.as_ref(),
            Section::PipelineSchedules => self.pipeline_schedules.as_ref(),
            _ => None,
        }
    }

    fn list_slot(&mut self, section: Section) -> Option<&mut Option<Vec<Record>>> {
        match section {
            Section::SharedWithGroups => Some(&mut self.shared_with_groups),
            Section::Labels => Some(&mut self.labels),
            Section::ProtectedBranches => Some(&mut self.protected_branches),
            Section::ProtectedTags => Some(&mut self.protected_tags),
            Section::Variables => Some(&mut self.variables),
            Section::ApprovalRules => Some(&mut self.approval_rules),
            Section::PipelineSchedules => Some(&mut self.pipeline_schedules),
            _ => None,
        }
    }
}

/// Whether a section's items hold a value that should not be stored in plain text.
///
/// Variable values and pipeline schedule variable values count; empty
/// values do not.
pub fn has_sensitive_value(section: Section, items: &[Record]) -> bool {
    if !section.may_hold_secrets() {
        return false;
    }
    items.iter().any(|item| match section {
        Section::PipelineSchedules => match item.get("variables") {
            Some(Value::Array(variables)) => variables
                .iter()
                .filter_map(Value::as_object)
                .any(holds_secret),
            _ => false,
        },
        _ => holds_secret(item),
    })
}

fn holds_secret(record: &Record) -> bool {
    SENSITIVE_FIELDS.iter().any(|field| match record.get(*field) {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    })
}
