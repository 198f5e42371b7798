//! REST paths of the resources managed per section.

use gitlab_client::{encode_path_segment, ListPolicy};

use crate::section::{Identity, Section};

#[cfg(test)]
#[path = "endpoints_tests.rs"]
mod tests;

/// The project being synchronized, addressed by numeric ID or full path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    name: String,
    base: String,
}

impl ProjectRef {
    /// Accepts a numeric ID (`42`) or a full path (`group/subgroup/project`).
    pub fn new(project: &str) -> Self {
        let project = project.trim().trim_matches('/');
        Self {
            name: project.to_string(),
            base: format!("projects/{}", encode_path_segment(project)),
        }
    }

    /// The project as given by the user.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the project itself, for example `projects/group%2Fproject`.
    pub fn path(&self) -> &str {
        &self.base
    }

    /// Path of a resource below the project.
    pub fn resource(&self, suffix: &str) -> String {
        format!("{}/{}", self.base, suffix)
    }

    /// Path items of a list section are listed from and created at.
    ///
    /// Shared groups are listed as part of the project and created through
    /// the `share` endpoint.
    pub fn collection(&self, section: Section) -> String {
        self.resource(collection_suffix(section))
    }

    /// Path of one existing item of a list section.
    pub fn item(&self, section: Section, identity: &Identity) -> String {
        let collection = self.collection(section);
        match identity {
            Identity::Id(id) => format!("{collection}/{id}"),
            Identity::Name(name) => format!("{collection}/{}", encode_path_segment(name)),
            Identity::Scoped { key, scope } => format!(
                "{collection}/{}?filter[environment_scope]={}",
                encode_path_segment(key),
                encode_path_segment(scope)
            ),
        }
    }

    /// Path of one variable of a pipeline schedule, or of the collection when `key` is `None`.
    pub fn schedule_variable(&self, schedule_id: u64, key: Option<&str>) -> String {
        let collection = self.resource(&format!("pipeline_schedules/{schedule_id}/variables"));
        match key {
            Some(key) => format!("{collection}/{}", encode_path_segment(key)),
            None => collection,
        }
    }

    pub fn approvals(&self) -> String {
        self.resource("approvals")
    }

    pub fn push_rule(&self) -> String {
        self.resource("push_rule")
    }

    /// Path of the fork relation.
    pub fn fork(&self) -> String {
        self.resource("fork")
    }

    /// Path that creates a fork relation to `source_id`.
    pub fn fork_from(&self, source_id: u64) -> String {
        self.resource(&format!("fork/{source_id}"))
    }
}

fn collection_suffix(section: Section) -> &'static str {
    match section {
        Section::SharedWithGroups => "share",
        Section::Labels => "labels",
        Section::ProtectedBranches => "protected_branches",
        Section::ProtectedTags => "protected_tags",
        Section::Variables => "variables",
        Section::ApprovalRules => "approval_rules",
        Section::PipelineSchedules => "pipeline_schedules",
        Section::Approvals => "approvals",
        Section::PushRules => "push_rule",
        Section::Project | Section::Avatar | Section::ForkedFromProject => "",
    }
}

/// How listing a section treats a 403.
///
/// Approval rules need a paid tier and pipeline schedules need CI/CD to be
/// enabled; for those a forbidden first page means the feature is off.
pub fn list_policy(section: Section) -> ListPolicy {
    match section {
        Section::ApprovalRules | Section::PipelineSchedules => ListPolicy::ForbiddenMeansDisabled,
        _ => ListPolicy::Strict,
    }
}

/// Path of another project, used to look up a fork source by full path.
pub fn project_path(project: &str) -> String {
    format!("projects/{}", encode_path_segment(project.trim_matches('/')))
}
