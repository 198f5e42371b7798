//! Reading the current configuration of a project.

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::document::{has_sensitive_value, ForkTarget, SectionContent};
use crate::endpoints::list_policy;
use crate::errors::{RemoteOperationError, SyncResult};
use crate::manager::{FetchedDocument, SectionSnapshot, SyncManager, SyncOptions};
use crate::projector::{project, project_list};
use crate::section::{Identity, Section};

#[cfg(test)]
#[path = "fetch_tests.rs"]
mod tests;

/// Description of the fork relation section.
pub const FORK_DESCRIPTION: &str = "ID or full path of the project this project is forked from. \
Setting it creates the fork relation, replacing any existing one.";

impl SyncManager<'_> {
    /// Reads every section covered by `options` into a configuration document.
    ///
    /// Sections that GitLab does not offer for the project (for example
    /// approvals on a tier without them) are left out of the document.
    ///
    /// # Errors
    ///
    /// Stops at the first section that cannot be read.
    #[instrument(skip(self, options), fields(project = %self.project.name()))]
    pub async fn fetch_document(&mut self, options: &SyncOptions) -> SyncResult<FetchedDocument> {
        let mut fetched = FetchedDocument::default();

        for section in Section::ALL {
            if !options.includes(section) {
                continue;
            }
            let Some(snapshot) = self.fetch_section(section).await? else {
                continue;
            };

            if snapshot.has_sensitive_value {
                fetched.sensitive_sections.push(section);
            }
            if !snapshot.description.is_empty() {
                fetched.descriptions.insert(section, snapshot.description);
            }
            fetched.document.set_section(section, snapshot.content);
        }

        info!(
            sections = fetched.document.managed_sections().len(),
            sensitive = fetched.has_sensitive_value(),
            "Fetched project configuration"
        );
        Ok(fetched)
    }

    /// Reads one section. Returns `None` for sections that are not emitted.
    ///
    /// The avatar is never emitted: GitLab only exposes it as a URL, which
    /// cannot be written back.
    #[instrument(skip(self), fields(section = %section))]
    pub async fn fetch_section(&mut self, section: Section) -> SyncResult<Option<SectionSnapshot>> {
        info!(section = %section, "Fetching section");

        match section {
            Section::Avatar => Ok(None),
            Section::ForkedFromProject => self.fetch_fork().await,
            Section::Project => {
                let schema = self.schemas.schema(section).await?;
                let resource = self.project_resource().await?;
                let record = project(section, None, resource, &schema, false)?;
                Ok(Some(SectionSnapshot {
                    content: SectionContent::Record(record),
                    description: schema.describe(),
                    has_sensitive_value: false,
                }))
            }
            Section::Approvals | Section::PushRules => {
                let schema = self.schemas.schema(section).await?;
                let path = match section {
                    Section::Approvals => self.project.approvals(),
                    _ => self.project.push_rule(),
                };
                let resource = match self.api.get(&path).await {
                    Ok(resource) => resource,
                    Err(e) if e.is_forbidden() => {
                        warn!(section = %section, "Section is not available for this project, skipping");
                        return Ok(None);
                    }
                    Err(e) => {
                        return Err(RemoteOperationError::new(
                            format!("failed to fetch {}", section.item_name()),
                            e,
                        )
                        .into())
                    }
                };
                // A project without a push rule reads as an empty record.
                let resource = resource.unwrap_or_else(|| Value::Object(Default::default()));
                let record = project(section, None, resource, &schema, false)?;
                Ok(Some(SectionSnapshot {
                    content: SectionContent::Record(record),
                    description: schema.describe(),
                    has_sensitive_value: false,
                }))
            }
            _ => {
                let schema = self.schemas.schema(section).await?;
                let resources = self.list_resources(section).await?;
                let items = project_list(section, resources, &schema, true)?;
                let has_sensitive_value = has_sensitive_value(section, &items);
                info!(section = %section, count = items.len(), "Fetched items");
                Ok(Some(SectionSnapshot {
                    content: SectionContent::List(items),
                    description: schema.describe(),
                    has_sensitive_value,
                }))
            }
        }
    }

    /// Lists the raw resources of a list section.
    ///
    /// Shared groups are part of the project resource. Pipeline schedules are
    /// listed without their variables, so each one is fetched individually.
    pub(crate) async fn list_resources(&mut self, section: Section) -> SyncResult<Vec<Value>> {
        if section == Section::SharedWithGroups {
            let resource = self.project_resource().await?;
            return Ok(match resource.get("shared_with_groups") {
                Some(Value::Array(groups)) => groups.clone(),
                _ => Vec::new(),
            });
        }

        let path = self.project.collection(section);
        let mut resources = self
            .api
            .list(&path, list_policy(section))
            .await
            .map_err(|e| RemoteOperationError::new(format!("failed to list {section}"), e))?;

        if section == Section::PipelineSchedules {
            for resource in resources.iter_mut() {
                let Some(id) = resource.get("id").and_then(Value::as_u64) else {
                    continue;
                };
                let item = self.project.item(section, &Identity::Id(id));
                let detail = self.api.get(&item).await.map_err(|e| {
                    RemoteOperationError::new(format!("failed to fetch pipeline schedule id {id}"), e)
                })?;
                if let Some(detail) = detail {
                    *resource = detail;
                }
            }
        }

        Ok(resources)
    }

    async fn fetch_fork(&mut self) -> SyncResult<Option<SectionSnapshot>> {
        let resource = self.project_resource().await?;
        let Some(source) = resource.get("forked_from_project").filter(|v| !v.is_null()) else {
            return Ok(None);
        };

        let target = match (
            source.get("path_with_namespace").and_then(Value::as_str),
            source.get("id").and_then(Value::as_u64),
        ) {
            (Some(path), _) => ForkTarget::Path(path.to_string()),
            (None, Some(id)) => ForkTarget::Id(id),
            (None, None) => {
                warn!("Fork source has neither a path nor an ID, skipping");
                return Ok(None);
            }
        };

        Ok(Some(SectionSnapshot {
            content: SectionContent::Fork(target),
            description: FORK_DESCRIPTION.to_string(),
            has_sensitive_value: false,
        }))
    }
}
