//! Bringing a project in line with a configuration document.
//!
//! Every section goes through the same stages: build the schema, restrict
//! the desired records to editable fields, read the existing state, plan,
//! and only then send mutations. Everything that can be rejected is
//! rejected during planning, so a malformed section never leaves a partial
//! change behind.

use std::path::{Path, PathBuf};

use gitlab_client::GitLabApi;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::document::{ConfigurationDocument, ForkTarget, SectionContent};
use crate::endpoints::project_path;
use crate::errors::{ReconcileError, RemoteOperationError, SyncError, SyncResult};
use crate::manager::{ApplyReport, SectionReport, SyncManager, SyncOptions};
use crate::projector::{canonicalize, canonicalize_list, retain_editable};
use crate::reconciler::{reconcile, Change, PlannedAction};
use crate::record::{is_subset_of, optional_records, strip_record_comments, Record};
use crate::section::{Identity, IdentityRules, Section, SublistKind};
use crate::sublist::{
    diff_access_levels, diff_keyed, strip_entry_ids, KeyedSublistDiff, SubItemError,
    ACCESS_LEVEL_FIELDS,
};

#[cfg(test)]
#[path = "apply_tests.rs"]
mod tests;

impl SyncManager<'_> {
    /// Applies every managed section of `document` covered by `options`.
    ///
    /// Sections absent from the document are not touched. In a dry run the
    /// full plan is built and every intended mutation is logged and counted,
    /// but nothing is sent.
    ///
    /// # Errors
    ///
    /// Stops at the first section that fails. Sections applied before it
    /// stay applied.
    #[instrument(skip(self, document, options), fields(project = %self.project.name(), dry_run = options.dry_run))]
    pub async fn apply_document(
        &mut self,
        document: &ConfigurationDocument,
        options: &SyncOptions,
    ) -> SyncResult<ApplyReport> {
        let mut report = ApplyReport::new(options.dry_run);

        for section in document.managed_sections() {
            if !options.includes(section) {
                continue;
            }
            let Some(content) = document.section(section) else {
                continue;
            };
            let section_report = self.apply_section(section, content, options.dry_run).await?;
            report.sections.push(section_report);
        }

        info!(
            created = report.created(),
            updated = report.updated(),
            deleted = report.deleted(),
            dry_run = options.dry_run,
            "Project configuration applied"
        );
        Ok(report)
    }

    /// Brings one section in line with `content`.
    #[instrument(skip(self, content), fields(section = %section))]
    pub async fn apply_section(
        &mut self,
        section: Section,
        content: SectionContent,
        dry_run: bool,
    ) -> SyncResult<SectionReport> {
        info!(section = %section, "Applying section");
        let mutator = Mutator {
            api: self.api,
            dry_run,
        };

        let report = match (section, content) {
            (Section::Project, SectionContent::Record(record)) => {
                self.apply_project(record, &mutator).await?
            }
            (Section::Avatar, SectionContent::Avatar(path)) => {
                self.apply_avatar(&path, &mutator).await?
            }
            (Section::ForkedFromProject, SectionContent::Fork(target)) => {
                self.apply_fork(&target, &mutator).await?
            }
            (Section::Approvals, SectionContent::Record(record)) => {
                self.apply_approvals(record, &mutator).await?
            }
            (Section::PushRules, SectionContent::Record(record)) => {
                self.apply_push_rules(record, &mutator).await?
            }
            (section, SectionContent::List(items)) if section.identity_rules().is_some() => {
                self.apply_list(section, items, &mutator).await?
            }
            (section, _) => {
                warn!(section = %section, "Section content has the wrong shape, skipping");
                SectionReport::new(section)
            }
        };

        info!(
            section = %section,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            unchanged = report.unchanged,
            "Section applied"
        );
        Ok(report)
    }

    async fn apply_project(&mut self, record: Record, mutator: &Mutator<'_>) -> SyncResult<SectionReport> {
        let section = Section::Project;
        let mut report = SectionReport::new(section);
        let desired = self.editable_record(section, record).await?;

        let mut existing = match self.project_resource().await? {
            Value::Object(existing) => existing,
            _ => Record::new(),
        };
        canonicalize(section, &mut existing);

        if is_subset_of(&desired, &existing, &[]) {
            report.unchanged += 1;
            return Ok(report);
        }

        mutator
            .put(self.project.path(), &Value::Object(desired), "update project settings")
            .await?;
        self.forget_project();
        report.updated += 1;
        Ok(report)
    }

    async fn apply_avatar(&mut self, path: &str, mutator: &Mutator<'_>) -> SyncResult<SectionReport> {
        let mut report = SectionReport::new(Section::Avatar);
        let bytes = tokio::fs::read(path).await.map_err(|source| SyncError::Avatar {
            path: PathBuf::from(path),
            source,
        })?;
        let file_name = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "avatar".to_string());

        debug!(file = file_name.as_str(), size = bytes.len(), "Uploading avatar");
        mutator
            .upload_avatar(self.project.path(), &file_name, bytes)
            .await?;
        self.forget_project();
        report.updated += 1;
        Ok(report)
    }

    async fn apply_fork(&mut self, target: &ForkTarget, mutator: &Mutator<'_>) -> SyncResult<SectionReport> {
        let mut report = SectionReport::new(Section::ForkedFromProject);

        let source_id = match target {
            ForkTarget::Id(id) => *id,
            ForkTarget::Path(path) => {
                let lookup = project_path(path);
                let purpose = || format!("failed to look up fork source project {path}");
                self.api
                    .get(&lookup)
                    .await
                    .map_err(|e| RemoteOperationError::new(purpose(), e))?
                    .and_then(|p| p.get("id").and_then(Value::as_u64))
                    .ok_or_else(|| {
                        RemoteOperationError::new(
                            purpose(),
                            gitlab_client::Error::NotFound { path: lookup.clone() },
                        )
                    })?
            }
        };

        let current = self
            .project_resource()
            .await?
            .get("forked_from_project")
            .and_then(|source| source.get("id"))
            .and_then(Value::as_u64);

        if current == Some(source_id) {
            report.unchanged += 1;
            return Ok(report);
        }
        if let Some(current) = current {
            mutator
                .delete(&self.project.fork(), &format!("remove fork relation to project {current}"))
                .await?;
            report.deleted += 1;
        }
        mutator
            .post(
                &self.project.fork_from(source_id),
                &Value::Null,
                &format!("create fork relation to project {target}"),
            )
            .await?;
        self.forget_project();
        report.created += 1;
        Ok(report)
    }

    async fn apply_approvals(&mut self, record: Record, mutator: &Mutator<'_>) -> SyncResult<SectionReport> {
        let section = Section::Approvals;
        let mut report = SectionReport::new(section);
        let desired = self.editable_record(section, record).await?;

        let path = self.project.approvals();
        let mut existing = match self.api.get(&path).await {
            Ok(Some(Value::Object(existing))) => existing,
            Ok(_) => Record::new(),
            Err(e) => {
                return Err(RemoteOperationError::new("failed to fetch approval configuration", e).into())
            }
        };
        canonicalize(section, &mut existing);

        if is_subset_of(&desired, &existing, &[]) {
            report.unchanged += 1;
            return Ok(report);
        }
        mutator
            .post(&path, &Value::Object(desired), "update approval configuration")
            .await?;
        report.updated += 1;
        Ok(report)
    }

    /// Applies push rules. An empty record removes the push rule.
    async fn apply_push_rules(&mut self, record: Record, mutator: &Mutator<'_>) -> SyncResult<SectionReport> {
        let section = Section::PushRules;
        let mut report = SectionReport::new(section);
        let desired = self.editable_record(section, record).await?;

        let path = self.project.push_rule();
        let existing = self
            .api
            .get(&path)
            .await
            .map_err(|e| RemoteOperationError::new("failed to fetch push rule", e))?;

        match existing {
            Some(_) if desired.is_empty() => {
                mutator.delete(&path, "delete push rule").await?;
                report.deleted += 1;
            }
            None if desired.is_empty() => report.unchanged += 1,
            None => {
                mutator
                    .post(&path, &Value::Object(desired), "create push rule")
                    .await?;
                report.created += 1;
            }
            Some(existing) => {
                let existing = existing.as_object().cloned().unwrap_or_default();
                if is_subset_of(&desired, &existing, &[]) {
                    report.unchanged += 1;
                } else {
                    mutator
                        .put(&path, &Value::Object(desired), "update push rule")
                        .await?;
                    report.updated += 1;
                }
            }
        }
        Ok(report)
    }

    async fn apply_list(
        &mut self,
        section: Section,
        items: Vec<Record>,
        mutator: &Mutator<'_>,
    ) -> SyncResult<SectionReport> {
        let mut report = SectionReport::new(section);
        let Some(rules) = section.identity_rules() else {
            return Ok(report);
        };

        let schema = self.schemas.schema(section).await?;
        let mut desired = items;
        for (index, record) in desired.iter_mut().enumerate() {
            strip_record_comments(record);
            let dropped = retain_editable(section, record, &schema, true);
            if !dropped.is_empty() {
                warn!(
                    section = %section,
                    index = index,
                    fields = ?dropped,
                    "Ignoring fields that cannot be edited"
                );
            }
        }

        let resources = self.list_resources(section).await?;
        let existing = canonicalize_list(section, resources)?;
        let plan = reconcile(section, &rules, desired, &existing)?;
        debug!(
            section = %section,
            creates = plan.creates(),
            matches = plan.matches(),
            deletions = plan.deletions.len(),
            "Reconciled section"
        );

        let steps = plan
            .actions
            .into_iter()
            .map(|action| plan_step(section, &rules, action, &existing))
            .collect::<Result<Vec<_>, _>>()?;

        for identity in &plan.deletions {
            mutator
                .delete(
                    &self.project.item(section, identity),
                    &format!("delete {} {identity}", section.item_name()),
                )
                .await?;
            report.deleted += 1;
        }

        for step in steps {
            self.run_step(section, step, mutator, &mut report).await?;
        }
        Ok(report)
    }

    async fn run_step(
        &self,
        section: Section,
        step: Step,
        mutator: &Mutator<'_>,
        report: &mut SectionReport,
    ) -> SyncResult<()> {
        let item = section.item_name();
        match step {
            Step::Unchanged { identity } => {
                debug!(section = %section, identity = %identity, "Item is up to date");
                report.unchanged += 1;
            }
            Step::Create { record, variables } => {
                let label = describe(&record);
                let created = mutator
                    .post(
                        &self.project.collection(section),
                        &Value::Object(record),
                        &format!("create {item} {label}"),
                    )
                    .await?;
                report.created += 1;

                if variables.is_empty() {
                    return Ok(());
                }
                let Some(id) = created.get("id").and_then(Value::as_u64) else {
                    if mutator.dry_run {
                        info!(count = variables.len(), "Would create pipeline schedule variables");
                        return Ok(());
                    }
                    let path = self.project.collection(section);
                    error!(path = path.as_str(), "Created pipeline schedule has no ID");
                    return Err(RemoteOperationError::new(
                        format!("failed to create {item} {label}"),
                        gitlab_client::Error::InvalidResponse {
                            path,
                            reason: "response has no 'id'".to_string(),
                        },
                    )
                    .into());
                };
                let diff = KeyedSublistDiff {
                    create: variables,
                    ..Default::default()
                };
                self.run_variable_diff(id, diff, mutator).await?;
            }
            Step::Update {
                identity,
                verb,
                payload,
                variables,
            } => {
                let path = self.project.item(section, &identity);
                if let Some(payload) = payload {
                    let action = format!("update {item} {identity}");
                    let body = Value::Object(payload);
                    match verb {
                        UpdateVerb::Put => mutator.put(&path, &body, &action).await?,
                        UpdateVerb::Patch => mutator.patch(&path, &body, &action).await?,
                    };
                }
                if let Identity::Id(id) = identity {
                    self.run_variable_diff(id, variables, mutator).await?;
                }
                report.updated += 1;
            }
            Step::Recreate { identity, record } => {
                mutator
                    .delete(
                        &self.project.item(section, &identity),
                        &format!("delete {item} {identity} before recreating it"),
                    )
                    .await?;
                mutator
                    .post(
                        &self.project.collection(section),
                        &Value::Object(record),
                        &format!("recreate {item} {identity}"),
                    )
                    .await?;
                report.updated += 1;
            }
        }
        Ok(())
    }

    /// Applies a pipeline schedule variable diff: deletions, then creates, then updates.
    async fn run_variable_diff(
        &self,
        schedule_id: u64,
        diff: KeyedSublistDiff,
        mutator: &Mutator<'_>,
    ) -> SyncResult<()> {
        for key in &diff.delete {
            mutator
                .delete(
                    &self.project.schedule_variable(schedule_id, Some(key)),
                    &format!("delete variable '{key}' of pipeline schedule id {schedule_id}"),
                )
                .await?;
        }
        for variable in diff.create {
            let key = describe(&variable);
            mutator
                .post(
                    &self.project.schedule_variable(schedule_id, None),
                    &Value::Object(variable),
                    &format!("create variable {key} of pipeline schedule id {schedule_id}"),
                )
                .await?;
        }
        for variable in diff.update {
            let key = variable.get("key").and_then(Value::as_str).unwrap_or_default().to_string();
            mutator
                .put(
                    &self.project.schedule_variable(schedule_id, Some(&key)),
                    &Value::Object(variable),
                    &format!("update variable '{key}' of pipeline schedule id {schedule_id}"),
                )
                .await?;
        }
        Ok(())
    }

    /// Restricts a single-record section to its editable fields.
    async fn editable_record(&mut self, section: Section, mut record: Record) -> SyncResult<Record> {
        let schema = self.schemas.schema(section).await?;
        strip_record_comments(&mut record);
        let dropped = retain_editable(section, &mut record, &schema, false);
        if !dropped.is_empty() {
            warn!(section = %section, fields = ?dropped, "Ignoring fields that cannot be edited");
        }
        Ok(record)
    }
}

/// A planned mutation of one desired item.
#[derive(Debug, Clone, PartialEq)]
enum Step {
    Create {
        record: Record,
        /// Pipeline schedule variables, created once the schedule exists.
        variables: Vec<Record>,
    },
    Update {
        identity: Identity,
        verb: UpdateVerb,
        /// `None` when only embedded variables change.
        payload: Option<Record>,
        variables: KeyedSublistDiff,
    },
    Recreate {
        identity: Identity,
        record: Record,
    },
    Unchanged {
        identity: Identity,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateVerb {
    Put,
    Patch,
}

/// Turns a reconciliation decision into the request(s) that carry it out.
fn plan_step(
    section: Section,
    rules: &IdentityRules,
    action: PlannedAction,
    existing: &[Record],
) -> Result<Step, ReconcileError> {
    let PlannedAction {
        index,
        mut record,
        change,
    } = action;

    match change {
        Change::Create => {
            strip_access_level_ids(&mut record);
            let variables = take_keyed_sublists(section, rules, index, &mut record)?;
            Ok(Step::Create { record, variables })
        }
        Change::Recreate {
            identity,
            existing_index,
        } => {
            strip_access_level_ids(&mut record);
            if is_subset_of(&record, &existing[existing_index], &[]) {
                Ok(Step::Unchanged { identity })
            } else {
                Ok(Step::Recreate { identity, record })
            }
        }
        Change::Update {
            identity,
            existing_index,
        } => plan_update(section, rules, index, record, identity, existing, existing_index),
    }
}

fn plan_update(
    section: Section,
    rules: &IdentityRules,
    index: usize,
    mut record: Record,
    identity: Identity,
    existing: &[Record],
    existing_index: usize,
) -> Result<Step, ReconcileError> {
    let existing = &existing[existing_index];
    let mut sublists_changed = false;
    let mut variables = KeyedSublistDiff::default();

    for rule in rules.sublists {
        let sub_error = |e: SubItemError| ReconcileError::InvalidSubItem {
            section,
            index,
            field: rule.field.to_string(),
            entry: e.entry,
            problem: e.problem,
        };
        let field_error = |problem| ReconcileError::InvalidField {
            section,
            index,
            field: rule.field.to_string(),
            problem,
        };
        let Some(desired) = optional_records(&record, rule.field).map_err(field_error)? else {
            continue;
        };
        let current = optional_records(existing, rule.field)
            .map_err(|problem| ReconcileError::MalformedExisting {
                section,
                index: existing_index,
                problem,
            })?
            .unwrap_or_default();

        match rule.kind {
            SublistKind::AccessLevels => {
                let diff = diff_access_levels(&current, desired).map_err(sub_error)?;
                sublists_changed |= !diff.is_noop();
                record.insert(rule.field.to_string(), Value::Array(diff.into_payload()));
            }
            SublistKind::Keyed(key) => {
                variables = diff_keyed(&current, &desired, key).map_err(sub_error)?;
                record.remove(rule.field);
            }
        }
    }

    let unchanged = !sublists_changed && is_subset_of(&record, existing, &[]);
    if unchanged && variables.is_empty() {
        return Ok(Step::Unchanged { identity });
    }

    let payload = (!unchanged).then(|| update_payload(section, rules, record, existing));
    let verb = match section {
        Section::ProtectedBranches => UpdateVerb::Patch,
        _ => UpdateVerb::Put,
    };
    Ok(Step::Update {
        identity,
        verb,
        payload,
        variables,
    })
}

/// The body of an update request. The identity travels in the path.
fn update_payload(section: Section, rules: &IdentityRules, mut record: Record, existing: &Record) -> Record {
    match section {
        Section::Labels => {
            record.remove("id");
            if let Some(name) = record.remove("name") {
                if existing.get("name") != Some(&name) {
                    record.insert("new_name".to_string(), name);
                }
            }
        }
        Section::ProtectedBranches => {
            record.remove("name");
        }
        _ => {
            rules.detach_identity(&mut record);
        }
    }
    record
}

/// Removes sub-item IDs so a create request does not reference entries of
/// another item.
fn strip_access_level_ids(record: &mut Record) {
    for field in ACCESS_LEVEL_FIELDS {
        if let Some(Value::Array(entries)) = record.get_mut(field) {
            strip_entry_ids(entries);
        }
    }
}

/// Takes keyed sub-lists out of a record that is about to be created.
fn take_keyed_sublists(
    section: Section,
    rules: &IdentityRules,
    index: usize,
    record: &mut Record,
) -> Result<Vec<Record>, ReconcileError> {
    let mut taken = Vec::new();
    for rule in rules.sublists {
        let SublistKind::Keyed(_) = rule.kind else {
            continue;
        };
        let entries = optional_records(record, rule.field).map_err(|problem| {
            ReconcileError::InvalidField {
                section,
                index,
                field: rule.field.to_string(),
                problem,
            }
        })?;
        record.remove(rule.field);
        taken.extend(entries.unwrap_or_default());
    }
    Ok(taken)
}

/// Short label of a record for log and error messages.
fn describe(record: &Record) -> String {
    ["name", "key", "description", "group_id"]
        .iter()
        .find_map(|field| record.get(*field).filter(|v| !v.is_null()))
        .map(|value| match value {
            Value::String(s) => format!("'{s}'"),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

/// Sends mutations, or only logs them in a dry run.
struct Mutator<'a> {
    api: &'a dyn GitLabApi,
    dry_run: bool,
}

impl Mutator<'_> {
    async fn post(&self, path: &str, body: &Value, action: &str) -> SyncResult<Value> {
        if self.skip("POST", path, action) {
            return Ok(Value::Null);
        }
        finish(self.api.post(path, body).await, path, action)
    }

    async fn put(&self, path: &str, body: &Value, action: &str) -> SyncResult<Value> {
        if self.skip("PUT", path, action) {
            return Ok(Value::Null);
        }
        finish(self.api.put(path, body).await, path, action)
    }

    async fn patch(&self, path: &str, body: &Value, action: &str) -> SyncResult<Value> {
        if self.skip("PATCH", path, action) {
            return Ok(Value::Null);
        }
        finish(self.api.patch(path, body).await, path, action)
    }

    async fn delete(&self, path: &str, action: &str) -> SyncResult<()> {
        if self.skip("DELETE", path, action) {
            return Ok(());
        }
        finish(self.api.delete(path).await, path, action)
    }

    async fn upload_avatar(&self, path: &str, file_name: &str, bytes: Vec<u8>) -> SyncResult<Value> {
        let action = format!("upload avatar {file_name}");
        if self.skip("PUT", path, &action) {
            return Ok(Value::Null);
        }
        finish(
            self.api.upload_avatar(path, file_name, bytes).await,
            path,
            &action,
        )
    }

    /// Logs the mutation. Returns true when it must not be sent.
    fn skip(&self, method: &str, path: &str, action: &str) -> bool {
        if self.dry_run {
            info!(method = method, path = path, "Would {action}");
        } else {
            info!(method = method, path = path, "{}", capitalize(action));
        }
        self.dry_run
    }
}

fn finish<T>(result: gitlab_client::Result<T>, path: &str, action: &str) -> SyncResult<T> {
    result.map_err(|e| {
        error!(path = path, error = %e, "Request failed");
        RemoteOperationError::new(format!("failed to {action}"), e).into()
    })
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
