//! In-memory GitLab API and reference documentation for orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use gitlab_client::{DocumentationFetcher, GitLabApi, ListPolicy};
use serde_json::{json, Value};

/// A GitLab API serving canned resources and recording every call.
///
/// Calls are recorded as `"<METHOD> <path>"`; lists are recorded as `LIST`.
#[derive(Default)]
pub(crate) struct MockGitLabApi {
    lists: HashMap<String, Vec<Value>>,
    documents: HashMap<String, Value>,
    forbidden: HashSet<String>,
    responses: HashMap<String, Value>,
    calls: Mutex<Vec<String>>,
    bodies: Mutex<Vec<(String, Value)>>,
}

impl MockGitLabApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Serves `items` (a JSON array) for a list request on `path`.
    pub(crate) fn with_list(mut self, path: &str, items: Value) -> Self {
        let items = items.as_array().cloned().unwrap_or_default();
        self.lists.insert(path.to_string(), items);
        self
    }

    /// Serves `document` for a GET request on `path`.
    pub(crate) fn with_document(mut self, path: &str, document: Value) -> Self {
        self.documents.insert(path.to_string(), document);
        self
    }

    /// Answers every request on `path` with 403.
    pub(crate) fn with_forbidden(mut self, path: &str) -> Self {
        self.forbidden.insert(path.to_string());
        self
    }

    /// Answers a mutation (`"POST <path>"`) with `response` instead of echoing the body.
    pub(crate) fn with_response(mut self, call: &str, response: Value) -> Self {
        self.responses.insert(call.to_string(), response);
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded POST, PUT, PATCH and DELETE calls, in order.
    pub(crate) fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("GET ") && !call.starts_with("LIST "))
            .collect()
    }

    /// Body of the last recorded call matching `call`.
    pub(crate) fn body(&self, call: &str) -> Option<Value> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(c, _)| c == call)
            .map(|(_, body)| body.clone())
    }

    fn record(&self, call: String, body: Option<&Value>) -> String {
        self.calls.lock().unwrap().push(call.clone());
        if let Some(body) = body {
            self.bodies.lock().unwrap().push((call.clone(), body.clone()));
        }
        call
    }

    fn check_access(&self, path: &str) -> gitlab_client::Result<()> {
        if self.forbidden.contains(path) {
            return Err(gitlab_client::Error::Forbidden {
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn respond(&self, call: String, path: &str, body: &Value) -> gitlab_client::Result<Value> {
        self.check_access(path)?;
        let call = self.record(call, Some(body));
        Ok(self
            .responses
            .get(&call)
            .cloned()
            .unwrap_or_else(|| body.clone()))
    }
}

#[async_trait]
impl GitLabApi for MockGitLabApi {
    async fn list(&self, path: &str, policy: ListPolicy) -> gitlab_client::Result<Vec<Value>> {
        self.record(format!("LIST {path}"), None);
        if self.forbidden.contains(path) && policy == ListPolicy::ForbiddenMeansDisabled {
            return Ok(Vec::new());
        }
        self.check_access(path)?;
        Ok(self.lists.get(path).cloned().unwrap_or_default())
    }

    async fn get(&self, path: &str) -> gitlab_client::Result<Option<Value>> {
        self.record(format!("GET {path}"), None);
        self.check_access(path)?;
        Ok(self.documents.get(path).cloned())
    }

    async fn post(&self, path: &str, body: &Value) -> gitlab_client::Result<Value> {
        self.respond(format!("POST {path}"), path, body)
    }

    async fn put(&self, path: &str, body: &Value) -> gitlab_client::Result<Value> {
        self.respond(format!("PUT {path}"), path, body)
    }

    async fn patch(&self, path: &str, body: &Value) -> gitlab_client::Result<Value> {
        self.respond(format!("PATCH {path}"), path, body)
    }

    async fn delete(&self, path: &str) -> gitlab_client::Result<()> {
        self.check_access(path)?;
        self.record(format!("DELETE {path}"), None);
        Ok(())
    }

    async fn upload_avatar(
        &self,
        path: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> gitlab_client::Result<Value> {
        let body = json!({"avatar": file_name, "size": bytes.len()});
        self.respond(format!("PUT {path}"), path, &body)
    }
}

/// Reference documentation for every section, with a trimmed field set.
pub(crate) struct MockDocs {
    files: HashMap<&'static str, String>,
}

impl MockDocs {
    pub(crate) fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(
            "projects.md",
            [
                table(
                    "Edit a project",
                    &["id", "name", "description", "visibility", "avatar", "container_expiration_policy_attributes"],
                ),
                table("Share a project with a group", &["id", "group_id", "group_access", "expires_at"]),
            ]
            .concat(),
        );
        files.insert(
            "labels.md",
            [
                table("Create a new label", &["id", "name", "color", "description", "priority"]),
                table(
                    "Edit an existing label",
                    &["id", "label_id", "new_name", "color", "description", "priority"],
                ),
            ]
            .concat(),
        );
        files.insert(
            "protected_branches.md",
            [
                table(
                    "Protect repository branches",
                    &["id", "name", "push_access_level", "allowed_to_push", "allowed_to_merge", "allowed_to_unprotect", "allow_force_push"],
                ),
                table(
                    "Update a protected branch",
                    &["id", "name", "allow_force_push", "allowed_to_push", "allowed_to_merge", "allowed_to_unprotect"],
                ),
            ]
            .concat(),
        );
        files.insert(
            "protected_tags.md",
            table("Protect repository tags", &["id", "name", "create_access_level", "allowed_to_create"]),
        );
        files.insert(
            "project_level_variables.md",
            [
                table(
                    "Create a variable",
                    &["id", "key", "value", "variable_type", "protected", "masked", "environment_scope"],
                ),
                table(
                    "Update a variable",
                    &["id", "key", "value", "variable_type", "protected", "masked", "environment_scope", "filter"],
                ),
            ]
            .concat(),
        );
        files.insert(
            "merge_request_approvals.md",
            [
                table("Change configuration", &["id", "reset_approvals_on_push", "merge_requests_author_approval"]),
                table(
                    "Create project-level rule",
                    &["id", "name", "approvals_required", "user_ids", "group_ids", "protected_branch_ids"],
                ),
                table(
                    "Update project-level rule",
                    &["id", "approval_rule_id", "name", "approvals_required", "user_ids", "group_ids", "protected_branch_ids"],
                ),
            ]
            .concat(),
        );
        files.insert(
            "project_push_rules.md",
            [
                table("Add a project push rule", &["id", "commit_message_regex", "deny_delete_tag"]),
                table("Edit project push rule", &["id", "commit_message_regex", "deny_delete_tag"]),
            ]
            .concat(),
        );
        files.insert(
            "pipeline_schedules.md",
            [
                table("Create a new pipeline schedule", &["id", "description", "ref", "cron", "active"]),
                table(
                    "Edit a pipeline schedule",
                    &["id", "pipeline_schedule_id", "description", "ref", "cron", "active"],
                ),
            ]
            .concat(),
        );
        Self { files }
    }
}

#[async_trait]
impl DocumentationFetcher for MockDocs {
    async fn fetch(&self, url: &str) -> gitlab_client::Result<String> {
        self.files
            .iter()
            .find(|(file, _)| url.ends_with(&format!("/{file}")))
            .map(|(_, text)| text.clone())
            .ok_or_else(|| gitlab_client::Error::NotFound {
                path: url.to_string(),
            })
    }
}

/// A documentation section with an attribute table listing `fields`.
pub(crate) fn table(heading: &str, fields: &[&str]) -> String {
    let mut text = format!(
        "## {heading}\n\n| Attribute | Type | Required | Description |\n|-----------|------|----------|-------------|\n"
    );
    for field in fields {
        let description = match *field {
            "id" => "The ID or URL-encoded path of the project.".to_string(),
            other => format!("The {other} of the resource."),
        };
        text.push_str(&format!("| `{field}` | string | No | {description} |\n"));
    }
    text.push('\n');
    text
}
