//! Mock GitLab server helpers for command tests.

use project_sync_core::DocsLocation;
use secrecy::SecretString;
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::Settings;

pub(crate) const PROJECT: &str = "42";

/// Settings pointing both the API and the reference documentation at `server`.
pub(crate) fn settings_for(server: &MockServer) -> Settings {
    Settings {
        url: server.uri(),
        token: SecretString::from("glpat-test".to_string()),
        project: PROJECT.to_string(),
        docs: DocsLocation {
            base_url: server.uri(),
            reference: "master".to_string(),
        },
        comment_width: 80,
        page_size: 100,
    }
}

/// Serves the label reference documentation and `labels` as the project's labels.
pub(crate) async fn mount_labels(server: &MockServer, labels: Value) {
    let docs = [
        table("Create a new label", &["id", "name", "color", "description"]),
        table(
            "Edit an existing label",
            &["id", "label_id", "new_name", "color", "description"],
        ),
    ]
    .concat();

    Mock::given(method("GET"))
        .and(path("/-/raw/master/doc/api/labels.md"))
        .respond_with(ResponseTemplate::new(200).set_body_string(docs))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/v4/projects/{PROJECT}/labels")))
        .respond_with(ResponseTemplate::new(200).set_body_json(labels))
        .mount(server)
        .await;
}

/// Methods of every request the server received, in order.
pub(crate) async fn received_methods(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.method.to_string())
        .collect()
}

fn table(heading: &str, fields: &[&str]) -> String {
    let mut text = format!(
        "## {heading}\n\n| Attribute | Type | Required | Description |\n|-----------|------|----------|-------------|\n"
    );
    for field in fields {
        let description = match *field {
            "id" => "The ID or URL-encoded path of the project.".to_string(),
            other => format!("The {other} of the label."),
        };
        text.push_str(&format!("| `{field}` | string | No | {description} |\n"));
    }
    text.push('\n');
    text
}
