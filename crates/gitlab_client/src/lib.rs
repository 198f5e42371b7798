//! Crate for interacting with the GitLab REST API.
//!
//! This crate provides a client for making authenticated requests to GitLab
//! using a personal, group or project access token. It deliberately exposes a
//! small, JSON-shaped surface: callers address resources by their API path and
//! exchange `serde_json::Value` documents, because the set of fields GitLab
//! accepts evolves independently of this crate.

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

pub mod errors;
pub use errors::{Error, Result};

// Reference the tests module in the separate file
#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Default number of items requested per page when listing resources.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// How a list request should treat a 403 response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPolicy {
    /// Any error status is fatal.
    Strict,

    /// A 403 on the first page means the feature is disabled for the project
    /// and yields an empty list. A 403 on any later page is still fatal.
    ForbiddenMeansDisabled,
}

/// Operations against the GitLab REST API used by the sync engine.
///
/// Paths are relative to the `/api/v4/` root, for example
/// `projects/42/labels`. Implementations must not retry mutations on their own.
#[async_trait]
pub trait GitLabApi: Send + Sync {
    /// Lists every item of a collection, following pagination until exhausted.
    async fn list(&self, path: &str, policy: ListPolicy) -> Result<Vec<Value>>;

    /// Fetches a single document. Returns `None` for a 404 or a `null` body.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    /// Sends a POST request with a JSON body.
    async fn post(&self, path: &str, body: &Value) -> Result<Value>;

    /// Sends a PUT request with a JSON body.
    async fn put(&self, path: &str, body: &Value) -> Result<Value>;

    /// Sends a PATCH request with a JSON body.
    async fn patch(&self, path: &str, body: &Value) -> Result<Value>;

    /// Sends a DELETE request.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Uploads a file as the `avatar` field of a multipart PUT request.
    async fn upload_avatar(&self, path: &str, file_name: &str, bytes: Vec<u8>) -> Result<Value>;
}

/// Source of the reference documentation that field schemas are derived from.
#[async_trait]
pub trait DocumentationFetcher: Send + Sync {
    /// Fetches the raw text of the document at `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// A client for interacting with the GitLab API, authenticated with an access token.
#[derive(Debug)]
pub struct GitLabClient {
    http: reqwest::Client,
    api_url: Url,
    token: SecretString,
    page_size: u32,
}

impl GitLabClient {
    /// Creates a new `GitLabClient`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The GitLab instance URL, for example `https://gitlab.com`.
    /// * `token` - The access token sent in the `PRIVATE-TOKEN` header.
    /// * `page_size` - Number of items requested per page when listing.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if `base_url` cannot be parsed, or
    /// `Error::Http` if the HTTP client cannot be built.
    ///
    /// # Example
    ///
    /// ```rust
    /// use gitlab_client::GitLabClient;
    /// use secrecy::SecretString;
    ///
    /// let client = GitLabClient::new(
    ///     "https://gitlab.example.com",
    ///     SecretString::from("glpat-example".to_string()),
    ///     50,
    /// )
    /// .unwrap();
    /// assert_eq!(client.api_url().as_str(), "https://gitlab.example.com/api/v4/");
    /// ```
    pub fn new(base_url: &str, token: SecretString, page_size: u32) -> Result<Self> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push_str("/api/v4/");
        let api_url = Url::parse(&base).map_err(|e| Error::InvalidUrl {
            url: base.clone(),
            reason: e.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("project-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_url,
            token,
            page_size: page_size.max(1),
        })
    }

    /// Returns the API root every request path is resolved against.
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::InvalidUrl {
                url: format!("{}{}", self.api_url, path),
                reason: e.to_string(),
            })
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("PRIVATE-TOKEN", self.token.expose_secret())
    }

    async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path)?;
        debug!(method = %method, path = path, "Sending request");

        let response = self.request(method.clone(), url).json(body).send().await?;
        let response = check_status(&method, path, response).await?;

        read_json(response).await.map(|v| v.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl GitLabApi for GitLabClient {
    #[instrument(skip(self), fields(path = %path))]
    async fn list(&self, path: &str, policy: ListPolicy) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let url = self.url(path)?;
            let response = self
                .request(Method::GET, url)
                .query(&[("page", page), ("per_page", self.page_size)])
                .send()
                .await?;

            if response.status() == StatusCode::FORBIDDEN
                && page == 1
                && policy == ListPolicy::ForbiddenMeansDisabled
            {
                warn!(
                    path = path,
                    "Listing is forbidden, treating the feature as disabled"
                );
                return Ok(Vec::new());
            }

            let response = check_status(&Method::GET, path, response).await?;
            let has_next = next_page_hint(response.headers());

            let batch = match read_json(response).await? {
                Some(Value::Array(batch)) => batch,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    error!(path = path, "List endpoint did not return an array");
                    return Err(Error::InvalidResponse {
                        path: path.to_string(),
                        reason: format!("expected a JSON array, got {}", type_name(&other)),
                    });
                }
            };

            let count = batch.len();
            items.extend(batch);
            debug!(path = path, page = page, count = count, "Retrieved page");

            let more = match has_next {
                Some(next) => next,
                None => count as u32 >= self.page_size,
            };
            if !more || count == 0 {
                break;
            }
            page += 1;
        }

        info!(path = path, count = items.len(), "Listed resources");
        Ok(items)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let url = self.url(path)?;
        let response = self.request(Method::GET, url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(path = path, "Resource not found");
            return Ok(None);
        }

        let response = check_status(&Method::GET, path, response).await?;
        match read_json(response).await? {
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(value)),
        }
    }

    #[instrument(skip(self, body), fields(path = %path))]
    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.send_json(Method::POST, path, body).await
    }

    #[instrument(skip(self, body), fields(path = %path))]
    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.send_json(Method::PUT, path, body).await
    }

    #[instrument(skip(self, body), fields(path = %path))]
    async fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        self.send_json(Method::PATCH, path, body).await
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.url(path)?;
        let response = self.request(Method::DELETE, url).send().await?;
        check_status(&Method::DELETE, path, response).await?;
        Ok(())
    }

    #[instrument(skip(self, bytes), fields(path = %path, size = bytes.len()))]
    async fn upload_avatar(&self, path: &str, file_name: &str, bytes: Vec<u8>) -> Result<Value> {
        let url = self.url(path)?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("avatar", part);

        let response = self.request(Method::PUT, url).multipart(form).send().await?;
        let response = check_status(&Method::PUT, path, response).await?;
        read_json(response).await.map(|v| v.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl DocumentationFetcher for GitLabClient {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let response = self.http.get(parsed).send().await?;
        let response = check_status(&Method::GET, url, response).await?;
        let text = response.text().await?;

        debug!(url = url, length = text.len(), "Fetched reference documentation");
        Ok(text)
    }
}

/// Percent-encodes a single path segment such as a project path, a branch
/// name or a variable key.
///
/// # Example
///
/// ```rust
/// use gitlab_client::encode_path_segment;
///
/// assert_eq!(encode_path_segment("group/sub project"), "group%2Fsub%20project");
/// assert_eq!(encode_path_segment("release-1.0_x~"), "release-1.0_x~");
/// ```
pub fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

async fn check_status(method: &Method, path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::FORBIDDEN => Err(Error::Forbidden {
            path: path.to_string(),
        }),
        StatusCode::NOT_FOUND => Err(Error::NotFound {
            path: path.to_string(),
        }),
        _ => {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            error!(
                method = %method,
                path = path,
                status = status.as_u16(),
                error_message = message.as_str(),
                "Received an error from GitLab"
            );
            Err(Error::Status {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Extracts the human readable part of a GitLab error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("message")
            .or_else(|| map.get("error"))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| body.to_string()),
        _ => body.to_string(),
    }
}

async fn read_json(response: Response) -> Result<Option<Value>> {
    let bytes = response.bytes().await?;
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Interprets the `x-next-page` header. `None` when the server did not send it.
fn next_page_hint(headers: &HeaderMap) -> Option<bool> {
    headers
        .get("x-next-page")
        .and_then(|v| v.to_str().ok())
        .map(|v| !v.trim().is_empty())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
