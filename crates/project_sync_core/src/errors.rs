//! Sync engine error types.
//!
//! Every failure of a get or set run is one of the categories below. None of
//! them is retried by the engine: input errors abort the section before any
//! remote mutation, and remote errors stop the run where they happen.

use std::path::PathBuf;

use thiserror::Error;

use crate::section::Section;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// The reference documentation did not have the expected shape.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Heading '{heading}' not found in the reference documentation for {section}")]
    HeadingNotFound { section: Section, heading: String },

    #[error("No attribute table found under heading '{heading}' for {section}")]
    TableNotFound { section: Section, heading: String },

    #[error("Table under heading '{heading}' for {section} has columns {found:?}, expected [Attribute, Type, Required, Description]")]
    UnexpectedColumns {
        section: Section,
        heading: String,
        found: Vec<String>,
    },

    #[error("Row {row} of table '{heading}' for {section} has {cells} cells, expected 4")]
    MalformedRow {
        section: Section,
        heading: String,
        row: usize,
        cells: usize,
    },

    #[error("Field '{field}' appears more than once in table '{heading}' for {section}")]
    DuplicateField {
        section: Section,
        heading: String,
        field: String,
    },

    #[error("{section} has no reference documentation")]
    NoSchema { section: Section },
}

/// A record is missing a field required downstream, or the field has the wrong type.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{section}{}: field '{field}' {problem}", display_index(.index))]
pub struct ProjectionError {
    pub section: Section,
    pub index: Option<usize>,
    pub field: String,
    pub problem: FieldProblem,
}

/// What is wrong with a field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    #[error("is missing")]
    Missing,

    #[error("is duplicated")]
    Duplicate,

    #[error("has type {found}, expected {expected}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },
}

/// The desired list for a section cannot be matched against the remote state.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("{section} item {index}: field '{field}' {problem}")]
    InvalidField {
        section: Section,
        index: usize,
        field: String,
        problem: FieldProblem,
    },

    #[error("{section} item {index} has neither an identity nor the '{field}' field needed to match it")]
    MissingNaturalKey {
        section: Section,
        index: usize,
        field: String,
    },

    #[error("{section} items {first_index} and {index} both refer to {identity}")]
    DuplicateIdentity {
        section: Section,
        first_index: usize,
        index: usize,
        identity: String,
    },

    #[error("{section} items {first_index} and {index} share the key {key}")]
    DuplicateNaturalKey {
        section: Section,
        first_index: usize,
        index: usize,
        key: String,
    },

    #[error("{section} item {index}: entry {entry} of '{field}' {problem}")]
    InvalidSubItem {
        section: Section,
        index: usize,
        field: String,
        entry: usize,
        problem: FieldProblem,
    },

    #[error("Existing {section} item {index} returned by GitLab has no usable identity: {problem}")]
    MalformedExisting {
        section: Section,
        index: usize,
        problem: FieldProblem,
    },
}

/// A call to GitLab failed. `purpose` describes what the call was for.
#[derive(Error, Debug)]
#[error("{purpose}")]
pub struct RemoteOperationError {
    pub purpose: String,
    #[source]
    pub source: gitlab_client::Error,
}

impl RemoteOperationError {
    pub fn new(purpose: impl Into<String>, source: gitlab_client::Error) -> Self {
        Self {
            purpose: purpose.into(),
            source,
        }
    }
}

/// The configuration document could not be parsed or rendered.
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to parse configuration document: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("Failed to render configuration document: {0}")]
    Render(#[source] serde_json::Error),

    #[error("Configuration document root must be a mapping")]
    NotAMapping,
}

/// Decrypting managed secrets failed.
#[derive(Error, Debug)]
pub enum SecretError {
    #[error("Failed to run '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' failed to decrypt the document: {stderr}")]
    Failed { program: String, stderr: String },

    #[error("Decrypted document is not valid UTF-8")]
    InvalidUtf8,
}

/// Any failure of a get or set run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Remote(#[from] RemoteOperationError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Secret(#[from] SecretError),

    #[error("Failed to read avatar file '{path}'")]
    Avatar {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

fn display_index(index: &Option<usize>) -> String {
    match index {
        Some(i) => format!(" item {i}"),
        None => String::new(),
    }
}
