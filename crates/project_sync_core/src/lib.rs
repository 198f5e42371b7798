//! # Project Sync Core
//!
//! This crate holds the engine that reads the configuration of a GitLab
//! project into an editable document and brings a project in line with such
//! a document.
//!
//! ## Overview
//!
//! A run processes the managed sections (project settings, labels, protected
//! branches, variables, ...) one after another in a fixed order:
//!
//! 1. The editable fields of the section are derived from GitLab's REST API
//!    reference documentation ([`schema`]).
//! 2. Resources read from GitLab are projected onto those fields
//!    ([`projector`]).
//! 3. For writes, the desired items are matched against the existing ones by
//!    identity or natural key ([`reconciler`]), and embedded access-level and
//!    variable lists are diffed ([`sublist`]).
//! 4. The resulting plan is turned into API calls by the [`SyncManager`].
//!
//! ## Examples
//!
//! ```no_run
//! use gitlab_client::GitLabClient;
//! use project_sync_core::{DocsLocation, DocumentCodec, SyncManager, SyncOptions};
//! use secrecy::SecretString;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = GitLabClient::new(
//!     "https://gitlab.example.com",
//!     SecretString::from("glpat-example".to_string()),
//!     100,
//! )?;
//! let codec = DocumentCodec::default();
//! let mut manager = SyncManager::new(&client, &client, DocsLocation::default(), "group/app");
//!
//! let document = codec.parse("labels:\n- name: bug\n  color: '#d9534f'\n")?;
//! let report = manager.apply_document(&document, &SyncOptions::default()).await?;
//! println!("{} created, {} deleted", report.created(), report.deleted());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every operation returns a [`SyncResult`]. Input problems are detected
//! while planning a section, before any mutation is sent; remote failures
//! carry the purpose of the failed call.

pub mod codec;
pub mod document;
pub mod endpoints;
pub mod errors;
pub mod manager;
pub mod projector;
pub mod reconciler;
pub mod record;
pub mod schema;
pub mod secrets;
pub mod section;
pub mod sublist;
pub mod table;

mod apply;
mod fetch;

#[cfg(test)]
mod testing;

pub use codec::DocumentCodec;
pub use document::{has_sensitive_value, ConfigurationDocument, ForkTarget, SectionContent};
pub use endpoints::ProjectRef;
pub use errors::{
    DocumentError, FieldProblem, ProjectionError, ReconcileError, RemoteOperationError,
    SchemaError, SecretError, SyncError, SyncResult,
};
pub use fetch::FORK_DESCRIPTION;
pub use manager::{
    ApplyReport, FetchedDocument, SectionReport, SectionSnapshot, SyncManager, SyncOptions,
};
pub use reconciler::{reconcile, ReconciliationPlan};
pub use record::Record;
pub use schema::{DocsLocation, SchemaMap, SchemaProvider};
pub use secrets::{Decryption, SecretDecryptor, SopsDecryptor};
pub use section::{Identity, Section};
