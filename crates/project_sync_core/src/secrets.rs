//! Decryption of configuration documents that hold managed secrets.
//!
//! Documents are encrypted with [SOPS](https://github.com/getsops/sops). An
//! encrypted document carries a top-level `sops` key with the encryption
//! metadata; documents without it are plain text and are used as they are.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::errors::SecretError;

#[cfg(test)]
#[path = "secrets_tests.rs"]
mod tests;

/// Top-level key SOPS stores its metadata under.
pub const SOPS_METADATA_KEY: &str = "sops";

/// Outcome of a decryption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decryption {
    /// The document held managed secrets; this is its plain text.
    Decrypted(String),
    /// The document holds no managed secrets and can be used as is.
    NoManagedSecrets,
}

/// Turns an encrypted configuration document into plain text.
#[async_trait]
pub trait SecretDecryptor: Send + Sync {
    async fn decrypt(&self, document: &str) -> Result<Decryption, SecretError>;
}

/// Decrypts documents by piping them through the `sops` command line tool.
#[derive(Debug, Clone)]
pub struct SopsDecryptor {
    program: String,
}

impl Default for SopsDecryptor {
    fn default() -> Self {
        Self::with_program("sops")
    }
}

impl SopsDecryptor {
    /// Uses `program` instead of `sops` from the `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl SecretDecryptor for SopsDecryptor {
    #[instrument(skip(self, document), fields(program = %self.program))]
    async fn decrypt(&self, document: &str) -> Result<Decryption, SecretError> {
        if !has_sops_metadata(document) {
            debug!("Document has no SOPS metadata");
            return Ok(Decryption::NoManagedSecrets);
        }

        let spawn_error = |source| SecretError::Spawn {
            program: self.program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .args([
                "--decrypt",
                "--input-type",
                "yaml",
                "--output-type",
                "yaml",
                "/dev/stdin",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        // Feed stdin from a separate task so a large output cannot block the write.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = document.as_bytes().to_vec();
            tokio::spawn(async move {
                let _ = stdin.write_all(&input).await;
            })
        });

        let output = child.wait_with_output().await.map_err(spawn_error)?;
        if let Some(writer) = writer {
            let _ = writer.await;
        }

        if !output.status.success() {
            return Err(SecretError::Failed {
                program: self.program.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8(output.stdout).map_err(|_| SecretError::InvalidUtf8)?;
        info!("Decrypted managed secrets");
        Ok(Decryption::Decrypted(text))
    }
}

/// Whether a YAML document carries SOPS metadata at its top level.
///
/// Text that is not a YAML mapping has no metadata; parse errors are left to
/// the document codec.
pub fn has_sops_metadata(document: &str) -> bool {
    match serde_yaml::from_str::<serde_yaml::Value>(document) {
        Ok(serde_yaml::Value::Mapping(mapping)) => mapping.contains_key(SOPS_METADATA_KEY),
        _ => false,
    }
}
