//! Collaborator backed by an external command.
//!
//! The serialized [`GenerationCall`] is written to the command's stdin and its
//! stdout is taken as the reply. At most `max_processes` commands run at once.
//! The child is killed when the call future is dropped, so a caller-side
//! timeout frees the process slot immediately.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::debug;

use super::{GenerationCall, TextGenerator};
use crate::error::CollaboratorError;

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: PathBuf,
    args: Vec<String>,
    processes: Arc<Semaphore>,
}

impl CommandGenerator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            processes: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Caps concurrently running commands; clamped to at least one.
    pub fn with_max_processes(mut self, limit: usize) -> Self {
        self.processes = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Process slots free right now.
    pub fn available_processes(&self) -> usize {
        self.processes.available_permits()
    }

    fn backend_error(&self, what: &str, err: impl std::fmt::Display) -> CollaboratorError {
        CollaboratorError::Backend(format!("{} {}: {err}", self.program.display(), what))
    }
}

#[async_trait]
impl TextGenerator for CommandGenerator {
    async fn invoke(&self, call: &GenerationCall) -> Result<String, CollaboratorError> {
        let payload = serde_json::to_vec(call)
            .map_err(|e| CollaboratorError::Backend(format!("failed to encode call: {e}")))?;
        let _slot = self
            .processes
            .acquire()
            .await
            .map_err(|e| CollaboratorError::WorkerPool(e.to_string()))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.backend_error("failed to start", e))?;
        debug!(template = %call.template_id, program = %self.program.display(), "Started backend");

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.backend_error("has no stdin", "pipe missing"))?;
        // Feed stdin while output is drained, so a streaming backend never
        // blocks on a full pipe.
        let feed = async move {
            let written = stdin.write_all(&payload).await;
            drop(stdin);
            written
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| self.backend_error("failed to finish", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::Backend(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        // A backend may legitimately answer without reading all of stdin.
        if let Err(e) = written {
            debug!(error = %e, "Backend closed stdin early");
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            return Err(CollaboratorError::EmptyResponse);
        }
        Ok(stdout)
    }
}
