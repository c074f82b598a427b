//! The external model fetch/remove tool (`ollama pull` / `ollama rm`).

use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to run `{program}`: {source}")]
pub struct ToolError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// Exit status plus whatever the tool wrote to stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub stderr: String,
}

#[async_trait]
pub trait ModelTool: Send + Sync {
    async fn pull(&self, model: &str) -> Result<ToolOutput, ToolError>;
    async fn remove(&self, model: &str) -> Result<ToolOutput, ToolError>;
}

#[derive(Debug, Clone)]
pub struct OllamaTool {
    program: String,
}

impl OllamaTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, verb: &str, model: &str) -> Result<ToolOutput, ToolError> {
        tracing::info!("Running `{} {verb} {model}`", self.program);
        let output = tokio::process::Command::new(&self.program)
            .args([verb, model])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| ToolError {
                program: self.program.clone(),
                source,
            })?;

        tracing::debug!("`{} {verb}` exited with {}", self.program, output.status);
        Ok(ToolOutput {
            success: output.status.success(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[async_trait]
impl ModelTool for OllamaTool {
    async fn pull(&self, model: &str) -> Result<ToolOutput, ToolError> {
        self.run("pull", model).await
    }

    async fn remove(&self, model: &str) -> Result<ToolOutput, ToolError> {
        self.run("rm", model).await
    }
}
