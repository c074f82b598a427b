use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::process::ServerCommand;
use crate::store::{ActiveModelStore, ServerHandleStore};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "laisis.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host the backend server listens on
    pub host: String,

    /// Port of the backend's HTTP API
    pub port: u16,

    /// Executable launched by `start ollama`
    pub server_bin: String,

    pub server_args: Vec<String>,

    /// Executable used for `pull` / `rm`
    pub tool_bin: String,

    /// Directory holding the pid and active-model records
    pub state_dir: PathBuf,

    pub pid_file: String,

    pub active_model_file: String,

    /// Used by `ask` when no model is active
    pub fallback_model: String,

    /// Prompt sent by `start model <port>`
    pub probe_prompt: String,

    /// Overall request timeout in seconds, 0 disables it
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            server_bin: "ollama".to_string(),
            server_args: vec!["serve".to_string()],
            tool_bin: "ollama".to_string(),
            state_dir: PathBuf::from("."),
            pid_file: ".ollama.pid".to_string(),
            active_model_file: ".laisis_active_model".to_string(),
            fallback_model: "mistral".to_string(),
            probe_prompt: "Say READY".to_string(),
            request_timeout_secs: 0,
        }
    }
}

impl Config {
    /// Load `path`, or `laisis.toml` from the working directory if it exists.
    ///
    /// An explicit path must exist; the implicit one falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !path.exists() {
            if required {
                anyhow::bail!("Config file {} not found", path.display());
            }
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn pid_path(&self) -> PathBuf {
        self.state_dir.join(&self.pid_file)
    }

    pub fn active_model_path(&self) -> PathBuf {
        self.state_dir.join(&self.active_model_file)
    }

    pub fn server_handle_store(&self) -> ServerHandleStore {
        ServerHandleStore::new(self.pid_path())
    }

    pub fn active_model_store(&self) -> ActiveModelStore {
        ActiveModelStore::new(self.active_model_path())
    }

    pub fn server_command(&self) -> ServerCommand {
        ServerCommand::new(&self.server_bin, &self.server_args)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    /// Base URL of the backend on `port`.
    pub fn backend_url(&self, port: u16) -> String {
        format!("http://{}:{port}", self.host)
    }
}
