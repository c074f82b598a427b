//! Backend server lifecycle and active-model bookkeeping.
//!
//! The supervisor spawns the server detached, records its pid so a later
//! run can stop it, and updates the active model after the external fetch
//! tool succeeds. It has no heartbeat: a server that crashes keeps its
//! record until the next `stop`. A recorded pid is also not checked against
//! OS pid reuse.

use thiserror::Error;

use crate::config::Config;
use crate::process::{ProcessControl, ProcessError, ServerCommand, SystemProcesses};
use crate::store::{ActiveModelStore, ServerHandleStore, StoreError};
use crate::tool::{ModelTool, ToolError};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tool(#[from] ToolError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    AlreadyRunning,
    Started { pid: u32 },
}

#[derive(Debug)]
pub enum StopOutcome {
    NothingToStop,
    Stopped { pid: u32 },
    /// Signal delivery failed. The stale record has been cleared anyway.
    SignalFailed { pid: u32, error: ProcessError },
}

/// Result of a download or delete through the fetch tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelChange {
    Applied { model: String },
    /// Tool exited non-zero. Nothing was changed.
    ToolFailed { model: String, diagnostics: String },
    NoActiveModel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub pid: Option<u32>,
    pub pid_alive: bool,
    pub listening: bool,
    pub active_model: Option<String>,
}

pub struct Supervisor<P = SystemProcesses> {
    processes: P,
    handle: ServerHandleStore,
    models: ActiveModelStore,
    server: ServerCommand,
    host: String,
}

impl Supervisor<SystemProcesses> {
    pub fn from_config(cfg: &Config) -> Self {
        Self::new(SystemProcesses, cfg)
    }
}

impl<P: ProcessControl> Supervisor<P> {
    pub fn new(processes: P, cfg: &Config) -> Self {
        Self {
            processes,
            handle: cfg.server_handle_store(),
            models: cfg.active_model_store(),
            server: cfg.server_command(),
            host: cfg.host.clone(),
        }
    }

    pub fn processes(&self) -> &P {
        &self.processes
    }

    pub fn models(&self) -> &ActiveModelStore {
        &self.models
    }

    pub fn handle(&self) -> &ServerHandleStore {
        &self.handle
    }

    pub fn is_listening(&self, port: u16) -> bool {
        self.processes.is_listening(&self.host, port)
    }

    /// Spawn the server unless something already listens on `port`.
    ///
    /// The pid is persisted before returning. If that write fails the new
    /// process is terminated again so it cannot leak.
    pub fn start(&self, port: u16) -> Result<StartOutcome, SupervisorError> {
        if self.is_listening(port) {
            tracing::info!("Port {port} already has a listener, not spawning");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let pid = self.processes.spawn(&self.server)?;
        if let Err(e) = self.handle.set(pid) {
            tracing::warn!("Could not record pid {pid}, terminating it: {e}");
            if let Err(kill_err) = self.processes.terminate(pid) {
                tracing::warn!("Failed to terminate unrecorded pid {pid}: {kill_err}");
            }
            return Err(e.into());
        }

        tracing::info!("Server started with pid {pid}");
        Ok(StartOutcome::Started { pid })
    }

    pub fn stop(&self) -> Result<StopOutcome, SupervisorError> {
        let Some(pid) = self.handle.get() else {
            return Ok(StopOutcome::NothingToStop);
        };

        let signalled = self.processes.terminate(pid);
        self.handle.clear()?;

        match signalled {
            Ok(()) => {
                tracing::info!("Sent SIGTERM to pid {pid}");
                Ok(StopOutcome::Stopped { pid })
            }
            Err(error) => {
                tracing::warn!("Dropped stale pid record {pid}: {error}");
                Ok(StopOutcome::SignalFailed { pid, error })
            }
        }
    }

    pub fn status(&self, port: u16) -> ServerStatus {
        let pid = self.handle.get();
        ServerStatus {
            pid,
            pid_alive: pid.is_some_and(|p| self.processes.is_alive(p)),
            listening: self.is_listening(port),
            active_model: self.models.get(),
        }
    }

    pub fn active_model(&self) -> Option<String> {
        self.models.get()
    }

    pub fn select_model(&self, name: &str) -> Result<(), SupervisorError> {
        self.models.set(name)?;
        Ok(())
    }

    /// Pull `name` and make it the active model if the tool succeeds.
    pub async fn download<T>(&self, tool: &T, name: &str) -> Result<ModelChange, SupervisorError>
    where
        T: ModelTool + ?Sized,
    {
        let model = name.trim().to_string();
        let output = tool.pull(&model).await?;
        if !output.success {
            return Ok(ModelChange::ToolFailed {
                model,
                diagnostics: output.stderr,
            });
        }
        self.models.set(&model)?;
        Ok(ModelChange::Applied { model })
    }

    /// Remove the active model and clear the selection if the tool succeeds.
    pub async fn delete<T>(&self, tool: &T) -> Result<ModelChange, SupervisorError>
    where
        T: ModelTool + ?Sized,
    {
        let Some(model) = self.models.get() else {
            return Ok(ModelChange::NoActiveModel);
        };
        let output = tool.remove(&model).await?;
        if !output.success {
            return Ok(ModelChange::ToolFailed {
                model,
                diagnostics: output.stderr,
            });
        }
        self.models.clear()?;
        Ok(ModelChange::Applied { model })
    }
}
