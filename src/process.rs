use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;

const PROBE_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("could not signal process {pid}: {reason}")]
    Signal { pid: u32, reason: String },
}

/// Program and arguments used to launch the backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ServerCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

/// OS process operations the supervisor relies on.
///
/// [`SystemProcesses`] talks to the real OS; tests swap in a fake.
pub trait ProcessControl {
    /// True when something accepts connections on `host:port`. Never fails.
    fn is_listening(&self, host: &str, port: u16) -> bool;

    /// Launch `command` detached, with no console I/O, and return its pid.
    fn spawn(&self, command: &ServerCommand) -> Result<u32, ProcessError>;

    /// Ask `pid` to shut down gracefully (SIGTERM on unix).
    fn terminate(&self, pid: u32) -> Result<(), ProcessError>;

    fn is_alive(&self, pid: u32) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcesses;

impl ProcessControl for SystemProcesses {
    fn is_listening(&self, host: &str, port: u16) -> bool {
        let Ok(addrs) = (host, port).to_socket_addrs() else {
            return false;
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok())
    }

    fn spawn(&self, command: &ServerCommand) -> Result<u32, ProcessError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        // Own process group so Ctrl+C in the shell does not reach the server.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: command.program.clone(),
            source,
        })?;
        let pid = child.id();
        tracing::info!("Spawned `{}` as pid {pid}", command.program);

        // Reap the child if it exits while we are still running, otherwise
        // the zombie keeps accepting signals.
        let reaper = std::thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || {
                if let Ok(status) = child.wait() {
                    tracing::debug!("Server pid {pid} exited: {status}");
                }
            });
        if let Err(e) = reaper {
            tracing::debug!("Could not start reaper for pid {pid}: {e}");
        }

        Ok(pid)
    }

    fn terminate(&self, pid: u32) -> Result<(), ProcessError> {
        let pid_arg = pid.to_string();
        #[cfg(unix)]
        let output = Command::new("kill").args(["-TERM", pid_arg.as_str()]).output();
        #[cfg(not(unix))]
        let output = Command::new("taskkill").args(["/PID", pid_arg.as_str()]).output();

        let output = output.map_err(|e| ProcessError::Signal {
            pid,
            reason: e.to_string(),
        })?;

        if output.status.success() {
            Ok(())
        } else {
            let reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(ProcessError::Signal {
                pid,
                reason: if reason.is_empty() {
                    format!("kill exited with {}", output.status)
                } else {
                    reason
                },
            })
        }
    }

    fn is_alive(&self, pid: u32) -> bool {
        let pid_arg = pid.to_string();
        #[cfg(unix)]
        {
            Command::new("kill")
                .args(["-0", pid_arg.as_str()])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false)
        }
        #[cfg(not(unix))]
        {
            let filter = format!("PID eq {pid_arg}");
            Command::new("tasklist")
                .args(["/FI", filter.as_str(), "/NH"])
                .output()
                .map(|o| String::from_utf8_lossy(&o.stdout).contains(pid_arg.as_str()))
                .unwrap_or(false)
        }
    }
}
