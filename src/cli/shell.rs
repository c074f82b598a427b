//! The `>>` command shell.
//!
//! Keywords are case-insensitive, model names and prompts keep their case.
//! Every operation reports its own failure as a line of output; only `exit`
//! or end of input leaves the loop.

use std::io::Write;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::cli::status;
use crate::client::{Backend, ClientError, ERROR_ANSWER, GenerateClient, Laisis};
use crate::config::Config;
use crate::process::{ProcessControl, SystemProcesses};
use crate::progress::Spinner;
use crate::session::ChatSession;
use crate::supervisor::{ModelChange, StartOutcome, StopOutcome, Supervisor, SupervisorError};
use crate::tool::{ModelTool, OllamaTool};

pub const INSTALL_URL: &str = "https://ollama.com/download";

const BANNER: &str = "\
LAISIS - Local AI Software Integration System
Commands: install ollama, start ollama, stop ollama
          download model <name>, use model <name>, delete model
          start model <port>, stop model, chat model
          ask <prompt>, status, help, exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    InstallServer,
    StartServer,
    StopServer,
    DownloadModel(String),
    DeleteModel,
    UseModel(String),
    /// One-shot readiness prompt against the given port
    StartModel(u16),
    StopModel,
    ChatModel,
    Ask(String),
    Status,
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Unknown command.")]
    Unknown,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<ShellCommand>, ParseError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    let head = words[0].to_ascii_lowercase();
    let second = words.get(1).map(|w| w.to_ascii_lowercase());
    let exact = |n: usize| words.len() == n;

    let command = match (head.as_str(), second.as_deref()) {
        ("install", Some("ollama")) if exact(2) => ShellCommand::InstallServer,
        ("start", Some("ollama")) if exact(2) => ShellCommand::StartServer,
        ("stop", Some("ollama")) if exact(2) => ShellCommand::StopServer,
        ("download", Some("model")) => match words.get(2) {
            Some(name) => ShellCommand::DownloadModel(name.to_string()),
            None => return Err(ParseError::Usage("download model <name>")),
        },
        ("use", Some("model")) => match words.get(2) {
            Some(name) => ShellCommand::UseModel(name.to_string()),
            None => return Err(ParseError::Usage("use model <name>")),
        },
        ("delete", Some("model")) if exact(2) => ShellCommand::DeleteModel,
        ("start", Some("model")) => match words.get(2) {
            Some(port) if exact(3) && port.bytes().all(|b| b.is_ascii_digit()) => {
                match port.parse::<u16>() {
                    Ok(port) if port > 0 => ShellCommand::StartModel(port),
                    _ => return Err(ParseError::Usage("start model <port>")),
                }
            }
            _ => return Err(ParseError::Usage("start model <port>")),
        },
        ("stop", Some("model")) if exact(2) => ShellCommand::StopModel,
        ("chat", Some("model")) if exact(2) => ShellCommand::ChatModel,
        ("ask", Some(_)) => ShellCommand::Ask(trimmed[words[0].len()..].trim().to_string()),
        ("ask", None) => return Err(ParseError::Usage("ask <prompt>")),
        ("status", None) => ShellCommand::Status,
        ("help", None) => ShellCommand::Help,
        ("exit", None) => ShellCommand::Exit,
        _ => return Err(ParseError::Unknown),
    };
    Ok(Some(command))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Builds a backend client for a port.
pub type Connector = Box<dyn Fn(u16) -> Result<Box<dyn Backend>, ClientError> + Send + Sync>;

pub struct Shell<P = SystemProcesses, T = OllamaTool> {
    port: u16,
    probe_prompt: String,
    fallback_model: String,
    supervisor: Supervisor<P>,
    tool: T,
    connect: Connector,
    show_progress: bool,
}

impl Shell {
    pub fn from_config(cfg: &Config) -> Self {
        let client_cfg = cfg.clone();
        let connect: Connector = Box::new(move |port| {
            let client = GenerateClient::from_config(&client_cfg, port)?;
            Ok(Box::new(client) as Box<dyn Backend>)
        });
        Self::new(
            cfg,
            Supervisor::from_config(cfg),
            OllamaTool::new(&cfg.tool_bin),
            connect,
        )
        .with_progress(true)
    }
}

impl<P: ProcessControl, T: ModelTool> Shell<P, T> {
    pub fn new(cfg: &Config, supervisor: Supervisor<P>, tool: T, connect: Connector) -> Self {
        Self {
            port: cfg.port,
            probe_prompt: cfg.probe_prompt.clone(),
            fallback_model: cfg.fallback_model.clone(),
            supervisor,
            tool,
            connect,
            show_progress: false,
        }
    }

    /// Draw a spinner on stdout while downloads run. Nothing is drawn
    /// when stdout is not a terminal.
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn supervisor(&self) -> &Supervisor<P> {
        &self.supervisor
    }

    /// Read, dispatch and print until `exit` or end of input.
    pub async fn run<R, W>(&self, input: &mut R, out: &mut W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        writeln!(out, "{BANNER}")?;

        let mut line = String::new();
        loop {
            write!(out, ">> ")?;
            out.flush()?;

            line.clear();
            if input.read_line(&mut line).await? == 0 {
                writeln!(out)?;
                break;
            }

            match parse(&line) {
                Ok(None) => {}
                Ok(Some(command)) => {
                    if self.execute(command, input, out).await? == Flow::Exit {
                        break;
                    }
                }
                Err(e) => writeln!(out, "[ERROR] {e}")?,
            }
        }
        Ok(())
    }

    /// Run one command. `input` is only read by `chat model`.
    pub async fn execute<R, W>(
        &self,
        command: ShellCommand,
        input: &mut R,
        out: &mut W,
    ) -> std::io::Result<Flow>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        tracing::debug!("Executing {command:?}");
        match command {
            ShellCommand::InstallServer => {
                writeln!(out, "[INFO] Please install Ollama manually from {INSTALL_URL}")?
            }
            ShellCommand::StartServer => self.start_server(out)?,
            ShellCommand::StopServer => self.stop_server(out)?,
            ShellCommand::DownloadModel(name) => self.download(&name, out).await?,
            ShellCommand::DeleteModel => self.delete(out).await?,
            ShellCommand::UseModel(name) => match self.supervisor.select_model(&name) {
                Ok(()) => writeln!(out, "[✓] Model '{name}' set as active.")?,
                Err(e) => writeln!(out, "[✗] Failed to select model: {e}")?,
            },
            ShellCommand::StartModel(port) => self.probe(port, out).await?,
            ShellCommand::StopModel => {
                writeln!(out, "[INFO] To stop the model, stopping Ollama server...")?;
                self.stop_server(out)?;
            }
            ShellCommand::ChatModel => self.chat(input, out).await?,
            ShellCommand::Ask(prompt) => self.ask(&prompt, out).await?,
            ShellCommand::Status => {
                status::render(&self.supervisor.status(self.port), self.port, out)?
            }
            ShellCommand::Help => writeln!(out, "{BANNER}")?,
            ShellCommand::Exit => {
                writeln!(out, "Exiting LAISIS.")?;
                return Ok(Flow::Exit);
            }
        }
        Ok(Flow::Continue)
    }

    fn start_server<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match self.supervisor.start(self.port) {
            Ok(StartOutcome::Started { pid }) => {
                writeln!(out, "[INFO] Starting Ollama server...")?;
                writeln!(out, "[✓] Ollama server started (PID: {pid})")
            }
            Ok(StartOutcome::AlreadyRunning) => {
                writeln!(out, "[INFO] Ollama server is already running.")
            }
            Err(e) => writeln!(out, "[✗] Failed to start Ollama server: {e}"),
        }
    }

    fn stop_server<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match self.supervisor.stop() {
            Ok(StopOutcome::NothingToStop) => writeln!(out, "[INFO] No Ollama server PID found."),
            Ok(StopOutcome::Stopped { .. }) => writeln!(out, "[✓] Ollama server stopped."),
            Ok(StopOutcome::SignalFailed { pid, error }) => {
                writeln!(out, "[✗] Error stopping Ollama: {error}")?;
                writeln!(out, "[INFO] Removed stale PID record ({pid}).")
            }
            Err(e) => writeln!(out, "[✗] Error stopping Ollama: {e}"),
        }
    }

    async fn download<W: Write>(&self, name: &str, out: &mut W) -> std::io::Result<()> {
        writeln!(out, "[INFO] Downloading model '{name}'...")?;
        out.flush()?;

        let spinner = self.show_progress.then(|| Spinner::start("Downloading..."));
        let result = self.supervisor.download(&self.tool, name).await;
        if let Some(spinner) = spinner {
            spinner.stop().await;
        }

        match result {
            Ok(ModelChange::Applied { model }) => {
                writeln!(out, "[✓] Model '{model}' installed and set as active.")
            }
            Ok(ModelChange::ToolFailed { diagnostics, .. }) => {
                writeln!(out, "[✗] Failed to download model.")?;
                write_diagnostics(out, &diagnostics)
            }
            Ok(ModelChange::NoActiveModel) => Ok(()),
            Err(e) => report_tool_error(out, "download model", &e),
        }
    }

    async fn delete<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        match self.supervisor.delete(&self.tool).await {
            Ok(ModelChange::Applied { model }) => writeln!(out, "[✓] Model '{model}' removed."),
            Ok(ModelChange::ToolFailed { diagnostics, .. }) => {
                writeln!(out, "[✗] Failed to remove model:")?;
                write_diagnostics(out, &diagnostics)
            }
            Ok(ModelChange::NoActiveModel) => writeln!(out, "[ERROR] No active model to delete."),
            Err(e) => report_tool_error(out, "remove model", &e),
        }
    }

    async fn probe<W: Write>(&self, port: u16, out: &mut W) -> std::io::Result<()> {
        let Some(model) = self.supervisor.active_model() else {
            return writeln!(out, "[ERROR] No model selected.");
        };
        writeln!(out, "[INFO] Starting model '{model}' on port {port}...")?;
        out.flush()?;

        let backend = match (self.connect)(port) {
            Ok(backend) => backend,
            Err(e) => return writeln!(out, "[✗] Failed to start model: {e}"),
        };
        match backend.generate(&model, &self.probe_prompt).await {
            Ok(answer) => writeln!(out, "[✓] Model response: {answer}"),
            Err(e) => writeln!(out, "[✗] Failed to start model: {e}"),
        }
    }

    async fn chat<R, W>(&self, input: &mut R, out: &mut W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let backend = match (self.connect)(self.port) {
            Ok(backend) => backend,
            Err(e) => return writeln!(out, "[ERROR] Failed to communicate with model: {e}"),
        };
        let turns = ChatSession::new(&*backend, self.supervisor.models())
            .run(input, out)
            .await?;
        tracing::debug!("Chat ended after {turns} turns");
        Ok(())
    }

    async fn ask<W: Write>(&self, prompt: &str, out: &mut W) -> std::io::Result<()> {
        let backend = match (self.connect)(self.port) {
            Ok(backend) => backend,
            Err(e) => {
                tracing::error!("Could not build client: {e}");
                return writeln!(out, "AI: {ERROR_ANSWER}");
            }
        };
        let laisis = Laisis::from_store(self.supervisor.models(), &self.fallback_model, backend);
        if laisis.uses_fallback() {
            writeln!(
                out,
                "[WARN] No active model found. Default '{}' will be used.",
                laisis.model()
            )?;
        }
        let answer = laisis.send_message(prompt).await;
        writeln!(out, "AI: {answer}")
    }
}

fn write_diagnostics<W: Write>(out: &mut W, diagnostics: &str) -> std::io::Result<()> {
    let diagnostics = diagnostics.trim_end();
    if diagnostics.is_empty() {
        Ok(())
    } else {
        writeln!(out, "{diagnostics}")
    }
}

fn report_tool_error<W: Write>(
    out: &mut W,
    action: &str,
    error: &SupervisorError,
) -> std::io::Result<()> {
    writeln!(out, "[✗] Failed to {action}: {error}")
}
