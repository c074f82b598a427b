pub mod shell;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use shell::ShellCommand;

#[derive(Parser)]
#[command(name = "laisis", about = "Local AI Software Integration System. Supervise a local Ollama server and chat with its active model.")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Config file (default: ./laisis.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the pid and active-model records
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Backend port (default: 11434)
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Without a subcommand the interactive shell starts
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print where to get Ollama
    Install,

    /// Start the Ollama server in the background
    Start,

    /// Stop the Ollama server started by laisis
    Stop,

    /// Show server and model status
    Status,

    /// Pull a model and make it active
    Download {
        /// Model name, e.g. llama3 or mistral:7b
        name: String,
    },

    /// Remove the active model
    Delete,

    /// Make an already-pulled model active
    Use {
        name: String,
    },

    /// Send a readiness prompt to the active model
    Probe,

    /// Chat with the active model
    Chat,

    /// Send one prompt and print the answer
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        prompt: Vec<String>,
    },

    /// Interactive command shell
    Shell,
}

impl Command {
    /// The shell command this subcommand runs, `None` for `shell` itself.
    pub fn into_shell_command(self, port: u16) -> Option<ShellCommand> {
        Some(match self {
            Command::Install => ShellCommand::InstallServer,
            Command::Start => ShellCommand::StartServer,
            Command::Stop => ShellCommand::StopServer,
            Command::Status => ShellCommand::Status,
            Command::Download { name } => ShellCommand::DownloadModel(name),
            Command::Delete => ShellCommand::DeleteModel,
            Command::Use { name } => ShellCommand::UseModel(name),
            Command::Probe => ShellCommand::StartModel(port),
            Command::Chat => ShellCommand::ChatModel,
            Command::Ask { prompt } => ShellCommand::Ask(prompt.join(" ")),
            Command::Shell => return None,
        })
    }
}
