use clap::Parser;
use tokio::io::BufReader;

use laisis::cli::shell::Shell;
use laisis::cli::{Cli, Command};
use laisis::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr so they never mix with prompts and answers.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "laisis=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.state_dir {
        cfg.state_dir = dir;
    }
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    let shell = Shell::from_config(&cfg);
    let mut input = BufReader::new(tokio::io::stdin());
    let mut out = std::io::stdout();

    match cli.command.and_then(|c: Command| c.into_shell_command(cfg.port)) {
        Some(command) => {
            shell.execute(command, &mut input, &mut out).await?;
        }
        None => shell.run(&mut input, &mut out).await?,
    }

    Ok(())
}
