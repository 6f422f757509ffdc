use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use moot::completion::OpenAiCompatibleClient;
use moot::config::MootConfig;
use moot::orchestrator::Orchestrator;
use moot::session::{RunEvent, RunHandle};
use moot::{logging, server};

#[derive(Parser)]
#[command(name = "moot", version, about = "Nested agent councils with human approval gates")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the WebSocket chat endpoint
    Serve {
        /// Listen address, overrides the configuration
        #[arg(long)]
        addr: Option<String>,
    },
    /// Run one task in this terminal; replies are read from stdin
    Run {
        /// Task text; read from the first stdin line when omitted
        #[arg(long)]
        task: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    logging::init(cli.json_logs);

    let config = MootConfig::load(cli.config.as_deref())?;
    let client = Arc::new(OpenAiCompatibleClient::from_config(&config.model)?);
    let orchestrator = Arc::new(Orchestrator::new(config.team.clone(), client)?);

    match cli.command {
        Command::Serve { addr } => {
            let addr = addr.unwrap_or(config.server.addr);
            server::serve(&addr, orchestrator).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { task } => run_in_terminal(&orchestrator, task).await,
    }
}

async fn run_in_terminal(orchestrator: &Orchestrator, task: Option<String>) -> anyhow::Result<ExitCode> {
    let mut lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()));

    let task = match task {
        Some(task) => task,
        None => {
            println!("Enter the task:");
            match lines.recv().await {
                Some(line) => line,
                None => bail!("no task given"),
            }
        }
    };

    let RunHandle {
        mut events,
        replies,
        task: run,
        ..
    } = orchestrator.start_run(task)?;

    tokio::spawn(async move {
        while let Some(line) = lines.recv().await {
            if replies.send(line).await.is_err() {
                break;
            }
        }
    });

    while let Some(event) = events.recv().await {
        match event {
            RunEvent::Message { level, message, .. } => {
                let indent = "  ".repeat(level.depth());
                println!("{indent}---------- {} ({}) ----------", message.source, level);
                for line in message.content.lines() {
                    println!("{indent}{line}");
                }
            }
            RunEvent::InputRequested { message, .. } => {
                println!("{}", message.content);
            }
            RunEvent::Finished(outcome) => {
                println!("{}", outcome.summary());
            }
        }
    }

    let outcome = run.await.context("run task panicked")?;
    Ok(if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Read lines on a detached OS thread
///
/// A blocked read never holds up process exit, unlike the runtime's blocking pool.
fn spawn_line_reader<R>(reader: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[tokio::test]
    async fn test_line_reader_yields_lines_then_ends() {
        let mut lines = spawn_line_reader(Cursor::new("write a post\nAPPROVE\n"));

        assert_eq!(lines.recv().await.as_deref(), Some("write a post"));
        assert_eq!(lines.recv().await.as_deref(), Some("APPROVE"));
        assert_eq!(lines.recv().await, None);
    }
}
