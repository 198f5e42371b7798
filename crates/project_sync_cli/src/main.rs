use clap::{Parser, Subcommand};
use colored::Colorize;
use project_sync_cli::{
    commands::{get_cmd, get_cmd::GetArgs, set_cmd, set_cmd::SetArgs, ConnectionArgs},
    errors::{error_chain, Error},
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "PROJECT_SYNC_LOG";

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

/// project-sync: keep GitLab project settings in a version controlled file
#[derive(Parser)]
#[command(name = "project-sync", version)]
#[command(about = "Read and apply GitLab project settings as a YAML document", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the project configuration into a document
    Get(GetArgs),

    /// Apply a document to the project
    Set(SetArgs),
}

async fn run(cli: &Cli) -> Result<(), Error> {
    let settings = cli.connection.settings()?;
    match &cli.command {
        Commands::Get(args) => get_cmd::execute(args, &settings).await,
        Commands::Set(args) => set_cmd::execute(args, &settings).await,
    }
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so `get` output on stdout stays clean.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli).await {
        eprintln!("{} {}", "error:".red().bold(), error_chain(&e));
        std::process::exit(1);
    }
}
