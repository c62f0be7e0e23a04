pub mod commands;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "firmscope",
    about = "Firmscope operator CLI",
    long_about = "Inspect configuration, check runtime readiness, and run one-off company lookups outside Slack.",
    after_help = "Examples:\n  firmscope doctor --json\n  firmscope config\n  firmscope lookup https://acme.com --output acme.json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Slack token readiness, and enrichment settings")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Fetch enrichment data for a company website or LinkedIn URL")]
    Lookup {
        #[arg(help = "Company website or LinkedIn company URL")]
        url: String,
        #[arg(long, short, help = "Write the JSON response to this file instead of stdout")]
        output: Option<PathBuf>,
    },
}

/// Loads `dir/.env` without overriding variables that are already set.
pub fn load_env_file(dir: &Path) -> Option<PathBuf> {
    let path = dir.join(".env");
    dotenvy::from_path(&path).ok().map(|()| path)
}

pub fn run() -> ExitCode {
    if let Ok(dir) = std::env::current_dir() {
        load_env_file(&dir);
    }
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult::raw(commands::ExitStatus::Success, commands::config::run())
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Lookup { url, output } => commands::lookup::run(&url, output.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
