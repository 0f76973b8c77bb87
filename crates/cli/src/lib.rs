pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "crashdesk",
    about = "Crashdesk operator CLI",
    long_about = "Operate crashdesk: run report extractions, apply migrations, inspect config, and check runtime readiness.",
    after_help = "Examples:\n  crashdesk extract --input records.json\n  crashdesk extract --raw --input message.txt\n  crashdesk doctor --json\n  crashdesk migrate"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Run the report extractor over workflow output records and print the envelope"
    )]
    Extract {
        #[arg(long, help = "Read input from this file instead of stdin")]
        input: Option<PathBuf>,
        #[arg(long, help = "Treat the input as the bare AI message rather than a record array")]
        raw: bool,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, extractor behavior, and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Extract { input, raw } => commands::extract::run(input.as_deref(), raw),
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
