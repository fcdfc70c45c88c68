pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "henry",
    about = "henry-bot operator CLI",
    long_about = "Inspect henry-bot configuration, check readiness, and chat with the bot locally.",
    after_help = "Examples:\n  henry doctor --json\n  henry config\n  henry chat --user U123"
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
    #[command(about = "Validate config, Slack token, and lookup client readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Talk to the bot on the console using the real lookup services")]
    Chat {
        #[arg(long, default_value = commands::chat::CONSOLE_USER, help = "User id to chat as")]
        user: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Chat { user } => commands::chat::run(&user),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
