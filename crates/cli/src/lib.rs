pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "b24desk",
    about = "b24desk operator CLI",
    long_about = "Inspect configuration, check readiness, apply migrations and work with the portal \
                  through its incoming webhook.",
    after_help = "Examples:\n  b24desk doctor --json\n  b24desk org-chart\n  \
                  b24desk generate-test-calls --count 20 --user-ids 1,5,9"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, database connectivity and integration readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Print every active employee with their manager chain and call count as JSON")]
    OrgChart,
    #[command(about = "Register random outbound test calls in the portal telephony log")]
    GenerateTestCalls {
        #[arg(long, default_value_t = 10, help = "Number of calls to register")]
        count: u32,
        #[arg(long, value_delimiter = ',', required = true, help = "Comma-separated user ids")]
        user_ids: Vec<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
        Command::OrgChart => commands::org_chart::run(),
        Command::GenerateTestCalls { count, user_ids } => {
            commands::test_calls::run(count, &user_ids)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
