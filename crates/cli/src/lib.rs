pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "overburden",
    about = "Overburden operator CLI",
    long_about = "Operate the BCM claim reconciliation service: migrations, reference data, thresholds, and read-only claim inspection.",
    after_help = "Examples:\n  overburden doctor --json\n  overburden thresholds --activate thr-default\n  overburden reconcile <contractor-claim-id>"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load demo sites, pits, blocks and the default threshold (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, DB connectivity, schema and the active threshold")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List variance thresholds, optionally activating one")]
    Thresholds {
        #[arg(long, value_name = "THRESHOLD_ID", help = "Make this threshold the single active one")]
        activate: Option<String>,
    },
    #[command(about = "Show the contractor/surveyor comparison for a contractor claim")]
    Reconcile {
        #[arg(value_name = "CLAIM_ID")]
        claim_id: String,
    },
    #[command(about = "Assemble the signed BCM certificate for an approved claim")]
    Certificate {
        #[arg(value_name = "CLAIM_ID")]
        claim_id: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Thresholds { activate } => commands::thresholds::run(activate),
        Command::Reconcile { claim_id } => commands::reconcile::run(claim_id),
        Command::Certificate { claim_id } => commands::certificate::run(claim_id),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn thresholds_accepts_an_activation_target() {
        let cli = Cli::try_parse_from(["overburden", "thresholds", "--activate", "thr-default"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Thresholds { activate: Some(ref id) } if id == "thr-default"
        ));
    }

    #[test]
    fn reconcile_requires_a_claim_id() {
        assert!(Cli::try_parse_from(["overburden", "reconcile"]).is_err());
    }
}
