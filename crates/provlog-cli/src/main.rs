//! Provlog CLI - offline verification and replay of agent evidence.
//!
//! # Usage
//!
//! ```bash
//! # Verify an exported session
//! provlog verify session_golden.json
//!
//! # Verify and write the report
//! provlog verify session_golden.json --output report.json
//!
//! # Replay a verified session as frames
//! provlog replay session_golden.json
//!
//! # Export a session from a local store
//! provlog export --db provlog.db --session <uuid> --output session_golden.json
//! ```
//!
//! Exit codes for `verify` are a strict contract:
//! 0 = PASS, 1 = DEGRADED, 2 = FAIL or any pre-verification error.

use clap::{Parser, Subcommand};

mod commands;

use commands::{export, info, replay, verify};

/// Provlog - tamper-evident evidence logs for AI agents.
#[derive(Parser)]
#[command(
    name = "provlog",
    version,
    about = "Provlog CLI - offline verification of agent evidence",
    long_about = "Provlog produces tamper-evident, hash-chained evidence logs of AI-agent \
                  activity.\n\nThe verifier recomputes every hash offline from a canonical \
                  export and classifies the result, with no access to the original service."
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify an exported session and classify the evidence
    Verify(verify::VerifyArgs),

    /// Project a verified session into replay frames
    Replay(replay::ReplayArgs),

    /// Export a session from a local event store
    Export(export::ExportArgs),

    /// Show version and contract information
    Info(info::InfoArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let code = match cli.command {
        Commands::Verify(args) => verify::run(args),
        Commands::Replay(args) => replay::run(args),
        Commands::Export(args) => export::run(args).await,
        Commands::Info(args) => info::run(args),
    };
    std::process::exit(code);
}

/// Map verbosity to a tracing filter.
fn setup_logging(verbosity: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}
