//! Export command - read-only export of a sealed session from a local store.

use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use uuid::Uuid;

use provlog_persist::{export_session, EventStore};

use super::EXIT_PRECONDITION;

/// Arguments for the export command
#[derive(Args)]
pub struct ExportArgs {
    /// Path to the provlog SQLite database
    #[arg(long, short = 'd', value_name = "FILE")]
    pub db: PathBuf,

    /// Session to export
    #[arg(long, short = 's', value_name = "UUID")]
    pub session: Uuid,

    /// Output path; stdout when omitted
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub async fn run(args: ExportArgs) -> i32 {
    if !args.db.exists() {
        eprintln!("{} database not found: {}", "✗".red().bold(), args.db.display());
        return EXIT_PRECONDITION;
    }

    let url = format!("sqlite:{}", args.db.display());
    let store = match EventStore::connect(&url).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{} cannot open store: {e}", "✗".red().bold());
            return EXIT_PRECONDITION;
        }
    };

    let export = match export_session(&store, args.session).await {
        Ok(Some(export)) => export,
        Ok(None) => {
            eprintln!(
                "{} no events found for session {}",
                "✗".red().bold(),
                args.session
            );
            return EXIT_PRECONDITION;
        }
        Err(e) => {
            eprintln!("{} export failed: {e}", "✗".red().bold());
            return EXIT_PRECONDITION;
        }
    };

    // The export document is written in its canonical form so that any
    // byte-preserving transport keeps it verifiable.
    let bytes = match export.canonical_bytes() {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{} export is not canonicalizable: {e}", "✗".red().bold());
            return EXIT_PRECONDITION;
        }
    };

    match &args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &bytes) {
                eprintln!("{} cannot write export: {e}", "✗".red().bold());
                return EXIT_PRECONDITION;
            }
            println!(
                "{} exported {} event(s) to {}",
                "✓".green().bold(),
                export.events.len(),
                path.display()
            );
        }
        None => {
            let text = String::from_utf8(bytes).expect("canonical bytes are UTF-8");
            println!("{text}");
        }
    }

    0
}
