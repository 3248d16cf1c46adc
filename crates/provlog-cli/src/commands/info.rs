//! Info command - version and contract information.

use clap::Args;
use colored::Colorize;

use provlog_core::event::EventType;
use provlog_core::sealer::DEFAULT_CHAIN_AUTHORITY;

use super::DEFAULT_AUTHORITIES;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// List the full event type set
    #[arg(long)]
    pub event_types: bool,
}

pub fn run(args: InfoArgs) -> i32 {
    println!("{}", "Provlog".bold().cyan());
    println!("{}", "═".repeat(40).cyan());
    println!("  {} {}", "Version:".dimmed(), env!("CARGO_PKG_VERSION"));
    println!("  {} {}", "Sealing authority:".dimmed(), DEFAULT_CHAIN_AUTHORITY);
    println!(
        "  {} {}",
        "Default trusted set:".dimmed(),
        DEFAULT_AUTHORITIES.join(", ")
    );
    println!();
    println!("Exit code contract for `verify`:");
    println!("  0 = PASS       full chain verifies");
    println!("  1 = DEGRADED   verifies with warnings (drops)");
    println!("  2 = FAIL       integrity failure or unreadable input");

    if args.event_types {
        println!();
        println!("Event types:");
        for t in EventType::ALL {
            println!("  {}", t.as_str());
        }
    }

    0
}
