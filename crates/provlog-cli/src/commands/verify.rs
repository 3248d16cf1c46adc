//! Verify command - recompute a session's chain and classify the evidence.

use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use provlog_core::export::parse_export;
use provlog_core::verifier::{verify_session, FindingSeverity, VerificationStatus, VerifyOptions};

use super::{DEFAULT_AUTHORITIES, EXIT_PRECONDITION};

/// Arguments for the verify command
#[derive(Args)]
pub struct VerifyArgs {
    /// Path to the exported session (session_golden.json)
    #[arg(value_name = "FILE")]
    pub session_file: PathBuf,

    /// Write the verification report as JSON
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Trusted authority identifiers (comma separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub authorities: Vec<String>,

    /// Treat any redacted content as a policy violation
    #[arg(long)]
    pub forbid_redacted: bool,

    /// Only produce the exit code
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

/// Run the verify command; the return value is the process exit code.
pub fn run(args: VerifyArgs) -> i32 {
    let content = match std::fs::read_to_string(&args.session_file) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} cannot read {}: {e}", "✗".red().bold(), args.session_file.display());
            return EXIT_PRECONDITION;
        }
    };

    let document: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{} malformed JSON: {e}", "✗".red().bold());
            return EXIT_PRECONDITION;
        }
    };

    let export = match parse_export(&document) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("{} invalid export: {e}", "✗".red().bold());
            return EXIT_PRECONDITION;
        }
    };

    let authorities: Vec<String> = if args.authorities.is_empty() {
        DEFAULT_AUTHORITIES.iter().map(|s| s.to_string()).collect()
    } else {
        args.authorities.clone()
    };
    let mut options = VerifyOptions::with_authorities(authorities);
    options.allow_redacted = !args.forbid_redacted;

    let report = verify_session(&export.events, export.seal.as_ref(), &options);

    if let Some(output) = &args.output {
        let rendered = serde_json::to_string_pretty(&report.to_json())
            .expect("report serializes");
        if let Err(e) = std::fs::write(output, rendered) {
            eprintln!("{} cannot write report: {e}", "✗".red().bold());
            return EXIT_PRECONDITION;
        }
        if !args.quiet {
            println!("Report written to: {}", output.display());
        }
    }

    if !args.quiet {
        print_report(&report);
    }

    report.exit_code()
}

fn print_report(report: &provlog_core::verifier::VerificationReport) {
    let status = match report.status {
        VerificationStatus::Pass => report.status.as_str().green().bold(),
        VerificationStatus::Degraded => report.status.as_str().yellow().bold(),
        VerificationStatus::Fail => report.status.as_str().red().bold(),
    };

    println!();
    println!("{}", "═".repeat(60).cyan());
    println!("VERIFICATION RESULT: {status}");
    println!("EVIDENCE CLASS:      {}", report.evidence_class().as_str().bold());
    println!("{}", "═".repeat(60).cyan());
    println!("  {} {}", "Session ID:".dimmed(), report.session_id);
    println!("  {} {}", "Event Count:".dimmed(), report.event_count);
    println!(
        "  {} {}",
        "Chain Authority:".dimmed(),
        report.chain_authority.as_deref().unwrap_or("<none>")
    );
    println!("  {} {}", "Mode:".dimmed(), report.verification_mode);
    println!(
        "  {} {}",
        "Sealed:".dimmed(),
        if report.sealed { "yes" } else { "no" }
    );
    println!(
        "  {} {}",
        "First Hash:".dimmed(),
        report.first_event_hash.as_deref().unwrap_or("<none>")
    );
    println!(
        "  {} {}",
        "Final Hash:".dimmed(),
        report.final_event_hash.as_deref().unwrap_or("<none>")
    );
    println!();
    println!("Classification: {}", report.evidence_class_rationale());

    if !report.findings.is_empty() {
        println!();
        println!("Findings ({}):", report.findings.len());
        for finding in &report.findings {
            let severity = match finding.severity {
                FindingSeverity::Fatal => "FATAL".red().bold(),
                FindingSeverity::Warning => "WARNING".yellow(),
                FindingSeverity::Info => "INFO".dimmed(),
            };
            println!("  [{severity}] {}: {}", finding.kind.as_str(), finding.message);
        }
    }

    println!();
    println!("Exit Code: {}", report.exit_code());
}
