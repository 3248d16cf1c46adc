//! Replay command - project a verified export into frames.

use clap::Args;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Table};
use std::path::PathBuf;

use provlog_core::export::parse_export;
use provlog_core::replay::{build_replay, FrameType};
use provlog_core::verifier::VerifyOptions;

use super::{DEFAULT_AUTHORITIES, EXIT_PRECONDITION};

/// Arguments for the replay command
#[derive(Args)]
pub struct ReplayArgs {
    /// Path to the exported session (session_golden.json)
    #[arg(value_name = "FILE")]
    pub session_file: PathBuf,

    /// Trusted authority identifiers (comma separated)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub authorities: Vec<String>,

    /// Write the full projection as JSON instead of a table
    #[arg(long, short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub fn run(args: ReplayArgs) -> i32 {
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
    let options = VerifyOptions::with_authorities(authorities);

    let replay = match build_replay(&export.events, export.seal.as_ref(), &options) {
        Ok(r) => r,
        Err(failure) => {
            eprintln!(
                "{} replay refused for session {}: {} ({})",
                "✗".red().bold(),
                failure.session_id,
                failure.error_message,
                failure.error_code
            );
            return EXIT_PRECONDITION;
        }
    };

    if let Some(output) = &args.output {
        let rendered =
            serde_json::to_string_pretty(&replay).expect("projection serializes");
        if let Err(e) = std::fs::write(output, rendered) {
            eprintln!("{} cannot write projection: {e}", "✗".red().bold());
            return EXIT_PRECONDITION;
        }
        println!("Projection written to: {}", output.display());
        return 0;
    }

    println!();
    println!(
        "{} session {} ({} events, evidence class {})",
        "Replay".bold().cyan(),
        replay.session_id,
        replay.event_count,
        replay.evidence_class
    );

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(["Pos", "Frame", "Seq", "Type", "Detail"]);

    for frame in &replay.frames {
        let seq = frame
            .sequence_number
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".into());
        let detail = match frame.frame_type {
            FrameType::Event => frame
                .payload
                .as_deref()
                .map(truncate_payload)
                .unwrap_or_default(),
            FrameType::Gap => format!(
                "missing sequences {}..{}",
                frame.gap_start.unwrap_or(0),
                frame.gap_end.unwrap_or(0)
            ),
            FrameType::LogDrop => format!(
                "{} dropped: {}",
                frame.dropped_count.unwrap_or(0),
                frame.drop_reason.as_deref().unwrap_or("UNKNOWN")
            ),
            FrameType::Redaction => frame.redacted_fields.join(", "),
        };
        table.add_row([
            frame.position.to_string(),
            frame.frame_type.as_str().to_string(),
            seq,
            frame.event_type.clone().unwrap_or_else(|| "-".into()),
            detail,
        ]);
    }
    println!("{table}");

    if !replay.warnings.is_empty() {
        println!();
        for warning in &replay.warnings {
            println!("  {} {}", "⚠".yellow().bold(), warning.message);
        }
    }

    0
}

fn truncate_payload(payload: &str) -> String {
    const MAX: usize = 48;
    if payload.len() <= MAX {
        payload.to_string()
    } else {
        let mut end = MAX;
        while !payload.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &payload[..end])
    }
}
