//! Standalone validator for summary schedule files.
//!
//! This tool validates JSON schedule files for the summary bot,
//! checking slot times, look-back windows and descriptions.

use std::process::ExitCode;

use clap::Parser;

use summary_bot::config::{MESSAGE_RETENTION_HOURS, ScheduleConfig, ScheduleError};

const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Summary schedule validator.
#[derive(Parser, Debug)]
#[command(name = "validate_schedule")]
#[command(about = "Validates summary schedule files for the Discord summary bot")]
#[command(version)]
struct Args {
    /// Path to the JSON schedule file to validate.
    #[arg(short, long, default_value = "schedule.json")]
    file: String,

    /// Generate an example schedule file at the specified path.
    #[arg(long)]
    generate_example: Option<String>,

    /// Show detailed information for each slot.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(output_path) = args.generate_example {
        return generate_example(&output_path);
    }

    validate_schedule(&args.file, args.verbose)
}

fn generate_example(output_path: &str) -> ExitCode {
    let example = ScheduleConfig::default();

    match example.save_to_file(output_path) {
        Ok(()) => {
            println!("✓ Example schedule written to: {output_path}");
            println!("\nRuns: {}", example.describe());
            println!("Times are in SUMMARY_UTC_OFFSET_HOURS (default +9).");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Failed to write example file: {e}");
            ExitCode::FAILURE
        }
    }
}

fn validate_schedule(path: &str, verbose: bool) -> ExitCode {
    println!("Validating: {path}\n");

    let schedule = match ScheduleConfig::load_from_file(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("✗ Failed to load schedule: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut details: Vec<(String, u32)> = schedule
        .daily
        .iter()
        .map(|s| {
            (
                format!(
                    "{:02}:{:02} \"{}\" (last {}h)",
                    s.hour, s.minute, s.description, s.hours_back
                ),
                s.hours_back,
            )
        })
        .collect();
    if let Some(w) = &schedule.weekly {
        let day = WEEKDAYS.get(w.weekday as usize).copied().unwrap_or("?");
        details.push((
            format!(
                "{day} {:02}:{:02} \"{}\" (last {}h, weekly)",
                w.hour, w.minute, w.description, w.hours_back
            ),
            w.hours_back,
        ));
    }

    let results = schedule.validate_all();
    let mut errors = 0;
    let mut warnings = 0;

    for (i, (label, result)) in results.iter().enumerate() {
        let detail = details.get(i);
        if verbose {
            let text = detail.map_or("", |(d, _)| d.as_str());
            println!("[{label}] {text}");
        }

        match result {
            Ok(()) => {
                let is_daily = label.starts_with("daily");
                if let Some((_, hours_back)) = detail
                    && is_daily
                    && *hours_back > 24
                {
                    warnings += 1;
                    if verbose {
                        println!("  ⚠ Warning: looks back {hours_back}h, overlapping earlier daily runs");
                    }
                } else if verbose {
                    println!("  ✓ OK");
                }
            }
            Err(e) => {
                errors += 1;
                println!("{}", error_line(label, e, verbose));
            }
        }
    }

    println!();

    let total = results.len();
    if errors == 0 {
        println!("✓ All {total} slots are valid!");
        if warnings > 0 {
            println!("  ({warnings} warning(s) - overlapping look-back windows)");
        }
        println!("\nRuns: {}", schedule.describe());
        println!("Message retention: {MESSAGE_RETENTION_HOURS}h");
        ExitCode::SUCCESS
    } else {
        println!("✗ Validation failed: {errors} error(s) in {total} slots");
        println!("  Valid: {}/{total}", total - errors);
        ExitCode::FAILURE
    }
}

/// Verbose output already printed the `[label]` header for this slot.
fn error_line(label: &str, error: &ScheduleError, verbose: bool) -> String {
    if verbose {
        format!("  ✗ Error: {error}")
    } else {
        format!("[{label}] ✗ Error: {error}")
    }
}
