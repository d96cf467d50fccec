//! Offline verification of a report JSON file.
//!
//! Usage: verify <report.json>
//! Prints the certificate and, when it failed, the repair directives.
//! Exits 1 when the report fails verification.

use financial_report_orchestrator::{
    correction::build_directives, models::OverallStatus, verification::verify, Report,
};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: verify <report.json>");
        return ExitCode::from(2);
    };

    match run(&path) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("verify failed: {}", e);
            ExitCode::from(2)
        }
    }
}

fn run(path: &str) -> financial_report_orchestrator::Result<bool> {
    let raw = std::fs::read_to_string(path)?;
    let report = Report::from_json(&raw)?;
    let certificate = verify(&report)?;

    println!("Overall: {}", certificate.overall_status);
    for check in &certificate.checks {
        let outcome = match (check.is_evaluated(), check.passed) {
            (false, _) => "SKIP",
            (true, true) => "PASS",
            (true, false) => "FAIL",
        };
        println!(
            "  [{}] {:<40} discrepancy {:>12.2}  {}",
            outcome,
            check.label(),
            check.discrepancy,
            check.notes.as_deref().unwrap_or(&check.calculation)
        );
    }

    for issue in &certificate.data_quality {
        println!("  [NOTE] {}: {}", issue.section, issue.detail);
    }

    if certificate.overall_status == OverallStatus::Failed {
        println!("\nRepair directives:");
        match build_directives(&certificate, &report) {
            Ok(directives) => {
                for (i, directive) in directives.iter().enumerate() {
                    println!("  {}. {}", i + 1, directive);
                }
            }
            Err(e) => println!("  none: {}", e),
        }
        return Ok(false);
    }

    Ok(true)
}
