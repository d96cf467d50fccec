//! Generate a verified report from two statement files.
//!
//! Usage: generate <company> <current-label> <prior-label> <prior-file> <current-file>
//! Writes the report JSON to stdout; progress goes to stderr.

use financial_report_orchestrator::{
    agent::{CorrectionOrchestrator, ProgressEvent, RunOptions},
    config::AppConfig,
    documents::SourceDocument,
    gemini::GeminiClient,
    generator::{GeminiReportGenerator, GenerationConfig},
    verification::create_default_verification_engine,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [company, current_label, prior_label, prior_path, current_path] = args.as_slice() else {
        eprintln!(
            "usage: generate <company> <current-label> <prior-label> <prior-file> <current-file>"
        );
        return ExitCode::from(2);
    };

    let config = GenerationConfig::new(company, current_label, prior_label);

    match run(&config, Path::new(prior_path), Path::new(current_path)).await {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Generation failed");
            ExitCode::from(1)
        }
    }
}

async fn run(
    config: &GenerationConfig,
    prior_path: &Path,
    current_path: &Path,
) -> financial_report_orchestrator::Result<String> {
    let app = AppConfig::from_env()?;

    let prior = SourceDocument::from_path(prior_path)?;
    let current = SourceDocument::from_path(current_path)?;

    let mut client = GeminiClient::new(app.gemini_api_key, &app.gemini_model)?;
    if let Some(url) = app.gemini_base_url {
        client = client.with_base_url(url);
    }

    let orchestrator = CorrectionOrchestrator::new(
        Box::new(GeminiReportGenerator::new(client)),
        create_default_verification_engine(),
    );

    let options = RunOptions::default().with_progress(Arc::new(|event: &ProgressEvent| {
        if let ProgressEvent::Verified {
            attempt,
            status,
            failed_checks,
        } = event
        {
            info!(attempt, status = %status, failed = ?failed_checks, "Attempt verified");
        }
    }));

    let outcome = orchestrator
        .run_with_correction(&prior, &current, config, &options)
        .await?;

    info!(
        attempts = outcome.attempts,
        status = %outcome.certificate.overall_status,
        "Report ready"
    );

    Ok(serde_json::to_string_pretty(&serde_json::json!({
        "report": outcome.report,
        "certificate": outcome.certificate,
        "attempts": outcome.attempts,
    }))?)
}
