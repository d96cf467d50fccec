//! Report generator contract and implementations
//!
//! The generator is the unreliable step: it produces a report from two
//! source documents, and re-produces a whole report from repair
//! directives. Everything it returns is verified before use.

use crate::documents::SourceDocument;
use crate::error::OrchestrationError;
use crate::models::Report;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod gemini;
pub use gemini::GeminiReportGenerator;

/// Per-request generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub company: String,
    pub current_label: String,
    pub prior_label: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: i32,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_output_tokens() -> i32 {
    16384
}

impl GenerationConfig {
    pub fn new(
        company: impl Into<String>,
        current_label: impl Into<String>,
        prior_label: impl Into<String>,
    ) -> Self {
        Self {
            company: company.into(),
            current_label: current_label.into(),
            prior_label: prior_label.into(),
            currency: default_currency(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }

    /// Storage key for the year pair, e.g. `2025/2024`.
    pub fn period_key(&self) -> String {
        format!("{}/{}", self.current_label, self.prior_label)
    }
}

/// Trait for report generation (LLM controlled)
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Produce a comparative report from the prior and current documents
    async fn generate(
        &self,
        prior: &SourceDocument,
        current: &SourceDocument,
        config: &GenerationConfig,
    ) -> Result<Report>;

    /// Produce a complete replacement report that applies the directives
    async fn fix(
        &self,
        report: &Report,
        directives: &[String],
        config: &GenerationConfig,
    ) -> Result<Report>;
}

/// Parse model output into a report. Shape errors are generation errors:
/// the model, not the caller, produced the bad input.
pub fn parse_report_response(response: &str) -> Result<Report> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    serde_json::from_str(cleaned).map_err(|e| {
        OrchestrationError::Generation(format!(
            "Model output is not a valid report: {} | raw={}",
            e,
            truncate(response, 500)
        ))
    })
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_report() {
        let raw = "```json\n{ \"summary\": \"ok\", \"balanceSheet\": { \"totalAssets\": { \"amountCurrent\": 5 } } }\n```";
        let report = parse_report_response(raw).unwrap();

        assert_eq!(report.summary, "ok");
        assert_eq!(
            report.balance_sheet.total_assets.unwrap().amount_current,
            Some(5.0)
        );
    }

    #[test]
    fn test_parse_garbage_is_generation_error() {
        let err = parse_report_response("I could not read the documents.").unwrap_err();
        assert!(matches!(err, OrchestrationError::Generation(_)));
    }

    #[test]
    fn test_period_key() {
        let config = GenerationConfig::new("Acme", "2025", "2024");
        assert_eq!(config.period_key(), "2025/2024");
        assert_eq!(config.currency, "USD");
    }
}
