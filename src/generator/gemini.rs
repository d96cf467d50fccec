//! Gemini-powered report generator
//!
//! Sends both source documents inline and asks for a comparative report
//! in JSON. Fix requests resend the previous report plus the directives
//! and expect a complete report back.

use crate::documents::SourceDocument;
use crate::gemini::{GeminiClient, Part, SamplingConfig};
use crate::generator::{parse_report_response, GenerationConfig, ReportGenerator};
use crate::models::Report;
use crate::Result;
use async_trait::async_trait;
use tracing::info;

const REPORT_SHAPE: &str = r#"{
  "summary": "string",
  "kpis": [ { "name": "string", "value": "string", "change": "string" } ],
  "incomeStatement": {
    "revenue":  [ { "label": "string", "amountCurrent": 0, "amountPrior": 0, "noteRef": 1 } ],
    "expenses": [ { "label": "string", "amountCurrent": 0, "amountPrior": 0 } ],
    "grossProfit":     { "amountCurrent": 0, "amountPrior": 0 },
    "operatingIncome": { "amountCurrent": 0, "amountPrior": 0 },
    "netProfit":       { "amountCurrent": 0, "amountPrior": 0 },
    "notes": [ { "id": 1, "content": "string" } ]
  },
  "balanceSheet": {
    "currentAssets": [], "nonCurrentAssets": [],
    "currentLiabilities": [], "nonCurrentLiabilities": [],
    "equity": [],
    "totalAssets":      { "amountCurrent": 0, "amountPrior": 0 },
    "totalLiabilities": { "amountCurrent": 0, "amountPrior": 0 },
    "totalEquity":      { "amountCurrent": 0, "amountPrior": 0 },
    "notes": []
  },
  "cashFlowStatement": {
    "operatingActivities": [], "investingActivities": [], "financingActivities": [],
    "netChangeInCash": { "amountCurrent": 0, "amountPrior": 0 },
    "notes": []
  }
}"#;

pub struct GeminiReportGenerator {
    client: GeminiClient,
}

impl GeminiReportGenerator {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    fn sampling(config: &GenerationConfig) -> SamplingConfig {
        SamplingConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }

    fn system_prompt(config: &GenerationConfig) -> String {
        format!(
            r#"You are a financial reporting engine.

Produce a comparative financial statement for {company}.
"amountCurrent" is fiscal {current}; "amountPrior" is fiscal {prior}. Amounts are in {currency}.

Rules:
- Expenses are positive numbers; they are subtracted from revenue.
- Cash flow items are signed (outflows negative).
- netProfit = sum(revenue) - sum(expenses)
- totalAssets = totalLiabilities + totalEquity
- netChangeInCash = sum(operatingActivities) + sum(investingActivities) + sum(financingActivities)
- Equity must include a retained earnings line.
- noteRef must match a note id in the same statement.
- Return ONLY valid JSON in exactly this shape:

{shape}
"#,
            company = config.company,
            current = config.current_label,
            prior = config.prior_label,
            currency = config.currency,
            shape = REPORT_SHAPE,
        )
    }

    fn fix_prompt(report: &Report, directives: &[String]) -> Result<String> {
        let previous = serde_json::to_string_pretty(report)?;

        Ok(format!(
            "The report below failed accounting verification.\n\n\
             Apply these corrections exactly, in order:\n- {}\n\n\
             Return the COMPLETE corrected report as JSON in the same shape. \
             Do not change any value that a correction does not name.\n\n\
             PREVIOUS REPORT:\n{}",
            directives.join("\n- "),
            previous
        ))
    }
}

#[async_trait]
impl ReportGenerator for GeminiReportGenerator {
    async fn generate(
        &self,
        prior: &SourceDocument,
        current: &SourceDocument,
        config: &GenerationConfig,
    ) -> Result<Report> {
        info!(
            company = %config.company,
            prior = %prior.file_name,
            current = %current.file_name,
            "Generating report"
        );

        let parts = vec![
            Part::text(format!("Fiscal {} statement:", config.prior_label)),
            Part::inline(prior.to_inline_data()?),
            Part::text(format!("Fiscal {} statement:", config.current_label)),
            Part::inline(current.to_inline_data()?),
            Part::text("Generate the comparative report."),
        ];

        let response = self
            .client
            .generate(&Self::system_prompt(config), parts, Self::sampling(config))
            .await?;

        parse_report_response(&response)
    }

    async fn fix(
        &self,
        report: &Report,
        directives: &[String],
        config: &GenerationConfig,
    ) -> Result<Report> {
        info!(
            company = %config.company,
            directives = directives.len(),
            "Requesting report correction"
        );

        let prompt = Self::fix_prompt(report, directives)?;

        let response = self
            .client
            .generate(
                &Self::system_prompt(config),
                vec![Part::text(prompt)],
                Self::sampling(config),
            )
            .await?;

        parse_report_response(&response)
    }
}
