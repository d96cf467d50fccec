use async_trait::async_trait;
use financial_report_orchestrator::{
    agent::{CorrectionOrchestrator, RunOptions, MAX_ATTEMPTS},
    correction::{build_directives, directive_strings},
    documents::SourceDocument,
    error::OrchestrationError,
    generator::{GenerationConfig, ReportGenerator},
    verification::{create_default_verification_engine, verify},
    AccountingIdentity, OverallStatus, Report, ReportingPeriod, Result,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const GENERATED: &str = r#"{
  "summary": "Revenue grew 12% year on year.",
  "kpis": [ { "name": "Net margin", "value": "18.2%", "change": "+1.1pp" } ],
  "incomeStatement": {
    "revenue":  [ { "label": "Product sales", "amount2025": 1100, "amount2024": 980, "noteRef": 1 } ],
    "expenses": [ { "label": "Cost of sales", "amount2025": 600, "amount2024": 560 },
                  { "label": "Operating expenses", "amount2025": 300, "amount2024": 270 } ],
    "grossProfit": { "amount2025": 500, "amount2024": 420 },
    "netProfit": { "amount2025": 200, "amount2024": 150 },
    "notes": [ { "id": 1, "content": "Revenue recognised at delivery." } ]
  },
  "balanceSheet": {
    "currentAssets": [ { "label": "Cash", "amount2025": 400, "amount2024": 350 } ],
    "nonCurrentAssets": [ { "label": "Property, plant and equipment", "amount2025": 600, "amount2024": 550 } ],
    "currentLiabilities": [ { "label": "Trade payables", "amount2025": 300, "amount2024": 300 } ],
    "nonCurrentLiabilities": [ { "label": "Bank loan", "amount2025": 400, "amount2024": 400 } ],
    "equity": [ { "label": "Share capital", "amount2025": 200, "amount2024": 200 },
                { "label": "Retained earnings", "amount2025": 50, "amount2024": 0 } ],
    "totalAssets": { "amount2025": 1000, "amount2024": 900 },
    "totalLiabilities": { "amount2025": 700, "amount2024": 700 },
    "totalEquity": { "amount2025": 250, "amount2024": 200 }
  },
  "cashFlowStatement": {
    "operatingActivities": [ { "label": "Cash from operations", "amount2025": 180, "amount2024": 150 } ],
    "investingActivities": [ { "label": "Capital expenditure", "amount2025": -80, "amount2024": -60 } ],
    "financingActivities": [ { "label": "Loan repayment", "amount2025": -50, "amount2024": -40 } ],
    "netChangeInCash": { "amount2025": 50, "amount2024": 50 }
  }
}"#;

fn generated() -> Report {
    Report::from_json(GENERATED).unwrap()
}

/// Applies directives by overwriting the retained-earnings line and totals,
/// standing in for a model that follows instructions.
struct ObedientGenerator {
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl ReportGenerator for ObedientGenerator {
    async fn generate(
        &self,
        _prior: &SourceDocument,
        _current: &SourceDocument,
        _config: &GenerationConfig,
    ) -> Result<Report> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(generated())
    }

    async fn fix(
        &self,
        report: &Report,
        _directives: &[String],
        _config: &GenerationConfig,
    ) -> Result<Report> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut fixed = report.clone();
        fixed.balance_sheet.equity[1].amount_current = 100.0;
        if let Some(total) = fixed.balance_sheet.total_equity.as_mut() {
            total.amount_current = Some(300.0);
        }
        Ok(fixed)
    }
}

fn docs() -> (SourceDocument, SourceDocument) {
    (
        SourceDocument::new("fy2024.pdf", "application/pdf", b"%PDF-prior".to_vec()),
        SourceDocument::new("fy2025.pdf", "application/pdf", b"%PDF-current".to_vec()),
    )
}

#[test]
fn generated_report_fails_only_the_current_balance_sheet() {
    let certificate = verify(&generated()).unwrap();

    assert_eq!(certificate.overall_status, OverallStatus::Failed);
    let failed: Vec<_> = certificate.failed_checks().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].identity, AccountingIdentity::BalanceSheetEquation);
    assert_eq!(failed[0].period, ReportingPeriod::Current);
    assert_eq!(failed[0].discrepancy, 50.0);
}

#[test]
fn directive_rebalances_equity_to_300() {
    let report = generated();
    let certificate = verify(&report).unwrap();
    let directives = build_directives(&certificate, &report).unwrap();

    let last = directives[0].adjustments.last().unwrap();
    assert_eq!(last.field_path, "balanceSheet.totalEquity.amountCurrent");
    assert_eq!(last.to, 300.0);

    let text = directive_strings(&directives);
    assert!(text[0].contains("balanceSheet.equity[1].amountCurrent"));
}

#[test]
fn report_round_trips_with_stable_field_names() {
    let report = generated();
    let json = serde_json::to_string(&report).unwrap();

    assert!(json.contains("\"amountCurrent\""));
    assert!(!json.contains("amount2025"));
    assert_eq!(Report::from_json(&json).unwrap(), report);
}

#[tokio::test]
async fn orchestrator_repairs_with_one_fix() {
    let calls = Arc::new(AtomicU32::new(0));
    let orchestrator = CorrectionOrchestrator::new(
        Box::new(ObedientGenerator {
            calls: calls.clone(),
        }),
        create_default_verification_engine(),
    );
    let (prior, current) = docs();
    let config = GenerationConfig::new("Acme", "2025", "2024");

    let outcome = orchestrator
        .run_with_correction(&prior, &current, &config, &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(outcome.certificate.overall_status, OverallStatus::Passed);
    assert_eq!(outcome.history[0].certificate.overall_status, OverallStatus::Failed);
    assert_eq!(
        outcome.history[0].report.balance_sheet.equity[1].amount_current,
        50.0
    );
}

#[tokio::test]
async fn independent_runs_do_not_share_state() {
    let calls = Arc::new(AtomicU32::new(0));
    let orchestrator = Arc::new(CorrectionOrchestrator::new(
        Box::new(ObedientGenerator {
            calls: calls.clone(),
        }),
        create_default_verification_engine(),
    ));
    let config = GenerationConfig::new("Acme", "2025", "2024");

    let run = |orchestrator: Arc<CorrectionOrchestrator>, config: GenerationConfig| async move {
        let (prior, current) = docs();
        orchestrator
            .run_with_correction(&prior, &current, &config, &RunOptions::default())
            .await
    };

    let (a, b) = tokio::join!(
        run(orchestrator.clone(), config.clone()),
        run(orchestrator.clone(), config.clone())
    );

    assert_eq!(a.unwrap().attempts, 2);
    assert_eq!(b.unwrap().attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn budget_error_reads_as_user_facing_message() {
    let err = OrchestrationError::VerificationBudgetExceeded {
        attempts: MAX_ATTEMPTS,
        failed_checks: vec!["Balance Sheet Equation (current)".to_string()],
        history: Vec::new(),
    };

    assert!(err.is_terminal_verification_failure());
    assert!(err.to_string().starts_with("Could not produce a consistent report after 5 attempts"));
}
