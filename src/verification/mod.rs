//! Verification engine for accounting identities
//!
//! Rules-based verification of a generated report before it is shown.
//! Deterministic: no I/O, no randomness, never mutates its input.
//! An imbalance is data in the certificate, not an error.

use crate::error::OrchestrationError;
use crate::models::{
    sum_items, total_amount, AccountingIdentity, DataQualityIssue, FinancialLineItem, Note,
    NoteIndex, OverallStatus, Report, ReportingPeriod, SingleValue, VerificationCertificate,
    VerificationCheck,
};
use crate::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

/// Absolute currency allowance for rounding.
pub const TOLERANCE: f64 = 1.0;

/// Trait for a single accounting identity
pub trait VerificationRule: Send + Sync {
    fn identity(&self) -> AccountingIdentity;

    fn evaluate(&self, report: &Report, period: ReportingPeriod) -> VerificationCheck;
}

/// Verification engine that evaluates every rule for both periods
pub struct VerificationEngine {
    rules: Vec<Box<dyn VerificationRule>>,
}

impl VerificationEngine {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
        }
    }

    pub fn add_rule(&mut self, rule: Box<dyn VerificationRule>) {
        self.rules.push(rule);
    }

    /// Verify a complete report (synchronous, no I/O)
    ///
    /// Fails only when the report is structurally unusable (a non-finite
    /// amount). Missing totals produce not-evaluated checks.
    pub fn verify(&self, report: &Report) -> Result<VerificationCertificate> {
        ensure_finite(report)?;

        let mut checks = Vec::with_capacity(self.rules.len() * ReportingPeriod::ALL.len());

        for rule in &self.rules {
            for period in ReportingPeriod::ALL {
                let check = rule.evaluate(report, period);

                if !check.is_evaluated() {
                    debug!(
                        check = %check.identity,
                        period = %period,
                        "Check not evaluated"
                    );
                } else if !check.passed {
                    warn!(
                        check = %check.identity,
                        period = %period,
                        discrepancy = check.discrepancy,
                        "Accounting identity violated"
                    );
                }

                checks.push(check);
            }
        }

        let overall_status = derive_status(&checks);
        let data_quality = note_reference_issues(report);

        for issue in &data_quality {
            warn!(section = %issue.section, detail = %issue.detail, "Data quality issue");
        }

        info!(
            check_count = checks.len(),
            status = %overall_status,
            "Verification completed"
        );

        Ok(VerificationCertificate {
            overall_status,
            checks,
            data_quality,
            timestamp: Utc::now(),
        })
    }
}

impl Default for VerificationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Verify with the standard three identities.
pub fn verify(report: &Report) -> Result<VerificationCertificate> {
    create_default_verification_engine().verify(report)
}

/// Failures win over warnings; warnings come only from checks that
/// could not be evaluated.
pub fn derive_status(checks: &[VerificationCheck]) -> OverallStatus {
    if checks.iter().any(|c| c.is_evaluated() && !c.passed) {
        OverallStatus::Failed
    } else if checks.iter().any(|c| !c.is_evaluated()) {
        OverallStatus::PassedWithWarnings
    } else {
        OverallStatus::Passed
    }
}

/// Round to cents so float noise cannot flip a comparison at the tolerance.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `abs(discrepancy) <= TOLERANCE`, compared after rounding to cents.
/// Sub-cent excess therefore passes: 1.004 is accepted, 1.01 is not.
pub fn within_tolerance(discrepancy: f64) -> bool {
    round_cents(discrepancy).abs() <= TOLERANCE
}

fn ensure_finite(report: &Report) -> Result<()> {
    for (path, items) in report.sections() {
        for (i, item) in items.iter().enumerate() {
            if !item.amount_current.is_finite() || !item.amount_prior.is_finite() {
                return Err(OrchestrationError::MalformedReport(format!(
                    "{}[{}] ({}) has a non-finite amount",
                    path, i, item.label
                )));
            }
        }
    }

    let bs = &report.balance_sheet;
    let totals = [
        ("incomeStatement.netProfit", &report.income_statement.net_profit),
        ("balanceSheet.totalAssets", &bs.total_assets),
        ("balanceSheet.totalLiabilities", &bs.total_liabilities),
        ("balanceSheet.totalEquity", &bs.total_equity),
        ("cashFlowStatement.netChangeInCash", &report.cash_flow_statement.net_change_in_cash),
    ];

    for (path, total) in totals {
        for period in ReportingPeriod::ALL {
            if total_amount(total, period).is_some_and(|v| !v.is_finite()) {
                return Err(OrchestrationError::MalformedReport(format!(
                    "{}.{} is not a finite number",
                    path,
                    period.amount_field()
                )));
            }
        }
    }

    Ok(())
}

fn not_evaluated(
    identity: AccountingIdentity,
    period: ReportingPeriod,
    missing: &[&str],
) -> VerificationCheck {
    VerificationCheck {
        identity,
        period,
        principle: identity.principle().to_string(),
        calculation: String::new(),
        reported: None,
        discrepancy: 0.0,
        passed: true,
        notes: Some(format!(
            "Not evaluated: {} missing for the {} period",
            missing.join(", "),
            period
        )),
    }
}

fn evaluated(
    identity: AccountingIdentity,
    period: ReportingPeriod,
    calculation: String,
    reported: f64,
    discrepancy: f64,
) -> VerificationCheck {
    let discrepancy = round_cents(discrepancy);

    VerificationCheck {
        identity,
        period,
        principle: identity.principle().to_string(),
        calculation,
        reported: Some(reported),
        discrepancy,
        passed: discrepancy.abs() <= TOLERANCE,
        notes: None,
    }
}

fn missing_fields<'a>(
    fields: &[(&'a str, &Option<SingleValue>)],
    period: ReportingPeriod,
) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, value)| total_amount(value, period).is_none())
        .map(|(name, _)| *name)
        .collect()
}

//
// ================= Identity Rules =================
//

/// Rule: total assets equal total liabilities plus total equity
pub struct BalanceSheetEquationRule;

impl VerificationRule for BalanceSheetEquationRule {
    fn identity(&self) -> AccountingIdentity {
        AccountingIdentity::BalanceSheetEquation
    }

    fn evaluate(&self, report: &Report, period: ReportingPeriod) -> VerificationCheck {
        let bs = &report.balance_sheet;

        let (Some(assets), Some(liabilities), Some(equity)) = (
            total_amount(&bs.total_assets, period),
            total_amount(&bs.total_liabilities, period),
            total_amount(&bs.total_equity, period),
        ) else {
            let missing = missing_fields(
                &[
                    ("totalAssets", &bs.total_assets),
                    ("totalLiabilities", &bs.total_liabilities),
                    ("totalEquity", &bs.total_equity),
                ],
                period,
            );
            return not_evaluated(self.identity(), period, &missing);
        };

        let discrepancy = assets - (liabilities + equity);

        evaluated(
            self.identity(),
            period,
            format!(
                "totalAssets - (totalLiabilities + totalEquity) = {:.2} - ({:.2} + {:.2})",
                assets, liabilities, equity
            ),
            round_cents(discrepancy),
            discrepancy,
        )
    }
}

/// Rule: reported net profit equals revenue minus expenses
pub struct IncomeStatementIntegrityRule;

impl VerificationRule for IncomeStatementIntegrityRule {
    fn identity(&self) -> AccountingIdentity {
        AccountingIdentity::IncomeStatementIntegrity
    }

    fn evaluate(&self, report: &Report, period: ReportingPeriod) -> VerificationCheck {
        let is = &report.income_statement;

        let Some(reported) = total_amount(&is.net_profit, period) else {
            return not_evaluated(self.identity(), period, &["netProfit"]);
        };

        let revenue = sum_items(&is.revenue, period);
        let expenses = sum_items(&is.expenses, period);
        let computed = revenue - expenses;

        evaluated(
            self.identity(),
            period,
            format!(
                "sum(revenue) - sum(expenses) = {:.2} - {:.2} = {:.2}",
                revenue, expenses, computed
            ),
            reported,
            computed - reported,
        )
    }
}

/// Rule: reported net change in cash equals the sum of all activities
pub struct CashFlowIntegrityRule;

impl VerificationRule for CashFlowIntegrityRule {
    fn identity(&self) -> AccountingIdentity {
        AccountingIdentity::CashFlowIntegrity
    }

    fn evaluate(&self, report: &Report, period: ReportingPeriod) -> VerificationCheck {
        let cf = &report.cash_flow_statement;

        let Some(reported) = total_amount(&cf.net_change_in_cash, period) else {
            return not_evaluated(self.identity(), period, &["netChangeInCash"]);
        };

        let operating = sum_items(&cf.operating_activities, period);
        let investing = sum_items(&cf.investing_activities, period);
        let financing = sum_items(&cf.financing_activities, period);
        let computed = operating + investing + financing;

        evaluated(
            self.identity(),
            period,
            format!(
                "operating + investing + financing = {:.2} + {:.2} + {:.2} = {:.2}",
                operating, investing, financing, computed
            ),
            reported,
            computed - reported,
        )
    }
}

/// Create a default verification engine with the standard identities
pub fn create_default_verification_engine() -> VerificationEngine {
    let mut engine = VerificationEngine::new();
    engine.add_rule(Box::new(BalanceSheetEquationRule));
    engine.add_rule(Box::new(IncomeStatementIntegrityRule));
    engine.add_rule(Box::new(CashFlowIntegrityRule));
    engine
}

//
// ================= Note References =================
//

fn note_reference_issues(report: &Report) -> Vec<DataQualityIssue> {
    let is = &report.income_statement;
    let bs = &report.balance_sheet;
    let cf = &report.cash_flow_statement;

    let mut issues = Vec::new();

    section_note_issues(
        "incomeStatement",
        &is.notes,
        &[&is.revenue, &is.expenses],
        &[&is.gross_profit, &is.operating_income, &is.net_profit],
        &mut issues,
    );
    section_note_issues(
        "balanceSheet",
        &bs.notes,
        &[
            &bs.current_assets,
            &bs.non_current_assets,
            &bs.current_liabilities,
            &bs.non_current_liabilities,
            &bs.equity,
        ],
        &[&bs.total_assets, &bs.total_liabilities, &bs.total_equity],
        &mut issues,
    );
    section_note_issues(
        "cashFlowStatement",
        &cf.notes,
        &[
            &cf.operating_activities,
            &cf.investing_activities,
            &cf.financing_activities,
        ],
        &[&cf.net_change_in_cash],
        &mut issues,
    );

    issues
}

fn section_note_issues(
    section: &str,
    notes: &[Note],
    item_groups: &[&Vec<FinancialLineItem>],
    totals: &[&Option<SingleValue>],
    issues: &mut Vec<DataQualityIssue>,
) {
    let index = NoteIndex::build(notes);

    for id in index.duplicates() {
        issues.push(DataQualityIssue {
            section: section.to_string(),
            detail: format!("note id {} is defined more than once", id),
        });
    }

    let item_refs = item_groups
        .iter()
        .flat_map(|items| items.iter())
        .filter_map(|item| item.note_ref.map(|id| (item.label.as_str(), id)));

    let total_refs = totals
        .iter()
        .copied()
        .filter_map(|total| total.as_ref().and_then(|t| t.note_ref))
        .map(|id| ("total", id));

    for (label, id) in item_refs.chain(total_refs) {
        if index.resolve(id).is_none() {
            issues.push(DataQualityIssue {
                section: section.to_string(),
                detail: format!("'{}' references missing note {}", label, id),
            });
        }
    }
}

//
// ================= Tests =================
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BalanceSheet, CashFlowStatement, IncomeStatement};

    fn item(label: &str, current: f64, prior: f64) -> FinancialLineItem {
        FinancialLineItem::new(label, current, prior)
    }

    fn consistent_report() -> Report {
        Report {
            summary: "Test".to_string(),
            kpis: vec![],
            income_statement: IncomeStatement {
                revenue: vec![item("Sales", 1000.0, 900.0), item("Other income", 50.0, 20.0)],
                expenses: vec![item("Cost of sales", 600.0, 500.0), item("Admin", 150.0, 120.0)],
                gross_profit: Some(SingleValue::new(450.0, 420.0)),
                operating_income: Some(SingleValue::new(300.0, 300.0)),
                net_profit: Some(SingleValue::new(300.0, 300.0)),
                notes: vec![],
            },
            balance_sheet: BalanceSheet {
                current_assets: vec![item("Cash", 400.0, 300.0)],
                non_current_assets: vec![item("Equipment", 600.0, 500.0)],
                current_liabilities: vec![item("Payables", 300.0, 250.0)],
                non_current_liabilities: vec![item("Loans", 400.0, 350.0)],
                equity: vec![item("Share capital", 200.0, 200.0), item("Retained earnings", 100.0, 0.0)],
                total_assets: Some(SingleValue::new(1000.0, 800.0)),
                total_liabilities: Some(SingleValue::new(700.0, 600.0)),
                total_equity: Some(SingleValue::new(300.0, 200.0)),
                notes: vec![],
            },
            cash_flow_statement: CashFlowStatement {
                operating_activities: vec![item("Operations", 250.0, 200.0)],
                investing_activities: vec![item("Capex", -100.0, -80.0)],
                financing_activities: vec![item("Dividends", -50.0, -40.0)],
                net_change_in_cash: Some(SingleValue::new(100.0, 80.0)),
                notes: vec![],
            },
        }
    }

    #[test]
    fn test_tolerance_compares_at_cent_precision() {
        assert!(within_tolerance(1.0));
        assert!(within_tolerance(-1.004));
        assert!(!within_tolerance(1.01));
        assert!(!within_tolerance(-1.006));
    }

    #[test]
    fn test_consistent_report_passes() {
        let certificate = verify(&consistent_report()).unwrap();

        assert_eq!(certificate.overall_status, OverallStatus::Passed);
        assert_eq!(certificate.checks.len(), 6);
        assert!(certificate.checks.iter().all(|c| c.passed && c.is_evaluated()));
    }

    #[test]
    fn test_balance_sheet_discrepancy_example() {
        let mut report = consistent_report();
        report.balance_sheet.total_equity = Some(SingleValue::new(250.0, 200.0));

        let certificate = verify(&report).unwrap();
        assert_eq!(certificate.overall_status, OverallStatus::Failed);

        let check = certificate
            .checks
            .iter()
            .find(|c| {
                c.identity == AccountingIdentity::BalanceSheetEquation
                    && c.period == ReportingPeriod::Current
            })
            .unwrap();
        assert!(!check.passed);
        assert_eq!(check.discrepancy, 50.0);

        let prior = certificate
            .checks
            .iter()
            .find(|c| {
                c.identity == AccountingIdentity::BalanceSheetEquation
                    && c.period == ReportingPeriod::Prior
            })
            .unwrap();
        assert!(prior.passed);
    }

    #[test]
    fn test_tolerance_boundary() {
        let mut report = consistent_report();
        report.income_statement.net_profit = Some(SingleValue::new(299.0, 300.0));
        let at_tolerance = verify(&report).unwrap();
        assert_eq!(at_tolerance.overall_status, OverallStatus::Passed);

        report.income_statement.net_profit = Some(SingleValue::new(298.99, 300.0));
        let over = verify(&report).unwrap();
        assert_eq!(over.overall_status, OverallStatus::Failed);
        assert_eq!(
            over.failed_labels(),
            vec!["Income Statement Integrity (current)".to_string()]
        );
    }

    #[test]
    fn test_missing_total_assets_is_warning() {
        let mut report = consistent_report();
        report.balance_sheet.total_assets = Some(SingleValue {
            amount_current: None,
            amount_prior: Some(800.0),
            note_ref: None,
        });

        let certificate = verify(&report).unwrap();
        assert_eq!(certificate.overall_status, OverallStatus::PassedWithWarnings);

        let skipped: Vec<_> = certificate.checks.iter().filter(|c| !c.is_evaluated()).collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].period, ReportingPeriod::Current);
        assert!(skipped[0].passed);
        assert_eq!(skipped[0].discrepancy, 0.0);
        assert!(skipped[0].notes.as_deref().unwrap().contains("totalAssets"));
    }

    #[test]
    fn test_failure_outranks_warning() {
        let mut report = consistent_report();
        report.cash_flow_statement.net_change_in_cash = None;
        report.income_statement.net_profit = Some(SingleValue::new(10.0, 300.0));

        let certificate = verify(&report).unwrap();
        assert_eq!(certificate.overall_status, OverallStatus::Failed);
    }

    #[test]
    fn test_verify_is_idempotent() {
        let report = consistent_report();
        let snapshot = report.clone();

        let mut first = verify(&report).unwrap();
        let second = verify(&report).unwrap();
        first.timestamp = second.timestamp;

        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(report, snapshot);
    }

    #[test]
    fn test_dangling_note_ref_is_data_quality_only() {
        let mut report = consistent_report();
        report.balance_sheet.notes = vec![Note { id: 1, content: "PP&E at cost".into() }];
        report.balance_sheet.non_current_assets[0].note_ref = Some(1);
        report.balance_sheet.current_assets[0].note_ref = Some(7);

        let certificate = verify(&report).unwrap();
        assert_eq!(certificate.overall_status, OverallStatus::Passed);
        assert_eq!(certificate.data_quality.len(), 1);
        assert!(certificate.data_quality[0].detail.contains("missing note 7"));
    }

    #[test]
    fn test_non_finite_amount_is_malformed() {
        let mut report = consistent_report();
        report.income_statement.expenses[1].amount_prior = f64::NAN;

        let err = verify(&report).unwrap_err();
        assert!(matches!(err, OrchestrationError::MalformedReport(_)));
    }
}
