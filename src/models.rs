//! Core data models for generated financial reports
//!
//! Reports are plain serializable data. Note references are weak ids,
//! resolved through a lookup table built per pass (see `NoteIndex`).

use crate::error::OrchestrationError;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

//
// ================= Periods =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReportingPeriod {
    Current,
    Prior,
}

impl ReportingPeriod {
    pub const ALL: [ReportingPeriod; 2] = [ReportingPeriod::Current, ReportingPeriod::Prior];

    /// Serialized field name of the amount for this period.
    pub fn amount_field(&self) -> &'static str {
        match self {
            ReportingPeriod::Current => "amountCurrent",
            ReportingPeriod::Prior => "amountPrior",
        }
    }
}

impl fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportingPeriod::Current => "current",
            ReportingPeriod::Prior => "prior",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Line Items =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FinancialLineItem {
    pub label: String,
    #[serde(alias = "amount2025")]
    pub amount_current: f64,
    #[serde(alias = "amount2024")]
    pub amount_prior: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_ref: Option<u32>,
}

impl FinancialLineItem {
    pub fn new(label: impl Into<String>, amount_current: f64, amount_prior: f64) -> Self {
        Self {
            label: label.into(),
            amount_current,
            amount_prior,
            note_ref: None,
        }
    }

    pub fn amount(&self, period: ReportingPeriod) -> f64 {
        match period {
            ReportingPeriod::Current => self.amount_current,
            ReportingPeriod::Prior => self.amount_prior,
        }
    }
}

/// A statement total. Either period may be absent when the generator
/// could not derive it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SingleValue {
    #[serde(default, alias = "amount2025", skip_serializing_if = "Option::is_none")]
    pub amount_current: Option<f64>,
    #[serde(default, alias = "amount2024", skip_serializing_if = "Option::is_none")]
    pub amount_prior: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_ref: Option<u32>,
}

impl SingleValue {
    pub fn new(amount_current: f64, amount_prior: f64) -> Self {
        Self {
            amount_current: Some(amount_current),
            amount_prior: Some(amount_prior),
            note_ref: None,
        }
    }

    pub fn amount(&self, period: ReportingPeriod) -> Option<f64> {
        match period {
            ReportingPeriod::Current => self.amount_current,
            ReportingPeriod::Prior => self.amount_prior,
        }
    }
}

/// Period amount of an optional total.
pub fn total_amount(value: &Option<SingleValue>, period: ReportingPeriod) -> Option<f64> {
    value.as_ref().and_then(|v| v.amount(period))
}

/// Sum of one period across a line-item sequence.
pub fn sum_items(items: &[FinancialLineItem], period: ReportingPeriod) -> f64 {
    items.iter().map(|item| item.amount(period)).sum()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: u32,
    pub content: String,
}

//
// ================= Statements =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IncomeStatement {
    #[serde(default)]
    pub revenue: Vec<FinancialLineItem>,
    #[serde(default)]
    pub expenses: Vec<FinancialLineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gross_profit: Option<SingleValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_income: Option<SingleValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_profit: Option<SingleValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheet {
    #[serde(default)]
    pub current_assets: Vec<FinancialLineItem>,
    #[serde(default)]
    pub non_current_assets: Vec<FinancialLineItem>,
    #[serde(default)]
    pub current_liabilities: Vec<FinancialLineItem>,
    #[serde(default)]
    pub non_current_liabilities: Vec<FinancialLineItem>,
    #[serde(default)]
    pub equity: Vec<FinancialLineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_assets: Option<SingleValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_liabilities: Option<SingleValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_equity: Option<SingleValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowStatement {
    #[serde(default)]
    pub operating_activities: Vec<FinancialLineItem>,
    #[serde(default)]
    pub investing_activities: Vec<FinancialLineItem>,
    #[serde(default)]
    pub financing_activities: Vec<FinancialLineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_change_in_cash: Option<SingleValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<Note>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<String>,
}

/// The unit that is verified and corrected as a whole.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub kpis: Vec<Kpi>,
    #[serde(default)]
    pub income_statement: IncomeStatement,
    #[serde(default)]
    pub balance_sheet: BalanceSheet,
    #[serde(default)]
    pub cash_flow_statement: CashFlowStatement,
}

impl Report {
    /// Parse a report, mapping shape errors to `MalformedReport`.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| OrchestrationError::MalformedReport(e.to_string()))
    }

    /// Every line-item sequence in the report, with its serialized path.
    pub fn sections(&self) -> [(&'static str, &[FinancialLineItem]); 10] {
        let is = &self.income_statement;
        let bs = &self.balance_sheet;
        let cf = &self.cash_flow_statement;
        [
            ("incomeStatement.revenue", is.revenue.as_slice()),
            ("incomeStatement.expenses", is.expenses.as_slice()),
            ("balanceSheet.currentAssets", bs.current_assets.as_slice()),
            ("balanceSheet.nonCurrentAssets", bs.non_current_assets.as_slice()),
            ("balanceSheet.currentLiabilities", bs.current_liabilities.as_slice()),
            ("balanceSheet.nonCurrentLiabilities", bs.non_current_liabilities.as_slice()),
            ("balanceSheet.equity", bs.equity.as_slice()),
            ("cashFlowStatement.operatingActivities", cf.operating_activities.as_slice()),
            ("cashFlowStatement.investingActivities", cf.investing_activities.as_slice()),
            ("cashFlowStatement.financingActivities", cf.financing_activities.as_slice()),
        ]
    }
}

//
// ================= Note Lookup =================
//

/// Id → note lookup for one statement section.
pub struct NoteIndex<'a> {
    notes: HashMap<u32, &'a Note>,
    duplicates: Vec<u32>,
}

impl<'a> NoteIndex<'a> {
    pub fn build(notes: &'a [Note]) -> Self {
        let mut index = HashMap::with_capacity(notes.len());
        let mut duplicates = Vec::new();

        for note in notes {
            if index.insert(note.id, note).is_some() {
                duplicates.push(note.id);
            }
        }

        Self {
            notes: index,
            duplicates,
        }
    }

    pub fn resolve(&self, id: u32) -> Option<&'a Note> {
        self.notes.get(&id).copied()
    }

    /// Ids that appear more than once in the section.
    pub fn duplicates(&self) -> &[u32] {
        &self.duplicates
    }
}

//
// ================= Verification =================
//

/// The accounting identities checked for each period.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AccountingIdentity {
    #[serde(rename = "Balance Sheet Equation")]
    BalanceSheetEquation,
    #[serde(rename = "Income Statement Integrity")]
    IncomeStatementIntegrity,
    #[serde(rename = "Cash Flow Integrity")]
    CashFlowIntegrity,
}

impl AccountingIdentity {
    pub const ALL: [AccountingIdentity; 3] = [
        AccountingIdentity::BalanceSheetEquation,
        AccountingIdentity::IncomeStatementIntegrity,
        AccountingIdentity::CashFlowIntegrity,
    ];

    pub fn principle(&self) -> &'static str {
        match self {
            AccountingIdentity::BalanceSheetEquation => "Assets = Liabilities + Equity",
            AccountingIdentity::IncomeStatementIntegrity => "Net Profit = Revenue - Expenses",
            AccountingIdentity::CashFlowIntegrity => {
                "Net Change in Cash = Operating + Investing + Financing"
            }
        }
    }
}

impl fmt::Display for AccountingIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountingIdentity::BalanceSheetEquation => "Balance Sheet Equation",
            AccountingIdentity::IncomeStatementIntegrity => "Income Statement Integrity",
            AccountingIdentity::CashFlowIntegrity => "Cash Flow Integrity",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OverallStatus {
    Passed,
    PassedWithWarnings,
    Failed,
}

impl OverallStatus {
    pub fn is_acceptable(&self) -> bool {
        !matches!(self, OverallStatus::Failed)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OverallStatus::Passed => "Passed",
            OverallStatus::PassedWithWarnings => "Passed with warnings",
            OverallStatus::Failed => "Failed",
        };
        write!(f, "{}", s)
    }
}

/// One identity evaluated for one period.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCheck {
    #[serde(rename = "name")]
    pub identity: AccountingIdentity,
    pub period: ReportingPeriod,
    pub principle: String,
    pub calculation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported: Option<f64>,
    pub discrepancy: f64,
    pub passed: bool,
    /// Set instead of the numeric fields when the check was not evaluated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl VerificationCheck {
    pub fn is_evaluated(&self) -> bool {
        self.notes.is_none()
    }

    /// Short label such as `Balance Sheet Equation (current)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.identity, self.period)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataQualityIssue {
    pub section: String,
    pub detail: String,
}

/// Structured output of one verification pass. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCertificate {
    pub overall_status: OverallStatus,
    pub checks: Vec<VerificationCheck>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_quality: Vec<DataQualityIssue>,
    pub timestamp: DateTime<Utc>,
}

impl VerificationCertificate {
    pub fn failed_checks(&self) -> impl Iterator<Item = &VerificationCheck> {
        self.checks.iter().filter(|c| c.is_evaluated() && !c.passed)
    }

    pub fn failed_labels(&self) -> Vec<String> {
        self.failed_checks().map(VerificationCheck::label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_accepts_year_aliases() {
        let item: FinancialLineItem = serde_json::from_str(
            r#"{ "label": "Sales", "amount2025": 120.5, "amount2024": 99.0, "noteRef": 3 }"#,
        )
        .unwrap();

        assert_eq!(item.amount_current, 120.5);
        assert_eq!(item.amount_prior, 99.0);
        assert_eq!(item.note_ref, Some(3));

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["amountCurrent"], 120.5);
        assert!(json.get("amount2025").is_none());
    }

    #[test]
    fn test_missing_amount_is_malformed() {
        let raw = r#"{ "incomeStatement": { "revenue": [ { "label": "Sales", "amountPrior": 1 } ] } }"#;
        let err = Report::from_json(raw).unwrap_err();
        assert!(matches!(err, OrchestrationError::MalformedReport(_)));
    }

    #[test]
    fn test_total_with_missing_period() {
        let total: SingleValue = serde_json::from_str(r#"{ "amountPrior": 10 }"#).unwrap();
        assert_eq!(total.amount(ReportingPeriod::Current), None);
        assert_eq!(total.amount(ReportingPeriod::Prior), Some(10.0));
    }

    #[test]
    fn test_note_index_tracks_duplicates() {
        let notes = vec![
            Note { id: 1, content: "a".into() },
            Note { id: 2, content: "b".into() },
            Note { id: 1, content: "c".into() },
        ];
        let index = NoteIndex::build(&notes);

        assert!(index.resolve(2).is_some());
        assert!(index.resolve(9).is_none());
        assert_eq!(index.duplicates(), &[1]);
    }

    #[test]
    fn test_check_identity_serializes_as_name() {
        let check = VerificationCheck {
            identity: AccountingIdentity::CashFlowIntegrity,
            period: ReportingPeriod::Prior,
            principle: AccountingIdentity::CashFlowIntegrity.principle().to_string(),
            calculation: String::new(),
            reported: None,
            discrepancy: 0.0,
            passed: true,
            notes: Some("netChangeInCash missing".into()),
        };
        let json = serde_json::to_value(&check).unwrap();
        assert_eq!(json["name"], "Cash Flow Integrity");
        assert_eq!(json["period"], "prior");
        assert!(!check.is_evaluated());
    }
}
