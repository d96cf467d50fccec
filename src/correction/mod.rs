//! Correction instruction generator
//!
//! Turns the failed checks of a certificate into minimal repair directives
//! for the generator. Each directive names the field path to change and
//! the arithmetically derived target value. Pure and deterministic.

use crate::error::OrchestrationError;
use crate::models::{
    sum_items, total_amount, AccountingIdentity, FinancialLineItem, Report, ReportingPeriod,
    VerificationCertificate,
};
use crate::verification::{round_cents, within_tolerance};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Label fragments that identify the accumulated-earnings equity line.
const PLUG_LINE_KEYWORDS: &[&str] = &[
    "retained earnings",
    "retained profit",
    "accumulated profit",
    "accumulated earnings",
    "accumulated deficit",
    "accumulated losses",
    "undistributed earnings",
    "profit and loss reserve",
];

/// A single field change inside a directive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldAdjustment {
    pub field_path: String,
    pub label: String,
    pub from: Option<f64>,
    pub to: f64,
}

impl fmt::Display for FieldAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.from {
            Some(from) => write!(
                f,
                "set {} ({}) from {:.2} to {:.2}",
                self.field_path, self.label, from, self.to
            ),
            None => write!(f, "set {} ({}) to {:.2}", self.field_path, self.label, self.to),
        }
    }
}

/// Repair steps for one failed check. Adjustments apply in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionDirective {
    pub identity: AccountingIdentity,
    pub period: ReportingPeriod,
    pub adjustments: Vec<FieldAdjustment>,
}

impl fmt::Display for CorrectionDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} | {} period] ", self.identity, self.period)?;

        for (i, adjustment) in self.adjustments.iter().enumerate() {
            if i > 0 {
                write!(f, "; then ")?;
            }
            write!(f, "{}", adjustment)?;
        }

        write!(f, ". Leave every other value unchanged.")
    }
}

/// Build directives for every failed check, in certificate order.
pub fn build_directives(
    certificate: &VerificationCertificate,
    report: &Report,
) -> Result<Vec<CorrectionDirective>> {
    let mut directives = Vec::new();

    for check in certificate.failed_checks() {
        let directive = match check.identity {
            AccountingIdentity::BalanceSheetEquation => {
                balance_sheet_directive(report, check.period)?
            }
            AccountingIdentity::IncomeStatementIntegrity => {
                income_statement_directive(report, check.period)
            }
            AccountingIdentity::CashFlowIntegrity => cash_flow_directive(report, check.period),
        };

        debug!(
            check = %check.identity,
            period = %check.period,
            adjustments = directive.adjustments.len(),
            "Directive built"
        );

        directives.push(directive);
    }

    Ok(directives)
}

/// Directive texts as handed to the generator's fix entry point.
pub fn directive_strings(directives: &[CorrectionDirective]) -> Vec<String> {
    directives.iter().map(ToString::to_string).collect()
}

/// Index of the equity line used to force the balance-sheet equation.
/// The last matching line wins.
pub fn find_plug_line(equity: &[FinancialLineItem]) -> Option<usize> {
    equity.iter().rposition(|item| {
        let label = item.label.to_lowercase();
        PLUG_LINE_KEYWORDS.iter().any(|k| label.contains(k))
    })
}

fn field_path(section: &str, period: ReportingPeriod) -> String {
    format!("{}.{}", section, period.amount_field())
}

/// Push an adjustment unless the reported value already equals the target
/// to the cent. Totals that are only within tolerance still get restated,
/// since their small differences can add up past the tolerance of the
/// equation they feed.
fn adjust_if_needed(
    adjustments: &mut Vec<FieldAdjustment>,
    section: &str,
    label: &str,
    reported: Option<f64>,
    target: f64,
    period: ReportingPeriod,
) {
    let target = round_cents(target);

    if reported.map(round_cents) == Some(target) {
        return;
    }

    adjustments.push(FieldAdjustment {
        field_path: field_path(section, period),
        label: label.to_string(),
        from: reported,
        to: target,
    });
}

fn balance_sheet_directive(
    report: &Report,
    period: ReportingPeriod,
) -> Result<CorrectionDirective> {
    let bs = &report.balance_sheet;
    let mut adjustments = Vec::new();

    // Category totals first, then the equation itself.
    let assets = sum_items(&bs.current_assets, period) + sum_items(&bs.non_current_assets, period);
    let liabilities = sum_items(&bs.current_liabilities, period)
        + sum_items(&bs.non_current_liabilities, period);
    let equity = sum_items(&bs.equity, period);

    adjust_if_needed(
        &mut adjustments,
        "balanceSheet.totalAssets",
        "Total assets = currentAssets + nonCurrentAssets",
        total_amount(&bs.total_assets, period),
        assets,
        period,
    );
    adjust_if_needed(
        &mut adjustments,
        "balanceSheet.totalLiabilities",
        "Total liabilities = currentLiabilities + nonCurrentLiabilities",
        total_amount(&bs.total_liabilities, period),
        liabilities,
        period,
    );

    if within_tolerance(assets - liabilities - equity) {
        adjust_if_needed(
            &mut adjustments,
            "balanceSheet.totalEquity",
            "Total equity = sum(equity)",
            total_amount(&bs.total_equity, period),
            equity,
            period,
        );
    } else {
        let plug = find_plug_line(&bs.equity)
            .ok_or(OrchestrationError::MissingPlugLine { period })?;
        let plug_item = &bs.equity[plug];

        let other_equity = equity - plug_item.amount(period);
        let residual = round_cents(assets - liabilities - other_equity);

        adjustments.push(FieldAdjustment {
            field_path: format!("balanceSheet.equity[{}].{}", plug, period.amount_field()),
            label: plug_item.label.clone(),
            from: Some(plug_item.amount(period)),
            to: residual,
        });
        adjustments.push(FieldAdjustment {
            field_path: field_path("balanceSheet.totalEquity", period),
            label: "Total equity = sum(equity) after the adjustment above".to_string(),
            from: total_amount(&bs.total_equity, period),
            to: round_cents(other_equity + residual),
        });
    }

    Ok(CorrectionDirective {
        identity: AccountingIdentity::BalanceSheetEquation,
        period,
        adjustments,
    })
}

fn income_statement_directive(report: &Report, period: ReportingPeriod) -> CorrectionDirective {
    let is = &report.income_statement;
    let computed = sum_items(&is.revenue, period) - sum_items(&is.expenses, period);

    CorrectionDirective {
        identity: AccountingIdentity::IncomeStatementIntegrity,
        period,
        adjustments: vec![FieldAdjustment {
            field_path: field_path("incomeStatement.netProfit", period),
            label: "Net profit = sum(revenue) - sum(expenses)".to_string(),
            from: total_amount(&is.net_profit, period),
            to: round_cents(computed),
        }],
    }
}

fn cash_flow_directive(report: &Report, period: ReportingPeriod) -> CorrectionDirective {
    let cf = &report.cash_flow_statement;
    let computed = sum_items(&cf.operating_activities, period)
        + sum_items(&cf.investing_activities, period)
        + sum_items(&cf.financing_activities, period);

    CorrectionDirective {
        identity: AccountingIdentity::CashFlowIntegrity,
        period,
        adjustments: vec![FieldAdjustment {
            field_path: field_path("cashFlowStatement.netChangeInCash", period),
            label: "Net change in cash = operating + investing + financing".to_string(),
            from: total_amount(&cf.net_change_in_cash, period),
            to: round_cents(computed),
        }],
    }
}
