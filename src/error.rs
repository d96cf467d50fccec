//! Error types for the financial report orchestrator

use crate::agent::AttemptRecord;
use crate::models::ReportingPeriod;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Correction Loop Errors
    // =============================

    /// The generator could not be reached, refused the request, or
    /// returned output that does not parse as a report. Never retried.
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Could not produce a consistent report after {attempts} attempts (still failing: {})", .failed_checks.join(", "))]
    VerificationBudgetExceeded {
        attempts: u32,
        failed_checks: Vec<String>,
        /// Every attempt made, oldest first.
        history: Vec<AttemptRecord>,
    },

    #[error("Report generation cancelled after {attempts} attempt(s)")]
    Cancelled {
        attempts: u32,
        history: Vec<AttemptRecord>,
    },

    #[error("Malformed report: {0}")]
    MalformedReport(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("No retained-earnings line to adjust in the {period} period balance sheet")]
    MissingPlugLine { period: ReportingPeriod },

    // =============================
    // Collaborator Errors
    // =============================

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// True for outcomes the user chose or the model produced, as opposed
    /// to infrastructure failures that are worth retrying later.
    pub fn is_terminal_verification_failure(&self) -> bool {
        matches!(
            self,
            OrchestrationError::VerificationBudgetExceeded { .. }
                | OrchestrationError::MissingPlugLine { .. }
        )
    }

    /// Attempts completed before the run stopped. Empty for errors raised
    /// outside the correction loop.
    pub fn history(&self) -> &[AttemptRecord] {
        match self {
            OrchestrationError::VerificationBudgetExceeded { history, .. }
            | OrchestrationError::Cancelled { history, .. } => history,
            _ => &[],
        }
    }
}
