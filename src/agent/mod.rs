//! Correction orchestrator - implements the bounded repair loop
//!
//! GENERATE → VERIFY → (CORRECT → VERIFY)* → DONE
//!
//! Each call owns its report, certificate and attempt counter. Nothing is
//! shared between calls, so concurrent runs need no locking.

use crate::audit::compute_report_hash;
use crate::correction::{build_directives, directive_strings};
use crate::documents::SourceDocument;
use crate::error::OrchestrationError;
use crate::generator::{GenerationConfig, ReportGenerator};
use crate::models::{OverallStatus, Report, VerificationCertificate};
use crate::verification::VerificationEngine;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Total generator calls per run (1 generate + 4 fixes).
pub const MAX_ATTEMPTS: u32 = 5;

//
// ================= Cancellation =================
//

/// Shared cancellation flag, checked around every generator call.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

//
// ================= States & Progress =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CorrectionState {
    Idle,
    Generating,
    Verifying { attempt: u32 },
    Correcting { attempt: u32 },
    Done { status: OverallStatus },
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    StateChanged {
        state: CorrectionState,
    },
    AttemptStarted {
        attempt: u32,
    },
    Verified {
        attempt: u32,
        status: OverallStatus,
        failed_checks: Vec<String>,
    },
    DirectivesIssued {
        attempt: u32,
        directives: Vec<String>,
    },
}

pub type ProgressHandler = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Per-run controls supplied by the caller.
#[derive(Clone, Default)]
pub struct RunOptions {
    pub cancellation: CancellationToken,
    pub progress: Option<ProgressHandler>,
}

impl RunOptions {
    pub fn with_progress(mut self, handler: ProgressHandler) -> Self {
        self.progress = Some(handler);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(handler) = &self.progress {
            handler(&event);
        }
    }

    fn enter(&self, state: CorrectionState) {
        debug!(?state, "Correction state");
        self.emit(ProgressEvent::StateChanged { state });
    }

    /// Stops the run if cancelled. The attempts made so far move into the
    /// error so the caller can still audit them.
    fn checkpoint(&self, attempts: u32, history: &mut Vec<AttemptRecord>) -> Result<()> {
        if self.cancellation.is_cancelled() {
            warn!(attempts, "Correction run cancelled");
            self.enter(CorrectionState::Cancelled);
            return Err(OrchestrationError::Cancelled {
                attempts,
                history: std::mem::take(history),
            });
        }
        Ok(())
    }
}

//
// ================= Outcome =================
//

/// One generate-or-fix call and its verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub attempt: u32,
    pub report_hash: String,
    pub report: Report,
    pub certificate: VerificationCertificate,
    /// Directives that produced this report; empty for the first attempt.
    pub directives: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionOutcome {
    pub report: Report,
    pub certificate: VerificationCertificate,
    pub attempts: u32,
    pub history: Vec<AttemptRecord>,
    pub execution_time_ms: u64,
}

/// Loop steps. Each variant owns exactly the data the next step needs.
enum Step {
    Generate,
    Verify {
        report: Report,
        directives: Vec<String>,
    },
    Correct {
        report: Report,
        certificate: VerificationCertificate,
    },
    Done {
        report: Report,
        certificate: VerificationCertificate,
    },
}

//
// ================= Orchestrator =================
//

/// Drives generation until the report verifies or the budget runs out
pub struct CorrectionOrchestrator {
    generator: Box<dyn ReportGenerator>,
    verification_engine: VerificationEngine,
}

impl CorrectionOrchestrator {
    pub fn new(
        generator: Box<dyn ReportGenerator>,
        verification_engine: VerificationEngine,
    ) -> Self {
        Self {
            generator,
            verification_engine,
        }
    }

    /// Run the generate/verify/correct loop
    pub async fn run_with_correction(
        &self,
        prior: &SourceDocument,
        current: &SourceDocument,
        config: &GenerationConfig,
        options: &RunOptions,
    ) -> Result<CorrectionOutcome> {
        let start_time = Instant::now();
        let mut attempt: u32 = 0;
        let mut history: Vec<AttemptRecord> = Vec::new();
        let mut step = Step::Generate;

        info!(
            company = %config.company,
            period = %config.period_key(),
            "Correction run starting"
        );
        options.enter(CorrectionState::Idle);

        loop {
            step = match step {
                Step::Generate => {
                    options.checkpoint(attempt, &mut history)?;

                    attempt = 1;
                    options.enter(CorrectionState::Generating);
                    options.emit(ProgressEvent::AttemptStarted { attempt });

                    let report = self.generator.generate(prior, current, config).await?;
                    options.checkpoint(attempt, &mut history)?;

                    Step::Verify {
                        report,
                        directives: Vec::new(),
                    }
                }

                Step::Verify { report, directives } => {
                    options.enter(CorrectionState::Verifying { attempt });

                    let certificate = self.verification_engine.verify(&report)?;
                    let status = certificate.overall_status;
                    let failed_checks = certificate.failed_labels();

                    info!(attempt, status = %status, failed = failed_checks.len(), "Attempt verified");

                    history.push(AttemptRecord {
                        attempt,
                        report_hash: compute_report_hash(&report),
                        report: report.clone(),
                        certificate: certificate.clone(),
                        directives,
                    });

                    options.emit(ProgressEvent::Verified {
                        attempt,
                        status,
                        failed_checks: failed_checks.clone(),
                    });

                    if status.is_acceptable() {
                        Step::Done {
                            report,
                            certificate,
                        }
                    } else if attempt >= MAX_ATTEMPTS {
                        warn!(
                            attempts = attempt,
                            failed = ?failed_checks,
                            "Correction budget exhausted"
                        );
                        options.enter(CorrectionState::Done {
                            status: OverallStatus::Failed,
                        });
                        return Err(OrchestrationError::VerificationBudgetExceeded {
                            attempts: attempt,
                            failed_checks,
                            history,
                        });
                    } else {
                        Step::Correct {
                            report,
                            certificate,
                        }
                    }
                }

                Step::Correct {
                    report,
                    certificate,
                } => {
                    options.checkpoint(attempt, &mut history)?;

                    let directives = match build_directives(&certificate, &report) {
                        Ok(directives) => directive_strings(&directives),
                        Err(e) => {
                            warn!(attempt, error = %e, "No repair possible");
                            return Err(e);
                        }
                    };

                    attempt += 1;
                    options.enter(CorrectionState::Correcting { attempt });
                    options.emit(ProgressEvent::AttemptStarted { attempt });
                    options.emit(ProgressEvent::DirectivesIssued {
                        attempt,
                        directives: directives.clone(),
                    });

                    let fixed = self.generator.fix(&report, &directives, config).await?;
                    options.checkpoint(attempt, &mut history)?;

                    Step::Verify {
                        report: fixed,
                        directives,
                    }
                }

                Step::Done {
                    report,
                    certificate,
                } => {
                    options.enter(CorrectionState::Done {
                        status: certificate.overall_status,
                    });

                    info!(
                        attempts = attempt,
                        status = %certificate.overall_status,
                        "Correction run complete"
                    );

                    return Ok(CorrectionOutcome {
                        report,
                        certificate,
                        attempts: attempt,
                        history,
                        execution_time_ms: start_time.elapsed().as_millis() as u64,
                    });
                }
            };
        }
    }
}
