//! Financial Report Orchestrator
//!
//! Generates a comparative financial statement from two uploaded
//! documents and guarantees its numbers obey the basic accounting
//! identities before anyone sees them:
//! - Deterministic verification engine (no LLM in the checks)
//! - Targeted repair directives derived from failed checks
//! - Bounded, cancellable correction loop around the generator
//! - Per-attempt audit trail and report persistence
//!
//! LOOP:
//! GENERATE → VERIFY → (CORRECT → VERIFY)* → DONE

pub mod agent;
pub mod api;
pub mod audit;
pub mod config;
pub mod correction;
pub mod documents;
pub mod error;
pub mod gemini;
pub mod generator;
pub mod models;
pub mod state;
pub mod verification;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use agent::{CancellationToken, CorrectionOrchestrator, CorrectionOutcome, RunOptions};
pub use verification::verify;
