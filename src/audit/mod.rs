//! Audit trail for correction runs
//!
//! Every run, successful or not, is recorded with the content hash of each
//! attempt's report so successive attempts can be compared and replayed.

use crate::agent::{AttemptRecord, CorrectionOutcome};
use crate::error::OrchestrationError;
use crate::models::{OverallStatus, Report};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunResult {
    Completed { status: OverallStatus },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: Uuid,
    pub company: String,
    pub period_key: String,
    pub result: RunResult,
    pub attempts: Vec<AttemptRecord>,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn completed(company: &str, period_key: &str, outcome: &CorrectionOutcome) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            company: company.to_string(),
            period_key: period_key.to_string(),
            result: RunResult::Completed {
                status: outcome.certificate.overall_status,
            },
            attempts: outcome.history.clone(),
            created_at: Utc::now(),
        }
    }

    /// Keeps whatever attempts the error carries (budget exhaustion,
    /// cancellation) so they can still be diffed.
    pub fn failed(company: &str, period_key: &str, error: &OrchestrationError) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            company: company.to_string(),
            period_key: period_key.to_string(),
            result: RunResult::Failed {
                error: error.to_string(),
            },
            attempts: error.history().to_vec(),
            created_at: Utc::now(),
        }
    }
}

/// Audit trail storage
pub struct AuditLog {
    records: Arc<RwLock<HashMap<Uuid, RunRecord>>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store a run record
    pub async fn record(&self, record: RunRecord) -> Result<Uuid> {
        let run_id = record.run_id;
        let mut records = self.records.write().await;
        records.insert(run_id, record);
        Ok(run_id)
    }

    /// Retrieve a record by run ID
    pub async fn get(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&run_id).cloned())
    }

    /// List run IDs for a company (sorted by created_at)
    pub async fn list_for_company(&self, company: &str) -> Result<Vec<Uuid>> {
        let records = self.records.read().await;

        let mut items: Vec<_> = records
            .values()
            .filter(|record| record.company == company)
            .map(|record| (record.run_id, record.created_at))
            .collect();

        items.sort_by_key(|(_, created_at)| *created_at);

        Ok(items.into_iter().map(|(id, _)| id).collect())
    }

    /// Re-hash every stored attempt and compare with the recorded hash
    pub async fn verify_integrity(&self, run_id: Uuid) -> Result<bool> {
        let records = self.records.read().await;

        Ok(records.get(&run_id).is_some_and(|record| {
            record
                .attempts
                .iter()
                .all(|attempt| compute_report_hash(&attempt.report) == attempt.report_hash)
        }))
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute SHA256 hash of a report's canonical JSON
/// Streams serialization straight into the hasher
pub fn compute_report_hash(report: &Report) -> String {
    let mut hasher = Sha256::new();

    if serde_json::to_writer(&mut HashWriter(&mut hasher), report).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
