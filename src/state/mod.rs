//! Report persistence layer
//!
//! Stores a verified report and its certificate keyed by company and
//! year pair. In-memory for development, Postgres when configured.

use crate::audit::compute_report_hash;
use crate::error::OrchestrationError;
use crate::models::{Report, VerificationCertificate};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredReport {
    pub company: String,
    pub period_key: String,
    pub report: Report,
    pub certificate: VerificationCertificate,
    pub report_hash: String,
    pub stored_at: DateTime<Utc>,
}

impl StoredReport {
    pub fn new(
        company: impl Into<String>,
        period_key: impl Into<String>,
        report: Report,
        certificate: VerificationCertificate,
    ) -> Self {
        Self {
            company: company.into(),
            period_key: period_key.into(),
            report_hash: compute_report_hash(&report),
            report,
            certificate,
            stored_at: Utc::now(),
        }
    }
}

/// Trait for report persistence
#[async_trait::async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert or replace the report for (company, period_key)
    async fn save(&self, stored: StoredReport) -> Result<()>;
    async fn load(&self, company: &str, period_key: &str) -> Result<Option<StoredReport>>;
    /// Period keys stored for a company, newest first
    async fn list(&self, company: &str) -> Result<Vec<String>>;
}

/// In-memory report store for development
pub struct InMemoryReportStore {
    reports: Arc<RwLock<HashMap<(String, String), StoredReport>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            reports: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ReportStore for InMemoryReportStore {
    async fn save(&self, stored: StoredReport) -> Result<()> {
        let key = (stored.company.clone(), stored.period_key.clone());
        let mut reports = self.reports.write().await;
        reports.insert(key, stored);
        Ok(())
    }

    async fn load(&self, company: &str, period_key: &str) -> Result<Option<StoredReport>> {
        let reports = self.reports.read().await;
        Ok(reports
            .get(&(company.to_string(), period_key.to_string()))
            .cloned())
    }

    async fn list(&self, company: &str) -> Result<Vec<String>> {
        let reports = self.reports.read().await;

        let mut items: Vec<_> = reports
            .values()
            .filter(|stored| stored.company == company)
            .map(|stored| (stored.period_key.clone(), stored.stored_at))
            .collect();

        items.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(items.into_iter().map(|(key, _)| key).collect())
    }
}

/// Postgres-backed report store
pub struct PgReportStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgReportStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        info!("Connected to Postgres report store");

        Ok(Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        })
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS financial_reports (
                      company TEXT NOT NULL,
                      period_key TEXT NOT NULL,
                      report_json TEXT NOT NULL,
                      certificate_json TEXT NOT NULL,
                      report_hash TEXT NOT NULL,
                      stored_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                      PRIMARY KEY (company, period_key)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await
                .map(|_| ())
            })
            .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl ReportStore for PgReportStore {
    async fn save(&self, stored: StoredReport) -> Result<()> {
        self.ensure_schema().await?;

        let report_json = serde_json::to_string(&stored.report)?;
        let certificate_json = serde_json::to_string(&stored.certificate)?;

        sqlx::query(
            r#"
            INSERT INTO financial_reports
              (company, period_key, report_json, certificate_json, report_hash, stored_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (company, period_key) DO UPDATE SET
              report_json = EXCLUDED.report_json,
              certificate_json = EXCLUDED.certificate_json,
              report_hash = EXCLUDED.report_hash,
              stored_at = EXCLUDED.stored_at
            "#,
        )
        .bind(&stored.company)
        .bind(&stored.period_key)
        .bind(report_json)
        .bind(certificate_json)
        .bind(&stored.report_hash)
        .bind(stored.stored_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, company: &str, period_key: &str) -> Result<Option<StoredReport>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            SELECT report_json, certificate_json, report_hash, stored_at
            FROM financial_reports
            WHERE company = $1 AND period_key = $2
            "#,
        )
        .bind(company)
        .bind(period_key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let report_json: String = row.try_get("report_json")?;
        let certificate_json: String = row.try_get("certificate_json")?;

        let report: Report = serde_json::from_str(&report_json).map_err(|e| {
            OrchestrationError::Persistence(format!("Stored report is corrupt: {}", e))
        })?;
        let certificate: VerificationCertificate = serde_json::from_str(&certificate_json)
            .map_err(|e| {
                OrchestrationError::Persistence(format!("Stored certificate is corrupt: {}", e))
            })?;

        Ok(Some(StoredReport {
            company: company.to_string(),
            period_key: period_key.to_string(),
            report,
            certificate,
            report_hash: row.try_get("report_hash")?,
            stored_at: row.try_get("stored_at")?,
        }))
    }

    async fn list(&self, company: &str) -> Result<Vec<String>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT period_key FROM financial_reports
            WHERE company = $1
            ORDER BY stored_at DESC
            "#,
        )
        .bind(company)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("period_key").map_err(Into::into))
            .collect()
    }
}
