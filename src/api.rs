//! REST API Server for the Financial Report Orchestrator
//!
//! Exposes verification and generate-with-correction over HTTP.
//! Presentation (tables, charts, PDF) lives in the frontend.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::agent::{CorrectionOrchestrator, ProgressEvent, RunOptions};
use crate::audit::{AuditLog, RunRecord};
use crate::correction::{build_directives, CorrectionDirective};
use crate::documents::{EncodedDocument, SourceDocument};
use crate::error::OrchestrationError;
use crate::generator::GenerationConfig;
use crate::models::{Report, VerificationCertificate};
use crate::state::{ReportStore, StoredReport};
use crate::verification;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportRequest {
    pub company: String,
    pub current_label: String,
    pub prior_label: String,
    #[serde(default)]
    pub currency: Option<String>,
    pub prior_document: EncodedDocument,
    pub current_document: EncodedDocument,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyResponse {
    certificate: VerificationCertificate,
    directives: Vec<CorrectionDirective>,
    #[serde(skip_serializing_if = "Option::is_none")]
    directives_error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    report: Report,
    certificate: VerificationCertificate,
    attempts: u32,
    run_id: uuid::Uuid,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse>);

fn failure(status: StatusCode, message: String) -> ApiResult {
    (status, Json(ApiResponse::error(message)))
}

/// Distinct statuses for "model unreachable", "numbers never balanced"
/// and "cancelled".
pub fn error_status(err: &OrchestrationError) -> StatusCode {
    match err {
        OrchestrationError::Generation(_) => StatusCode::BAD_GATEWAY,
        e if e.is_terminal_verification_failure() => StatusCode::UNPROCESSABLE_ENTITY,
        OrchestrationError::Cancelled { .. } => StatusCode::CONFLICT,
        OrchestrationError::MalformedReport(_) | OrchestrationError::InvalidDocument(_) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<CorrectionOrchestrator>,
    pub store: Arc<dyn ReportStore>,
    pub audit_log: Arc<AuditLog>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Verify Endpoint
/// =============================

async fn verify_report(Json(report): Json<Report>) -> ApiResult {
    let certificate = match verification::verify(&report) {
        Ok(certificate) => certificate,
        Err(e) => return failure(error_status(&e), e.to_string()),
    };

    let (directives, directives_error) = match build_directives(&certificate, &report) {
        Ok(directives) => (directives, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };

    (
        StatusCode::OK,
        Json(ApiResponse::success(VerifyResponse {
            certificate,
            directives,
            directives_error,
        })),
    )
}

/// =============================
/// Generate-with-correction Endpoint
/// =============================

async fn generate_report(
    State(state): State<ApiState>,
    Json(req): Json<GenerateReportRequest>,
) -> ApiResult {
    info!(company = %req.company, "Received report generation request");

    let mut config = GenerationConfig::new(&req.company, &req.current_label, &req.prior_label);
    if let Some(currency) = req.currency {
        config.currency = currency;
    }
    let period_key = config.period_key();

    let documents = SourceDocument::try_from(req.prior_document)
        .and_then(|prior| Ok((prior, SourceDocument::try_from(req.current_document)?)));
    let (prior, current) = match documents {
        Ok(docs) => docs,
        Err(e) => return failure(error_status(&e), e.to_string()),
    };

    let options = RunOptions::default().with_progress(Arc::new(|event: &ProgressEvent| {
        debug!(?event, "Correction progress");
    }));

    let outcome = match state
        .orchestrator
        .run_with_correction(&prior, &current, &config, &options)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(company = %config.company, error = %e, "Report generation failed");
            let mut response = ApiResponse::error(e.to_string());
            match state
                .audit_log
                .record(RunRecord::failed(&config.company, &period_key, &e))
                .await
            {
                Ok(run_id) => response.data = Some(serde_json::json!({ "runId": run_id })),
                Err(audit_err) => error!(error = %audit_err, "Failed to record audit entry"),
            }
            return (error_status(&e), Json(response));
        }
    };

    let run_id = match state
        .audit_log
        .record(RunRecord::completed(&config.company, &period_key, &outcome))
        .await
    {
        Ok(id) => id,
        Err(e) => return failure(error_status(&e), e.to_string()),
    };

    let stored = StoredReport::new(
        &config.company,
        &period_key,
        outcome.report.clone(),
        outcome.certificate.clone(),
    );
    if let Err(e) = state.store.save(stored).await {
        return failure(error_status(&e), format!("Report verified but not saved: {}", e));
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(GenerateResponse {
            report: outcome.report,
            certificate: outcome.certificate,
            attempts: outcome.attempts,
            run_id,
        })),
    )
}

/// =============================
/// Stored Report Endpoints
/// =============================

async fn load_report(
    State(state): State<ApiState>,
    Path((company, current, prior)): Path<(String, String, String)>,
) -> ApiResult {
    let period_key = format!("{}/{}", current, prior);

    match state.store.load(&company, &period_key).await {
        Ok(Some(stored)) => (StatusCode::OK, Json(ApiResponse::success(stored))),
        Ok(None) => failure(
            StatusCode::NOT_FOUND,
            format!("No report for {} {}", company, period_key),
        ),
        Err(e) => failure(error_status(&e), e.to_string()),
    }
}

async fn list_reports(State(state): State<ApiState>, Path(company): Path<String>) -> ApiResult {
    match state.store.list(&company).await {
        Ok(keys) => (StatusCode::OK, Json(ApiResponse::success(keys))),
        Err(e) => failure(error_status(&e), e.to_string()),
    }
}

async fn load_run(State(state): State<ApiState>, Path(run_id): Path<uuid::Uuid>) -> ApiResult {
    match state.audit_log.get(run_id).await {
        Ok(Some(record)) => (StatusCode::OK, Json(ApiResponse::success(record))),
        Ok(None) => failure(StatusCode::NOT_FOUND, format!("No run {}", run_id)),
        Err(e) => failure(error_status(&e), e.to_string()),
    }
}

async fn list_runs(State(state): State<ApiState>, Path(company): Path<String>) -> ApiResult {
    match state.audit_log.list_for_company(&company).await {
        Ok(ids) => (StatusCode::OK, Json(ApiResponse::success(ids))),
        Err(e) => failure(error_status(&e), e.to_string()),
    }
}

async fn check_run_integrity(
    State(state): State<ApiState>,
    Path(run_id): Path<uuid::Uuid>,
) -> ApiResult {
    match state.audit_log.verify_integrity(run_id).await {
        Ok(intact) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({
                "runId": run_id,
                "intact": intact,
            }))),
        ),
        Err(e) => failure(error_status(&e), e.to_string()),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/verify", post(verify_report))
        .route("/api/reports", post(generate_report))
        .route("/api/reports/:company", get(list_reports))
        .route("/api/reports/:company/:current/:prior", get(load_report))
        .route("/api/runs/:run_id", get(load_run))
        .route("/api/runs/:run_id/integrity", get(check_run_integrity))
        .route("/api/companies/:company/runs", get(list_runs))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
