use financial_report_orchestrator::{
    agent::CorrectionOrchestrator,
    api::{start_server, ApiState},
    audit::AuditLog,
    config::AppConfig,
    gemini::GeminiClient,
    generator::GeminiReportGenerator,
    state::{InMemoryReportStore, PgReportStore, ReportStore},
    verification::create_default_verification_engine,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set; generation requests will fail until it is configured");
    }

    info!("Financial Report Orchestrator - API Server");
    info!(port = config.api_port, model = %config.gemini_model, "Configuration loaded");

    // Create components
    let mut client = GeminiClient::new(config.gemini_api_key.clone(), &config.gemini_model)?;
    if let Some(url) = &config.gemini_base_url {
        info!(url = %url, "Using custom Gemini endpoint");
        client = client.with_base_url(url.as_str());
    }
    let generator = Box::new(GeminiReportGenerator::new(client));
    let orchestrator = Arc::new(CorrectionOrchestrator::new(
        generator,
        create_default_verification_engine(),
    ));

    let store: Arc<dyn ReportStore> = match &config.database_url {
        Some(url) => Arc::new(PgReportStore::connect(url).await?),
        None => {
            info!("DATABASE_URL not set; using in-memory report store");
            Arc::new(InMemoryReportStore::new())
        }
    };

    let state = ApiState {
        orchestrator,
        store,
        audit_log: Arc::new(AuditLog::new()),
    };

    info!("Orchestrator initialized, starting API server");

    start_server(state, config.api_port).await?;

    Ok(())
}
