// Data Pipeline - Web Server
// REST API with Axum: GET / and POST /pipeline/{clean_store,clean_to_sheets,clean_to_pdf}

use anyhow::{Context, Result};
use data_pipeline::api::build_router;
use data_pipeline::{init_tracing, Config, Pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("Failed to load configuration")?;
    let pipeline = Pipeline::from_config(&config).context("Failed to initialise pipeline")?;

    tracing::info!(
        database_url = %config.database_url,
        pdf_output_dir = %config.pdf_output_dir.display(),
        sheets_configured = config.google_sheets_id.is_some() && config.google_service_account_file.is_some(),
        "pipeline ready"
    );

    let app = build_router(pipeline);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;
    tracing::info!("data-pipeline {} listening on http://{}", data_pipeline::VERSION, config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
