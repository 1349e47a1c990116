use std::sync::Arc;

use anyhow::Context;

use brand_onboarding::config::AppConfig;
use brand_onboarding::llm::create_provider;
use brand_onboarding::onboarding::{
    BrandRouteState, ConversationEngine, LlmContentGenerator, QuestionCatalog, app_router,
};
use brand_onboarding::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let llm = create_provider(&config.llm).context("Failed to create LLM provider")?;
    tracing::info!(
        backend = ?config.llm.backend,
        model = llm.model_name(),
        "LLM provider ready"
    );

    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .context("Failed to open database")?,
    );

    let catalog = match &config.catalog_path {
        Some(path) => QuestionCatalog::from_json_file(path)
            .with_context(|| format!("Failed to load catalog from {}", path.display()))?,
        None => QuestionCatalog::brand_default(),
    };
    tracing::info!(questions = catalog.len(), "Question catalog loaded");
    let catalog = Arc::new(catalog);

    let generator = Arc::new(LlmContentGenerator::new(llm, &config.engine));
    let engine = Arc::new(ConversationEngine::new(
        db.clone(),
        generator,
        catalog.clone(),
        config.engine.clone(),
    ));

    let app = app_router(engine, BrandRouteState { db, catalog });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Onboarding server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    Ok(())
}
