use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use study_nexus::api::build_http_client;
use study_nexus::config::Config;
use study_nexus::db::StudyStorage;
use study_nexus::llm::build_provider;
use study_nexus::middleware::session::session_key;
use study_nexus::router::{NexusState, nexus_router};
use study_nexus::service::generation_actor::{self, GenerationArgs};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &study_nexus::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        proxy = %cfg.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
        loglevel = %cfg.loglevel,
        dev_bypass = cfg.dev_bypass,
        keep_parentheses = cfg.notation.keep_parentheses
    );
    if cfg.dev_bypass {
        warn!("dev bypass enabled: /api/dev/login is reachable");
    }

    let storage = StudyStorage::connect(&cfg.database_url).await?;
    let client = build_http_client(cfg)?;
    let provider = build_provider(&cfg.llm, client.clone())?;
    let config = Arc::new(Config::clone(cfg));

    let jobs = generation_actor::spawn(GenerationArgs {
        provider: provider.clone(),
        normalizer: study_nexus::MathNormalizer::new()
            .keep_parentheses(cfg.notation.keep_parentheses),
        settings: cfg.generation,
    })
    .await?;

    let state = NexusState::new(
        storage,
        provider,
        client,
        jobs,
        config,
        session_key(&cfg.session_secret),
    );
    let app = nexus_router(state);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
