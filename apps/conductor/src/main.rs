mod archive;
mod config;
mod db;
mod errors;
mod interview;
mod llm_client;
mod mailbox;
mod models;
mod poller;
mod questions;
mod retry;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::archive::TranscriptArchive;
use crate::config::{ArchiveConfig, Config};
use crate::db::create_pool;
use crate::interview::WaitBudget;
use crate::llm_client::{LlmClient, TextGenerator};
use crate::mailbox::postgres::PgMailbox;
use crate::retry::RetryPolicy;
use crate::mailbox::MailboxStore;
use crate::poller::{PollerSettings, SessionPoller};
use crate::questions::rubric::Rubrics;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting conductor v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL mailbox (one connection per interview plus gateway headroom)
    let pool_size = u32::try_from(config.max_concurrent_sessions)
        .unwrap_or(u32::MAX)
        .saturating_add(4);
    let db = create_pool(&config.database_url, pool_size).await?;
    let mailbox: Arc<dyn MailboxStore> = Arc::new(PgMailbox::new(db));

    // Initialize LLM client
    let llm: Arc<dyn TextGenerator> = Arc::new(LlmClient::new(config.anthropic_api_key.clone())?);
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let rubrics = Rubrics::load(
        config.base_rubric_path.as_deref(),
        config.redflag_rubric_path.as_deref(),
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let settings = PollerSettings {
        scan_interval: config.session_scan_interval,
        lease_margin: config.session_lease_margin,
        max_concurrent: config.max_concurrent_sessions,
        budget: WaitBudget {
            poll_interval: config.reply_poll_interval,
            reply_timeout: config.reply_timeout,
        },
        retry: RetryPolicy {
            max_attempts: config.store_retry_attempts,
            base_delay: config.store_retry_base,
        },
    };
    let mut poller = SessionPoller::new(
        mailbox.clone(),
        llm,
        rubrics,
        settings,
        shutdown_rx.clone(),
    );

    // Initialize S3 / MinIO transcript archive (optional)
    if let Some(archive) = &config.archive {
        let s3 = build_s3_client(archive).await;
        poller = poller.with_archive(TranscriptArchive::new(s3, archive.s3_bucket.clone()));
        info!("Transcript archival enabled (bucket: {})", archive.s3_bucket);
    }

    let poller_task = tokio::spawn(poller.run());

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // Build router
    let app = build_router(AppState { mailbox })
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    poller_task.await?;
    info!("Conductor stopped");
    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
/// Static credentials are used when both keys are configured; otherwise the
/// default provider chain applies.
async fn build_s3_client(archive: &ArchiveConfig) -> aws_sdk_s3::Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"));

    if let (Some(key_id), Some(secret)) = (
        &archive.aws_access_key_id,
        &archive.aws_secret_access_key,
    ) {
        loader = loader.credentials_provider(Credentials::new(
            key_id,
            secret,
            None,
            None,
            "conductor-static",
        ));
    }
    if let Some(endpoint) = &archive.s3_endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let s3_config = loader.load().await;
    aws_sdk_s3::Client::new(&s3_config)
}
