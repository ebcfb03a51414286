//! D&B Direct+ batch runner
//!
//! Runs one batch job against the D&B Direct+ API at a bounded request rate.
//! The job is chosen by the first argument:
//!
//! ```text
//! dpl-batch blocks [tradeUp]
//! dpl-batch idr
//! dpl-batch typeahead
//! dpl-batch principals [DUNS]
//! dpl-batch lei
//! ```

use dpl_batch::config::Config;
use dpl_batch::executor::{Executor, HttpTransport};
use dpl_batch::jobs::{Job, JobContext};
use dpl_batch::limiter::RateLimiter;
use dpl_batch::orchestrator::config::{validate_and_apply_config_update, ConfigUpdateRequest};
use dpl_batch::orchestrator::OrchestratorConfig;
use dpl_batch::request::{DplRequestBuilder, FileCredentials};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let job = Job::from_args(std::env::args().skip(1))?;

    // Load configuration
    let config = Config::from_env();
    config.validate()?;
    let orchestrator = validate_and_apply_config_update(
        OrchestratorConfig::default(),
        ConfigUpdateRequest::from_env(),
    )?;
    info!("Configuration loaded: {:?}", config);

    let credentials = Arc::new(FileCredentials::load(&config.api.credentials_file)?);
    let requests = Arc::new(DplRequestBuilder::new(
        config.api.dpl_base_url.clone(),
        config.api.gleif_base_url.clone(),
        credentials,
    ));

    let limiter = RateLimiter::new(config.limiter_config())?;
    let executor = Executor::new(limiter.clone(), Arc::new(HttpTransport::new()?))
        .with_timeout(config.request_timeout())
        .with_status_logging(config.execution.log_status);

    let ctx = JobContext {
        executor: Arc::new(executor),
        requests,
        orchestrator,
        input_dir: config.io.input_dir.clone(),
        output_dir: config.io.output_dir.clone(),
    };

    // Queued requests settle as cancelled once a shutdown signal arrives
    tokio::spawn(async move {
        shutdown_signal().await;
        limiter.shutdown();
    });

    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("job", run_id = %run_id, job = job.name());
    let start = Instant::now();

    let report = job.run(&ctx).instrument(span).await.inspect_err(|e| {
        error!(run_id = %run_id, error = %e, "Job aborted");
    })?;

    info!(
        run_id = %run_id,
        job = job.name(),
        items = report.items,
        succeeded = report.succeeded,
        failed = report.failed,
        unsaved = report.unsaved,
        duration_ms = start.elapsed().as_millis(),
        "Job completed"
    );
    Ok(())
}

/// Handle shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling queued requests...");
        },
        _ = terminate => {
            info!("Received SIGTERM, cancelling queued requests...");
        },
    }
}
