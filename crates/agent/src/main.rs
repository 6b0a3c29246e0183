//! Flexibility Score agent
//!
//! Runs the daily evaluation on a fixed interval: reconstructs every
//! account's resources from audit events, scores them, publishes the daily
//! metrics and archives a snapshot. Health and Prometheus metrics are served
//! over HTTP.

use anyhow::{Context, Result};
use chrono::Utc;
use flex_lib::{
    backends::{LocalLayout, RoleArnBroker, StaticDirectory},
    health::HealthRegistry,
    observability::{RunMetrics, StructuredLogger},
    orchestrator::{AccountFetcher, Evaluator},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting flexscore-agent");

    // Load configuration
    let config = config::AgentConfig::load()?;
    info!(
        data_dir = %config.data_dir.display(),
        namespace = %config.namespace,
        accounts = config.accounts.len(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();

    let metrics = RunMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(AGENT_VERSION);

    let evaluator = build_evaluator(&config, health_registry.clone(), logger.clone())?;

    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));

    // Configuration is loaded and validated
    health_registry.set_ready(true).await;

    if config.run_once {
        let report = evaluator.run(Utc::now()).await?;
        info!(
            snapshot_key = report.snapshot_key.as_deref().unwrap_or("-"),
            datapoints = report.datapoints,
            "Single evaluation finished"
        );
        logger.log_shutdown("run_once completed");
        return Ok(());
    }

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state.clone()));

    let interval = Duration::from_secs(config.evaluation_interval_secs.max(1));
    let run_on_start = config.run_on_start;

    tokio::select! {
        _ = evaluation_loop(&evaluator, &app_state, interval, run_on_start) => {}
        result = api_handle => {
            match result {
                Ok(Err(e)) => warn!(error = %e, "API server stopped"),
                Err(e) => warn!(error = %e, "API server task failed"),
                Ok(Ok(())) => {}
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}

/// Wire the local backends and the evaluator from configuration
fn build_evaluator(
    config: &config::AgentConfig,
    health: HealthRegistry,
    logger: StructuredLogger,
) -> Result<Evaluator> {
    let evaluation = config.evaluation_config()?;
    let layout = LocalLayout::new(&config.data_dir);

    let caller = config
        .caller_account()
        .context("No caller account configured: set FLEX_CALLER_ACCOUNT_ID or list accounts")?;
    let directory = if config.organizations_enabled {
        StaticDirectory::new(caller, config.account_infos())
    } else {
        StaticDirectory::without_organizations(caller)
    };

    let audit_log = Arc::new(layout.audit_log());
    let fetcher = AccountFetcher::new(
        audit_log.clone(),
        audit_log,
        Arc::new(RoleArnBroker::new(&evaluation.member_role_name)),
    );

    Ok(Evaluator::new(
        evaluation,
        Arc::new(directory),
        fetcher,
        Arc::new(layout.metric_store()),
        Arc::new(layout.object_store()),
    )
    .with_health(health)
    .with_logger(logger))
}

/// Evaluate on every tick; a failed run is logged and the next tick starts fresh
async fn evaluation_loop(
    evaluator: &Evaluator,
    state: &api::AppState,
    interval: Duration,
    run_on_start: bool,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    if !run_on_start {
        // The first tick completes immediately
        ticker.tick().await;
    }

    loop {
        ticker.tick().await;
        match evaluator.run(Utc::now()).await {
            Ok(report) => state.record_run(&report).await,
            Err(e) => warn!(error = %e, "Evaluation run failed, waiting for the next tick"),
        }
    }
}
