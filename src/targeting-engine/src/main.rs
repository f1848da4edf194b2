//! Targeting engine: evaluate one targeting request from JSON and print
//! the aggregate decision.

mod request;

use anyhow::Context;
use clap::Parser;
use request::{TargetingRequest, TargetingResponse};
use std::sync::Arc;
use targeting_core::config::EngineConfig;
use targeting_core::ExperimentEngine;
use targeting_matching::{MatcherManager, TracingCallbacks};
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "targeting-engine")]
#[command(about = "Evaluate targeting criteria against a request context")]
#[command(version)]
struct Cli {
    /// Optional TOML config file, layered under environment variables
    #[arg(long, env = "TARGETING_ENGINE__CONFIG")]
    config: Option<String>,

    /// Request JSON file; reads stdin when omitted
    #[arg(long)]
    request: Option<String>,

    /// Overall decision budget in milliseconds (overrides config)
    #[arg(long, env = "TARGETING_ENGINE__MATCHING__OVERALL_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Experiment subject id (overrides the request)
    #[arg(long, env = "TARGETING_ENGINE__SUBJECT")]
    subject: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "targeting_engine=info,targeting_matching=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        EngineConfig::default()
    });
    if let Some(timeout_ms) = cli.timeout_ms {
        config.matching.overall_timeout_ms = timeout_ms;
    }
    info!(
        node_id = %config.node_id,
        overall_timeout_ms = config.matching.overall_timeout_ms,
        cache = config.matching.cache_enabled,
        "Configuration loaded"
    );

    let raw = read_request(cli.request.as_deref()).await?;
    let request: TargetingRequest = serde_json::from_str(&raw).context("invalid request JSON")?;
    let context = request.build_context()?;

    for criteria in &request.criteria {
        let validation = criteria.validate();
        if !validation.is_valid() {
            warn!(criteria = %criteria.name(), summary = %validation.summary, "Criteria failed validation");
        }
    }

    let experiment = match &request.experiment {
        Some(experiment_config) => {
            let engine = ExperimentEngine::new();
            engine.create_experiment(experiment_config.clone())?;
            let subject = cli
                .subject
                .clone()
                .or_else(|| request.subject_id.clone())
                .unwrap_or_else(|| context.context_id().to_string());
            engine.assign(&experiment_config.experiment_id, &subject)
        }
        None => None,
    };

    let manager = MatcherManager::from_config(&config)?;
    let result = manager
        .execute_matching(&context, &request.criteria, Arc::new(TracingCallbacks))
        .await;
    info!(
        context_id = %context.context_id(),
        total_score = result.total_score,
        succeeded = result.successful_count(),
        failed = result.failed_count(),
        "Targeting decision complete"
    );

    let response = TargetingResponse {
        context_id: context.context_id().to_string(),
        node_id: config.node_id.clone(),
        experiment,
        matched: result.is_matched(),
        result,
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn read_request(path: Option<&str>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read request file {path}")),
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("failed to read request from stdin")?;
            Ok(raw)
        }
    }
}
