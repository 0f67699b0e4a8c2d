use std::process::ExitCode;

use anyhow::Context;
use pr_reviewer::config::{ReviewerConfig, RunMode, RunSettings};
use pr_reviewer::errors::Error;
use pr_reviewer::git_providers::ProviderConfig;
use pr_reviewer::review::llm::LlmConfig;
use pr_reviewer::{RunStatus, run_reply, run_review};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Exit code for configuration errors.
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine; the CI environment provides the variables.
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,pr_reviewer=info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();

    match run().await {
        Ok(status) => {
            info!("run finished: {:?}", status);
            ExitCode::from(status.exit_code() as u8)
        }
        Err(e) => {
            error!("{:#}", e);
            let config_error = e
                .downcast_ref::<Error>()
                .is_some_and(|e| matches!(e, Error::Config(_)));
            if config_error {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run() -> anyhow::Result<RunStatus> {
    let settings = RunSettings::from_env()?;
    let cfg = ReviewerConfig::from_env()?;
    let provider = ProviderConfig::from_env()?;
    let llm = LlmConfig::from_env()?;
    info!(
        "starting mode={:?} repo={} dry_run={}",
        settings.mode, settings.repository, cfg.dry_run
    );

    match settings.mode {
        RunMode::Review => {
            let summary = run_review(&cfg, &settings, &provider, llm)
                .await
                .context("review run failed")?;
            info!("{}", summary.status_line());
            Ok(summary.status())
        }
        RunMode::Reply => run_reply(&cfg, &settings, &provider, llm)
            .await
            .context("reply run failed"),
    }
}
