// Demo server entry point

use anyhow::Context;
use sentinel_guard::api::{create_router, AppState};
use sentinel_guard::config::Config;
use sentinel_guard::loader::policy_loader::load_policy;
use sentinel_guard::sinks::guard::SinkGuard;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;
    init_tracing(&config);

    let policy = load_policy(&config.policy_path).context("loading policy")?;
    info!(
        version = policy.version,
        validators = policy.validators.len(),
        sinks = policy.sinks.len(),
        "policy loaded"
    );

    let guard = SinkGuard::new(Arc::new(policy));
    std::fs::create_dir_all(&config.upload_dir).context("creating upload directory")?;

    let state = AppState {
        guard,
        upload_dir: config.upload_dir.clone(),
    };
    let app = create_router(state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "sentinel-guard demo listening");
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    if config.log_format == "json" {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
