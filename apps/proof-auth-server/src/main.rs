//! Proof-auth gateway server.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hash_role_plugin::HashRolePluginFactory;
use proof_auth::ProofAuthModule;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{AppConfig, LogFormat, LoggingConfig};

/// Proof-based authentication gateway
#[derive(Parser, Debug)]
#[command(name = "proof-auth-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config/proof-auth.yaml")]
    config: PathBuf,

    /// Print the effective configuration (secrets masked) and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and plugin loading, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    init_tracing(&config.logging)?;
    info!(config = %cli.config.display(), "Starting proof-auth-server");

    let module = ProofAuthModule::builder(config.module_config())
        .factory(Arc::new(HashRolePluginFactory))
        .build()
        .await?;

    if cli.check {
        let manifest = module.manifest();
        if !manifest.failed.is_empty() {
            let failed: Vec<&str> = manifest.failed.iter().map(|f| f.name.as_str()).collect();
            anyhow::bail!("plugins failed to load: {}", failed.join(", "));
        }
        info!(plugins = ?manifest.loaded, "Configuration is valid");
        return Ok(());
    }

    serve(&config, &module).await
}

fn init_tracing(cfg: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .with_context(|| format!("invalid log filter '{}'", cfg.level))?;

    let registry = tracing_subscriber::registry().with(filter);
    match cfg.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()?,
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init()?,
    }
    Ok(())
}

async fn serve(config: &AppConfig, module: &ProofAuthModule) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();

    let revalidation = module.revalidation_task().map(|task| {
        let cancel = cancel.clone();
        tokio::spawn(task.run(cancel))
    });

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    info!("HTTP server bound on {}", config.server.bind_addr);

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                res = tokio::signal::ctrl_c() => match res {
                    Ok(()) => cancel.cancel(),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                        cancel.cancelled().await;
                    }
                },
            }
            info!("HTTP server shutting down gracefully");
        }
    };

    axum::serve(listener, module.router())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    cancel.cancel();
    if let Some(handle) = revalidation {
        handle.await.context("revalidation task panicked")?;
    }
    info!("proof-auth-server stopped");
    Ok(())
}
