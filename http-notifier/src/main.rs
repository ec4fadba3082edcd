mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use http_notifier::host::NotifierServer;
use http_notifier::logging::init_logging;
use http_notifier::{EnvSecretGetter, HttpNotifier, NotifierConfig, ParamsBindingResolver, RequestContext};
use tracing::{error, info};

use crate::cli::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads env-backed flags.
    dotenvy::dotenv().ok();
    let args = Args::parse();

    init_logging(&args.log_options())?;

    if let Err(e) = run(args).await {
        error!("notifier failed: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = NotifierConfig::load(&args.config)?;
    let template_source = config.template_source(args.config.parent())?;

    let server_config = args.server_config();
    let setup_ctx = RequestContext::new().with_timeout(server_config.delivery_timeout);
    let secrets = EnvSecretGetter;

    let resolver = ParamsBindingResolver::from_config(&setup_ctx, &config, &secrets)
        .await
        .context("failed to load template params")?;
    let notifier = HttpNotifier::setup(
        &setup_ctx,
        &config,
        &template_source,
        &secrets,
        Arc::new(resolver),
    )
    .await
    .context("failed to set up HTTP notifier")?;

    if args.check {
        info!(notifier = %config.name(), "config is valid");
        return Ok(());
    }

    let server = NotifierServer::new(server_config, Arc::new(notifier));
    let cancel_token = server.cancel_token();
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => info!("received shutdown signal"),
            Err(e) => error!("failed to listen for shutdown signals: {}", e),
        }
        cancel_token.cancel();
    });

    server.run().await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
