use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use aurum::catalog::Catalog;
use aurum::config::Config;
use aurum::price::price_cell;
use aurum::refresh::Refresher;
use aurum::server::{AppState, routes};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    let catalog = Catalog::load(&config.catalog)?;
    let target = config
        .extraction_target()
        .context("invalid extraction selectors")?;
    let channel = config.build_channel(&target);
    info!(
        products = catalog.len(),
        channel = channel.name(),
        source = %config.source_url,
        "starting aurum"
    );

    let (writer, prices) = price_cell();
    let refresher = Refresher::new(
        channel,
        target,
        config.source_url.clone(),
        config.policy(),
        writer,
    );

    // Serve nothing until a price (live or fallback) is in the cell.
    let outcome = refresher.run_cycle().await;
    info!(per_gram = outcome.per_gram(), ?outcome, "initial price cycle finished");

    let shutdown = CancellationToken::new();
    let refresh_task = tokio::spawn(refresher.run(config.refresh_period(), shutdown.clone()));

    let state = web::Data::new(AppState {
        catalog,
        prices,
        fallback: config.fallback_price,
    });

    info!("listening on {}:{}", config.host, config.port);
    let served = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(routes)
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?
    .run()
    .await;

    shutdown.cancel();
    refresh_task.await.context("refresh task panicked")?;
    served.context("http server failed")
}
