// src/main.rs
mod config;
mod format;
mod handlers;
mod models;
mod readiness;
mod reconcile;
mod sink;
mod source;
mod storage;
mod utils;

#[cfg(test)]
mod testing;

use actix_web::{web, App, HttpServer};
use env_logger::Env;
use governor::RateLimiter;
use log::{error, info, warn};
use std::io;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::handlers::AppState;
use crate::readiness::Readiness;
use crate::reconcile::Reconciler;
use crate::sink::discord::DiscordClient;
use crate::sink::ChannelSink;
use crate::source::battlemetrics::BattleMetricsClient;
use crate::storage::registry::TenantRegistry;
use crate::utils::AdminRateLimiter;

fn fatal(context: &str, e: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, e);
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env();
    if config.discord_token.is_empty() {
        warn!("DISCORD_BOT_TOKEN is not set; the update loop will wait until Discord accepts a session");
    }

    let registry = Arc::new(
        TenantRegistry::load(&config.state_path)
            .await
            .map_err(|e| fatal("Failed to load state", e))?,
    );

    let source = Arc::new(
        BattleMetricsClient::new(&config).map_err(|e| fatal("Failed to build BattleMetrics client", e))?,
    );
    let discord = Arc::new(
        DiscordClient::new(&config).map_err(|e| fatal("Failed to build Discord client", e))?,
    );
    let sink = Arc::new(ChannelSink::new(discord.clone(), config.pacing_delay()));
    let reconciler = Reconciler::new(registry, source, sink);

    let readiness = Readiness::new();
    let cancel = CancellationToken::new();

    let connector = tokio::spawn({
        let readiness = readiness.clone();
        let cancel = cancel.clone();
        let retry = config.ready_retry();
        async move {
            loop {
                match discord.connect().await {
                    Ok(_) => {
                        readiness.mark_ready();
                        break;
                    }
                    Err(e) => warn!("Discord session not ready: {}", e),
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(retry) => {}
                }
            }
        }
    });

    let updater = tokio::spawn(reconciler.clone().run(
        readiness,
        config.startup_grace(),
        cancel.clone(),
    ));

    let bind = config.bind();
    let limiter: web::Data<AdminRateLimiter> = web::Data::new(RateLimiter::keyed(config.admin_quota()));
    let state = web::Data::new(AppState { reconciler, config });

    info!("Starting admin server on {}", bind);
    let served = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(limiter.clone())
            .configure(handlers::routes)
    })
    .bind(&bind)?
    .run()
    .await;

    info!("Shutting down update loop");
    cancel.cancel();
    let _ = connector.await;
    if let Err(e) = updater.await {
        error!("Update loop ended abnormally: {}", e);
    }

    served
}
