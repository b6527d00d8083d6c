use std::sync::Arc;

use ember_bot::lock::InstanceLock;
use ember_bot::{App, Config, poller, webhook};
use ember_core::{Clock, MessageGateway, SystemClock};
use ember_db::Database;
use ember_telegram::TelegramClient;
use tokio::sync::watch;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ember=info,ember_bot=info,ember_core=info,ember_db=info,ember_telegram=info,tower_http=info".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    let _lock = InstanceLock::acquire(&config.lock_path)?;

    let db = Arc::new(Database::open(&config.db_path)?);
    let telegram = TelegramClient::new(&config.api_base, &config.bot_token, config.poll_timeout)?;
    let gateway: Arc<dyn MessageGateway> = Arc::new(telegram.clone());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.timezone));

    let (app, scheduler) = App::build(&config, db, gateway, clock);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let scheduler_task = tokio::spawn(Arc::new(scheduler).run(config.tick, shutdown_rx.clone()));
    let ingress = match config.webhook.clone() {
        Some(wh) => {
            telegram.set_webhook(&wh.url, &wh.secret).await?;
            tokio::spawn(webhook::serve(app.clone(), wh, shutdown_rx.clone()))
        }
        None => {
            if let Err(e) = telegram.delete_webhook().await {
                warn!(error = %e, "Could not clear webhook; polling may be rejected");
            }
            tokio::spawn(poller::run(app.clone(), telegram.clone(), config.poll_timeout, shutdown_rx.clone()))
        }
    };
    info!(tz = %config.timezone, db = %config.db_path.display(), "Ember running");

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let (scheduled, ingested) = tokio::join!(scheduler_task, ingress);
    scheduled?;
    ingested??;
    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
