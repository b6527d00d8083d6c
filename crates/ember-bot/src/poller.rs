use std::sync::Arc;
use std::time::Duration;

use ember_telegram::TelegramClient;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::app::App;
use crate::handlers;

const RETRY_DELAY: Duration = Duration::from_secs(3);

/// Long-poll `getUpdates` and handle updates in arrival order until shutdown.
pub async fn run(
    app: Arc<App>,
    client: TelegramClient,
    timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut offset = 0;
    info!(timeout_secs = timeout.as_secs(), "Polling for updates");
    loop {
        let batch = tokio::select! {
            res = client.get_updates(offset, timeout) => res,
            _ = shutdown.changed() => break,
        };
        match batch {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    handlers::dispatch(&app, update).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "getUpdates failed, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                    _ = shutdown.changed() => break,
                }
            }
        }
    }
    info!("Polling stopped");
    Ok(())
}
