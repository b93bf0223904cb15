//! Process-lifetime timers: idle heartbeat and credential persistence.
//!
//! Both run independently of the connection state and simply skip a tick when
//! there is nothing to do.

use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{control::ControlHandle, credentials::CredentialStore, errors::Error, Result};

/// Flash a typing indicator in the locked conversation.
///
/// Returns `false` when nothing is locked or no client is connected.
pub async fn heartbeat_once(control: &ControlHandle, hold: Duration) -> bool {
    let Some(conversation) = control.policy().locked_conversation().cloned() else {
        return false;
    };
    let Some(client) = control.current_client() else {
        return false;
    };

    if let Err(e) = client.send_typing(&conversation, true).await {
        warn!("heartbeat typing signal failed: {e}");
    }
    sleep(hold).await;
    if let Err(e) = client.send_typing(&conversation, false).await {
        warn!("heartbeat typing reset failed: {e}");
    }
    info!("💤 Anti-Sleep Triggered");
    true
}

/// Snapshot the live session and write it to `store`.
///
/// The write (including the fsync) runs on the blocking pool. Returns
/// `Ok(false)` when there is no client to read from.
pub async fn persist_once(control: &ControlHandle, store: &CredentialStore) -> Result<bool> {
    let Some(client) = control.current_client() else {
        return Ok(false);
    };
    let credentials = client.session_state()?;
    let store = store.clone();
    tokio::task::spawn_blocking(move || store.save(&credentials))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("save task failed: {e}"))))??;
    Ok(true)
}

pub fn spawn_heartbeat(
    control: ControlHandle,
    period: Duration,
    hold: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    heartbeat_once(&control, hold).await;
                }
            }
        }
    })
}

pub fn spawn_persistence(
    control: ControlHandle,
    store: Arc<CredentialStore>,
    period: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval_at(Instant::now() + period, period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    match persist_once(&control, &store).await {
                        Ok(true) => info!("💾 AppState saved ✅"),
                        Ok(false) => {}
                        Err(e) => error!("❌ Failed saving AppState: {e}"),
                    }
                }
            }
        }
    })
}
