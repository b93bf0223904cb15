use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use warden_core::{
    config::{Config, Overrides},
    credentials::CredentialStore,
    lifecycle::SessionManager,
    maintenance,
};
use warden_telegram::{TelegramConnector, TelegramSession};

/// Keep a group chat's title and member nicknames where the admin put them.
#[derive(Debug, Parser)]
#[command(name = "warden", version)]
struct Cli {
    /// Account directory name under the data dir.
    account: String,

    /// Root directory holding one sub-directory per account.
    #[arg(long, env = "WARDEN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Port for the HTTP control API.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), warden_core::Error> {
    let cli = Cli::parse();
    let overrides = Overrides {
        data_dir: cli.data_dir,
        port: cli.port,
    };

    let paths = Config::resolve_paths(&cli.account, &overrides)?;
    warden_core::logging::init("warden", Some(&paths.log))?;

    let cfg = Config::load(&cli.account, overrides).inspect_err(|e| error!("❌ {e}"))?;
    let store = Arc::new(CredentialStore::new(cfg.paths.credentials.clone()));
    let credentials = store.load().inspect_err(|e| error!("❌ {e}"))?;
    TelegramSession::from_credentials(&credentials).inspect_err(|e| error!("❌ {e}"))?;

    info!(account = %cfg.account, admin = %cfg.admin_id, "starting warden");

    let (manager, control) = SessionManager::new(
        Arc::new(TelegramConnector),
        credentials,
        cfg.admin_id.clone(),
        cfg.timers,
    );

    let shutdown = CancellationToken::new();
    let heartbeat = maintenance::spawn_heartbeat(
        control.clone(),
        cfg.timers.heartbeat_interval,
        cfg.timers.heartbeat_hold,
        shutdown.clone(),
    );
    let persistence = maintenance::spawn_persistence(
        control.clone(),
        store.clone(),
        cfg.timers.persist_interval,
        shutdown.clone(),
    );

    let http = tokio::spawn({
        let control = control.clone();
        let shutdown = shutdown.clone();
        let port = cfg.http_port;
        async move {
            if let Err(e) = warden_http::serve(port, control, shutdown).await {
                error!("HTTP control API stopped: {e:#}");
            }
        }
    });

    let session = tokio::spawn(manager.run(shutdown.clone()));

    wait_for_signal().await;
    info!("shutdown requested");
    shutdown.cancel();

    for (name, task) in [
        ("session", session),
        ("heartbeat", heartbeat),
        ("persistence", persistence),
        ("http", http),
    ] {
        if let Err(e) = task.await {
            warn!("{name} task ended abnormally: {e}");
        }
    }

    match maintenance::persist_once(&control, &store).await {
        Ok(true) => info!("💾 AppState saved ✅"),
        Ok(false) => {}
        Err(e) => error!("❌ Failed saving AppState: {e}"),
    }

    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("cannot listen for SIGTERM: {e}"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("cannot listen for ctrl-c: {e}");
    }
}
