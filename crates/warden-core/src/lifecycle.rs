//! Session lifecycle: connect, listen, and recover.
//!
//! ```text
//! DISCONNECTED ──> CONNECTING ──ok──> CONNECTED
//!                    ^   │  (auth failure: wait retry_delay, try again)
//!                    └───┘
//! CONNECTED ──stream error──> wait relisten_delay ──> listen() again
//!                                                      └─fails─> CONNECTING
//! ```
//!
//! The loop re-enters itself through an explicit [`Phase`] value instead of
//! recursion, so it can run forever in constant space.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{sync::watch, time::sleep};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::Timers,
    control::ControlHandle,
    domain::{MemberId, SessionCredentials},
    policy::PolicyState,
    reconcile::Reconciler,
    upstream::port::{UpstreamClient, UpstreamConnector},
};

const SHUTDOWN_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: LinkState,
    /// When the current connection was established.
    pub connected_at: Option<DateTime<Utc>>,
    pub connect_attempts: u64,
}

enum Phase {
    Connect,
    Listen(Arc<dyn UpstreamClient>),
}

pub struct SessionManager {
    connector: Arc<dyn UpstreamConnector>,
    credentials: SessionCredentials,
    timers: Timers,
    reconciler: Reconciler,
    client_tx: watch::Sender<Option<Arc<dyn UpstreamClient>>>,
    link_tx: watch::Sender<LinkStatus>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn UpstreamConnector>,
        credentials: SessionCredentials,
        admin: MemberId,
        timers: Timers,
    ) -> (Self, ControlHandle) {
        let (policy_tx, policy_rx) = watch::channel(PolicyState::default());
        let (client_tx, client_rx) = watch::channel(None);
        let (link_tx, link_rx) = watch::channel(LinkStatus::default());

        let manager = Self {
            connector,
            credentials,
            timers,
            reconciler: Reconciler::new(admin, policy_tx),
            client_tx,
            link_tx,
        };
        (manager, ControlHandle::new(policy_rx, client_rx, link_rx))
    }

    /// Drive the state machine until `shutdown` fires.
    ///
    /// The last client stays published after return so the caller can flush
    /// credentials one final time.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut phase = Phase::Connect;
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => break,
                next = self.step(phase) => next,
            };
            phase = next;
        }

        info!("session manager stopping");
        if tokio::time::timeout(SHUTDOWN_SETTLE_TIMEOUT, self.reconciler.settle())
            .await
            .is_err()
        {
            warn!("in-flight upstream calls still pending at shutdown");
        }
        self.link_tx.send_modify(|l| l.state = LinkState::Disconnected);
    }

    async fn step(&mut self, phase: Phase) -> Phase {
        match phase {
            Phase::Connect => self.connect().await,
            Phase::Listen(client) => self.listen(client).await,
        }
    }

    async fn connect(&mut self) -> Phase {
        self.link_tx.send_modify(|l| {
            l.state = LinkState::Connecting;
            l.connect_attempts += 1;
        });

        match self.connector.connect(&self.credentials).await {
            Ok(client) => {
                info!("🤖 BOT ONLINE — Running now");
                self.client_tx.send_replace(Some(client.clone()));
                self.link_tx.send_modify(|l| {
                    l.state = LinkState::Connected;
                    l.connected_at = Some(Utc::now());
                });
                Phase::Listen(client)
            }
            Err(e) => {
                error!(
                    "❌ [LOGIN FAILED]: {e} (retrying in {}s)",
                    self.timers.retry_delay.as_secs_f64()
                );
                sleep(self.timers.retry_delay).await;
                Phase::Connect
            }
        }
    }

    async fn listen(&mut self, client: Arc<dyn UpstreamClient>) -> Phase {
        let events = match client.listen().await {
            Ok(events) => events,
            Err(e) => {
                warn!("connection is no longer usable ({e}); reconnecting");
                self.refresh_credentials(client.as_ref());
                self.client_tx.send_replace(None);
                self.link_tx.send_modify(|l| {
                    l.state = LinkState::Disconnected;
                    l.connected_at = None;
                });
                return Phase::Connect;
            }
        };
        self.link_tx.send_modify(|l| l.state = LinkState::Connected);

        // The stream is consumed (and dropped) before any new listener exists.
        match self.reconciler.run(&client, events).await {
            Ok(()) => error!("❌ Listen error: event stream ended"),
            Err(e) => error!("❌ Listen error: {e}"),
        }

        self.link_tx.send_modify(|l| l.state = LinkState::Connecting);
        sleep(self.timers.relisten_delay).await;
        Phase::Listen(client)
    }

    fn refresh_credentials(&mut self, client: &dyn UpstreamClient) {
        match client.session_state() {
            Ok(fresh) => self.credentials = fresh,
            Err(e) => warn!("keeping previous session state: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        message, title_changed, Call, FakeClient, FakeConnector, ListenScript,
    };
    use crate::errors::Error;

    const ADMIN: &str = "admin";

    fn creds(tag: &str) -> SessionCredentials {
        SessionCredentials(serde_json::json!({ "session": tag }))
    }

    fn start(
        connector: Arc<FakeConnector>,
    ) -> (ControlHandle, CancellationToken, tokio::task::JoinHandle<()>) {
        let (manager, control) = SessionManager::new(
            connector,
            creds("initial"),
            MemberId::from(ADMIN),
            Timers::default(),
        );
        let token = CancellationToken::new();
        let handle = tokio::spawn(manager.run(token.clone()));
        (control, token, handle)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if cond() {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn login_failures_retry_after_fixed_delay() {
        let connector = Arc::new(FakeConnector::default());
        connector.push_err("bad cookie");
        connector.push_err("bad cookie");
        connector.push_ok(Arc::new(FakeClient::default()));

        let (control, token, handle) = start(connector.clone());
        wait_until(|| control.link().state == LinkState::Connected).await;

        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 3);
        for pair in attempts.windows(2) {
            assert!(pair[1].0 - pair[0].0 >= Timers::default().retry_delay);
        }
        assert_eq!(control.link().connect_attempts, 3);
        assert!(control.link().connected_at.is_some());
        assert!(control.current_client().is_some());

        token.cancel();
        handle.await.unwrap();
        assert_eq!(control.link().state, LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn stream_error_relistens_on_the_same_connection() {
        let client = Arc::new(FakeClient::default());
        client.script_listen(ListenScript::Events(vec![
            Ok(message("g1", ADMIN, "/gclock Team")),
            Err(Error::Upstream("mqtt closed".to_string())),
        ]));
        client.script_listen(ListenScript::Events(vec![Ok(title_changed(
            "g1", "intruder", "Hacked",
        ))]));
        let connector = Arc::new(FakeConnector::default());
        connector.push_ok(client.clone());

        let (control, token, handle) = start(connector.clone());
        wait_until(|| client.mutations().len() == 2).await;

        assert_eq!(connector.attempts().len(), 1);
        assert_eq!(
            client.mutations(),
            vec![
                Call::SetTitle("g1".into(), "Team".into()),
                Call::SetTitle("g1".into(), "Team".into()),
            ]
        );
        assert_eq!(control.link().state, LinkState::Connected);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn dead_connection_reconnects_with_fresh_credentials_and_keeps_policy() {
        let first = Arc::new(FakeClient::default());
        *first.state.lock().unwrap() = Some(creds("refreshed"));
        first.script_listen(ListenScript::Events(vec![
            Ok(message("g1", ADMIN, "/gclock Team")),
            Err(Error::Upstream("mqtt closed".to_string())),
        ]));
        first.script_listen(ListenScript::Fail("session expired".to_string()));

        let second = Arc::new(FakeClient::default());
        second.script_listen(ListenScript::Events(vec![Ok(title_changed(
            "g1", "intruder", "Hacked",
        ))]));

        let connector = Arc::new(FakeConnector::default());
        connector.push_ok(first.clone());
        connector.push_ok(second.clone());

        let (control, token, handle) = start(connector.clone());
        wait_until(|| !second.mutations().is_empty()).await;

        let attempts = connector.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].1, creds("initial"));
        assert_eq!(attempts[1].1, creds("refreshed"));
        assert!(attempts[1].0 - attempts[0].0 >= Timers::default().relisten_delay);

        assert_eq!(control.policy().locked_title(), Some("Team"));
        assert_eq!(
            second.mutations(),
            vec![Call::SetTitle("g1".into(), "Team".into())]
        );

        token.cancel();
        handle.await.unwrap();
    }
}
