use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    domain::ConversationId,
    errors::Error,
    lifecycle::{LinkState, LinkStatus},
    policy::{PolicyState, PolicySummary},
    upstream::port::UpstreamClient,
    Result,
};

/// Read-side view of the running core, handed to the HTTP façade and the
/// maintenance timers. Cheap to clone.
#[derive(Clone)]
pub struct ControlHandle {
    policy: watch::Receiver<PolicyState>,
    client: watch::Receiver<Option<Arc<dyn UpstreamClient>>>,
    link: watch::Receiver<LinkStatus>,
}

/// `GET /status` payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(flatten)]
    pub policy: PolicySummary,
    pub link: LinkState,
    pub connected_at: Option<DateTime<Utc>>,
}

impl ControlHandle {
    pub fn new(
        policy: watch::Receiver<PolicyState>,
        client: watch::Receiver<Option<Arc<dyn UpstreamClient>>>,
        link: watch::Receiver<LinkStatus>,
    ) -> Self {
        Self {
            policy,
            client,
            link,
        }
    }

    pub fn policy(&self) -> PolicyState {
        self.policy.borrow().clone()
    }

    pub fn link(&self) -> LinkStatus {
        self.link.borrow().clone()
    }

    pub fn current_client(&self) -> Option<Arc<dyn UpstreamClient>> {
        self.client.borrow().clone()
    }

    pub fn status(&self) -> StatusReport {
        let link = self.link();
        StatusReport {
            policy: self.policy().summary(),
            link: link.state,
            connected_at: link.connected_at,
        }
    }

    /// Send `text` through the live connection.
    pub async fn send_message(&self, conversation: &ConversationId, text: &str) -> Result<()> {
        let client = self.current_client().ok_or(Error::NotConnected)?;
        client.send_message(text, conversation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeClient};

    #[tokio::test]
    async fn send_requires_a_connection() {
        let (_ptx, prx) = watch::channel(PolicyState::default());
        let (ctx, crx) = watch::channel::<Option<Arc<dyn UpstreamClient>>>(None);
        let (_ltx, lrx) = watch::channel(LinkStatus::default());
        let control = ControlHandle::new(prx, crx, lrx);

        let conv = ConversationId::from("g1");
        assert!(matches!(
            control.send_message(&conv, "hi").await,
            Err(Error::NotConnected)
        ));

        let fake = Arc::new(FakeClient::default());
        ctx.send_replace(Some(fake.clone() as Arc<dyn UpstreamClient>));
        control.send_message(&conv, "hi").await.unwrap();
        assert_eq!(
            fake.calls(),
            vec![Call::SendMessage("g1".into(), "hi".into())]
        );
    }

    #[test]
    fn status_report_flattens_policy() {
        let mut policy = PolicyState::default();
        policy.lock_title(ConversationId::from("g1"), "Team".to_string());
        let (_ptx, prx) = watch::channel(policy);
        let (_ctx, crx) = watch::channel::<Option<Arc<dyn UpstreamClient>>>(None);
        let (_ltx, lrx) = watch::channel(LinkStatus::default());

        let v = serde_json::to_value(ControlHandle::new(prx, crx, lrx).status()).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "gcLock": "Team",
                "gcAutoRemove": "OFF",
                "nickLock": "OFF",
                "nickAutoRemove": "OFF",
                "link": "disconnected",
                "connectedAt": null,
            })
        );
    }
}
