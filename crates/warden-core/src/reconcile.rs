//! Event reconciliation loop.
//!
//! Events are handled strictly in arrival order, but every upstream call a
//! handler makes is spawned as its own task and never awaited by the loop.
//! Overlapping corrections are allowed; the next drift event triggers another.

use std::{future::Future, sync::Arc};

use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::{
    command::AdminCommand,
    domain::{ConversationId, MemberId},
    policy::PolicyState,
    upstream::{
        port::UpstreamClient,
        types::{EventKind, EventStream, UpstreamEvent},
    },
    Result,
};

type Client = Arc<dyn UpstreamClient>;

/// Owner and only writer of the [`PolicyState`].
pub struct Reconciler {
    admin: MemberId,
    policy: PolicyState,
    published: watch::Sender<PolicyState>,
    tasks: TaskTracker,
}

/// Outcome of a best-effort per-member batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BulkOutcome {
    pub applied: usize,
    pub total: usize,
}

impl Reconciler {
    pub fn new(admin: MemberId, published: watch::Sender<PolicyState>) -> Self {
        Self {
            admin,
            policy: PolicyState::default(),
            published,
            tasks: TaskTracker::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn policy(&self) -> &PolicyState {
        &self.policy
    }

    /// Consume `events` until delivery breaks.
    ///
    /// Returns `Err` with the stream error, or `Ok(())` if the stream simply
    /// ended. Either way the stream is spent and the caller must `listen()`
    /// again.
    pub async fn run(&mut self, client: &Client, mut events: EventStream) -> Result<()> {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => self.handle_event(client, event),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Wait until every spawned upstream call has finished.
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    pub fn handle_event(&mut self, client: &Client, event: UpstreamEvent) {
        let UpstreamEvent {
            conversation,
            sender,
            kind,
        } = event;

        match kind {
            EventKind::Message { body } => {
                info!("📩 {sender}: {body} (Group: {conversation})");
                let Some(cmd) = AdminCommand::parse(&body) else {
                    return;
                };
                if sender != self.admin {
                    debug!("ignoring {cmd:?} from non-admin {sender}");
                    return;
                }
                self.apply_command(client, conversation, cmd);
            }
            EventKind::TitleChanged { title } => {
                let Some(fix) = self.policy.title_correction(&conversation, &title) else {
                    return;
                };
                if fix.is_empty() {
                    info!("🧹 GC name auto-removed: \"{title}\"");
                } else {
                    info!("🔒 reverting GC name \"{title}\" -> \"{fix}\"");
                }
                let client = client.clone();
                self.spawn(async move {
                    if let Err(e) = client.set_title(&fix, &conversation).await {
                        if fix.is_empty() {
                            error!("❌ Failed auto-remove GC name: {e}");
                        } else {
                            error!("❌ Failed reverting GC name: {e}");
                        }
                    }
                });
            }
            EventKind::NicknameChanged { member, nickname } => {
                for fix in self.policy.nickname_corrections(&conversation, &nickname) {
                    if fix.is_empty() {
                        info!("🧹 nickname \"{nickname}\" of {member} auto-removed");
                    } else {
                        info!("🔐 reverting nickname of {member} \"{nickname}\" -> \"{fix}\"");
                    }
                    let client = client.clone();
                    let conversation = conversation.clone();
                    let member = member.clone();
                    self.spawn(async move {
                        if let Err(e) = client.change_nickname(&fix, &conversation, &member).await
                        {
                            if fix.is_empty() {
                                error!("❌ Failed auto-remove nickname of {member}: {e}");
                            } else {
                                error!("❌ Failed reverting nickname of {member}: {e}");
                            }
                        }
                    });
                }
            }
            EventKind::Other => {}
        }
    }

    fn apply_command(&mut self, client: &Client, conversation: ConversationId, cmd: AdminCommand) {
        let client = client.clone();
        match cmd {
            AdminCommand::LockTitle { name } => {
                if name.is_empty() {
                    self.reply(client, conversation, "❌ Please provide a group name");
                    return;
                }
                self.policy.lock_title(conversation.clone(), name.clone());
                self.publish();
                self.spawn(async move {
                    match client.set_title(&name, &conversation).await {
                        Ok(()) => {
                            let text = format!("🔒 Group name locked: \"{name}\"");
                            send_reply(client.as_ref(), &conversation, &text).await;
                        }
                        Err(e) => {
                            error!("❌ Failed to lock group name: {e}");
                            send_reply(
                                client.as_ref(),
                                &conversation,
                                "❌ Failed to lock group name",
                            )
                            .await;
                        }
                    }
                });
            }
            AdminCommand::RemoveTitle => {
                self.policy.enable_title_auto_remove(conversation.clone());
                self.publish();
                self.spawn(async move {
                    match client.set_title("", &conversation).await {
                        Ok(()) => {
                            send_reply(
                                client.as_ref(),
                                &conversation,
                                "🧹 Name removed. Auto-remove ON ✅",
                            )
                            .await;
                        }
                        Err(e) => {
                            error!("❌ Failed to remove GC name: {e}");
                            send_reply(client.as_ref(), &conversation, "❌ Failed to remove name")
                                .await;
                        }
                    }
                });
            }
            AdminCommand::LockNickname { name } => {
                if name.is_empty() {
                    self.reply(client, conversation, "❌ Please provide a nickname");
                    return;
                }
                self.policy.lock_nickname(conversation.clone(), name.clone());
                self.publish();
                self.spawn(async move {
                    match apply_to_members(client.as_ref(), &conversation, &name).await {
                        Ok(out) => {
                            let text = format!(
                                "🔐 Nickname locked: \"{name}\" ({}/{} members)",
                                out.applied, out.total
                            );
                            send_reply(client.as_ref(), &conversation, &text).await;
                        }
                        Err(e) => {
                            error!("❌ Failed setting nick: {e}");
                            send_reply(client.as_ref(), &conversation, "❌ Failed setting nick")
                                .await;
                        }
                    }
                });
            }
            AdminCommand::UnlockNickname => {
                self.policy.unlock_nickname();
                self.publish();
                self.reply(client, conversation, "🔓 Nickname lock disabled");
            }
            AdminCommand::RemoveAllNicknames => {
                self.policy.enable_nickname_auto_remove(conversation.clone());
                self.publish();
                self.spawn(async move {
                    match apply_to_members(client.as_ref(), &conversation, "").await {
                        Ok(out) => {
                            let text = format!(
                                "💥 Nicknames cleared. Auto-remove ON ({}/{} members)",
                                out.applied, out.total
                            );
                            send_reply(client.as_ref(), &conversation, &text).await;
                        }
                        Err(e) => {
                            error!("❌ Failed removing nicknames: {e}");
                            send_reply(
                                client.as_ref(),
                                &conversation,
                                "❌ Failed removing nicknames",
                            )
                            .await;
                        }
                    }
                });
            }
            AdminCommand::StopNicknameRemoval => {
                self.policy.disable_nickname_auto_remove();
                self.publish();
                self.reply(client, conversation, "🛑 Nick auto-remove OFF");
            }
            AdminCommand::Status => {
                let text = self.policy.status_text();
                self.reply(client, conversation, &text);
            }
        }
    }

    fn reply(&self, client: Client, conversation: ConversationId, text: &str) {
        let text = text.to_string();
        self.spawn(async move {
            send_reply(client.as_ref(), &conversation, &text).await;
        });
    }

    fn publish(&self) {
        self.published.send_replace(self.policy.clone());
    }

    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(fut);
    }
}

async fn send_reply(client: &dyn UpstreamClient, conversation: &ConversationId, text: &str) {
    if let Err(e) = client.send_message(text, conversation).await {
        warn!("failed to reply in {conversation}: {e}");
    }
}

/// Set `nickname` on every member of `conversation`, one call per member.
///
/// Individual failures are logged and skipped; only a failure to fetch the
/// member list fails the whole batch.
pub async fn apply_to_members(
    client: &dyn UpstreamClient,
    conversation: &ConversationId,
    nickname: &str,
) -> Result<BulkOutcome> {
    let info = client.thread_info(conversation).await?;
    let total = info.members.len();
    let mut applied = 0usize;
    for member in &info.members {
        match client.change_nickname(nickname, conversation, member).await {
            Ok(()) => applied += 1,
            Err(e) => warn!("nickname update for {member} failed: {e}"),
        }
    }
    info!("nickname \"{nickname}\" applied to {applied}/{total} members of {conversation}");
    Ok(BulkOutcome { applied, total })
}
