//! Long-poll listener and update classification.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use futures_util::stream;
use teloxide::{
    prelude::*,
    types::{AllowedUpdate, ChatMemberKind, ChatMemberUpdated, Update, UpdateKind},
};

use warden_core::{
    domain::{ConversationId, MemberId},
    upstream::types::{EventKind, EventStream, UpstreamEvent},
    Result,
};

use crate::map_err;

/// Seconds Telegram may hold a `getUpdates` call open.
const POLL_TIMEOUT_SECS: u32 = 30;

struct Poller {
    bot: Bot,
    offset: Arc<AtomicI32>,
    pending: VecDeque<UpstreamEvent>,
    broken: bool,
}

impl Poller {
    async fn poll(&mut self) -> Result<()> {
        let updates = self
            .bot
            .get_updates()
            .offset(self.offset.load(Ordering::SeqCst))
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::ChatMember])
            .await
            .map_err(map_err)?;

        for update in updates {
            self.offset.fetch_max(update.id + 1, Ordering::SeqCst);
            if let Some(event) = classify(&update) {
                self.pending.push_back(event);
            }
        }
        Ok(())
    }
}

/// Build the event stream for one `listen()` call.
///
/// The first failed poll is yielded as an `Err` and ends the stream.
pub(crate) fn poll_stream(bot: Bot, offset: Arc<AtomicI32>) -> EventStream {
    let poller = Poller {
        bot,
        offset,
        pending: VecDeque::new(),
        broken: false,
    };

    Box::pin(stream::unfold(poller, |mut p| async move {
        if p.broken {
            return None;
        }
        loop {
            if let Some(event) = p.pending.pop_front() {
                return Some((Ok(event), p));
            }
            if let Err(e) = p.poll().await {
                p.broken = true;
                return Some((Err(e), p));
            }
        }
    }))
}

/// Map a Telegram update onto the core's event categories.
///
/// Chat activity that is neither text, a title change nor a custom-title
/// change becomes `Other`; updates not tied to a chat and a sender yield `None`.
pub(crate) fn classify(update: &Update) -> Option<UpstreamEvent> {
    match &update.kind {
        UpdateKind::Message(msg) => {
            let sender = msg.from()?;
            let kind = if let Some(title) = msg.new_chat_title() {
                EventKind::TitleChanged {
                    title: title.to_string(),
                }
            } else if let Some(text) = msg.text() {
                EventKind::Message {
                    body: text.to_string(),
                }
            } else {
                EventKind::Other
            };
            Some(UpstreamEvent {
                conversation: ConversationId(msg.chat.id.0.to_string()),
                sender: MemberId(sender.id.0.to_string()),
                kind,
            })
        }
        UpdateKind::ChatMember(change) => Some(custom_title_change(change)),
        _ => None,
    }
}

/// Telegram has no per-chat nicknames; an administrator's custom title is the
/// closest equivalent and changes arrive as `chat_member` updates.
fn custom_title_change(change: &ChatMemberUpdated) -> UpstreamEvent {
    let old = custom_title(&change.old_chat_member.kind);
    let new = custom_title(&change.new_chat_member.kind);
    let kind = if old == new {
        EventKind::Other
    } else {
        EventKind::NicknameChanged {
            member: MemberId(change.new_chat_member.user.id.0.to_string()),
            nickname: new.unwrap_or_default().to_string(),
        }
    };
    UpstreamEvent {
        conversation: ConversationId(change.chat.id.0.to_string()),
        sender: MemberId(change.from.id.0.to_string()),
        kind,
    }
}

fn custom_title(kind: &ChatMemberKind) -> Option<&str> {
    match kind {
        ChatMemberKind::Owner(owner) => owner.custom_title.as_deref(),
        ChatMemberKind::Administrator(admin) => admin.custom_title.as_deref(),
        _ => None,
    }
}
