//! Telegram adapter (teloxide).
//!
//! Implements the `warden-core` upstream ports over the Telegram Bot API:
//! chat titles map to group titles and nicknames map to administrator
//! custom titles.

use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{ChatAction, UserId},
};
use tokio::time::sleep;
use tracing::info;

mod events;
pub mod session;

pub use session::TelegramSession;

use warden_core::{
    domain::{ConversationId, MemberId, SessionCredentials},
    errors::Error,
    upstream::{
        port::{UpstreamClient, UpstreamConnector},
        types::{EventStream, ThreadInfo},
    },
    Result,
};

pub(crate) fn map_err(e: teloxide::RequestError) -> Error {
    Error::Upstream(format!("telegram error: {e}"))
}

async fn with_retry<T, Fut>(mut op: impl FnMut() -> Fut) -> Result<T>
where
    Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
    Fut::IntoFuture: Send,
{
    const MAX_RETRIES: usize = 1;
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(teloxide::RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                attempts += 1;
                sleep(d).await;
            }
            Err(other) => return Err(map_err(other)),
        }
    }
}

fn tg_chat(conversation: &ConversationId) -> Result<ChatId> {
    conversation
        .as_str()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| Error::Upstream(format!("not a telegram chat id: {conversation}")))
}

fn tg_user(member: &MemberId) -> Result<UserId> {
    member
        .as_str()
        .parse::<u64>()
        .map(UserId)
        .map_err(|_| Error::Upstream(format!("not a telegram user id: {member}")))
}

/// Logs in by checking the bot token with `getMe`.
#[derive(Clone, Debug, Default)]
pub struct TelegramConnector;

#[async_trait]
impl UpstreamConnector for TelegramConnector {
    async fn connect(&self, credentials: &SessionCredentials) -> Result<Arc<dyn UpstreamClient>> {
        let session = TelegramSession::from_credentials(credentials)?;
        let bot = Bot::new(session.token.clone());
        let me = with_retry(|| bot.get_me()).await?;
        info!(bot_id = me.id.0, "telegram login ok");

        Ok(Arc::new(TelegramClient {
            bot,
            token: session.token,
            offset: Arc::new(AtomicI32::new(session.offset)),
        }))
    }
}

pub struct TelegramClient {
    bot: Bot,
    token: String,
    /// Next `getUpdates` offset, shared with the running poll stream.
    offset: Arc<AtomicI32>,
}

#[async_trait]
impl UpstreamClient for TelegramClient {
    async fn send_message(&self, text: &str, conversation: &ConversationId) -> Result<()> {
        let chat = tg_chat(conversation)?;
        with_retry(|| self.bot.send_message(chat, text.to_string())).await?;
        Ok(())
    }

    async fn set_title(&self, title: &str, conversation: &ConversationId) -> Result<()> {
        if title.is_empty() {
            return Err(Error::Upstream(
                "telegram chats cannot have an empty title".to_string(),
            ));
        }
        let chat = tg_chat(conversation)?;
        with_retry(|| self.bot.set_chat_title(chat, title.to_string())).await?;
        Ok(())
    }

    async fn change_nickname(
        &self,
        nickname: &str,
        conversation: &ConversationId,
        member: &MemberId,
    ) -> Result<()> {
        let chat = tg_chat(conversation)?;
        let user = tg_user(member)?;
        with_retry(|| {
            self.bot
                .set_chat_administrator_custom_title(chat, user, nickname.to_string())
        })
        .await?;
        Ok(())
    }

    async fn thread_info(&self, conversation: &ConversationId) -> Result<ThreadInfo> {
        let chat = tg_chat(conversation)?;
        let admins = with_retry(|| self.bot.get_chat_administrators(chat)).await?;
        Ok(ThreadInfo {
            members: admins
                .into_iter()
                .map(|m| MemberId(m.user.id.0.to_string()))
                .collect(),
        })
    }

    async fn send_typing(&self, conversation: &ConversationId, on: bool) -> Result<()> {
        // Typing expires by itself after a few seconds; there is no "stop" call.
        if !on {
            return Ok(());
        }
        let chat = tg_chat(conversation)?;
        with_retry(|| self.bot.send_chat_action(chat, ChatAction::Typing)).await?;
        Ok(())
    }

    fn session_state(&self) -> Result<SessionCredentials> {
        TelegramSession {
            token: self.token.clone(),
            offset: self.offset.load(Ordering::SeqCst),
        }
        .to_credentials()
    }

    async fn listen(&self) -> Result<EventStream> {
        // A revoked token fails here, which sends the core back to login.
        with_retry(|| self.bot.get_me()).await?;
        Ok(events::poll_stream(self.bot.clone(), self.offset.clone()))
    }
}
