use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::{ConversationId, MemberId, SessionCredentials},
    upstream::types::{EventStream, ThreadInfo},
    Result,
};

/// Opens authenticated sessions against the upstream platform.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    async fn connect(&self, credentials: &SessionCredentials) -> Result<Arc<dyn UpstreamClient>>;
}

/// A live, authenticated upstream session.
///
/// Mutation calls are expected to be idempotent on the platform side: setting
/// a title or nickname to the value it already holds must be harmless.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send_message(&self, text: &str, conversation: &ConversationId) -> Result<()>;

    /// An empty `title` clears the conversation title.
    async fn set_title(&self, title: &str, conversation: &ConversationId) -> Result<()>;

    /// An empty `nickname` clears the member's nickname.
    async fn change_nickname(
        &self,
        nickname: &str,
        conversation: &ConversationId,
        member: &MemberId,
    ) -> Result<()>;

    async fn thread_info(&self, conversation: &ConversationId) -> Result<ThreadInfo>;

    async fn send_typing(&self, conversation: &ConversationId, typing: bool) -> Result<()>;

    /// Current authentication state, suitable for persisting.
    fn session_state(&self) -> Result<SessionCredentials>;

    /// Start delivering events. Fails if the session is no longer usable.
    async fn listen(&self) -> Result<EventStream>;
}
