//! Scripted upstream fakes shared by the unit tests in this crate.

use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio::time::Instant;

use crate::{
    domain::{ConversationId, MemberId, SessionCredentials},
    errors::Error,
    upstream::{
        port::{UpstreamClient, UpstreamConnector},
        types::{EventKind, EventStream, ThreadInfo, UpstreamEvent},
    },
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    SendMessage(String, String),
    SetTitle(String, String),
    ChangeNickname(String, String, String),
    ThreadInfo(String),
    Typing(String, bool),
}

/// What one `listen()` call yields.
pub enum ListenScript {
    /// `listen()` itself fails: the connection is gone.
    Fail(String),
    /// Yield these items; if none of them is an `Err`, the stream then stays open.
    Events(Vec<Result<UpstreamEvent>>),
}

#[derive(Default)]
pub struct FakeClient {
    pub calls: Mutex<Vec<Call>>,
    pub members: Vec<MemberId>,
    pub failing_members: HashSet<MemberId>,
    pub fail_titles: bool,
    pub fail_thread_info: bool,
    pub listens: Mutex<VecDeque<ListenScript>>,
    pub state: Mutex<Option<SessionCredentials>>,
}

impl FakeClient {
    pub fn with_members(ids: &[&str]) -> Self {
        Self {
            members: ids.iter().map(|id| MemberId::from(*id)).collect(),
            ..Self::default()
        }
    }

    pub fn script_listen(&self, script: ListenScript) {
        self.listens.lock().unwrap().push_back(script);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::SendMessage(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::SetTitle(..) | Call::ChangeNickname(..)))
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl UpstreamClient for FakeClient {
    async fn send_message(&self, text: &str, conversation: &ConversationId) -> Result<()> {
        self.record(Call::SendMessage(conversation.0.clone(), text.to_string()));
        Ok(())
    }

    async fn set_title(&self, title: &str, conversation: &ConversationId) -> Result<()> {
        self.record(Call::SetTitle(conversation.0.clone(), title.to_string()));
        if self.fail_titles {
            return Err(Error::Upstream("title rejected".to_string()));
        }
        Ok(())
    }

    async fn change_nickname(
        &self,
        nickname: &str,
        conversation: &ConversationId,
        member: &MemberId,
    ) -> Result<()> {
        self.record(Call::ChangeNickname(
            conversation.0.clone(),
            member.0.clone(),
            nickname.to_string(),
        ));
        if self.failing_members.contains(member) {
            return Err(Error::Upstream(format!("cannot rename {member}")));
        }
        Ok(())
    }

    async fn thread_info(&self, conversation: &ConversationId) -> Result<ThreadInfo> {
        self.record(Call::ThreadInfo(conversation.0.clone()));
        if self.fail_thread_info {
            return Err(Error::Upstream("thread info unavailable".to_string()));
        }
        Ok(ThreadInfo {
            members: self.members.clone(),
        })
    }

    async fn send_typing(&self, conversation: &ConversationId, typing: bool) -> Result<()> {
        self.record(Call::Typing(conversation.0.clone(), typing));
        Ok(())
    }

    fn session_state(&self) -> Result<SessionCredentials> {
        self.state
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::Upstream("no session state".to_string()))
    }

    async fn listen(&self) -> Result<EventStream> {
        let script = self.listens.lock().unwrap().pop_front();
        match script {
            Some(ListenScript::Fail(reason)) => Err(Error::Upstream(reason)),
            Some(ListenScript::Events(items)) => {
                let events: EventStream = Box::pin(stream::iter(items).chain(stream::pending()));
                Ok(events)
            }
            None => {
                let events: EventStream = Box::pin(stream::pending::<Result<UpstreamEvent>>());
                Ok(events)
            }
        }
    }
}

/// Connector handing out scripted clients; records every attempt.
#[derive(Default)]
pub struct FakeConnector {
    pub outcomes: Mutex<VecDeque<Result<Arc<FakeClient>>>>,
    pub attempts: Mutex<Vec<(Instant, SessionCredentials)>>,
}

impl FakeConnector {
    pub fn push_ok(&self, client: Arc<FakeClient>) {
        self.outcomes.lock().unwrap().push_back(Ok(client));
    }

    pub fn push_err(&self, reason: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(Error::Upstream(reason.to_string())));
    }

    pub fn attempts(&self) -> Vec<(Instant, SessionCredentials)> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl UpstreamConnector for FakeConnector {
    async fn connect(&self, credentials: &SessionCredentials) -> Result<Arc<dyn UpstreamClient>> {
        self.attempts
            .lock()
            .unwrap()
            .push((Instant::now(), credentials.clone()));
        let next = self.outcomes.lock().unwrap().pop_front();
        match next {
            Some(Ok(client)) => Ok(client as Arc<dyn UpstreamClient>),
            Some(Err(e)) => Err(e),
            None => Err(Error::Upstream("no scripted session".to_string())),
        }
    }
}

pub fn message(conversation: &str, sender: &str, body: &str) -> UpstreamEvent {
    UpstreamEvent {
        conversation: ConversationId::from(conversation),
        sender: MemberId::from(sender),
        kind: EventKind::Message {
            body: body.to_string(),
        },
    }
}

pub fn title_changed(conversation: &str, sender: &str, title: &str) -> UpstreamEvent {
    UpstreamEvent {
        conversation: ConversationId::from(conversation),
        sender: MemberId::from(sender),
        kind: EventKind::TitleChanged {
            title: title.to_string(),
        },
    }
}

pub fn nickname_changed(
    conversation: &str,
    sender: &str,
    member: &str,
    nickname: &str,
) -> UpstreamEvent {
    UpstreamEvent {
        conversation: ConversationId::from(conversation),
        sender: MemberId::from(sender),
        kind: EventKind::NicknameChanged {
            member: MemberId::from(member),
            nickname: nickname.to_string(),
        },
    }
}
