use std::pin::Pin;

use futures_util::Stream;

use crate::{
    domain::{ConversationId, MemberId},
    Result,
};

/// One event delivered by the upstream listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamEvent {
    pub conversation: ConversationId,
    pub sender: MemberId,
    pub kind: EventKind,
}

/// Event categories the reconciler cares about.
///
/// Adapters report anything else that happens in a conversation as `Other`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Message { body: String },
    TitleChanged { title: String },
    NicknameChanged { member: MemberId, nickname: String },
    Other,
}

/// Members of a conversation as reported by the upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ThreadInfo {
    pub members: Vec<MemberId>,
}

/// Infinite event stream returned by `listen()`.
///
/// An `Err` item (or the end of the stream) means delivery broke; the stream
/// cannot be resumed and a new `listen()` call is required.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<UpstreamEvent>> + Send>>;
