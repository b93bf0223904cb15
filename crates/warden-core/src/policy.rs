//! In-memory lock policy.
//!
//! `PolicyState` has exactly one writer, the reconciler, which owns it by
//! value. Everyone else sees clones published through a `watch` channel.

use serde::Serialize;

use crate::domain::ConversationId;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyState {
    locked_conversation: Option<ConversationId>,
    locked_title: Option<String>,
    title_auto_remove: bool,
    locked_nickname: Option<String>,
    nickname_auto_remove: bool,
}

/// Display form of the policy, shared by `/status` and the HTTP façade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySummary {
    pub gc_lock: String,
    pub gc_auto_remove: &'static str,
    pub nick_lock: String,
    pub nick_auto_remove: &'static str,
}

impl PolicyState {
    pub fn locked_conversation(&self) -> Option<&ConversationId> {
        self.locked_conversation.as_ref()
    }

    pub fn locked_title(&self) -> Option<&str> {
        self.locked_title.as_deref()
    }

    pub fn title_auto_remove(&self) -> bool {
        self.title_auto_remove
    }

    pub fn locked_nickname(&self) -> Option<&str> {
        self.locked_nickname.as_deref()
    }

    pub fn nickname_auto_remove(&self) -> bool {
        self.nickname_auto_remove
    }

    fn is_locked(&self, conversation: &ConversationId) -> bool {
        self.locked_conversation.as_ref() == Some(conversation)
    }

    /// Bind `conversation` and lock its title. Turns title auto-remove off.
    pub fn lock_title(&mut self, conversation: ConversationId, title: String) {
        self.locked_conversation = Some(conversation);
        self.locked_title = Some(title);
        self.title_auto_remove = false;
    }

    /// Bind `conversation` and clear any title set on it. Drops the title lock.
    pub fn enable_title_auto_remove(&mut self, conversation: ConversationId) {
        self.locked_conversation = Some(conversation);
        self.locked_title = None;
        self.title_auto_remove = true;
    }

    /// Lock every nickname to `nickname`. Binds `conversation` only when no
    /// conversation is bound yet; an existing binding is never moved.
    pub fn lock_nickname(&mut self, conversation: ConversationId, nickname: String) {
        self.locked_conversation.get_or_insert(conversation);
        self.locked_nickname = Some(nickname);
    }

    pub fn unlock_nickname(&mut self) {
        self.locked_nickname = None;
    }

    /// Same binding rule as [`PolicyState::lock_nickname`].
    pub fn enable_nickname_auto_remove(&mut self, conversation: ConversationId) {
        self.locked_conversation.get_or_insert(conversation);
        self.nickname_auto_remove = true;
    }

    pub fn disable_nickname_auto_remove(&mut self) {
        self.nickname_auto_remove = false;
    }

    /// Title to write back after `new_title` was observed, if any.
    ///
    /// The lock wins over auto-remove; at most one correction is returned.
    pub fn title_correction(
        &self,
        conversation: &ConversationId,
        new_title: &str,
    ) -> Option<String> {
        if !self.is_locked(conversation) {
            return None;
        }
        if let Some(locked) = &self.locked_title {
            if new_title != locked {
                return Some(locked.clone());
            }
            return None;
        }
        if self.title_auto_remove && !new_title.is_empty() {
            return Some(String::new());
        }
        None
    }

    /// Nicknames to write back for a member after `new_nickname` was observed.
    ///
    /// Lock-restore and auto-remove are evaluated independently; the restore
    /// (when present) comes first.
    pub fn nickname_corrections(
        &self,
        conversation: &ConversationId,
        new_nickname: &str,
    ) -> Vec<String> {
        let mut out = Vec::new();
        if !self.is_locked(conversation) {
            return out;
        }
        if let Some(locked) = &self.locked_nickname {
            if new_nickname != locked {
                out.push(locked.clone());
            }
        }
        if self.nickname_auto_remove && !new_nickname.is_empty() {
            out.push(String::new());
        }
        out
    }

    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            gc_lock: self
                .locked_title
                .clone()
                .unwrap_or_else(|| "OFF".to_string()),
            gc_auto_remove: on_off(self.title_auto_remove),
            nick_lock: match &self.locked_nickname {
                Some(nick) => format!("ON ({nick})"),
                None => "OFF".to_string(),
            },
            nick_auto_remove: on_off(self.nickname_auto_remove),
        }
    }

    /// Reply text for the `/status` command.
    pub fn status_text(&self) -> String {
        let s = self.summary();
        format!(
            "BOT STATUS:\n\
             • GC Lock: {}\n\
             • GC AutoRemove: {}\n\
             • Nick Lock: {}\n\
             • Nick AutoRemove: {}",
            s.gc_lock, s.gc_auto_remove, s.nick_lock, s.nick_auto_remove
        )
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "ON"
    } else {
        "OFF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conv(id: &str) -> ConversationId {
        ConversationId::from(id)
    }

    #[test]
    fn title_lock_and_auto_remove_exclude_each_other() {
        let mut p = PolicyState::default();
        p.enable_title_auto_remove(conv("g1"));
        assert!(p.title_auto_remove());
        assert_eq!(p.locked_title(), None);

        p.lock_title(conv("g1"), "Team".to_string());
        assert!(!p.title_auto_remove());
        assert_eq!(p.locked_title(), Some("Team"));

        p.enable_title_auto_remove(conv("g1"));
        assert_eq!(p.locked_title(), None);
        assert!(p.title_auto_remove());
    }

    #[test]
    fn lock_rebinds_conversation() {
        let mut p = PolicyState::default();
        p.lock_title(conv("g1"), "A".to_string());
        p.lock_title(conv("g2"), "B".to_string());
        assert_eq!(p.locked_conversation(), Some(&conv("g2")));
        assert_eq!(p.title_correction(&conv("g1"), "x"), None);
        assert_eq!(p.title_correction(&conv("g2"), "x"), Some("B".to_string()));
    }

    #[test]
    fn title_correction_rules() {
        let mut p = PolicyState::default();
        assert_eq!(p.title_correction(&conv("g1"), "x"), None);

        p.lock_title(conv("g1"), "Team".to_string());
        assert_eq!(p.title_correction(&conv("g1"), "Team"), None);
        assert_eq!(
            p.title_correction(&conv("g1"), ""),
            Some("Team".to_string())
        );

        p.enable_title_auto_remove(conv("g1"));
        assert_eq!(p.title_correction(&conv("g1"), ""), None);
        assert_eq!(p.title_correction(&conv("g1"), "spam"), Some(String::new()));
    }

    #[test]
    fn nickname_rules_fire_independently() {
        let mut p = PolicyState::default();
        p.lock_nickname(conv("g1"), "Guest".to_string());
        assert_eq!(p.nickname_corrections(&conv("g1"), "Guest"), Vec::<String>::new());
        assert_eq!(p.nickname_corrections(&conv("g1"), "boss"), vec!["Guest"]);
        assert!(p.nickname_corrections(&conv("g2"), "boss").is_empty());

        p.enable_nickname_auto_remove(conv("g1"));
        assert_eq!(
            p.nickname_corrections(&conv("g1"), "boss"),
            vec!["Guest".to_string(), String::new()]
        );

        p.unlock_nickname();
        assert_eq!(p.nickname_corrections(&conv("g1"), "boss"), vec![""]);
        assert!(p.nickname_corrections(&conv("g1"), "").is_empty());

        p.disable_nickname_auto_remove();
        assert!(p.nickname_corrections(&conv("g1"), "boss").is_empty());
    }

    #[test]
    fn nickname_commands_never_move_an_existing_binding() {
        let mut p = PolicyState::default();
        p.lock_nickname(conv("g2"), "Guest".to_string());
        assert_eq!(p.locked_conversation(), Some(&conv("g2")));

        p.lock_title(conv("g1"), "Team".to_string());
        p.lock_nickname(conv("g2"), "Other".to_string());
        p.enable_nickname_auto_remove(conv("g3"));
        assert_eq!(p.locked_conversation(), Some(&conv("g1")));
        assert_eq!(p.title_correction(&conv("g2"), "Room2"), None);
        assert_eq!(p.title_correction(&conv("g1"), "Hacked"), Some("Team".to_string()));
    }

    #[test]
    fn status_text_reflects_flags() {
        let mut p = PolicyState::default();
        p.lock_title(conv("g1"), "Team".to_string());
        p.lock_nickname(conv("g1"), "Guest".to_string());

        let text = p.status_text();
        assert!(text.starts_with("BOT STATUS:"));
        assert!(text.contains("• GC Lock: Team"));
        assert!(text.contains("• GC AutoRemove: OFF"));
        assert!(text.contains("• Nick Lock: ON (Guest)"));
        assert!(text.contains("• Nick AutoRemove: OFF"));
    }

    #[test]
    fn summary_serializes_with_camel_case_keys() {
        let v = serde_json::to_value(PolicyState::default().summary()).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "gcLock": "OFF",
                "gcAutoRemove": "OFF",
                "nickLock": "OFF",
                "nickAutoRemove": "OFF",
            })
        );
    }
}
