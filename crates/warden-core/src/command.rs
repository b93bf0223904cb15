//! Administrator chat commands.
//!
//! Triggers are matched case-insensitively; arguments keep their original case.

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    /// `/gclock <name>`; `name` may be empty and is validated by the caller.
    LockTitle { name: String },
    /// `/gcremove`
    RemoveTitle,
    /// `/nicklock on <name>`; `name` may be empty.
    LockNickname { name: String },
    /// `/nicklock off`
    UnlockNickname,
    /// `/nickremoveall`
    RemoveAllNicknames,
    /// `/nickremoveoff`
    StopNicknameRemoval,
    /// `/status`
    Status,
}

const GCLOCK: &str = "/gclock";

impl AdminCommand {
    /// Parse a message body. Returns `None` for anything that is not a command.
    pub fn parse(body: &str) -> Option<Self> {
        let trimmed = body.trim();

        if let Some(rest) = strip_prefix_ignore_case(trimmed, GCLOCK) {
            return Some(Self::LockTitle {
                name: rest.trim().to_string(),
            });
        }

        let mut words = trimmed.split(' ');
        let first = words.next().unwrap_or("");
        if first.eq_ignore_ascii_case("/nicklock") {
            let second = words.next().unwrap_or("");
            if second.eq_ignore_ascii_case("on") {
                let name = words.collect::<Vec<_>>().join(" ");
                return Some(Self::LockNickname {
                    name: name.trim().to_string(),
                });
            }
        }

        match trimmed.to_lowercase().as_str() {
            "/gcremove" => Some(Self::RemoveTitle),
            "/nicklock off" => Some(Self::UnlockNickname),
            "/nickremoveall" => Some(Self::RemoveAllNicknames),
            "/nickremoveoff" => Some(Self::StopNicknameRemoval),
            "/status" => Some(Self::Status),
            _ => None,
        }
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}
