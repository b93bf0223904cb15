use serde::{Deserialize, Serialize};

use warden_core::{domain::SessionCredentials, errors::Error, Result};

/// Shape of `appstate.json` for Telegram: the bot token plus the long-poll
/// offset, so a restart resumes right after the last update it saw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramSession {
    pub token: String,
    #[serde(default)]
    pub offset: i32,
}

impl TelegramSession {
    pub fn from_credentials(credentials: &SessionCredentials) -> Result<Self> {
        let session: Self = serde_json::from_value(credentials.0.clone())
            .map_err(|e| Error::Config(format!("telegram session state: {e}")))?;
        if session.token.trim().is_empty() {
            return Err(Error::Config("telegram bot token is empty".to_string()));
        }
        Ok(session)
    }

    pub fn to_credentials(&self) -> Result<SessionCredentials> {
        Ok(SessionCredentials(serde_json::to_value(self)?))
    }
}
