use serde::{Deserialize, Serialize};

/// A rendered notification on its way to one room. Ephemeral; built per
/// delivery and never persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub room_id: String,
    pub text: String,
    /// Display name credited on the message, usually the GitHub login.
    pub alias: Option<String>,
    pub avatar_url: Option<String>,
}

impl OutgoingMessage {
    pub fn plain(room_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { room_id: room_id.into(), text: text.into(), alias: None, avatar_url: None }
    }
}
