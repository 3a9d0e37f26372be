use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

pub use lewis_storage::SessionId;

use super::message::{Message, MessageId};
use crate::creative::CreativeSession;

/// Title given to sessions that were created without one.
pub const DEFAULT_SESSION_TITLE: &str = "New Session";

/// Which canvas a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    General,
    Creative,
}

/// One conversation or workflow instance.
///
/// `messages` is append-only; its order is both display order and conversation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub mode: SessionMode,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at_unix_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creative: Option<CreativeSession>,
    // Reload never resumes a stream.
    #[serde(skip)]
    pub(crate) streaming: bool,
}

impl Session {
    pub fn new(title: impl Into<String>, mode: SessionMode) -> Self {
        let creative = match mode {
            SessionMode::General => None,
            SessionMode::Creative => Some(CreativeSession::new()),
        };

        Self {
            id: SessionId::new_v7(),
            title: title.into(),
            mode,
            messages: Vec::new(),
            created_at_unix_ms: now_unix_ms(),
            creative,
            streaming: false,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn message(&self, message_id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == message_id)
    }

    pub(crate) fn message_mut(&mut self, message_id: MessageId) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|message| message.id == message_id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

pub(crate) fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
