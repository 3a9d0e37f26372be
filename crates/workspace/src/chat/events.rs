use crate::chat::message::{MessageId, MessageStatus, ToolStatus};
use crate::chat::session::SessionId;
use crate::creative::Stage;

/// Change notification published by the session store after each successful mutation.
///
/// Rejected operations publish nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    SessionCreated {
        session_id: SessionId,
    },
    SessionSelected {
        session_id: SessionId,
    },
    SessionRenamed {
        session_id: SessionId,
        title: String,
    },
    SessionDeleted {
        session_id: SessionId,
    },
    MessageAppended {
        session_id: SessionId,
        message_id: MessageId,
    },
    MessageContentExtended {
        session_id: SessionId,
        message_id: MessageId,
        appended: String,
    },
    MessageFinished {
        session_id: SessionId,
        message_id: MessageId,
        status: MessageStatus,
    },
    ToolInvocationAppended {
        session_id: SessionId,
        message_id: MessageId,
        tool_index: usize,
    },
    ToolStatusChanged {
        session_id: SessionId,
        message_id: MessageId,
        tool_index: usize,
        status: ToolStatus,
    },
    StreamingChanged {
        session_id: SessionId,
        streaming: bool,
    },
    StageChanged {
        session_id: SessionId,
        stage: Stage,
    },
    /// Prompt, script, storyboard or render data changed without a stage move.
    CreativeUpdated {
        session_id: SessionId,
    },
    /// The whole store was replaced from a snapshot.
    Restored,
}

impl StoreEvent {
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::SessionCreated { session_id }
            | Self::SessionSelected { session_id }
            | Self::SessionRenamed { session_id, .. }
            | Self::SessionDeleted { session_id }
            | Self::MessageAppended { session_id, .. }
            | Self::MessageContentExtended { session_id, .. }
            | Self::MessageFinished { session_id, .. }
            | Self::ToolInvocationAppended { session_id, .. }
            | Self::ToolStatusChanged { session_id, .. }
            | Self::StreamingChanged { session_id, .. }
            | Self::StageChanged { session_id, .. }
            | Self::CreativeUpdated { session_id } => Some(*session_id),
            Self::Restored => None,
        }
    }
}
