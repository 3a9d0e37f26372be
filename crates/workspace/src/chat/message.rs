use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use lewis_storage::MessageId;

/// Chat speaker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Lifecycle status for one message.
///
/// User and system messages are created `Done`. Assistant messages start `Streaming` and
/// settle exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "lowercase")]
pub enum MessageStatus {
    Streaming,
    Done,
    Error(String),
    Cancelled,
}

impl MessageStatus {
    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }
}

/// Status of one tool call; moves at most once, from `Pending` to a terminal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Complete,
    Failed,
}

impl ToolStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Returns true only for `Pending -> Complete` and `Pending -> Failed`.
    pub fn allows(self, next: ToolStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Complete) | (Self::Pending, Self::Failed)
        )
    }
}

/// Record of an external tool call made during an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    #[serde(default)]
    pub args: Value,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

impl ToolInvocation {
    pub fn pending(tool_name: impl Into<String>, args: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
            status: ToolStatus::Pending,
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tool_invocations: Vec<ToolInvocation>,
    pub status: MessageStatus,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, status: MessageStatus) -> Self {
        Self {
            id: MessageId::new_v7(),
            role,
            content: content.into(),
            tool_invocations: Vec::new(),
            status,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, MessageStatus::Done)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content, MessageStatus::Done)
    }

    /// Empty assistant placeholder that receives streamed content.
    pub fn assistant_streaming() -> Self {
        Self::new(Role::Assistant, String::new(), MessageStatus::Streaming)
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    pub fn tool(&self, index: usize) -> Option<&ToolInvocation> {
        self.tool_invocations.get(index)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tool_status_only_leaves_pending() {
        let all = [ToolStatus::Pending, ToolStatus::Complete, ToolStatus::Failed];
        for from in all {
            for to in all {
                let expected = from == ToolStatus::Pending && to != ToolStatus::Pending;
                assert_eq!(from.allows(to), expected, "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn message_status_serializes_with_detail() {
        assert_eq!(
            serde_json::to_value(MessageStatus::Error("boom".into())).unwrap(),
            json!({"state": "error", "detail": "boom"})
        );
        assert_eq!(
            serde_json::to_value(MessageStatus::Done).unwrap(),
            json!({"state": "done"})
        );
    }

    #[test]
    fn constructors_pick_role_and_status() {
        let user = Message::user("hello");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.status, MessageStatus::Done);

        let assistant = Message::assistant_streaming();
        assert_eq!(assistant.role, Role::Assistant);
        assert!(assistant.status.is_streaming());
        assert!(assistant.content.is_empty());
        assert_ne!(user.id, assistant.id);

        let system = Message::system("You write short ad scripts.");
        assert_eq!(system.role, Role::System);
        assert_eq!(system.status, MessageStatus::Done);
        assert!(system.tool_invocations.is_empty());
    }
}
