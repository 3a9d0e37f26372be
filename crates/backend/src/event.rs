use lewis_storage::SessionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier for one streamed turn.
///
/// A new id is minted for every turn so events from an abandoned stream can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TurnId(pub u64);

impl TurnId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Routing key for every event of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnTarget {
    pub session_id: SessionId,
    pub turn_id: TurnId,
}

impl TurnTarget {
    pub const fn new(session_id: SessionId, turn_id: TurnId) -> Self {
        Self {
            session_id,
            turn_id,
        }
    }
}

/// Speaker role as the backend names it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Opens one backend event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRequest {
    pub target: TurnTarget,
    pub role: Role,
    pub content: String,
}

impl TurnRequest {
    pub fn user(target: TurnTarget, content: impl Into<String>) -> Self {
        Self {
            target,
            role: Role::User,
            content: content.into(),
        }
    }

    /// Request body in the backend's JSON shape: `{sessionId, role, content}`.
    pub fn wire_body(&self) -> Value {
        serde_json::json!({
            "sessionId": self.target.session_id,
            "role": self.role,
            "content": self.content,
        })
    }
}

/// Terminal status reported for a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolOutcome {
    Complete,
    Failed,
}

/// Creative workflow stage names used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Drafting,
    Scripting,
    Visualizing,
    Rendering,
    Done,
}

/// One event of a backend stream, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum BackendEvent {
    ContentDelta {
        text: String,
    },
    ToolCall {
        tool_name: String,
        #[serde(default)]
        args: Value,
    },
    ToolResult {
        index: usize,
        status: ToolOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    StagePayload {
        stage: StageName,
        payload: Value,
    },
    Error {
        message: String,
    },
    Done,
}

impl BackendEvent {
    pub fn content_delta(text: impl Into<String>) -> Self {
        Self::ContentDelta { text: text.into() }
    }

    pub fn tool_call(tool_name: impl Into<String>, args: Value) -> Self {
        Self::ToolCall {
            tool_name: tool_name.into(),
            args,
        }
    }

    pub fn tool_complete(index: usize, result: Value) -> Self {
        Self::ToolResult {
            index,
            status: ToolOutcome::Complete,
            result: Some(result),
        }
    }

    pub fn tool_failed(index: usize) -> Self {
        Self::ToolResult {
            index,
            status: ToolOutcome::Failed,
            result: None,
        }
    }

    pub fn stage_payload(stage: StageName, payload: Value) -> Self {
        Self::StagePayload { stage, payload }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns true for events that end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Done)
    }
}

/// A backend event tagged with the turn it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub target: TurnTarget,
    pub event: BackendEvent,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn events_use_tagged_camel_case_wire_shape() {
        let event = BackendEvent::tool_call("web_search", json!({"query": "rust"}));
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "tool_call", "toolName": "web_search", "args": {"query": "rust"}})
        );

        let parsed: BackendEvent = serde_json::from_value(json!({
            "type": "tool_result",
            "index": 0,
            "status": "failed"
        }))
        .unwrap();
        assert_eq!(parsed, BackendEvent::tool_failed(0));

        let done: BackendEvent = serde_json::from_value(json!({"type": "done"})).unwrap();
        assert!(done.is_terminal());
    }

    #[test]
    fn stage_payload_parses_lowercase_stage_names() {
        let parsed: BackendEvent = serde_json::from_value(json!({
            "type": "stage_payload",
            "stage": "visualizing",
            "payload": {"assetId": "scene-1", "status": "pending"}
        }))
        .unwrap();

        assert!(matches!(
            parsed,
            BackendEvent::StagePayload {
                stage: StageName::Visualizing,
                ..
            }
        ));
        assert!(!parsed.is_terminal());
    }

    #[test]
    fn request_body_matches_backend_contract() {
        let session_id = SessionId::new_v7();
        let request = TurnRequest::user(TurnTarget::new(session_id, TurnId::new(1)), "hello");

        assert_eq!(
            request.wire_body(),
            json!({"sessionId": session_id.to_string(), "role": "user", "content": "hello"})
        );
    }
}
