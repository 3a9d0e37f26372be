use std::collections::HashMap;

use serde_json::Value;
use snafu::{OptionExt, ensure};
use tokio::sync::broadcast;

use crate::chat::{
    DEFAULT_SESSION_TITLE, Message, MessageId, MessageStatus, Session, SessionId, SessionMode,
    StoreEvent, ToolInvocation, ToolStatus,
};
use crate::creative::{CreativePayload, CreativeSession, DEFAULT_MAX_PROMPT_CHARS, Stage};
use crate::error::{AlreadyStreamingSnafu, InvalidTransitionSnafu, NotFoundSnafu, WorkspaceResult};
use crate::settings::WorkspaceSettings;

pub(crate) const DEFAULT_EVENT_BUFFER: usize = 256;

/// Single source of truth for sessions, messages and creative workflow state.
///
/// All mutation goes through `&mut self`. A failing operation returns before touching any
/// state, so callers never observe a half-applied change.
pub struct SessionStore {
    sessions: HashMap<SessionId, Session>,
    order: Vec<SessionId>,
    active: Option<SessionId>,
    default_title: String,
    max_prompt_chars: usize,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::build(
            DEFAULT_SESSION_TITLE.to_string(),
            DEFAULT_MAX_PROMPT_CHARS,
            DEFAULT_EVENT_BUFFER,
        )
    }

    pub fn with_settings(settings: &WorkspaceSettings) -> Self {
        Self::build(
            settings.default_session_title.clone(),
            settings.max_prompt_chars,
            settings.event_buffer,
        )
    }

    fn build(default_title: String, max_prompt_chars: usize, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            sessions: HashMap::new(),
            order: Vec::new(),
            active: None,
            default_title,
            max_prompt_chars,
            events,
        }
    }

    /// Receives every change published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn create_session(&mut self) -> SessionId {
        self.insert_session(SessionMode::General)
    }

    pub fn create_creative_session(&mut self) -> SessionId {
        self.insert_session(SessionMode::Creative)
    }

    fn insert_session(&mut self, mode: SessionMode) -> SessionId {
        let session = Session::new(self.default_title.clone(), mode);
        let session_id = session.id;
        self.sessions.insert(session_id, session);
        self.order.push(session_id);
        self.active = Some(session_id);

        tracing::debug!(session_id = %session_id, ?mode, "created session");
        self.notify(StoreEvent::SessionCreated { session_id });
        self.notify(StoreEvent::SessionSelected { session_id });
        session_id
    }

    pub fn select_session(&mut self, session_id: SessionId) -> WorkspaceResult<()> {
        self.session_or_not_found(session_id, "select-session")?;
        self.active = Some(session_id);
        self.notify(StoreEvent::SessionSelected { session_id });
        Ok(())
    }

    pub fn rename_session(
        &mut self,
        session_id: SessionId,
        title: impl Into<String>,
    ) -> WorkspaceResult<()> {
        let title = title.into();
        let session = self.session_mut_or_not_found(session_id, "rename-session")?;
        session.title = title.clone();
        self.notify(StoreEvent::SessionRenamed { session_id, title });
        Ok(())
    }

    /// Removes a session that is not streaming and returns it.
    pub fn delete_session(&mut self, session_id: SessionId) -> WorkspaceResult<Session> {
        let session = self.session_or_not_found(session_id, "delete-session")?;
        ensure!(
            !session.is_streaming(),
            AlreadyStreamingSnafu {
                stage: "delete-session",
                session_id,
            }
        );

        let removed = self
            .sessions
            .remove(&session_id)
            .context(NotFoundSnafu {
                stage: "delete-session",
                entity: "session",
                id: session_id.to_string(),
            })?;
        self.order.retain(|id| *id != session_id);
        if self.active == Some(session_id) {
            self.active = None;
        }

        tracing::debug!(session_id = %session_id, "deleted session");
        self.notify(StoreEvent::SessionDeleted { session_id });
        Ok(removed)
    }

    /// Sessions in creation order.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> + '_ {
        self.order.iter().filter_map(|id| self.sessions.get(id))
    }

    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn active_session_id(&self) -> Option<SessionId> {
        self.active
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active.and_then(|id| self.sessions.get(&id))
    }

    pub fn is_streaming(&self, session_id: SessionId) -> bool {
        self.sessions
            .get(&session_id)
            .is_some_and(Session::is_streaming)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn max_prompt_chars(&self) -> usize {
        self.max_prompt_chars
    }

    pub fn append_message(
        &mut self,
        session_id: SessionId,
        message: Message,
    ) -> WorkspaceResult<MessageId> {
        let session = self.session_mut_or_not_found(session_id, "append-message")?;
        let message_id = message.id;
        ensure!(
            session.message(message_id).is_none(),
            InvalidTransitionSnafu {
                stage: "append-message",
                details: format!("message '{message_id}' already exists in session '{session_id}'"),
            }
        );

        session.messages.push(message);
        self.notify(StoreEvent::MessageAppended {
            session_id,
            message_id,
        });
        Ok(message_id)
    }

    /// Appends a tool record to a message and returns its index.
    pub fn append_tool_invocation(
        &mut self,
        session_id: SessionId,
        message_id: MessageId,
        invocation: ToolInvocation,
    ) -> WorkspaceResult<usize> {
        let message =
            self.message_mut_or_not_found(session_id, message_id, "append-tool-invocation")?;
        message.tool_invocations.push(invocation);
        let tool_index = message.tool_invocations.len() - 1;

        self.notify(StoreEvent::ToolInvocationAppended {
            session_id,
            message_id,
            tool_index,
        });
        Ok(tool_index)
    }

    /// Settles a pending tool call. `result` is kept only for `Complete`.
    pub fn update_tool_status(
        &mut self,
        session_id: SessionId,
        message_id: MessageId,
        tool_index: usize,
        status: ToolStatus,
        result: Option<Value>,
    ) -> WorkspaceResult<()> {
        let message = self.message_mut_or_not_found(session_id, message_id, "update-tool-status")?;
        let invocation = message
            .tool_invocations
            .get_mut(tool_index)
            .context(NotFoundSnafu {
                stage: "update-tool-status",
                entity: "tool invocation",
                id: format!("{message_id}#{tool_index}"),
            })?;
        ensure!(
            invocation.status.allows(status),
            InvalidTransitionSnafu {
                stage: "update-tool-status",
                details: format!(
                    "tool '{}' cannot move from {:?} to {status:?}",
                    invocation.tool_name, invocation.status
                ),
            }
        );

        invocation.status = status;
        invocation.result = match status {
            ToolStatus::Complete => result,
            ToolStatus::Pending | ToolStatus::Failed => None,
        };

        self.notify(StoreEvent::ToolStatusChanged {
            session_id,
            message_id,
            tool_index,
            status,
        });
        Ok(())
    }

    /// Idempotent; publishes only on an actual change.
    pub(crate) fn set_streaming(
        &mut self,
        session_id: SessionId,
        streaming: bool,
    ) -> WorkspaceResult<()> {
        let session = self.session_mut_or_not_found(session_id, "set-streaming")?;
        if session.streaming == streaming {
            return Ok(());
        }
        session.streaming = streaming;

        tracing::debug!(session_id = %session_id, streaming, "streaming flag changed");
        self.notify(StoreEvent::StreamingChanged {
            session_id,
            streaming,
        });
        Ok(())
    }

    pub(crate) fn append_content(
        &mut self,
        session_id: SessionId,
        message_id: MessageId,
        text: &str,
    ) -> WorkspaceResult<()> {
        let message = self.message_mut_or_not_found(session_id, message_id, "append-content")?;
        ensure!(
            message.status.is_streaming(),
            InvalidTransitionSnafu {
                stage: "append-content",
                details: format!("message '{message_id}' is no longer streaming"),
            }
        );

        message.content.push_str(text);
        self.notify(StoreEvent::MessageContentExtended {
            session_id,
            message_id,
            appended: text.to_string(),
        });
        Ok(())
    }

    /// Moves a streaming message to its terminal status.
    pub(crate) fn finish_message(
        &mut self,
        session_id: SessionId,
        message_id: MessageId,
        status: MessageStatus,
    ) -> WorkspaceResult<()> {
        ensure!(
            !status.is_streaming(),
            InvalidTransitionSnafu {
                stage: "finish-message",
                details: "a finished message needs a terminal status",
            }
        );
        let message = self.message_mut_or_not_found(session_id, message_id, "finish-message")?;
        ensure!(
            message.status.is_streaming(),
            InvalidTransitionSnafu {
                stage: "finish-message",
                details: format!("message '{message_id}' already finished as {:?}", message.status),
            }
        );

        message.status = status.clone();
        self.notify(StoreEvent::MessageFinished {
            session_id,
            message_id,
            status,
        });
        Ok(())
    }

    pub fn creative(&self, session_id: SessionId) -> Option<&CreativeSession> {
        self.sessions
            .get(&session_id)
            .and_then(|session| session.creative.as_ref())
    }

    pub fn set_creative_prompt(
        &mut self,
        session_id: SessionId,
        prompt: impl Into<String>,
    ) -> WorkspaceResult<()> {
        let max_chars = self.max_prompt_chars;
        let creative = self.creative_mut(session_id, "set-creative-prompt")?;
        creative.set_prompt(prompt, max_chars)?;
        self.notify(StoreEvent::CreativeUpdated { session_id });
        Ok(())
    }

    /// User-driven stage change; refused while the session streams.
    pub fn advance_stage(
        &mut self,
        session_id: SessionId,
        target: Stage,
    ) -> WorkspaceResult<Stage> {
        let session = self.session_or_not_found(session_id, "advance-stage")?;
        ensure!(
            !session.is_streaming(),
            AlreadyStreamingSnafu {
                stage: "advance-stage",
                session_id,
            }
        );

        let creative = self.creative_mut(session_id, "advance-stage")?;
        let before = creative.stage();
        let stage = creative.advance_to(target)?;
        if stage != before {
            tracing::info!(session_id = %session_id, from = %before, to = %stage, "stage advanced");
            self.notify(StoreEvent::StageChanged { session_id, stage });
        }
        Ok(stage)
    }

    /// Moves to the stage after the current one.
    pub fn advance_stage_next(&mut self, session_id: SessionId) -> WorkspaceResult<Stage> {
        let current = self
            .creative(session_id)
            .map(CreativeSession::stage)
            .unwrap_or_default();
        let target = current.next().context(InvalidTransitionSnafu {
            stage: "advance-stage",
            details: format!("{current} is the final stage"),
        })?;
        self.advance_stage(session_id, target)
    }

    /// Decodes and applies a backend stage payload.
    pub fn apply_stage_payload(
        &mut self,
        session_id: SessionId,
        stage: Stage,
        payload: Value,
    ) -> WorkspaceResult<()> {
        let creative = self.creative_mut(session_id, "apply-stage-payload")?;
        let payload = CreativePayload::decode(stage, payload)?;
        creative.apply_payload(payload)?;
        self.notify(StoreEvent::CreativeUpdated { session_id });
        Ok(())
    }

    /// Replaces every session at once, keeping `sessions` order.
    pub(crate) fn replace_all(&mut self, sessions: Vec<Session>, active: Option<SessionId>) {
        self.order = sessions.iter().map(|session| session.id).collect();
        self.sessions = sessions
            .into_iter()
            .map(|session| (session.id, session))
            .collect();
        self.active = active.filter(|id| self.sessions.contains_key(id));
        self.notify(StoreEvent::Restored);
    }

    fn session_or_not_found(
        &self,
        session_id: SessionId,
        stage: &'static str,
    ) -> WorkspaceResult<&Session> {
        self.sessions.get(&session_id).context(NotFoundSnafu {
            stage,
            entity: "session",
            id: session_id.to_string(),
        })
    }

    fn session_mut_or_not_found(
        &mut self,
        session_id: SessionId,
        stage: &'static str,
    ) -> WorkspaceResult<&mut Session> {
        self.sessions.get_mut(&session_id).context(NotFoundSnafu {
            stage,
            entity: "session",
            id: session_id.to_string(),
        })
    }

    fn message_mut_or_not_found(
        &mut self,
        session_id: SessionId,
        message_id: MessageId,
        stage: &'static str,
    ) -> WorkspaceResult<&mut Message> {
        self.session_mut_or_not_found(session_id, stage)?
            .message_mut(message_id)
            .context(NotFoundSnafu {
                stage,
                entity: "message",
                id: message_id.to_string(),
            })
    }

    fn creative_mut(
        &mut self,
        session_id: SessionId,
        stage: &'static str,
    ) -> WorkspaceResult<&mut CreativeSession> {
        self.session_mut_or_not_found(session_id, stage)?
            .creative
            .as_mut()
            .context(InvalidTransitionSnafu {
                stage,
                details: format!("session '{session_id}' is not a creative session"),
            })
    }
}
