use std::collections::BTreeMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::poll_fn;
use lewis_backend::{
    Backend, BackendEvent, BackendEventStream, StreamEvent, ToolOutcome, TurnId, TurnRequest,
    TurnTarget,
};
use snafu::{OptionExt, ensure};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::chat::{Message, MessageId, MessageStatus, SessionId, ToolInvocation, ToolStatus};
use crate::error::{
    AlreadyStreamingSnafu, ChannelFailureSnafu, NotFoundSnafu, WorkspaceError, WorkspaceResult,
};
use crate::settings::WorkspaceSettings;
use crate::store::SessionStore;

/// Silence allowed on a turn before it is failed.
pub const DEFAULT_TURN_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

struct ActiveTurn {
    target: TurnTarget,
    assistant_message_id: MessageId,
    stream: BackendEventStream,
    worker: JoinHandle<()>,
    deadline: Instant,
}

/// Something the pump observed; feed it back through [`StreamingController::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Backend(StreamEvent),
    /// The stream ended without `done` or `error`.
    Closed(TurnTarget),
    TimedOut(TurnTarget),
    CancelRequested(SessionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    Completed,
    /// The backend reported an error event, including its own stream timeouts.
    Failed(String),
    /// The channel closed early or went silent.
    ChannelFailed(String),
    Cancelled,
}

/// How one accepted turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub target: TurnTarget,
    pub assistant_message_id: MessageId,
    pub status: TurnStatus,
}

impl TurnOutcome {
    pub fn session_id(&self) -> SessionId {
        self.target.session_id
    }

    /// The channel failure behind this outcome, if any.
    ///
    /// Backend error events count as channel failures just like an early close or an
    /// idle timeout.
    pub fn channel_failure(&self) -> Option<WorkspaceError> {
        match &self.status {
            TurnStatus::Failed(message) | TurnStatus::ChannelFailed(message) => Some(
                ChannelFailureSnafu {
                    stage: "turn-outcome",
                    session_id: self.target.session_id,
                    message: message.clone(),
                }
                .build(),
            ),
            _ => None,
        }
    }
}

/// Cloneable handle that asks the pump to cancel a session's turn.
#[derive(Debug, Clone)]
pub struct TurnCanceller {
    requests: mpsc::UnboundedSender<SessionId>,
}

impl TurnCanceller {
    /// Returns false once the controller is gone.
    pub fn cancel(&self, session_id: SessionId) -> bool {
        self.requests.send(session_id).is_ok()
    }
}

/// Bridges backend event streams into the session store.
///
/// The controller is the only writer of the streaming flag. Every accepted turn is
/// finalized exactly once, through `done`, `error`, channel failure or cancellation,
/// and finalizing is what clears the flag.
pub struct StreamingController {
    backend: Arc<dyn Backend>,
    turns: BTreeMap<SessionId, ActiveTurn>,
    next_turn_id: u64,
    idle_timeout: Duration,
    cancel_tx: mpsc::UnboundedSender<SessionId>,
    cancel_rx: mpsc::UnboundedReceiver<SessionId>,
}

impl StreamingController {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            turns: BTreeMap::new(),
            next_turn_id: 1,
            idle_timeout: DEFAULT_TURN_IDLE_TIMEOUT,
            cancel_tx,
            cancel_rx,
        }
    }

    pub fn with_settings(backend: Arc<dyn Backend>, settings: &WorkspaceSettings) -> Self {
        Self::new(backend).with_idle_timeout(settings.turn_idle_timeout())
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn canceller(&self) -> TurnCanceller {
        TurnCanceller {
            requests: self.cancel_tx.clone(),
        }
    }

    pub fn active_turn(&self, session_id: SessionId) -> Option<TurnTarget> {
        self.turns.get(&session_id).map(|turn| turn.target)
    }

    pub fn is_idle(&self) -> bool {
        self.turns.is_empty()
    }

    /// Starts a turn: records the user message, raises the flag, adds the assistant
    /// placeholder and opens the backend stream.
    pub fn begin_turn(
        &mut self,
        store: &mut SessionStore,
        session_id: SessionId,
        user_input: impl Into<String>,
    ) -> WorkspaceResult<TurnTarget> {
        let session = store.session(session_id).context(NotFoundSnafu {
            stage: "begin-turn",
            entity: "session",
            id: session_id.to_string(),
        })?;
        ensure!(
            !session.is_streaming() && !self.turns.contains_key(&session_id),
            AlreadyStreamingSnafu {
                stage: "begin-turn",
                session_id,
            }
        );

        self.discard_stale_cancel_requests();

        let content = user_input.into();
        store.append_message(session_id, Message::user(content.clone()))?;
        store.set_streaming(session_id, true)?;
        let assistant_message_id =
            store.append_message(session_id, Message::assistant_streaming())?;

        let target = TurnTarget::new(session_id, self.mint_turn_id());
        match self.backend.open_turn(TurnRequest::user(target, content)) {
            Ok(handle) => {
                let worker = tokio::spawn(handle.worker);
                self.turns.insert(
                    session_id,
                    ActiveTurn {
                        target,
                        assistant_message_id,
                        stream: handle.stream,
                        worker,
                        deadline: Instant::now() + self.idle_timeout,
                    },
                );
                tracing::info!(
                    session_id = %session_id,
                    turn_id = target.turn_id.0,
                    backend = self.backend.id(),
                    "turn started"
                );
                Ok(target)
            }
            Err(error) => {
                let message = error.to_string();
                tracing::warn!(session_id = %session_id, error = %message, "backend refused turn");
                log_rejected(
                    store.finish_message(
                        session_id,
                        assistant_message_id,
                        MessageStatus::Error(message.clone()),
                    ),
                    target,
                    "finish-message",
                );
                log_rejected(
                    store.set_streaming(session_id, false),
                    target,
                    "set-streaming",
                );
                ChannelFailureSnafu {
                    stage: "begin-turn",
                    session_id,
                    message,
                }
                .fail()
            }
        }
    }

    /// Drops queued cancel requests for sessions without a running turn, so an old
    /// request cannot cancel the turn about to start. Requests for running turns are
    /// queued again in their original order.
    fn discard_stale_cancel_requests(&mut self) {
        let mut pending = Vec::new();
        while let Ok(session_id) = self.cancel_rx.try_recv() {
            if self.turns.contains_key(&session_id) {
                pending.push(session_id);
            } else {
                tracing::debug!(session_id = %session_id, "dropped stale cancel request");
            }
        }
        for session_id in pending {
            let _ = self.cancel_tx.send(session_id);
        }
    }

    fn mint_turn_id(&mut self) -> TurnId {
        let turn_id = TurnId::new(self.next_turn_id);
        self.next_turn_id = self.next_turn_id.saturating_add(1);
        turn_id
    }

    /// Waits for the next event from any active turn.
    ///
    /// Returns `None` when no turn is active. Pending cancel requests win over backend
    /// events; each stream's events come out in the order they were sent.
    pub async fn next_event(&mut self) -> Option<TurnEvent> {
        if self.turns.is_empty() {
            while self.cancel_rx.try_recv().is_ok() {}
            return None;
        }

        let deadline = self.turns.values().map(|turn| turn.deadline).min()?;
        let idle_timeout = self.idle_timeout;
        let woke = tokio::select! {
            biased;
            event = poll_fn(|cx| self.poll_turns(cx, idle_timeout)) => Some(event),
            _ = time::sleep_until(deadline) => None,
        };
        if woke.is_some() {
            return woke;
        }

        self.turns
            .values()
            .min_by_key(|turn| turn.deadline)
            .map(|turn| TurnEvent::TimedOut(turn.target))
    }

    fn poll_turns(&mut self, cx: &mut Context<'_>, idle_timeout: Duration) -> Poll<TurnEvent> {
        if let Poll::Ready(Some(session_id)) = self.cancel_rx.poll_recv(cx) {
            return Poll::Ready(TurnEvent::CancelRequested(session_id));
        }

        for turn in self.turns.values_mut() {
            match turn.stream.poll_recv(cx) {
                Poll::Ready(Some(event)) => {
                    turn.deadline = Instant::now() + idle_timeout;
                    return Poll::Ready(TurnEvent::Backend(event));
                }
                Poll::Ready(None) => return Poll::Ready(TurnEvent::Closed(turn.target)),
                Poll::Pending => {}
            }
        }
        Poll::Pending
    }

    /// Applies one pump event to the store.
    ///
    /// Returns the outcome when the event ended a turn. Events for turns that are no
    /// longer active are ignored, and a store rejection of a single event is logged
    /// without ending the turn.
    pub fn apply(&mut self, store: &mut SessionStore, event: TurnEvent) -> Option<TurnOutcome> {
        match event {
            TurnEvent::CancelRequested(session_id) => self.cancel(store, session_id),
            TurnEvent::Closed(target) => {
                self.is_current(target).then(|| {
                    self.finalize(
                        store,
                        target,
                        TurnStatus::ChannelFailed(
                            "backend stream ended before a terminal event".to_string(),
                        ),
                    )
                })
            }
            TurnEvent::TimedOut(target) => {
                let message = format!(
                    "backend stream was silent for {}ms",
                    self.idle_timeout.as_millis()
                );
                self.is_current(target)
                    .then(|| self.finalize(store, target, TurnStatus::ChannelFailed(message)))
            }
            TurnEvent::Backend(StreamEvent { target, event }) => {
                let Some(turn) = self.turns.get(&target.session_id) else {
                    tracing::debug!(target = ?target, "dropping event for inactive session");
                    return None;
                };
                if turn.target != target {
                    tracing::debug!(target = ?target, "dropping stale turn event");
                    return None;
                }

                let session_id = target.session_id;
                let message_id = turn.assistant_message_id;
                match event {
                    BackendEvent::ContentDelta { text } => {
                        log_rejected(
                            store.append_content(session_id, message_id, &text),
                            target,
                            "content_delta",
                        );
                        None
                    }
                    BackendEvent::ToolCall { tool_name, args } => {
                        log_rejected(
                            store.append_tool_invocation(
                                session_id,
                                message_id,
                                ToolInvocation::pending(tool_name, args),
                            ),
                            target,
                            "tool_call",
                        );
                        None
                    }
                    BackendEvent::ToolResult {
                        index,
                        status,
                        result,
                    } => {
                        let status = match status {
                            ToolOutcome::Complete => ToolStatus::Complete,
                            ToolOutcome::Failed => ToolStatus::Failed,
                        };
                        log_rejected(
                            store.update_tool_status(session_id, message_id, index, status, result),
                            target,
                            "tool_result",
                        );
                        None
                    }
                    BackendEvent::StagePayload { stage, payload } => {
                        log_rejected(
                            store.apply_stage_payload(session_id, stage.into(), payload),
                            target,
                            "stage_payload",
                        );
                        None
                    }
                    BackendEvent::Error { message } => {
                        Some(self.finalize(store, target, TurnStatus::Failed(message)))
                    }
                    BackendEvent::Done => Some(self.finalize(store, target, TurnStatus::Completed)),
                }
            }
        }
    }

    /// Pumps events until no turn is active and returns the outcomes in finish order.
    pub async fn run_until_idle(&mut self, store: &mut SessionStore) -> Vec<TurnOutcome> {
        let mut outcomes = Vec::new();
        while let Some(event) = self.next_event().await {
            if let Some(outcome) = self.apply(store, event) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Stops the session's turn, keeping partial content and pending tool calls.
    ///
    /// Returns `None` when the session has no turn in flight.
    pub fn cancel(
        &mut self,
        store: &mut SessionStore,
        session_id: SessionId,
    ) -> Option<TurnOutcome> {
        let target = self.turns.get(&session_id)?.target;
        Some(self.finalize(store, target, TurnStatus::Cancelled))
    }

    fn is_current(&self, target: TurnTarget) -> bool {
        self.turns
            .get(&target.session_id)
            .is_some_and(|turn| turn.target == target)
    }

    fn finalize(
        &mut self,
        store: &mut SessionStore,
        target: TurnTarget,
        status: TurnStatus,
    ) -> TurnOutcome {
        let session_id = target.session_id;
        let assistant_message_id = match self.turns.remove(&session_id) {
            Some(turn) => {
                // Dropping the stream signals the worker; abort covers workers that ignore it.
                let ActiveTurn {
                    assistant_message_id,
                    stream,
                    worker,
                    ..
                } = turn;
                drop(stream);
                worker.abort();
                assistant_message_id
            }
            None => {
                tracing::warn!(target = ?target, "finalizing a turn that is not active");
                MessageId::new_v7()
            }
        };

        let message_status = match &status {
            TurnStatus::Completed => MessageStatus::Done,
            TurnStatus::Failed(message) | TurnStatus::ChannelFailed(message) => {
                MessageStatus::Error(message.clone())
            }
            TurnStatus::Cancelled => MessageStatus::Cancelled,
        };
        log_rejected(
            store.finish_message(session_id, assistant_message_id, message_status),
            target,
            "finish-message",
        );
        log_rejected(store.set_streaming(session_id, false), target, "set-streaming");

        match &status {
            TurnStatus::Completed => {
                tracing::info!(
                    session_id = %session_id,
                    turn_id = target.turn_id.0,
                    "turn completed"
                );
            }
            TurnStatus::Cancelled => {
                tracing::info!(
                    session_id = %session_id,
                    turn_id = target.turn_id.0,
                    "turn cancelled"
                );
            }
            TurnStatus::Failed(message) | TurnStatus::ChannelFailed(message) => {
                tracing::warn!(
                    session_id = %session_id,
                    turn_id = target.turn_id.0,
                    error = %message,
                    "turn failed"
                );
            }
        }

        TurnOutcome {
            target,
            assistant_message_id,
            status,
        }
    }
}

fn log_rejected<T>(result: WorkspaceResult<T>, target: TurnTarget, event: &'static str) {
    if let Err(error) = result {
        tracing::warn!(target = ?target, event, error = %error, "store rejected stream event");
    }
}
