use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use snafu::ensure;
use tokio::sync::{mpsc, oneshot};

use super::event::{BackendEvent, StreamEvent, TurnRequest, TurnTarget};
use super::stream::{
    Backend, BackendResult, BackendStreamHandle, BackendWorker, EmptyContentSnafu,
    NoScriptQueuedSnafu, make_event_stream,
};

pub const SCRIPTED_BACKEND_ID: &str = "scripted";

/// Pause between scripted events when a step does not set its own delay.
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptStep {
    Emit {
        delay: Option<Duration>,
        event: BackendEvent,
    },
    /// Stops producing events without closing the stream.
    Stall,
}

/// Ordered events one turn will replay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Script {
    steps: Vec<ScriptStep>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams `text` word by word and finishes with `done`.
    pub fn reply(text: &str) -> Self {
        let mut script = Self::new();
        let mut chunk_start = 0;
        for (index, _) in text.match_indices(' ') {
            if index > chunk_start {
                script = script.emit(BackendEvent::content_delta(&text[chunk_start..index]));
                chunk_start = index;
            }
        }
        if chunk_start < text.len() {
            script = script.emit(BackendEvent::content_delta(&text[chunk_start..]));
        }
        script.emit(BackendEvent::Done)
    }

    pub fn emit(mut self, event: BackendEvent) -> Self {
        self.steps.push(ScriptStep::Emit { delay: None, event });
        self
    }

    pub fn emit_after(mut self, delay: Duration, event: BackendEvent) -> Self {
        self.steps.push(ScriptStep::Emit {
            delay: Some(delay),
            event,
        });
        self
    }

    pub fn stall(mut self) -> Self {
        self.steps.push(ScriptStep::Stall);
        self
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }
}

/// Backend that replays queued scripts on fixed timers.
///
/// Each `open_turn` consumes the oldest queued script.
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<TurnRequest>>,
    step_delay: Duration,
    stall_timeout: Option<Duration>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            step_delay: DEFAULT_STEP_DELAY,
            stall_timeout: None,
        }
    }

    pub fn with_step_delay(mut self, step_delay: Duration) -> Self {
        self.step_delay = step_delay;
        self
    }

    /// Emits a terminal `error` event when the stream would stay silent longer than `timeout`.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = Some(timeout);
        self
    }

    pub fn push_script(&self, script: Script) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(script);
    }

    pub fn queued(&self) -> usize {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn emit_timeout_event(
        event_tx: &mpsc::UnboundedSender<StreamEvent>,
        target: TurnTarget,
        timeout: Duration,
    ) {
        tracing::warn!(
            target = ?target,
            timeout_ms = timeout.as_millis() as u64,
            "scripted stream stalled"
        );
        let _ = event_tx.send(StreamEvent {
            target,
            event: BackendEvent::error(format!(
                "backend stream timed out after {}ms",
                timeout.as_millis()
            )),
        });
    }

    async fn run_script_worker(
        script: Script,
        target: TurnTarget,
        step_delay: Duration,
        stall_timeout: Option<Duration>,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        for step in script.steps {
            match step {
                ScriptStep::Emit { delay, event } => {
                    let delay = delay.unwrap_or(step_delay);
                    if let Some(timeout) = stall_timeout
                        && delay > timeout
                    {
                        tokio::select! {
                            biased;
                            _ = &mut cancel_rx => return,
                            _ = tokio::time::sleep(timeout) => {
                                Self::emit_timeout_event(&event_tx, target, timeout);
                                return;
                            }
                        }
                    }

                    tokio::select! {
                        biased;
                        _ = &mut cancel_rx => {
                            tracing::debug!(target = ?target, "scripted stream cancelled");
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    let terminal = event.is_terminal();
                    if event_tx.send(StreamEvent { target, event }).is_err() || terminal {
                        return;
                    }
                }
                ScriptStep::Stall => {
                    match stall_timeout {
                        Some(timeout) => {
                            tokio::select! {
                                biased;
                                _ = &mut cancel_rx => {}
                                _ = tokio::time::sleep(timeout) => {
                                    Self::emit_timeout_event(&event_tx, target, timeout);
                                }
                            }
                        }
                        None => {
                            let _ = cancel_rx.await;
                        }
                    }
                    return;
                }
            }
        }

        // A script without a terminal event just closes the channel.
        tracing::debug!(target = ?target, "scripted stream exhausted");
    }
}

impl Backend for ScriptedBackend {
    fn id(&self) -> &str {
        SCRIPTED_BACKEND_ID
    }

    fn open_turn(&self, request: TurnRequest) -> BackendResult<BackendStreamHandle> {
        let target = request.target;
        ensure!(
            !request.content.trim().is_empty(),
            EmptyContentSnafu {
                stage: "scripted-open-turn",
                target,
            }
        );

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(script) = script else {
            return NoScriptQueuedSnafu {
                stage: "scripted-pop-script",
                backend_id: SCRIPTED_BACKEND_ID,
                target,
            }
            .fail();
        };

        tracing::debug!(
            target = ?target,
            step_count = script.steps().len(),
            "opening scripted stream"
        );
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        let (event_tx, stream, cancel_rx) = make_event_stream(target);
        let worker: BackendWorker = Box::pin(Self::run_script_worker(
            script,
            target,
            self.step_delay,
            self.stall_timeout,
            event_tx,
            cancel_rx,
        ));

        Ok(BackendStreamHandle { stream, worker })
    }
}
