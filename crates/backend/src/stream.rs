use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use snafu::Snafu;
use tokio::sync::{mpsc, oneshot};

use super::event::{StreamEvent, TurnRequest, TurnTarget};

pub type BackendWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("turn request for {target:?} has empty content"))]
    EmptyContent {
        stage: &'static str,
        target: TurnTarget,
    },
    #[snafu(display("backend '{backend_id}' has no scripted response for {target:?}"))]
    NoScriptQueued {
        stage: &'static str,
        backend_id: String,
        target: TurnTarget,
    },
}

/// Receiving half of one turn's event channel.
///
/// Dropping the stream signals cancellation to the worker producing it.
pub struct BackendEventStream {
    target: TurnTarget,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct BackendStreamHandle {
    pub stream: BackendEventStream,
    pub worker: BackendWorker,
}

impl BackendEventStream {
    pub(crate) fn new(
        target: TurnTarget,
        events: mpsc::UnboundedReceiver<StreamEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            target,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn target(&self) -> TurnTarget {
        self.target
    }

    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        self.events.poll_recv(cx)
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Stream for BackendEventStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_recv(cx)
    }
}

impl Drop for BackendEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// The AI backend as seen by the workspace: one request opens one ordered event stream.
pub trait Backend: Send + Sync {
    fn id(&self) -> &str;
    fn open_turn(&self, request: TurnRequest) -> BackendResult<BackendStreamHandle>;
}

/// Builds the channel pair shared by every backend implementation.
pub fn make_event_stream(
    target: TurnTarget,
) -> (
    mpsc::UnboundedSender<StreamEvent>,
    BackendEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        BackendEventStream::new(target, event_rx, cancel_tx),
        cancel_rx,
    )
}
