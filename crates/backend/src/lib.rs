//! Boundary between the workspace core and the AI backend.
//!
//! A backend turns one [`TurnRequest`] into an ordered stream of [`BackendEvent`]s. The
//! stream half is consumed by the workspace; the worker half is spawned on the runtime and
//! stops as soon as the stream is cancelled or dropped.
mod creative;
mod event;
mod scripted;
mod stream;

pub use creative::{AssetState, RenderProgress, StoryboardUpdate};
pub use event::{
    BackendEvent, Role, StageName, StreamEvent, ToolOutcome, TurnId, TurnRequest, TurnTarget,
};
pub use scripted::{DEFAULT_STEP_DELAY, SCRIPTED_BACKEND_ID, Script, ScriptStep, ScriptedBackend};
pub use stream::{
    Backend, BackendError, BackendEventStream, BackendResult, BackendStreamHandle, BackendWorker,
    make_event_stream,
};
