//! Client-side state core of the AI workspace.
//!
//! The [`SessionStore`] owns every session and message; the [`StreamingController`] is the
//! only component that streams backend output into it, and creative sessions carry a
//! forward-only stage machine.
#![deny(unsafe_code)]

/// Sessions, messages and tool invocation records.
pub mod chat;
pub mod creative;
pub mod error;
pub mod persistence;
/// Settings persistence.
pub mod settings;
pub mod store;
pub mod streaming;

pub use chat::{
    Message, MessageId, MessageStatus, Role, Session, SessionId, SessionMode, StoreEvent,
    ToolInvocation, ToolStatus,
};
pub use creative::{CreativeSession, Stage};
pub use error::{WorkspaceError, WorkspaceResult};
pub use persistence::{SNAPSHOT_VERSION, WorkspaceSnapshot};
pub use settings::{SettingsStore, WorkspaceSettings};
pub use store::SessionStore;
pub use streaming::{StreamingController, TurnCanceller, TurnEvent, TurnOutcome, TurnStatus};
