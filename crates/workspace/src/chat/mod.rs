/// Store change notifications.
pub mod events;
/// Messages, roles and tool invocation records.
pub mod message;
pub mod session;

pub use events::StoreEvent;
pub use message::{Message, MessageId, MessageStatus, Role, ToolInvocation, ToolStatus};
pub use session::{DEFAULT_SESSION_TITLE, Session, SessionId, SessionMode};
