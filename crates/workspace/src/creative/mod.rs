//! Creative video workflow: a forward-only stage machine fed by backend payloads.

mod payload;
mod session;
mod stage;

pub use payload::{AssetStatus, CreativePayload, ScriptDraft, ScriptScene, StoryboardAsset};
pub use session::{CreativeSession, DEFAULT_MAX_PROMPT_CHARS};
pub use stage::{STAGE_ORDER, Stage};
