use lewis_storage::{SessionId, StorageError};
use snafu::Snafu;

/// Failures of workspace operations.
///
/// Every variant except `Snapshot` is recoverable at the session level: the rejected call
/// leaves all state exactly as it was.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WorkspaceError {
    #[snafu(display("{entity} '{id}' was not found"))]
    NotFound {
        stage: &'static str,
        entity: &'static str,
        id: String,
    },
    #[snafu(display("session '{session_id}' already has a turn in flight"))]
    AlreadyStreaming {
        stage: &'static str,
        session_id: SessionId,
    },
    #[snafu(display("invalid transition: {details}"))]
    InvalidTransition {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("cannot {transition}: {details}"))]
    PreconditionNotMet {
        stage: &'static str,
        transition: String,
        details: String,
    },
    #[snafu(display("backend channel failed for session '{session_id}': {message}"))]
    ChannelFailure {
        stage: &'static str,
        session_id: SessionId,
        message: String,
    },
    #[snafu(display("snapshot persistence failed on `{stage}`: {source}"))]
    Snapshot {
        stage: &'static str,
        source: StorageError,
    },
}

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

impl WorkspaceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_streaming(&self) -> bool {
        matches!(self, Self::AlreadyStreaming { .. })
    }

    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    pub fn is_precondition_not_met(&self) -> bool {
        matches!(self, Self::PreconditionNotMet { .. })
    }

    pub fn is_channel_failure(&self) -> bool {
        matches!(self, Self::ChannelFailure { .. })
    }
}
