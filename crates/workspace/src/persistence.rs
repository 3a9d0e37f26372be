use std::collections::BTreeMap;

use lewis_storage::SnapshotStore;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::chat::{MessageStatus, Session, SessionId};
use crate::error::{SnapshotSnafu, WorkspaceResult};
use crate::store::SessionStore;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Persisted form of the whole store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub version: u32,
    #[serde(default)]
    pub active_session_id: Option<SessionId>,
    #[serde(default)]
    pub sessions: BTreeMap<SessionId, Session>,
}

impl SessionStore {
    pub fn snapshot(&self) -> WorkspaceSnapshot {
        WorkspaceSnapshot {
            version: SNAPSHOT_VERSION,
            active_session_id: self.active_session_id(),
            sessions: self
                .sessions()
                .map(|session| (session.id, session.clone()))
                .collect(),
        }
    }

    /// Replaces all state with `snapshot`.
    ///
    /// Nothing resumes streaming after a restore: every flag is cleared and assistant
    /// messages that were still streaming are marked cancelled.
    pub fn restore(&mut self, snapshot: WorkspaceSnapshot) {
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                version = snapshot.version,
                expected = SNAPSHOT_VERSION,
                "restoring snapshot written by another version"
            );
        }

        let mut sessions: Vec<Session> = snapshot.sessions.into_values().collect();
        sessions.sort_by_key(|session| (session.created_at_unix_ms, session.id));

        let mut interrupted = 0usize;
        for session in &mut sessions {
            session.streaming = false;
            for message in &mut session.messages {
                if message.status.is_streaming() {
                    message.status = MessageStatus::Cancelled;
                    interrupted += 1;
                }
            }
        }

        tracing::info!(
            sessions = sessions.len(),
            interrupted_messages = interrupted,
            "restored workspace snapshot"
        );
        self.replace_all(sessions, snapshot.active_session_id);
    }

    pub fn save_to<S>(&self, snapshots: &S) -> WorkspaceResult<()>
    where
        S: SnapshotStore<WorkspaceSnapshot> + ?Sized,
    {
        snapshots.save(&self.snapshot()).context(SnapshotSnafu {
            stage: "save-workspace-snapshot",
        })
    }

    /// Restores from `snapshots`; returns false and keeps the current state when nothing
    /// was saved yet.
    pub fn load_from<S>(&mut self, snapshots: &S) -> WorkspaceResult<bool>
    where
        S: SnapshotStore<WorkspaceSnapshot> + ?Sized,
    {
        let snapshot = snapshots.load().context(SnapshotSnafu {
            stage: "load-workspace-snapshot",
        })?;
        match snapshot {
            Some(snapshot) => {
                self.restore(snapshot);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
