pub mod error;
pub mod ids;
pub mod snapshot;

pub use error::{StorageError, StorageResult};
pub use ids::{MessageId, SessionId};
pub use snapshot::{
    JsonFileSnapshotStore, MemorySnapshotStore, SNAPSHOT_FILE_NAME, SnapshotStore,
    write_json_atomically,
};
