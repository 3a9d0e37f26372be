pub mod state;

pub use state::{
    SETTINGS_DIRECTORY_NAME, SETTINGS_ENV_PREFIX, SETTINGS_FILE_NAME, SettingsError, SettingsStore,
    WorkspaceSettings,
};
