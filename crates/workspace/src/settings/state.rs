use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use lewis_storage::{SNAPSHOT_FILE_NAME, StorageError, write_json_atomically};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::DEFAULT_SESSION_TITLE;
use crate::creative::DEFAULT_MAX_PROMPT_CHARS;
use crate::store::DEFAULT_EVENT_BUFFER;
use crate::streaming::DEFAULT_TURN_IDLE_TIMEOUT;

pub const SETTINGS_DIRECTORY_NAME: &str = "lewis";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
/// Environment variables with this prefix override file values, e.g. `LEWIS_EVENT_BUFFER`.
pub const SETTINGS_ENV_PREFIX: &str = "LEWIS_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
    #[serde(default = "default_session_title")]
    pub default_session_title: String,
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    #[serde(default = "default_turn_idle_timeout_ms")]
    pub turn_idle_timeout_ms: u64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            snapshot_path: default_snapshot_path(),
            default_session_title: default_session_title(),
            max_prompt_chars: default_max_prompt_chars(),
            turn_idle_timeout_ms: default_turn_idle_timeout_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl WorkspaceSettings {
    pub fn turn_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.turn_idle_timeout_ms)
    }

    /// Replaces blank or zero values with their defaults.
    pub fn normalized(mut self) -> Self {
        self.default_session_title = self.default_session_title.trim().to_string();
        if self.default_session_title.is_empty() {
            self.default_session_title = default_session_title();
        }
        if self.snapshot_path.as_os_str().is_empty() {
            self.snapshot_path = default_snapshot_path();
        }
        if self.max_prompt_chars == 0 {
            self.max_prompt_chars = default_max_prompt_chars();
        }
        if self.turn_idle_timeout_ms == 0 {
            self.turn_idle_timeout_ms = default_turn_idle_timeout_ms();
        }
        if self.event_buffer == 0 {
            self.event_buffer = default_event_buffer();
        }
        self
    }
}

/// Current settings behind an atomically swappable pointer, backed by a JSON file.
pub struct SettingsStore {
    settings: Arc<ArcSwap<WorkspaceSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".lewis"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from(&config_path, Some(SETTINGS_ENV_PREFIX));
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<WorkspaceSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: WorkspaceSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from(path: &Path, env_prefix: Option<&str>) -> WorkspaceSettings {
        let mut figment = Figment::from(Serialized::defaults(WorkspaceSettings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        } else {
            tracing::info!(path = ?path, "settings file not found, using defaults");
        }
        if let Some(prefix) = env_prefix {
            figment = figment.merge(Env::prefixed(prefix));
        }

        match figment.extract::<WorkspaceSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    path = ?path,
                    error = %error,
                    "failed to parse settings, using defaults"
                );
                WorkspaceSettings::default()
            }
        }
    }

    fn persist(&self, settings: &WorkspaceSettings) -> Result<(), SettingsError> {
        write_json_atomically(&self.config_path, settings).context(PersistSnafu {
            stage: "persist-settings",
            path: self.config_path.clone(),
        })?;
        tracing::info!(path = ?self.config_path, "saved settings");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to save settings to {path:?} on `{stage}`: {source}"))]
    Persist {
        stage: &'static str,
        path: PathBuf,
        source: StorageError,
    },
}

fn default_snapshot_path() -> PathBuf {
    dirs::data_dir()
        .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
        .unwrap_or_else(|| PathBuf::from(".lewis"))
        .join(SNAPSHOT_FILE_NAME)
}

fn default_session_title() -> String {
    DEFAULT_SESSION_TITLE.to_string()
}

fn default_max_prompt_chars() -> usize {
    DEFAULT_MAX_PROMPT_CHARS
}

fn default_turn_idle_timeout_ms() -> u64 {
    DEFAULT_TURN_IDLE_TIMEOUT.as_millis() as u64
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let settings = SettingsStore::load_from(&directory.path().join("absent.json"), None);
        assert_eq!(settings, WorkspaceSettings::default());
        assert_eq!(settings.turn_idle_timeout(), DEFAULT_TURN_IDLE_TIMEOUT);
    }

    #[test]
    fn file_values_merge_over_defaults_and_normalize() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join(SETTINGS_FILE_NAME);
        std::fs::write(
            &path,
            r#"{"default_session_title": "  ", "max_prompt_chars": 500, "event_buffer": 0}"#,
        )
        .unwrap();

        let settings = SettingsStore::load_from(&path, None);
        assert_eq!(settings.max_prompt_chars, 500);
        assert_eq!(settings.default_session_title, DEFAULT_SESSION_TITLE);
        assert_eq!(settings.event_buffer, DEFAULT_EVENT_BUFFER);
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join(SETTINGS_FILE_NAME);
        std::fs::write(&path, r#"{"max_prompt_chars": "many"}"#).unwrap();

        assert_eq!(SettingsStore::load_from(&path, None), WorkspaceSettings::default());
    }

    #[test]
    fn update_persists_and_swaps() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("nested").join(SETTINGS_FILE_NAME);
        let store = SettingsStore::new(path.clone());

        let mut changed = (*store.settings()).clone();
        changed.turn_idle_timeout_ms = 1_500;
        changed.default_session_title = " Storyboard ".into();
        store.update(changed).unwrap();

        assert_eq!(store.settings().default_session_title, "Storyboard");
        assert!(!path.with_extension("json.tmp").exists());
        let reloaded = SettingsStore::load_from(&path, None);
        assert_eq!(reloaded.turn_idle_timeout(), Duration::from_millis(1_500));
        assert_eq!(reloaded.default_session_title, "Storyboard");
    }

    #[test]
    fn failed_update_keeps_current_settings() {
        let directory = tempfile::tempdir().unwrap();
        let blocker = directory.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let store = SettingsStore::new(blocker.join(SETTINGS_FILE_NAME));

        let mut changed = (*store.settings()).clone();
        changed.max_prompt_chars = 42;
        let error = store.update(changed).unwrap_err();

        assert!(matches!(
            error,
            SettingsError::Persist {
                source: StorageError::CreateDirectory { .. },
                ..
            }
        ));
        assert_eq!(store.settings().max_prompt_chars, DEFAULT_MAX_PROMPT_CHARS);
    }
}
