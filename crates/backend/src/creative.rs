use serde::{Deserialize, Serialize};

/// Generation state of one storyboard asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetState {
    Pending,
    Ready,
    Failed,
}

/// Per-scene report from storyboard generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryboardUpdate {
    pub asset_id: String,
    pub status: AssetState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl StoryboardUpdate {
    pub fn pending(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            status: AssetState::Pending,
            url: None,
        }
    }

    pub fn ready(asset_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            status: AssetState::Ready,
            url: Some(url.into()),
        }
    }

    pub fn failed(asset_id: impl Into<String>) -> Self {
        Self {
            asset_id: asset_id.into(),
            status: AssetState::Failed,
            url: None,
        }
    }
}

/// Render progress report; `percent` only grows until it reaches 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderProgress {
    pub percent: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_url: Option<String>,
}

impl RenderProgress {
    pub fn at(percent: u8) -> Self {
        Self {
            percent,
            artifact_url: None,
        }
    }

    pub fn finished(artifact_url: impl Into<String>) -> Self {
        Self {
            percent: 100,
            artifact_url: Some(artifact_url.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn storyboard_update_omits_missing_url() {
        assert_eq!(
            serde_json::to_value(StoryboardUpdate::pending("scene-2")).unwrap(),
            json!({"assetId": "scene-2", "status": "pending"})
        );
    }

    #[test]
    fn render_progress_reads_artifact_url() {
        let progress: RenderProgress =
            serde_json::from_value(json!({"percent": 100, "artifactUrl": "file:///out.mp4"}))
                .unwrap();
        assert_eq!(progress, RenderProgress::finished("file:///out.mp4"));
    }
}
