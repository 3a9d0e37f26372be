use lewis_backend::{AssetState, RenderProgress, StoryboardUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::stage::Stage;
use crate::error::{InvalidTransitionSnafu, WorkspaceResult};

/// Script produced by the backend, stored exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptDraft(pub Value);

/// Typed view of one scene in a script draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptScene {
    pub scene: u32,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub visual_elements: Vec<String>,
}

impl ScriptDraft {
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::String(text) => text.trim().is_empty(),
            Value::Array(items) => items.is_empty(),
            Value::Object(fields) => fields.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }

    /// Scenes that parse as [`ScriptScene`], from a bare list or a `scenes` field.
    ///
    /// Entries of another shape are skipped; the raw draft is untouched.
    pub fn scenes(&self) -> Vec<ScriptScene> {
        let items = match &self.0 {
            Value::Array(items) => items,
            Value::Object(fields) => match fields.get("scenes") {
                Some(Value::Array(items)) => items,
                _ => return Vec::new(),
            },
            _ => return Vec::new(),
        };

        items
            .iter()
            .filter_map(|item| ScriptScene::deserialize(item).ok())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetStatus {
    Pending,
    Ready,
    Failed,
}

impl AssetStatus {
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl From<AssetState> for AssetStatus {
    fn from(value: AssetState) -> Self {
        match value {
            AssetState::Pending => Self::Pending,
            AssetState::Ready => Self::Ready,
            AssetState::Failed => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryboardAsset {
    pub asset_id: String,
    pub status: AssetStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<StoryboardUpdate> for StoryboardAsset {
    fn from(value: StoryboardUpdate) -> Self {
        Self {
            asset_id: value.asset_id,
            status: value.status.into(),
            url: value.url,
        }
    }
}

/// A stage payload decoded for the stage it targets.
#[derive(Debug, Clone, PartialEq)]
pub enum CreativePayload {
    Script(ScriptDraft),
    Storyboard(Vec<StoryboardUpdate>),
    Render(RenderProgress),
}

impl CreativePayload {
    /// Decodes a raw `stage_payload` body.
    ///
    /// Storyboard payloads may carry one update or a list of them.
    pub fn decode(stage: Stage, payload: Value) -> WorkspaceResult<Self> {
        match stage {
            Stage::Scripting => Ok(Self::Script(ScriptDraft(payload))),
            Stage::Visualizing => {
                let updates = if payload.is_array() {
                    Vec::<StoryboardUpdate>::deserialize(&payload)
                } else {
                    StoryboardUpdate::deserialize(&payload).map(|update| vec![update])
                };
                updates
                    .map(Self::Storyboard)
                    .map_err(|error| malformed(stage, error))
            }
            Stage::Rendering => RenderProgress::deserialize(&payload)
                .map(Self::Render)
                .map_err(|error| malformed(stage, error)),
            Stage::Drafting | Stage::Done => InvalidTransitionSnafu {
                stage: "decode-stage-payload",
                details: format!("stage '{stage}' does not accept payloads"),
            }
            .fail(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Script(_) => Stage::Scripting,
            Self::Storyboard(_) => Stage::Visualizing,
            Self::Render(_) => Stage::Rendering,
        }
    }
}

fn malformed(stage: Stage, error: serde_json::Error) -> crate::error::WorkspaceError {
    InvalidTransitionSnafu {
        stage: "decode-stage-payload",
        details: format!("malformed {stage} payload: {error}"),
    }
    .build()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn script_draft_emptiness_follows_json_shape() {
        assert!(ScriptDraft(Value::Null).is_empty());
        assert!(ScriptDraft(json!("  ")).is_empty());
        assert!(ScriptDraft(json!([])).is_empty());
        assert!(ScriptDraft(json!({})).is_empty());
        assert!(!ScriptDraft(json!("Scene 1: sunrise")).is_empty());
    }

    #[test]
    fn scenes_are_read_from_list_or_scenes_field() {
        let scene = json!({
            "scene": 1,
            "duration": 5,
            "description": "Opening shot: skyline at sunrise",
            "visualElements": ["skyline", "sun"]
        });

        let from_list = ScriptDraft(json!([scene.clone(), "not a scene"])).scenes();
        assert_eq!(from_list.len(), 1);
        assert_eq!(from_list[0].visual_elements, ["skyline", "sun"]);

        let from_field = ScriptDraft(json!({"title": "Ad", "scenes": [scene]})).scenes();
        assert_eq!(from_field, from_list);

        assert!(ScriptDraft(json!("free text")).scenes().is_empty());
    }

    #[test]
    fn storyboard_payload_accepts_single_or_list() {
        let single = CreativePayload::decode(
            Stage::Visualizing,
            json!({"assetId": "scene-1", "status": "ready", "url": "https://cdn/1.png"}),
        )
        .unwrap();
        assert!(matches!(single, CreativePayload::Storyboard(ref updates) if updates.len() == 1));

        let list = CreativePayload::decode(
            Stage::Visualizing,
            json!([{"assetId": "a", "status": "pending"}, {"assetId": "b", "status": "failed"}]),
        )
        .unwrap();
        assert!(matches!(list, CreativePayload::Storyboard(ref updates) if updates.len() == 2));
    }

    #[test]
    fn malformed_or_misplaced_payloads_are_invalid() {
        let error =
            CreativePayload::decode(Stage::Rendering, json!({"percent": "half"})).unwrap_err();
        assert!(error.is_invalid_transition());

        let error = CreativePayload::decode(Stage::Drafting, json!("anything")).unwrap_err();
        assert!(error.is_invalid_transition());
    }
}
