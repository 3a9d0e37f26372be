use lewis_backend::{RenderProgress, StoryboardUpdate};
use serde::{Deserialize, Serialize};
use snafu::ensure;

use super::payload::{CreativePayload, ScriptDraft, StoryboardAsset};
use super::stage::Stage;
use crate::error::{InvalidTransitionSnafu, PreconditionNotMetSnafu, WorkspaceResult};

/// Default upper bound on prompt length, in characters.
pub const DEFAULT_MAX_PROMPT_CHARS: usize = 2000;

/// Workflow state of a creative session.
///
/// `stage` only moves forward. Each forward step is gated by the data gathered in the
/// stage before it; a rejected step leaves every field as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CreativeSession {
    stage: Stage,
    #[serde(default)]
    prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    script_draft: Option<ScriptDraft>,
    #[serde(default)]
    storyboard_assets: Vec<StoryboardAsset>,
    #[serde(default)]
    render_progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    artifact_url: Option<String>,
}

impl CreativeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn script_draft(&self) -> Option<&ScriptDraft> {
        self.script_draft.as_ref()
    }

    pub fn storyboard_assets(&self) -> &[StoryboardAsset] {
        &self.storyboard_assets
    }

    pub fn render_progress(&self) -> u8 {
        self.render_progress
    }

    /// Final artifact reference, exposed once the workflow is done.
    pub fn artifact(&self) -> Option<&str> {
        match self.stage {
            Stage::Done => self.artifact_url.as_deref(),
            _ => None,
        }
    }

    pub fn all_assets_resolved(&self) -> bool {
        !self.storyboard_assets.is_empty()
            && self
                .storyboard_assets
                .iter()
                .all(|asset| asset.status.is_resolved())
    }

    pub fn set_prompt(
        &mut self,
        prompt: impl Into<String>,
        max_chars: usize,
    ) -> WorkspaceResult<()> {
        ensure!(
            self.stage == Stage::Drafting,
            InvalidTransitionSnafu {
                stage: "set-creative-prompt",
                details: format!(
                    "prompt is fixed once the session leaves drafting (now {})",
                    self.stage
                ),
            }
        );

        let prompt = prompt.into();
        let length = prompt.chars().count();
        ensure!(
            length <= max_chars,
            PreconditionNotMetSnafu {
                stage: "set-creative-prompt",
                transition: "set prompt",
                details: format!("prompt has {length} characters, limit is {max_chars}"),
            }
        );

        self.prompt = prompt;
        Ok(())
    }

    /// Moves to `target` when it is the next stage and its entry condition holds.
    ///
    /// Asking for the current stage is a no-op.
    pub fn advance_to(&mut self, target: Stage) -> WorkspaceResult<Stage> {
        if target == self.stage {
            return Ok(self.stage);
        }

        ensure!(
            self.stage.precedes(target),
            InvalidTransitionSnafu {
                stage: "advance-stage",
                details: format!("cannot move from {} to {target}", self.stage),
            }
        );

        self.check_entry(target)?;

        if target == Stage::Rendering {
            self.render_progress = 0;
        }
        self.stage = target;
        Ok(self.stage)
    }

    pub fn advance(&mut self) -> WorkspaceResult<Stage> {
        let Some(target) = self.stage.next() else {
            return InvalidTransitionSnafu {
                stage: "advance-stage",
                details: format!("{} is the final stage", self.stage),
            }
            .fail();
        };
        self.advance_to(target)
    }

    fn check_entry(&self, target: Stage) -> WorkspaceResult<()> {
        let transition = || format!("enter {target}");
        match target {
            Stage::Drafting => Ok(()),
            Stage::Scripting => {
                ensure!(
                    !self.prompt.trim().is_empty(),
                    PreconditionNotMetSnafu {
                        stage: "advance-stage",
                        transition: transition(),
                        details: "prompt is empty",
                    }
                );
                Ok(())
            }
            Stage::Visualizing => {
                let has_script = self
                    .script_draft
                    .as_ref()
                    .is_some_and(|draft| !draft.is_empty());
                ensure!(
                    has_script,
                    PreconditionNotMetSnafu {
                        stage: "advance-stage",
                        transition: transition(),
                        details: "no script draft yet",
                    }
                );
                Ok(())
            }
            Stage::Rendering => {
                ensure!(
                    !self.storyboard_assets.is_empty(),
                    PreconditionNotMetSnafu {
                        stage: "advance-stage",
                        transition: transition(),
                        details: "storyboard has no assets",
                    }
                );
                let pending = self
                    .storyboard_assets
                    .iter()
                    .filter(|asset| !asset.status.is_resolved())
                    .count();
                ensure!(
                    pending == 0,
                    PreconditionNotMetSnafu {
                        stage: "advance-stage",
                        transition: transition(),
                        details: format!("{pending} storyboard assets still pending"),
                    }
                );
                Ok(())
            }
            Stage::Done => {
                ensure!(
                    self.render_progress == 100,
                    PreconditionNotMetSnafu {
                        stage: "advance-stage",
                        transition: transition(),
                        details: format!("render is at {}%", self.render_progress),
                    }
                );
                Ok(())
            }
        }
    }

    /// Applies a decoded backend payload; it must match the current stage.
    pub fn apply_payload(&mut self, payload: CreativePayload) -> WorkspaceResult<()> {
        let expected = payload.stage();
        ensure!(
            expected == self.stage,
            InvalidTransitionSnafu {
                stage: "apply-stage-payload",
                details: format!("{expected} payload received while {}", self.stage),
            }
        );

        match payload {
            CreativePayload::Script(draft) => {
                self.script_draft = Some(draft);
                Ok(())
            }
            CreativePayload::Storyboard(updates) => {
                self.upsert_assets(updates);
                Ok(())
            }
            CreativePayload::Render(progress) => self.record_progress(progress),
        }
    }

    fn upsert_assets(&mut self, updates: Vec<StoryboardUpdate>) {
        for update in updates {
            let asset = StoryboardAsset::from(update);
            match self
                .storyboard_assets
                .iter_mut()
                .find(|existing| existing.asset_id == asset.asset_id)
            {
                Some(existing) => *existing = asset,
                None => self.storyboard_assets.push(asset),
            }
        }
    }

    fn record_progress(&mut self, progress: RenderProgress) -> WorkspaceResult<()> {
        ensure!(
            progress.percent <= 100,
            InvalidTransitionSnafu {
                stage: "apply-stage-payload",
                details: format!("render progress {}% exceeds 100", progress.percent),
            }
        );
        ensure!(
            progress.percent >= self.render_progress,
            InvalidTransitionSnafu {
                stage: "apply-stage-payload",
                details: format!(
                    "render progress went back from {}% to {}%",
                    self.render_progress, progress.percent
                ),
            }
        );

        self.render_progress = progress.percent;
        if let Some(url) = progress.artifact_url {
            self.artifact_url = Some(url);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::creative::STAGE_ORDER;

    fn script() -> CreativePayload {
        CreativePayload::Script(ScriptDraft(json!([{"scene": 1, "description": "Sunrise"}])))
    }

    fn at_rendering() -> CreativeSession {
        let mut session = CreativeSession::new();
        session.set_prompt("A 30s ad for a coffee brand", DEFAULT_MAX_PROMPT_CHARS).unwrap();
        session.advance().unwrap();
        session.apply_payload(script()).unwrap();
        session.advance().unwrap();
        session
            .apply_payload(CreativePayload::Storyboard(vec![
                StoryboardUpdate::ready("scene-1", "https://cdn/1.png"),
                StoryboardUpdate::failed("scene-2"),
            ]))
            .unwrap();
        session.advance().unwrap();
        session
    }

    #[test]
    fn empty_prompt_blocks_scripting() {
        let mut session = CreativeSession::new();
        session.set_prompt("   ", DEFAULT_MAX_PROMPT_CHARS).unwrap();

        let error = session.advance_to(Stage::Scripting).unwrap_err();
        assert!(error.is_precondition_not_met());
        assert_eq!(session.stage(), Stage::Drafting);
    }

    #[test]
    fn prompt_is_limited_and_fixed_after_drafting() {
        let mut session = CreativeSession::new();
        let error = session.set_prompt("x".repeat(11), 10).unwrap_err();
        assert!(error.is_precondition_not_met());
        assert!(session.prompt().is_empty());

        session.set_prompt("ten chars!", 10).unwrap();
        session.advance().unwrap();
        let error = session.set_prompt("other", 10).unwrap_err();
        assert!(error.is_invalid_transition());
        assert_eq!(session.prompt(), "ten chars!");
    }

    #[test]
    fn skipping_or_regressing_is_invalid() {
        let mut session = CreativeSession::new();
        session.set_prompt("prompt", DEFAULT_MAX_PROMPT_CHARS).unwrap();

        assert!(session.advance_to(Stage::Visualizing).unwrap_err().is_invalid_transition());
        session.advance().unwrap();
        assert!(session.advance_to(Stage::Drafting).unwrap_err().is_invalid_transition());
        assert_eq!(session.stage(), Stage::Scripting);
    }

    #[test]
    fn pending_assets_block_rendering() {
        let mut session = CreativeSession::new();
        session.set_prompt("prompt", DEFAULT_MAX_PROMPT_CHARS).unwrap();
        session.advance().unwrap();
        session.apply_payload(script()).unwrap();
        session.advance().unwrap();

        assert!(session.advance().unwrap_err().is_precondition_not_met());

        session
            .apply_payload(CreativePayload::Storyboard(vec![
                StoryboardUpdate::pending("scene-1"),
                StoryboardUpdate::pending("scene-2"),
            ]))
            .unwrap();
        assert!(session.advance().unwrap_err().is_precondition_not_met());

        session
            .apply_payload(CreativePayload::Storyboard(vec![
                StoryboardUpdate::ready("scene-1", "https://cdn/1.png"),
                StoryboardUpdate::ready("scene-2", "https://cdn/2.png"),
            ]))
            .unwrap();
        assert_eq!(session.storyboard_assets().len(), 2);
        assert!(session.all_assets_resolved());
        assert_eq!(session.advance().unwrap(), Stage::Rendering);
        assert_eq!(session.render_progress(), 0);
    }

    #[test]
    fn done_requires_full_render_and_repeats_as_noop() {
        let mut session = at_rendering();
        session.apply_payload(CreativePayload::Render(RenderProgress::at(40))).unwrap();
        assert!(session.advance_to(Stage::Done).unwrap_err().is_precondition_not_met());

        session
            .apply_payload(CreativePayload::Render(RenderProgress::finished("file:///ad.mp4")))
            .unwrap();
        assert_eq!(session.advance_to(Stage::Done).unwrap(), Stage::Done);
        assert_eq!(session.advance_to(Stage::Done).unwrap(), Stage::Done);
        assert_eq!(session.artifact(), Some("file:///ad.mp4"));
        assert!(session.advance().unwrap_err().is_invalid_transition());
    }

    #[test]
    fn render_progress_never_goes_back() {
        let mut session = at_rendering();
        session.apply_payload(CreativePayload::Render(RenderProgress::at(60))).unwrap();

        let error = session
            .apply_payload(CreativePayload::Render(RenderProgress::at(30)))
            .unwrap_err();
        assert!(error.is_invalid_transition());

        let error = session
            .apply_payload(CreativePayload::Render(RenderProgress::at(101)))
            .unwrap_err();
        assert!(error.is_invalid_transition());
        assert_eq!(session.render_progress(), 60);
    }

    #[test]
    fn payload_for_another_stage_is_rejected() {
        let mut session = CreativeSession::new();
        let error = session.apply_payload(script()).unwrap_err();
        assert!(error.is_invalid_transition());
        assert!(session.script_draft().is_none());
    }

    #[derive(Debug, Clone)]
    enum Attempt {
        Prompt(String),
        Script(bool),
        Asset(bool),
        Progress(u8),
        AdvanceTo(usize),
    }

    fn attempt() -> impl Strategy<Value = Attempt> {
        prop_oneof![
            "[ a-z]{0,8}".prop_map(Attempt::Prompt),
            any::<bool>().prop_map(Attempt::Script),
            any::<bool>().prop_map(Attempt::Asset),
            (0u8..=110).prop_map(Attempt::Progress),
            (0usize..STAGE_ORDER.len()).prop_map(Attempt::AdvanceTo),
        ]
    }

    proptest! {
        #[test]
        fn stage_index_never_decreases(attempts in prop::collection::vec(attempt(), 0..40)) {
            let mut session = CreativeSession::new();
            for attempt in attempts {
                let before = session.clone();
                let result = match attempt {
                    Attempt::Prompt(text) => session.set_prompt(text, DEFAULT_MAX_PROMPT_CHARS),
                    Attempt::Script(empty) => {
                        let value = if empty { json!([]) } else { json!([{"scene": 1}]) };
                        session.apply_payload(CreativePayload::Script(ScriptDraft(value)))
                    }
                    Attempt::Asset(ready) => {
                        let update = if ready {
                            StoryboardUpdate::ready("scene", "https://cdn/scene.png")
                        } else {
                            StoryboardUpdate::pending("scene")
                        };
                        session.apply_payload(CreativePayload::Storyboard(vec![update]))
                    }
                    Attempt::Progress(percent) => {
                        session.apply_payload(CreativePayload::Render(RenderProgress::at(percent)))
                    }
                    Attempt::AdvanceTo(index) => session.advance_to(STAGE_ORDER[index]).map(|_| ()),
                };

                prop_assert!(session.stage().index() >= before.stage().index());
                if result.is_err() {
                    prop_assert_eq!(&session, &before);
                }
            }
        }
    }
}
