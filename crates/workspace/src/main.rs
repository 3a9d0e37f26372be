use std::sync::Arc;
use std::time::Duration;

use lewis_backend::{BackendEvent, Script, ScriptedBackend, StageName, StoryboardUpdate};
use lewis_storage::JsonFileSnapshotStore;
use lewis_workspace::{
    SessionStore, SettingsStore, Stage, StoreEvent, StreamingController, WorkspaceResult,
};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

/// Headless walkthrough of the workspace core.
///
/// 1. Load settings and restore the last snapshot
/// 2. Stream one chat turn from the scripted backend
/// 3. Drive a creative session from drafting to done
/// 4. Save the snapshot back to disk
#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run().await {
        tracing::error!(error = %error, "workspace demo failed");
        std::process::exit(1);
    }
}

async fn run() -> WorkspaceResult<()> {
    let settings = SettingsStore::load().settings();
    let snapshots = JsonFileSnapshotStore::new(settings.snapshot_path.clone());

    let mut store = SessionStore::with_settings(&settings);
    if store.load_from(&snapshots)? {
        tracing::info!(sessions = store.len(), "restored previous workspace");
    }

    let mut notifications = store.subscribe();
    let listener = tokio::spawn(async move {
        let mut seen = 0usize;
        loop {
            match notifications.recv().await {
                Ok(StoreEvent::StageChanged { session_id, stage }) => {
                    tracing::info!(session_id = %session_id, stage = %stage, "stage changed");
                    seen += 1;
                }
                Ok(_) => seen += 1,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification listener fell behind");
                }
                Err(RecvError::Closed) => break seen,
            }
        }
    });

    let backend = Arc::new(ScriptedBackend::new().with_stall_timeout(Duration::from_secs(5)));
    let mut controller = StreamingController::with_settings(backend.clone(), &settings);

    let chat = store.create_session();
    store.rename_session(chat, "Quick question")?;
    backend.push_script(Script::reply("Hi there, how can I help?"));
    controller.begin_turn(&mut store, chat, "hello")?;
    for outcome in controller.run_until_idle(&mut store).await {
        tracing::info!(
            session_id = %outcome.session_id(),
            status = ?outcome.status,
            "chat turn finished"
        );
    }

    let creative = store.create_creative_session();
    store.rename_session(creative, "Coffee ad")?;
    store.set_creative_prompt(creative, "A 15 second ad for a neighbourhood coffee shop")?;
    store.advance_stage(creative, Stage::Scripting)?;

    backend.push_script(
        Script::new()
            .emit(BackendEvent::content_delta("Here is a two scene script."))
            .emit(BackendEvent::stage_payload(
                StageName::Scripting,
                json!([
                    {
                        "scene": 1,
                        "duration": 7,
                        "description": "Steam rising from a cup",
                        "visualElements": ["cup", "steam"]
                    },
                    {
                        "scene": 2,
                        "duration": 8,
                        "description": "Shop front at dawn",
                        "visualElements": ["storefront"]
                    }
                ]),
            ))
            .emit(BackendEvent::Done),
    );
    controller.begin_turn(&mut store, creative, "Write the script")?;
    controller.run_until_idle(&mut store).await;
    store.advance_stage(creative, Stage::Visualizing)?;

    let storyboard = [
        StoryboardUpdate::ready("scene-1", "https://assets.example/scene-1.png"),
        StoryboardUpdate::ready("scene-2", "https://assets.example/scene-2.png"),
    ];
    backend.push_script(
        Script::new()
            .emit(BackendEvent::tool_call("image_generator", json!({"scenes": 2})))
            .emit(BackendEvent::stage_payload(StageName::Visualizing, json!(storyboard)))
            .emit(BackendEvent::tool_complete(0, json!({"generated": 2})))
            .emit(BackendEvent::Done),
    );
    controller.begin_turn(&mut store, creative, "Draw the storyboard")?;
    controller.run_until_idle(&mut store).await;
    store.advance_stage(creative, Stage::Rendering)?;

    backend.push_script(
        Script::new()
            .emit(BackendEvent::stage_payload(StageName::Rendering, json!({"percent": 40})))
            .emit(BackendEvent::stage_payload(
                StageName::Rendering,
                json!({"percent": 100, "artifactUrl": "https://assets.example/coffee-ad.mp4"}),
            ))
            .emit(BackendEvent::Done),
    );
    controller.begin_turn(&mut store, creative, "Render the video")?;
    controller.run_until_idle(&mut store).await;
    store.advance_stage(creative, Stage::Done)?;

    if let Some(artifact) = store.creative(creative).and_then(|session| session.artifact()) {
        tracing::info!(artifact, "creative workflow finished");
    }

    store.save_to(&snapshots)?;
    tracing::info!(path = ?snapshots.path(), sessions = store.len(), "saved workspace");

    drop(store);
    if let Ok(seen) = listener.await {
        tracing::debug!(notifications = seen, "notification listener stopped");
    }
    Ok(())
}
