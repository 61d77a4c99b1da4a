//! Editor state repository implementation.
//!
//! Persists editor-wide state (active scene, party registry) to
//! `state.json` and caches it in memory to avoid repeated file I/O.

use crate::paths::ScenaPaths;
use crate::storage::AtomicFile;
use async_trait::async_trait;
use scena_core::error::{Result, SceneError};
use scena_core::party::PartyRegistry;
use scena_core::state::{EditorState, EditorStateRepository};
use std::sync::Arc;
use tokio::sync::Mutex;

/// File-backed [`EditorStateRepository`].
///
/// # Example
///
/// ```ignore
/// let paths = ScenaPaths::new(None)?;
/// let repository = FileEditorStateRepository::new(&paths).await?;
/// repository.set_active_scene("scene-1".to_string()).await?;
/// ```
#[derive(Clone)]
pub struct FileEditorStateRepository {
    /// Cached state; the file is only read once at construction.
    state: Arc<Mutex<EditorState>>,
    file: Arc<AtomicFile<EditorState>>,
}

impl FileEditorStateRepository {
    /// Loads the state file, creating it with defaults if missing.
    pub async fn new(paths: &ScenaPaths) -> Result<Self> {
        let file = Arc::new(AtomicFile::<EditorState>::json(paths.state_file()));

        let loader = file.clone();
        let initial_state = tokio::task::spawn_blocking(move || -> Result<EditorState> {
            match loader.load()? {
                Some(state) => Ok(state),
                None => {
                    let state = EditorState::default();
                    loader.save(&state)?;
                    Ok(state)
                }
            }
        })
        .await
        .map_err(|e| SceneError::internal(format!("Failed to join task: {}", e)))??;

        tracing::debug!(
            "[EditorState] Loaded state (active={:?}, parties={})",
            initial_state.active_scene_id,
            initial_state.parties.len()
        );

        Ok(Self {
            state: Arc::new(Mutex::new(initial_state)),
            file,
        })
    }

    async fn modify<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut EditorState),
    {
        let mut state = self.state.lock().await.clone();
        f(&mut state);
        self.save_state(state).await
    }
}

#[async_trait]
impl EditorStateRepository for FileEditorStateRepository {
    async fn get_state(&self) -> Result<EditorState> {
        Ok(self.state.lock().await.clone())
    }

    async fn save_state(&self, state: EditorState) -> Result<()> {
        {
            let mut state_lock = self.state.lock().await;
            *state_lock = state.clone();
        }

        let file = self.file.clone();
        tokio::task::spawn_blocking(move || file.save(&state))
            .await
            .map_err(|e| SceneError::internal(format!("Failed to join task: {}", e)))??;
        Ok(())
    }

    async fn get_active_scene(&self) -> Option<String> {
        self.state.lock().await.active_scene_id.clone()
    }

    async fn set_active_scene(&self, scene_id: String) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.modify(move |state| {
            state.active_scene_id = Some(scene_id);
            state.last_opened_at = Some(now);
        })
        .await
    }

    async fn clear_active_scene(&self) -> Result<()> {
        self.modify(|state| state.active_scene_id = None).await
    }

    async fn save_parties(&self, parties: PartyRegistry) -> Result<()> {
        self.modify(move |state| state.parties = parties).await
    }
}
