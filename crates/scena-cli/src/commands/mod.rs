pub mod demo;
pub mod roster;
pub mod scenes;

use crate::headless::{HeadlessRuntime, HeadlessTargets};
use anyhow::{Context as _, Result};
use scena_application::{SceneStore, SceneUseCase};
use scena_core::signal::SignalBus;
use scena_infrastructure::{
    ConfigService, DirSceneRepository, FileEditorStateRepository, ScenaPaths,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a command needs, wired against the data directory.
pub struct Context {
    pub usecase: Arc<SceneUseCase>,
    pub config_service: ConfigService,
}

impl Context {
    pub async fn open(data_dir: Option<PathBuf>) -> Result<Self> {
        let paths = ScenaPaths::new(data_dir).context("Failed to resolve the data directory")?;
        let config_service = ConfigService::new(&paths);
        let config = config_service
            .get_config()
            .with_context(|| format!("Failed to load {}", paths.config_file().display()))?;

        let scenes = DirSceneRepository::with_threshold(paths.clone(), config.large_object_threshold)
            .await
            .context("Failed to open the scene store")?;
        let state = FileEditorStateRepository::new(&paths)
            .await
            .context("Failed to open editor state")?;

        let bus = SignalBus::new(config.signal_capacity);
        let usecase = Arc::new(SceneUseCase::new(
            Arc::new(scenes),
            Arc::new(state),
            Arc::new(HeadlessRuntime),
            Arc::new(HeadlessTargets),
            Arc::new(SceneStore::new()),
            bus,
            config,
        ));
        usecase
            .initialize()
            .await
            .context("Failed to load saved scenes")?;

        Ok(Self {
            usecase,
            config_service,
        })
    }
}
