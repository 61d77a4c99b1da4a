//! Filesystem persistence for scena: the scene record store with its
//! large-object fallback, editor state, configuration and the atomic file
//! layer underneath them.

pub mod config_service;
pub mod dir_scene_repository;
pub mod dto;
pub mod paths;
pub mod state_repository;
pub mod storage;

pub use crate::config_service::ConfigService;
pub use crate::dir_scene_repository::DirSceneRepository;
pub use crate::paths::{PathError, ScenaPaths};
pub use crate::state_repository::FileEditorStateRepository;
