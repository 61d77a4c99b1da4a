//! Directory-backed `SceneRepository` implementation.
//!
//! Directory structure:
//! ```text
//! base_dir/
//! ├── scenes/
//! │   ├── <scene-id-1>.json    # full record, or preview + fileUrl
//! │   └── <scene-id-2>.json
//! └── blobs/
//!     └── <scene-id-2>.json    # payload of a large scene
//! ```
//!
//! Scenes whose serialized size exceeds the large-object threshold are
//! split: the record keeps only list metadata and a `file://` reference,
//! the payload goes to `blobs/`. The blob is always written before the
//! record that points at it.

use crate::dto::SceneRecordDto;
use crate::paths::{ScenaPaths, file_url, path_from_file_url};
use crate::storage::{remove_if_exists, with_lock, write_atomic};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scena_core::error::{Result, SceneError};
use scena_core::scene::{
    LARGE_OBJECT_THRESHOLD, SavedSceneSummary, Scene, SceneLoad, ScenePreview, SceneRepository,
};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Scene record store on the local filesystem.
#[derive(Debug, Clone)]
pub struct DirSceneRepository {
    paths: ScenaPaths,
    threshold: usize,
}

impl DirSceneRepository {
    /// Creates a repository under `paths` with the default threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if the `scenes/` or `blobs/` directory cannot be
    /// created.
    pub async fn new(paths: ScenaPaths) -> Result<Self> {
        Self::with_threshold(paths, LARGE_OBJECT_THRESHOLD).await
    }

    /// Creates a repository with a custom large-object threshold (bytes).
    pub async fn with_threshold(paths: ScenaPaths, threshold: usize) -> Result<Self> {
        fs::create_dir_all(paths.scenes_dir()).await?;
        fs::create_dir_all(paths.blobs_dir()).await?;
        Ok(Self { paths, threshold })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn scenes_dir(&self) -> PathBuf {
        self.paths.scenes_dir()
    }

    async fn read_record(path: &Path) -> Result<Option<SceneRecordDto>> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: SceneRecordDto = serde_json::from_str(&content)?;
        Ok(Some(record))
    }

    fn blob_path_for(&self, summary: &SavedSceneSummary) -> Result<PathBuf> {
        match summary.file_url.as_deref().and_then(path_from_file_url) {
            Some(path) => Ok(path),
            None => Ok(self.paths.scene_blob(&summary.id)?),
        }
    }
}

#[async_trait]
impl SceneRepository for DirSceneRepository {
    async fn save(&self, scene: &Scene) -> Result<SavedSceneSummary> {
        let timestamp = Utc::now().to_rfc3339();
        let full = SceneRecordDto::from_domain(scene, &timestamp);
        let payload = serde_json::to_vec(&full)?;
        let size = payload.len();

        let record_path = self.paths.scene_record(&scene.id)?;
        let blob_path = self.paths.scene_blob(&scene.id)?;
        let is_large = size > self.threshold;

        let record = if is_large {
            tracing::info!(
                "[DirSceneRepository] Scene {} is {} bytes, storing payload out-of-band",
                scene.id,
                size
            );
            SceneRecordDto::file_reference(scene, &timestamp, size, file_url(&blob_path))
        } else {
            full.with_summary(size, ScenePreview::from_scene(scene))
        };
        let summary = record.summary();
        let record_bytes = serde_json::to_vec_pretty(&record)?;

        tokio::task::spawn_blocking(move || {
            with_lock(&record_path, || {
                if is_large {
                    write_atomic(&blob_path, &payload)?;
                    write_atomic(&record_path, &record_bytes)
                } else {
                    write_atomic(&record_path, &record_bytes)?;
                    remove_if_exists(&blob_path).map(|_| ())
                }
            })
        })
        .await
        .map_err(|e| SceneError::internal(format!("Failed to join save task: {}", e)))??;

        tracing::debug!(
            "[DirSceneRepository] Saved scene {} ({} bytes, file_reference={})",
            summary.id,
            size,
            summary.is_file_reference
        );
        Ok(summary)
    }

    async fn load(&self, scene_id: &str) -> Result<Option<SceneLoad>> {
        let path = self.paths.scene_record(scene_id)?;
        let Some(record) = Self::read_record(&path).await? else {
            return Ok(None);
        };

        if record.is_file_reference {
            Ok(Some(SceneLoad::AwaitingBlob(record.summary())))
        } else {
            Ok(Some(SceneLoad::Ready(record.into_domain())))
        }
    }

    async fn fetch_blob(&self, summary: &SavedSceneSummary) -> Result<Scene> {
        let path = self.blob_path_for(summary)?;
        let record = Self::read_record(&path)
            .await?
            .ok_or_else(|| SceneError::not_found("SceneBlob", summary.id.clone()))?;

        if record.id != summary.id {
            return Err(SceneError::internal(format!(
                "Blob {} holds scene {}, expected {}",
                path.display(),
                record.id,
                summary.id
            )));
        }
        Ok(record.into_domain())
    }

    async fn list(&self) -> Result<Vec<SavedSceneSummary>> {
        let dir = self.paths.scenes_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && !path
                    .file_name()
                    .is_some_and(|name| name.to_string_lossy().starts_with('.'));
            if !is_record {
                continue;
            }

            match Self::read_record(&path).await {
                Ok(Some(record)) => summaries.push(record.summary()),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        "[DirSceneRepository] Skipping malformed record {}: {}",
                        path.display(),
                        e
                    );
                }
            }
        }

        summaries.sort_by(|a, b| sort_key(&b.timestamp).cmp(&sort_key(&a.timestamp)));
        Ok(summaries)
    }

    async fn delete(&self, scene_id: &str) -> Result<()> {
        let record_path = self.paths.scene_record(scene_id)?;
        let blob_path = self.paths.scene_blob(scene_id)?;

        let removed = tokio::task::spawn_blocking(move || {
            with_lock(&record_path, || {
                let record = remove_if_exists(&record_path)?;
                let blob = remove_if_exists(&blob_path)?;
                Ok(record || blob)
            })
        })
        .await
        .map_err(|e| SceneError::internal(format!("Failed to join delete task: {}", e)))??;

        if removed {
            tracing::info!("[DirSceneRepository] Deleted scene {}", scene_id);
        } else {
            tracing::debug!("[DirSceneRepository] Scene {} was already absent", scene_id);
        }
        Ok(())
    }
}

/// Orders unparsable timestamps last.
fn sort_key(timestamp: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
