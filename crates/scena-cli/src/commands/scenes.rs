use super::Context;
use anyhow::{Context as _, Result, bail};
use scena_application::LoadOutcome;
use scena_core::scene::Scene;

pub async fn list(context: &Context) -> Result<()> {
    let summaries = context
        .usecase
        .list_saved()
        .await
        .context("Failed to list scenes")?;
    if summaries.is_empty() {
        println!("No saved scenes.");
        return Ok(());
    }

    for summary in summaries {
        let storage = if summary.is_file_reference {
            " [blob]"
        } else {
            ""
        };
        println!(
            "{}  {:<24}  {}  {} boxes, {} bytes{}",
            summary.id,
            summary.name,
            summary.timestamp,
            summary.preview.box_positions.len(),
            summary.size,
            storage
        );
    }
    Ok(())
}

pub async fn show(context: &Context, id: &str) -> Result<()> {
    let scene = ensure_loaded(context, id).await?;
    println!("{}", serde_json::to_string_pretty(&scene)?);
    Ok(())
}

pub async fn create(context: &Context, name: &str) -> Result<()> {
    let scene = context.usecase.create_scene(name).await?;
    context
        .usecase
        .save_scene(&scene.id)
        .await
        .context("Failed to save the new scene")?;
    println!("Created {} ({})", scene.name, scene.id);
    Ok(())
}

pub async fn rename(context: &Context, id: &str, name: &str) -> Result<()> {
    ensure_loaded(context, id).await?;
    context.usecase.rename_scene(id, name).await?;
    context
        .usecase
        .save_scene(id)
        .await
        .with_context(|| format!("Failed to save scene {}", id))?;
    println!("Renamed {}", id);
    Ok(())
}

pub async fn delete(context: &Context, id: &str, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("Refusing to delete scene {} without --yes", id);
    }
    context
        .usecase
        .delete_scene(id, true)
        .await
        .with_context(|| format!("Failed to delete scene {}", id))?;
    println!("Deleted {}", id);
    Ok(())
}

/// Makes sure a saved scene is in memory, fetching its blob if needed.
async fn ensure_loaded(context: &Context, id: &str) -> Result<Scene> {
    if let Ok(scene) = context.usecase.scene(id).await {
        return Ok(scene);
    }
    match context.usecase.load_scene(id).await? {
        LoadOutcome::Loaded(scene) => Ok(scene),
        LoadOutcome::AwaitingBlob(summary) => context
            .usecase
            .complete_blob_fetch(&summary)
            .await
            .with_context(|| format!("Failed to fetch the payload of scene {}", id))?
            .with_context(|| format!("Scene {} was deleted while loading", id)),
        LoadOutcome::Missing => bail!("No saved scene with id {}", id),
    }
}
