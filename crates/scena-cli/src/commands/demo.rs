//! Pane layout walkthrough: split a box in three, enlarge the middle pane,
//! shift and drag dividers, then restore.

use super::Context;
use crate::headless::HeadlessHost;
use anyhow::{Context as _, Result};
use scena_core::layout::{CursorStyle, DragSession, FrameCoalescer, Rect};
use std::sync::Arc;

pub async fn run(context: &Context) -> Result<()> {
    let usecase = &context.usecase;
    let scene = usecase.create_scene("Layout demo").await?;
    let box_id = usecase
        .add_box(&scene.id, Rect::new(0.0, 0.0, 100.0, 100.0))
        .await?;

    usecase.set_element_count(&scene.id, &box_id, 3).await?;
    print_widths(context, &scene.id, &box_id, "split in three").await?;

    usecase.toggle_enlarge(&scene.id, &box_id, 1).await?;
    print_widths(context, &scene.id, &box_id, "enlarge pane 1").await?;

    usecase.shift_divider(&scene.id, &box_id, 0, 5.0).await?;
    print_widths(context, &scene.id, &box_id, "divider 0 by +5").await?;

    // Pointer drag of divider 1 on an 800px wide box: -40px is -5%
    let session = DragSession::begin(Arc::new(HeadlessHost::default()), CursorStyle::ColumnResize);
    let drag = usecase
        .scene(&scene.id)
        .await?
        .find_box(&box_id)?
        .panes
        .begin_divider_drag(1, 400.0)?;
    let mut frames = FrameCoalescer::new();
    for x in [390.0, 375.0, 360.0] {
        frames.push(x);
    }
    usecase
        .drag_divider_frame(&scene.id, &box_id, &drag, &mut frames, 800.0)
        .await?;
    session.finish();
    print_widths(context, &scene.id, &box_id, "drag divider 1").await?;

    usecase.toggle_enlarge(&scene.id, &box_id, 1).await?;
    print_widths(context, &scene.id, &box_id, "restore").await?;

    usecase
        .delete_scene(&scene.id, true)
        .await
        .context("Failed to discard the demo scene")?;
    Ok(())
}

async fn print_widths(context: &Context, scene_id: &str, box_id: &str, step: &str) -> Result<()> {
    let scene = context.usecase.scene(scene_id).await?;
    let widths: Vec<String> = scene
        .find_box(box_id)?
        .panes
        .widths()
        .iter()
        .map(|w| format!("{:.1}", w))
        .collect();
    println!("{:<18} ({})", step, widths.join(", "));
    Ok(())
}
